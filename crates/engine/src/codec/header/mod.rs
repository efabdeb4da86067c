//! Request head decoding and response head encoding.
//!
//! - [`HeaderDecoder`]: parses the start line and header fields with `httparse`, enforces the
//!   [`ParserLimits`], and decides how the request body is delimited
//! - [`HeaderEncoder`]: writes the status line and headers, with framing headers derived from
//!   the response framing

mod header_decoder;
mod header_encoder;

pub use header_decoder::{HeaderDecoder, MAX_HEADER_NUM, ParserLimits};
pub use header_encoder::HeaderEncoder;
