//! HTTP/1.1 wire codecs.
//!
//! - Request side:
//!   - [`RequestParser`]: incremental parser turning received bytes into wire events
//!   - [`HeaderDecoder`] with its [`ParserLimits`]: parses the request head
//!   - [`PayloadDecoder`]: `Content-Length` and chunked request bodies
//!
//! - Response side:
//!   - [`ResponseEncoder`]: writes a response head followed by its body
//!   - [`HeaderEncoder`]: status line and headers, framing headers derived from the framing
//!   - [`PayloadEncoder`]: `Content-Length`, chunked and close-delimited bodies
//!
//! The decoders and encoders implement `tokio_util::codec::{Decoder, Encoder}`.

mod body;
mod header;
mod request_parser;
mod response_encoder;

pub use body::{PayloadDecoder, PayloadEncoder};
pub use header::{HeaderDecoder, HeaderEncoder, MAX_HEADER_NUM, ParserLimits};
pub use request_parser::RequestParser;
pub use response_encoder::ResponseEncoder;
