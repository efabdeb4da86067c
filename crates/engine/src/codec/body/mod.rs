//! Body codecs.
//!
//! ## Decoders (request side)
//! - [`PayloadDecoder`]: dispatches to a `Content-Length` or chunked decoder, or yields EOF
//!   straight away for a request without a body
//!
//! ## Encoders (response side)
//! - [`PayloadEncoder`]: `Content-Length`, chunked, or raw bytes delimited by connection close
//!
//! Both sides exchange [`PayloadItem`](crate::protocol::PayloadItem)s, with
//! `PayloadItem::Eof` terminating a body.

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
