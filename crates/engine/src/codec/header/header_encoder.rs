//! Serializes response heads.
//!
//! The status line is always written as `HTTP/1.1`. The framing headers are rewritten from the
//! [`ResponseFraming`] chosen by the connection, so whatever `Content-Length` or
//! `Transfer-Encoding` the handler set never contradicts what is actually sent.

use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::{HeaderMap, HeaderValue, header};
use tokio_util::codec::Encoder;

use crate::protocol::{ResponseFraming, ResponseHead, SendError, status_forbids_length};
use crate::utils::FastWrite;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

const CHUNKED: HeaderValue = HeaderValue::from_static("chunked");

#[derive(Debug, Default)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, ResponseFraming)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, ResponseFraming), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, framing) = item;
        let status = head.status();

        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or(""))?;

        let headers = head.headers_mut();
        match framing {
            ResponseFraming::Length(n) | ResponseFraming::HeadOnly(Some(n)) => {
                headers.remove(header::TRANSFER_ENCODING);
                headers.insert(header::CONTENT_LENGTH, n.into());
            }
            ResponseFraming::Chunked => {
                headers.remove(header::CONTENT_LENGTH);
                headers.insert(header::TRANSFER_ENCODING, CHUNKED);
            }
            ResponseFraming::UntilClose => remove_framing(headers),
            ResponseFraming::HeadOnly(None) if status_forbids_length(status) => remove_framing(headers),
            ResponseFraming::HeadOnly(None) => {
                headers.remove(header::TRANSFER_ENCODING);
            }
        }

        for (name, value) in head.headers() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

fn remove_framing(headers: &mut HeaderMap) {
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::TRANSFER_ENCODING);
}
