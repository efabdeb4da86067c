//! Decoder for request bodies sent with `Transfer-Encoding: chunked`.
//!
//! Wire format ([RFC 9112 section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1)):
//!
//! ```text
//! chunk-size [ ; extensions ] CRLF
//! chunk-data CRLF
//! ...
//! 0 [ ; extensions ] CRLF
//! *( trailer-field CRLF )
//! CRLF
//! ```
//!
//! Extensions and trailer fields are skipped. The decoder yields data as soon as any of it is
//! buffered, so a large chunk surfaces as several [`PayloadItem::Chunk`]s.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem};

/// Largest chunk size accepted on the size line, anything above is treated as malformed.
const MAX_CHUNK_SIZE: u64 = u64::MAX >> 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
    remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// hex digits of the chunk size
    Size,
    /// optional whitespace between the size and `;` or CR
    SizeWhitespace,
    /// chunk extensions, ignored up to CR
    Extension,
    /// LF closing the size line
    SizeLf,
    /// chunk payload
    Data,
    /// CR after the chunk payload
    DataCr,
    /// LF after the chunk payload
    DataLf,
    /// start of a trailer line, or the final CR
    TrailerStart,
    /// inside a trailer field, ignored up to CR
    Trailer,
    /// LF closing a trailer field
    TrailerLf,
    /// final LF
    EndLf,
    Done,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size, remaining: 0 }
    }

    fn size_digit(&mut self, digit: u8) -> Result<(), ParseError> {
        let value = match digit {
            b'0'..=b'9' => digit - b'0',
            b'a'..=b'f' => digit - b'a' + 10,
            b'A'..=b'F' => digit - b'A' + 10,
            _ => return Err(ParseError::invalid_body("invalid chunk size line: invalid size")),
        };

        self.remaining = self
            .remaining
            .checked_mul(16)
            .and_then(|size| size.checked_add(u64::from(value)))
            .filter(|size| *size <= MAX_CHUNK_SIZE)
            .ok_or_else(|| ParseError::invalid_body("invalid overflow chunked length"))?;
        Ok(())
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == State::Done {
                trace!("finished reading chunked data");
                return Ok(Some(PayloadItem::Eof));
            }

            if self.state == State::Data {
                if src.is_empty() {
                    return Ok(None);
                }

                let len = usize::try_from(self.remaining).unwrap_or(usize::MAX).min(src.len());
                let bytes = src.split_to(len).freeze();
                self.remaining -= len as u64;
                if self.remaining == 0 {
                    self.state = State::DataCr;
                }

                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }

            if src.is_empty() {
                return Ok(None);
            }

            let byte = src.get_u8();
            self.state = match (self.state, byte) {
                (State::Size, b'\t' | b' ') => State::SizeWhitespace,
                (State::Size | State::SizeWhitespace, b';') => State::Extension,
                (State::Size | State::SizeWhitespace | State::Extension, b'\r') => State::SizeLf,
                (State::Size, digit) => {
                    self.size_digit(digit)?;
                    State::Size
                }
                (State::SizeWhitespace, b'\t' | b' ') => State::SizeWhitespace,
                (State::SizeWhitespace, _) => return Err(ParseError::invalid_body("invalid chunk size linear white space")),

                (State::Extension, b'\n') => return Err(ParseError::invalid_body("invalid chunk extension contains newline")),
                (State::Extension, _) => State::Extension,

                (State::SizeLf, b'\n') if self.remaining == 0 => State::TrailerStart,
                (State::SizeLf, b'\n') => State::Data,
                (State::SizeLf, _) => return Err(ParseError::invalid_body("invalid chunk size LF")),

                (State::DataCr, b'\r') => State::DataLf,
                (State::DataCr, _) => return Err(ParseError::invalid_body("invalid chunk body CR")),
                (State::DataLf, b'\n') => State::Size,
                (State::DataLf, _) => return Err(ParseError::invalid_body("invalid chunk body LF")),

                (State::TrailerStart, b'\r') => State::EndLf,
                (State::TrailerStart | State::Trailer, b'\n') => return Err(ParseError::invalid_body("invalid trailer contains bare LF")),
                (State::Trailer, b'\r') => State::TrailerLf,
                (State::TrailerStart | State::Trailer, _) => State::Trailer,
                (State::TrailerLf, b'\n') => State::TrailerStart,
                (State::TrailerLf, _) => return Err(ParseError::invalid_body("invalid trailer end LF")),

                (State::EndLf, b'\n') => State::Done,
                (State::EndLf, _) => return Err(ParseError::invalid_body("invalid chunk end LF")),

                (State::Data | State::Done, _) => unreachable!("data and done states are handled before reading a byte"),
            };
        }
    }
}
