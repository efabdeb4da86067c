//! Incremental request parser.
//!
//! [`RequestParser`] owns the receive buffer of a connection. Bytes are appended with
//! [`RequestParser::feed`] (or read directly into [`RequestParser::read_buf`]) and
//! [`RequestParser::parse`] turns whatever is buffered into wire [`Event`]s.
//!
//! The parser stops right after a [`Event::MessageComplete`]. Bytes of a pipelined request
//! that follow stay buffered and are only parsed on the next call, so the connection finishes
//! one request before it looks at the next.
//!
//! ```
//! use h1_engine::codec::RequestParser;
//! use h1_engine::protocol::Event;
//!
//! let mut parser = RequestParser::default();
//! let events = parser.feed(b"GET / HTTP/1.1\r\nHost: a\r\n\r\nGET /next HTTP/1.1\r\n").unwrap();
//! assert_eq!(events.len(), 4);
//! assert_eq!(events.last(), Some(&Event::MessageComplete));
//! assert!(parser.buffered_len() > 0);
//! ```

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::{HeaderDecoder, ParserLimits};
use crate::ensure;
use crate::protocol::{Event, ParseError, PayloadItem, RequestLine};

const INIT_BUFFER_SIZE: usize = 8 * 1024;

/// The two phases of a request: the head is decoded while `payload_decoder` is `None`,
/// the body while it is `Some`.
#[derive(Debug)]
pub struct RequestParser {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
    buffer: BytesMut,
    /// bytes of the current message already turned into events
    consumed: usize,
}

impl RequestParser {
    pub fn new(limits: ParserLimits) -> Self {
        Self {
            header_decoder: HeaderDecoder::new(limits),
            payload_decoder: None,
            buffer: BytesMut::with_capacity(INIT_BUFFER_SIZE),
            consumed: 0,
        }
    }

    pub fn limits(&self) -> &ParserLimits {
        self.header_decoder.limits()
    }

    /// Appends `chunk` to the buffer and parses as far as possible.
    ///
    /// Returns the events of at most one message. Malformed input yields an error, after
    /// which the parser should not be used again.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Event>, ParseError> {
        self.buffer.extend_from_slice(chunk);
        self.parse()
    }

    /// Parses the buffered bytes without adding any.
    ///
    /// A message may occupy at most [`ParserLimits::max_message_bytes`] on the wire. Only the
    /// bytes of that message count: a pipelined request buffered behind it starts from zero.
    pub fn parse(&mut self) -> Result<Vec<Event>, ParseError> {
        let mut events = Vec::new();

        loop {
            match &mut self.payload_decoder {
                None => {
                    self.skip_empty_lines();
                    let head_start = self.buffer.len();
                    let Some((header, payload_size)) = self.header_decoder.decode(&mut self.buffer)? else {
                        break;
                    };
                    self.consumed = head_start - self.buffer.len();

                    trace!(?payload_size, "parsed request head");
                    let (parts, ()) = header.into_inner().into_parts();
                    events.push(Event::Url(RequestLine { method: parts.method, uri: parts.uri, version: parts.version }));

                    let mut name = None;
                    for (key, value) in parts.headers {
                        // the HeaderMap yields the name only for the first value of a key
                        if key.is_some() {
                            name = key;
                        }
                        if let Some(name) = &name {
                            events.push(Event::Header(name.clone(), value));
                        }
                    }

                    events.push(Event::HeadersComplete);
                    self.payload_decoder = Some(payload_size.into());
                }

                Some(payload_decoder) => {
                    let before = self.buffer.len();
                    let item = payload_decoder.decode(&mut self.buffer)?;
                    self.consumed += before - self.buffer.len();
                    match item {
                        Some(PayloadItem::Chunk(bytes)) => events.push(Event::Body(bytes)),
                        Some(PayloadItem::Eof) => {
                            self.check_message_size(self.consumed)?;
                            self.payload_decoder = None;
                            self.consumed = 0;
                            events.push(Event::MessageComplete);
                            // a finished message stops the parser until the next call
                            return Ok(events);
                        }
                        None => break,
                    }
                }
            }
        }

        // parsing stopped for lack of input, so every buffered byte belongs to the current message
        self.check_message_size(self.consumed + self.buffer.len())?;
        Ok(events)
    }

    /// Drops the empty lines a client may send between requests.
    fn skip_empty_lines(&mut self) {
        let blank = self.buffer.iter().take_while(|b| matches!(b, b'\r' | b'\n')).count();
        if blank > 0 {
            self.buffer.advance(blank);
        }
    }

    fn check_message_size(&self, size: usize) -> Result<(), ParseError> {
        let max_size = self.limits().max_message_bytes;
        ensure!(size <= max_size, ParseError::too_large_payload(size as u64, max_size as u64));
        Ok(())
    }

    /// Returns true once bytes of a request, not just empty lines, have been received.
    pub fn has_pending_request(&self) -> bool {
        self.payload_decoder.is_some() || self.buffer.iter().any(|b| !matches!(b, b'\r' | b'\n'))
    }

    /// Number of received bytes not yet turned into events.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true between messages, when no head or body is partially parsed.
    pub fn is_idle(&self) -> bool {
        self.payload_decoder.is_none() && self.buffer.is_empty()
    }

    /// The receive buffer, for reading straight from the transport.
    pub(crate) fn read_buf(&mut self) -> &mut BytesMut {
        if self.buffer.capacity() == self.buffer.len() {
            self.buffer.reserve(INIT_BUFFER_SIZE);
        }
        &mut self.buffer
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new(ParserLimits::default())
    }
}
