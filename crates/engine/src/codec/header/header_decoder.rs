//! HTTP header decoder implementation for parsing HTTP request heads
//!
//! This module decodes the start line and header fields of a request from raw bytes using
//! `httparse`, and determines how the request body is delimited.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum size of the whole head: [`ParserLimits::max_header_bytes`]
//! - Maximum size of one header name plus value: [`ParserLimits::max_header_field_bytes`]
//! - Maximum `Content-Length`: [`ParserLimits::max_payload_size`]
//! - Only HTTP/1.0 and HTTP/1.1 are accepted
//!
//! # Implementation Details
//!
//! The header bytes are split off the source buffer once and every header value is a cheap
//! slice of that shared buffer. Header positions are recorded as byte ranges while the
//! `httparse` borrow is alive, then resolved against the frozen buffer.

use bytes::BytesMut;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri, Version};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, RequestHeader};

/// Maximum number of headers allowed in a request
pub const MAX_HEADER_NUM: usize = 64;

/// Size limits enforced while parsing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserLimits {
    /// Maximum size in bytes of the entire head (start line and all headers)
    pub max_header_bytes: usize,
    /// Maximum size in bytes of one header name plus its value
    pub max_header_field_bytes: usize,
    /// Largest `Content-Length` accepted
    pub max_payload_size: u64,
    /// Maximum number of bytes one request may occupy on the wire, head and body together
    pub max_message_bytes: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self { max_header_bytes: 8 * 1024, max_header_field_bytes: 4 * 1024, max_payload_size: 100_000_000, max_message_bytes: 100_000_000 }
    }
}

/// Decoder for HTTP request heads implementing the [`Decoder`] trait.
///
/// This decoder parses raw bytes into a structured [`RequestHeader`] and determines the
/// [`PayloadSize`] of the body from the Content-Length and Transfer-Encoding headers.
#[derive(Debug, Clone, Default)]
pub struct HeaderDecoder {
    limits: ParserLimits,
}

impl HeaderDecoder {
    pub fn new(limits: ParserLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ParserLimits {
        &self.limits
    }
}

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    /// Attempts to decode a request head from the provided bytes buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((header, payload_size)))` if a complete head was parsed, the head bytes are removed from `src`
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` if parsing failed or a limit was exceeded
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let max_header_bytes = self.limits.max_header_bytes;
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let parsed_result = req.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            Error::Version => ParseError::InvalidVersion(None),
            Error::Token => ParseError::InvalidMethod,
            e => ParseError::invalid_header(e.to_string()),
        });

        let body_offset = match parsed_result? {
            Status::Complete(body_offset) => body_offset,
            // If parsing incomplete, ensure current buffer size does not exceed limit
            Status::Partial => {
                ensure!(src.len() <= max_header_bytes, ParseError::too_large_header(src.len(), max_header_bytes));
                return Ok(None);
            }
        };

        trace!(head_size = body_offset, "parsed request head");
        ensure!(body_offset <= max_header_bytes, ParseError::too_large_header(body_offset, max_header_bytes));

        let version = match req.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            // Currently HTTP/2 and HTTP/3 not supported
            v => return Err(ParseError::InvalidVersion(v)),
        };
        let method = Method::from_bytes(req.method.ok_or(ParseError::InvalidMethod)?.as_bytes()).map_err(|_e| ParseError::InvalidMethod)?;
        let uri = req.path.ok_or(ParseError::InvalidUri)?.parse::<Uri>().map_err(|_e| ParseError::InvalidUri)?;

        // Calculate and record byte range indices for each header
        let header_count = req.headers.len();
        let mut header_index = [HeaderIndex::EMPTY; MAX_HEADER_NUM];
        HeaderIndex::record(src, req.headers, &mut header_index);

        let max_field_bytes = self.limits.max_header_field_bytes;
        let header_bytes = src.split_to(body_offset).freeze();
        let mut header_map = HeaderMap::with_capacity(header_count);
        for index in &header_index[..header_count] {
            let name_bytes = &header_bytes[index.name.0..index.name.1];
            let field_size = (index.name.1 - index.name.0) + (index.value.1 - index.value.0);
            ensure!(
                field_size <= max_field_bytes,
                ParseError::too_large_header_field(String::from_utf8_lossy(name_bytes), field_size, max_field_bytes)
            );

            let name = HeaderName::from_bytes(name_bytes).map_err(ParseError::invalid_header)?;
            let value =
                HeaderValue::from_maybe_shared(header_bytes.slice(index.value.0..index.value.1)).map_err(ParseError::invalid_header)?;
            header_map.append(name, value);
        }

        let mut request = Request::new(());
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.version_mut() = version;
        *request.headers_mut() = header_map;

        let header = RequestHeader::from(request);
        let payload_size = parse_payload(&header, self.limits.max_payload_size)?;

        Ok(Some((header, payload_size)))
    }
}

/// Stores the byte range positions of a header's name and value within the original buffer.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

impl HeaderIndex {
    const EMPTY: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

    /// Records the byte positions of header names and values from the parsed headers.
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, indices) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            let name_end = name_start + header.name.len();
            indices.name = (name_start, name_end);
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            let value_end = value_start + header.value.len();
            indices.value = (value_start, value_end);
        }
    }
}

/// Determines how the request body is delimited.
///
/// refer: <https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length>
///
/// # Errors
///
/// Returns `ParseError` if:
/// - Both Content-Length and Transfer-Encoding headers are present
/// - Transfer-Encoding does not end with `chunked`
/// - Content-Length is invalid, repeated with different values, or exceeds `max_payload_size`
fn parse_payload(header: &RequestHeader, max_payload_size: u64) -> Result<PayloadSize, ParseError> {
    let te_header = header.headers().get(http::header::TRANSFER_ENCODING);
    let has_cl = header.headers().contains_key(http::header::CONTENT_LENGTH);

    match (te_header, has_cl) {
        (None, false) => Ok(PayloadSize::Empty),

        (Some(te_value), false) => {
            if is_chunked(Some(te_value)) {
                Ok(PayloadSize::Chunked)
            } else {
                Err(ParseError::invalid_transfer_encoding(format!("{te_value:?} does not end with chunked")))
            }
        }

        (None, true) => {
            let length = content_length(header.headers())?;
            ensure!(length <= max_payload_size, ParseError::too_large_payload(length, max_payload_size));

            if length == 0 { Ok(PayloadSize::Empty) } else { Ok(PayloadSize::Length(length)) }
        }

        (Some(_), true) => Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers")),
    }
}

/// Reads the Content-Length, rejecting values that disagree with each other.
fn content_length(headers: &HeaderMap) -> Result<u64, ParseError> {
    let mut length = None;
    for value in headers.get_all(http::header::CONTENT_LENGTH) {
        let cl_str = value.to_str().map_err(|_e| ParseError::invalid_content_length("value can't to_str"))?;
        for item in cl_str.split(',') {
            let parsed =
                item.trim().parse::<u64>().map_err(|_e| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;
            match length {
                Some(previous) if previous != parsed => {
                    return Err(ParseError::invalid_content_length(format!("conflicting values {previous} and {parsed}")));
                }
                _ => length = Some(parsed),
            }
        }
    }

    length.ok_or_else(|| ParseError::invalid_content_length("missing value"))
}

/// Checks if the Transfer-Encoding header indicates chunked encoding.
///
/// According to RFC 9112, chunked must be the last encoding if present.
fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    if let Some(value) = header_value
        && let Some(bytes) = value.as_bytes().rsplit(|b| *b == b',').next()
    {
        return bytes.trim_ascii().eq_ignore_ascii_case(CHUNKED);
    }
    false
}
