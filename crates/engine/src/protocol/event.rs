//! Wire events produced by the request parser.
//!
//! The parser turns raw bytes into an ordered sequence of [`Event`]s, one logical message at
//! a time: a [`Event::Url`] carrying the request line, one [`Event::Header`] per header field,
//! [`Event::HeadersComplete`], zero or more [`Event::Body`] chunks, and finally
//! [`Event::MessageComplete`].

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, Uri, Version};

/// The parsed start line of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The request target, together with the method and version of the start line
    Url(RequestLine),
    Header(HeaderName, HeaderValue),
    HeadersComplete,
    Body(Bytes),
    MessageComplete,
}
