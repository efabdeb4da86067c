//! HTTP request header handling implementation.
//!
//! [`RequestHeader`] wraps `http::Request<()>` and is assembled from parser events by
//! [`RequestHeadBuilder`]. It also answers the per-request protocol questions the connection
//! asks: keep-alive semantics and the presence of an `Expect` header.

use http::header::{CONNECTION, EXPECT};
use http::request::Parts;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri, Version};

use crate::protocol::{ParseError, RequestLine};

/// Represents an HTTP request header.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    /// Consumes the header and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body to this header, converting it into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|_| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether the request itself permits reusing the connection.
    ///
    /// `Connection: close` always forbids it. HTTP/1.0 requires an explicit
    /// `Connection: keep-alive`, HTTP/1.1 allows it unless told otherwise.
    pub fn is_keep_alive(&self) -> bool {
        if self.has_connection_token("close") {
            return false;
        }

        match self.version() {
            Version::HTTP_11 => true,
            _ => self.has_connection_token("keep-alive"),
        }
    }

    /// Returns the raw `Expect` header value, if any.
    pub fn expect(&self) -> Option<&HeaderValue> {
        self.headers().get(EXPECT)
    }

    fn has_connection_token(&self, token: &str) -> bool {
        self.headers()
            .get_all(CONNECTION)
            .iter()
            .flat_map(|value| value.as_bytes().split(|b| *b == b','))
            .any(|item| item.trim_ascii().eq_ignore_ascii_case(token.as_bytes()))
    }
}

/// Converts request parts into a RequestHeader.
impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

/// Converts a bodyless request into a RequestHeader.
impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

/// Assembles a [`RequestHeader`] from `Url` and `Header` events.
#[derive(Debug, Default)]
pub struct RequestHeadBuilder {
    line: Option<RequestLine>,
    headers: HeaderMap,
}

impl RequestHeadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_line(&mut self, line: RequestLine) {
        self.line = Some(line);
    }

    pub fn header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    /// Finishes the head once `HeadersComplete` was seen.
    pub fn build(self) -> Result<RequestHeader, ParseError> {
        let RequestLine { method, uri, version } = self.line.ok_or(ParseError::InvalidUri)?;

        let mut request = Request::new(());
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.version_mut() = version;
        *request.headers_mut() = self.headers;

        Ok(RequestHeader::from(request))
    }
}
