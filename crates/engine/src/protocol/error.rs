use std::error::Error;
use std::io;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// Boxed error type returned by dispatchers and error handlers.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Top-level error of a single connection.
///
/// Every variant is resolved locally to the connection: [`HttpError::status_code`] gives the
/// status of the error response written before the transport is closed, and
/// [`HttpError::can_respond`] tells whether writing such a response is still possible.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("no complete request received within {0:?}")]
    RequestTimeout(Duration),

    #[error("no response produced within {0:?}")]
    ResponseTimeout(Duration),

    #[error("unsupported expectation: {expectation}")]
    ExpectationFailed { expectation: String },

    #[error("handler error: {source}")]
    HandlerError { source: BoxError },

    #[error("handler panicked: {reason}")]
    HandlerPanic { reason: String },

    #[error("connection closed by peer")]
    PeerClosed,
}

impl HttpError {
    pub fn expectation_failed<S: ToString>(expectation: S) -> Self {
        Self::ExpectationFailed { expectation: expectation.to_string() }
    }

    pub fn handler<E: Into<BoxError>>(e: E) -> Self {
        Self::HandlerError { source: e.into() }
    }

    pub fn handler_panic<S: ToString>(reason: S) -> Self {
        Self::HandlerPanic { reason: reason.to_string() }
    }

    /// The status of the error response for this error.
    ///
    /// A peer that went away is never answered, it reports `500` like the other server-side failures.
    pub fn status_code(&self) -> StatusCode {
        match self {
            HttpError::RequestError { source } => source.status_code(),
            HttpError::RequestTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            HttpError::ResponseTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            HttpError::ExpectationFailed { .. } => StatusCode::EXPECTATION_FAILED,
            HttpError::PeerClosed | HttpError::ResponseError { .. } | HttpError::HandlerError { .. } | HttpError::HandlerPanic { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns false when the transport itself failed or went away, so no error response can be written.
    pub fn can_respond(&self) -> bool {
        !matches!(
            self,
            HttpError::PeerClosed | HttpError::RequestError { source: ParseError::Io { .. } } | HttpError::ResponseError { source: SendError::Io { .. } }
        )
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header field {name} too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeaderField { name: String, current_size: usize, max_size: usize },

    #[error("payload too large, current: {current_size} exceed the limit {max_size}")]
    TooLargePayload { current_size: u64, max_size: u64 },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid transfer-encoding header: {reason}")]
    InvalidTransferEncoding { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_large_header_field<S: ToString>(name: S, current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeaderField { name: name.to_string(), current_size, max_size }
    }

    pub fn too_large_payload(current_size: u64, max_size: u64) -> Self {
        Self::TooLargePayload { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn invalid_transfer_encoding<S: ToString>(str: S) -> Self {
        Self::InvalidTransferEncoding { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Size violations of the head or the payload are reported as `413`, every other malformed input as `400`.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ParseError::TooLargeHeader { .. } | ParseError::TooLargeHeaderField { .. } | ParseError::TooLargePayload { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
