//! Collaborators the connection calls into.
//!
//! - [`Dispatcher`]: maps a request to a response. Closures become dispatchers through
//!   [`make_dispatcher`], or [`make_streaming_dispatcher`] when the handler wants to consume the
//!   request body while it is still arriving.
//! - [`ErrorHandler`]: renders the response for a failed request. [`TextErrorHandler`] is a
//!   ready-made implementation.

use std::fmt::Display;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response};
use http_body::Body;
use http_body_util::Full;

use crate::protocol::body::ReqBody;
use crate::protocol::{BoxError, HttpError, RequestHeader};

#[async_trait]
pub trait Dispatcher: Send + Sync {
    type RespBody: Body<Data = Bytes, Error: Display> + Send + Unpin;
    type Error: Into<BoxError> + Send;

    /// Whether the request body should be streamed to [`Dispatcher::dispatch`].
    ///
    /// Asked once per request, right after its head is parsed. When true the dispatcher runs
    /// before the body is complete and reads it through a bounded buffer, otherwise it runs
    /// once the whole body has been received.
    fn is_streaming(&self, _header: &RequestHeader) -> bool {
        false
    }

    async fn dispatch(&self, request: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error>;
}

#[derive(Debug)]
pub struct DispatcherFn<F> {
    f: F,
    streaming: bool,
}

#[async_trait]
impl<F, Fut, RespBody, Err> Dispatcher for DispatcherFn<F>
where
    F: Fn(Request<ReqBody>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<RespBody>, Err>> + Send + 'static,
    RespBody: Body<Data = Bytes, Error: Display> + Send + Unpin + 'static,
    Err: Into<BoxError> + Send + 'static,
{
    type RespBody = RespBody;
    type Error = Err;

    fn is_streaming(&self, _header: &RequestHeader) -> bool {
        self.streaming
    }

    async fn dispatch(&self, request: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error> {
        (self.f)(request).await
    }
}

/// Wraps an async function into a [`Dispatcher`] that receives fully buffered bodies.
pub fn make_dispatcher<F, Fut, RespBody, Err>(f: F) -> DispatcherFn<F>
where
    F: Fn(Request<ReqBody>) -> Fut,
    Fut: Future<Output = Result<Response<RespBody>, Err>>,
{
    DispatcherFn { f, streaming: false }
}

/// Wraps an async function into a [`Dispatcher`] that receives the body while it is still arriving.
pub fn make_streaming_dispatcher<F, Fut, RespBody, Err>(f: F) -> DispatcherFn<F>
where
    F: Fn(Request<ReqBody>) -> Fut,
    Fut: Future<Output = Result<Response<RespBody>, Err>>,
{
    DispatcherFn { f, streaming: true }
}

/// Renders the response sent for a failed request.
///
/// Returning an error, or panicking, makes the connection fall back to a bare `500`.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, error: &HttpError) -> Result<Response<Full<Bytes>>, BoxError>;
}

impl<F> ErrorHandler for F
where
    F: Fn(&HttpError) -> Result<Response<Full<Bytes>>, BoxError> + Send + Sync,
{
    fn handle(&self, error: &HttpError) -> Result<Response<Full<Bytes>>, BoxError> {
        self(error)
    }
}

/// Answers with `"<code> <reason>"` as `text/plain`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextErrorHandler;

impl ErrorHandler for TextErrorHandler {
    fn handle(&self, error: &HttpError) -> Result<Response<Full<Bytes>>, BoxError> {
        let status = error.status_code();
        let text = format!("{} {}", status.as_str(), status.canonical_reason().unwrap_or("Unknown"));

        let response = Response::builder()
            .status(status)
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))
            .body(Full::new(Bytes::from(text)))?;
        Ok(response)
    }
}
