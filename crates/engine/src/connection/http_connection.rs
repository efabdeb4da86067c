use std::any::Any;
use std::collections::VecDeque;
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::FutureExt;
use http::header::CONNECTION;
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode, Version};
use http_body::Body;
use http_body_util::{BodyExt, Full};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::codec::RequestParser;
use crate::connection::config::ConnectionConfig;
use crate::connection::message_writer::MessageWriter;
use crate::connection::registry::{ConnectionRegistry, Registration};
use crate::connection::timer::{TimerKind, Timers};
use crate::handler::{Dispatcher, ErrorHandler};
use crate::protocol::body::{ReqBody, StreamSender, stream_buffer};
use crate::protocol::{
    BoxError, Event, HttpError, Message, ParseError, PayloadItem, RequestHeadBuilder, RequestHeader, ResponseFraming, ResponseHead,
    SendError, status_has_body,
};

/// Buffered response bytes are pushed to the transport once they pass this size.
const FLUSH_THRESHOLD: usize = 64 * 1024;

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Lifecycle of a connection, one request at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    ParsingHeaders,
    BodyBuffering,
    BodyStreaming,
    Dispatching,
    WritingResponse,
    IdleKeepAlive,
    Closed,
}

impl ConnectionState {
    fn is_idle(self) -> bool {
        matches!(self, ConnectionState::Idle | ConnectionState::IdleKeepAlive)
    }
}

/// What the connection reacts to next.
#[derive(Debug)]
enum Input {
    Event(Event),
    /// the peer closed its sending side
    Eof,
    /// the stop signal fired while no request was in flight
    Stopped,
    Timeout(TimerKind),
}

enum Outcome {
    KeepAlive,
    Close,
}

/// Drives one HTTP/1.1 connection: parses requests, dispatches them and writes the responses.
///
/// Requests are served strictly one after another. Between requests the connection idles under
/// the keep-alive timeout, while a request is in flight the request timeout and then the response
/// timeout apply. Every failure is answered with an error response where the transport still
/// allows it, after which the connection is closed.
///
/// # Type Parameters
///
/// * `R`: the read half of the transport
/// * `W`: the write half of the transport
pub struct HttpConnection<R, W> {
    reader: R,
    writer: MessageWriter<W>,
    parser: RequestParser,
    events: VecDeque<Event>,
    timers: Timers,
    config: ConnectionConfig,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    registration: Option<Registration>,
    stop: CancellationToken,
    state: ConnectionState,
    keep_alive: bool,
    version: Version,
    head_request: bool,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, config: ConnectionConfig) -> Self {
        Self {
            reader,
            writer: MessageWriter::with_capacity(writer, config.read_buffer_size()),
            parser: RequestParser::new(config.parser_limits()),
            events: VecDeque::new(),
            timers: Timers::new(),
            config,
            error_handler: None,
            registration: None,
            stop: CancellationToken::new(),
            state: ConnectionState::Idle,
            keep_alive: false,
            version: Version::HTTP_11,
            head_request: false,
        }
    }

    pub fn with_error_handler(mut self, error_handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(error_handler);
        self
    }

    /// Registers the connection in `registry` until it is closed, and follows its shutdown signal.
    pub fn with_registry(mut self, registry: &Arc<ConnectionRegistry>) -> Self {
        let registration = registry.register();
        self.stop = registration.token().clone();
        self.registration = Some(registration);
        self
    }

    /// Once `stop` is cancelled, the connection finishes its in-flight request and closes.
    pub fn with_stop_signal(mut self, stop: CancellationToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Serves requests until the connection closes.
    ///
    /// Returns `Ok(())` when the connection ended cleanly: the peer went away, keep-alive was not
    /// negotiated, the keep-alive timeout expired, or the stop signal fired. Any other failure is
    /// returned after its error response was written.
    pub async fn process<D>(mut self, dispatcher: Arc<D>) -> Result<(), HttpError>
    where
        D: Dispatcher,
    {
        let id = self.registration.as_ref().map(Registration::id);
        debug!(?id, "start serving connection");
        self.timers.schedule(TimerKind::Request, self.config.request_timeout());

        let result = loop {
            match self.serve_request(&dispatcher).await {
                Ok(Outcome::KeepAlive) => self.enter_keep_alive(),
                Ok(Outcome::Close) => break Ok(()),
                Err(HttpError::PeerClosed) => {
                    info!(?id, "peer closed the connection");
                    break Ok(());
                }
                Err(e) => {
                    if e.can_respond() && !self.writer.response_started() {
                        self.write_error(&e).await;
                    } else {
                        warn!(cause = %e, "response already started or transport gone, closing without error response");
                    }
                    break Err(e);
                }
            }
        };

        self.close().await;
        result
    }

    async fn serve_request<D>(&mut self, dispatcher: &Arc<D>) -> Result<Outcome, HttpError>
    where
        D: Dispatcher,
    {
        let Some(header) = self.read_head().await? else {
            return Ok(Outcome::Close);
        };

        self.version = header.version();
        self.head_request = header.method() == Method::HEAD;
        self.keep_alive = self.config.keep_alive() && header.is_keep_alive();
        self.handle_expect(&header).await?;

        let response = if dispatcher.is_streaming(&header) {
            self.dispatch_streaming(header, dispatcher).await?
        } else {
            self.dispatch_buffered(header, dispatcher).await?
        };

        self.write_response(response).await?;
        Ok(if self.keep_alive { Outcome::KeepAlive } else { Outcome::Close })
    }

    /// Collects the head of the next request. `None` means the connection should close quietly.
    async fn read_head(&mut self) -> Result<Option<RequestHeader>, HttpError> {
        let mut builder = RequestHeadBuilder::new();
        loop {
            match self.next_input().await? {
                Input::Event(Event::Url(line)) => builder.request_line(line),
                Input::Event(Event::Header(name, value)) => builder.header(name, value),
                Input::Event(Event::HeadersComplete) => return Ok(Some(builder.build()?)),
                Input::Event(event) => return Err(ParseError::invalid_header(format!("unexpected {event:?} in request head")).into()),
                Input::Eof if self.state.is_idle() => return Ok(None),
                Input::Eof => return Err(HttpError::PeerClosed),
                Input::Stopped => {
                    info!("stop signal received while idle, closing connection");
                    return Ok(None);
                }
                Input::Timeout(TimerKind::KeepAlive) => {
                    debug!("keep-alive timeout expired, closing connection");
                    return Ok(None);
                }
                Input::Timeout(kind) => return Err(self.timeout_error(kind)),
            }
        }
    }

    async fn handle_expect(&mut self, header: &RequestHeader) -> Result<(), HttpError> {
        let Some(expect) = header.expect() else {
            return Ok(());
        };

        if !expect.as_bytes().eq_ignore_ascii_case(b"100-continue") {
            return Err(HttpError::expectation_failed(String::from_utf8_lossy(expect.as_bytes())));
        }

        // HTTP/1.0 clients don't know interim responses
        if header.version() == Version::HTTP_11 {
            self.writer.write_interim(CONTINUE).await?;
            info!("receive expect request header, sent continue response");
        }
        Ok(())
    }

    async fn dispatch_buffered<D>(&mut self, header: RequestHeader, dispatcher: &Arc<D>) -> Result<Response<D::RespBody>, HttpError>
    where
        D: Dispatcher,
    {
        self.transition(ConnectionState::BodyBuffering);

        let mut body = BytesMut::new();
        loop {
            match self.next_input().await? {
                Input::Event(Event::Body(bytes)) => body.extend_from_slice(&bytes),
                Input::Event(Event::MessageComplete) => break,
                input => return Err(self.body_interrupted(input)),
            }
        }
        self.on_message_complete();

        let request = header.body(ReqBody::full(body.freeze()));
        let response = AssertUnwindSafe(dispatcher.dispatch(request)).catch_unwind();
        self.await_response(response).await
    }

    async fn dispatch_streaming<D>(&mut self, header: RequestHeader, dispatcher: &Arc<D>) -> Result<Response<D::RespBody>, HttpError>
    where
        D: Dispatcher,
    {
        self.transition(ConnectionState::BodyStreaming);

        let (sender, receiver) = stream_buffer(self.config.stream_buffer_capacity());
        let request = header.body(ReqBody::stream(receiver));
        let response = AssertUnwindSafe(dispatcher.dispatch(request)).catch_unwind();
        tokio::pin!(response);

        // the dispatcher runs while the body is still arriving
        let early = select! {
            biased;
            result = &mut response => Some(result),
            result = self.stream_body(&sender) => {
                result?;
                None
            }
        };

        match early {
            Some(result) => {
                drop(sender);
                self.skip_body().await?;
                self.timers.cancel(TimerKind::Response);
                flatten_response(result)
            }
            None => self.await_response(response).await,
        }
    }

    /// Moves body chunks into the stream buffer, pausing reads while it is full.
    async fn stream_body(&mut self, sender: &StreamSender) -> Result<(), HttpError> {
        loop {
            match self.next_input().await? {
                Input::Event(Event::Body(bytes)) => self.push_chunk(sender, PayloadItem::Chunk(bytes)).await?,
                Input::Event(Event::MessageComplete) => {
                    self.on_message_complete();
                    return self.push_chunk(sender, PayloadItem::Eof).await;
                }
                input => return Err(self.body_interrupted(input)),
            }
        }
    }

    async fn push_chunk(&mut self, sender: &StreamSender, item: PayloadItem) -> Result<(), HttpError> {
        if sender.is_full() {
            trace!("stream buffer full, pause reading");
        }

        let send = sender.send(item);
        tokio::pin!(send);
        loop {
            select! {
                biased;
                result = &mut send => {
                    if result.is_err() {
                        trace!("request body receiver dropped, discarding chunk");
                    }
                    return Ok(());
                }
                handle = self.timers.fired() => {
                    if self.timers.is_current(handle) {
                        return Err(self.timeout_error(handle.kind()));
                    }
                }
            }
        }
    }

    /// Discards what is left of a request body nobody will read.
    async fn skip_body(&mut self) -> Result<(), HttpError> {
        let mut skipped = 0;
        while self.state != ConnectionState::Dispatching {
            match self.next_input().await? {
                Input::Event(Event::Body(bytes)) => skipped += bytes.len(),
                Input::Event(Event::MessageComplete) => self.on_message_complete(),
                input => return Err(self.body_interrupted(input)),
            }
        }

        if skipped > 0 {
            info!(skipped, "dispatcher answered before reading the whole body, skipped the rest");
        }
        Ok(())
    }

    /// Waits for the dispatcher under the response timeout.
    ///
    /// The transport keeps being read so a disconnect cancels the dispatcher. Bytes received
    /// meanwhile belong to the next request and stay buffered, up to the request size limit.
    async fn await_response<F, B, E>(&mut self, response: F) -> Result<Response<B>, HttpError>
    where
        F: Future<Output = Result<Result<Response<B>, E>, Box<dyn Any + Send>>>,
        E: Into<BoxError>,
    {
        tokio::pin!(response);

        loop {
            let can_read = self.parser.buffered_len() < self.config.request_max_size();
            select! {
                biased;
                result = &mut response => {
                    self.timers.cancel(TimerKind::Response);
                    return flatten_response(result);
                }
                handle = self.timers.fired() => {
                    if self.timers.is_current(handle) {
                        return Err(self.timeout_error(handle.kind()));
                    }
                }
                result = self.reader.read_buf(self.parser.read_buf()), if can_read => {
                    let n = result.map_err(ParseError::io)?;
                    if n == 0 {
                        return Err(HttpError::PeerClosed);
                    }
                }
            }
        }
    }

    async fn write_response<B>(&mut self, response: Response<B>) -> Result<(), HttpError>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Display,
    {
        self.transition(ConnectionState::WritingResponse);
        if self.stop.is_cancelled() {
            self.keep_alive = false;
        }

        let (parts, mut body) = response.into_parts();
        let mut head = ResponseHead::from_parts(parts, ());
        let size = body.size_hint().exact().or_else(|| declared_length(head.headers()));

        let framing = if !status_has_body(head.status()) {
            ResponseFraming::HeadOnly(None)
        } else if self.head_request {
            ResponseFraming::HeadOnly(size)
        } else {
            match size {
                Some(length) => ResponseFraming::Length(length),
                None if self.version == Version::HTTP_11 => ResponseFraming::Chunked,
                None => {
                    self.keep_alive = false;
                    ResponseFraming::UntilClose
                }
            }
        };

        let connection = if self.keep_alive { HeaderValue::from_static("keep-alive") } else { HeaderValue::from_static("close") };
        head.headers_mut().insert(CONNECTION, connection);
        *head.version_mut() = Version::HTTP_11;

        self.writer.write(Message::<_, Bytes>::Header((head, framing)))?;

        if framing.has_body() {
            loop {
                match body.frame().await {
                    Some(Ok(frame)) => {
                        // trailers are not sent
                        let Ok(data) = frame.into_data() else { continue };
                        self.writer.write(Message::Payload(PayloadItem::Chunk(data)))?;
                        if framing.is_streamed() || self.writer.buffered_len() >= FLUSH_THRESHOLD {
                            self.writer.flush().await?;
                        }
                    }
                    Some(Err(e)) => return Err(SendError::invalid_body(format!("resolve response body error: {e}")).into()),
                    None => {
                        self.writer.write(Message::<_, Bytes>::Payload(PayloadItem::Eof))?;
                        break;
                    }
                }
            }
        }

        self.writer.flush().await?;
        self.writer.clear_buf();
        Ok(())
    }

    /// Writes the error response for `error`. Failures while doing so are only logged.
    async fn write_error(&mut self, error: &HttpError) {
        let status = error.status_code();
        error!(cause = %error, status = status.as_u16(), "request failed, sending error response");

        self.keep_alive = false;
        self.timers.cancel_all();
        self.writer.clear_buf();

        let response = match &self.error_handler {
            Some(handler) => match std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle(error))) {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    error!(cause = %e, "error handler failed, falling back to bare 500");
                    status_response(StatusCode::INTERNAL_SERVER_ERROR)
                }
                Err(panic) => {
                    error!(reason = %panic_reason(panic.as_ref()), "error handler panicked, falling back to bare 500");
                    status_response(StatusCode::INTERNAL_SERVER_ERROR)
                }
            },
            None => status_response(status),
        };

        if let Err(e) = self.write_response(response).await {
            warn!(cause = %e, "failed to write error response");
        }
    }

    async fn next_input(&mut self) -> Result<Input, HttpError> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Ok(Input::Event(event));
            }

            let events = self.parser.parse()?;
            if !events.is_empty() {
                self.events.extend(events);
                continue;
            }

            let idle = self.state.is_idle();
            select! {
                biased;
                _ = self.stop.cancelled(), if idle => return Ok(Input::Stopped),
                handle = self.timers.fired() => {
                    if self.timers.is_current(handle) {
                        return Ok(Input::Timeout(handle.kind()));
                    }
                }
                result = self.reader.read_buf(self.parser.read_buf()) => {
                    let n = result.map_err(ParseError::io)?;
                    if n == 0 {
                        return Ok(Input::Eof);
                    }
                    self.on_bytes();
                }
            }
        }
    }

    /// Empty lines between requests leave an idle connection idle.
    fn on_bytes(&mut self) {
        if self.state.is_idle() && self.parser.has_pending_request() {
            self.begin_request();
        }
    }

    fn begin_request(&mut self) {
        self.timers.cancel(TimerKind::KeepAlive);
        self.timers.schedule(TimerKind::Request, self.config.request_timeout());
        self.version = Version::HTTP_11;
        self.head_request = false;
        self.transition(ConnectionState::ParsingHeaders);
    }

    fn on_message_complete(&mut self) {
        self.timers.cancel(TimerKind::Request);
        self.timers.schedule(TimerKind::Response, self.config.response_timeout());
        self.transition(ConnectionState::Dispatching);
    }

    fn enter_keep_alive(&mut self) {
        self.transition(ConnectionState::IdleKeepAlive);
        self.timers.schedule(TimerKind::KeepAlive, self.config.keep_alive_timeout());

        // a pipelined request is already waiting
        if self.parser.has_pending_request() {
            self.begin_request();
        }
    }

    async fn close(&mut self) {
        self.timers.cancel_all();
        if let Err(e) = self.writer.shutdown().await {
            debug!(cause = %e, "failed to shutdown transport");
        }
        self.transition(ConnectionState::Closed);
    }

    fn body_interrupted(&self, input: Input) -> HttpError {
        match input {
            Input::Timeout(kind) => self.timeout_error(kind),
            Input::Eof | Input::Stopped => HttpError::PeerClosed,
            Input::Event(event) => ParseError::invalid_body(format!("unexpected {event:?} in request body")).into(),
        }
    }

    fn timeout_error(&self, kind: TimerKind) -> HttpError {
        warn!(timer = %kind, state = ?self.state, "timer expired");
        match kind {
            TimerKind::Response => HttpError::ResponseTimeout(self.config.response_timeout()),
            TimerKind::Request | TimerKind::KeepAlive => HttpError::RequestTimeout(self.config.request_timeout()),
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "connection state changed");
            self.state = next;
        }
    }
}

fn flatten_response<B, E>(result: Result<Result<Response<B>, E>, Box<dyn Any + Send>>) -> Result<Response<B>, HttpError>
where
    E: Into<BoxError>,
{
    match result {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(HttpError::handler(e)),
        Err(panic) => Err(HttpError::handler_panic(panic_reason(panic.as_ref()))),
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> &str {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        reason
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        reason.as_str()
    } else {
        "unknown panic"
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(http::header::CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
}

fn status_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
