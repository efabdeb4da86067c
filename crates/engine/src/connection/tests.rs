use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::stream;
use http::{Request, Response, StatusCode};
use http_body::Frame;
use http_body_util::{BodyExt, Full, StreamBody};
use indoc::indoc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;

use crate::connection::{ConnectionConfig, ConnectionRegistry, ConnectionState, HttpConnection};
use crate::handler::{Dispatcher, ErrorHandler, TextErrorHandler, make_dispatcher, make_streaming_dispatcher};
use crate::protocol::body::ReqBody;
use crate::protocol::{BoxError, HttpError, ParseError};

type TestConnection = HttpConnection<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

fn connection(config: ConnectionConfig) -> (TestConnection, DuplexStream) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(server);
    (HttpConnection::new(reader, writer, config), client)
}

/// Sends `input`, then reads until the server closes the connection.
async fn exchange<D: Dispatcher>(connection: TestConnection, client: DuplexStream, dispatcher: D, input: &[u8]) -> (String, Result<(), HttpError>) {
    let (mut client_read, mut client_write) = tokio::io::split(client);

    let server = connection.process(Arc::new(dispatcher));
    let client = async {
        // the server may stop reading early, the rest of the input is then refused
        let _ = client_write.write_all(input).await;
        let mut output = Vec::new();
        client_read.read_to_end(&mut output).await.unwrap();
        String::from_utf8(output).unwrap()
    };

    let (result, output) = tokio::join!(server, client);
    (output, result)
}

async fn serve<D: Dispatcher>(dispatcher: D, input: &[u8]) -> (String, Result<(), HttpError>) {
    let (connection, client) = connection(ConnectionConfig::default());
    exchange(connection, client, dispatcher, input).await
}

fn ok(body: &str, connection: &str) -> String {
    format!("HTTP/1.1 200 OK\r\nconnection: {connection}\r\ncontent-length: {}\r\n\r\n{body}", body.len())
}

fn error_response(status: &str) -> String {
    format!("HTTP/1.1 {status}\r\nconnection: close\r\ncontent-length: 0\r\n\r\n")
}

async fn path(request: Request<ReqBody>) -> Result<Response<String>, BoxError> {
    Ok(Response::new(request.uri().path().to_string()))
}

async fn echo(request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
    let body = request.into_body().collect().await?.to_bytes();
    Ok(Response::new(Full::new(body)))
}

fn counting(calls: Arc<AtomicUsize>) -> impl Dispatcher {
    make_dispatcher(move |request: Request<ReqBody>| {
        calls.fetch_add(1, Ordering::SeqCst);
        path(request)
    })
}

#[tokio::test(start_paused = true)]
async fn simple_get() {
    let (output, result) = serve(make_dispatcher(|_request: Request<ReqBody>| async { Ok::<_, BoxError>(Response::new("OK".to_string())) }), b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n").await;

    assert_eq!(output, "HTTP/1.1 200 OK\r\nconnection: keep-alive\r\ncontent-length: 2\r\n\r\nOK");
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn connection_close_stops_after_first_response() {
    let calls = Arc::new(AtomicUsize::new(0));
    let input = indoc! {"
        GET /x HTTP/1.1\r
        Host: h\r
        Connection: close\r
        \r
        GET /y HTTP/1.1\r
        Host: h\r
        \r
    "};

    let (output, result) = serve(counting(calls.clone()), input.as_bytes()).await;

    assert_eq!(output, ok("/x", "close"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn idle_connection_gets_request_timeout() {
    let config = ConnectionConfig::builder().request_timeout(Duration::from_secs(1)).build().unwrap();
    let (connection, client) = connection(config);

    let (output, result) = exchange(connection, client, make_dispatcher(path), b"").await;

    assert_eq!(output, error_response("408 Request Timeout"));
    assert!(matches!(result, Err(HttpError::RequestTimeout(_))));
}

#[tokio::test(start_paused = true)]
async fn incomplete_body_gets_request_timeout() {
    let config = ConnectionConfig::builder().request_timeout(Duration::from_secs(1)).build().unwrap();
    let (connection, client) = connection(config);
    let calls = Arc::new(AtomicUsize::new(0));

    let input = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
    let (output, result) = exchange(connection, client, counting(calls.clone()), input).await;

    assert_eq!(output, error_response("408 Request Timeout"));
    assert!(matches!(result, Err(HttpError::RequestTimeout(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn pipelined_requests_answered_in_order() {
    let input = indoc! {"
        GET /a HTTP/1.1\r
        Host: h\r
        \r
        GET /b HTTP/1.1\r
        Host: h\r
        \r
        GET /c HTTP/1.1\r
        Host: h\r
        Connection: close\r
        \r
    "};

    let (output, result) = serve(make_dispatcher(path), input.as_bytes()).await;

    assert_eq!(output, [ok("/a", "keep-alive"), ok("/b", "keep-alive"), ok("/c", "close")].concat());
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn keep_alive_disabled() {
    let config = ConnectionConfig::builder().keep_alive(false).build().unwrap();
    let (connection, client) = connection(config);
    let calls = Arc::new(AtomicUsize::new(0));

    let input = b"GET /a HTTP/1.1\r\nHost: h\r\n\r\nGET /b HTTP/1.1\r\nHost: h\r\n\r\n";
    let (output, result) = exchange(connection, client, counting(calls.clone()), input).await;

    assert_eq!(output, ok("/a", "close"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn http10_keep_alive_must_be_requested() {
    let input = b"GET /a HTTP/1.0\r\nConnection: keep-alive\r\n\r\nGET /b HTTP/1.0\r\n\r\nGET /c HTTP/1.0\r\n\r\n";

    let (output, result) = serve(make_dispatcher(path), input).await;

    assert_eq!(output, [ok("/a", "keep-alive"), ok("/b", "close")].concat());
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn content_length_above_limit() {
    let config = ConnectionConfig::builder().request_max_size(64).build().unwrap();
    let (connection, client) = connection(config);
    let calls = Arc::new(AtomicUsize::new(0));

    let (output, result) = exchange(connection, client, counting(calls.clone()), b"POST / HTTP/1.1\r\nContent-Length: 100\r\n\r\n").await;

    assert!(output.starts_with("HTTP/1.1 413 "), "{output}");
    assert!(matches!(result, Err(HttpError::RequestError { source: ParseError::TooLargePayload { .. } })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn received_bytes_above_limit() {
    let config = ConnectionConfig::builder().request_max_size(64).build().unwrap();
    let (connection, client) = connection(config);
    let calls = Arc::new(AtomicUsize::new(0));

    let mut input = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    for _ in 0..1000 {
        input.extend_from_slice(b"20\r\naaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n");
    }

    let (output, result) = exchange(connection, client, counting(calls.clone()), &input).await;

    assert!(output.starts_with("HTTP/1.1 413 "), "{output}");
    assert!(output.contains("connection: close\r\n"));
    assert!(matches!(result, Err(HttpError::RequestError { source: ParseError::TooLargePayload { .. } })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn size_limit_applies_to_each_pipelined_request() {
    let config = ConnectionConfig::builder().request_max_size(64).build().unwrap();
    let (connection, client) = connection(config);
    let input = indoc! {"
        GET /a HTTP/1.1\r
        Host: h\r
        \r
        GET /b HTTP/1.1\r
        Host: h\r
        \r
        GET /c HTTP/1.1\r
        Host: h\r
        \r
        GET /d HTTP/1.1\r
        Host: h\r
        Connection: close\r
        \r
    "};
    assert!(input.len() > 64);

    let (output, result) = exchange(connection, client, make_dispatcher(path), input.as_bytes()).await;

    assert_eq!(output, [ok("/a", "keep-alive"), ok("/b", "keep-alive"), ok("/c", "keep-alive"), ok("/d", "close")].concat());
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn malformed_request_is_bad_request() {
    let (output, result) = serve(make_dispatcher(path), b"GET / HTTP/1.1\r\nbad header\r\n\r\n").await;

    assert_eq!(output, error_response("400 Bad Request"));
    assert!(matches!(result, Err(HttpError::RequestError { .. })));
}

#[tokio::test(start_paused = true)]
async fn buffered_body_reaches_dispatcher() {
    let input = indoc! {"
        POST /upload HTTP/1.1\r
        Content-Length: 11\r
        Connection: close\r
        \r
        hello world"};

    let (output, _) = serve(make_dispatcher(echo), input.as_bytes()).await;
    assert_eq!(output, ok("hello world", "close"));
}

#[tokio::test(start_paused = true)]
async fn streaming_body_with_backpressure() {
    let config = ConnectionConfig::builder().stream_buffer_capacity(1).build().unwrap();
    let (connection, client) = connection(config);

    let input = indoc! {"
        POST /upload HTTP/1.1\r
        Transfer-Encoding: chunked\r
        Connection: close\r
        \r
        5\r
        hello\r
        1\r
         \r
        5\r
        world\r
        0\r
        \r
    "};

    let (output, result) = exchange(connection, client, make_streaming_dispatcher(echo), input.as_bytes()).await;

    assert_eq!(output, ok("hello world", "close"));
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn unread_streaming_body_is_skipped() {
    let input = indoc! {"
        POST /first HTTP/1.1\r
        Content-Length: 10\r
        \r
        0123456789GET /second HTTP/1.1\r
        Connection: close\r
        \r
    "};

    let (output, result) = serve(make_streaming_dispatcher(path), input.as_bytes()).await;

    assert_eq!(output, [ok("/first", "keep-alive"), ok("/second", "close")].concat());
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn handler_error_is_internal_server_error() {
    let dispatcher = make_dispatcher(|_request: Request<ReqBody>| async { Err::<Response<String>, BoxError>("boom".into()) });
    let (output, result) = serve(dispatcher, b"GET / HTTP/1.1\r\n\r\n").await;

    assert_eq!(output, error_response("500 Internal Server Error"));
    assert!(matches!(result, Err(HttpError::HandlerError { .. })));
}

#[tokio::test(start_paused = true)]
async fn handler_panic_is_internal_server_error() {
    let dispatcher = make_dispatcher(|request: Request<ReqBody>| async move {
        if request.uri().path() == "/panic" {
            panic!("handler exploded");
        }
        Ok::<_, BoxError>(Response::new(String::new()))
    });
    let (output, result) = serve(dispatcher, b"GET /panic HTTP/1.1\r\n\r\n").await;

    assert_eq!(output, error_response("500 Internal Server Error"));
    assert!(matches!(result, Err(HttpError::HandlerPanic { reason }) if reason == "handler exploded"));
}

#[tokio::test(start_paused = true)]
async fn error_handler_renders_body() {
    let (connection, client) = connection(ConnectionConfig::default());
    let connection = connection.with_error_handler(Arc::new(TextErrorHandler));

    let (output, _) = exchange(connection, client, make_dispatcher(path), b"BAD\r\n\r\n").await;

    let expected = indoc! {"
        HTTP/1.1 400 Bad Request\r
        content-type: text/plain; charset=utf-8\r
        connection: close\r
        content-length: 15\r
        \r
        400 Bad Request"};
    assert_eq!(output, expected);
}

#[tokio::test(start_paused = true)]
async fn failing_error_handler_falls_back_to_bare_500() {
    let failing: Arc<dyn ErrorHandler> = Arc::new(|_error: &HttpError| -> Result<Response<Full<Bytes>>, BoxError> { Err("broken".into()) });
    let panicking: Arc<dyn ErrorHandler> = Arc::new(|_error: &HttpError| -> Result<Response<Full<Bytes>>, BoxError> { panic!("broken") });

    for error_handler in [failing, panicking] {
        let (connection, client) = connection(ConnectionConfig::default());
        let connection = connection.with_error_handler(error_handler);

        let (output, result) = exchange(connection, client, make_dispatcher(path), b"GET / HTTP/1.1\r\nbad\r\n\r\n").await;

        assert_eq!(output, error_response("500 Internal Server Error"));
        assert!(matches!(result, Err(HttpError::RequestError { .. })));
    }
}

#[tokio::test(start_paused = true)]
async fn expect_continue() {
    let input = indoc! {"
        POST / HTTP/1.1\r
        Expect: 100-continue\r
        Content-Length: 5\r
        Connection: close\r
        \r
        hello"};

    let (output, _) = serve(make_dispatcher(echo), input.as_bytes()).await;
    assert_eq!(output, format!("HTTP/1.1 100 Continue\r\n\r\n{}", ok("hello", "close")));
}

#[tokio::test(start_paused = true)]
async fn unsupported_expectation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let input = b"POST / HTTP/1.1\r\nExpect: 200-ok\r\nContent-Length: 5\r\n\r\nhello";

    let (output, result) = serve(counting(calls.clone()), input).await;

    assert_eq!(output, error_response("417 Expectation Failed"));
    assert!(matches!(result, Err(HttpError::ExpectationFailed { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn head_response_has_no_body() {
    let dispatcher = make_dispatcher(|_request: Request<ReqBody>| async { Ok::<_, BoxError>(Response::new("hello".to_string())) });
    let (output, _) = serve(dispatcher, b"HEAD / HTTP/1.1\r\nConnection: close\r\n\r\n").await;

    assert_eq!(output, "HTTP/1.1 200 OK\r\nconnection: close\r\ncontent-length: 5\r\n\r\n");
}

#[tokio::test(start_paused = true)]
async fn no_content_drops_body() {
    let dispatcher = make_dispatcher(|_request: Request<ReqBody>| async {
        let mut response = Response::new("ignored".to_string());
        *response.status_mut() = StatusCode::NO_CONTENT;
        Ok::<_, BoxError>(response)
    });
    let (output, _) = serve(dispatcher, b"DELETE /item HTTP/1.1\r\nConnection: close\r\n\r\n").await;

    assert_eq!(output, "HTTP/1.1 204 No Content\r\nconnection: close\r\n\r\n");
}

fn streamed(chunks: Vec<Result<&'static str, &'static str>>) -> Response<StreamBody<stream::Iter<std::vec::IntoIter<Result<Frame<Bytes>, &'static str>>>>> {
    let frames: Vec<_> = chunks.into_iter().map(|chunk| chunk.map(|text| Frame::data(Bytes::from_static(text.as_bytes())))).collect();
    Response::new(StreamBody::new(stream::iter(frames)))
}

#[tokio::test(start_paused = true)]
async fn unknown_size_is_chunked() {
    let dispatcher = make_dispatcher(|_request: Request<ReqBody>| async { Ok::<_, BoxError>(streamed(vec![Ok("hello"), Ok(" world")])) });
    let (output, _) = serve(dispatcher, b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await;

    let expected = indoc! {"
        HTTP/1.1 200 OK\r
        connection: close\r
        transfer-encoding: chunked\r
        \r
        5\r
        hello\r
        6\r
         world\r
        0\r
        \r
    "};
    assert_eq!(output, expected);
}

#[tokio::test(start_paused = true)]
async fn unknown_size_to_http10_is_close_delimited() {
    let dispatcher = make_dispatcher(|_request: Request<ReqBody>| async { Ok::<_, BoxError>(streamed(vec![Ok("hello")])) });
    let (output, result) = serve(dispatcher, b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n").await;

    assert_eq!(output, "HTTP/1.1 200 OK\r\nconnection: close\r\n\r\nhello");
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn body_failure_before_flush_becomes_500() {
    let dispatcher = make_dispatcher(|_request: Request<ReqBody>| async { Ok::<_, BoxError>(streamed(vec![Err("broken")])) });
    let (output, result) = serve(dispatcher, b"GET / HTTP/1.1\r\n\r\n").await;

    assert_eq!(output, error_response("500 Internal Server Error"));
    assert!(matches!(result, Err(HttpError::ResponseError { .. })));
}

#[tokio::test(start_paused = true)]
async fn body_failure_after_flush_closes_connection() {
    let dispatcher = make_dispatcher(|_request: Request<ReqBody>| async { Ok::<_, BoxError>(streamed(vec![Ok("hello"), Err("broken")])) });
    let (output, result) = serve(dispatcher, b"GET / HTTP/1.1\r\n\r\n").await;

    assert_eq!(output, "HTTP/1.1 200 OK\r\nconnection: keep-alive\r\ntransfer-encoding: chunked\r\n\r\n5\r\nhello\r\n");
    assert!(matches!(result, Err(HttpError::ResponseError { .. })));
}

#[tokio::test(start_paused = true)]
async fn slow_dispatcher_gets_response_timeout() {
    let config = ConnectionConfig::builder().response_timeout(Duration::from_secs(1)).build().unwrap();
    let (connection, client) = connection(config);
    let dispatcher = make_dispatcher(|_request: Request<ReqBody>| async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok::<_, BoxError>(Response::new(String::new()))
    });

    let (output, result) = exchange(connection, client, dispatcher, b"GET / HTTP/1.1\r\n\r\n").await;

    assert_eq!(output, error_response("503 Service Unavailable"));
    assert!(matches!(result, Err(HttpError::ResponseTimeout(_))));
}

#[tokio::test(start_paused = true)]
async fn stop_signal_closes_after_in_flight_response() {
    let stop = CancellationToken::new();
    let (connection, client) = connection(ConnectionConfig::default());
    let connection = connection.with_stop_signal(stop.clone());

    let dispatcher = make_dispatcher(move |request: Request<ReqBody>| {
        stop.cancel();
        path(request)
    });
    let input = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";

    let (output, result) = exchange(connection, client, dispatcher, input).await;

    assert_eq!(output, ok("/a", "close"));
    assert!(result.is_ok());
}

#[tokio::test]
async fn registry_shutdown_closes_idle_connection() {
    let registry = ConnectionRegistry::new();
    let (connection, client) = connection(ConnectionConfig::default());
    let connection = connection.with_registry(&registry);
    assert_eq!(registry.len(), 1);
    assert_eq!(connection.state(), ConnectionState::Idle);

    let (mut client_read, _client_write) = tokio::io::split(client);
    let server = connection.process(Arc::new(make_dispatcher(path)));
    let client = async {
        tokio::task::yield_now().await;
        registry.shutdown();

        let mut output = Vec::new();
        client_read.read_to_end(&mut output).await.unwrap();
        output
    };

    let (result, output) = tokio::join!(server, client);

    assert!(result.is_ok());
    assert!(output.is_empty());
    assert!(registry.is_empty());
    registry.drained().await;
}

#[tokio::test]
async fn peer_closing_mid_request_is_quiet() {
    let (connection, client) = connection(ConnectionConfig::default());
    let (mut client_read, mut client_write) = tokio::io::split(client);

    let server = connection.process(Arc::new(make_dispatcher(path)));
    let client = async {
        client_write.write_all(b"GET / HT").await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut output = Vec::new();
        client_read.read_to_end(&mut output).await.unwrap();
        output
    };

    let (result, output) = tokio::join!(server, client);

    assert!(result.is_ok());
    assert!(output.is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_line_after_body_is_not_a_request() {
    let config = ConnectionConfig::builder()
        .keep_alive_timeout(Duration::from_secs(1))
        .request_timeout(Duration::from_secs(30))
        .build()
        .unwrap();
    let (connection, client) = connection(config);
    let start = tokio::time::Instant::now();

    let input = b"POST /a HTTP/1.1\r\nContent-Length: 1\r\n\r\nx\r\n";
    let (output, result) = exchange(connection, client, make_dispatcher(path), input).await;

    assert_eq!(output, ok("/a", "keep-alive"));
    assert!(result.is_ok());
    assert!(start.elapsed() < Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn slow_body_outlives_keep_alive_timeout() {
    let config = ConnectionConfig::builder()
        .keep_alive_timeout(Duration::from_secs(1))
        .request_timeout(Duration::from_secs(10))
        .build()
        .unwrap();
    let (connection, client) = connection(config);
    let (mut client_read, mut client_write) = tokio::io::split(client);

    let server = connection.process(Arc::new(make_dispatcher(echo)));
    let client = async {
        client_write.write_all(b"POST /a HTTP/1.1\r\nContent-Length: 2\r\n\r\nhi").await.unwrap();
        client_write.write_all(b"POST /b HTTP/1.1\r\nConnection: close\r\nContent-Length: 5\r\n\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        client_write.write_all(b"hello").await.unwrap();

        let mut output = Vec::new();
        client_read.read_to_end(&mut output).await.unwrap();
        String::from_utf8(output).unwrap()
    };

    let (result, output) = tokio::join!(server, client);

    assert_eq!(output, [ok("hi", "keep-alive"), ok("hello", "close")].concat());
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn request_timeout_stops_once_request_is_complete() {
    let config = ConnectionConfig::builder()
        .request_timeout(Duration::from_secs(1))
        .response_timeout(Duration::from_secs(10))
        .build()
        .unwrap();
    let (connection, client) = connection(config);
    let dispatcher = make_dispatcher(|request: Request<ReqBody>| async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        path(request).await
    });

    let (output, result) = exchange(connection, client, dispatcher, b"GET /slow HTTP/1.1\r\nConnection: close\r\n\r\n").await;

    assert_eq!(output, ok("/slow", "close"));
    assert!(result.is_ok());
}
