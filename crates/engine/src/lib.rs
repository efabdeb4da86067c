//! A per-connection HTTP/1.1 protocol engine
//!
//! This crate owns a single accepted connection: it incrementally parses bytes into requests,
//! dispatches each request to application code, serializes the response, and manages the
//! connection lifecycle (timeouts, keep-alive reuse, streaming bodies, error fallback). Socket
//! binding, routing and TLS are left to the caller.
//!
//! # Features
//!
//! - HTTP/1.0 and HTTP/1.1 requests, `Content-Length` and chunked bodies
//! - Keep-alive and pipelined requests, answered in order
//! - Request, response and keep-alive timeouts
//! - Fully buffered or streaming request bodies, with backpressure
//! - `Expect: 100-continue`
//! - Pluggable error responses, with a fixed `500` fallback
//! - Graceful shutdown through a connection registry
//!
//! # Example
//!
//! ```no_run
//! use std::error::Error;
//! use std::sync::Arc;
//!
//! use h1_engine::connection::{ConnectionConfig, ConnectionRegistry, HttpConnection};
//! use h1_engine::handler::{TextErrorHandler, make_dispatcher};
//! use h1_engine::protocol::body::ReqBody;
//! use http::{Request, Response};
//! use http_body_util::BodyExt;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let dispatcher = Arc::new(make_dispatcher(hello_world));
//!     let error_handler = Arc::new(TextErrorHandler);
//!     let registry = ConnectionRegistry::new();
//!     let config = ConnectionConfig::default();
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let (reader, writer) = tcp_stream.into_split();
//!         let connection = HttpConnection::new(reader, writer, config.clone())
//!             .with_error_handler(error_handler.clone())
//!             .with_registry(&registry);
//!         let dispatcher = dispatcher.clone();
//!
//!         tokio::spawn(async move {
//!             match connection.process(dispatcher).await {
//!                 Ok(_) => info!("finished process, connection shutdown"),
//!                 Err(e) => error!("service has error, cause {}, connection shutdown", e),
//!             }
//!         });
//!     }
//! }
//!
//! async fn hello_world(request: Request<ReqBody>) -> Result<Response<String>, Box<dyn Error + Send + Sync>> {
//!     let body = request.into_body().collect().await?.to_bytes();
//!     info!(size = body.len(), "receiving request body");
//!     Ok(Response::new("Hello World!\r\n".to_string()))
//! }
//! ```
//!
//! # Architecture
//!
//! - [`connection`]: the connection state machine, its configuration, timers and registry
//! - [`codec`]: incremental request parser and response encoder
//! - [`protocol`]: events, request and response types, bodies and errors
//! - [`handler`]: the dispatcher and error handler collaborators
//!
//! # Error Handling
//!
//! - [`protocol::HttpError`]: top-level error of a connection, mapped to a response status
//! - [`protocol::ParseError`]: malformed or oversized requests
//! - [`protocol::SendError`]: response body and write failures
//!
//! # Limitations
//!
//! - HTTP/1.x only, no HTTP/2 or HTTP/3
//! - No TLS, no WebSocket upgrade
//! - Maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
