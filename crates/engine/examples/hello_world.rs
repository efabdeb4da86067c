use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use h1_engine::connection::{ConnectionConfig, ConnectionRegistry, HttpConnection};
use h1_engine::handler::{TextErrorHandler, make_dispatcher};
use h1_engine::protocol::body::ReqBody;
use http::{Request, Response};
use http_body_util::BodyExt;
use tokio::net::TcpListener;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = ConnectionConfig::builder()
        .keep_alive_timeout(Duration::from_secs(10))
        .request_max_size(1024 * 1024)
        .build()
        .expect("valid connection config");

    info!(port = 8080, "start listening");
    let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
        Ok(tcp_listener) => tcp_listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    let dispatcher = Arc::new(make_dispatcher(hello_world));
    let error_handler = Arc::new(TextErrorHandler);
    let registry = ConnectionRegistry::new();

    loop {
        let (tcp_stream, remote_addr) = tokio::select! {
            accepted = tcp_listener.accept() => match accepted {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        let (reader, writer) = tcp_stream.into_split();
        let connection = HttpConnection::new(reader, writer, config.clone())
            .with_error_handler(error_handler.clone())
            .with_registry(&registry);
        let dispatcher = dispatcher.clone();

        tokio::spawn(async move {
            match connection.process(dispatcher).await {
                Ok(()) => info!(%remote_addr, "finished process, connection shutdown"),
                Err(e) => error!(%remote_addr, "service has error, cause {}, connection shutdown", e),
            }
        });
    }

    info!(live = registry.len(), "shutting down, waiting for in-flight requests");
    registry.shutdown();
    registry.drained().await;
}

async fn hello_world(request: Request<ReqBody>) -> Result<Response<String>, Box<dyn Error + Send + Sync>> {
    let path = request.uri().path().to_string();
    let body = request.into_body().collect().await?.to_bytes();
    info!(path, size = body.len(), "receiving request");

    Ok(Response::new("Hello World!\r\n".to_string()))
}
