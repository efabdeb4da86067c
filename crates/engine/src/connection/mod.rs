//! Connection lifecycle.
//!
//! - [`HttpConnection`]: serves the requests of one transport, one after another
//! - [`ConnectionConfig`]: timeouts, size limits and keep-alive settings, built and validated
//!   through [`ConnectionConfigBuilder`]
//! - [`Timers`]: the request, response and keep-alive timers of a connection
//! - [`ConnectionRegistry`]: the live connections of a worker, for graceful shutdown
//! - [`MessageWriter`]: buffered response output in front of the transport

mod config;
mod http_connection;
mod message_writer;
mod registry;
mod timer;

pub use config::{ConfigError, ConnectionConfig, ConnectionConfigBuilder};
pub use http_connection::{ConnectionState, HttpConnection};
pub use message_writer::MessageWriter;
pub use registry::{ConnectionRegistry, Registration};
pub use timer::{TimerHandle, TimerKind, Timers};

#[cfg(test)]
mod tests;
