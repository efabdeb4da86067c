use std::time::Duration;

use thiserror::Error;

use crate::codec::ParserLimits;

/// Per-connection settings, validated once by [`ConnectionConfigBuilder::build`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    request_timeout: Duration,
    response_timeout: Duration,
    keep_alive_timeout: Duration,
    request_max_size: usize,
    keep_alive: bool,
    stream_buffer_capacity: usize,
    max_header_bytes: usize,
    max_header_field_bytes: usize,
    read_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            response_timeout: Duration::from_secs(60),
            keep_alive_timeout: Duration::from_secs(5),
            request_max_size: 100_000_000,
            keep_alive: true,
            stream_buffer_capacity: 100,
            max_header_bytes: 8 * 1024,
            max_header_field_bytes: 4 * 1024,
            read_buffer_size: 8 * 1024,
        }
    }
}

impl ConnectionConfig {
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new()
    }

    /// Time allowed to receive a complete request, head and body.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Time allowed for the dispatcher to produce a response once the request is complete.
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// How long an idle keep-alive connection waits for the next request.
    pub fn keep_alive_timeout(&self) -> Duration {
        self.keep_alive_timeout
    }

    /// Ceiling on the bytes received for one request, head included.
    pub fn request_max_size(&self) -> usize {
        self.request_max_size
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Number of body chunks a streaming request may buffer before reading pauses.
    pub fn stream_buffer_capacity(&self) -> usize {
        self.stream_buffer_capacity
    }

    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    pub fn max_header_field_bytes(&self) -> usize {
        self.max_header_field_bytes
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    pub fn parser_limits(&self) -> ParserLimits {
        ParserLimits {
            max_header_bytes: self.max_header_bytes,
            max_header_field_bytes: self.max_header_field_bytes,
            max_payload_size: self.request_max_size as u64,
            max_message_bytes: self.request_max_size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    fn new() -> Self {
        Self { config: ConnectionConfig::default() }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    pub fn keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.config.keep_alive_timeout = timeout;
        self
    }

    pub fn request_max_size(mut self, size: usize) -> Self {
        self.config.request_max_size = size;
        self
    }

    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.config.keep_alive = enabled;
        self
    }

    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.stream_buffer_capacity = capacity;
        self
    }

    pub fn max_header_bytes(mut self, size: usize) -> Self {
        self.config.max_header_bytes = size;
        self
    }

    pub fn max_header_field_bytes(mut self, size: usize) -> Self {
        self.config.max_header_field_bytes = size;
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    pub fn build(self) -> Result<ConnectionConfig, ConfigError> {
        let config = self.config;

        let durations = [
            ("request_timeout", config.request_timeout),
            ("response_timeout", config.response_timeout),
            ("keep_alive_timeout", config.keep_alive_timeout),
        ];
        if let Some(&(name, _)) = durations.iter().find(|(_, duration)| duration.is_zero()) {
            return Err(ConfigError::Zero { name });
        }

        let sizes = [
            ("request_max_size", config.request_max_size),
            ("stream_buffer_capacity", config.stream_buffer_capacity),
            ("max_header_bytes", config.max_header_bytes),
            ("max_header_field_bytes", config.max_header_field_bytes),
            ("read_buffer_size", config.read_buffer_size),
        ];
        if let Some(&(name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
            return Err(ConfigError::Zero { name });
        }

        if config.max_header_field_bytes > config.max_header_bytes {
            return Err(ConfigError::HeaderFieldLimit { field: config.max_header_field_bytes, head: config.max_header_bytes });
        }

        Ok(config)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
    #[error("max_header_field_bytes {field} exceeds max_header_bytes {head}")]
    HeaderFieldLimit { field: usize, head: usize },
}
