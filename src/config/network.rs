use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Network configuration for broker connections.
///
/// One profile covers all broker channels; the mirror only talks the
/// wire protocol for metadata-sized requests, so there is no separate
/// bulk tuning.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Channel parameters applied to every broker connection
    #[serde(default)]
    pub broker: ConnectionParams,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            broker: ConnectionParams::default(),
        }
    }
}

impl NetworkConfig {
    /// Validates configuration sanity
    pub fn validate(&self) -> Result<()> {
        self.broker.validate("broker")
    }
}

/// Low-level parameters for one connection profile
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConnectionParams {
    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// Request completion timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// TCP keepalive in seconds
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_in_secs: u64,

    /// HTTP2 keepalive ping interval in seconds
    #[serde(default = "default_h2_keepalive_interval")]
    pub http2_keep_alive_interval_in_secs: u64,

    /// HTTP2 keepalive timeout in seconds
    #[serde(default = "default_h2_keepalive_timeout")]
    pub http2_keep_alive_timeout_in_secs: u64,

    /// Initial connection-level flow control window in bytes
    #[serde(default = "default_conn_window_size")]
    pub connection_window_size: u32,

    /// Initial stream-level flow control window in bytes
    #[serde(default = "default_stream_window_size")]
    pub stream_window_size: u32,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            connect_timeout_in_ms: default_connect_timeout(),
            request_timeout_in_ms: default_request_timeout(),
            tcp_keepalive_in_secs: default_tcp_keepalive(),
            http2_keep_alive_interval_in_secs: default_h2_keepalive_interval(),
            http2_keep_alive_timeout_in_secs: default_h2_keepalive_timeout(),
            connection_window_size: default_conn_window_size(),
            stream_window_size: default_stream_window_size(),
        }
    }
}

impl ConnectionParams {
    /// Validation with context for error messages
    pub(crate) fn validate(
        &self,
        conn_type: &str,
    ) -> Result<()> {
        if self.connect_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "{conn_type} connection timeout must be > 0",
            ))));
        }

        if self.request_timeout_in_ms != 0 && self.request_timeout_in_ms <= self.connect_timeout_in_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "{} request timeout {}ms must exceed connect timeout {}ms",
                conn_type, self.request_timeout_in_ms, self.connect_timeout_in_ms
            ))));
        }

        if self.http2_keep_alive_timeout_in_secs >= self.http2_keep_alive_interval_in_secs {
            return Err(Error::Config(ConfigError::Message(format!(
                "{} keepalive timeout {}s must be < interval {}s",
                conn_type, self.http2_keep_alive_timeout_in_secs, self.http2_keep_alive_interval_in_secs
            ))));
        }

        const MIN_WINDOW: u32 = 65535; // HTTP2 spec minimum
        if self.stream_window_size < MIN_WINDOW {
            return Err(Error::Config(ConfigError::Message(format!(
                "{} stream window size {} below minimum {}",
                conn_type, self.stream_window_size, MIN_WINDOW
            ))));
        }

        if self.connection_window_size < self.stream_window_size {
            return Err(Error::Config(ConfigError::Message(format!(
                "{} connection window {} smaller than stream window {}",
                conn_type, self.connection_window_size, self.stream_window_size
            ))));
        }

        Ok(())
    }
}

// Default profile: metadata-sized requests over long-lived channels

fn default_connect_timeout() -> u64 {
    500
}
fn default_request_timeout() -> u64 {
    5000
}
fn default_tcp_keepalive() -> u64 {
    600
}
fn default_h2_keepalive_interval() -> u64 {
    120
}
fn default_h2_keepalive_timeout() -> u64 {
    30
}
fn default_conn_window_size() -> u32 {
    6_291_456 // 6MB connection window
}
fn default_stream_window_size() -> u32 {
    1_048_576 // 1MB stream window
}
