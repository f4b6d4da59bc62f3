//! Settings types.
//!
//! Field names are camelCase in the JSON file. Every struct uses
//! `#[serde(default)]` so a partial file only overrides what it names.

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynapSettings {
    /// Network and realtime transport settings.
    pub server: ServerSettings,
    /// Token verification settings.
    pub auth: AuthSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// Network and realtime transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP/WebSocket port.
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before a client is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue depth.
    pub send_queue_capacity: usize,
    /// Allowed CORS origin (`*` for any).
    pub cors_origin: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            max_connections: 1000,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
            cors_origin: "*".to_string(),
        }
    }
}

/// Token verification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HS256 secret shared with the HTTP API.
    pub jwt_secret: String,
    /// Required `iss` claim, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: "your-secret-key".to_string(),
            issuer: None,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
