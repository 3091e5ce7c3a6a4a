//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the Beacon HTTP server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `3737`, `0` for auto-assign).
    pub port: u16,
    /// Bearer token required on write endpoints.
    pub api_key: String,
    /// Per-subscriber SSE frame buffer.
    pub sse_buffer: usize,
    /// SSE keep-alive comment interval in milliseconds.
    pub keep_alive_interval_ms: u64,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3737,
            api_key: "CHANGE_ME".into(),
            sse_buffer: 64,
            keep_alive_interval_ms: 30_000,
            max_body_bytes: 10 * 1024 * 1024, // 10 MB
        }
    }
}
