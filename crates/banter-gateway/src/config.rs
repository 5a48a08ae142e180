//! Gateway configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the banter gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum simultaneous connections per identity.
    pub max_connections_per_user: usize,
    /// Heartbeat ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close the connection after this long without a pong.
    pub heartbeat_timeout_secs: u64,
    /// Messages at or above this many characters also consume the
    /// long-message quota.
    pub long_message_threshold: usize,
    /// Recent-history entries fed to the context assembler.
    pub recent_history: usize,
    /// Similar messages retrieved per reply.
    pub similar_k: usize,
    /// Hard deadline for one assistant reply, in seconds.
    pub reply_timeout_secs: u64,
    /// Maximum tokens per assistant reply.
    pub reply_max_tokens: u32,
    /// Sampling temperature for assistant replies.
    pub reply_temperature: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections_per_user: 5,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            long_message_threshold: 500,
            recent_history: 10,
            similar_k: 5,
            reply_timeout_secs: 30,
            reply_max_tokens: 1024,
            reply_temperature: 0.7,
        }
    }
}
