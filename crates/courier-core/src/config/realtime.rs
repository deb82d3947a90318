//! Real-time delivery engine configuration.

use serde::{Deserialize, Serialize};

/// Real-time (WebSocket) engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Pub/sub bridge: `"memory"` for single-node, `"redis"` for multi-node.
    #[serde(default = "default_bridge")]
    pub bridge: String,
    /// Redis URL for the pub/sub bridge (ignored for the memory bridge).
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    /// Presence record TTL in seconds; heartbeats refresh it.
    #[serde(default = "default_presence_ttl")]
    pub presence_ttl_seconds: u64,
    /// Per-connection outbound buffer size.
    #[serde(default = "default_send_buffer")]
    pub send_buffer_size: usize,
    /// Bridge broadcast channel buffer size.
    #[serde(default = "default_bridge_buffer")]
    pub bridge_buffer_size: usize,
    /// Transport ping interval in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,
    /// Seconds without any client activity before a connection is
    /// considered dead.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_seconds: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            bridge: default_bridge(),
            bridge_url: default_bridge_url(),
            presence_ttl_seconds: default_presence_ttl(),
            send_buffer_size: default_send_buffer(),
            bridge_buffer_size: default_bridge_buffer(),
            ping_interval_seconds: default_ping_interval(),
            ping_timeout_seconds: default_ping_timeout(),
        }
    }
}

fn default_bridge() -> String {
    "memory".to_string()
}

fn default_bridge_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_presence_ttl() -> u64 {
    300
}

fn default_send_buffer() -> usize {
    256
}

fn default_bridge_buffer() -> usize {
    1024
}

fn default_ping_interval() -> u64 {
    25
}

fn default_ping_timeout() -> u64 {
    60
}
