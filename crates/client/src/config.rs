//! Client configuration from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::sync::ReconnectConfig;

/// Default number of lookahead addresses watched for first use.
pub const DEFAULT_LOOKAHEAD_WINDOW: u32 = 10;

/// Deadline for the initial handshake plus first synchronization pass.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration of a [`SyncClient`](crate::sync::SyncClient).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// WebSocket endpoint of the node's STOMP broker.
    pub node_ws_url: String,
    /// Base URL of the node's REST API (balance snapshots).
    pub node_api_url: String,
    /// Number of not-yet-used addresses kept under propagation watch.
    pub lookahead_window: u32,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectConfig,
    /// Period of snapshot reconciliation while running; `None` disables it.
    pub reconcile_interval: Option<Duration>,
    /// Extra headers sent with the STOMP CONNECT frame.
    pub connect_headers: Vec<(String, String)>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            node_ws_url: "ws://localhost:7070/websocket".to_string(),
            node_api_url: "http://localhost:7070".to_string(),
            lookahead_window: DEFAULT_LOOKAHEAD_WINDOW,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectConfig::default(),
            reconcile_interval: None,
            connect_headers: Vec::new(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `LEDGERSYNC_NODE_WS_URL`: STOMP WebSocket endpoint (default: "ws://localhost:7070/websocket")
    /// - `LEDGERSYNC_NODE_API_URL`: REST base URL (default: "http://localhost:7070")
    /// - `LEDGERSYNC_LOOKAHEAD`: lookahead window size (default: 10)
    /// - `LEDGERSYNC_CONNECT_TIMEOUT_SECS`: initial connect deadline (default: 120)
    /// - `LEDGERSYNC_MAX_RECONNECTS`: reconnect attempts before giving up (default: 6)
    /// - `LEDGERSYNC_RECONNECT_DELAY_MS`: delay after the first failure, doubling per failure (default: 0, immediate)
    /// - `LEDGERSYNC_RECONNECT_MAX_DELAY_MS`: ceiling for the retry delay (default: 30000)
    /// - `LEDGERSYNC_RECONCILE_SECS`: snapshot reconciliation period (default: 0, disabled)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let node_ws_url =
            std::env::var("LEDGERSYNC_NODE_WS_URL").unwrap_or(defaults.node_ws_url);
        let node_api_url =
            std::env::var("LEDGERSYNC_NODE_API_URL").unwrap_or(defaults.node_api_url);
        let lookahead_window = env_parse("LEDGERSYNC_LOOKAHEAD", defaults.lookahead_window);
        let connect_timeout = Duration::from_secs(env_parse(
            "LEDGERSYNC_CONNECT_TIMEOUT_SECS",
            defaults.connect_timeout.as_secs(),
        ));

        let mut reconnect = defaults.reconnect;
        reconnect.max_attempts = env_parse("LEDGERSYNC_MAX_RECONNECTS", reconnect.max_attempts);
        reconnect.initial_delay = Duration::from_millis(env_parse(
            "LEDGERSYNC_RECONNECT_DELAY_MS",
            reconnect.initial_delay.as_millis() as u64,
        ));
        reconnect.max_delay = Duration::from_millis(env_parse(
            "LEDGERSYNC_RECONNECT_MAX_DELAY_MS",
            reconnect.max_delay.as_millis() as u64,
        ));

        let reconcile_interval = match env_parse("LEDGERSYNC_RECONCILE_SECS", 0u64) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Self {
            node_ws_url,
            node_api_url,
            lookahead_window,
            connect_timeout,
            reconnect,
            reconcile_interval,
            connect_headers: defaults.connect_headers,
        }
    }

    pub fn with_lookahead_window(mut self, window: u32) -> Self {
        self.lookahead_window = window;
        self
    }

    pub fn with_connect_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.connect_headers.push((key.into(), value.into()));
        self
    }
}

fn env_parse<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, fallback = %default, "ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}
