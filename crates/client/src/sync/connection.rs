//! Connection state and reconnect policy.

use std::time::Duration;

/// Lifecycle of the client's session with the node.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// `attempt` counts from 1 within the current run of failures.
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed { .. })
    }
}

/// Bounded retry budget for (re)connecting.
///
/// A session counts as established only once the initial synchronization
/// pass succeeded; every other outcome is a failure against this budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Consecutive failures tolerated; one more abandons reconnection.
    pub max_attempts: u32,
    /// Pause after the first failure. Zero retries immediately.
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectConfig {
    /// Pause before the next attempt after `failures` consecutive failures,
    /// doubling from `initial_delay` up to `max_delay`.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures > self.max_attempts
    }
}
