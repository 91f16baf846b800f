//! Connection lifecycle: state transitions and reconnect scheduling.
//!
//! The manager never touches the socket itself. The session driver performs
//! the I/O and reports outcomes here; the manager answers with the next
//! state and, after a failure, how long to wait before trying again.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Transport state of one chat session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long to wait between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Same delay every time, forever.
    Fixed { delay_secs: u64 },
    /// Doubling delay capped at `max_delay_secs`, reset after a stable session.
    Exponential {
        initial_secs: u64,
        max_delay_secs: u64,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed { delay_secs: 5 }
    }
}

/// A session that stayed up this long resets exponential backoff.
const STABILITY_THRESHOLD: Duration = Duration::from_secs(60);

/// Owns [`ConnectionState`] and the retry schedule.
#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    policy: ReconnectPolicy,
    /// Failed attempts since the last stable session.
    failures: u32,
    closed: bool,
}

impl ConnectionManager {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            policy,
            failures: 0,
            closed: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Begin a connection attempt. Returns false when one is already under
    /// way or established, or after close.
    pub fn begin_connect(&mut self) -> bool {
        if self.closed {
            return false;
        }
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                self.state = ConnectionState::Connecting;
                true
            }
            ConnectionState::Connecting | ConnectionState::Connected => false,
        }
    }

    /// The transport reported a successful connect.
    pub fn connected(&mut self) {
        if !self.closed {
            self.state = ConnectionState::Connected;
        }
    }

    /// A connect attempt failed or a live connection dropped.
    ///
    /// Moves to `Reconnecting` and returns the delay before exactly one retry,
    /// or `None` once the session is closed.
    pub fn connection_lost(&mut self, uptime: Option<Duration>) -> Option<Duration> {
        if self.closed {
            return None;
        }
        if uptime.is_some_and(|up| up >= STABILITY_THRESHOLD) {
            self.failures = 0;
        }
        let delay = self.next_delay();
        self.failures = self.failures.saturating_add(1);
        self.state = ConnectionState::Reconnecting;
        Some(delay)
    }

    /// Tear down. Returns true only on the first call.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.state = ConnectionState::Disconnected;
        true
    }

    fn next_delay(&self) -> Duration {
        match self.policy {
            ReconnectPolicy::Fixed { delay_secs } => Duration::from_secs(delay_secs),
            ReconnectPolicy::Exponential {
                initial_secs,
                max_delay_secs,
            } => {
                let factor = 1u64.checked_shl(self.failures.min(32)).unwrap_or(u64::MAX);
                Duration::from_secs(initial_secs.saturating_mul(factor).min(max_delay_secs))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_lifecycle() {
        let mut conn = ConnectionManager::new(ReconnectPolicy::default());
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        assert!(conn.begin_connect());
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(!conn.begin_connect());

        conn.connected();
        assert!(conn.is_connected());
        assert!(!conn.begin_connect());
    }

    #[test]
    fn test_fixed_delay_repeats_forever() {
        let mut conn = ConnectionManager::new(ReconnectPolicy::Fixed { delay_secs: 5 });
        for _ in 0..50 {
            assert!(conn.begin_connect());
            let delay = conn.connection_lost(None);
            assert_eq!(delay, Some(Duration::from_secs(5)));
            assert_eq!(conn.state(), ConnectionState::Reconnecting);
        }
    }

    #[test]
    fn test_exponential_backoff_caps_and_resets() {
        let mut conn = ConnectionManager::new(ReconnectPolicy::Exponential {
            initial_secs: 1,
            max_delay_secs: 64,
        });
        let delays: Vec<u64> = (0..9)
            .map(|_| conn.connection_lost(None).unwrap().as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 64, 64]);

        let after_stable = conn.connection_lost(Some(Duration::from_secs(120)));
        assert_eq!(after_stable, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let mut conn = ConnectionManager::new(ReconnectPolicy::default());
        conn.begin_connect();
        conn.connected();

        assert!(conn.close());
        assert!(!conn.close());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.begin_connect());
        assert_eq!(conn.connection_lost(None), None);
        conn.connected();
        assert!(!conn.is_connected());
    }
}
