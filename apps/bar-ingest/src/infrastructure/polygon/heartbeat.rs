//! Connection Liveness
//!
//! The supervisor pings the server on a fixed interval and treats any
//! inbound frame (data, pong or ping) as proof of life. If nothing arrives
//! for longer than the timeout, the connection is considered dead and is
//! torn down for reconnection.

use std::time::{Duration, Instant};

/// Shortest ping period the supervisor will schedule.
pub const MIN_PING_INTERVAL: Duration = Duration::from_millis(100);

/// Heartbeat timing.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between outbound pings.
    pub ping_interval: Duration,
    /// Maximum silence before the connection is declared dead.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            timeout: Duration::from_secs(60),
        }
    }
}

impl HeartbeatConfig {
    /// Ping period actually scheduled, never below [`MIN_PING_INTERVAL`].
    #[must_use]
    pub fn ping_period(&self) -> Duration {
        self.ping_interval.max(MIN_PING_INTERVAL)
    }
}

/// Per-connection record of the last inbound activity.
#[derive(Debug, Clone, Copy)]
pub struct Liveness {
    last_seen: Instant,
}

impl Liveness {
    /// Start tracking from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_seen: Instant::now(),
        }
    }

    /// Record inbound activity.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Time since the last inbound activity.
    #[must_use]
    pub fn silence(&self) -> Duration {
        self.last_seen.elapsed()
    }

    /// Whether the connection has been silent longer than `timeout`.
    #[must_use]
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.silence() > timeout
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_connection_is_not_stale() {
        let liveness = Liveness::new();
        assert!(!liveness.is_stale(Duration::from_secs(1)));
    }

    #[test]
    fn silence_beyond_timeout_is_stale() {
        let liveness = Liveness::new();
        std::thread::sleep(Duration::from_millis(15));
        assert!(liveness.is_stale(Duration::from_millis(5)));
    }

    #[test]
    fn zero_ping_interval_is_clamped() {
        let config = HeartbeatConfig {
            ping_interval: Duration::ZERO,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(config.ping_period(), MIN_PING_INTERVAL);
        assert_eq!(
            HeartbeatConfig::default().ping_period(),
            Duration::from_secs(20)
        );
    }

    #[test]
    fn touch_resets_silence() {
        let mut liveness = Liveness::new();
        std::thread::sleep(Duration::from_millis(15));
        liveness.touch();
        assert!(!liveness.is_stale(Duration::from_millis(10)));
    }
}
