//! Engine configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Shortest allowed poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Longest allowed poll interval.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Check that a poll interval is within 10-300 s.
pub fn validate_poll_interval(interval: Duration) -> Result<Duration> {
    if (MIN_POLL_INTERVAL..=MAX_POLL_INTERVAL).contains(&interval) {
        Ok(interval)
    } else {
        Err(Error::InvalidParameter {
            name: "poll_interval".to_string(),
            value: format!("{:?}", interval),
        })
    }
}

/// Delay schedule between reconnect attempts.
///
/// The first attempt after a session ends is immediate; each consecutive
/// failure after that doubles the delay, starting at `initial_delay` and
/// capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReconnectPolicy {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Give up after this many consecutive failures. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the next attempt, given consecutive failures so far.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Check if another attempt is allowed after `failures` consecutive failures.
    pub fn allows(&self, failures: u32) -> bool {
        self.max_attempts.map_or(true, |max| failures < max)
    }
}

/// Timing and behaviour of a charger session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChargerConfig {
    /// Time between poll cycle starts (10-300 s).
    pub poll_interval: Duration,
    /// Spacing between consecutive commands inside a cycle.
    pub command_spacing: Duration,
    /// Quiescence delay after connecting, before any write.
    pub settle_delay: Duration,
    /// Pause after enabling handshake notifications, before writing.
    pub subscribe_delay: Duration,
    /// Response window for bind and hardware info.
    pub handshake_timeout: Duration,
    /// Query hardware info on every session rather than only until captured.
    pub requery_hardware_info: bool,
    /// Reconnect schedule.
    pub reconnect: ReconnectPolicy,
}

impl Default for ChargerConfig {
    fn default() -> Self {
        Self {
            poll_interval: MIN_POLL_INTERVAL,
            command_spacing: Duration::from_millis(100),
            settle_delay: Duration::from_secs(1),
            subscribe_delay: Duration::from_millis(300),
            handshake_timeout: Duration::from_secs(3),
            requery_hardware_info: false,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ChargerConfig {
    /// Set the poll interval. Fails outside 10-300 s.
    pub fn with_poll_interval(mut self, interval: Duration) -> Result<Self> {
        self.poll_interval = validate_poll_interval(interval)?;
        Ok(self)
    }

    /// Set the inter-command spacing.
    pub fn with_command_spacing(mut self, spacing: Duration) -> Self {
        self.command_spacing = spacing;
        self
    }

    /// Set the post-connect settle delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the handshake response window.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Query hardware info on every session.
    pub fn with_requery_hardware_info(mut self, requery: bool) -> Self {
        self.requery_hardware_info = requery;
        self
    }

    /// Set the reconnect schedule.
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Check every field that has bounds.
    pub fn validate(&self) -> Result<()> {
        validate_poll_interval(self.poll_interval)?;
        if self.command_spacing.is_zero() {
            return Err(Error::InvalidParameter {
                name: "command_spacing".to_string(),
                value: "0s".to_string(),
            });
        }
        Ok(())
    }
}
