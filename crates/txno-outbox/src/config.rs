//! Outbox configuration.

use crate::{OutboxError, OutboxResult};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Longest delay, retry interval or retention the outbox accepts.
pub const MAX_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Outbox behaviour configuration.
///
/// # Fields
///
/// - `attempt_frequency`: delay before retrying a failed entry, and how far
///   a claimed entry is pushed back while it executes (default: 2 min)
/// - `block_after_attempts`: failures after which an entry is blocked (default: 5)
/// - `flush_batch_size`: maximum entries claimed per flush (default: 4096)
/// - `retention_threshold`: how long processed entries with a unique
///   request id are kept for deduplication (default: 7 days)
/// - `write_lock_timeout`: how long a claim waits on a locked row (default: 2s)
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub attempt_frequency: Duration,
    pub block_after_attempts: i32,
    pub flush_batch_size: usize,
    pub retention_threshold: Duration,
    pub write_lock_timeout: Duration,
    /// Name of the outbox table.
    pub table_name: String,
    /// Apply schema migrations on `initialize`.
    pub migrate: bool,
    /// Interval of the background flush loop.
    pub flush_interval: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            attempt_frequency: Duration::from_secs(120),
            block_after_attempts: 5,
            flush_batch_size: 4096,
            retention_threshold: Duration::from_secs(7 * 24 * 60 * 60),
            write_lock_timeout: Duration::from_secs(2),
            table_name: "TXNO_OUTBOX".to_string(),
            migrate: true,
            flush_interval: Duration::from_secs(10),
        }
    }
}

impl OutboxConfig {
    pub fn validate(&self) -> OutboxResult<()> {
        if self.attempt_frequency.is_zero() {
            return Err(OutboxError::Config(
                "attempt_frequency must be positive".into(),
            ));
        }
        if self.block_after_attempts < 1 {
            return Err(OutboxError::Config(
                "block_after_attempts must be at least 1".into(),
            ));
        }
        if self.flush_batch_size == 0 {
            return Err(OutboxError::Config(
                "flush_batch_size must be positive".into(),
            ));
        }
        if self.table_name.trim().is_empty() {
            return Err(OutboxError::Config("table_name is required".into()));
        }
        if self.flush_interval.is_zero() {
            return Err(OutboxError::Config(
                "flush_interval must be positive".into(),
            ));
        }
        for (name, value) in [
            ("attempt_frequency", self.attempt_frequency),
            ("retention_threshold", self.retention_threshold),
            ("write_lock_timeout", self.write_lock_timeout),
            ("flush_interval", self.flush_interval),
        ] {
            if value > MAX_DELAY {
                return Err(OutboxError::Config(format!(
                    "{} may not exceed {} days",
                    name,
                    MAX_DELAY.as_secs() / 86_400
                )));
            }
        }
        Ok(())
    }
}

/// `at` moved `by` into the future.
pub(crate) fn later(at: DateTime<Utc>, by: Duration) -> OutboxResult<DateTime<Utc>> {
    if by > MAX_DELAY {
        return Err(OutboxError::DelayTooLong(by));
    }
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .ok_or(OutboxError::DelayTooLong(by))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OutboxConfig::default();
        assert_eq!(config.attempt_frequency, Duration::from_secs(120));
        assert_eq!(config.block_after_attempts, 5);
        assert_eq!(config.flush_batch_size, 4096);
        assert_eq!(config.write_lock_timeout, Duration::from_secs(2));
        assert_eq!(config.table_name, "TXNO_OUTBOX");
        assert!(config.migrate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_ceiling() {
        let config = OutboxConfig {
            block_after_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(OutboxError::Config(_))));
    }

    #[test]
    fn test_rejects_blank_table() {
        let config = OutboxConfig {
            table_name: " ".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unbounded_durations() {
        let config = OutboxConfig {
            retention_threshold: Duration::from_secs(u64::MAX),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(OutboxError::Config(_))));

        let config = OutboxConfig {
            attempt_frequency: MAX_DELAY + Duration::from_secs(1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_later_is_checked() {
        let at = Utc::now();
        assert_eq!(
            later(at, Duration::from_secs(3)).unwrap(),
            at + chrono::Duration::seconds(3)
        );
        assert!(later(at, MAX_DELAY).is_ok());
        assert!(matches!(
            later(at, Duration::MAX),
            Err(OutboxError::DelayTooLong(_))
        ));
        assert!(later(DateTime::<Utc>::MAX_UTC, Duration::from_secs(1)).is_err());
    }
}
