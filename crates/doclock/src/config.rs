//! Tunables for the acquisition loop.

use std::time::Duration;

/// Configuration for a lock coordinator's retry loop.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Sleep between acquisition attempts.
    pub poll_interval: Duration,
    /// Check for an abandoned (expired) record on every Nth contended
    /// attempt. Values below 1 are treated as 1.
    pub reclaim_every: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            reclaim_every: 3,
        }
    }
}

impl LockConfig {
    pub(crate) fn reclaim_cadence(&self) -> u64 {
        u64::from(self.reclaim_every.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LockConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.reclaim_every, 3);
    }

    #[test]
    fn test_reclaim_cadence_never_zero() {
        let config = LockConfig {
            poll_interval: Duration::from_millis(5),
            reclaim_every: 0,
        };
        assert_eq!(config.reclaim_cadence(), 1);
    }
}
