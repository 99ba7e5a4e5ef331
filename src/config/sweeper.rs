//! Expiration sweeper configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    /// Seconds between runs; 0 disables the in-process schedule
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Rows examined per run
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl SweeperConfig {
    /// `None` when scheduling is left to an external cron.
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 || self.batch_size > 10_000 {
            return Err(ValidationError::InvalidBatchSize);
        }
        Ok(())
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_interval() -> u64 {
    3600
}

fn default_batch_size() -> u32 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hourly_by_default() {
        let config = SweeperConfig::default();
        assert_eq!(config.interval(), Some(Duration::from_secs(3600)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_disables_schedule() {
        let config = SweeperConfig {
            interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.interval(), None);
    }

    #[test]
    fn test_batch_size_bounds() {
        let config = SweeperConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidBatchSize));
    }
}
