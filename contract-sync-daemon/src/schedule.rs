//! Delay between scheduled runs.
//!
//! After a successful run the next one is `interval` away. After `n`
//! consecutive failures the delay is `min(retry_base * 2^(n-1), max_backoff)`.

use std::time::Duration;

use contract_sync_core::config::ScheduleSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub interval: Duration,
    pub retry_base: Duration,
    pub max_backoff: Duration,
}

impl SchedulePolicy {
    pub fn from_settings(settings: &ScheduleSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.interval_secs),
            retry_base: Duration::from_secs(settings.retry_base_secs),
            max_backoff: Duration::from_secs(settings.max_backoff_secs),
        }
    }

    pub fn next_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.interval;
        }
        let exponent = (consecutive_failures - 1).min(31);
        self.retry_base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self::from_settings(&ScheduleSettings::default())
    }
}
