//! Reset Scheduling
//!
//! Two background tasks keep credential state from going stale:
//!
//! - a daily reset at a fixed UTC hour clears counters and rate-limit flags
//! - an hourly sweep optimistically re-enables credentials that were rate
//!   limited long enough ago
//!
//! Both go through [`ProviderManager`] and so take the same per-pool locks as
//! the request path.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use tokio::task::JoinHandle;

use super::ProviderManager;

/// Timing for the reset tasks
#[derive(Clone, Debug)]
pub struct ResetSchedule {
    /// UTC hour (0-23) at which daily counters reset
    pub reset_hour_utc: u32,
    /// Minimum age of a rate-limit flag before it is optimistically cleared
    pub reenable_after: Duration,
    /// How often the re-enable sweep runs
    pub reenable_interval: Duration,
}

impl Default for ResetSchedule {
    fn default() -> Self {
        Self {
            reset_hour_utc: 0,
            reenable_after: Duration::from_secs(3600),
            reenable_interval: Duration::from_secs(3600),
        }
    }
}

/// Time remaining until the next daily reset boundary
#[must_use]
pub fn duration_until_next_reset(now: DateTime<Utc>, reset_hour_utc: u32) -> Duration {
    let boundary_time = NaiveTime::from_hms_opt(reset_hour_utc % 24, 0, 0).unwrap_or(NaiveTime::MIN);
    let mut next = now.date_naive().and_time(boundary_time).and_utc();
    if next <= now {
        next += chrono::Duration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Handle to the running reset tasks; dropping it stops them
#[derive(Debug)]
pub struct ResetScheduler {
    daily: JoinHandle<()>,
    reenable: JoinHandle<()>,
}

impl ResetScheduler {
    /// Spawn both reset tasks on the current tokio runtime
    #[must_use]
    pub fn spawn(manager: Arc<ProviderManager>, schedule: ResetSchedule) -> Self {
        let daily = {
            let manager = Arc::clone(&manager);
            let hour = schedule.reset_hour_utc;
            tokio::spawn(async move {
                loop {
                    let wait = duration_until_next_reset(Utc::now(), hour);
                    tracing::debug!(secs = wait.as_secs(), "Next daily credential reset scheduled");
                    tokio::time::sleep(wait).await;
                    manager.reset_all(None);
                }
            })
        };

        let reenable = tokio::spawn(async move {
            let period = schedule.reenable_interval;
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let age = chrono::Duration::from_std(schedule.reenable_after)
                    .unwrap_or_else(|_| chrono::Duration::hours(1));
                manager.reenable_rate_limited(Utc::now() - age);
            }
        });

        tracing::info!(
            reset_hour_utc = schedule.reset_hour_utc,
            "Credential reset scheduler started"
        );
        Self { daily, reenable }
    }

    /// Stop both tasks
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for ResetScheduler {
    fn drop(&mut self) {
        self.daily.abort();
        self.reenable.abort();
    }
}
