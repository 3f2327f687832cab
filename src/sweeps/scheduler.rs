// Sweep scheduler - drives the two background sweeps.
//
// Expiry sweep: fixed interval (default every 15 minutes), reclaims seats
// from reservations that were never paid.
// Auto-cancel sweep: daily at a configured UTC hour (off-peak), cancels
// overdue partial balances where batch and booking both opted in.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use super::auto_cancel::AutoCancelSweep;
use super::expiry::ExpirySweep;
use crate::error::AppResult;

#[derive(Debug, Clone)]
pub struct SweepScheduleConfig {
    /// Minutes between expiry sweep passes.
    pub expiry_interval_minutes: u64,
    /// UTC hour (0-23) for the daily auto-cancel pass.
    pub auto_cancel_hour: u32,
}

/// Coordinates both sweeps as independent timer-driven tasks. The sweeps
/// only touch the core through the same repository/ledger/service APIs the
/// request path uses.
pub struct SweepScheduler {
    config: SweepScheduleConfig,
    expiry: Arc<ExpirySweep>,
    auto_cancel: Arc<AutoCancelSweep>,
}

impl SweepScheduler {
    pub fn new(
        config: SweepScheduleConfig,
        expiry: Arc<ExpirySweep>,
        auto_cancel: Arc<AutoCancelSweep>,
    ) -> Self {
        Self {
            config,
            expiry,
            auto_cancel,
        }
    }

    /// Scheduled entry point: one expiry pass.
    pub async fn run_expiry_sweep(&self) -> AppResult<()> {
        self.expiry.run().await.map(|_| ())
    }

    /// Scheduled entry point: one auto-cancel pass.
    pub async fn run_auto_cancel_sweep(&self) -> AppResult<()> {
        self.auto_cancel.run().await.map(|_| ())
    }

    /// Start both background tasks.
    pub fn start(&self) -> (JoinHandle<()>, JoinHandle<()>) {
        let expiry = self.expiry.clone();
        let expiry_minutes = self.config.expiry_interval_minutes;

        let expiry_handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(expiry_minutes * 60));
            loop {
                ticker.tick().await;
                if let Err(e) = expiry.run().await {
                    error!("Expiry sweep failed: {:?}", e);
                }
            }
        });

        let auto_cancel = self.auto_cancel.clone();
        let hour = self.config.auto_cancel_hour;

        let auto_cancel_handle = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = Self::calculate_next_daily_execution(now, hour);
                let wait = next.signed_duration_since(now);

                if wait.num_seconds() > 0 {
                    info!(
                        "Next auto-cancel sweep scheduled for {} UTC",
                        next.format("%Y-%m-%d %H:%M:%S")
                    );
                    tokio::time::sleep(Duration::from_secs(wait.num_seconds() as u64)).await;
                }

                if let Err(e) = auto_cancel.run().await {
                    error!("Auto-cancel sweep failed: {:?}", e);
                }
            }
        });

        (expiry_handle, auto_cancel_handle)
    }

    /// Next occurrence of `execution_hour` UTC, today or tomorrow.
    fn calculate_next_daily_execution(now: DateTime<Utc>, execution_hour: u32) -> DateTime<Utc> {
        let today = now
            .date_naive()
            .and_hms_opt(execution_hour, 0, 0)
            .unwrap();
        let today_dt = Utc.from_utc_datetime(&today);

        if today_dt <= now {
            let tomorrow = (now.date_naive() + chrono::Duration::days(1))
                .and_hms_opt(execution_hour, 0, 0)
                .unwrap();
            Utc.from_utc_datetime(&tomorrow)
        } else {
            today_dt
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn test_calculate_next_daily_execution() {
        // Current time: 2024-01-01 10:00:00 UTC
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();

        // Execution hour 14:00 is still ahead today
        let next = SweepScheduler::calculate_next_daily_execution(now, 14);
        assert_eq!(next.hour(), 14);
        assert_eq!(next.day(), 1);

        // Execution hour 02:00 already passed, so tomorrow
        let next = SweepScheduler::calculate_next_daily_execution(now, 2);
        assert_eq!(next.hour(), 2);
        assert_eq!(next.day(), 2);
    }

    #[test]
    fn test_next_execution_rolls_over_month_end() {
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 23, 30, 0).unwrap();
        let next = SweepScheduler::calculate_next_daily_execution(now, 2);
        assert_eq!(next.month(), 2);
        assert_eq!(next.day(), 1);
        assert_eq!(next.hour(), 2);
    }
}
