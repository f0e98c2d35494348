//! Status reaper
//!
//! Background task that cancels orders left pending for too long. It uses
//! the same compare-and-set transition as manual status edits, so an order
//! a seller touched after the sweep read it is skipped, not overwritten.

use std::time::Duration;

use chrono::{DateTime, Months, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::ledger::OrderLedger;
use crate::context::RequestContext;
use crate::domain::events::ChangeSource;
use crate::domain::OrderStatus;
use crate::{CommerceError, Result};

#[derive(Clone, Debug)]
pub struct ReaperSettings {
    /// Time between successful sweeps.
    pub interval: Duration,
    /// First delay after a failed sweep; doubles on each further failure.
    pub retry_delay: Duration,
    pub max_backoff: Duration,
    /// Pending orders older than this many calendar months are cancelled.
    pub max_pending_months: u32,
    pub batch_size: usize,
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            retry_delay: Duration::from_secs(60),
            max_backoff: Duration::from_secs(6 * 3600),
            max_pending_months: 1,
            batch_size: 200,
        }
    }
}

impl ReaperSettings {
    /// Delay before the next sweep after `failures` consecutive failed sweeps.
    pub fn next_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.interval;
        }
        let factor = 1u32.checked_shl(failures.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_delay.saturating_mul(factor).min(self.max_backoff)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub cancelled: usize,
    /// Orders that moved on between the read and the write.
    pub skipped: usize,
}

#[derive(Clone)]
pub struct StatusReaper {
    ledger: OrderLedger,
    settings: ReaperSettings,
}

impl StatusReaper {
    pub fn new(ledger: OrderLedger, settings: ReaperSettings) -> Self {
        Self { ledger, settings }
    }

    /// Orders created at or before this instant are stale: the configured
    /// number of calendar months back, and never less than 30 days per month.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let months = self.settings.max_pending_months;
        let calendar = now.checked_sub_months(Months::new(months)).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let days = now.checked_sub_signed(chrono::Duration::days(30 * i64::from(months))).unwrap_or(DateTime::<Utc>::MIN_UTC);
        calendar.min(days)
    }

    /// One pass over all tenants. Store failures abort the pass; the orders
    /// already cancelled stay cancelled.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let deps = self.ledger.deps();
        let cutoff = self.cutoff(deps.now());
        let mut report = SweepReport::default();

        loop {
            let batch = deps
                .call("stale_pending_orders", deps.store.stale_pending_orders(cutoff, self.settings.batch_size))
                .await?;
            let fetched = batch.len();
            let mut progressed = false;

            for (tenant_id, order_id) in batch {
                report.examined += 1;
                let ctx = RequestContext::system(tenant_id);
                match self.ledger.transition(&ctx, order_id, OrderStatus::Cancelled, ChangeSource::Reaper).await {
                    Ok(_) => {
                        report.cancelled += 1;
                        progressed = true;
                    }
                    Err(CommerceError::Conflict(_) | CommerceError::InvalidTransition { .. } | CommerceError::NotFound(_)) => {
                        tracing::debug!(tenant_id = %tenant_id, order_id = %order_id, "stale order changed before cancel, skipping");
                        report.skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }

            if fetched < self.settings.batch_size || !progressed {
                break;
            }
        }

        if report.examined > 0 {
            tracing::info!(cutoff = %cutoff, examined = report.examined, cancelled = report.cancelled, skipped = report.skipped, "reaper sweep finished");
        } else {
            tracing::debug!(cutoff = %cutoff, "reaper sweep found nothing to cancel");
        }
        Ok(report)
    }

    /// Sweep now, then keep sweeping until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval_secs = self.settings.interval.as_secs(), "status reaper started");
        let mut failures: u32 = 0;

        loop {
            match self.sweep().await {
                Ok(_) => failures = 0,
                Err(e) => {
                    failures = failures.saturating_add(1);
                    tracing::error!(error = %e, failures, "reaper sweep failed");
                }
            }

            let delay = self.settings.next_delay(failures);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("status reaper received shutdown signal");
                    break;
                }
            }
        }

        tracing::info!("status reaper stopped");
    }
}
