//! BillingScheduler - periodic driver of the billing engine.
//!
//! Each tick resolves stale `pending` ledger rows, charges every due
//! subscription sequentially, then expires lapsed subscriptions.
//!
//! ## Non-overlapping ticks
//!
//! The scheduler owns an explicit "tick in progress" flag. A tick that starts
//! while another is running (a slow pass overlapping the next scheduled fire,
//! or the admin trigger) is skipped, not queued.
//!
//! ## Graceful Shutdown
//!
//! `run` listens for a shutdown signal between ticks. A running tick is never
//! interrupted mid-charge.

mod schedule;

pub use schedule::TickSchedule;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::application::handlers::billing::{
    BillingPassSummary, ExpireLapsedSubscriptionsCommand, ExpireLapsedSubscriptionsHandler,
    ReconcilePendingAttemptsCommand, ReconcilePendingAttemptsHandler, ReconcileSummary,
    RunBillingPassCommand, RunBillingPassHandler,
};
use crate::domain::billing::BillingError;
use crate::ports::Clock;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub reconciled: ReconcileSummary,
    pub pass: BillingPassSummary,
    pub expired: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickReport),
    /// Another tick was still running.
    Skipped,
}

/// Clears the in-progress flag when the tick ends, including on error.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct BillingScheduler {
    billing_pass: Arc<RunBillingPassHandler>,
    expire_lapsed: Arc<ExpireLapsedSubscriptionsHandler>,
    reconcile: Arc<ReconcilePendingAttemptsHandler>,
    clock: Arc<dyn Clock>,
    schedule: TickSchedule,
    tick_in_progress: AtomicBool,
}

impl BillingScheduler {
    pub fn new(
        billing_pass: Arc<RunBillingPassHandler>,
        expire_lapsed: Arc<ExpireLapsedSubscriptionsHandler>,
        reconcile: Arc<ReconcilePendingAttemptsHandler>,
        clock: Arc<dyn Clock>,
        schedule: TickSchedule,
    ) -> Self {
        Self {
            billing_pass,
            expire_lapsed,
            reconcile,
            clock,
            schedule,
            tick_in_progress: AtomicBool::new(false),
        }
    }

    pub fn schedule(&self) -> TickSchedule {
        self.schedule
    }

    pub fn is_ticking(&self) -> bool {
        self.tick_in_progress.load(Ordering::Acquire)
    }

    /// Runs one tick unless another is in progress.
    ///
    /// Errors from reconciliation and expiry are logged and do not fail the
    /// tick; an error listing due subscriptions does.
    pub async fn try_tick(&self) -> Result<TickOutcome, BillingError> {
        if self
            .tick_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Billing tick still in progress, skipping");
            return Ok(TickOutcome::Skipped);
        }
        let _guard = TickGuard(&self.tick_in_progress);

        let started_at = self.clock.now();
        tracing::info!(started_at = %started_at, "Billing tick started");

        let reconciled = self
            .reconcile
            .handle(ReconcilePendingAttemptsCommand)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Reconciliation failed");
                ReconcileSummary::default()
            });

        let pass = self.billing_pass.handle(RunBillingPassCommand).await?;

        let expired = self
            .expire_lapsed
            .handle(ExpireLapsedSubscriptionsCommand)
            .await
            .map(|ids| ids.len())
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Expiring lapsed subscriptions failed");
                0
            });

        Ok(TickOutcome::Completed(TickReport {
            reconciled,
            pass,
            expired,
        }))
    }

    /// Runs ticks on the schedule until the shutdown signal is received.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(schedule = ?self.schedule, "Billing scheduler started");

        loop {
            let now = self.clock.now();
            let next = self.schedule.next_after(now);
            let wait = next
                .duration_since(&now)
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            tracing::debug!(next_tick = %next, "Waiting for next billing tick");

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Billing scheduler stopping");
                        return;
                    }
                }

                _ = tokio::time::sleep(wait) => {
                    match self.try_tick().await {
                        Ok(TickOutcome::Completed(report)) => {
                            tracing::info!(
                                charged = report.pass.charged,
                                failed = report.pass.failed,
                                suspended = report.pass.suspended,
                                expired = report.expired,
                                "Billing tick finished"
                            );
                        }
                        Ok(TickOutcome::Skipped) => {}
                        Err(e) => tracing::error!(error = %e, "Billing tick failed"),
                    }
                }
            }
        }
    }
}
