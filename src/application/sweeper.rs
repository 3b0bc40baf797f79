use super::engine::OrderEngine;
use crate::domain::ports::OrderFilter;
use crate::error::{MarketError, Result};
use chrono::{NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub marked: usize,
    /// Candidates that changed state between the scan and the transition.
    pub skipped: usize,
    pub failed: usize,
}

/// Periodic job that flags active orders whose deadline has passed.
///
/// Each candidate goes through the regular lifecycle transition, so an order the sweep already
/// flagged, or one that moved on in the meantime, is skipped rather than penalised twice.
pub struct OverdueSweeper {
    engine: Arc<OrderEngine>,
    interval: Duration,
}

impl OverdueSweeper {
    pub fn new(engine: Arc<OrderEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    pub async fn sweep_once(&self, today: NaiveDate) -> Result<SweepReport> {
        let candidates = self
            .engine
            .orders(&OrderFilter::overdue_candidates(today))
            .await?;
        let mut report = SweepReport {
            scanned: candidates.len(),
            ..SweepReport::default()
        };

        for order in candidates {
            match self.engine.mark_overdue(order.id, today).await {
                Ok(_) => report.marked += 1,
                Err(MarketError::Precondition(reason)) => {
                    debug!(order = %order.id, %reason, "Skipping overdue candidate");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(order = %order.id, error = %e, "Failed to mark order overdue");
                    report.failed += 1;
                }
            }
        }

        info!(
            %today,
            scanned = report.scanned,
            marked = report.marked,
            skipped = report.skipped,
            failed = report.failed,
            "Overdue sweep finished"
        );
        Ok(report)
    }

    /// Sweeps on every tick until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(interval_secs = self.interval.as_secs(), "Overdue sweeper started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Overdue sweeper stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once(Utc::now().date_naive()).await {
                        warn!(error = %e, "Overdue sweep failed");
                    }
                }
            }
        }
    }
}
