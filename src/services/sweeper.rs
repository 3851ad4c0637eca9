//! Periodic overdue detection
//!
//! Every `sweep_interval` the sweeper flags borrowed books whose open loan is
//! older than the loan period. A failed pass is logged and the next one runs on
//! schedule.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::{clock::Clock, config::LendingConfig, error::AppResult, repository::Store};

use super::with_deadline;

#[derive(Clone)]
pub struct OverdueSweeper {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    loan_period: chrono::Duration,
    interval: Duration,
    deadline: Duration,
}

impl OverdueSweeper {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: &LendingConfig) -> Self {
        Self {
            store,
            clock,
            loan_period: config.loan_period(),
            interval: config.sweep_interval(),
            deadline: config.operation_timeout(),
        }
    }

    /// Loans that started strictly before this instant are overdue
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.loan_period
    }

    /// Run one pass; returns the number of books newly flagged overdue
    pub async fn sweep(&self) -> AppResult<u64> {
        let cutoff = self.cutoff(self.clock.now());
        with_deadline(self.deadline, "overdue_sweep", self.store.mark_overdue(cutoff)).await
    }

    async fn tick(&self) {
        match self.sweep().await {
            Ok(0) => tracing::debug!("Overdue sweep found nothing to flag"),
            Ok(flagged) => tracing::info!(flagged, "Flagged overdue books"),
            Err(e) => tracing::error!("Overdue sweep failed: {}", e),
        }
    }

    /// Start the sweep loop on the runtime. The first pass runs one interval
    /// after start.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                interval_secs = self.interval.as_secs(),
                loan_period_days = self.loan_period.num_days(),
                "Overdue sweeper started"
            );

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => self.tick().await,
                }
            }

            tracing::info!("Overdue sweeper stopped");
        });

        SweeperHandle { shutdown_tx, task }
    }
}

/// Running sweep loop
pub struct SweeperHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the loop and wait for an in-flight pass to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::warn!("Overdue sweeper task ended abnormally: {}", e);
        }
    }
}
