// Failover coordinator: redistributes the work of disconnected hosts

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use super::completion::CompletionTracker;
use super::dispatcher::assign;
use super::pool::{DispatchPool, HostId};
use crate::output::errors::TodError;

/// Sent by a worker whose host left the run
#[derive(Debug, Clone)]
pub struct DisconnectReport {
    pub host: HostId,
    pub error: TodError,
}

/// Sole consumer of disconnect reports, handled one at a time
///
/// Besides the initial dispatch, this loop is the only writer to a queue
/// it does not own. Appends take the receiving slot's lock, so workers
/// never see a half-appended queue.
pub struct FailoverCoordinator {
    pool: Arc<DispatchPool>,
    tracker: Arc<CompletionTracker>,
    reports: mpsc::Receiver<DisconnectReport>,
}

impl FailoverCoordinator {
    pub fn new(
        pool: Arc<DispatchPool>,
        tracker: Arc<CompletionTracker>,
        reports: mpsc::Receiver<DisconnectReport>,
    ) -> Self {
        FailoverCoordinator {
            pool,
            tracker,
            reports,
        }
    }

    /// Report channel sized so that every host can report once without blocking
    pub fn channel(
        pool: &DispatchPool,
    ) -> (
        mpsc::Sender<DisconnectReport>,
        mpsc::Receiver<DisconnectReport>,
    ) {
        mpsc::channel(pool.len().max(1))
    }

    pub async fn run(mut self) {
        info!("waiting for disconnected hosts");
        while let Some(report) = self.reports.recv().await {
            // Failures are recorded on the tracker by handle()
            let _ = self.handle(report);
        }
    }

    /// Move the reporter's unexecuted commands to the remaining hosts
    pub fn handle(&self, report: DisconnectReport) -> Result<Vec<(HostId, usize)>, TodError> {
        let slot = self.pool.slot(report.host);
        let tail = slot.with_queue(|q| q.take_unexecuted());

        if tail.is_empty() {
            info!(host = %slot.name(), "disconnected host had no pending commands");
            return Ok(Vec::new());
        }

        info!(
            host = %slot.name(),
            pending = tail.len(),
            "dispatching jobs to other connected hosts"
        );

        let eligible = self.pool.eligible(Some(report.host));
        match assign(&self.pool, &tail, &eligible) {
            Ok(assigned) => {
                for (id, count) in assigned.iter().filter(|(_, count)| *count > 0) {
                    info!(
                        from = %slot.name(),
                        to = %self.pool.slot(*id).name(),
                        count,
                        "reassigned commands"
                    );
                }
                Ok(assigned)
            }
            Err(err) => {
                error!(
                    host = %slot.name(),
                    pending = tail.len(),
                    error = %err.reason(),
                    "redistribution failed, run cannot complete"
                );
                self.tracker.fail(err.clone());
                Err(err)
            }
        }
    }
}
