// Per-host worker loop

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use super::command::Command;
use super::completion::CompletionTracker;
use super::failover::DisconnectReport;
use super::health::HealthChecker;
use super::pool::{DispatchPool, HostId, HostSlot};
use super::{CommandResult, Session, Transport};
use crate::output::errors::TodError;
use crate::output::terminal::TerminalOutput;

/// Where a worker is in its lifecycle. `Disconnected` is terminal.
#[derive(Debug)]
pub enum WorkerState {
    /// Deciding what to do next
    Idle,
    /// Running the command at the cursor
    Executing,
    /// Queue drained, suspended until more commands are appended
    AwaitingMoreWork,
    /// The host failed; carries the error that took it out
    Disconnected(TodError),
}

/// Drains one host's queue, strictly in index order
pub struct HostWorker {
    id: HostId,
    pool: Arc<DispatchPool>,
    transport: Arc<dyn Transport>,
    tracker: Arc<CompletionTracker>,
    reports: mpsc::Sender<DisconnectReport>,
    output: Arc<TerminalOutput>,
}

impl HostWorker {
    pub fn new(
        id: HostId,
        pool: Arc<DispatchPool>,
        transport: Arc<dyn Transport>,
        tracker: Arc<CompletionTracker>,
        reports: mpsc::Sender<DisconnectReport>,
        output: Arc<TerminalOutput>,
    ) -> Self {
        HostWorker {
            id,
            pool,
            transport,
            tracker,
            reports,
            output,
        }
    }

    fn slot(&self) -> &HostSlot {
        self.pool.slot(self.id)
    }

    /// Drive the host until it disconnects; returns the error that ended it
    pub async fn run(self) -> TodError {
        let mut state = WorkerState::Idle;

        loop {
            state = match state {
                WorkerState::Idle => self.slot().with_queue(|q| {
                    if q.current().is_some() {
                        q.set_working(true);
                        WorkerState::Executing
                    } else {
                        WorkerState::AwaitingMoreWork
                    }
                }),

                WorkerState::Executing => match self.execute_current().await {
                    Ok(()) => WorkerState::Idle,
                    Err(err) => {
                        self.report_disconnect(&err);
                        WorkerState::Disconnected(err)
                    }
                },

                WorkerState::AwaitingMoreWork => {
                    let slot = self.slot();
                    slot.with_queue(|q| q.set_working(false));
                    debug!(host = %slot.name(), "waiting for more work");

                    slot.wait_for_work().await;

                    let queued = slot.with_queue(|q| q.len());
                    debug!(host = %slot.name(), queued, "woken up");
                    WorkerState::Idle
                }

                WorkerState::Disconnected(err) => return err,
            };
        }
    }

    /// Run the command at the cursor and advance past it on success
    async fn execute_current(&self) -> Result<(), TodError> {
        let slot = self.slot();
        let (command, cursor) = slot.with_queue(|q| (q.current().cloned(), q.cursor()));
        let Some(command) = command else {
            return Ok(());
        };

        info!(host = %slot.name(), cursor, command = %command.text(), "executing");

        let mut session = self.transport.open(&slot.host, command.user());
        let outcome = self.execute(session.as_mut(), &command).await;

        match outcome {
            Ok(result) => {
                slot.with_queue(|q| q.advance());
                self.tracker.signal();
                session.close();
                self.output
                    .print_command_output(slot.name(), command.text(), &result);
                Ok(())
            }
            Err(err) => {
                session.close();
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        session: &mut dyn Session,
        command: &Command,
    ) -> Result<CommandResult, TodError> {
        let host = &self.slot().host;

        HealthChecker::new(self.transport.as_ref())
            .check(host, session)
            .await?;
        session.add_session().await?;

        let result = session.run(command.text()).await?;
        if !result.success() {
            return Err(TodError::Execution {
                host: host.name.clone(),
                command: command.text().to_string(),
                message: format!("Command exited with status {}", result.exit_code),
                stderr: Some(result.stderr),
            });
        }

        Ok(result)
    }

    /// Mark the host disconnected and hand it to the failover coordinator
    fn report_disconnect(&self, err: &TodError) {
        let slot = self.slot();
        let pending = slot.with_queue(|q| {
            q.mark_disconnected();
            q.pending()
        });

        error!(
            host = %slot.name(),
            action = failed_action(err),
            pending,
            error = %err.reason(),
            "host disconnected"
        );
        self.output.print_host_failed(slot.name(), err);

        let report = DisconnectReport {
            host: self.id,
            error: err.clone(),
        };
        match self.reports.try_send(report) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(host = %slot.name(), pending, "failover queue full, report dropped");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(host = %slot.name(), pending, "failover coordinator gone, report dropped");
            }
        }
    }
}

fn failed_action(err: &TodError) -> &'static str {
    match err {
        TodError::Reachability { .. } => "probe",
        TodError::Handshake { .. } => "connect",
        TodError::Execution { .. } => "execute",
        _ => "dispatch",
    }
}
