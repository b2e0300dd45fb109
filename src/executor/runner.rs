// Run entry point: wires workers, coordinator and completion tracker

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{error, info};

use super::command::Command;
use super::completion::CompletionTracker;
use super::dispatcher::assign;
use super::failover::FailoverCoordinator;
use super::pool::DispatchPool;
use super::worker::HostWorker;
use super::Transport;
use crate::inventory::Host;
use crate::output::errors::TodError;
use crate::output::terminal::{RunRecap, TerminalOutput};

/// Runs an already-dispatched pool to completion
pub struct Runner {
    transport: Arc<dyn Transport>,
    output: Arc<TerminalOutput>,
}

impl Runner {
    pub fn new(transport: Arc<dyn Transport>, output: Arc<TerminalOutput>) -> Self {
        Runner { transport, output }
    }

    /// Start one worker per host plus the failover coordinator, and block
    /// until `total` commands have succeeded
    ///
    /// Returns an error instead of hanging once the remaining commands can
    /// no longer be placed on any host. Hung commands are not interrupted.
    pub async fn run(&self, pool: Arc<DispatchPool>, total: usize) -> Result<RunRecap, TodError> {
        let started = Instant::now();
        self.output.print_run_header(pool.len(), total);

        let tracker = Arc::new(CompletionTracker::new(total));
        let (reports_tx, reports_rx) = FailoverCoordinator::channel(&pool);

        let mut tasks = JoinSet::new();
        if total > 0 {
            let coordinator =
                FailoverCoordinator::new(Arc::clone(&pool), Arc::clone(&tracker), reports_rx);
            tasks.spawn(coordinator.run());

            for id in pool.ids() {
                let worker = HostWorker::new(
                    id,
                    Arc::clone(&pool),
                    Arc::clone(&self.transport),
                    Arc::clone(&tracker),
                    reports_tx.clone(),
                    Arc::clone(&self.output),
                );
                tasks.spawn(async move {
                    worker.run().await;
                });
            }
        }
        drop(reports_tx);

        let outcome = loop {
            tokio::select! {
                biased;
                result = tracker.wait() => break result,
                joined = tasks.join_next() => match joined {
                    Some(Err(e)) if e.is_panic() => {
                        error!(error = %e, "dispatch task panicked");
                        tracker.fail(TodError::Assignment {
                            message: format!("A dispatch task panicked: {}", e),
                            pending: pool.total_pending(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        // Nothing left running can signal the tracker
                        tracker.fail(TodError::Assignment {
                            message: "Every worker stopped before all commands ran".to_string(),
                            pending: pool.total_pending(),
                        });
                        break tracker.wait().await;
                    }
                },
            }
        };

        // Idle workers are parked forever; stop them with the run
        tasks.shutdown().await;

        let mut recap = pool.recap();
        recap.completed = tracker.completed();
        recap.target = tracker.target();
        recap.total_duration = started.elapsed();

        match outcome {
            Ok(completed) => {
                info!(completed, hosts = pool.len(), "all commands completed");
                self.output.print_recap(&recap);
                Ok(recap)
            }
            Err(err) => {
                error!(
                    completed = recap.completed,
                    target = total,
                    host = err.host().unwrap_or("-"),
                    error = %err.reason(),
                    "run stopped before completion"
                );
                if !self.output.is_quiet() {
                    self.output.print_recap(&recap);
                }
                Err(err)
            }
        }
    }
}

/// Dispatch `commands` over `hosts` and run them to completion
pub async fn run_commands(
    transport: Arc<dyn Transport>,
    hosts: Vec<Host>,
    commands: Vec<Command>,
    output: Arc<TerminalOutput>,
) -> Result<RunRecap, TodError> {
    let pool = Arc::new(DispatchPool::new(hosts));

    if pool.is_empty() {
        error!("there are no hosts to run commands on");
    }

    if !commands.is_empty() {
        let eligible = pool.eligible(None);
        let assigned = assign(&pool, &commands, &eligible)?;
        info!(
            commands = commands.len(),
            hosts = assigned.len(),
            "initial dispatch done"
        );
    }

    Runner::new(transport, output).run(pool, commands.len()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::mock::{commands, Call, MockTransport};
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::time::Duration;

    async fn run_with(
        transport: &Arc<MockTransport>,
        hosts: Vec<Host>,
        batch: &[&str],
    ) -> Result<RunRecap, TodError> {
        let run = run_commands(
            transport.clone(),
            hosts,
            commands(batch),
            Arc::new(TerminalOutput::silent()),
        );
        tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("run did not finish")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_command_runs_exactly_once() {
        let transport = Arc::new(MockTransport::new());
        let hosts = vec![
            Host::new("h0"),
            Host::new("h1").with_priority(2),
            Host::new("h2").with_threads(3),
        ];
        let batch: Vec<String> = (0..25).map(|i| format!("cmd{}", i)).collect();
        let batch: Vec<&str> = batch.iter().map(String::as_str).collect();

        let recap = run_with(&transport, hosts, &batch).await.unwrap();

        assert_eq!(recap.completed, 25);
        assert_eq!(recap.total_executed(), 25);
        transport.assert_executed_once();

        let ran: HashSet<String> = transport.executed().into_iter().map(|(_, c)| c).collect();
        assert_eq!(ran.len(), 25);

        // Weights 1, 2, 3 over 25 commands
        assert_eq!(recap.host("h0").map(|s| s.executed), Some(4));
        assert_eq!(recap.host("h1").map(|s| s.executed), Some(8));
        assert_eq!(recap.host("h2").map(|s| s.executed), Some(13));
    }

    #[tokio::test]
    async fn test_failed_host_work_moves_to_survivor() {
        // a gets c1, c2 and b gets c3, c4; a fails on its second command
        let transport = Arc::new(MockTransport::new().fails_at("a", 1));
        let hosts = vec![Host::new("a"), Host::new("b")];

        let recap = run_with(&transport, hosts, &["c1", "c2", "c3", "c4"])
            .await
            .unwrap();

        assert_eq!(recap.completed, 4);
        assert_eq!(transport.executed_on("a"), vec!["c1"]);
        assert_eq!(transport.executed_on("b"), vec!["c3", "c4", "c2"]);
        transport.assert_executed_once();

        let a = recap.host("a").unwrap();
        assert!(a.disconnected);
        assert_eq!(a.executed, 1);
        assert_eq!(recap.host("b").map(|s| s.assigned), Some(3));

        // a's worker stopped right after the failed run
        let calls = transport.calls_for("a");
        assert_eq!(calls.last(), Some(&Call::Close));
        assert_eq!(
            calls.iter().filter(|c| matches!(c, Call::Run(_))).count(),
            2
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_partial_failure_reaches_total() {
        let transport = Arc::new(
            MockTransport::new()
                .fails_at("h1", 2)
                .slow("h0", Duration::from_millis(2)),
        );
        let hosts = vec![Host::new("h0"), Host::new("h1"), Host::new("h2")];
        let batch: Vec<String> = (0..12).map(|i| format!("job{}", i)).collect();
        let batch: Vec<&str> = batch.iter().map(String::as_str).collect();

        let recap = run_with(&transport, hosts, &batch).await.unwrap();

        assert_eq!(recap.completed, 12);
        assert_eq!(transport.executed_on("h1").len(), 2);
        assert_eq!(transport.executed().len(), 12);
        transport.assert_executed_once();
    }

    #[tokio::test]
    async fn test_only_host_failing_is_detected() {
        let transport = Arc::new(MockTransport::new().fails_at("solo", 1));

        let err = run_with(&transport, vec![Host::new("solo")], &["a", "b", "c"])
            .await
            .unwrap_err();

        match err {
            TodError::Assignment { pending, .. } => assert_eq!(pending, 2),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(transport.executed_on("solo"), vec!["a"]);
    }

    #[tokio::test]
    async fn test_all_hosts_unreachable() {
        let transport = Arc::new(MockTransport::new().unreachable("a").unreachable("b"));

        let err = run_with(&transport, vec![Host::new("a"), Host::new("b")], &["x", "y"])
            .await
            .unwrap_err();

        assert!(matches!(err, TodError::Assignment { .. }));
        assert!(transport.executed().is_empty());
        assert!(!transport.calls_for("a").contains(&Call::Connect));
    }

    #[tokio::test]
    async fn test_reassigned_host_handshake_failure_cascades() {
        // b never authenticates, so everything ends up on c
        let transport = Arc::new(MockTransport::new().unreachable("a").handshake_fails("b"));
        let hosts = vec![Host::new("a"), Host::new("b"), Host::new("c")];

        let recap = run_with(&transport, hosts, &["1", "2", "3", "4", "5", "6"])
            .await
            .unwrap();

        assert_eq!(recap.completed, 6);
        assert_eq!(transport.executed_on("c").len(), 6);
        assert_eq!(recap.disconnected_hosts(), 2);
    }

    #[tokio::test]
    async fn test_no_hosts_fails_dispatch() {
        let transport = Arc::new(MockTransport::new());
        let err = run_with(&transport, Vec::new(), &["a"]).await.unwrap_err();
        assert!(matches!(err, TodError::Assignment { pending: 1, .. }));
    }

    #[tokio::test]
    async fn test_run_without_workers_fails_instead_of_waiting() {
        let runner = Runner::new(
            Arc::new(MockTransport::new()),
            Arc::new(TerminalOutput::silent()),
        );
        let pool = Arc::new(DispatchPool::new(Vec::new()));

        let err = tokio::time::timeout(Duration::from_secs(2), runner.run(pool, 1))
            .await
            .expect("run did not finish")
            .unwrap_err();
        assert!(matches!(err, TodError::Assignment { pending: 0, .. }));
    }

    #[tokio::test]
    async fn test_empty_batch_completes_immediately() {
        let transport = Arc::new(MockTransport::new());
        let recap = run_with(&transport, vec![Host::new("a")], &[]).await.unwrap();
        assert_eq!(recap.completed, 0);
        assert!(transport.calls_for("a").is_empty());
    }
}
