// Executor module - dispatch and failover engine

use std::sync::Arc;

use async_trait::async_trait;

use crate::inventory::Host;
use crate::output::errors::TodError;

pub mod command;
pub mod completion;
pub mod dispatcher;
pub mod failover;
pub mod health;
pub mod pool;
pub mod runner;
pub mod ssh;
pub mod worker;

#[cfg(test)]
pub(crate) mod mock;

pub use command::{Command, Credentials, User};
pub use completion::CompletionTracker;
pub use dispatcher::{assign, plan_shares};
pub use failover::{DisconnectReport, FailoverCoordinator};
pub use health::{tcp_probe, HealthChecker};
pub use pool::{DispatchPool, HostId, HostQueue, HostSlot};
pub use runner::{run_commands, Runner};
pub use ssh::{SshSession, SshTransport};
pub use worker::{HostWorker, WorkerState};

/// Factory for sessions to remote hosts, plus the transport-level probe
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open and drop a raw connection to the host, bounded by its timeout
    async fn probe(&self, host: &Host) -> Result<(), TodError> {
        tcp_probe(host).await
    }

    /// Create an unconnected session for running one command as `user`
    fn open(&self, host: &Host, user: Arc<dyn Credentials>) -> Box<dyn Session>;
}

/// A live authenticated channel to one host, owned by that host's worker
#[async_trait]
pub trait Session: Send {
    /// Establish the authenticated channel
    async fn connect(&mut self) -> Result<(), TodError>;

    /// Open a logical sub-channel for running one command
    async fn add_session(&mut self) -> Result<(), TodError>;

    /// Execute a command on the last opened sub-channel and capture its output
    async fn run(&mut self, command: &str) -> Result<CommandResult, TodError>;

    /// Release the session; safe to call after a failure or more than once
    fn close(&mut self);
}

/// Result of executing a command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
