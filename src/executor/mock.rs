// Scripted in-memory transport for engine tests

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::command::{Command, Credentials, User};
use super::{CommandResult, Session, Transport};
use crate::inventory::Host;
use crate::output::errors::TodError;

/// Build commands run by a throwaway user
pub fn commands(texts: &[&str]) -> Vec<Command> {
    let user: Arc<dyn Credentials> = Arc::new(User::new("tester"));
    texts
        .iter()
        .map(|t| Command::new(*t, Arc::clone(&user)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Probe,
    Connect,
    AddSession,
    Run(String),
    Close,
}

#[derive(Debug, Clone, Copy)]
enum RunFailure {
    Transport,
    ExitCode(i32),
}

#[derive(Debug, Clone, Default)]
struct HostScript {
    unreachable: bool,
    handshake_fails: bool,
    /// Run index (per host, counted from zero) that fails
    fail_at: Option<(usize, RunFailure)>,
    delay: Option<Duration>,
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<(String, Call)>>,
    runs: Mutex<HashMap<String, usize>>,
    executed: Mutex<Vec<(String, String)>>,
}

pub struct MockTransport {
    scripts: HashMap<String, HostScript>,
    shared: Arc<Shared>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            scripts: HashMap::new(),
            shared: Arc::new(Shared::default()),
        }
    }

    fn script(&mut self, host: &str) -> &mut HostScript {
        self.scripts.entry(host.to_string()).or_default()
    }

    /// The reachability probe fails for `host`
    pub fn unreachable(mut self, host: &str) -> Self {
        self.script(host).unreachable = true;
        self
    }

    pub fn handshake_fails(mut self, host: &str) -> Self {
        self.script(host).handshake_fails = true;
        self
    }

    /// The `index`-th run on `host` fails with a transport error
    pub fn fails_at(mut self, host: &str, index: usize) -> Self {
        self.script(host).fail_at = Some((index, RunFailure::Transport));
        self
    }

    /// The `index`-th run on `host` completes with a non-zero exit status
    pub fn exits_at(mut self, host: &str, index: usize, code: i32) -> Self {
        self.script(host).fail_at = Some((index, RunFailure::ExitCode(code)));
        self
    }

    /// Every run on `host` sleeps first
    pub fn slow(mut self, host: &str, delay: Duration) -> Self {
        self.script(host).delay = Some(delay);
        self
    }

    pub fn calls_for(&self, host: &str) -> Vec<Call> {
        self.shared
            .calls
            .lock()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Commands that ran successfully on `host`, in order
    pub fn executed_on(&self, host: &str) -> Vec<String> {
        self.shared
            .executed
            .lock()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Every successful execution across hosts
    pub fn executed(&self) -> Vec<(String, String)> {
        self.shared.executed.lock().clone()
    }

    /// Panics if some command succeeded more than once
    pub fn assert_executed_once(&self) {
        let mut seen = HashSet::new();
        for (host, command) in self.shared.executed.lock().iter() {
            assert!(
                seen.insert(command.clone()),
                "command '{}' executed twice (again on {})",
                command,
                host
            );
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn probe(&self, host: &Host) -> Result<(), TodError> {
        record(&self.shared, &host.name, Call::Probe);
        match self.scripts.get(&host.name) {
            Some(script) if script.unreachable => Err(TodError::Reachability {
                host: host.name.clone(),
                message: "Connection refused".to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn open(&self, host: &Host, _user: Arc<dyn Credentials>) -> Box<dyn Session> {
        Box::new(MockSession {
            host: host.name.clone(),
            script: self.scripts.get(&host.name).cloned().unwrap_or_default(),
            shared: Arc::clone(&self.shared),
        })
    }
}

fn record(shared: &Shared, host: &str, call: Call) {
    shared.calls.lock().push((host.to_string(), call));
}

struct MockSession {
    host: String,
    script: HostScript,
    shared: Arc<Shared>,
}

#[async_trait]
impl Session for MockSession {
    async fn connect(&mut self) -> Result<(), TodError> {
        record(&self.shared, &self.host, Call::Connect);
        if self.script.handshake_fails {
            return Err(TodError::Handshake {
                host: self.host.clone(),
                message: "Authentication failed".to_string(),
                suggestion: None,
            });
        }
        Ok(())
    }

    async fn add_session(&mut self) -> Result<(), TodError> {
        record(&self.shared, &self.host, Call::AddSession);
        Ok(())
    }

    async fn run(&mut self, command: &str) -> Result<CommandResult, TodError> {
        record(&self.shared, &self.host, Call::Run(command.to_string()));

        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }

        let index = {
            let mut runs = self.shared.runs.lock();
            let counter = runs.entry(self.host.clone()).or_insert(0);
            let index = *counter;
            *counter += 1;
            index
        };

        match self.script.fail_at {
            Some((at, RunFailure::Transport)) if at == index => Err(TodError::Execution {
                host: self.host.clone(),
                command: command.to_string(),
                message: "Channel closed unexpectedly".to_string(),
                stderr: None,
            }),
            Some((at, RunFailure::ExitCode(code))) if at == index => Ok(CommandResult {
                stdout: String::new(),
                stderr: format!("{}: failed", command),
                exit_code: code,
            }),
            _ => {
                self.shared
                    .executed
                    .lock()
                    .push((self.host.clone(), command.to_string()));
                Ok(CommandResult {
                    stdout: format!("{} on {}", command, self.host),
                    stderr: String::new(),
                    exit_code: 0,
                })
            }
        }
    }

    fn close(&mut self) {
        record(&self.shared, &self.host, Call::Close);
    }
}
