// Dispatch pool: arena of hosts and their command queues

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::command::Command;
use crate::inventory::Host;
use crate::output::terminal::{HostStats, RunRecap};

/// Index of a host in its dispatch pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub usize);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Mutable run state of one host
///
/// Invariants: `cursor <= commands.len()`, the cursor never moves back,
/// and `connected` never returns to true once cleared.
#[derive(Debug)]
pub struct HostQueue {
    commands: Vec<Command>,
    cursor: usize,
    connected: bool,
    working: bool,
    executed: usize,
    assigned: usize,
}

impl HostQueue {
    fn new() -> Self {
        HostQueue {
            commands: Vec::new(),
            cursor: 0,
            connected: true,
            working: false,
            executed: 0,
            assigned: 0,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Commands not yet executed
    pub fn pending(&self) -> usize {
        self.commands.len() - self.cursor
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_working(&self) -> bool {
        self.working
    }

    pub fn executed(&self) -> usize {
        self.executed
    }

    /// The command at the cursor, if any
    pub fn current(&self) -> Option<&Command> {
        self.commands.get(self.cursor)
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub(crate) fn append(&mut self, commands: &[Command]) {
        self.commands.extend_from_slice(commands);
        self.assigned += commands.len();
    }

    /// Move past the command at the cursor after it ran successfully
    pub(crate) fn advance(&mut self) {
        debug_assert!(self.cursor < self.commands.len());
        if self.cursor < self.commands.len() {
            self.cursor += 1;
            self.executed += 1;
        }
    }

    pub(crate) fn set_working(&mut self, working: bool) {
        self.working = working;
    }

    pub(crate) fn mark_disconnected(&mut self) {
        self.connected = false;
        self.working = false;
    }

    /// Disconnect and hand out everything past the cursor; the cursor then
    /// sits at the end of the queue
    pub(crate) fn take_unexecuted(&mut self) -> Vec<Command> {
        self.mark_disconnected();
        self.commands.split_off(self.cursor)
    }
}

/// One host with its guarded queue and its own wake-up signal
pub struct HostSlot {
    pub id: HostId,
    pub host: Host,
    queue: Mutex<HostQueue>,
    more_work: Notify,
}

impl HostSlot {
    fn new(id: HostId, host: Host) -> Self {
        HostSlot {
            id,
            host,
            queue: Mutex::new(HostQueue::new()),
            more_work: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.host.name
    }

    /// Run `f` with the queue locked. Keep `f` short; it must not await.
    pub fn with_queue<R>(&self, f: impl FnOnce(&mut HostQueue) -> R) -> R {
        f(&mut self.queue.lock())
    }

    pub fn is_connected(&self) -> bool {
        self.queue.lock().is_connected()
    }

    /// Append commands and wake this host's worker
    pub(crate) fn push_commands(&self, commands: &[Command]) {
        if commands.is_empty() {
            return;
        }
        self.queue.lock().append(commands);
        self.more_work.notify_one();
    }

    /// Wait until commands are appended. A notification sent while the
    /// worker was busy is kept and consumed by the next call.
    pub(crate) async fn wait_for_work(&self) {
        self.more_work.notified().await;
    }
}

/// All hosts of a run, addressed by `HostId`
pub struct DispatchPool {
    slots: Vec<HostSlot>,
}

impl DispatchPool {
    pub fn new(hosts: Vec<Host>) -> Self {
        let slots = hosts
            .into_iter()
            .enumerate()
            .map(|(i, host)| HostSlot::new(HostId(i), host))
            .collect();
        DispatchPool { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, id: HostId) -> &HostSlot {
        &self.slots[id.0]
    }

    pub fn slots(&self) -> impl Iterator<Item = &HostSlot> {
        self.slots.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = HostId> + '_ {
        self.slots.iter().map(|s| s.id)
    }

    /// Connected hosts, in pool order, leaving out `except`
    pub fn eligible(&self, except: Option<HostId>) -> Vec<HostId> {
        self.slots
            .iter()
            .filter(|s| Some(s.id) != except && s.is_connected())
            .map(|s| s.id)
            .collect()
    }

    /// Commands sitting in queues but not executed yet
    pub fn total_pending(&self) -> usize {
        self.slots
            .iter()
            .map(|s| s.with_queue(|q| q.pending()))
            .sum()
    }

    /// Snapshot of per-host statistics
    pub fn recap(&self) -> RunRecap {
        let hosts = self
            .slots
            .iter()
            .map(|s| {
                let stats = s.with_queue(|q| HostStats {
                    executed: q.executed,
                    assigned: q.assigned,
                    disconnected: !q.connected,
                });
                (s.name().to_string(), stats)
            })
            .collect();

        RunRecap {
            hosts,
            ..Default::default()
        }
    }
}
