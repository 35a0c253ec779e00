//! Activity distributor (spec §4.2/C2) — routes accepted activity to one
//! worker round robin, buffering in an unbounded FIFO backlog when no worker
//! is registered.

use std::collections::VecDeque;

use tracing::debug;

use super::registry::{WorkerHandle, WorkerId, WorkerMessage, WorkerRegistry};
use super::types::QueueActivity;

pub struct Distributor {
    registry: WorkerRegistry,
    backlog: VecDeque<QueueActivity>,
}

impl Distributor {
    pub fn new() -> Self {
        Self {
            registry: WorkerRegistry::new(),
            backlog: VecDeque::new(),
        }
    }

    /// Route `activity` to the next worker by round robin, or append to the
    /// backlog if no worker is registered. Never awaits the worker.
    pub fn publish(&mut self, activity: QueueActivity) {
        match self.registry.select_sink() {
            Some(sink) => {
                let _ = sink.send(WorkerMessage::Activity(activity));
            }
            None => {
                debug!("no workers registered, buffering activity in backlog");
                self.backlog.push_back(activity);
            }
        }
    }

    /// Add a worker and drain the backlog round-robin across the current
    /// registry until it is empty or the registry empties again.
    pub fn register(&mut self, handle: WorkerHandle) {
        self.registry.register(handle);
        self.drain_backlog();
    }

    pub fn unregister(&mut self, id: WorkerId) {
        self.registry.unregister(id);
    }

    pub fn broadcast_shutdown(&self) {
        self.registry.broadcast_shutdown();
    }

    pub fn worker_count(&self) -> usize {
        self.registry.len()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    fn drain_backlog(&mut self) {
        while let Some(activity) = self.backlog.pop_front() {
            match self.registry.select_sink() {
                Some(sink) => {
                    let _ = sink.send(WorkerMessage::Activity(activity));
                }
                None => {
                    // registry emptied mid-drain; put it back and stop.
                    self.backlog.push_front(activity);
                    break;
                }
            }
        }
    }
}

impl Default for Distributor {
    fn default() -> Self {
        Self::new()
    }
}
