//! Worker pool registry (spec §4.2/C3) — tracks live worker sinks and
//! performs round-robin selection. Modified only from Tier A.

use tokio::sync::mpsc;

use super::types::QueueActivity;

pub type WorkerId = u64;

/// Message exchanged on the Tier A → Tier B control plane.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    Activity(QueueActivity),
    Shutdown,
}

/// The small `{send, close}` capability a worker exposes to the distributor.
/// `UnboundedSender::send` never awaits the receiver, giving the
/// fire-and-forget delivery the spec requires.
#[derive(Clone)]
pub struct WorkerHandle {
    pub id: WorkerId,
    pub sink: mpsc::UnboundedSender<WorkerMessage>,
}

#[derive(Default)]
pub struct WorkerRegistry {
    workers: Vec<WorkerHandle>,
    next_index: usize,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handle: WorkerHandle) {
        self.workers.push(handle);
    }

    pub fn unregister(&mut self, id: WorkerId) {
        self.workers.retain(|w| w.id != id);
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Select the next sink by round robin, advancing the index modulo the
    /// registry size captured at call time. Returns a cloned sender so the
    /// caller can send without holding a borrow of the registry.
    pub fn select_sink(&mut self) -> Option<mpsc::UnboundedSender<WorkerMessage>> {
        if self.workers.is_empty() {
            return None;
        }
        let len = self.workers.len();
        let idx = self.next_index % len;
        self.next_index = self.next_index.wrapping_add(1);
        self.workers.get(idx).map(|w| w.sink.clone())
    }

    pub fn broadcast_shutdown(&self) {
        for w in &self.workers {
            let _ = w.sink.send(WorkerMessage::Shutdown);
        }
    }
}
