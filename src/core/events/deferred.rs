//=========================================================================
// Deferred Emissions
//=========================================================================
//
// Zero-delay emission queue drained by the cooperative scheduler.
//
// Architecture:
//   emit_async() → Sender<DeferredEmit> → [queue] → drain(max) → emit()
//
// Deferred emissions keep their relative order. Nothing orders them
// against synchronous code that runs before the next drain.
//
//=========================================================================

//=== External Dependencies ===============================================

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::warn;
use serde_json::Value;

//=== DeferredEmit ========================================================

/// One emission scheduled for the next tick.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredEmit {
    pub event: String,
    pub args: Vec<Value>,
}

//=== DeferredQueue =======================================================

/// FIFO of deferred emissions.
///
/// Producers may hold a cloned [`Sender`] (see [`DeferredQueue::handle`])
/// to schedule emissions from inside listeners.
pub(crate) struct DeferredQueue {
    sender: Sender<DeferredEmit>,
    receiver: Receiver<DeferredEmit>,
}

impl DeferredQueue {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub(crate) fn push(&self, event: &str, args: Vec<Value>) {
        // Both ends live in self, the channel cannot be disconnected here.
        let _ = self.sender.send(DeferredEmit {
            event: event.to_string(),
            args,
        });
    }

    pub(crate) fn handle(&self) -> Sender<DeferredEmit> {
        self.sender.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Takes at most `max` queued emissions, oldest first.
    pub(crate) fn drain(&self, max: usize) -> Vec<DeferredEmit> {
        let mut out = Vec::new();

        while out.len() < max {
            match self.receiver.try_recv() {
                Ok(item) => out.push(item),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        if out.len() >= max && !self.receiver.is_empty() {
            warn!(
                "Deferred emission backlog: drained {} events, {} still queued",
                out.len(),
                self.receiver.len()
            );
        }

        out
    }

    pub(crate) fn clear(&self) {
        while self.receiver.try_recv().is_ok() {}
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
