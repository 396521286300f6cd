//=========================================================================
// Transport
//=========================================================================
//
// Narrow interface to the network layer.
//
// Architecture:
//   StageEngine ──send──> Transport ──> (socket, out of crate)
//   StageEngine ──buffer/take_buffer──> inbound messages held while the
//                                       engine is not ready or paused
//
// `MemoryTransport` hands sent messages to a crossbeam channel so a host
// (or a test) can observe them.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::VecDeque;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};

//=== Internal Dependencies ===============================================

use super::message::GameMessage;

//=== Transport ===========================================================

pub trait Transport {
    /// Fire-and-forget send.
    fn send(&mut self, msg: GameMessage);

    fn is_connected(&self) -> bool;

    /// Holds an inbound message until the engine can process it.
    fn buffer(&mut self, msg: GameMessage);

    /// Removes and returns every buffered message, oldest first.
    fn take_buffer(&mut self) -> Vec<GameMessage>;

    /// Drops buffered messages without processing them.
    fn erase_buffer(&mut self);

    fn buffered(&self) -> usize;

    /// Whether sent messages are kept in a journal.
    fn journal_on(&self) -> bool {
        false
    }

    fn clear_journal(&mut self) {}
}

//=== MemoryTransport =====================================================

pub struct MemoryTransport {
    outbox: Sender<GameMessage>,
    connected: bool,
    buffer: VecDeque<GameMessage>,
    journal: Option<Vec<GameMessage>>,
}

impl MemoryTransport {
    /// Creates a connected transport and the receiving end of its outbox.
    pub fn new() -> (Self, Receiver<GameMessage>) {
        let (tx, rx) = unbounded();
        let transport = Self {
            outbox: tx,
            connected: true,
            buffer: VecDeque::new(),
            journal: None,
        };
        (transport, rx)
    }

    pub fn with_journal(mut self) -> Self {
        self.journal = Some(Vec::new());
        self
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn journal(&self) -> &[GameMessage] {
        self.journal.as_deref().unwrap_or(&[])
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, msg: GameMessage) {
        if !self.connected {
            warn!("MemoryTransport.send: not connected. Found: {}.{}", msg.action, msg.target);
            return;
        }
        if let Some(journal) = self.journal.as_mut() {
            journal.push(msg.clone());
        }
        debug!("MemoryTransport: {}.{} → {}", msg.action, msg.target, msg.to);
        // A dropped receiver means nobody observes the outbox.
        let _ = self.outbox.send(msg);
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn buffer(&mut self, msg: GameMessage) {
        self.buffer.push_back(msg);
    }

    fn take_buffer(&mut self) -> Vec<GameMessage> {
        self.buffer.drain(..).collect()
    }

    fn erase_buffer(&mut self) {
        self.buffer.clear();
    }

    fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn journal_on(&self) -> bool {
        self.journal.is_some()
    }

    fn clear_journal(&mut self) {
        if let Some(journal) = self.journal.as_mut() {
            journal.clear();
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
