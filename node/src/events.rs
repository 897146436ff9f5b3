//! Events emitted by the blockchain service for subscribers.

use ark_types::BlockId;

use crate::state_machine::{BlockchainState, Event};

/// Observable blockchain events, delivered through the [`EventBus`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockchainEvent {
    /// An incoming block was queued for processing.
    BlockReceived { id: BlockId, height: u64 },
    /// An incoming block was dropped because the node is not started.
    BlockDisregarded { id: BlockId, height: u64 },
    /// A block was applied to the ledger.
    BlockApplied { id: BlockId, height: u64 },
    /// A block was reverted from the ledger.
    BlockReverted { id: BlockId, height: u64 },
    ForkDetected { id: BlockId, height: u64 },
    StateTransition { event: Event, from: BlockchainState, to: BlockchainState },
    /// The node finished its first sync and accepts new blocks.
    StateStarted,
    RoundDeleted { round: u64 },
}

/// Synchronous fan-out event bus.
///
/// Listeners run inline on the emitting task; keep them fast to avoid
/// stalling block processing.
pub struct EventBus {
    listeners: Vec<Box<dyn Fn(&BlockchainEvent) + Send + Sync>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { listeners: Vec::new() }
    }

    pub fn subscribe(&mut self, listener: Box<dyn Fn(&BlockchainEvent) + Send + Sync>) {
        self.listeners.push(listener);
    }

    pub fn emit(&self, event: &BlockchainEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
