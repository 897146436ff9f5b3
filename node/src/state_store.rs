//! Mutable chain state held by the blockchain service.
//!
//! Everything here is owned by the service's core lock: the state machine
//! value, the last applied and last downloaded blocks, the sync counters and
//! the window of recent blocks.

use ark_store::{Store, StoreError, TransactionRepository};
use ark_types::{Block, BlockId, Transaction, TransactionId};

use crate::recent_blocks::RecentBlocks;
use crate::state_machine::BlockchainState;

/// Repeated sightings of the current tip, tracked to spot peers relaying
/// the same block over and over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockPing {
    pub count: u32,
    pub first_ms: u64,
    pub last_ms: u64,
    pub id: BlockId,
    pub height: u64,
}

#[derive(Debug)]
pub struct ChainState {
    pub blockchain: BlockchainState,
    /// Set once the first sync completed; new blocks are ignored before.
    pub started: bool,
    pub last_downloaded_block: Option<Block>,
    /// Download attempts in a row that returned nothing usable.
    pub no_block_counter: u32,
    /// Sync checks in a row that found the node behind.
    pub p2p_update_counter: u32,
    /// Blocks to remove on the next fork recovery, when the network said so.
    pub number_of_blocks_to_rollback: Option<u64>,
    pub forked_block: Option<Block>,
    pub restored_database_integrity: bool,
    pub recent: RecentBlocks,
    pub block_ping: Option<BlockPing>,
}

impl ChainState {
    pub fn new(max_last_blocks: usize) -> Self {
        Self {
            blockchain: BlockchainState::Uninitialised,
            started: false,
            last_downloaded_block: None,
            no_block_counter: 0,
            p2p_update_counter: 0,
            number_of_blocks_to_rollback: None,
            forked_block: None,
            restored_database_integrity: false,
            recent: RecentBlocks::new(max_last_blocks),
            block_ping: None,
        }
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.recent.last()
    }

    pub fn last_height(&self) -> u64 {
        self.last_block().map_or(0, Block::height)
    }

    pub fn set_last_block(&mut self, block: Block) {
        self.recent.set_last(block);
    }

    /// Count another sighting of `block` if it is the one being pinged.
    pub fn ping_block(&mut self, block: &Block, now_ms: u64) -> bool {
        match &mut self.block_ping {
            Some(ping) if ping.height == block.height() && ping.id == block.id() => {
                ping.count += 1;
                ping.last_ms = now_ms;
                true
            }
            _ => false,
        }
    }

    /// Start tracking sightings of `block`.
    pub fn push_ping_block(&mut self, block: &Block, now_ms: u64) {
        if let Some(ping) = &self.block_ping {
            if ping.count > 1 {
                tracing::info!(
                    height = ping.height,
                    id = %ping.id,
                    count = ping.count,
                    elapsed_ms = ping.last_ms.saturating_sub(ping.first_ms),
                    "block was pinged repeatedly"
                );
            }
        }
        self.block_ping = Some(BlockPing {
            count: 1,
            first_ms: now_ms,
            last_ms: now_ms,
            id: block.id(),
            height: block.height(),
        });
    }
}

/// Transaction lookup over the recent window first, then the store. Used
/// while reverting blocks whose transactions may not be persisted.
pub struct ChainTransactions<'a> {
    pub recent: &'a RecentBlocks,
    pub store: &'a dyn Store,
}

impl TransactionRepository for ChainTransactions<'_> {
    fn find_transaction_by_id(&self, id: &TransactionId) -> Result<Option<Transaction>, StoreError> {
        if let Some(tx) = self.recent.find_transaction(id) {
            return Ok(Some(tx.clone()));
        }
        self.store.find_transaction_by_id(id)
    }
}
