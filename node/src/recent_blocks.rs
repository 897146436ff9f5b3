//! Bounded window of the most recently applied blocks.
//!
//! The block processor consults the window to recognise blocks it has
//! already applied and transactions that were forged but may not be
//! persisted yet. The window is ordered by height. Setting a block at or
//! below the current top first drops everything from that height up.

use std::collections::{HashMap, HashSet, VecDeque};

use ark_types::{Block, BlockId, Transaction, TransactionId};

#[derive(Debug)]
pub struct RecentBlocks {
    blocks: VecDeque<Block>,
    block_ids: HashSet<BlockId>,
    /// Transaction id → height of the block carrying it.
    transactions: HashMap<TransactionId, u64>,
    capacity: usize,
}

impl RecentBlocks {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            blocks: VecDeque::with_capacity(capacity),
            block_ids: HashSet::with_capacity(capacity),
            transactions: HashMap::new(),
            capacity,
        }
    }

    /// Make `block` the top of the window.
    pub fn set_last(&mut self, block: Block) {
        while self.blocks.back().is_some_and(|top| top.height() >= block.height()) {
            if let Some(dropped) = self.blocks.pop_back() {
                self.unindex(&dropped);
            }
        }

        self.block_ids.insert(block.id());
        for tx in &block.transactions {
            self.transactions.insert(tx.id, block.height());
        }
        self.blocks.push_back(block);

        while self.blocks.len() > self.capacity {
            if let Some(evicted) = self.blocks.pop_front() {
                self.unindex(&evicted);
            }
        }
    }

    fn unindex(&mut self, block: &Block) {
        self.block_ids.remove(&block.id());
        for tx in &block.transactions {
            self.transactions.remove(&tx.id);
        }
    }

    pub fn last(&self) -> Option<&Block> {
        self.blocks.back()
    }

    pub fn contains_block(&self, id: &BlockId) -> bool {
        self.block_ids.contains(id)
    }

    pub fn contains_transaction(&self, id: &TransactionId) -> bool {
        self.transactions.contains_key(id)
    }

    pub fn find_transaction(&self, id: &TransactionId) -> Option<&Transaction> {
        let height = *self.transactions.get(id)?;
        self.blocks
            .iter()
            .rev()
            .find(|block| block.height() == height)
            .and_then(|block| block.transactions.iter().find(|tx| tx.id == *id))
    }

    /// Blocks in the window, lowest first.
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.block_ids.clear();
        self.transactions.clear();
    }
}
