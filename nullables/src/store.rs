//! Nullable store: thread-safe in-memory chain, transaction and round storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use ark_store::{BlockRepository, Delegate, RoundRepository, StoreError, TransactionRepository};
use ark_types::{Block, BlockId, RoundInfo, Transaction, TransactionId};

#[derive(Default)]
struct Inner {
    blocks: BTreeMap<u64, Block>,
    /// Transaction id → height of the block holding it.
    transactions: HashMap<TransactionId, u64>,
    rounds: BTreeMap<u64, Vec<Delegate>>,
    /// Returned for rounds that were never saved.
    default_delegates: Vec<Delegate>,
    failing_saves: usize,
    failing_round_deletes: usize,
    deleted_rounds: Vec<u64>,
}

/// An in-memory store for testing. Saves obey the same chaining rule as a
/// real backend: every block must extend the persisted tip.
#[derive(Default)]
pub struct NullStore {
    inner: Mutex<Inner>,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every round resolves to `delegates` unless saved otherwise.
    pub fn with_delegates(delegates: Vec<Delegate>) -> Self {
        let store = Self::new();
        store.inner().default_delegates = delegates;
        store
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `count` calls to `save_blocks` fail without writing.
    pub fn fail_next_saves(&self, count: usize) {
        self.inner().failing_saves = count;
    }

    /// Make the next `count` calls to `delete_round` fail without deleting.
    pub fn fail_next_round_deletes(&self, count: usize) {
        self.inner().failing_round_deletes = count;
    }

    pub fn block_count(&self) -> usize {
        self.inner().blocks.len()
    }

    /// Rounds removed through `delete_round`, in call order.
    pub fn deleted_rounds(&self) -> Vec<u64> {
        self.inner().deleted_rounds.clone()
    }

    /// Write `blocks` without the chaining check, e.g. to plant a corrupt tip.
    pub fn insert_unchecked(&self, blocks: &[Block]) {
        let mut inner = self.inner();
        for block in blocks {
            index_block(&mut inner, block);
        }
    }
}

fn index_block(inner: &mut Inner, block: &Block) {
    for tx in &block.transactions {
        inner.transactions.insert(tx.id, block.height());
    }
    inner.blocks.insert(block.height(), block.clone());
}

impl BlockRepository for NullStore {
    fn save_blocks(&self, blocks: &[Block]) -> Result<(), StoreError> {
        let mut inner = self.inner();
        if inner.failing_saves > 0 {
            inner.failing_saves -= 1;
            return Err(StoreError::Backend("injected save failure".into()));
        }

        let mut tip = inner.blocks.values().next_back().map(|b| (b.height(), b.id()));
        for block in blocks {
            let chained = match tip {
                None => block.is_genesis(),
                Some((height, id)) => block.height() == height + 1 && block.previous_block() == id,
            };
            if !chained {
                return Err(StoreError::NotChained { height: block.height() });
            }
            tip = Some((block.height(), block.id()));
        }

        for block in blocks {
            index_block(&mut inner, block);
        }
        tracing::trace!(count = blocks.len(), "null store saved blocks");
        Ok(())
    }

    fn revert_block(&self, block: &Block) -> Result<(), StoreError> {
        let mut inner = self.inner();
        let is_tip = inner
            .blocks
            .values()
            .next_back()
            .is_some_and(|tip| tip.id() == block.id());
        if !is_tip {
            return Err(StoreError::NotFound(block.id().to_hex()));
        }
        if let Some(removed) = inner.blocks.remove(&block.height()) {
            for tx in &removed.transactions {
                inner.transactions.remove(&tx.id);
            }
        }
        Ok(())
    }

    fn get_last_block(&self) -> Result<Option<Block>, StoreError> {
        Ok(self.inner().blocks.values().next_back().cloned())
    }

    fn find_block_by_id(&self, id: &BlockId) -> Result<Option<Block>, StoreError> {
        Ok(self.inner().blocks.values().find(|b| b.id() == *id).cloned())
    }

    fn get_blocks(&self, from: u64, to: u64) -> Result<Vec<Block>, StoreError> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self.inner().blocks.range(from..=to).map(|(_, b)| b.clone()).collect())
    }

    fn get_top_blocks(&self, count: usize) -> Result<Vec<Block>, StoreError> {
        let inner = self.inner();
        let mut top: Vec<Block> = inner.blocks.values().rev().take(count).cloned().collect();
        top.reverse();
        Ok(top)
    }

    fn get_forged_transaction_ids(
        &self,
        ids: &[TransactionId],
    ) -> Result<Vec<TransactionId>, StoreError> {
        let inner = self.inner();
        Ok(ids.iter().filter(|id| inner.transactions.contains_key(id)).copied().collect())
    }
}

impl TransactionRepository for NullStore {
    fn find_transaction_by_id(
        &self,
        id: &TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        let inner = self.inner();
        let found = inner
            .transactions
            .get(id)
            .and_then(|height| inner.blocks.get(height))
            .and_then(|block| block.transactions.iter().find(|tx| tx.id == *id))
            .cloned();
        Ok(found)
    }
}

impl RoundRepository for NullStore {
    fn get_active_delegates(&self, round: &RoundInfo) -> Result<Vec<Delegate>, StoreError> {
        let inner = self.inner();
        Ok(inner
            .rounds
            .get(&round.round)
            .cloned()
            .unwrap_or_else(|| inner.default_delegates.clone()))
    }

    fn save_round(&self, round: u64, delegates: &[Delegate]) -> Result<(), StoreError> {
        self.inner().rounds.insert(round, delegates.to_vec());
        Ok(())
    }

    fn delete_round(&self, round: u64) -> Result<(), StoreError> {
        let mut inner = self.inner();
        if inner.failing_round_deletes > 0 {
            inner.failing_round_deletes -= 1;
            return Err(StoreError::Backend("injected round delete failure".into()));
        }
        inner.rounds.remove(&round);
        inner.deleted_rounds.push(round);
        Ok(())
    }
}
