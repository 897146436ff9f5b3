//! Block persistence.

use crate::StoreError;
use ark_types::{Block, BlockId, TransactionId};

/// Persisted canonical chain, addressed by height and id.
pub trait BlockRepository {
    /// Persist blocks as one unit: either all are stored or none.
    fn save_blocks(&self, blocks: &[Block]) -> Result<(), StoreError>;

    /// Remove a block (the current persisted tip) and its transactions.
    fn revert_block(&self, block: &Block) -> Result<(), StoreError>;

    /// Remove several blocks from the top, highest first.
    fn delete_blocks(&self, blocks: &[Block]) -> Result<(), StoreError> {
        let mut sorted: Vec<&Block> = blocks.iter().collect();
        sorted.sort_by_key(|b| std::cmp::Reverse(b.height()));
        for block in sorted {
            self.revert_block(block)?;
        }
        Ok(())
    }

    fn get_last_block(&self) -> Result<Option<Block>, StoreError>;

    fn find_block_by_id(&self, id: &BlockId) -> Result<Option<Block>, StoreError>;

    /// Blocks with `from <= height <= to`, ascending.
    fn get_blocks(&self, from: u64, to: u64) -> Result<Vec<Block>, StoreError>;

    /// The `count` highest blocks, ascending.
    fn get_top_blocks(&self, count: usize) -> Result<Vec<Block>, StoreError>;

    /// The subset of `ids` that belong to persisted blocks.
    fn get_forged_transaction_ids(
        &self,
        ids: &[TransactionId],
    ) -> Result<Vec<TransactionId>, StoreError>;
}
