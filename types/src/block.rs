//! Block data model.

use serde::{Deserialize, Serialize};

use crate::{Amount, BlockId, PublicKey, Signature, Transaction};

/// Everything in a block except its transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub id: BlockId,
    pub version: u8,
    pub height: u64,
    /// Id of the parent block; zero for genesis.
    pub previous_block: BlockId,
    /// Seconds since the network epoch.
    pub timestamp: u32,
    pub generator_public_key: PublicKey,
    pub number_of_transactions: u32,
    pub total_amount: Amount,
    pub total_fee: Amount,
    pub reward: Amount,
    pub payload_length: u32,
    /// Blake2b-256 over the concatenated transaction ids.
    pub payload_hash: [u8; 32],
    pub block_signature: Signature,
}

/// A block together with its transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self { header, transactions }
    }

    pub fn id(&self) -> BlockId {
        self.header.id
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn previous_block(&self) -> BlockId {
        self.header.previous_block
    }

    pub fn timestamp(&self) -> u32 {
        self.header.timestamp
    }

    pub fn generator_public_key(&self) -> &PublicKey {
        &self.header.generator_public_key
    }

    pub fn is_genesis(&self) -> bool {
        self.header.height == 1
    }

    /// Whether the header's declared transaction count matches the body.
    pub fn transaction_count_matches(&self) -> bool {
        self.header.number_of_transactions as usize == self.transactions.len()
    }

    /// Sum of the fees of all contained transactions.
    pub fn summed_fees(&self) -> Amount {
        self.transactions.iter().map(|tx| tx.fee).sum()
    }

    /// Sum of the amounts of all contained transactions.
    pub fn summed_amounts(&self) -> Amount {
        self.transactions.iter().map(|tx| tx.amount).sum()
    }
}
