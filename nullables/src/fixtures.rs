//! Signed transactions and blocks for tests.
//!
//! Keys are derived from a one-byte seed so every test speaks about the
//! same wallets. Builders sign on `sign`, filling ids, payload fields and
//! signatures the way a real forger would.

use ark_crypto::{derive_address, keypair_from_seed, sign_block, sign_transaction};
use ark_types::{
    Address, Amount, Block, BlockHeader, BlockId, CoreTransactionType, Exceptions, KeyPair,
    Milestone, Milestones, NetworkConfig, Payment, Signature, Transaction, TransactionAsset,
    TransactionId, Vote, CORE_TYPE_GROUP,
};

pub fn keypair(seed: u8) -> KeyPair {
    keypair_from_seed(&[seed; 32])
}

pub fn address(keys: &KeyPair) -> Address {
    derive_address(&keys.public)
}

/// Parameters from `height` on: 8 second slots, 51 delegates, no reward.
pub fn milestone(height: u64, aip11: bool) -> Milestone {
    Milestone {
        height,
        blocktime: 8,
        active_delegates: 51,
        reward: Amount::ZERO,
        aip11,
        max_transactions: 150,
    }
}

/// A network whose epoch is the unix epoch, so network time equals unix
/// time in seconds.
pub fn network_config(milestones: Vec<Milestone>) -> NetworkConfig {
    let milestones = match Milestones::new(milestones) {
        Ok(milestones) => milestones,
        Err(e) => panic!("invalid fixture milestones: {e}"),
    };
    NetworkConfig { epoch: 0, milestones, exceptions: Exceptions::default() }
}

// ── Transactions ────────────────────────────────────────────────────────

pub struct TransactionBuilder {
    tx: Transaction,
}

impl TransactionBuilder {
    /// A version 2 transaction with nonce 1 and a fee of 10.
    pub fn new(ty: CoreTransactionType, sender: &KeyPair) -> Self {
        Self {
            tx: Transaction {
                id: TransactionId::ZERO,
                version: 2,
                type_group: CORE_TYPE_GROUP,
                transaction_type: ty.as_u16(),
                nonce: Some(1),
                timestamp: None,
                sender_public_key: sender.public,
                recipient_id: None,
                amount: Amount::ZERO,
                fee: Amount::new(10),
                vendor_field: None,
                asset: None,
                signature: None,
                second_signature: None,
                signatures: Vec::new(),
            },
        }
    }

    /// Version 1 transactions carry a timestamp instead of a nonce.
    pub fn version(mut self, version: u8) -> Self {
        self.tx.version = version;
        if version < 2 {
            self.tx.nonce = None;
            self.tx.timestamp = Some(0);
        }
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.tx.nonce = Some(nonce);
        self
    }

    pub fn amount(mut self, amount: u64) -> Self {
        self.tx.amount = Amount::new(amount);
        self
    }

    pub fn fee(mut self, fee: u64) -> Self {
        self.tx.fee = Amount::new(fee);
        self
    }

    pub fn recipient(mut self, recipient: &Address) -> Self {
        self.tx.recipient_id = Some(recipient.clone());
        self
    }

    pub fn asset(mut self, asset: TransactionAsset) -> Self {
        self.tx.asset = Some(asset);
        self
    }

    pub fn sign(mut self, sender: &KeyPair) -> Transaction {
        // Fixture keys always sign.
        if let Err(e) = sign_transaction(&mut self.tx, &sender.private) {
            panic!("cannot sign fixture transaction: {e}");
        }
        self.tx
    }
}

pub fn transfer(sender: &KeyPair, recipient: &Address, amount: u64, fee: u64, nonce: u64) -> Transaction {
    TransactionBuilder::new(CoreTransactionType::Transfer, sender)
        .recipient(recipient)
        .amount(amount)
        .fee(fee)
        .nonce(nonce)
        .sign(sender)
}

pub fn delegate_registration(sender: &KeyPair, username: &str, nonce: u64) -> Transaction {
    TransactionBuilder::new(CoreTransactionType::DelegateRegistration, sender)
        .asset(TransactionAsset::Delegate { username: username.into() })
        .fee(25)
        .nonce(nonce)
        .sign(sender)
}

pub fn vote(sender: &KeyPair, votes: Vec<Vote>, nonce: u64) -> Transaction {
    TransactionBuilder::new(CoreTransactionType::Vote, sender)
        .asset(TransactionAsset::Votes(votes))
        .fee(1)
        .nonce(nonce)
        .sign(sender)
}

pub fn multi_payment(sender: &KeyPair, payments: &[(&Address, u64)], nonce: u64) -> Transaction {
    let payments = payments
        .iter()
        .map(|(recipient, amount)| Payment {
            amount: Amount::new(*amount),
            recipient_id: (*recipient).clone(),
        })
        .collect();
    TransactionBuilder::new(CoreTransactionType::MultiPayment, sender)
        .asset(TransactionAsset::Payments(payments))
        .fee(5)
        .nonce(nonce)
        .sign(sender)
}

// ── Blocks ──────────────────────────────────────────────────────────────

pub struct BlockBuilder {
    block: Block,
}

impl BlockBuilder {
    /// A block at `height` pointing at `previous`, forged at `height * 8`.
    pub fn new(height: u64, previous: BlockId) -> Self {
        Self {
            block: Block::new(
                BlockHeader {
                    id: BlockId::ZERO,
                    version: 0,
                    height,
                    previous_block: previous,
                    timestamp: u32::try_from(height.saturating_sub(1) * 8).unwrap_or(u32::MAX),
                    generator_public_key: keypair(0).public,
                    number_of_transactions: 0,
                    total_amount: Amount::ZERO,
                    total_fee: Amount::ZERO,
                    reward: Amount::ZERO,
                    payload_length: 0,
                    payload_hash: [0; 32],
                    block_signature: Signature::ZERO,
                },
                Vec::new(),
            ),
        }
    }

    /// The child of `parent`, 8 seconds later.
    pub fn on_top_of(parent: &Block) -> Self {
        Self::new(parent.height() + 1, parent.id()).timestamp(parent.timestamp() + 8)
    }

    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.block.header.timestamp = timestamp;
        self
    }

    pub fn reward(mut self, reward: u64) -> Self {
        self.block.header.reward = Amount::new(reward);
        self
    }

    pub fn transactions(mut self, transactions: Vec<Transaction>) -> Self {
        self.block.transactions = transactions;
        self
    }

    pub fn sign(mut self, generator: &KeyPair) -> Block {
        self.block.header.generator_public_key = generator.public;
        if let Err(e) = sign_block(&mut self.block, &generator.private) {
            panic!("cannot sign fixture block: {e}");
        }
        self.block
    }
}

/// A genesis block forged by `generator`. It pays each `(keys, amount)` from
/// the generator, then registers each `(keys, username)` as a delegate.
pub fn genesis_block(
    generator: &KeyPair,
    funds: &[(&KeyPair, u64)],
    delegates: &[(&KeyPair, &str)],
) -> Block {
    let mut transactions = Vec::new();
    for (nonce, (keys, amount)) in (1u64..).zip(funds) {
        transactions.push(transfer(generator, &address(keys), *amount, 0, nonce));
    }
    for (keys, username) in delegates {
        transactions.push(delegate_registration(keys, username, 1));
    }
    BlockBuilder::new(1, BlockId::ZERO).timestamp(0).transactions(transactions).sign(generator)
}

/// `len` empty blocks on top of `parent`, all forged by `generator`.
pub fn empty_chain(parent: &Block, len: usize, generator: &KeyPair) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::with_capacity(len);
    for _ in 0..len {
        let previous = blocks.last().unwrap_or(parent);
        let next = BlockBuilder::on_top_of(previous).sign(generator);
        blocks.push(next);
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_crypto::verify_block;
    use ark_types::Milestones;

    #[test]
    fn fixture_blocks_verify() {
        let generator = keypair(1);
        let genesis = genesis_block(&generator, &[(&keypair(2), 100)], &[(&keypair(3), "d3")]);
        let milestone = Milestones::default().at(1).clone();
        assert!(verify_block(&genesis, &milestone).verified);
        assert_eq!(genesis.transactions.len(), 2);

        let chain = empty_chain(&genesis, 3, &generator);
        assert_eq!(chain[2].height(), 4);
        assert_eq!(chain[1].previous_block(), chain[0].id());
        assert_eq!(chain[0].timestamp(), 8);
    }
}
