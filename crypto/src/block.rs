//! Block ids, signing and structural verification.

use std::collections::HashSet;

use ark_types::{Amount, Block, BlockHeader, BlockId, Milestone, PrivateKey, Signature, Transaction};
use rayon::prelude::*;

use crate::{
    blake2b_256, blake2b_256_multi, compute_transaction_id, sign_message, transaction_size,
    verify_signature, verify_transaction_signature, CryptoError,
};

/// Outcome of `verify_block`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockVerification {
    pub verified: bool,
    pub errors: Vec<String>,
    /// The block carries multi-signature transactions whose participant
    /// signatures can only be checked against ledger state.
    pub contains_multi_signatures: bool,
}

/// Block id: Blake2b-256 of the header with id and signature cleared.
pub fn compute_block_id(header: &BlockHeader) -> Result<BlockId, CryptoError> {
    let mut unsigned = header.clone();
    unsigned.id = BlockId::ZERO;
    unsigned.block_signature = Signature::ZERO;
    Ok(BlockId::new(blake2b_256(&bincode::serialize(&unsigned)?)))
}

/// Blake2b-256 over the concatenated transaction ids.
pub fn compute_payload_hash(transactions: &[Transaction]) -> [u8; 32] {
    let ids: Vec<&[u8]> = transactions.iter().map(|tx| tx.id.as_bytes().as_slice()).collect();
    blake2b_256_multi(&ids)
}

/// Fill in the payload fields from the transactions, then compute the id and
/// sign it with the generator key.
pub fn sign_block(block: &mut Block, private: &PrivateKey) -> Result<(), CryptoError> {
    let mut payload_length = 0u64;
    for tx in &block.transactions {
        payload_length += transaction_size(tx)?;
    }
    let header = &mut block.header;
    header.number_of_transactions = block.transactions.len() as u32;
    header.total_amount = block.transactions.iter().map(|tx| tx.amount).sum();
    header.total_fee = block.transactions.iter().map(|tx| tx.fee).sum();
    header.payload_length = u32::try_from(payload_length).unwrap_or(u32::MAX);
    header.payload_hash = compute_payload_hash(&block.transactions);
    header.id = compute_block_id(header)?;
    header.block_signature = sign_message(header.id.as_bytes(), private);
    Ok(())
}

fn verify_transaction(tx: &Transaction) -> Result<bool, String> {
    let id = compute_transaction_id(tx).map_err(|e| e.to_string())?;
    if id != tx.id {
        return Err(format!("invalid transaction id {}", tx.id));
    }
    if tx.has_multi_signatures() {
        // A registration also carries the sender signature.
        if tx.signature.is_some() && !verify_transaction_signature(tx, &tx.sender_public_key) {
            return Err(format!("invalid transaction signature {}", tx.id));
        }
        return Ok(true);
    }
    if !verify_transaction_signature(tx, &tx.sender_public_key) {
        return Err(format!("invalid transaction signature {}", tx.id));
    }
    Ok(false)
}

/// Structural and cryptographic verification of a block against the
/// milestone active at its height.
pub fn verify_block(block: &Block, milestone: &Milestone) -> BlockVerification {
    let header = &block.header;
    let mut result = BlockVerification::default();

    match compute_block_id(header) {
        Ok(id) if id == header.id => {}
        Ok(_) => result.errors.push("invalid block id".into()),
        Err(e) => result.errors.push(e.to_string()),
    }
    if !verify_signature(header.id.as_bytes(), &header.block_signature, &header.generator_public_key)
    {
        result.errors.push("failed to verify block signature".into());
    }
    if header.version != 0 {
        result.errors.push("invalid block version".into());
    }
    if header.height != 1 && header.reward != milestone.reward {
        result.errors.push(format!(
            "invalid block reward: {} expected: {}",
            header.reward, milestone.reward
        ));
    }
    if !block.transaction_count_matches() {
        result.errors.push("invalid number of transactions".into());
    }
    if block.transactions.len() > milestone.max_transactions as usize {
        result.errors.push("transactions length is too high".into());
    }

    let mut ids = HashSet::with_capacity(block.transactions.len());
    let mut payload_length = 0u64;
    for tx in &block.transactions {
        if !ids.insert(tx.id) {
            result.errors.push(format!("encountered duplicate transaction: {}", tx.id));
        }
        match transaction_size(tx) {
            Ok(size) => payload_length += size,
            Err(e) => result.errors.push(e.to_string()),
        }
    }
    if payload_length != u64::from(header.payload_length) {
        result.errors.push("invalid payload length".into());
    }

    let checks: Vec<Result<bool, String>> =
        block.transactions.par_iter().map(verify_transaction).collect();
    for check in checks {
        match check {
            Ok(multi) => result.contains_multi_signatures |= multi,
            Err(e) => result.errors.push(e),
        }
    }

    let total_amount: Amount = block.transactions.iter().map(|tx| tx.amount).sum();
    if total_amount != header.total_amount {
        result.errors.push("invalid total amount".into());
    }
    let total_fee: Amount = block.transactions.iter().map(|tx| tx.fee).sum();
    if total_fee != header.total_fee {
        result.errors.push("invalid total fee".into());
    }
    if compute_payload_hash(&block.transactions) != header.payload_hash {
        result.errors.push("invalid payload hash".into());
    }

    result.verified = result.errors.is_empty();
    result
}
