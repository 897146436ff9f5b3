//! Transaction ids, signing hashes and signature checks.
//!
//! Three digests are derived from a transaction:
//! - the **id**: everything except the id itself;
//! - the **signing hash**: everything except the id and all signatures, signed
//!   by the sender and by each multi-signature participant;
//! - the **second signing hash**: the signing hash input plus the first
//!   signature, signed by the registered second key.

use ark_types::{MultiSignatureEntry, PrivateKey, PublicKey, Transaction, TransactionId};

use crate::{blake2b_256, blake2b_256_multi, sign_message, verify_signature, CryptoError};

fn digest_of(tx: &Transaction) -> Result<[u8; 32], CryptoError> {
    Ok(blake2b_256(&bincode::serialize(tx)?))
}

fn signing_hash(tx: &Transaction) -> Result<[u8; 32], CryptoError> {
    let mut unsigned = tx.clone();
    unsigned.id = TransactionId::ZERO;
    unsigned.signature = None;
    unsigned.second_signature = None;
    unsigned.signatures.clear();
    digest_of(&unsigned)
}

fn second_signing_hash(tx: &Transaction) -> Result<[u8; 32], CryptoError> {
    let mut unsigned = tx.clone();
    unsigned.id = TransactionId::ZERO;
    unsigned.second_signature = None;
    unsigned.signatures.clear();
    digest_of(&unsigned)
}

/// Compute the id of a transaction from all of its other fields.
pub fn compute_transaction_id(tx: &Transaction) -> Result<TransactionId, CryptoError> {
    let mut without_id = tx.clone();
    without_id.id = TransactionId::ZERO;
    Ok(TransactionId::new(digest_of(&without_id)?))
}

/// Serialized size in bytes, used for payload length and dynamic fees.
pub fn transaction_size(tx: &Transaction) -> Result<u64, CryptoError> {
    Ok(bincode::serialized_size(tx)?)
}

/// Sign as the sender and refresh the id.
pub fn sign_transaction(tx: &mut Transaction, private: &PrivateKey) -> Result<(), CryptoError> {
    let hash = signing_hash(tx)?;
    tx.signature = Some(sign_message(&hash, private));
    tx.id = compute_transaction_id(tx)?;
    Ok(())
}

/// Add the second signature (after `sign_transaction`) and refresh the id.
pub fn second_sign_transaction(
    tx: &mut Transaction,
    private: &PrivateKey,
) -> Result<(), CryptoError> {
    let hash = second_signing_hash(tx)?;
    tx.second_signature = Some(sign_message(&hash, private));
    tx.id = compute_transaction_id(tx)?;
    Ok(())
}

/// Add the participant signature at `index` and refresh the id.
pub fn multi_sign_transaction(
    tx: &mut Transaction,
    index: u8,
    private: &PrivateKey,
) -> Result<(), CryptoError> {
    let hash = signing_hash(tx)?;
    tx.signatures.retain(|entry| entry.index != index);
    tx.signatures.push(MultiSignatureEntry { index, signature: sign_message(&hash, private) });
    tx.signatures.sort_by_key(|entry| entry.index);
    tx.id = compute_transaction_id(tx)?;
    Ok(())
}

/// Whether the id matches and the sender signature verifies under `public_key`.
pub fn verify_transaction_signature(tx: &Transaction, public_key: &PublicKey) -> bool {
    let Some(signature) = tx.signature.as_ref() else {
        return false;
    };
    match (compute_transaction_id(tx), signing_hash(tx)) {
        (Ok(id), Ok(hash)) => id == tx.id && verify_signature(&hash, signature, public_key),
        _ => false,
    }
}

pub fn verify_second_signature(tx: &Transaction, second_public_key: &PublicKey) -> bool {
    let Some(signature) = tx.second_signature.as_ref() else {
        return false;
    };
    second_signing_hash(tx)
        .map(|hash| verify_signature(&hash, signature, second_public_key))
        .unwrap_or(false)
}

/// At least `min` distinct participants, each at a valid index of
/// `public_keys`, signed the signing hash.
pub fn verify_multi_signatures(tx: &Transaction, public_keys: &[PublicKey], min: u8) -> bool {
    let Ok(hash) = signing_hash(tx) else {
        return false;
    };
    let mut seen = Vec::with_capacity(tx.signatures.len());
    for entry in &tx.signatures {
        if seen.contains(&entry.index) {
            return false;
        }
        let Some(key) = public_keys.get(entry.index as usize) else {
            return false;
        };
        if !verify_signature(&hash, &entry.signature, key) {
            return false;
        }
        seen.push(entry.index);
    }
    seen.len() >= usize::from(min) && min > 0
}

/// Aggregate key that identifies a multi-signature wallet.
pub fn multi_signature_public_key(min: u8, public_keys: &[PublicKey]) -> PublicKey {
    let mut parts: Vec<&[u8]> = Vec::with_capacity(public_keys.len() + 1);
    let min_bytes = [min];
    parts.push(&min_bytes);
    for key in public_keys {
        parts.push(key.as_bytes());
    }
    PublicKey(blake2b_256_multi(&parts))
}
