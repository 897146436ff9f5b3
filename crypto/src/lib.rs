//! Cryptographic operations for the node core.
//!
//! - **Ed25519** for block and transaction signatures
//! - **Blake2b-256** for block ids, transaction ids and payload hashes
//! - **SHA-256** for HTLC secret hashes
//! - Address derivation with `ark_` prefix and base32 encoding
//! - Block verification, with transaction signatures checked in parallel

pub mod address;
pub mod block;
pub mod error;
pub mod hash;
pub mod keys;
pub mod transaction;

pub use address::{decode_address, derive_address, validate_address};
pub use block::{
    compute_block_id, compute_payload_hash, sign_block, verify_block, BlockVerification,
};
pub use error::CryptoError;
pub use hash::{blake2b_256, blake2b_256_multi, sha256_hex};
pub use keys::{
    generate_keypair, keypair_from_passphrase, keypair_from_private, keypair_from_seed,
    public_from_private, sign_message, verify_signature,
};
pub use transaction::{
    compute_transaction_id, multi_signature_public_key, multi_sign_transaction,
    second_sign_transaction, sign_transaction, transaction_size, verify_multi_signatures,
    verify_second_signature, verify_transaction_signature,
};
