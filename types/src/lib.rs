//! Fundamental types for the node core.
//!
//! This crate defines the data shared by every other crate in the workspace:
//! identifiers, keys, amounts, blocks, transactions and the height-indexed
//! network configuration (milestones, exceptions, slots, rounds).

pub mod address;
pub mod amount;
pub mod block;
pub mod error;
pub mod id;
pub mod keys;
pub mod milestone;
pub mod round;
pub mod slots;
pub mod transaction;

pub use address::Address;
pub use amount::{Amount, Balance};
pub use block::{Block, BlockHeader};
pub use error::TypesError;
pub use id::{BlockId, TransactionId};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use milestone::{Exceptions, Milestone, Milestones, NetworkConfig};
pub use round::{calculate_round, RoundInfo};
pub use slots::Slots;
pub use transaction::{
    CoreTransactionType, HtlcClaimAsset, HtlcExpiration, HtlcLockAsset, HtlcRefundAsset,
    MultiSignatureAsset, MultiSignatureEntry, Payment, Transaction, TransactionAsset, Vote,
    CORE_TYPE_GROUP,
};
