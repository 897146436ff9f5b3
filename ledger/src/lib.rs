//! Wallet ledger.
//!
//! Holds every wallet the node has seen, keyed by address, plus named
//! secondary indices (public keys, delegate usernames, HTLC locks, ...).
//! Wallet state only changes through transaction and block apply/revert.

pub mod attributes;
pub mod error;
pub mod index;
pub mod repository;
pub mod wallet;

pub use attributes::{AttributeMap, AttributeSchema, AttributeValue, HtlcLock};
pub use error::LedgerError;
pub use index::{names as index_names, Indexer, WalletIndex};
pub use repository::WalletRepository;
pub use wallet::{paths as attribute_paths, Wallet};
