//! Contracts for the node core's collaborators: persistence, the round
//! source, the peer network and the wall clock.
//!
//! The blockchain service depends only on these traits. Storage engines and
//! the peer layer live outside this workspace; `ark-nullables` provides
//! in-memory implementations for tests.

pub mod block;
pub mod clock;
pub mod error;
pub mod network;
pub mod round;
pub mod transaction;

pub use block::BlockRepository;
pub use clock::Clock;
pub use error::StoreError;
pub use network::{Network, NetworkStatus};
pub use round::{Delegate, RoundRepository};
pub use transaction::TransactionRepository;

/// Everything the blockchain service needs from storage.
pub trait Store: BlockRepository + TransactionRepository + RoundRepository + Send + Sync {}

impl<T> Store for T where T: BlockRepository + TransactionRepository + RoundRepository + Send + Sync {}
