//! Nullable infrastructure for deterministic testing.
//!
//! Every collaborator of the blockchain service (storage, peers, time) sits
//! behind a trait in `ark-store`. The implementations here:
//! - keep everything in memory,
//! - can be steered from the test (queued downloads, injected save failures),
//! - record what the node did (broadcasts, saved rounds) for assertions.
//!
//! [`fixtures`] builds signed transactions and blocks for the same tests.

pub mod clock;
pub mod fixtures;
pub mod network;
pub mod store;

pub use clock::NullClock;
pub use network::NullNetwork;
pub use store::NullStore;
