//! Ark node core: the blockchain service and everything it drives.
//!
//! The service:
//! - Receives blocks from peers and the local forger
//! - Queues them in jobs and runs each through the block processor
//! - Applies accepted blocks to the wallet ledger and persists them
//! - Detects forks and rolls the chain back to recover
//! - Tracks its lifecycle in an explicit state machine

pub mod block_processor;
pub mod block_state;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod queue;
pub mod recent_blocks;
pub mod shutdown;
pub mod state_machine;
pub mod state_store;
pub mod tracing_spans;

pub use block_processor::{BlockHandler, BlockProcessor, BlockProcessorResult, UnchainedReason};
pub use block_state::BlockState;
pub use blockchain::{Blockchain, BlockchainContext};
pub use config::NodeConfig;
pub use error::NodeError;
pub use events::{BlockchainEvent, EventBus};
pub use logging::{init_logging, LogFormat};
pub use metrics::BlockchainMetrics;
pub use queue::ProcessQueue;
pub use recent_blocks::RecentBlocks;
pub use shutdown::ShutdownController;
pub use state_machine::{transition, Action, BlockchainState, Event, SyncState, Transition};
pub use state_store::{BlockPing, ChainState, ChainTransactions};
