//! Span constructors shared by the block pipeline, so traces of one block
//! or batch can be correlated across the processor, queue and ledger.

use tracing::{info_span, Span};

/// Span covering one block through the block processor.
pub fn block_process_span(height: u64, id: &str) -> Span {
    info_span!("block_process", height, id = %id)
}

/// Span covering one queue job.
pub fn batch_span(first_height: u64, last_height: u64, count: usize) -> Span {
    info_span!("process_batch", first_height, last_height, count)
}

/// Span covering fork recovery from the given tip.
pub fn fork_recovery_span(tip_height: u64) -> Span {
    info_span!("fork_recovery", tip_height)
}
