//! Prometheus metrics for the blockchain service.
//!
//! [`BlockchainMetrics`] owns a dedicated [`Registry`]; whoever exposes
//! metrics encodes it into the Prometheus text format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Histogram, HistogramOpts, IntCounter, IntGauge, Opts,
    Registry,
};

use crate::BlockProcessorResult;

pub struct BlockchainMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Blocks that went through the block processor.
    pub blocks_processed: IntCounter,
    pub blocks_accepted: IntCounter,
    pub blocks_rejected: IntCounter,
    pub blocks_discarded: IntCounter,
    /// Blocks whose processing asked for a rollback.
    pub blocks_rollback: IntCounter,
    pub forks_detected: IntCounter,
    /// Jobs pushed onto the processing queue.
    pub queue_jobs: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub last_height: IntGauge,
    pub queue_length: IntGauge,
    pub wallet_count: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Time spent processing one queue job, in milliseconds.
    pub batch_process_time_ms: Histogram,
}

impl BlockchainMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let blocks_processed = register_int_counter_with_registry!(
            Opts::new("ark_blocks_processed_total", "Blocks run through the block processor"),
            registry
        )?;
        let blocks_accepted = register_int_counter_with_registry!(
            Opts::new("ark_blocks_accepted_total", "Blocks accepted and applied"),
            registry
        )?;
        let blocks_rejected = register_int_counter_with_registry!(
            Opts::new("ark_blocks_rejected_total", "Blocks rejected by the block processor"),
            registry
        )?;
        let blocks_discarded = register_int_counter_with_registry!(
            Opts::new("ark_blocks_discarded_total", "Blocks discarded but broadcastable"),
            registry
        )?;
        let blocks_rollback = register_int_counter_with_registry!(
            Opts::new("ark_blocks_rollback_total", "Blocks that triggered a rollback"),
            registry
        )?;
        let forks_detected = register_int_counter_with_registry!(
            Opts::new("ark_forks_detected_total", "Forks detected"),
            registry
        )?;
        let queue_jobs = register_int_counter_with_registry!(
            Opts::new("ark_queue_jobs_total", "Jobs pushed onto the processing queue"),
            registry
        )?;

        let last_height = register_int_gauge_with_registry!(
            Opts::new("ark_last_block_height", "Height of the last applied block"),
            registry
        )?;
        let queue_length = register_int_gauge_with_registry!(
            Opts::new("ark_queue_length", "Jobs waiting in the processing queue"),
            registry
        )?;
        let wallet_count = register_int_gauge_with_registry!(
            Opts::new("ark_wallet_count", "Wallets in the ledger"),
            registry
        )?;

        // 0.5 ms up to ~8 s.
        let batch_process_time_ms = register_histogram_with_registry!(
            HistogramOpts::new("ark_batch_process_time_ms", "Queue job processing time in milliseconds")
                .buckets(prometheus::exponential_buckets(0.5, 2.0, 15)?),
            registry
        )?;

        Ok(Self {
            registry,
            blocks_processed,
            blocks_accepted,
            blocks_rejected,
            blocks_discarded,
            blocks_rollback,
            forks_detected,
            queue_jobs,
            last_height,
            queue_length,
            wallet_count,
            batch_process_time_ms,
        })
    }

    pub fn record_outcome(&self, result: BlockProcessorResult) {
        self.blocks_processed.inc();
        match result {
            BlockProcessorResult::Accepted => self.blocks_accepted.inc(),
            BlockProcessorResult::Rejected => self.blocks_rejected.inc(),
            BlockProcessorResult::DiscardedButCanBeBroadcasted => self.blocks_discarded.inc(),
            BlockProcessorResult::Rollback => self.blocks_rollback.inc(),
        }
    }
}
