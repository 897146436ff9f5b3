//! The blockchain service.
//!
//! Owns the ledger ([`BlockState`]), the chain state and the processing
//! queue, and drives them through the lifecycle in [`crate::state_machine`].
//!
//! Two background tasks run once [`Blockchain::start`] is called:
//!
//! 1. **Event loop**: takes events off a FIFO channel, applies the
//!    transition and runs the entry actions. Events returned by actions are
//!    pushed to the back of the same channel, so dispatch never recurses.
//! 2. **Queue consumer**: takes block batches off the [`ProcessQueue`],
//!    processes and persists them, and reports `ProcessFinished` when the
//!    queue drains.
//!
//! Ledger and chain state sit behind one async mutex; no other lock is held
//! across an await point. Calls into [`Network`] run on the blocking pool,
//! never while that mutex is held.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

use ark_crypto::verify_block;
use ark_ledger::WalletRepository;
use ark_store::{Clock, Network, Store};
use ark_transactions::{ChainTip, TransactionHandlerRegistry};
use ark_types::{calculate_round, Block, NetworkConfig, Slots};

use crate::block_processor::{BlockProcessor, BlockProcessorResult};
use crate::block_state::BlockState;
use crate::events::{BlockchainEvent, EventBus};
use crate::metrics::BlockchainMetrics;
use crate::queue::ProcessQueue;
use crate::shutdown::ShutdownController;
use crate::state_machine::{transition, Action, BlockchainState, Event};
use crate::state_store::{ChainState, ChainTransactions};
use crate::tracing_spans::{batch_span, fork_recovery_span};
use crate::{NodeConfig, NodeError};

/// Blocks replayed per store read during start-up.
const REPLAY_CHUNK: u64 = 1000;

/// Sync checks that found the network halted before its health is queried.
const MAX_P2P_UPDATES: u32 = 3;

/// Everything the service is built from.
pub struct BlockchainContext {
    pub config: NodeConfig,
    pub genesis_block: Block,
    pub store: Arc<dyn Store>,
    pub network: Arc<dyn Network>,
    pub clock: Arc<dyn Clock>,
    pub registry: Arc<TransactionHandlerRegistry>,
}

struct Core {
    state: BlockState,
    chain: ChainState,
}

struct Inner {
    config: NodeConfig,
    network_config: Arc<NetworkConfig>,
    genesis: Block,
    store: Arc<dyn Store>,
    network: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
    slots: Slots,
    processor: BlockProcessor,

    core: Mutex<Core>,
    /// Serialises transitions between the event loop and `stop`.
    step_lock: Mutex<()>,
    queue: ProcessQueue,
    events: RwLock<EventBus>,
    metrics: BlockchainMetrics,
    shutdown: ShutdownController,
    wakeup: StdMutex<Option<JoinHandle<()>>>,
    event_tx: mpsc::UnboundedSender<Event>,
    event_rx: StdMutex<Option<mpsc::UnboundedReceiver<Event>>>,
    stopped: AtomicBool,
    tasks_started: AtomicBool,
}

/// Cheap to clone; clones share the same service.
#[derive(Clone)]
pub struct Blockchain {
    inner: Arc<Inner>,
}

impl Blockchain {
    pub fn new(ctx: BlockchainContext) -> Result<Self, NodeError> {
        let network_config = Arc::new(ctx.config.network.clone());
        let slots = ctx.config.slots();
        let processor = BlockProcessor::new(Arc::clone(&ctx.store), Arc::clone(&network_config));
        let state = BlockState::new(ctx.registry, Arc::clone(&network_config));
        let chain = ChainState::new(ctx.config.max_last_blocks);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Self {
            inner: Arc::new(Inner {
                config: ctx.config,
                network_config,
                genesis: ctx.genesis_block,
                store: ctx.store,
                network: ctx.network,
                clock: ctx.clock,
                slots,
                processor,
                core: Mutex::new(Core { state, chain }),
                step_lock: Mutex::new(()),
                queue: ProcessQueue::new(),
                events: RwLock::new(EventBus::new()),
                metrics: BlockchainMetrics::new()?,
                shutdown: ShutdownController::new(),
                wakeup: StdMutex::new(None),
                event_tx,
                event_rx: StdMutex::new(Some(event_rx)),
                stopped: AtomicBool::new(false),
                tasks_started: AtomicBool::new(false),
            }),
        })
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Spawn the background tasks and dispatch `Start`. Returns without
    /// waiting for the first sync; see [`Blockchain::wait_until_started`].
    pub fn start(&self) -> Result<(), NodeError> {
        if self.inner.tasks_started.swap(true, Ordering::SeqCst) {
            return Err(NodeError::Other("blockchain already started".into()));
        }
        let rx = self
            .inner
            .event_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| NodeError::Other("event channel already taken".into()))?;

        tracing::info!("starting blockchain manager");
        tokio::spawn(self.clone().run_event_loop(rx));
        tokio::spawn(self.clone().run_queue_consumer());
        self.dispatch(Event::Start);
        Ok(())
    }

    /// Poll until the first sync completed or the service gave up. Returns
    /// whether it started.
    pub async fn wait_until_started(&self) -> bool {
        loop {
            if self.inner.core.lock().await.chain.started {
                return true;
            }
            if self.is_stopped() || self.inner.shutdown.is_triggered() {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("stopping blockchain manager");
        self.clear_wakeup();
        for event in self.step(Event::Stop).await {
            self.dispatch(event);
        }
        self.inner.queue.kill();
        self.inner.shutdown.shutdown();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Queue `event` for the event loop.
    pub fn dispatch(&self, event: Event) {
        if self.inner.event_tx.send(event).is_err() {
            tracing::warn!(?event, "event loop gone, event dropped");
        }
    }

    pub async fn state(&self) -> BlockchainState {
        self.inner.core.lock().await.chain.blockchain
    }

    /// Add a listener for [`BlockchainEvent`]s.
    pub fn subscribe(&self, listener: impl Fn(&BlockchainEvent) + Send + Sync + 'static) {
        self.inner
            .events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribe(Box::new(listener));
    }

    pub fn metrics(&self) -> &BlockchainMetrics {
        &self.inner.metrics
    }

    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.inner.shutdown
    }

    fn emit(&self, event: BlockchainEvent) {
        self.inner.events.read().unwrap_or_else(PoisonError::into_inner).emit(&event);
    }

    async fn run_event_loop(self, mut rx: mpsc::UnboundedReceiver<Event>) {
        let mut shutdown = self.inner.shutdown.subscribe();
        if self.inner.shutdown.is_triggered() {
            return;
        }
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            for next in self.step(event).await {
                self.dispatch(next);
            }
        }
        tracing::debug!("event loop exited");
    }

    async fn run_queue_consumer(self) {
        let mut shutdown = self.inner.shutdown.subscribe();
        if self.inner.shutdown.is_triggered() {
            return;
        }
        loop {
            let batch = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                batch = self.inner.queue.next() => match batch {
                    Some(batch) => batch,
                    None => break,
                },
            };
            if let Err(e) = self.process_blocks(batch).await {
                tracing::error!(error = %e, "failed to process queued blocks");
            }
            self.inner.metrics.queue_length.set(self.inner.queue.len() as i64);
            if self.inner.queue.finish() {
                self.dispatch(Event::ProcessFinished);
            }
        }
        tracing::debug!("queue consumer exited");
    }

    /// Apply one event: transition, then run the entry actions in order.
    /// Returns the events the actions produced.
    async fn step(&self, event: Event) -> Vec<Event> {
        let _step = self.inner.step_lock.lock().await;

        let (from, next) = {
            let mut core = self.inner.core.lock().await;
            let from = core.chain.blockchain;
            let next = transition(from, event);
            core.chain.blockchain = next.state;
            (from, next)
        };
        if !next.changed {
            tracing::debug!(?event, state = %from, "event ignored");
            return Vec::new();
        }
        tracing::debug!(?event, from = %from, to = %next.state, actions = ?next.actions, "state transition");
        self.emit(BlockchainEvent::StateTransition { event, from, to: next.state });

        let mut follow_up = Vec::new();
        for action in next.actions {
            if let Some(event) = self.run_action(action).await {
                follow_up.push(event);
            }
        }
        follow_up
    }

    async fn run_action(&self, action: Action) -> Option<Event> {
        match action {
            Action::Init => Some(self.init().await),
            Action::RollbackDatabase => Some(self.rollback_database().await),
            Action::CheckLastDownloadedBlockSynced => Some(self.check_last_downloaded_block_synced().await),
            Action::DownloadBlocks => self.download_blocks().await,
            Action::DownloadFinished => {
                tracing::info!("block download finished");
                self.inner.queue.idle().then_some(Event::ProcessFinished)
            }
            Action::DownloadPaused => {
                tracing::info!("blockchain download paused");
                None
            }
            Action::CheckLastBlockSynced => {
                let synced = self.is_synced(None).await;
                Some(if synced { Event::Synced } else { Event::NotSynced })
            }
            Action::SyncingComplete => {
                tracing::info!("blockchain 100% in sync");
                Some(Event::SyncFinished)
            }
            Action::CheckLater => {
                if !self.is_stopped() && !self.has_wakeup() {
                    self.set_wakeup();
                }
                None
            }
            Action::BlockchainReady => {
                let mut core = self.inner.core.lock().await;
                if !core.chain.started {
                    core.chain.started = true;
                    drop(core);
                    self.emit(BlockchainEvent::StateStarted);
                }
                None
            }
            Action::StartForkRecovery => Some(self.start_fork_recovery().await),
            Action::Stopped => {
                tracing::info!("the blockchain has been stopped");
                None
            }
            Action::ExitApp => {
                tracing::error!("failed to start the blockchain, exiting");
                self.inner.stopped.store(true, Ordering::SeqCst);
                self.clear_wakeup();
                self.inner.queue.kill();
                self.inner.shutdown.shutdown();
                None
            }
        }
    }

    // ── Start-up ────────────────────────────────────────────────────────

    async fn init(&self) -> Event {
        match self.try_init().await {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(error = %e, "blockchain initialisation failed");
                Event::Failure
            }
        }
    }

    async fn try_init(&self) -> Result<Event, NodeError> {
        let store = self.inner.store.as_ref();
        let mut core = self.inner.core.lock().await;

        let last = match store.get_last_block()? {
            Some(block) => block,
            None => {
                tracing::info!("no block in database, writing the genesis block");
                store.save_blocks(std::slice::from_ref(&self.inner.genesis))?;
                self.inner.genesis.clone()
            }
        };

        let persisted_genesis = store.get_blocks(1, 1)?.into_iter().next();
        match persisted_genesis {
            Some(genesis) if genesis.id() == self.inner.genesis.id() => {}
            Some(genesis) => {
                let e = NodeError::GenesisMismatch {
                    expected: self.inner.genesis.id().to_hex(),
                    found: genesis.id().to_hex(),
                };
                tracing::error!(error = %e, "refusing to start on a foreign chain");
                return Ok(Event::Failure);
            }
            None => return Err(NodeError::InvalidBlock("genesis block missing from database".into())),
        }

        if core.chain.restored_database_integrity {
            tracing::info!("skipping database integrity check after successful recovery");
        } else {
            tracing::info!("verifying database integrity");
            if !self.verify_blockchain()? {
                return Ok(Event::Rollback);
            }
            tracing::info!("verified database integrity");
        }

        tracing::info!(height = last.height(), "last block in database");
        let Core { state, chain } = &mut *core;
        state.reset();
        chain.recent.clear();
        let mut parent = ChainTip::default();
        let mut from = 1;
        while from <= last.height() {
            let to = last.height().min(from + REPLAY_CHUNK - 1);
            for block in store.get_blocks(from, to)? {
                {
                    let transactions = ChainTransactions { recent: &chain.recent, store };
                    state.apply_block(&block, parent, &transactions)?;
                }
                parent = ChainTip { height: block.height(), timestamp: block.timestamp() };
                chain.set_last_block(block);
            }
            from = to + 1;
        }
        if chain.last_height() != last.height() {
            return Err(NodeError::InvalidBlock(format!(
                "replay stopped at height {} below the persisted tip {}",
                chain.last_height(),
                last.height()
            )));
        }

        // Rounds saved past the tip belong to blocks that never got persisted.
        let round = calculate_round(last.height(), &self.inner.network_config.milestones);
        store.delete_round(round.round + 1)?;
        self.emit(BlockchainEvent::RoundDeleted { round: round.round + 1 });

        self.inner.metrics.last_height.set(last.height() as i64);
        self.inner.metrics.wallet_count.set(state.wallets().len() as i64);
        Ok(Event::Started)
    }

    /// The persisted tip verifies and links to the block below it.
    fn verify_blockchain(&self) -> Result<bool, NodeError> {
        let store = self.inner.store.as_ref();
        let Some(last) = store.get_last_block()? else {
            return Ok(false);
        };
        if last.height() > 1 {
            let parent = store.get_blocks(last.height() - 1, last.height() - 1)?;
            let linked = parent.first().is_some_and(|parent| parent.id() == last.previous_block());
            if !linked {
                tracing::warn!(height = last.height(), "persisted tip does not link to its parent");
                return Ok(false);
            }
        }
        let verification = verify_block(&last, self.inner.network_config.milestones.at(last.height()));
        if !verification.verified {
            tracing::warn!(height = last.height(), errors = ?verification.errors, "persisted tip failed verification");
        }
        Ok(verification.verified)
    }

    async fn rollback_database(&self) -> Event {
        tracing::info!("trying to restore database integrity");
        let max_rewind = self.inner.config.database_rollback_max_block_rewind;
        let steps = self.inner.config.database_rollback_steps;

        let mut rewound = 0;
        while rewound < max_rewind {
            match self.remove_top_blocks(steps) {
                Ok(0) => break,
                Ok(removed) => rewound += removed,
                Err(e) => {
                    tracing::error!(error = %e, "failed to remove top blocks");
                    return Event::Failure;
                }
            }
            if matches!(self.verify_blockchain(), Ok(true)) {
                break;
            }
        }

        match self.verify_blockchain() {
            Ok(true) => {
                self.inner.core.lock().await.chain.restored_database_integrity = true;
                let height = self.inner.store.get_last_block().ok().flatten().map_or(0, |b| b.height());
                tracing::info!(height, rewound, "database integrity verified again after rollback");
                Event::Success
            }
            Ok(false) => {
                tracing::error!(rewound, "database integrity could not be restored");
                Event::Failure
            }
            Err(e) => {
                tracing::error!(error = %e, "database integrity check failed");
                Event::Failure
            }
        }
    }

    /// Delete up to `count` persisted blocks from the top, never genesis.
    /// Only used before the ledger is built. Returns how many were removed.
    pub fn remove_top_blocks(&self, count: u64) -> Result<u64, NodeError> {
        let store = self.inner.store.as_ref();
        let Some(last) = store.get_last_block()? else {
            return Ok(0);
        };
        let count = count.min(last.height().saturating_sub(1));
        if count == 0 {
            return Ok(0);
        }
        let blocks = store.get_top_blocks(count as usize)?;
        if let Some(first) = blocks.first() {
            tracing::info!(count = blocks.len(), from_height = first.height(), "removing top blocks");
        }
        store.delete_blocks(&blocks)?;

        let new_height = last.height() - count;
        let round = calculate_round(new_height, &self.inner.network_config.milestones);
        store.delete_round(round.round + 1)?;
        Ok(count)
    }

    // ── Sync ────────────────────────────────────────────────────────────

    async fn check_last_downloaded_block_synced(&self) -> Event {
        let queued = self.inner.queue.len();
        tracing::debug!(queued, "queued chunks of blocks");

        let mut event = Event::NotSynced;
        if queued > self.inner.config.download_paused_queue_length {
            event = Event::Paused;
        }

        let has_peers = self.has_peers().await;
        let mut core = self.inner.core.lock().await;
        let chain = &mut core.chain;
        if chain.no_block_counter > self.inner.config.max_no_block_attempts && self.inner.queue.idle() {
            tracing::info!(
                attempts = chain.no_block_counter,
                "tried to sync several times, the network looks to be missing blocks"
            );
            chain.no_block_counter = 0;

            if chain.p2p_update_counter < MAX_P2P_UPDATES {
                chain.p2p_update_counter += 1;
                return Event::NetworkHalted;
            }
            chain.p2p_update_counter = 0;
            drop(core);

            tracing::info!("network keeps missing blocks, checking its health");
            let network = Arc::clone(&self.inner.network);
            let status = match tokio::task::spawn_blocking(move || network.check_network_health()).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(error = %e, "network health check task failed");
                    return Event::NetworkHalted;
                }
            };
            if !status.forked {
                return Event::NetworkHalted;
            }
            self.inner.core.lock().await.chain.number_of_blocks_to_rollback = status.blocks_to_rollback;
            return Event::Fork;
        }
        if let Some(downloaded) = &chain.last_downloaded_block {
            if self.block_is_synced(downloaded, has_peers) {
                chain.no_block_counter = 0;
                chain.p2p_update_counter = 0;
                event = Event::Synced;
            }
        }
        event
    }

    async fn download_blocks(&self) -> Option<Event> {
        let from = {
            let core = self.inner.core.lock().await;
            core.chain.last_downloaded_block.clone().or_else(|| core.chain.last_block().cloned())?
        };

        let network = Arc::clone(&self.inner.network);
        let height = from.height();
        let blocks = match tokio::task::spawn_blocking(move || network.download_blocks_from_height(height)).await {
            Ok(blocks) => blocks,
            Err(e) => {
                tracing::warn!(error = %e, "block download task failed");
                Vec::new()
            }
        };

        if self.is_stopped() {
            return None;
        }

        let mut core = self.inner.core.lock().await;
        let chain = &mut core.chain;
        // A rollback may have moved the download point meanwhile.
        if chain.last_downloaded_block.as_ref().is_some_and(|b| b.id() != from.id()) {
            return None;
        }

        let chained = blocks.first().is_some_and(|first| {
            self.inner.processor.is_chained(&from, first)
                || self.inner.network_config.exceptions.is_block_exception(&first.id())
        });

        if chained {
            let transactions: usize = blocks.iter().map(|b| b.transactions.len()).sum();
            tracing::info!(blocks = blocks.len(), transactions, "downloaded new blocks");
            return Some(if self.enqueue_blocks_locked(chain, blocks) {
                Event::Downloaded
            } else {
                Event::NoBlock
            });
        }

        match blocks.first() {
            None => tracing::info!(from_height = from.height() + 1, "could not download any blocks from any peer"),
            Some(first) => {
                tracing::warn!(
                    height = first.height(),
                    id = %first.id(),
                    last_downloaded_height = from.height(),
                    "downloaded block not accepted"
                );
                self.inner.queue.clear();
            }
        }
        if self.inner.queue.is_empty() {
            chain.no_block_counter += 1;
            chain.last_downloaded_block = chain.last_block().cloned();
        }
        Some(Event::NoBlock)
    }

    /// Whether the node is in sync with the network, judged by `block` or
    /// by the tip.
    pub async fn is_synced(&self, block: Option<&Block>) -> bool {
        let has_peers = self.has_peers().await;
        match block {
            Some(block) => self.block_is_synced(block, has_peers),
            None => {
                let core = self.inner.core.lock().await;
                core.chain.last_block().is_some_and(|tip| self.block_is_synced(tip, has_peers))
            }
        }
    }

    /// The peer layer may block, so it is asked on the blocking pool.
    async fn has_peers(&self) -> bool {
        let network = Arc::clone(&self.inner.network);
        match tokio::task::spawn_blocking(move || network.has_peers()).await {
            Ok(has_peers) => has_peers,
            Err(e) => {
                tracing::warn!(error = %e, "peer lookup task failed");
                false
            }
        }
    }

    fn block_is_synced(&self, block: &Block, has_peers: bool) -> bool {
        if !has_peers {
            return true;
        }
        let now = u64::from(self.inner.slots.time(self.inner.clock.now_millis()));
        let blocktime = u64::from(self.inner.network_config.milestones.at(block.height()).blocktime);
        now.saturating_sub(u64::from(block.timestamp())) < 3 * blocktime
    }

    // ── Incoming blocks ─────────────────────────────────────────────────

    /// Entry point for blocks relayed by peers or produced by the local
    /// forger.
    pub async fn handle_incoming_block(&self, block: Block, from_forger: bool) {
        tracing::info!(
            height = block.height(),
            transactions = block.transactions.len(),
            from_forger,
            "received new block"
        );

        let now_ms = self.inner.clock.now_millis();
        let slots = &self.inner.slots;
        let current_slot = slots.slot_number(slots.time(now_ms), block.height());
        let received_slot = slots.slot_number(block.timestamp(), block.height());

        if from_forger {
            let time_left_ms = slots.time_until_next_slot_ms(now_ms, block.height());
            if current_slot != received_slot || time_left_ms < self.inner.config.forger_min_time_left_ms {
                tracing::info!(height = block.height(), time_left_ms, "discarded forger block, received too late");
                return;
            }
        }
        if received_slot > current_slot {
            tracing::info!(height = block.height(), "discarded block, it takes a future slot");
            return;
        }

        let (id, height) = (block.id(), block.height());
        let mut core = self.inner.core.lock().await;
        if core.chain.started {
            self.dispatch(Event::NewBlock);
            self.enqueue_blocks_locked(&mut core.chain, vec![block]);
            drop(core);
            self.postpone_wakeup();
            self.emit(BlockchainEvent::BlockReceived { id, height });
        } else {
            drop(core);
            tracing::info!(height, "block disregarded, blockchain is not ready");
            self.emit(BlockchainEvent::BlockDisregarded { id, height });
        }
    }

    /// Split `blocks` into queue jobs and record the last one as downloaded.
    pub async fn enqueue_blocks(&self, blocks: Vec<Block>) -> bool {
        let mut core = self.inner.core.lock().await;
        self.enqueue_blocks_locked(&mut core.chain, blocks)
    }

    /// A job closes when it reaches the block or transaction limit, and
    /// before any block at a milestone height.
    fn enqueue_blocks_locked(&self, chain: &mut ChainState, blocks: Vec<Block>) -> bool {
        let Some(last) = blocks.last() else {
            return false;
        };
        chain.last_downloaded_block = Some(last.clone());

        let max_blocks = self.inner.config.max_blocks_per_job();
        let max_transactions = self.inner.config.max_transactions_per_chunk;
        let milestones = &self.inner.network_config.milestones;

        let mut queued = true;
        let mut job: Vec<Block> = Vec::new();
        let mut job_transactions = 0;
        for block in blocks {
            let flush = !job.is_empty()
                && (job.len() >= max_blocks
                    || job_transactions + block.transactions.len() > max_transactions
                    || milestones.is_milestone_height(block.height()));
            if flush {
                queued &= self.push_job(std::mem::take(&mut job));
                job_transactions = 0;
            }
            job_transactions += block.transactions.len();
            job.push(block);
        }
        if !job.is_empty() {
            queued &= self.push_job(job);
        }
        queued
    }

    fn push_job(&self, job: Vec<Block>) -> bool {
        let pushed = self.inner.queue.push(job);
        if pushed {
            self.inner.metrics.queue_jobs.inc();
            self.inner.metrics.queue_length.set(self.inner.queue.len() as i64);
        }
        pushed
    }

    // ── Processing ──────────────────────────────────────────────────────

    /// Run a single block through the processor outside the queue.
    pub async fn process_block(&self, block: &Block) -> BlockProcessorResult {
        let mut core = self.inner.core.lock().await;
        let Core { state, chain } = &mut *core;
        let result = self.inner.processor.process(block, state, chain);
        self.inner.metrics.record_outcome(result);
        result
    }

    /// Process one queue job in order, stopping at the first block that is
    /// not accepted, then persist the accepted blocks as one unit.
    async fn process_blocks(&self, blocks: Vec<Block>) -> Result<(), NodeError> {
        let (Some(first), Some(last)) = (blocks.first(), blocks.last()) else {
            return Ok(());
        };
        let span = batch_span(first.height(), last.height(), blocks.len());

        let forked = {
            let mut core = self.inner.core.lock().await;
            let _guard = span.enter();
            self.process_batch(&mut core, blocks)?
        };
        if let Some(block) = forked {
            self.fork_block(block, None).await;
        }
        Ok(())
    }

    /// Returns the block that proved a fork, if any.
    fn process_batch(&self, core: &mut Core, blocks: Vec<Block>) -> Result<Option<Block>, NodeError> {
        let started_at = Instant::now();
        let Core { state, chain } = core;
        let tip = chain.last_block().cloned().ok_or(NodeError::NotInitialized)?;
        let Some(first) = blocks.first() else {
            return Ok(None);
        };

        let exception = self.inner.network_config.exceptions.is_block_exception(&first.id());
        if !exception && !self.inner.processor.is_chained(&tip, first) && self.is_known(chain, first)? {
            tracing::info!(height = first.height(), "queued blocks are already known, discarding the queue");
            self.inner.queue.clear();
            chain.last_downloaded_block = Some(tip);
            return Ok(None);
        }

        let mut accepted: Vec<Block> = Vec::new();
        let mut last_outcome = None;
        for block in blocks {
            let result = self.inner.processor.process(&block, state, chain);
            self.inner.metrics.record_outcome(result);
            let stop = result != BlockProcessorResult::Accepted;
            if !stop {
                self.emit(BlockchainEvent::BlockApplied { id: block.id(), height: block.height() });
                accepted.push(block.clone());
            }
            last_outcome = Some((result, block));
            if stop {
                break;
            }
        }

        if !accepted.is_empty() {
            if let Err(e) = self.inner.store.save_blocks(&accepted) {
                tracing::error!(error = %e, count = accepted.len(), "failed to persist blocks, reverting them");
                self.undo_unpersisted(state, chain, &tip, &accepted);
                return Ok(None);
            }
        }

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        self.inner.metrics.batch_process_time_ms.observe(elapsed_ms);
        self.inner.metrics.last_height.set(chain.last_height() as i64);
        self.inner.metrics.wallet_count.set(state.wallets().len() as i64);

        let Some((result, block)) = last_outcome else {
            return Ok(None);
        };
        match result {
            BlockProcessorResult::Accepted | BlockProcessorResult::DiscardedButCanBeBroadcasted => {
                if chain.started && self.is_within_current_slot(&block) {
                    self.broadcast(block);
                }
                Ok(None)
            }
            BlockProcessorResult::Rejected => {
                self.inner.queue.clear();
                chain.last_downloaded_block = chain.last_block().cloned();
                Ok(None)
            }
            BlockProcessorResult::Rollback => Ok(Some(block)),
        }
    }

    /// Relay `block` without waiting for the peers.
    fn broadcast(&self, block: Block) {
        let network = Arc::clone(&self.inner.network);
        tokio::task::spawn_blocking(move || network.broadcast_block(&block));
    }

    fn is_known(&self, chain: &ChainState, block: &Block) -> Result<bool, NodeError> {
        if block.height() > chain.last_height() {
            return Ok(false);
        }
        if chain.recent.contains_block(&block.id()) {
            return Ok(true);
        }
        Ok(self.inner.store.find_block_by_id(&block.id())?.is_some())
    }

    fn is_within_current_slot(&self, block: &Block) -> bool {
        let slots = &self.inner.slots;
        let now = slots.time(self.inner.clock.now_millis());
        let slot_start = slots.slot_time(slots.slot_number(now, block.height()), block.height());
        slot_start <= u64::from(block.timestamp())
    }

    /// Revert blocks that were applied but could not be persisted, newest
    /// first, and make the pre-batch tip the last block again. The store is
    /// likely unavailable here, so nothing in this path gives up early.
    fn undo_unpersisted(&self, state: &mut BlockState, chain: &mut ChainState, tip: &Block, accepted: &[Block]) {
        let store = self.inner.store.as_ref();
        for (i, block) in accepted.iter().enumerate().rev() {
            let parent = if i == 0 { tip } else { &accepted[i - 1] };
            let parent_tip = ChainTip { height: parent.height(), timestamp: parent.timestamp() };
            let transactions = ChainTransactions { recent: &chain.recent, store };
            match state.revert_block(block, parent_tip, &transactions) {
                Ok(()) => self.emit(BlockchainEvent::BlockReverted { id: block.id(), height: block.height() }),
                Err(e) => tracing::error!(height = block.height(), error = %e, "failed to revert unpersisted block"),
            }
        }

        chain.set_last_block(tip.clone());
        chain.last_downloaded_block = Some(tip.clone());
        self.inner.queue.clear();

        let next_round = calculate_round(tip.height(), &self.inner.network_config.milestones).round + 1;
        match store.delete_round(next_round) {
            Ok(()) => self.emit(BlockchainEvent::RoundDeleted { round: next_round }),
            Err(e) => tracing::error!(round = next_round, error = %e, "failed to delete the next round"),
        }
    }

    // ── Forks ───────────────────────────────────────────────────────────

    /// Record `block` as the fork point and enter fork recovery.
    pub async fn fork_block(&self, block: Block, blocks_to_rollback: Option<u64>) {
        let (id, height) = (block.id(), block.height());
        {
            let mut core = self.inner.core.lock().await;
            core.chain.forked_block = Some(block);
            if blocks_to_rollback.is_some() {
                core.chain.number_of_blocks_to_rollback = blocks_to_rollback;
            }
        }
        self.inner.queue.clear();
        tracing::warn!(height, %id, "fork detected");
        self.inner.metrics.forks_detected.inc();
        self.emit(BlockchainEvent::ForkDetected { id, height });
        self.dispatch(Event::Fork);
    }

    async fn start_fork_recovery(&self) -> Event {
        let tip_height = self.get_last_height().await;
        self.recover_from_fork().instrument(fork_recovery_span(tip_height)).await
    }

    async fn recover_from_fork(&self) -> Event {
        tracing::info!("starting fork recovery");
        let configured = self.inner.core.lock().await.chain.number_of_blocks_to_rollback.take();
        let count = configured.unwrap_or_else(|| {
            let (min, max) = (self.inner.config.fork_recovery_min_blocks, self.inner.config.fork_recovery_max_blocks);
            rand::thread_rng().gen_range(min..=max)
        });

        if let Err(e) = self.remove_blocks(count).await {
            tracing::error!(error = %e, "fork recovery failed");
            return Event::Failure;
        }
        tracing::info!(count, "removed blocks");

        let network = Arc::clone(&self.inner.network);
        if let Err(e) = tokio::task::spawn_blocking(move || network.refresh_peers_after_fork()).await {
            tracing::warn!(error = %e, "peer refresh after fork failed");
        }
        self.inner.queue.resume();
        Event::Success
    }

    /// Revert the `count` most recent blocks from the ledger and the store.
    /// Genesis is never removed.
    pub async fn remove_blocks(&self, count: u64) -> Result<(), NodeError> {
        let store = self.inner.store.as_ref();
        let mut core = self.inner.core.lock().await;
        let Core { state, chain } = &mut *core;
        self.clear_and_stop_queue_locked(chain);

        let last = chain.last_block().cloned().ok_or(NodeError::NotInitialized)?;
        let count = count.min(last.height().saturating_sub(1));
        tracing::info!(count, reset_height = last.height() - count, "removing blocks");

        for _ in 0..count {
            let tip = chain.last_block().cloned().ok_or(NodeError::NotInitialized)?;
            let parent = match chain.recent.iter().find(|b| b.id() == tip.previous_block()) {
                Some(parent) => parent.clone(),
                None => store.find_block_by_id(&tip.previous_block())?.ok_or_else(|| {
                    NodeError::InvalidBlock(format!("parent of block {} not found", tip.height()))
                })?,
            };
            tracing::info!(height = tip.height(), "undoing block");

            {
                let transactions = ChainTransactions { recent: &chain.recent, store };
                let parent_tip = ChainTip { height: parent.height(), timestamp: parent.timestamp() };
                state.revert_block(&tip, parent_tip, &transactions)?;
            }
            store.revert_block(&tip)?;
            chain.set_last_block(parent.clone());
            chain.last_downloaded_block = Some(parent);
            self.emit(BlockchainEvent::BlockReverted { id: tip.id(), height: tip.height() });
        }

        self.inner.metrics.last_height.set(chain.last_height() as i64);
        self.inner.metrics.wallet_count.set(state.wallets().len() as i64);
        self.inner.queue.resume();
        Ok(())
    }

    // ── Queue control ───────────────────────────────────────────────────

    /// Pause the queue and drop every waiting job.
    pub async fn clear_and_stop_queue(&self) {
        let mut core = self.inner.core.lock().await;
        self.clear_and_stop_queue_locked(&mut core.chain);
    }

    fn clear_and_stop_queue_locked(&self, chain: &mut ChainState) {
        chain.last_downloaded_block = chain.last_block().cloned();
        self.inner.queue.pause();
        self.inner.queue.clear();
    }

    pub fn queue(&self) -> &ProcessQueue {
        &self.inner.queue
    }

    // ── Wakeup timer ────────────────────────────────────────────────────

    /// Dispatch `Wakeup` once the configured idle timeout elapses.
    pub fn set_wakeup(&self) {
        let timeout = Duration::from_secs(self.inner.config.wakeup_timeout_secs);
        let mut slot = self.inner.wakeup.lock().unwrap_or_else(PoisonError::into_inner);
        let blockchain = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        *slot = Some(tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {}
                _ = tokio::time::sleep(timeout) => {
                    blockchain.inner.wakeup.lock().unwrap_or_else(PoisonError::into_inner).take();
                    blockchain.dispatch(Event::Wakeup);
                }
            }
        }));
    }

    pub fn reset_wakeup(&self) {
        self.clear_wakeup();
        self.set_wakeup();
    }

    /// Push an armed wakeup back by a full timeout. Does not arm one.
    fn postpone_wakeup(&self) {
        let armed = self.inner.wakeup.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = armed {
            handle.abort();
            self.set_wakeup();
        }
    }

    /// Wake up now, e.g. when the forger needs a fresh view of the network.
    pub fn force_wakeup(&self) {
        self.clear_wakeup();
        self.dispatch(Event::Wakeup);
    }

    fn clear_wakeup(&self) {
        if let Some(handle) = self.inner.wakeup.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }

    fn has_wakeup(&self) -> bool {
        self.inner.wakeup.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub async fn get_last_block(&self) -> Option<Block> {
        self.inner.core.lock().await.chain.last_block().cloned()
    }

    pub async fn get_last_height(&self) -> u64 {
        self.inner.core.lock().await.chain.last_height()
    }

    pub async fn get_last_downloaded_block(&self) -> Option<Block> {
        self.inner.core.lock().await.chain.last_downloaded_block.clone()
    }

    /// Point the download cursor back at the last applied block.
    pub async fn reset_last_downloaded_block(&self) {
        let mut core = self.inner.core.lock().await;
        core.chain.last_downloaded_block = core.chain.last_block().cloned();
    }

    pub async fn forked_block(&self) -> Option<Block> {
        self.inner.core.lock().await.chain.forked_block.clone()
    }

    /// Count another sighting of `block` if it is the pinged one.
    pub async fn ping_block(&self, block: &Block) -> bool {
        let now_ms = self.inner.clock.now_millis();
        self.inner.core.lock().await.chain.ping_block(block, now_ms)
    }

    pub async fn push_ping_block(&self, block: &Block) {
        let now_ms = self.inner.clock.now_millis();
        self.inner.core.lock().await.chain.push_ping_block(block, now_ms);
    }

    /// Run `f` against the wallet ledger.
    pub async fn with_wallets<R>(&self, f: impl FnOnce(&WalletRepository) -> R) -> R {
        let core = self.inner.core.lock().await;
        f(core.state.wallets())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::SyncState;
    use ark_nullables::fixtures::{
        address, empty_chain, genesis_block, keypair, milestone, network_config, transfer, BlockBuilder,
    };
    use ark_nullables::{NullClock, NullNetwork, NullStore};
    use ark_store::{BlockRepository, NetworkStatus};
    use ark_types::Balance;

    struct Harness {
        blockchain: Blockchain,
        store: Arc<NullStore>,
        network: Arc<NullNetwork>,
        genesis: Block,
    }

    fn harness(store: NullStore) -> Harness {
        let genesis = genesis_block(&keypair(1), &[(&keypair(3), 1_000)], &[(&keypair(2), "forger")]);
        let store = Arc::new(store);
        let network = Arc::new(NullNetwork::new());
        let config = NodeConfig {
            network: network_config(vec![milestone(1, true)]),
            database_rollback_steps: 1,
            ..NodeConfig::default()
        };
        let blockchain = Blockchain::new(BlockchainContext {
            config,
            genesis_block: genesis.clone(),
            store: Arc::clone(&store) as Arc<dyn Store>,
            network: Arc::clone(&network) as Arc<dyn Network>,
            clock: Arc::new(NullClock::new(0)),
            registry: Arc::new(TransactionHandlerRegistry::with_core_handlers().unwrap()),
        })
        .unwrap();
        Harness { blockchain, store, network, genesis }
    }

    #[tokio::test]
    async fn init_writes_genesis_into_an_empty_store() {
        let h = harness(NullStore::new());
        assert_eq!(h.blockchain.init().await, Event::Started);
        assert_eq!(h.store.block_count(), 1);
        assert_eq!(h.blockchain.get_last_height().await, 1);
        assert_eq!(h.store.deleted_rounds(), vec![2]);
    }

    #[tokio::test]
    async fn init_replays_persisted_blocks() {
        let h = harness(NullStore::new());
        let chain = empty_chain(&h.genesis, 5, &keypair(2));
        h.store.save_blocks(std::slice::from_ref(&h.genesis)).unwrap();
        h.store.save_blocks(&chain).unwrap();

        assert_eq!(h.blockchain.init().await, Event::Started);
        assert_eq!(h.blockchain.get_last_height().await, 6);
        let forger = h
            .blockchain
            .with_wallets(|w| w.get_nonce(&keypair(2).public))
            .await;
        assert_eq!(forger, 1);
    }

    #[tokio::test]
    async fn foreign_genesis_fails_init() {
        let h = harness(NullStore::new());
        let other = genesis_block(&keypair(9), &[], &[]);
        h.store.save_blocks(std::slice::from_ref(&other)).unwrap();
        assert_eq!(h.blockchain.init().await, Event::Failure);
    }

    #[tokio::test]
    async fn corrupt_tip_is_rolled_back() {
        let h = harness(NullStore::new());
        let chain = empty_chain(&h.genesis, 3, &keypair(2));
        h.store.save_blocks(std::slice::from_ref(&h.genesis)).unwrap();
        h.store.save_blocks(&chain[..2]).unwrap();
        let mut corrupt = chain[2].clone();
        corrupt.header.previous_block = h.genesis.id();
        h.store.insert_unchecked(&[corrupt]);

        assert_eq!(h.blockchain.init().await, Event::Rollback);
        assert_eq!(h.blockchain.rollback_database().await, Event::Success);
        assert_eq!(h.store.block_count(), 3);
        assert_eq!(h.blockchain.init().await, Event::Started);
        assert_eq!(h.blockchain.get_last_height().await, 3);
    }

    #[tokio::test]
    async fn failed_save_restores_the_tip_even_if_the_round_stays() {
        let h = harness(NullStore::new());
        assert_eq!(h.blockchain.init().await, Event::Started);
        h.store.fail_next_saves(1);
        h.store.fail_next_round_deletes(1);

        let block = BlockBuilder::on_top_of(&h.genesis)
            .transactions(vec![transfer(&keypair(3), &address(&keypair(4)), 50, 10, 1)])
            .sign(&keypair(2));
        assert!(h.blockchain.enqueue_blocks(vec![block.clone()]).await);
        let job = h.blockchain.queue().next().await.unwrap();
        h.blockchain.process_blocks(job).await.unwrap();

        assert_eq!(h.blockchain.get_last_height().await, 1);
        assert_eq!(h.blockchain.get_last_downloaded_block().await.map(|b| b.height()), Some(1));
        assert!(h.blockchain.queue().is_empty());
        assert_eq!(h.store.deleted_rounds(), vec![2]);
        let balance = h.blockchain.with_wallets(|w| w.get(&address(&keypair(3))).map(|w| w.balance)).await;
        assert_eq!(balance, Some(Balance::new(1_000)));

        // Nothing is left half-applied, so the same block goes through later.
        assert_eq!(h.blockchain.process_block(&block).await, BlockProcessorResult::Accepted);
    }

    #[tokio::test]
    async fn repeated_halts_ask_the_network_for_a_fork() {
        let h = harness(NullStore::new());
        h.network.set_health(NetworkStatus { forked: true, blocks_to_rollback: Some(4) });
        assert_eq!(h.blockchain.init().await, Event::Started);
        let attempts = h.blockchain.inner.config.max_no_block_attempts;

        for check in 0..=MAX_P2P_UPDATES {
            h.blockchain.inner.core.lock().await.chain.no_block_counter = attempts + 1;
            let event = h.blockchain.check_last_downloaded_block_synced().await;
            let expected = if check < MAX_P2P_UPDATES { Event::NetworkHalted } else { Event::Fork };
            assert_eq!(event, expected, "check {check}");
        }

        let core = h.blockchain.inner.core.lock().await;
        assert_eq!(core.chain.number_of_blocks_to_rollback, Some(4));
        assert_eq!(core.chain.p2p_update_counter, 0);
        assert_eq!(core.chain.no_block_counter, 0);
    }

    #[tokio::test]
    async fn jobs_split_at_limits_and_milestones() {
        let genesis = genesis_block(&keypair(1), &[], &[]);
        let config = NodeConfig {
            network: network_config(vec![milestone(1, true), milestone(5, true)]),
            max_blocks_per_chunk: 2,
            ..NodeConfig::default()
        };
        let blockchain = Blockchain::new(BlockchainContext {
            config,
            genesis_block: genesis.clone(),
            store: Arc::new(NullStore::new()),
            network: Arc::new(NullNetwork::new()),
            clock: Arc::new(NullClock::new(0)),
            registry: Arc::new(TransactionHandlerRegistry::with_core_handlers().unwrap()),
        })
        .unwrap();

        // Heights 2..=7: [2, 3] [4] [5, 6] [7].
        let blocks = empty_chain(&genesis, 6, &keypair(1));
        assert!(blockchain.enqueue_blocks(blocks).await);
        assert_eq!(blockchain.queue().len(), 4);
        assert_eq!(blockchain.get_last_downloaded_block().await.unwrap().height(), 7);

        let sizes = [2, 1, 2, 1];
        for size in sizes {
            assert_eq!(blockchain.queue().next().await.unwrap().len(), size);
        }
    }

    #[tokio::test]
    async fn start_without_peers_reaches_idle() {
        let h = harness(NullStore::new());
        h.blockchain.start().unwrap();
        assert!(h.blockchain.wait_until_started().await);
        assert_eq!(h.blockchain.state().await, BlockchainState::Idle);
        assert!(h.blockchain.has_wakeup());

        h.blockchain.stop().await;
        assert_eq!(h.blockchain.state().await, BlockchainState::Stopped);
        assert!(!h.blockchain.has_wakeup());
    }

    #[tokio::test]
    async fn unhandled_wakeup_is_ignored() {
        let h = harness(NullStore::new());
        assert!(h.blockchain.step(Event::Wakeup).await.is_empty());
        assert_eq!(h.blockchain.state().await, BlockchainState::Uninitialised);

        let follow_up = h.blockchain.step(Event::Start).await;
        assert_eq!(follow_up, vec![Event::Started]);
        let follow_up = h.blockchain.step(Event::Started).await;
        assert_eq!(h.blockchain.state().await, BlockchainState::SyncWithNetwork(SyncState::Syncing));
        assert_eq!(follow_up, vec![Event::NotSynced]);
    }
}
