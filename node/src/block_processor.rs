//! Block processing pipeline.
//!
//! Every candidate block runs through an ordered chain of checks. The first
//! check that reaches a verdict decides the outcome; later checks never run:
//!
//! 1. **Exception**: listed block ids skip validation.
//! 2. **Verification**: signature, id, payload and, for blocks carrying
//!    multi-signature transactions, the handlers' ledger-aware `verify`.
//! 3. **Incompatible transactions**: mixed versions, or version 2 before AIP11.
//! 4. **Nonce order**: version 2 nonces per sender must be gapless.
//! 5. **Chained**: the block must extend the tip; otherwise it is classified
//!    by height and slot, which is where forks are detected.
//! 6. **Generator**: the forger must be an active delegate of the round.
//! 7. **Already forged**: no transaction may already be on chain.
//! 8. **Accept**: apply to the ledger.

use std::collections::HashMap;
use std::sync::Arc;

use ark_crypto::verify_block;
use ark_store::Store;
use ark_transactions::{ChainTip, TransactionHandler};
use ark_types::{calculate_round, Block, NetworkConfig, PublicKey, Slots};

use crate::block_state::BlockState;
use crate::state_store::{ChainState, ChainTransactions};
use crate::tracing_spans::block_process_span;
use crate::NodeError;

/// Outcome of processing one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockProcessorResult {
    /// Applied to the ledger and now the tip.
    Accepted,
    /// Not applied, but harmless to relay (e.g. already known, not yet due).
    DiscardedButCanBeBroadcasted,
    Rejected,
    /// The block proves the local chain diverged; blocks must be removed.
    Rollback,
}

/// Why a block that does not extend the tip was not chained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnchainedReason {
    /// More than one block ahead of the tip.
    NotReady,
    /// The tip itself.
    AlreadyInChain,
    /// Below the tip and among the recently applied blocks.
    KnownBelowTip,
    /// Below the tip and unknown: the chains diverged.
    ForkBelowTip,
    /// Forged in a slot before the tip's.
    InvalidTimestamp,
    /// A competing block from an active delegate.
    DoubleForging,
    /// A competing block from a wallet that may not forge.
    GeneratorMismatch,
}

/// The check that decided a block's fate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockHandler {
    Exception { persisted: bool },
    VerificationFailed,
    IncompatibleTransactions,
    NonceOutOfOrder,
    Unchained(UnchainedReason),
    InvalidGenerator,
    AlreadyForged,
    Accept,
}

impl BlockHandler {
    /// The outcome decided without touching the ledger, or `None` when the
    /// block goes on to be applied.
    pub fn verdict(&self) -> Option<BlockProcessorResult> {
        use BlockProcessorResult::*;
        match self {
            Self::Exception { persisted: false } | Self::Accept => None,
            Self::Exception { persisted: true }
            | Self::VerificationFailed
            | Self::IncompatibleTransactions
            | Self::NonceOutOfOrder
            | Self::InvalidGenerator
            | Self::AlreadyForged => Some(Rejected),
            Self::Unchained(reason) => Some(match reason {
                UnchainedReason::NotReady
                | UnchainedReason::AlreadyInChain
                | UnchainedReason::KnownBelowTip => DiscardedButCanBeBroadcasted,
                UnchainedReason::ForkBelowTip | UnchainedReason::DoubleForging => Rollback,
                UnchainedReason::InvalidTimestamp | UnchainedReason::GeneratorMismatch => Rejected,
            }),
        }
    }
}

pub struct BlockProcessor {
    store: Arc<dyn Store>,
    network: Arc<NetworkConfig>,
    slots: Slots,
}

impl BlockProcessor {
    pub fn new(store: Arc<dyn Store>, network: Arc<NetworkConfig>) -> Self {
        let slots = Slots::new(network.epoch, network.milestones.clone());
        Self { store, network, slots }
    }

    /// Run `block` through the pipeline. Accepted blocks are applied to
    /// `state` and become the tip of `chain`.
    pub fn process(&self, block: &Block, state: &mut BlockState, chain: &mut ChainState) -> BlockProcessorResult {
        let span = block_process_span(block.height(), &block.id().to_hex());
        let _guard = span.enter();

        let handler = match self.get_handler(block, state, chain) {
            Ok(handler) => handler,
            Err(e) => {
                tracing::warn!(error = %e, "block could not be checked");
                return BlockProcessorResult::Rejected;
            }
        };

        match handler.verdict() {
            Some(result) => {
                tracing::debug!(?handler, ?result, "block not applied");
                result
            }
            None => self.accept(block, state, chain),
        }
    }

    /// The check that decides `block`, without applying it.
    pub fn get_handler(&self, block: &Block, state: &BlockState, chain: &ChainState) -> Result<BlockHandler, NodeError> {
        let tip = chain.last_block().ok_or(NodeError::NotInitialized)?;

        if self.network.exceptions.is_block_exception(&block.id()) {
            tracing::warn!(height = block.height(), id = %block.id(), "block is an exception, skipping checks");
            let persisted = self.store.find_block_by_id(&block.id())?.is_some();
            return Ok(BlockHandler::Exception { persisted });
        }

        if !self.verify(block, state) {
            return Ok(BlockHandler::VerificationFailed);
        }
        if self.has_incompatible_transactions(block) {
            return Ok(BlockHandler::IncompatibleTransactions);
        }
        if has_nonce_out_of_order(block, state) {
            return Ok(BlockHandler::NonceOutOfOrder);
        }
        if !self.is_chained(tip, block) {
            return Ok(BlockHandler::Unchained(self.unchained_reason(tip, block, chain)?));
        }
        if self.is_active_generator(block)? == Some(false) {
            return Ok(BlockHandler::InvalidGenerator);
        }
        if self.has_forged_transactions(block, chain)? {
            return Ok(BlockHandler::AlreadyForged);
        }
        Ok(BlockHandler::Accept)
    }

    fn accept(&self, block: &Block, state: &mut BlockState, chain: &mut ChainState) -> BlockProcessorResult {
        let parent = match chain.last_block() {
            Some(tip) => ChainTip { height: tip.height(), timestamp: tip.timestamp() },
            None => return BlockProcessorResult::Rejected,
        };
        let transactions = ChainTransactions { recent: &chain.recent, store: self.store.as_ref() };

        match state.apply_block(block, parent, &transactions) {
            Ok(()) => {
                chain.set_last_block(block.clone());
                if chain.forked_block.as_ref().is_some_and(|forked| forked.height() == block.height()) {
                    chain.forked_block = None;
                }
                tracing::debug!(height = block.height(), "block accepted");
                BlockProcessorResult::Accepted
            }
            Err(e) => {
                tracing::warn!(height = block.height(), id = %block.id(), error = %e, "refused to apply block");
                chain.last_downloaded_block = chain.last_block().cloned();
                BlockProcessorResult::Rejected
            }
        }
    }

    // ── Checks ──────────────────────────────────────────────────────────

    fn verify(&self, block: &Block, state: &BlockState) -> bool {
        let milestone = self.network.milestones.at(block.height());
        let verification = verify_block(block, milestone);
        if !verification.verified {
            tracing::warn!(height = block.height(), errors = ?verification.errors, "block failed verification");
            return false;
        }
        if !verification.contains_multi_signatures {
            return true;
        }

        block.transactions.iter().all(|tx| {
            let verified = state
                .registry()
                .get_activated_handler_for_data(tx, milestone)
                .is_ok_and(|handler| handler.verify(tx, state.wallets()));
            if !verified {
                tracing::warn!(id = %tx.id, "transaction failed ledger-aware verification");
            }
            verified
        })
    }

    fn has_incompatible_transactions(&self, block: &Block) -> bool {
        let aip11 = self.network.milestones.at(block.height()).aip11;
        let Some(first) = block.transactions.first() else {
            return false;
        };
        block
            .transactions
            .iter()
            .any(|tx| tx.version != first.version || (tx.is_v2() && !aip11))
    }

    /// A block extends `tip` when it points at it, sits one height above it
    /// and was forged in a later slot.
    pub fn is_chained(&self, tip: &Block, block: &Block) -> bool {
        block.previous_block() == tip.id()
            && block.height() == tip.height() + 1
            && self.slot(block) > self.slot(tip)
    }

    fn slot(&self, block: &Block) -> u64 {
        self.slots.slot_number(block.timestamp(), block.height())
    }

    fn unchained_reason(&self, tip: &Block, block: &Block, chain: &ChainState) -> Result<UnchainedReason, NodeError> {
        let reason = if block.height() > tip.height() + 1 {
            UnchainedReason::NotReady
        } else if block.height() < tip.height() {
            if chain.recent.contains_block(&block.id()) {
                UnchainedReason::KnownBelowTip
            } else {
                UnchainedReason::ForkBelowTip
            }
        } else if block.height() == tip.height() && block.id() == tip.id() {
            UnchainedReason::AlreadyInChain
        } else if self.slot(block) < self.slot(tip)
            || (block.height() == tip.height() + 1 && self.slot(block) == self.slot(tip))
        {
            UnchainedReason::InvalidTimestamp
        } else if self.is_active_generator(block)? == Some(false) {
            UnchainedReason::GeneratorMismatch
        } else {
            UnchainedReason::DoubleForging
        };

        tracing::info!(
            height = block.height(),
            id = %block.id(),
            tip_height = tip.height(),
            tip_id = %tip.id(),
            ?reason,
            "block does not extend the chain"
        );
        Ok(reason)
    }

    /// Whether the forger belongs to the active delegates of the block's
    /// round; `None` when that set is not known yet.
    fn is_active_generator(&self, block: &Block) -> Result<Option<bool>, NodeError> {
        let round = calculate_round(block.height(), &self.network.milestones);
        let delegates = self.store.get_active_delegates(&round)?;
        if delegates.is_empty() {
            tracing::debug!(round = round.round, "no active delegates for round, generator not checked");
            return Ok(None);
        }
        let generator: &PublicKey = block.generator_public_key();
        Ok(Some(delegates.iter().any(|delegate| delegate.public_key == *generator)))
    }

    fn has_forged_transactions(&self, block: &Block, chain: &ChainState) -> Result<bool, NodeError> {
        if block.transactions.is_empty() {
            return Ok(false);
        }
        if let Some(tx) = block.transactions.iter().find(|tx| chain.recent.contains_transaction(&tx.id)) {
            tracing::warn!(id = %tx.id, "transaction already forged in a recent block");
            return Ok(true);
        }
        let ids: Vec<_> = block.transactions.iter().map(|tx| tx.id).collect();
        let forged = self.store.get_forged_transaction_ids(&ids)?;
        if !forged.is_empty() {
            tracing::warn!(count = forged.len(), "transactions already forged");
        }
        Ok(!forged.is_empty())
    }
}

/// Version 2 nonces of each sender must continue the ledger nonce without
/// gaps within the block. Only the block is inspected, not the batch.
fn has_nonce_out_of_order(block: &Block, state: &BlockState) -> bool {
    let mut nonces: HashMap<PublicKey, u64> = HashMap::new();
    for tx in &block.transactions {
        if !tx.is_v2() {
            break;
        }
        let sender = tx.sender_public_key;
        let current = nonces.entry(sender).or_insert_with(|| state.wallets().get_nonce(&sender));
        let nonce = tx.nonce_or_zero();
        if current.checked_add(1) != Some(nonce) {
            tracing::warn!(id = %tx.id, expected = *current + 1, nonce, "transaction nonce out of order");
            return true;
        }
        *current = nonce;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_nullables::fixtures::{
        address, empty_chain, genesis_block, keypair, milestone, network_config, transfer, BlockBuilder,
    };
    use ark_nullables::NullStore;
    use ark_store::{BlockRepository, Delegate, RoundRepository};
    use ark_transactions::TransactionHandlerRegistry;
    use ark_types::{Balance, BlockId, CoreTransactionType, KeyPair};

    struct Harness {
        store: Arc<NullStore>,
        processor: BlockProcessor,
        state: BlockState,
        chain: ChainState,
        genesis: Block,
        forger: KeyPair,
        alice: KeyPair,
    }

    impl Harness {
        fn new(network: NetworkConfig) -> Self {
            let store = Arc::new(NullStore::new());
            let network = Arc::new(network);
            let registry = Arc::new(TransactionHandlerRegistry::with_core_handlers().unwrap());
            let mut state = BlockState::new(registry, Arc::clone(&network));
            let mut chain = ChainState::new(100);

            let forger = keypair(2);
            let alice = keypair(3);
            let genesis = genesis_block(&keypair(1), &[(&alice, 1_000)], &[(&forger, "forger")]);
            state.apply_block(&genesis, ChainTip::default(), store.as_ref()).unwrap();
            store.save_blocks(std::slice::from_ref(&genesis)).unwrap();
            chain.set_last_block(genesis.clone());

            let processor = BlockProcessor::new(Arc::clone(&store) as Arc<dyn Store>, network);
            Self { store, processor, state, chain, genesis, forger, alice }
        }

        fn default() -> Self {
            Self::new(network_config(vec![milestone(1, true)]))
        }

        fn process(&mut self, block: &Block) -> BlockProcessorResult {
            self.processor.process(block, &mut self.state, &mut self.chain)
        }

        fn handler(&self, block: &Block) -> BlockHandler {
            self.processor.get_handler(block, &self.state, &self.chain).unwrap()
        }

        fn tip(&self) -> Block {
            self.chain.last_block().cloned().unwrap()
        }

        fn extend(&mut self, count: usize) -> Vec<Block> {
            let blocks = empty_chain(&self.tip(), count, &self.forger);
            for block in &blocks {
                assert_eq!(self.process(block), BlockProcessorResult::Accepted);
            }
            blocks
        }
    }

    #[test]
    fn chained_block_is_accepted() {
        let mut h = Harness::default();
        let block = BlockBuilder::on_top_of(&h.genesis)
            .transactions(vec![transfer(&h.alice, &address(&keypair(9)), 50, 10, 1)])
            .sign(&h.forger);

        assert_eq!(h.process(&block), BlockProcessorResult::Accepted);
        assert_eq!(h.chain.last_height(), 2);
        let alice = h.state.wallets().get(&address(&h.alice)).unwrap();
        assert_eq!(alice.balance, Balance::new(940));
    }

    #[test]
    fn verification_failure_wins_over_later_checks() {
        let mut h = Harness::default();
        // Unchained and badly signed: verification decides.
        let mut block = BlockBuilder::new(7, BlockId::new([5; 32])).sign(&h.forger);
        block.header.block_signature = ark_types::Signature([1; 64]);

        assert_eq!(h.handler(&block), BlockHandler::VerificationFailed);
        assert_eq!(h.process(&block), BlockProcessorResult::Rejected);
    }

    #[test]
    fn nonce_gap_is_rejected() {
        let mut h = Harness::default();
        let first = BlockBuilder::on_top_of(&h.genesis)
            .transactions(vec![transfer(&h.alice, &address(&keypair(9)), 1, 1, 1)])
            .sign(&h.forger);
        assert_eq!(h.process(&first), BlockProcessorResult::Accepted);

        let gap = BlockBuilder::on_top_of(&first)
            .transactions(vec![transfer(&h.alice, &address(&keypair(9)), 1, 1, 3)])
            .sign(&h.forger);
        assert_eq!(h.handler(&gap), BlockHandler::NonceOutOfOrder);
        assert_eq!(h.process(&gap), BlockProcessorResult::Rejected);
        assert_eq!(h.chain.last_height(), 2);
    }

    #[test]
    fn mixed_versions_are_incompatible() {
        let mut h = Harness::default();
        let v1 = ark_nullables::fixtures::TransactionBuilder::new(CoreTransactionType::Transfer, &h.alice)
            .version(1)
            .recipient(&address(&keypair(9)))
            .amount(1)
            .sign(&h.alice);
        let block = BlockBuilder::on_top_of(&h.genesis)
            .transactions(vec![transfer(&h.alice, &address(&keypair(9)), 1, 1, 1), v1])
            .sign(&h.forger);
        assert_eq!(h.handler(&block), BlockHandler::IncompatibleTransactions);
        assert_eq!(h.process(&block), BlockProcessorResult::Rejected);
    }

    #[test]
    fn version_two_needs_aip11() {
        // Genesis still runs under AIP11; it is switched off from height 2.
        let h = Harness::new(network_config(vec![milestone(1, true), milestone(2, false)]));
        let block = BlockBuilder::on_top_of(&h.genesis)
            .transactions(vec![transfer(&h.alice, &address(&keypair(9)), 1, 1, 1)])
            .sign(&h.forger);
        assert_eq!(h.handler(&block), BlockHandler::IncompatibleTransactions);
    }

    #[test]
    fn unknown_block_below_tip_asks_for_rollback() {
        let mut h = Harness::default();
        let applied = h.extend(3);

        // A different block at tip - 1.
        let competing = BlockBuilder::new(applied[1].height(), applied[0].id())
            .timestamp(applied[1].timestamp() + 1)
            .sign(&keypair(7));
        assert_eq!(
            h.handler(&competing),
            BlockHandler::Unchained(UnchainedReason::ForkBelowTip)
        );
        assert_eq!(h.process(&competing), BlockProcessorResult::Rollback);

        assert_eq!(
            h.handler(&applied[1]),
            BlockHandler::Unchained(UnchainedReason::KnownBelowTip)
        );
        assert_eq!(h.process(&applied[1]), BlockProcessorResult::DiscardedButCanBeBroadcasted);
    }

    #[test]
    fn tip_and_future_blocks_are_discarded() {
        let mut h = Harness::default();
        let tip = h.extend(1).remove(0);
        assert_eq!(h.process(&tip), BlockProcessorResult::DiscardedButCanBeBroadcasted);

        let ahead = empty_chain(&tip, 2, &h.forger);
        assert_eq!(h.handler(&ahead[1]), BlockHandler::Unchained(UnchainedReason::NotReady));
        assert_eq!(h.process(&ahead[1]), BlockProcessorResult::DiscardedButCanBeBroadcasted);
    }

    #[test]
    fn competing_block_at_next_height() {
        let mut h = Harness::default();
        let tip = h.extend(2).pop().unwrap();

        // Same slot as the tip: invalid timestamp.
        let same_slot = BlockBuilder::new(tip.height() + 1, BlockId::new([4; 32]))
            .timestamp(tip.timestamp())
            .sign(&h.forger);
        assert_eq!(
            h.handler(&same_slot),
            BlockHandler::Unchained(UnchainedReason::InvalidTimestamp)
        );

        // A competing block at the tip height from an active delegate.
        h.store
            .save_round(1, &[Delegate { public_key: h.forger.public, username: "forger".into(), vote_balance: Balance::ZERO }])
            .unwrap();
        let double = BlockBuilder::new(tip.height(), tip.previous_block())
            .timestamp(tip.timestamp() + 8)
            .sign(&h.forger);
        assert_eq!(h.handler(&double), BlockHandler::Unchained(UnchainedReason::DoubleForging));
        assert_eq!(h.process(&double), BlockProcessorResult::Rollback);

        let stranger = BlockBuilder::new(tip.height(), tip.previous_block())
            .timestamp(tip.timestamp() + 8)
            .sign(&keypair(8));
        assert_eq!(h.process(&stranger), BlockProcessorResult::Rejected);
    }

    #[test]
    fn generator_must_be_active() {
        let mut h = Harness::default();
        h.store
            .save_round(1, &[Delegate { public_key: keypair(8).public, username: "other".into(), vote_balance: Balance::ZERO }])
            .unwrap();
        let block = BlockBuilder::on_top_of(&h.genesis).sign(&h.forger);
        assert_eq!(h.handler(&block), BlockHandler::InvalidGenerator);
        assert_eq!(h.process(&block), BlockProcessorResult::Rejected);
    }

    #[test]
    fn already_forged_transactions_are_rejected() {
        let mut h = Harness::default();
        let payment = transfer(&h.alice, &address(&keypair(9)), 1, 1, 1);
        let first = BlockBuilder::on_top_of(&h.genesis).transactions(vec![payment.clone()]).sign(&h.forger);
        assert_eq!(h.process(&first), BlockProcessorResult::Accepted);

        // Reset the sender's nonce so the replay gets past the nonce check.
        let alice = address(&h.alice);
        h.state.wallets_mut().find_by_address(&alice).nonce = 0;
        let replay = BlockBuilder::on_top_of(&first).transactions(vec![payment]).sign(&h.forger);
        assert_eq!(h.handler(&replay), BlockHandler::AlreadyForged);
    }

    #[test]
    fn exception_blocks_skip_checks() {
        let forger = keypair(2);
        let genesis = genesis_block(&keypair(1), &[(&keypair(3), 1_000)], &[(&forger, "forger")]);
        // Badly signed, yet listed.
        let mut listed = BlockBuilder::on_top_of(&genesis).sign(&forger);
        listed.header.block_signature = ark_types::Signature([2; 64]);

        let mut network = network_config(vec![milestone(1, true)]);
        network.exceptions.blocks.insert(listed.id());
        let mut h = Harness::new(network);
        assert_eq!(h.genesis, genesis);

        assert_eq!(h.handler(&listed), BlockHandler::Exception { persisted: false });
        assert_eq!(h.process(&listed), BlockProcessorResult::Accepted);

        h.store.save_blocks(std::slice::from_ref(&listed)).unwrap();
        assert_eq!(h.handler(&listed), BlockHandler::Exception { persisted: true });
    }

    #[test]
    fn uninitialised_chain_rejects() {
        let h = Harness::default();
        let empty = ChainState::new(10);
        let block = BlockBuilder::on_top_of(&h.genesis).sign(&h.forger);
        let err = h.processor.get_handler(&block, &h.state, &empty).unwrap_err();
        assert!(matches!(err, NodeError::NotInitialized));
    }
}
