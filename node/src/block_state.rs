//! Block-level ledger mutation.
//!
//! Applying a block runs each transaction through the handler activated at
//! the block's height, then pays reward and fees to the forger. Reverting
//! does the same backwards, forger first.
//!
//! Vote balances follow stake. A wallet's stake is its balance plus its
//! HTLC-locked funds; whatever a voter's stake gains or loses during an
//! operation, its delegate's vote balance gains or loses too. A wallet that
//! switches its vote moves its whole stake from the old delegate to the new
//! one. Because the bookkeeping compares snapshots taken around each
//! operation, a revert undoes exactly what the apply did.

use std::sync::Arc;

use ark_crypto::derive_address;
use ark_ledger::{attribute_paths, index_names, AttributeValue, WalletRepository};
use ark_store::TransactionRepository;
use ark_transactions::{ChainTip, HandlerContext, TransactionHandler, TransactionHandlerRegistry};
use ark_types::{Address, Balance, Block, NetworkConfig, PublicKey, Transaction, TransactionId};

use crate::NodeError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Apply,
    Revert,
}

/// Vote target and stake of one wallet at one point in time.
#[derive(Clone, Debug)]
struct Stake {
    vote: Option<PublicKey>,
    amount: Balance,
}

pub struct BlockState {
    wallets: WalletRepository,
    registry: Arc<TransactionHandlerRegistry>,
    network: Arc<NetworkConfig>,
}

impl BlockState {
    pub fn new(registry: Arc<TransactionHandlerRegistry>, network: Arc<NetworkConfig>) -> Self {
        let wallets = WalletRepository::new(Arc::new(registry.attribute_schema()));
        Self { wallets, registry, network }
    }

    pub fn wallets(&self) -> &WalletRepository {
        &self.wallets
    }

    pub fn wallets_mut(&mut self) -> &mut WalletRepository {
        &mut self.wallets
    }

    pub fn registry(&self) -> &TransactionHandlerRegistry {
        &self.registry
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Forget every wallet, e.g. before replaying the chain.
    pub fn reset(&mut self) {
        self.wallets.reset();
    }

    // ── Blocks ──────────────────────────────────────────────────────────

    /// Apply `block` on top of `parent`. On failure the ledger is left as it
    /// was before the call.
    pub fn apply_block(
        &mut self,
        block: &Block,
        parent: ChainTip,
        transactions: &dyn TransactionRepository,
    ) -> Result<(), NodeError> {
        if block.is_genesis() {
            self.init_genesis_forger_wallet(block.generator_public_key());
        }

        let mut applied = 0;
        let mut outcome = Ok(());
        for tx in &block.transactions {
            if let Err(e) = self.apply_transaction(tx, parent, transactions) {
                outcome = Err(e);
                break;
            }
            applied += 1;
        }
        if outcome.is_ok() {
            outcome = self.apply_block_to_forger(block, Direction::Apply);
        }

        if let Err(e) = outcome {
            tracing::warn!(height = block.height(), id = %block.id(), error = %e, "failed to apply block");
            for tx in block.transactions[..applied].iter().rev() {
                if let Err(undo) = self.revert_transaction(tx, parent, transactions) {
                    tracing::error!(id = %tx.id, error = %undo, "failed to undo a transaction of a rejected block");
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Revert `block`, which must be the last applied block. `parent` is the
    /// tip the block was applied on. On failure whatever was reverted is
    /// applied again.
    pub fn revert_block(
        &mut self,
        block: &Block,
        parent: ChainTip,
        transactions: &dyn TransactionRepository,
    ) -> Result<(), NodeError> {
        self.apply_block_to_forger(block, Direction::Revert)?;

        let mut reverted = 0;
        let mut outcome = Ok(());
        for tx in block.transactions.iter().rev() {
            if let Err(e) = self.revert_transaction(tx, parent, transactions) {
                outcome = Err(e);
                break;
            }
            reverted += 1;
        }

        if let Err(e) = outcome {
            tracing::error!(height = block.height(), id = %block.id(), error = %e, "failed to revert block");
            let first_reverted = block.transactions.len() - reverted;
            for tx in &block.transactions[first_reverted..] {
                if let Err(redo) = self.apply_transaction(tx, parent, transactions) {
                    tracing::error!(id = %tx.id, error = %redo, "failed to re-apply a transaction");
                }
            }
            if let Err(redo) = self.apply_block_to_forger(block, Direction::Apply) {
                tracing::error!(id = %block.id(), error = %redo, "failed to re-apply forger rewards");
            }
            return Err(e);
        }
        Ok(())
    }

    fn init_genesis_forger_wallet(&mut self, generator: &PublicKey) {
        if self.wallets.has_by_public_key(generator) {
            return;
        }
        // Creates and indexes the wallet.
        self.wallets.find_by_public_key(generator);
    }

    fn apply_block_to_forger(&mut self, block: &Block, direction: Direction) -> Result<(), NodeError> {
        let address = self.wallets.find_by_public_key(block.generator_public_key()).address().clone();
        let holders = [address.clone()];
        let before = self.stakes(&holders);

        let (reward, fees) = match direction {
            Direction::Apply => (Balance::from(block.header.reward), Balance::from(block.header.total_fee)),
            Direction::Revert => (-Balance::from(block.header.reward), -Balance::from(block.header.total_fee)),
        };
        let wallet = self.wallets.find_by_address(&address);
        wallet.balance += reward + fees;

        if wallet.is_delegate() {
            let produced = wallet.integer_attribute(attribute_paths::DELEGATE_PRODUCED_BLOCKS)?;
            let produced = match direction {
                Direction::Apply => produced.saturating_add(1),
                Direction::Revert => produced.saturating_sub(1),
            };
            wallet.set_attribute(attribute_paths::DELEGATE_PRODUCED_BLOCKS, AttributeValue::Integer(produced))?;
            wallet.add_to_balance_attribute(attribute_paths::DELEGATE_FORGED_FEES, fees)?;
            wallet.add_to_balance_attribute(attribute_paths::DELEGATE_FORGED_REWARDS, reward)?;
            match direction {
                Direction::Apply => {
                    wallet.set_attribute(
                        attribute_paths::DELEGATE_LAST_BLOCK,
                        AttributeValue::String(block.id().to_hex()),
                    )?;
                }
                Direction::Revert => {
                    wallet.forget_attribute(attribute_paths::DELEGATE_LAST_BLOCK);
                }
            }
        }
        self.wallets.index(&address);

        let after = self.stakes(&holders);
        self.update_vote_balances(&before, &after)
    }

    // ── Transactions ────────────────────────────────────────────────────

    /// Apply `tx` as part of the block on top of `parent`.
    pub fn apply_transaction(
        &mut self,
        tx: &Transaction,
        parent: ChainTip,
        transactions: &dyn TransactionRepository,
    ) -> Result<(), NodeError> {
        self.run_transaction(tx, parent, transactions, Direction::Apply)
    }

    pub fn revert_transaction(
        &mut self,
        tx: &Transaction,
        parent: ChainTip,
        transactions: &dyn TransactionRepository,
    ) -> Result<(), NodeError> {
        self.run_transaction(tx, parent, transactions, Direction::Revert)
    }

    fn run_transaction(
        &mut self,
        tx: &Transaction,
        parent: ChainTip,
        transactions: &dyn TransactionRepository,
        direction: Direction,
    ) -> Result<(), NodeError> {
        let holders = self.stake_holders(tx, transactions)?;
        let before = self.stakes(&holders);

        let milestone = self.network.milestones.at(parent.height + 1);
        let handler = self.registry.get_activated_handler_for_data(tx, milestone)?;
        let mut ctx = HandlerContext {
            wallets: &mut self.wallets,
            transactions,
            milestone,
            exceptions: &self.network.exceptions,
            tip: parent,
        };
        match direction {
            Direction::Apply => handler.apply(tx, &mut ctx)?,
            Direction::Revert => handler.revert(tx, &mut ctx)?,
        }

        let after = self.stakes(&holders);
        self.update_vote_balances(&before, &after)
    }

    // ── Vote balances ───────────────────────────────────────────────────

    /// Every wallet whose stake `tx` can change.
    fn stake_holders(
        &self,
        tx: &Transaction,
        transactions: &dyn TransactionRepository,
    ) -> Result<Vec<Address>, NodeError> {
        let mut holders = vec![derive_address(&tx.sender_public_key)];
        if let Some(recipient) = &tx.recipient_id {
            push_unique(&mut holders, recipient.clone());
        }
        for payment in tx.payments().unwrap_or_default() {
            push_unique(&mut holders, payment.recipient_id.clone());
        }

        let lock_id = tx
            .claim_asset()
            .map(|claim| claim.lock_transaction_id)
            .or_else(|| tx.refund_asset().map(|refund| refund.lock_transaction_id));
        if let Some(lock_id) = lock_id {
            for address in self.lock_parties(&lock_id, transactions)? {
                push_unique(&mut holders, address);
            }
        }
        Ok(holders)
    }

    /// Owner and recipient of the lock `id`: from the open lock while it
    /// exists, otherwise from the lock transaction.
    fn lock_parties(
        &self,
        id: &TransactionId,
        transactions: &dyn TransactionRepository,
    ) -> Result<Vec<Address>, NodeError> {
        if let Some(owner) = self.wallets.address_by_index(index_names::LOCKS, &id.to_hex())? {
            let recipient = self
                .wallets
                .get(&owner)
                .and_then(|wallet| wallet.locks()?.get(id).map(|lock| lock.recipient_id.clone()));
            return Ok([Some(owner), recipient].into_iter().flatten().collect());
        }
        Ok(match transactions.find_transaction_by_id(id)? {
            Some(lock) => [Some(derive_address(&lock.sender_public_key)), lock.recipient_id]
                .into_iter()
                .flatten()
                .collect(),
            None => Vec::new(),
        })
    }

    fn stakes(&self, holders: &[Address]) -> Vec<Stake> {
        holders
            .iter()
            .map(|address| match self.wallets.get(address) {
                Some(wallet) => Stake {
                    vote: wallet.vote().copied(),
                    amount: wallet.balance + wallet.locked_balance().unwrap_or(Balance::ZERO),
                },
                None => Stake { vote: None, amount: Balance::ZERO },
            })
            .collect()
    }

    fn update_vote_balances(&mut self, before: &[Stake], after: &[Stake]) -> Result<(), NodeError> {
        for (old, new) in before.iter().zip(after) {
            if old.vote == new.vote {
                let delta = new.amount - old.amount;
                if let (Some(delegate), false) = (&new.vote, delta.is_zero()) {
                    self.add_vote_balance(delegate, delta)?;
                }
                continue;
            }
            if let Some(delegate) = &old.vote {
                self.add_vote_balance(delegate, -old.amount)?;
            }
            if let Some(delegate) = &new.vote {
                self.add_vote_balance(delegate, new.amount)?;
            }
        }
        Ok(())
    }

    fn add_vote_balance(&mut self, delegate: &PublicKey, delta: Balance) -> Result<(), NodeError> {
        let address = self.wallets.address_by_index(index_names::PUBLIC_KEYS, &delegate.to_hex())?;
        match address.as_ref().and_then(|address| self.wallets.get_mut(address)) {
            Some(wallet) if wallet.is_delegate() => {
                wallet.add_to_balance_attribute(attribute_paths::DELEGATE_VOTE_BALANCE, delta)?;
            }
            _ => tracing::warn!(delegate = %delegate.to_hex(), %delta, "vote balance change for a non-delegate"),
        }
        Ok(())
    }
}

fn push_unique(holders: &mut Vec<Address>, address: Address) {
    if !holders.contains(&address) {
        holders.push(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ledger::Wallet;
    use ark_nullables::fixtures::{
        address, delegate_registration, genesis_block, keypair, transfer, vote, BlockBuilder,
    };
    use ark_nullables::NullStore;
    use ark_types::{KeyPair, Vote};

    const TIP: ChainTip = ChainTip { height: 10, timestamp: 80 };

    fn block_state() -> BlockState {
        let registry = TransactionHandlerRegistry::with_core_handlers().unwrap();
        BlockState::new(Arc::new(registry), Arc::new(NetworkConfig::default()))
    }

    fn fund(state: &mut BlockState, keys: &KeyPair, amount: i128) {
        state.wallets_mut().find_by_public_key(&keys.public).balance = Balance::new(amount);
    }

    fn wallet(state: &BlockState, keys: &KeyPair) -> Wallet {
        state.wallets().get(&address(keys)).cloned().unwrap()
    }

    fn vote_balance(state: &BlockState, keys: &KeyPair) -> i128 {
        wallet(state, keys).vote_balance().unwrap().raw()
    }

    #[test]
    fn transfer_applies_and_reverts() {
        let mut state = block_state();
        let store = NullStore::new();
        let alice = keypair(1);
        let bob = keypair(2);
        fund(&mut state, &alice, 100);

        let tx = transfer(&alice, &address(&bob), 50, 10, 1);
        state.apply_transaction(&tx, TIP, &store).unwrap();
        assert_eq!(wallet(&state, &alice).balance.raw(), 40);
        assert_eq!(wallet(&state, &alice).nonce, 1);
        assert_eq!(wallet(&state, &bob).balance.raw(), 50);

        state.revert_transaction(&tx, TIP, &store).unwrap();
        assert_eq!(wallet(&state, &alice).balance.raw(), 100);
        assert_eq!(wallet(&state, &alice).nonce, 0);
        assert_eq!(wallet(&state, &bob).balance.raw(), 0);
    }

    #[test]
    fn vote_balance_follows_the_voter() {
        let mut state = block_state();
        let store = NullStore::new();
        let delegate = keypair(3);
        let voter = keypair(4);
        let other = keypair(5);
        fund(&mut state, &delegate, 100);
        fund(&mut state, &voter, 1_000);

        let registration = delegate_registration(&delegate, "d3", 1);
        let ballot = vote(&voter, vec![Vote::Vote(delegate.public)], 1);
        let payment = transfer(&voter, &address(&other), 100, 10, 2);

        state.apply_transaction(&registration, TIP, &store).unwrap();
        state.apply_transaction(&ballot, TIP, &store).unwrap();
        assert_eq!(vote_balance(&state, &delegate), 999);

        state.apply_transaction(&payment, TIP, &store).unwrap();
        assert_eq!(vote_balance(&state, &delegate), 889);

        state.revert_transaction(&payment, TIP, &store).unwrap();
        assert_eq!(vote_balance(&state, &delegate), 999);
        state.revert_transaction(&ballot, TIP, &store).unwrap();
        assert_eq!(vote_balance(&state, &delegate), 0);
    }

    #[test]
    fn unvote_removes_the_whole_stake() {
        let mut state = block_state();
        let store = NullStore::new();
        let delegate = keypair(3);
        let voter = keypair(4);
        fund(&mut state, &delegate, 100);
        fund(&mut state, &voter, 500);

        state.apply_transaction(&delegate_registration(&delegate, "d3", 1), TIP, &store).unwrap();
        state.apply_transaction(&vote(&voter, vec![Vote::Vote(delegate.public)], 1), TIP, &store).unwrap();
        let unvote = vote(&voter, vec![Vote::Unvote(delegate.public)], 2);
        state.apply_transaction(&unvote, TIP, &store).unwrap();
        assert_eq!(vote_balance(&state, &delegate), 0);

        state.revert_transaction(&unvote, TIP, &store).unwrap();
        assert_eq!(vote_balance(&state, &delegate), 499);
    }

    #[test]
    fn forger_is_paid_and_reverted() {
        let mut state = block_state();
        let store = NullStore::new();
        let genesis_keys = keypair(1);
        let forger = keypair(2);
        let alice = keypair(3);
        let bob = keypair(4);

        let genesis = genesis_block(&genesis_keys, &[(&alice, 1_000)], &[(&forger, "forger")]);
        state.apply_block(&genesis, ChainTip::default(), &store).unwrap();
        let forger_balance = wallet(&state, &forger).balance.raw();

        let block = BlockBuilder::on_top_of(&genesis)
            .reward(2)
            .transactions(vec![transfer(&alice, &address(&bob), 100, 10, 1)])
            .sign(&forger);
        let parent = ChainTip { height: 1, timestamp: genesis.timestamp() };
        state.apply_block(&block, parent, &store).unwrap();

        let paid = wallet(&state, &forger);
        assert_eq!(paid.balance.raw(), forger_balance + 12);
        assert_eq!(paid.integer_attribute(attribute_paths::DELEGATE_PRODUCED_BLOCKS).unwrap(), 1);
        assert_eq!(paid.balance_attribute(attribute_paths::DELEGATE_FORGED_FEES).unwrap().raw(), 10);
        assert_eq!(paid.balance_attribute(attribute_paths::DELEGATE_FORGED_REWARDS).unwrap().raw(), 2);
        let last_block = block.id().to_hex();
        assert_eq!(paid.string_attribute(attribute_paths::DELEGATE_LAST_BLOCK), Some(last_block.as_str()));

        state.revert_block(&block, parent, &store).unwrap();
        let reverted = wallet(&state, &forger);
        assert_eq!(reverted.balance.raw(), forger_balance);
        assert_eq!(reverted.integer_attribute(attribute_paths::DELEGATE_PRODUCED_BLOCKS).unwrap(), 0);
        assert!(!reverted.has_attribute(attribute_paths::DELEGATE_LAST_BLOCK));
        assert_eq!(wallet(&state, &alice).balance.raw(), 1_000);
        assert_eq!(wallet(&state, &bob).balance.raw(), 0);
    }

    #[test]
    fn failed_block_leaves_the_ledger_untouched() {
        let mut state = block_state();
        let store = NullStore::new();
        let forger = keypair(2);
        let alice = keypair(3);
        fund(&mut state, &alice, 100);

        let block = BlockBuilder::new(11, ark_types::BlockId::ZERO)
            .transactions(vec![
                transfer(&alice, &address(&keypair(4)), 50, 10, 1),
                transfer(&alice, &address(&keypair(5)), 50, 10, 2),
            ])
            .sign(&forger);
        assert!(state.apply_block(&block, TIP, &store).is_err());

        let alice_wallet = wallet(&state, &alice);
        assert_eq!(alice_wallet.balance.raw(), 100);
        assert_eq!(alice_wallet.nonce, 0);
        assert_eq!(wallet(&state, &keypair(4)).balance.raw(), 0);
        assert!(state.wallets().get(&address(&forger)).is_none());
    }
}
