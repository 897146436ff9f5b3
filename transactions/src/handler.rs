//! The capability interface every transaction type implements.
//!
//! Handlers never own state. Everything they read or mutate arrives through
//! [`HandlerContext`]: the wallet repository, persisted transactions, the
//! milestone in force and the current chain tip.
//!
//! Default method bodies implement the behaviour shared by every type: the
//! generic wallet checks, nonce bookkeeping and moving `amount + fee` out of
//! the sender. Type modules override only what differs.

use std::fmt;

use ark_crypto::{
    transaction_size, verify_multi_signatures, verify_second_signature,
    verify_transaction_signature,
};
use ark_ledger::{index_names, Wallet, WalletRepository};
use ark_store::TransactionRepository;
use ark_types::{
    Address, Amount, Balance, CoreTransactionType, Exceptions, Milestone, Transaction,
    CORE_TYPE_GROUP,
};
use serde::{Deserialize, Serialize};

use crate::TransactionError;

/// Registry key of a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HandlerKey {
    pub type_group: u32,
    pub transaction_type: u16,
    pub version: u8,
}

impl HandlerKey {
    pub const fn new(type_group: u32, transaction_type: u16, version: u8) -> Self {
        Self { type_group, transaction_type, version }
    }

    pub fn core(ty: CoreTransactionType, version: u8) -> Self {
        Self::new(CORE_TYPE_GROUP, ty.as_u16(), version)
    }

    /// The key a transaction is dispatched under.
    pub fn of(tx: &Transaction) -> Self {
        Self::new(tx.type_group, tx.transaction_type, tx.version)
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/v{}", self.type_group, self.transaction_type, self.version)
    }
}

/// Height and timestamp of the last applied block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChainTip {
    pub height: u64,
    pub timestamp: u32,
}

/// Everything a handler may read or mutate while checking, applying or
/// reverting one transaction.
pub struct HandlerContext<'a> {
    pub wallets: &'a mut WalletRepository,
    /// Persisted transactions, used to rebuild HTLC locks on revert.
    pub transactions: &'a dyn TransactionRepository,
    pub milestone: &'a Milestone,
    pub exceptions: &'a Exceptions,
    pub tip: ChainTip,
}

impl HandlerContext<'_> {
    pub fn is_exception(&self, tx: &Transaction) -> bool {
        self.exceptions.is_transaction_exception(&tx.id)
    }

    /// The genesis block is applied on top of an empty tip.
    pub fn is_genesis(&self) -> bool {
        self.tip.height == 0
    }

    /// Listed exceptions and genesis transactions skip the apply checks.
    pub fn bypasses_checks(&self, tx: &Transaction) -> bool {
        self.is_genesis() || self.is_exception(tx)
    }
}

/// Inputs of the dynamic fee formula.
#[derive(Clone, Copy, Debug)]
pub struct FeeContext<'a> {
    pub transaction: &'a Transaction,
    pub addon_bytes: u64,
    pub satoshi_per_byte: u64,
}

pub trait TransactionHandler: Send + Sync {
    fn key(&self) -> HandlerKey;

    /// Attribute paths this type writes to wallets.
    fn wallet_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Handlers that must be registered before this one.
    fn dependencies(&self) -> Vec<HandlerKey> {
        Vec::new()
    }

    /// Version 1 handlers are active from genesis, version 2 ones once the
    /// milestone enables AIP11.
    fn is_activated(&self, milestone: &Milestone) -> bool {
        self.key().version < 2 || milestone.aip11
    }

    /// Addon bytes used when the fee policy does not configure any.
    fn default_addon_bytes(&self) -> u64 {
        100
    }

    fn dynamic_fee(&self, ctx: &FeeContext<'_>) -> Result<Amount, TransactionError> {
        let satoshi_per_byte = ctx.satoshi_per_byte.max(1);
        let size = transaction_size(ctx.transaction)?;
        Ok(Amount::new(ctx.addon_bytes.saturating_add(size).saturating_mul(satoshi_per_byte)))
    }

    /// Signature check against the ledger's view of the sender.
    fn verify(&self, tx: &Transaction, wallets: &WalletRepository) -> bool {
        let sender = wallets
            .find_by_index(index_names::PUBLIC_KEYS, &tx.sender_public_key.to_hex())
            .ok()
            .flatten();
        match sender.and_then(Wallet::multi_signature) {
            Some(ms) => verify_multi_signatures(tx, &ms.public_keys, ms.min),
            None => verify_transaction_signature(tx, &tx.sender_public_key),
        }
    }

    /// Whether participant signatures are expected on a sender that has no
    /// multi-signature registered.
    fn accepts_participant_signatures(&self) -> bool {
        false
    }

    /// Whether the sender must cover `amount + fee` from its own balance.
    fn checks_sender_balance(&self) -> bool {
        true
    }

    /// Checks specific to this type, run after the generic wallet checks.
    fn check_type_rules(
        &self,
        _tx: &Transaction,
        _sender: &Wallet,
        _ctx: &HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        Ok(())
    }

    fn throw_if_cannot_be_applied(
        &self,
        tx: &Transaction,
        sender: &Wallet,
        ctx: &HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        if ctx.bypasses_checks(tx) {
            return Ok(());
        }
        generic_wallet_checks(self, tx, sender)?;
        self.check_type_rules(tx, sender, ctx)
    }

    fn apply(&self, tx: &Transaction, ctx: &mut HandlerContext<'_>) -> Result<(), TransactionError> {
        self.apply_to_sender(tx, ctx)?;
        self.apply_to_recipient(tx, ctx)
    }

    fn revert(&self, tx: &Transaction, ctx: &mut HandlerContext<'_>) -> Result<(), TransactionError> {
        self.revert_for_sender(tx, ctx)?;
        self.revert_for_recipient(tx, ctx)
    }

    fn apply_to_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        debit_sender(self, tx, ctx, tx.amount + tx.fee).map(|_| ())
    }

    fn revert_for_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        credit_sender(tx, ctx, tx.amount + tx.fee).map(|_| ())
    }

    fn apply_to_recipient(
        &self,
        _tx: &Transaction,
        _ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        Ok(())
    }

    fn revert_for_recipient(
        &self,
        _tx: &Transaction,
        _ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        Ok(())
    }
}

// ── Shared rules ────────────────────────────────────────────────────────

/// Sender, second-signature, multi-signature, nonce and balance checks, in
/// that order. A legacy multi-signature wallet fails the multi-signature
/// check whatever it signs.
pub fn generic_wallet_checks<H: TransactionHandler + ?Sized>(
    handler: &H,
    tx: &Transaction,
    sender: &Wallet,
) -> Result<(), TransactionError> {
    if sender.public_key.is_some_and(|pk| pk != tx.sender_public_key) {
        return Err(TransactionError::SenderWalletMismatch);
    }

    match sender.second_public_key() {
        Some(second) => {
            if !verify_second_signature(tx, second) {
                return Err(TransactionError::InvalidSecondSignature);
            }
        }
        None if tx.second_signature.is_some() => {
            return Err(TransactionError::UnexpectedSecondSignature);
        }
        None => {}
    }

    match sender.multi_signature() {
        Some(_) if sender.has_legacy_multi_signature() => {
            return Err(TransactionError::LegacyMultiSignature);
        }
        Some(ms) => {
            if !verify_multi_signatures(tx, &ms.public_keys, ms.min) {
                return Err(TransactionError::InvalidMultiSignature);
            }
        }
        None if tx.has_multi_signatures() && !handler.accepts_participant_signatures() => {
            return Err(TransactionError::UnsupportedMultiSignatureTransaction);
        }
        None => {}
    }

    sender.verify_transaction_nonce_apply(tx)?;

    if handler.checks_sender_balance()
        && (sender.balance - tx.amount - tx.fee).is_negative()
    {
        return Err(TransactionError::InsufficientBalance);
    }
    Ok(())
}

/// Run the apply checks against the sender, bump its nonce and take `debit`
/// from its balance. Returns the sender's address.
pub fn debit_sender<H: TransactionHandler + ?Sized>(
    handler: &H,
    tx: &Transaction,
    ctx: &mut HandlerContext<'_>,
    debit: Amount,
) -> Result<Address, TransactionError> {
    let sender = ctx.wallets.find_by_public_key(&tx.sender_public_key).clone();
    if ctx.is_exception(tx) {
        tracing::warn!(id = %tx.id, "transaction forcibly applied as an exception");
    }
    handler.throw_if_cannot_be_applied(tx, &sender, ctx)?;

    let address = sender.address().clone();
    let wallet = ctx.wallets.find_by_address(&address);
    wallet.increase_nonce();
    wallet.balance = wallet.balance - debit;
    ctx.wallets.index(&address);
    Ok(address)
}

/// Inverse of [`debit_sender`]: the transaction must be the sender's most
/// recent one.
pub fn credit_sender(
    tx: &Transaction,
    ctx: &mut HandlerContext<'_>,
    credit: Amount,
) -> Result<Address, TransactionError> {
    let wallet = ctx.wallets.find_by_public_key(&tx.sender_public_key);
    wallet.verify_transaction_nonce_revert(tx)?;
    wallet.decrease_nonce();
    wallet.balance = wallet.balance + credit;
    let address = wallet.address().clone();
    ctx.wallets.index(&address);
    Ok(address)
}

/// Add `delta` to the balance of the wallet at `address`.
pub fn adjust_balance(wallets: &mut WalletRepository, address: &Address, delta: Balance) {
    let wallet = wallets.find_by_address(address);
    wallet.balance = wallet.balance + delta;
    wallets.index(address);
}

/// Asset of the expected shape, or `InvalidTransactionData`.
pub(crate) fn require<T>(asset: Option<T>, what: &str) -> Result<T, TransactionError> {
    asset.ok_or_else(|| TransactionError::InvalidTransactionData(format!("missing {what} asset")))
}
