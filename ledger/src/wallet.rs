//! A wallet: address, optional public key, balance, nonce and attributes.

use std::collections::BTreeMap;
use std::sync::Arc;

use ark_types::{Address, Balance, MultiSignatureAsset, PublicKey, Transaction, TransactionId};

use crate::attributes::{AttributeMap, AttributeSchema, AttributeValue, HtlcLock};
use crate::LedgerError;

/// Attribute paths used by the core transaction handlers.
pub mod paths {
    pub const DELEGATE: &str = "delegate";
    pub const DELEGATE_USERNAME: &str = "delegate.username";
    pub const DELEGATE_VOTE_BALANCE: &str = "delegate.voteBalance";
    pub const DELEGATE_FORGED_FEES: &str = "delegate.forgedFees";
    pub const DELEGATE_FORGED_REWARDS: &str = "delegate.forgedRewards";
    pub const DELEGATE_PRODUCED_BLOCKS: &str = "delegate.producedBlocks";
    pub const DELEGATE_LAST_BLOCK: &str = "delegate.lastBlock";
    pub const DELEGATE_RESIGNED: &str = "delegate.resigned";
    pub const VOTE: &str = "vote";
    pub const SECOND_PUBLIC_KEY: &str = "secondPublicKey";
    pub const MULTI_SIGNATURE: &str = "multiSignature";
    pub const MULTI_SIGNATURE_LEGACY: &str = "multiSignature.legacy";
    pub const IPFS: &str = "ipfs";
    pub const IPFS_HASHES: &str = "ipfs.hashes";
    pub const HTLC: &str = "htlc";
    pub const HTLC_LOCKS: &str = "htlc.locks";
    pub const HTLC_LOCKED_BALANCE: &str = "htlc.lockedBalance";
}

#[derive(Clone, Debug)]
pub struct Wallet {
    address: Address,
    pub public_key: Option<PublicKey>,
    pub balance: Balance,
    pub nonce: u64,
    attributes: AttributeMap,
}

impl Wallet {
    pub fn new(address: Address, schema: Arc<AttributeSchema>) -> Self {
        Self {
            address,
            public_key: None,
            balance: Balance::ZERO,
            nonce: 0,
            attributes: AttributeMap::new(schema),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    // ── Attributes ──────────────────────────────────────────────────────

    pub fn get_attribute(&self, path: &str) -> Option<&AttributeValue> {
        self.attributes.get(path)
    }

    pub fn get_attribute_mut(&mut self, path: &str) -> Option<&mut AttributeValue> {
        self.attributes.get_mut(path)
    }

    pub fn set_attribute(
        &mut self,
        path: &str,
        value: AttributeValue,
    ) -> Result<Option<AttributeValue>, LedgerError> {
        self.attributes.set(path, value)
    }

    pub fn forget_attribute(&mut self, path: &str) -> bool {
        self.attributes.forget(path)
    }

    pub fn has_attribute(&self, path: &str) -> bool {
        self.attributes.has(path)
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// A balance attribute, zero when unset.
    pub fn balance_attribute(&self, path: &str) -> Result<Balance, LedgerError> {
        match self.attributes.get(path) {
            None => Ok(Balance::ZERO),
            Some(AttributeValue::Balance(b)) => Ok(*b),
            Some(_) => Err(type_error(path, "balance")),
        }
    }

    /// Add `delta` to a balance attribute, creating it at zero.
    pub fn add_to_balance_attribute(&mut self, path: &str, delta: Balance) -> Result<(), LedgerError> {
        let current = self.balance_attribute(path)?;
        self.attributes.set(path, AttributeValue::Balance(current + delta))?;
        Ok(())
    }

    /// An integer attribute, zero when unset.
    pub fn integer_attribute(&self, path: &str) -> Result<u64, LedgerError> {
        match self.attributes.get(path) {
            None => Ok(0),
            Some(AttributeValue::Integer(n)) => Ok(*n),
            Some(_) => Err(type_error(path, "integer")),
        }
    }

    pub fn string_attribute(&self, path: &str) -> Option<&str> {
        match self.attributes.get(path) {
            Some(AttributeValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn public_key_attribute(&self, path: &str) -> Option<&PublicKey> {
        match self.attributes.get(path) {
            Some(AttributeValue::PublicKey(pk)) => Some(pk),
            _ => None,
        }
    }

    pub fn bool_attribute(&self, path: &str) -> bool {
        matches!(self.attributes.get(path), Some(AttributeValue::Bool(true)))
    }

    // ── Role helpers ────────────────────────────────────────────────────

    pub fn is_delegate(&self) -> bool {
        self.has_attribute(paths::DELEGATE)
    }

    pub fn is_resigned_delegate(&self) -> bool {
        self.bool_attribute(paths::DELEGATE_RESIGNED)
    }

    pub fn has_voted(&self) -> bool {
        self.has_attribute(paths::VOTE)
    }

    pub fn has_second_signature(&self) -> bool {
        self.has_attribute(paths::SECOND_PUBLIC_KEY)
    }

    pub fn has_multi_signature(&self) -> bool {
        self.has_attribute(paths::MULTI_SIGNATURE)
    }

    /// Registered through a version 1 transaction.
    pub fn has_legacy_multi_signature(&self) -> bool {
        self.bool_attribute(paths::MULTI_SIGNATURE_LEGACY)
    }

    pub fn username(&self) -> Option<&str> {
        self.string_attribute(paths::DELEGATE_USERNAME)
    }

    /// The delegate this wallet votes for.
    pub fn vote(&self) -> Option<&PublicKey> {
        self.public_key_attribute(paths::VOTE)
    }

    pub fn second_public_key(&self) -> Option<&PublicKey> {
        self.public_key_attribute(paths::SECOND_PUBLIC_KEY)
    }

    pub fn multi_signature(&self) -> Option<&MultiSignatureAsset> {
        match self.attributes.get(paths::MULTI_SIGNATURE) {
            Some(AttributeValue::MultiSignature(ms)) => Some(ms),
            _ => None,
        }
    }

    pub fn vote_balance(&self) -> Result<Balance, LedgerError> {
        self.balance_attribute(paths::DELEGATE_VOTE_BALANCE)
    }

    pub fn locked_balance(&self) -> Result<Balance, LedgerError> {
        self.balance_attribute(paths::HTLC_LOCKED_BALANCE)
    }

    pub fn locks(&self) -> Option<&BTreeMap<TransactionId, HtlcLock>> {
        match self.attributes.get(paths::HTLC_LOCKS) {
            Some(AttributeValue::Locks(locks)) => Some(locks),
            _ => None,
        }
    }

    /// Mutable lock map, created empty when missing.
    pub fn locks_mut(&mut self) -> Result<&mut BTreeMap<TransactionId, HtlcLock>, LedgerError> {
        if self.attributes.get(paths::HTLC_LOCKS).is_none() {
            self.attributes.set(paths::HTLC_LOCKS, AttributeValue::Locks(BTreeMap::new()))?;
        }
        match self.attributes.get_mut(paths::HTLC_LOCKS) {
            Some(AttributeValue::Locks(locks)) => Ok(locks),
            _ => Err(type_error(paths::HTLC_LOCKS, "lock map")),
        }
    }

    /// A wallet with no balance, no locked funds and no attributes carries no
    /// state worth keeping.
    pub fn can_be_purged(&self) -> bool {
        let locked = self.locked_balance().unwrap_or(Balance::ZERO);
        self.balance.is_zero() && locked.is_zero() && self.attributes.is_empty()
    }

    // ── Nonce ───────────────────────────────────────────────────────────

    /// A version 2 transaction must carry exactly `nonce + 1`.
    pub fn verify_transaction_nonce_apply(&self, tx: &Transaction) -> Result<(), LedgerError> {
        let nonce = tx.nonce_or_zero();
        if tx.is_v2() && self.nonce.checked_add(1) != Some(nonce) {
            return Err(LedgerError::UnexpectedNonce {
                transaction_nonce: nonce,
                wallet_nonce: self.nonce,
                reverted: false,
            });
        }
        Ok(())
    }

    /// A version 2 transaction can only be reverted while it is the last one
    /// applied for this sender.
    pub fn verify_transaction_nonce_revert(&self, tx: &Transaction) -> Result<(), LedgerError> {
        let nonce = tx.nonce_or_zero();
        if tx.is_v2() && self.nonce != nonce {
            return Err(LedgerError::UnexpectedNonce {
                transaction_nonce: nonce,
                wallet_nonce: self.nonce,
                reverted: true,
            });
        }
        Ok(())
    }

    pub fn increase_nonce(&mut self) {
        self.nonce = self.nonce.saturating_add(1);
    }

    pub fn decrease_nonce(&mut self) {
        self.nonce = self.nonce.saturating_sub(1);
    }
}

fn type_error(path: &str, expected: &'static str) -> LedgerError {
    LedgerError::AttributeType { path: path.to_string(), expected }
}
