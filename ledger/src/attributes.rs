//! Wallet attribute bag.
//!
//! Attributes are stored flat under dotted paths (`delegate.username`,
//! `htlc.locks`). Only paths registered in the shared [`AttributeSchema`] can
//! be set. Presence checks and removal treat a path as a prefix, so
//! `has("delegate")` is true once any `delegate.*` path is set.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use ark_types::{
    Address, Amount, Balance, HtlcExpiration, MultiSignatureAsset, PublicKey, TransactionId,
};

use crate::LedgerError;

/// An HTLC lock held by the sender wallet until claimed or refunded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtlcLock {
    pub amount: Amount,
    pub recipient_id: Address,
    /// Timestamp carried by the lock transaction; zero for version 2.
    pub timestamp: u32,
    pub vendor_field: Option<String>,
    pub secret_hash: String,
    pub expiration: HtlcExpiration,
}

/// A typed attribute value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    Bool(bool),
    Integer(u64),
    Balance(Balance),
    String(String),
    PublicKey(PublicKey),
    MultiSignature(MultiSignatureAsset),
    Locks(BTreeMap<TransactionId, HtlcLock>),
    StringSet(BTreeSet<String>),
}

/// The set of attribute paths wallets may carry.
#[derive(Clone, Debug, Default)]
pub struct AttributeSchema {
    paths: HashSet<String>,
}

impl AttributeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: impl Into<String>) -> Result<(), LedgerError> {
        let path = path.into();
        if self.paths.contains(&path) {
            return Err(LedgerError::AttributeAlreadyRegistered(path));
        }
        self.paths.insert(path);
        Ok(())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn covers(prefix: &str, path: &str) -> bool {
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'.')
}

/// Schema-checked attribute storage of one wallet.
#[derive(Clone, Debug)]
pub struct AttributeMap {
    schema: Arc<AttributeSchema>,
    values: BTreeMap<String, AttributeValue>,
}

impl AttributeMap {
    pub fn new(schema: Arc<AttributeSchema>) -> Self {
        Self { schema, values: BTreeMap::new() }
    }

    pub fn get(&self, path: &str) -> Option<&AttributeValue> {
        self.values.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut AttributeValue> {
        self.values.get_mut(path)
    }

    /// Set a registered path, returning the previous value.
    pub fn set(
        &mut self,
        path: &str,
        value: AttributeValue,
    ) -> Result<Option<AttributeValue>, LedgerError> {
        if !self.schema.contains(path) {
            return Err(LedgerError::UnknownAttribute(path.to_string()));
        }
        Ok(self.values.insert(path.to_string(), value))
    }

    /// Whether `path` or any path below it is set.
    pub fn has(&self, path: &str) -> bool {
        if self.values.contains_key(path) {
            return true;
        }
        let child_prefix = format!("{path}.");
        self.values
            .range(child_prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&child_prefix))
    }

    /// Remove `path` and everything below it. Returns whether anything was removed.
    pub fn forget(&mut self, path: &str) -> bool {
        let before = self.values.len();
        self.values.retain(|key, _| !covers(path, key));
        self.values.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
