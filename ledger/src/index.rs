//! Named secondary indices over wallets.
//!
//! An index maps string keys to wallet addresses. Its indexer derives the
//! keys a wallet should be reachable under; re-indexing a wallet replaces
//! whatever keys it had before.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ark_types::Address;

use crate::wallet::{paths, Wallet};
use crate::AttributeValue;

/// Built-in index names.
pub mod names {
    pub const ADDRESSES: &str = "addresses";
    pub const PUBLIC_KEYS: &str = "publicKeys";
    pub const USERNAMES: &str = "usernames";
    pub const RESIGNATIONS: &str = "resignations";
    pub const LOCKS: &str = "locks";
    pub const IPFS: &str = "ipfs";
}

/// Derives the keys a wallet is indexed under.
pub type Indexer = Arc<dyn Fn(&Wallet) -> Vec<String> + Send + Sync>;

#[derive(Clone)]
pub struct WalletIndex {
    indexer: Indexer,
    entries: HashMap<String, Address>,
    keys_by_wallet: HashMap<Address, Vec<String>>,
}

impl fmt::Debug for WalletIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletIndex").field("entries", &self.entries.len()).finish()
    }
}

impl WalletIndex {
    pub fn new(indexer: Indexer) -> Self {
        Self { indexer, entries: HashMap::new(), keys_by_wallet: HashMap::new() }
    }

    /// Refresh the keys of `wallet`, dropping any that no longer apply.
    pub fn index(&mut self, wallet: &Wallet) {
        self.remove_wallet(wallet.address());
        let keys = (self.indexer)(wallet);
        for key in &keys {
            self.entries.insert(key.clone(), wallet.address().clone());
        }
        if !keys.is_empty() {
            self.keys_by_wallet.insert(wallet.address().clone(), keys);
        }
    }

    /// Drop every key that points at `address`.
    pub fn remove_wallet(&mut self, address: &Address) {
        if let Some(keys) = self.keys_by_wallet.remove(address) {
            for key in keys {
                if self.entries.get(&key) == Some(address) {
                    self.entries.remove(&key);
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Address> {
        self.entries.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn forget(&mut self, key: &str) {
        if let Some(address) = self.entries.remove(key) {
            if let Some(keys) = self.keys_by_wallet.get_mut(&address) {
                keys.retain(|k| k != key);
                if keys.is_empty() {
                    self.keys_by_wallet.remove(&address);
                }
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Addresses with at least one key, each once.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.keys_by_wallet.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.keys_by_wallet.clear();
    }
}

fn indexer(f: impl Fn(&Wallet) -> Vec<String> + Send + Sync + 'static) -> Indexer {
    Arc::new(f)
}

/// The indices every repository starts with.
pub(crate) fn builtin_indexers() -> Vec<(&'static str, Indexer)> {
    vec![
        (names::ADDRESSES, indexer(|w| vec![w.address().to_string()])),
        (names::PUBLIC_KEYS, indexer(|w| w.public_key.iter().map(|pk| pk.to_hex()).collect())),
        (names::USERNAMES, indexer(|w| w.username().map(str::to_string).into_iter().collect())),
        (
            names::RESIGNATIONS,
            indexer(|w| {
                if w.is_resigned_delegate() {
                    w.username().map(str::to_string).into_iter().collect()
                } else {
                    Vec::new()
                }
            }),
        ),
        (
            names::LOCKS,
            indexer(|w| {
                w.locks().map(|locks| locks.keys().map(|id| id.to_hex()).collect()).unwrap_or_default()
            }),
        ),
        (
            names::IPFS,
            indexer(|w| match w.get_attribute(paths::IPFS_HASHES) {
                Some(AttributeValue::StringSet(hashes)) => hashes.iter().cloned().collect(),
                _ => Vec::new(),
            }),
        ),
    ]
}
