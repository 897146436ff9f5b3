//! In-memory wallet repository.
//!
//! Wallets are owned by the address map. Indices only hold addresses, so an
//! index lookup always resolves through the address map. Callers that mutate
//! a wallet call [`WalletRepository::index`] afterwards to refresh its keys.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ark_crypto::derive_address;
use ark_types::{Address, PublicKey};

use crate::index::{builtin_indexers, names, Indexer, WalletIndex};
use crate::{AttributeSchema, LedgerError, Wallet};

#[derive(Clone, Debug)]
pub struct WalletRepository {
    schema: Arc<AttributeSchema>,
    wallets: HashMap<Address, Wallet>,
    indexes: BTreeMap<String, WalletIndex>,
}

impl WalletRepository {
    /// Create an empty repository with the built-in indices registered.
    pub fn new(schema: Arc<AttributeSchema>) -> Self {
        let indexes = builtin_indexers()
            .into_iter()
            .map(|(name, indexer)| (name.to_string(), WalletIndex::new(indexer)))
            .collect();
        Self { schema, wallets: HashMap::new(), indexes }
    }

    pub fn schema(&self) -> &Arc<AttributeSchema> {
        &self.schema
    }

    // ── Indices ─────────────────────────────────────────────────────────

    /// Register an extra index and build it over the existing wallets.
    pub fn register_index(&mut self, name: &str, indexer: Indexer) -> Result<(), LedgerError> {
        if self.indexes.contains_key(name) {
            return Err(LedgerError::IndexAlreadyRegistered(name.to_string()));
        }
        let mut index = WalletIndex::new(indexer);
        for wallet in self.wallets.values() {
            index.index(wallet);
        }
        self.indexes.insert(name.to_string(), index);
        Ok(())
    }

    pub fn unregister_index(&mut self, name: &str) -> Result<(), LedgerError> {
        self.indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| LedgerError::IndexNotFound(name.to_string()))
    }

    pub fn get_index(&self, name: &str) -> Result<&WalletIndex, LedgerError> {
        self.indexes.get(name).ok_or_else(|| LedgerError::IndexNotFound(name.to_string()))
    }

    fn get_index_mut(&mut self, name: &str) -> Result<&mut WalletIndex, LedgerError> {
        self.indexes.get_mut(name).ok_or_else(|| LedgerError::IndexNotFound(name.to_string()))
    }

    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    /// Refresh every index entry of the wallet at `address`.
    pub fn index(&mut self, address: &Address) {
        if let Some(wallet) = self.wallets.get(address) {
            for index in self.indexes.values_mut() {
                index.index(wallet);
            }
        }
    }

    pub fn index_all<'a>(&mut self, addresses: impl IntoIterator<Item = &'a Address>) {
        for address in addresses {
            self.index(address);
        }
    }

    // ── Lookup ──────────────────────────────────────────────────────────

    /// A wallet created here is indexed before it is handed out.
    fn ensure_wallet(&mut self, address: &Address) -> &mut Wallet {
        let Self { schema, wallets, indexes } = self;
        wallets.entry(address.clone()).or_insert_with(|| {
            let wallet = Wallet::new(address.clone(), Arc::clone(schema));
            for index in indexes.values_mut() {
                index.index(&wallet);
            }
            wallet
        })
    }

    /// The wallet at `address`, created empty when first referenced.
    pub fn find_by_address(&mut self, address: &Address) -> &mut Wallet {
        self.ensure_wallet(address)
    }

    /// The wallet owning `public_key`. A wallet seen for the first time gets
    /// its public key recorded and indexed.
    pub fn find_by_public_key(&mut self, public_key: &PublicKey) -> &mut Wallet {
        let address = match self.indexes.get(names::PUBLIC_KEYS).and_then(|i| i.get(&public_key.to_hex())) {
            Some(address) => address.clone(),
            None => {
                let address = derive_address(public_key);
                self.ensure_wallet(&address).public_key = Some(*public_key);
                self.index(&address);
                address
            }
        };
        self.ensure_wallet(&address)
    }

    pub fn find_by_username(&self, username: &str) -> Option<&Wallet> {
        self.find_by_index(names::USERNAMES, username).ok().flatten()
    }

    /// The wallet under `key` in `index`; `None` when the key is not indexed.
    pub fn find_by_index(&self, index: &str, key: &str) -> Result<Option<&Wallet>, LedgerError> {
        Ok(self.get_index(index)?.get(key).and_then(|address| self.wallets.get(address)))
    }

    /// Address of the wallet under `key` in `index`.
    pub fn address_by_index(&self, index: &str, key: &str) -> Result<Option<Address>, LedgerError> {
        Ok(self.get_index(index)?.get(key).cloned())
    }

    /// Existing wallet without creating it.
    pub fn get(&self, address: &Address) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    pub fn get_mut(&mut self, address: &Address) -> Option<&mut Wallet> {
        self.wallets.get_mut(address)
    }

    /// Whether any index holds `key`.
    pub fn has(&self, key: &str) -> bool {
        self.indexes.values().any(|index| index.has(key))
    }

    pub fn has_by_address(&self, address: &Address) -> bool {
        self.wallets.contains_key(address)
    }

    pub fn has_by_public_key(&self, public_key: &PublicKey) -> bool {
        self.indexes
            .get(names::PUBLIC_KEYS)
            .is_some_and(|index| index.has(&public_key.to_hex()))
    }

    pub fn has_by_username(&self, username: &str) -> bool {
        self.indexes.get(names::USERNAMES).is_some_and(|index| index.has(username))
    }

    pub fn has_by_index(&self, index: &str, key: &str) -> Result<bool, LedgerError> {
        Ok(self.get_index(index)?.has(key))
    }

    /// Nonce of the wallet owning `public_key`; zero for unknown wallets.
    pub fn get_nonce(&self, public_key: &PublicKey) -> u64 {
        self.indexes
            .get(names::PUBLIC_KEYS)
            .and_then(|index| index.get(&public_key.to_hex()))
            .and_then(|address| self.wallets.get(address))
            .map_or(0, |wallet| wallet.nonce)
    }

    // ── Removal ─────────────────────────────────────────────────────────

    pub fn forget_by_index(&mut self, index: &str, key: &str) -> Result<(), LedgerError> {
        self.get_index_mut(index)?.forget(key);
        Ok(())
    }

    pub fn forget_by_public_key(&mut self, public_key: &PublicKey) {
        if let Some(index) = self.indexes.get_mut(names::PUBLIC_KEYS) {
            index.forget(&public_key.to_hex());
        }
    }

    pub fn forget_by_username(&mut self, username: &str) {
        if let Some(index) = self.indexes.get_mut(names::USERNAMES) {
            index.forget(username);
        }
    }

    /// Remove a wallet and every index key pointing at it.
    pub fn forget_by_address(&mut self, address: &Address) -> Option<Wallet> {
        for index in self.indexes.values_mut() {
            index.remove_wallet(address);
        }
        self.wallets.remove(address)
    }

    /// Drop wallets that carry no state and are not delegates. Returns how
    /// many were removed.
    pub fn purge_empty_non_delegates(&mut self) -> usize {
        let purgeable: Vec<Address> = self
            .wallets
            .values()
            .filter(|w| w.can_be_purged() && !w.is_delegate())
            .map(|w| w.address().clone())
            .collect();
        for address in &purgeable {
            self.forget_by_address(address);
        }
        if !purgeable.is_empty() {
            tracing::debug!(purged = purgeable.len(), "purged empty wallets");
        }
        purgeable.len()
    }

    // ── Bulk ────────────────────────────────────────────────────────────

    pub fn all_by_address(&self) -> impl Iterator<Item = &Wallet> {
        self.wallets.values()
    }

    /// Every delegate wallet, ordered by username.
    pub fn all_by_username(&self) -> Vec<&Wallet> {
        let mut delegates: Vec<&Wallet> = self
            .indexes
            .get(names::USERNAMES)
            .map(|index| index.addresses().filter_map(|a| self.wallets.get(a)).collect())
            .unwrap_or_default();
        delegates.sort_by(|a, b| a.username().cmp(&b.username()));
        delegates
    }

    /// A detached copy of a wallet, for speculative checks.
    pub fn clone_wallet(&self, address: &Address) -> Option<Wallet> {
        self.wallets.get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Drop all wallets and index entries; registered indices stay.
    pub fn reset(&mut self) {
        self.wallets.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::paths;
    use crate::AttributeValue;
    use ark_types::Balance;

    fn schema() -> Arc<AttributeSchema> {
        let mut schema = AttributeSchema::new();
        for path in [paths::DELEGATE_USERNAME, paths::DELEGATE_RESIGNED, paths::VOTE] {
            schema.register(path).unwrap();
        }
        Arc::new(schema)
    }

    fn repo() -> WalletRepository {
        WalletRepository::new(schema())
    }

    fn make_delegate(repo: &mut WalletRepository, pk: &PublicKey, name: &str) -> Address {
        let wallet = repo.find_by_public_key(pk);
        wallet
            .set_attribute(paths::DELEGATE_USERNAME, AttributeValue::String(name.into()))
            .unwrap();
        let address = wallet.address().clone();
        repo.index(&address);
        address
    }

    // ── Index registry ──────────────────────────────────────────────────

    #[test]
    fn builtin_indices_registered() {
        let repo = repo();
        let names: Vec<&str> = repo.index_names().collect();
        for name in ["addresses", "publicKeys", "usernames", "resignations", "locks", "ipfs"] {
            assert!(names.contains(&name), "missing {name}");
        }
    }

    #[test]
    fn duplicate_index_rejected() {
        let mut repo = repo();
        let err = repo.register_index(names::USERNAMES, Arc::new(|_: &Wallet| Vec::<String>::new()));
        assert_eq!(err, Err(LedgerError::IndexAlreadyRegistered("usernames".into())));
    }

    #[test]
    fn unknown_index_errors_but_unknown_key_is_none() {
        let repo = repo();
        assert!(matches!(repo.get_index("nope"), Err(LedgerError::IndexNotFound(_))));
        assert!(repo.find_by_index("nope", "k").is_err());
        assert_eq!(repo.find_by_index(names::USERNAMES, "ghost").unwrap().map(|w| w.nonce), None);
    }

    #[test]
    fn custom_index_built_over_existing_wallets() {
        let mut repo = repo();
        repo.find_by_address(&Address::new("ark_rich")).balance = Balance::new(1_000);
        repo.find_by_address(&Address::new("ark_poor"));
        repo.register_index(
            "rich",
            Arc::new(|w: &Wallet| {
                if w.balance > Balance::new(100) {
                    vec![w.address().to_string()]
                } else {
                    Vec::new()
                }
            }),
        )
        .unwrap();
        assert!(repo.has_by_index("rich", "ark_rich").unwrap());
        assert!(!repo.has_by_index("rich", "ark_poor").unwrap());
    }

    // ── Lookup ──────────────────────────────────────────────────────────

    #[test]
    fn find_by_address_creates_once_and_indexes() {
        let mut repo = repo();
        let address = Address::new("ark_new");
        repo.find_by_address(&address).balance = Balance::new(5);
        assert_eq!(repo.address_by_index(names::ADDRESSES, address.as_str()).unwrap(), Some(address.clone()));

        // A second lookup hands back the same wallet.
        assert_eq!(repo.find_by_address(&address).balance, Balance::new(5));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn find_by_public_key_creates_and_indexes() {
        let mut repo = repo();
        let pk = PublicKey([7; 32]);
        assert!(!repo.has_by_public_key(&pk));
        let address = repo.find_by_public_key(&pk).address().clone();
        assert_eq!(address, derive_address(&pk));
        assert!(repo.has_by_public_key(&pk));
        assert!(repo.has_by_address(&address));
        assert_eq!(repo.get(&address).and_then(|w| w.public_key), Some(pk));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn get_nonce_defaults_to_zero() {
        let mut repo = repo();
        let pk = PublicKey([1; 32]);
        assert_eq!(repo.get_nonce(&pk), 0);
        repo.find_by_public_key(&pk).nonce = 4;
        assert_eq!(repo.get_nonce(&pk), 4);
    }

    #[test]
    fn reindex_drops_stale_keys() {
        let mut repo = repo();
        let pk = PublicKey([2; 32]);
        let address = make_delegate(&mut repo, &pk, "alice");
        assert!(repo.has_by_username("alice"));

        let wallet = repo.find_by_address(&address);
        wallet
            .set_attribute(paths::DELEGATE_USERNAME, AttributeValue::String("bob".into()))
            .unwrap();
        repo.index(&address);
        assert!(!repo.has_by_username("alice"));
        assert_eq!(repo.find_by_username("bob").map(|w| w.address()), Some(&address));
    }

    #[test]
    fn resignation_index_follows_flag() {
        let mut repo = repo();
        let address = make_delegate(&mut repo, &PublicKey([3; 32]), "carol");
        assert!(!repo.has_by_index(names::RESIGNATIONS, "carol").unwrap());
        repo.find_by_address(&address)
            .set_attribute(paths::DELEGATE_RESIGNED, AttributeValue::Bool(true))
            .unwrap();
        repo.index(&address);
        assert!(repo.has_by_index(names::RESIGNATIONS, "carol").unwrap());
    }

    #[test]
    fn all_by_username_lists_delegates() {
        let mut repo = repo();
        make_delegate(&mut repo, &PublicKey([4; 32]), "zed");
        make_delegate(&mut repo, &PublicKey([5; 32]), "amy");
        repo.find_by_public_key(&PublicKey([6; 32]));
        let names: Vec<_> = repo.all_by_username().iter().filter_map(|w| w.username()).collect();
        assert_eq!(names, vec!["amy", "zed"]);
    }

    // ── Removal ─────────────────────────────────────────────────────────

    #[test]
    fn purge_keeps_delegates_and_funded_wallets() {
        let mut repo = repo();
        repo.find_by_address(&Address::new("ark_empty"));
        repo.find_by_address(&Address::new("ark_funded")).balance = Balance::new(1);
        make_delegate(&mut repo, &PublicKey([8; 32]), "dave");
        assert_eq!(repo.purge_empty_non_delegates(), 1);
        assert!(!repo.has_by_address(&Address::new("ark_empty")));
        assert!(!repo.has("ark_empty"));
        assert!(repo.has_by_address(&Address::new("ark_funded")));
        assert!(repo.has_by_username("dave"));
    }

    #[test]
    fn index_entries_resolve_to_wallets() {
        let mut repo = repo();
        make_delegate(&mut repo, &PublicKey([9; 32]), "erin");
        repo.find_by_address(&Address::new("ark_x"));
        repo.forget_by_address(&Address::new("ark_x"));
        for name in repo.index_names().map(str::to_string).collect::<Vec<_>>() {
            let index = repo.get_index(&name).unwrap();
            for key in index.keys() {
                let address = index.get(key).unwrap();
                assert!(repo.has_by_address(address), "{name}:{key} dangles");
            }
        }
    }

    #[test]
    fn reset_clears_everything() {
        let mut repo = repo();
        make_delegate(&mut repo, &PublicKey([10; 32]), "fay");
        repo.reset();
        assert!(repo.is_empty());
        assert!(!repo.has_by_username("fay"));
        assert!(repo.get_index(names::USERNAMES).unwrap().is_empty());
    }
}
