//! IPFS hash registration.

use std::collections::BTreeSet;

use ark_ledger::{attribute_paths, index_names, AttributeValue, Wallet};
use ark_types::{CoreTransactionType, Transaction};

use crate::handler::{credit_sender, debit_sender, require};
use crate::{HandlerContext, HandlerKey, TransactionError, TransactionHandler};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpfsHandler;

fn hash(tx: &Transaction) -> Result<&str, TransactionError> {
    let hash = require(tx.ipfs_hash(), "ipfs")?;
    if hash.is_empty() || hash.len() > 90 {
        return Err(TransactionError::InvalidTransactionData(format!("invalid IPFS hash {hash:?}")));
    }
    Ok(hash)
}

fn hashes(wallet: &Wallet) -> BTreeSet<String> {
    match wallet.get_attribute(attribute_paths::IPFS_HASHES) {
        Some(AttributeValue::StringSet(set)) => set.clone(),
        _ => BTreeSet::new(),
    }
}

impl TransactionHandler for IpfsHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::core(CoreTransactionType::Ipfs, 2)
    }

    fn wallet_attributes(&self) -> &'static [&'static str] {
        &[attribute_paths::IPFS, attribute_paths::IPFS_HASHES]
    }

    fn default_addon_bytes(&self) -> u64 {
        250
    }

    fn check_type_rules(
        &self,
        tx: &Transaction,
        _sender: &Wallet,
        ctx: &HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let hash = hash(tx)?;
        if ctx.wallets.has_by_index(index_names::IPFS, hash)? {
            return Err(TransactionError::IpfsHashAlreadyExists(hash.to_string()));
        }
        Ok(())
    }

    fn apply_to_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let hash = hash(tx)?.to_string();
        let address = debit_sender(self, tx, ctx, tx.amount + tx.fee)?;
        let wallet = ctx.wallets.find_by_address(&address);
        let mut set = hashes(wallet);
        set.insert(hash);
        wallet.set_attribute(attribute_paths::IPFS_HASHES, AttributeValue::StringSet(set))?;
        ctx.wallets.index(&address);
        Ok(())
    }

    fn revert_for_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let hash = hash(tx)?;
        let address = credit_sender(tx, ctx, tx.amount + tx.fee)?;
        let wallet = ctx.wallets.find_by_address(&address);
        let mut set = hashes(wallet);
        set.remove(hash);
        if set.is_empty() {
            wallet.forget_attribute(attribute_paths::IPFS);
        } else {
            wallet.set_attribute(attribute_paths::IPFS_HASHES, AttributeValue::StringSet(set))?;
        }
        ctx.wallets.index(&address);
        Ok(())
    }
}
