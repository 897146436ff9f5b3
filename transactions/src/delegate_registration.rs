//! Delegate registration under a unique username.

use ark_ledger::{attribute_paths as paths, AttributeValue, Wallet};
use ark_types::{Balance, CoreTransactionType, Transaction};

use crate::handler::{credit_sender, debit_sender, require};
use crate::{HandlerContext, HandlerKey, TransactionError, TransactionHandler};

const MAX_USERNAME_LEN: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelegateRegistrationHandler {
    pub version: u8,
}

fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= MAX_USERNAME_LEN
        && username
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "!@$&_.".contains(c))
}

fn username(tx: &Transaction) -> Result<&str, TransactionError> {
    let username = require(tx.delegate_username(), "delegate")?;
    if !is_valid_username(username) {
        return Err(TransactionError::InvalidTransactionData(format!(
            "invalid delegate username {username:?}"
        )));
    }
    Ok(username)
}

impl TransactionHandler for DelegateRegistrationHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::core(CoreTransactionType::DelegateRegistration, self.version)
    }

    fn wallet_attributes(&self) -> &'static [&'static str] {
        &[
            paths::DELEGATE,
            paths::DELEGATE_USERNAME,
            paths::DELEGATE_VOTE_BALANCE,
            paths::DELEGATE_FORGED_FEES,
            paths::DELEGATE_FORGED_REWARDS,
            paths::DELEGATE_PRODUCED_BLOCKS,
            paths::DELEGATE_LAST_BLOCK,
        ]
    }

    fn default_addon_bytes(&self) -> u64 {
        400_000
    }

    fn check_type_rules(
        &self,
        tx: &Transaction,
        sender: &Wallet,
        ctx: &HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let username = username(tx)?;
        if sender.has_multi_signature() {
            return Err(TransactionError::NotSupportedForMultiSignatureWallet);
        }
        if sender.is_delegate() {
            return Err(TransactionError::WalletIsAlreadyDelegate);
        }
        if ctx.wallets.has_by_username(username) {
            return Err(TransactionError::WalletUsernameAlreadyRegistered(username.to_string()));
        }
        Ok(())
    }

    fn apply_to_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let username = username(tx)?.to_string();
        let address = debit_sender(self, tx, ctx, tx.amount + tx.fee)?;
        let wallet = ctx.wallets.find_by_address(&address);
        wallet.set_attribute(paths::DELEGATE_USERNAME, AttributeValue::String(username))?;
        wallet.set_attribute(paths::DELEGATE_VOTE_BALANCE, AttributeValue::Balance(Balance::ZERO))?;
        wallet.set_attribute(paths::DELEGATE_FORGED_FEES, AttributeValue::Balance(Balance::ZERO))?;
        wallet.set_attribute(paths::DELEGATE_FORGED_REWARDS, AttributeValue::Balance(Balance::ZERO))?;
        wallet.set_attribute(paths::DELEGATE_PRODUCED_BLOCKS, AttributeValue::Integer(0))?;
        ctx.wallets.index(&address);
        Ok(())
    }

    fn revert_for_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let address = credit_sender(tx, ctx, tx.amount + tx.fee)?;
        ctx.wallets.find_by_address(&address).forget_attribute(paths::DELEGATE);
        ctx.wallets.index(&address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{keypair, tx, Fixture};
    use ark_types::{KeyPair, TransactionAsset};

    const HANDLER: DelegateRegistrationHandler = DelegateRegistrationHandler { version: 2 };

    fn register(sender: &KeyPair, name: &str, nonce: u64) -> Transaction {
        tx(CoreTransactionType::DelegateRegistration, sender)
            .nonce(nonce)
            .asset(TransactionAsset::Delegate { username: name.into() })
            .sign(sender)
    }

    #[test]
    fn registration_indexes_username() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        fx.fund(&alice, 100);
        let reg = register(&alice, "alice", 1);

        HANDLER.apply(&reg, &mut fx.ctx()).unwrap();
        let wallet = fx.wallet(&alice);
        assert!(wallet.is_delegate());
        assert_eq!(wallet.username(), Some("alice"));
        assert_eq!(wallet.vote_balance().unwrap(), Balance::ZERO);
        assert!(fx.wallets.has_by_username("alice"));

        HANDLER.revert(&reg, &mut fx.ctx()).unwrap();
        assert!(!fx.wallet(&alice).is_delegate());
        assert!(!fx.wallets.has_by_username("alice"));
    }

    #[test]
    fn taken_username_rejected() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        let bob = keypair(2);
        fx.fund(&alice, 100);
        fx.fund(&bob, 100);
        HANDLER.apply(&register(&alice, "shared", 1), &mut fx.ctx()).unwrap();

        let err = HANDLER.apply(&register(&bob, "shared", 1), &mut fx.ctx()).unwrap_err();
        assert!(matches!(err, TransactionError::WalletUsernameAlreadyRegistered(name) if name == "shared"));
    }

    #[test]
    fn delegate_cannot_register_twice() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        fx.fund(&alice, 100);
        HANDLER.apply(&register(&alice, "alice", 1), &mut fx.ctx()).unwrap();
        let err = HANDLER.apply(&register(&alice, "other", 2), &mut fx.ctx()).unwrap_err();
        assert!(matches!(err, TransactionError::WalletIsAlreadyDelegate));
    }

    #[test]
    fn username_shape_checked() {
        assert!(is_valid_username("genesis_12"));
        assert!(!is_valid_username(""));
        assert!(!is_valid_username("Upper"));
        assert!(!is_valid_username("a_name_that_is_far_too_long"));
    }
}
