//! Transfer: move `amount` from the sender to `recipient_id`.

use ark_crypto::validate_address;
use ark_ledger::Wallet;
use ark_types::{Address, Balance, CoreTransactionType, Transaction};

use crate::handler::adjust_balance;
use crate::{HandlerContext, HandlerKey, TransactionError, TransactionHandler};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferHandler {
    pub version: u8,
}

/// The recipient of a transfer-like transaction, checked for shape.
pub(crate) fn recipient(tx: &Transaction) -> Result<&Address, TransactionError> {
    match &tx.recipient_id {
        Some(address) if validate_address(address.as_str()) => Ok(address),
        Some(address) => Err(TransactionError::InvalidTransactionData(format!(
            "invalid recipient address {address}"
        ))),
        None => Err(TransactionError::InvalidTransactionData("missing recipient".into())),
    }
}

impl TransactionHandler for TransferHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::core(CoreTransactionType::Transfer, self.version)
    }

    fn check_type_rules(
        &self,
        tx: &Transaction,
        _sender: &Wallet,
        _ctx: &HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        recipient(tx).map(|_| ())
    }

    fn apply_to_recipient(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let recipient = recipient(tx)?;
        adjust_balance(ctx.wallets, recipient, Balance::from(tx.amount));
        Ok(())
    }

    fn revert_for_recipient(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let recipient = recipient(tx)?;
        adjust_balance(ctx.wallets, recipient, -Balance::from(tx.amount));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{keypair, tx, Fixture};
    use ark_crypto::derive_address;
    use ark_ledger::LedgerError;
    use proptest::prelude::*;

    const HANDLER: TransferHandler = TransferHandler { version: 2 };

    #[test]
    fn apply_moves_amount_and_fee() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        let bob = derive_address(&keypair(2).public);
        let alice_address = fx.fund(&alice, 100);
        fx.fund(&keypair(2), 50);

        let transfer = tx(CoreTransactionType::Transfer, &alice)
            .amount(50)
            .fee(10)
            .recipient(&bob)
            .sign(&alice);
        HANDLER.apply(&transfer, &mut fx.ctx()).unwrap();

        assert_eq!(fx.balance_of(&alice_address), 40);
        assert_eq!(fx.balance_of(&bob), 100);
        assert_eq!(fx.wallet(&alice).nonce, 1);

        HANDLER.revert(&transfer, &mut fx.ctx()).unwrap();
        assert_eq!(fx.balance_of(&alice_address), 100);
        assert_eq!(fx.balance_of(&bob), 50);
        assert_eq!(fx.wallet(&alice).nonce, 0);
    }

    #[test]
    fn insufficient_balance_rejected_without_changes() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        let alice_address = fx.fund(&alice, 55);
        let transfer = tx(CoreTransactionType::Transfer, &alice)
            .amount(50)
            .fee(10)
            .recipient(&derive_address(&keypair(2).public))
            .sign(&alice);

        let err = HANDLER.apply(&transfer, &mut fx.ctx()).unwrap_err();
        assert!(matches!(err, TransactionError::InsufficientBalance));
        assert_eq!(fx.balance_of(&alice_address), 55);
        assert_eq!(fx.wallet(&alice).nonce, 0);
    }

    #[test]
    fn unexpected_nonce_rejected() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        fx.fund(&alice, 1_000);
        let transfer = tx(CoreTransactionType::Transfer, &alice)
            .nonce(3)
            .amount(1)
            .recipient(&derive_address(&keypair(2).public))
            .sign(&alice);

        let err = HANDLER.apply(&transfer, &mut fx.ctx()).unwrap_err();
        assert!(matches!(
            err,
            TransactionError::Ledger(LedgerError::UnexpectedNonce { transaction_nonce: 3, wallet_nonce: 0, .. })
        ));
    }

    #[test]
    fn invalid_recipient_rejected() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        fx.fund(&alice, 1_000);
        let transfer = tx(CoreTransactionType::Transfer, &alice)
            .amount(1)
            .recipient(&Address::new("ark_nope"))
            .sign(&alice);
        let err = HANDLER.apply(&transfer, &mut fx.ctx()).unwrap_err();
        assert!(matches!(err, TransactionError::InvalidTransactionData(_)));
    }

    #[test]
    fn exception_bypasses_checks() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        let alice_address = fx.fund(&alice, 0);
        let transfer = tx(CoreTransactionType::Transfer, &alice)
            .amount(5)
            .fee(1)
            .recipient(&derive_address(&keypair(2).public))
            .sign(&alice);
        fx.exceptions.transactions.insert(transfer.id);

        HANDLER.apply(&transfer, &mut fx.ctx()).unwrap();
        assert_eq!(fx.balance_of(&alice_address), -6);
    }

    #[test]
    fn unexpected_second_signature_rejected() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        fx.fund(&alice, 1_000);
        let transfer = tx(CoreTransactionType::Transfer, &alice)
            .amount(1)
            .recipient(&derive_address(&keypair(2).public))
            .second_sign(&alice, &keypair(9));
        let err = HANDLER.apply(&transfer, &mut fx.ctx()).unwrap_err();
        assert!(matches!(err, TransactionError::UnexpectedSecondSignature));
    }

    #[test]
    fn v1_transfer_ignores_nonce_but_counts_it() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        fx.fund(&alice, 1_000);
        let transfer = tx(CoreTransactionType::Transfer, &alice)
            .version(1)
            .amount(1)
            .recipient(&derive_address(&keypair(2).public))
            .sign(&alice);
        TransferHandler { version: 1 }.apply(&transfer, &mut fx.ctx()).unwrap();
        assert_eq!(fx.wallet(&alice).nonce, 1);
    }

    proptest! {
        #[test]
        fn revert_restores_balances(start in 0i128..1_000_000, amount in 0u64..1_000, fee in 0u64..100) {
            let mut fx = Fixture::new();
            let alice = keypair(1);
            let bob = derive_address(&keypair(2).public);
            let alice_address = fx.fund(&alice, start);
            let transfer = tx(CoreTransactionType::Transfer, &alice)
                .amount(amount)
                .fee(fee)
                .recipient(&bob)
                .sign(&alice);

            let applied = HANDLER.apply(&transfer, &mut fx.ctx()).is_ok();
            prop_assert_eq!(applied, start >= i128::from(amount + fee));
            if applied {
                HANDLER.revert(&transfer, &mut fx.ctx()).unwrap();
            }
            prop_assert_eq!(fx.balance_of(&alice_address), start);
            prop_assert_eq!(fx.balance_of(&bob), 0);
            prop_assert_eq!(fx.wallet(&alice).nonce, 0);
        }
    }
}
