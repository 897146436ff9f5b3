//! Multipayment: one sender, several recipients.

use ark_crypto::validate_address;
use ark_ledger::Wallet;
use ark_types::{Balance, CoreTransactionType, Payment, Transaction};

use crate::handler::{adjust_balance, credit_sender, debit_sender, require};
use crate::{HandlerContext, HandlerKey, TransactionError, TransactionHandler};

const MIN_PAYMENTS: usize = 2;
const MAX_PAYMENTS: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MultiPaymentHandler;

fn payments(tx: &Transaction) -> Result<&[Payment], TransactionError> {
    let payments = require(tx.payments(), "payments")?;
    if !(MIN_PAYMENTS..=MAX_PAYMENTS).contains(&payments.len()) {
        return Err(TransactionError::InvalidTransactionData(format!(
            "expected {MIN_PAYMENTS} to {MAX_PAYMENTS} payments, got {}",
            payments.len()
        )));
    }
    if let Some(bad) = payments.iter().find(|p| !validate_address(p.recipient_id.as_str())) {
        return Err(TransactionError::InvalidTransactionData(format!(
            "invalid recipient address {}",
            bad.recipient_id
        )));
    }
    Ok(payments)
}

impl TransactionHandler for MultiPaymentHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::core(CoreTransactionType::MultiPayment, 2)
    }

    fn default_addon_bytes(&self) -> u64 {
        500
    }

    fn check_type_rules(
        &self,
        tx: &Transaction,
        sender: &Wallet,
        _ctx: &HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        payments(tx)?;
        if (sender.balance - tx.amount - tx.fee - tx.payments_total()).is_negative() {
            return Err(TransactionError::InsufficientBalance);
        }
        Ok(())
    }

    fn apply_to_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        debit_sender(self, tx, ctx, tx.amount + tx.fee + tx.payments_total()).map(|_| ())
    }

    fn revert_for_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        credit_sender(tx, ctx, tx.amount + tx.fee + tx.payments_total()).map(|_| ())
    }

    fn apply_to_recipient(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        for payment in payments(tx)? {
            adjust_balance(ctx.wallets, &payment.recipient_id, Balance::from(payment.amount));
        }
        Ok(())
    }

    fn revert_for_recipient(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        for payment in payments(tx)? {
            adjust_balance(ctx.wallets, &payment.recipient_id, -Balance::from(payment.amount));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{keypair, tx, Fixture};
    use ark_crypto::derive_address;
    use ark_types::{Amount, TransactionAsset};

    fn multipayment(sender: &ark_types::KeyPair, amounts: &[u64]) -> Transaction {
        let payments = amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| Payment {
                amount: Amount::new(*amount),
                recipient_id: derive_address(&keypair(10 + i as u8).public),
            })
            .collect();
        tx(CoreTransactionType::MultiPayment, sender)
            .asset(TransactionAsset::Payments(payments))
            .sign(sender)
    }

    #[test]
    fn pays_every_recipient() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        let alice_address = fx.fund(&alice, 100);
        let pay = multipayment(&alice, &[20, 30]);

        MultiPaymentHandler.apply(&pay, &mut fx.ctx()).unwrap();
        assert_eq!(fx.balance_of(&alice_address), 40);
        assert_eq!(fx.balance_of(&derive_address(&keypair(10).public)), 20);
        assert_eq!(fx.balance_of(&derive_address(&keypair(11).public)), 30);

        MultiPaymentHandler.revert(&pay, &mut fx.ctx()).unwrap();
        assert_eq!(fx.balance_of(&alice_address), 100);
        assert_eq!(fx.balance_of(&derive_address(&keypair(10).public)), 0);
    }

    #[test]
    fn total_must_be_covered() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        fx.fund(&alice, 50);
        let err = MultiPaymentHandler
            .apply(&multipayment(&alice, &[20, 30]), &mut fx.ctx())
            .unwrap_err();
        assert!(matches!(err, TransactionError::InsufficientBalance));
    }

    #[test]
    fn single_payment_rejected() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        fx.fund(&alice, 50);
        let err = MultiPaymentHandler.apply(&multipayment(&alice, &[1]), &mut fx.ctx()).unwrap_err();
        assert!(matches!(err, TransactionError::InvalidTransactionData(_)));
    }
}
