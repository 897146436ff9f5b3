//! HTLC refund: once a lock has expired, its amount (minus the refund fee)
//! returns to the wallet that locked it.

use ark_ledger::Wallet;
use ark_types::{Amount, Balance, CoreTransactionType, Transaction};

use crate::handler::{adjust_balance, credit_sender, debit_sender, require};
use crate::htlc_lock::{find_lock, remove_lock, restore_lock};
use crate::{FeeContext, HandlerContext, HandlerKey, TransactionError, TransactionHandler};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HtlcRefundHandler;

impl TransactionHandler for HtlcRefundHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::core(CoreTransactionType::HtlcRefund, 2)
    }

    fn dependencies(&self) -> Vec<HandlerKey> {
        vec![HandlerKey::core(CoreTransactionType::HtlcLock, 2)]
    }

    fn default_addon_bytes(&self) -> u64 {
        0
    }

    fn dynamic_fee(&self, _ctx: &FeeContext<'_>) -> Result<Amount, TransactionError> {
        Ok(Amount::ZERO)
    }

    fn checks_sender_balance(&self) -> bool {
        false
    }

    fn check_type_rules(
        &self,
        tx: &Transaction,
        _sender: &Wallet,
        ctx: &HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let refund = require(tx.refund_asset(), "refund")?;
        let (_, lock) = find_lock(&*ctx.wallets, &refund.lock_transaction_id)?;
        if !lock.expiration.is_expired(ctx.tip.height, ctx.tip.timestamp) {
            return Err(TransactionError::HtlcLockNotExpired);
        }
        Ok(())
    }

    fn apply_to_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let refund = require(tx.refund_asset(), "refund")?;
        debit_sender(self, tx, ctx, Amount::ZERO)?;

        let lock_address = find_lock(&*ctx.wallets, &refund.lock_transaction_id)?.0.address().clone();
        let lock = remove_lock(ctx.wallets, &lock_address, &refund.lock_transaction_id)?;
        adjust_balance(ctx.wallets, &lock_address, Balance::from(lock.amount) - tx.fee);
        Ok(())
    }

    fn revert_for_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let refund = require(tx.refund_asset(), "refund")?;
        credit_sender(tx, ctx, Amount::ZERO)?;

        let (lock_address, lock) = restore_lock(ctx, &refund.lock_transaction_id)?;
        adjust_balance(ctx.wallets, &lock_address, -(Balance::from(lock.amount) - tx.fee));
        Ok(())
    }
}
