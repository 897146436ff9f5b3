//! Delegate resignation.

use ark_ledger::{attribute_paths, AttributeValue, Wallet};
use ark_types::{CoreTransactionType, Transaction};

use crate::handler::{credit_sender, debit_sender};
use crate::{HandlerContext, HandlerKey, TransactionError, TransactionHandler};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelegateResignationHandler;

impl TransactionHandler for DelegateResignationHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::core(CoreTransactionType::DelegateResignation, 2)
    }

    fn wallet_attributes(&self) -> &'static [&'static str] {
        &[attribute_paths::DELEGATE_RESIGNED]
    }

    fn default_addon_bytes(&self) -> u64 {
        400_000
    }

    fn check_type_rules(
        &self,
        _tx: &Transaction,
        sender: &Wallet,
        ctx: &HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        if !sender.is_delegate() {
            return Err(TransactionError::WalletNotADelegate);
        }
        if sender.is_resigned_delegate() {
            return Err(TransactionError::WalletAlreadyResigned);
        }
        let active = ctx
            .wallets
            .all_by_username()
            .into_iter()
            .filter(|w| !w.is_resigned_delegate())
            .count();
        if active.saturating_sub(1) < ctx.milestone.active_delegates as usize {
            return Err(TransactionError::NotEnoughDelegates);
        }
        Ok(())
    }

    fn apply_to_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let address = debit_sender(self, tx, ctx, tx.amount + tx.fee)?;
        ctx.wallets
            .find_by_address(&address)
            .set_attribute(attribute_paths::DELEGATE_RESIGNED, AttributeValue::Bool(true))?;
        ctx.wallets.index(&address);
        Ok(())
    }

    fn revert_for_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let address = credit_sender(tx, ctx, tx.amount + tx.fee)?;
        ctx.wallets.find_by_address(&address).forget_attribute(attribute_paths::DELEGATE_RESIGNED);
        ctx.wallets.index(&address);
        Ok(())
    }
}
