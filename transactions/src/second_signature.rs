//! Second signature registration.

use ark_ledger::{attribute_paths, AttributeValue, Wallet};
use ark_types::{CoreTransactionType, Transaction};

use crate::handler::{credit_sender, debit_sender, require};
use crate::{HandlerContext, HandlerKey, TransactionError, TransactionHandler};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecondSignatureHandler {
    pub version: u8,
}

impl TransactionHandler for SecondSignatureHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::core(CoreTransactionType::SecondSignature, self.version)
    }

    fn wallet_attributes(&self) -> &'static [&'static str] {
        &[attribute_paths::SECOND_PUBLIC_KEY]
    }

    fn default_addon_bytes(&self) -> u64 {
        250
    }

    fn check_type_rules(
        &self,
        tx: &Transaction,
        sender: &Wallet,
        _ctx: &HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        require(tx.second_signature_public_key(), "second signature")?;
        if sender.has_second_signature() {
            return Err(TransactionError::SecondSignatureAlreadyRegistered);
        }
        if sender.has_multi_signature() {
            return Err(TransactionError::NotSupportedForMultiSignatureWallet);
        }
        Ok(())
    }

    fn apply_to_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let public_key = *require(tx.second_signature_public_key(), "second signature")?;
        let address = debit_sender(self, tx, ctx, tx.amount + tx.fee)?;
        ctx.wallets
            .find_by_address(&address)
            .set_attribute(attribute_paths::SECOND_PUBLIC_KEY, AttributeValue::PublicKey(public_key))?;
        Ok(())
    }

    fn revert_for_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let address = credit_sender(tx, ctx, tx.amount + tx.fee)?;
        ctx.wallets.find_by_address(&address).forget_attribute(attribute_paths::SECOND_PUBLIC_KEY);
        Ok(())
    }
}
