//! Multi-signature wallet registration.
//!
//! The registered wallet is addressed by the aggregate key of `min` and the
//! participant keys. Every participant signs the registration, the sender
//! pays for it.

use ark_crypto::{multi_signature_public_key, verify_multi_signatures, verify_transaction_signature};
use ark_ledger::{attribute_paths, index_names, AttributeValue, Wallet, WalletRepository};
use ark_types::{
    CoreTransactionType, Milestone, MultiSignatureAsset, Transaction, TransactionAsset,
};

use crate::handler::{credit_sender, debit_sender, require};
use crate::{HandlerContext, HandlerKey, TransactionError, TransactionHandler};

const MAX_PARTICIPANTS: usize = 16;

/// Version 1 registration. Only exceptions may still apply one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LegacyMultiSignatureHandler;

fn legacy_asset(tx: &Transaction) -> Result<MultiSignatureAsset, TransactionError> {
    match &tx.asset {
        Some(TransactionAsset::LegacyMultiSignature { min, keysgroup, .. }) => {
            Ok(MultiSignatureAsset { min: *min, public_keys: keysgroup.clone() })
        }
        _ => Err(TransactionError::InvalidTransactionData("missing multi-signature asset".into())),
    }
}

impl TransactionHandler for LegacyMultiSignatureHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::core(CoreTransactionType::MultiSignature, 1)
    }

    fn wallet_attributes(&self) -> &'static [&'static str] {
        &[attribute_paths::MULTI_SIGNATURE, attribute_paths::MULTI_SIGNATURE_LEGACY]
    }

    fn is_activated(&self, milestone: &Milestone) -> bool {
        !milestone.aip11
    }

    fn default_addon_bytes(&self) -> u64 {
        500
    }

    fn accepts_participant_signatures(&self) -> bool {
        true
    }

    fn check_type_rules(
        &self,
        _tx: &Transaction,
        _sender: &Wallet,
        _ctx: &HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        Err(TransactionError::LegacyMultiSignatureRegistration)
    }

    fn apply_to_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let asset = legacy_asset(tx)?;
        let address = debit_sender(self, tx, ctx, tx.amount + tx.fee)?;
        let wallet = ctx.wallets.find_by_address(&address);
        wallet.set_attribute(attribute_paths::MULTI_SIGNATURE, AttributeValue::MultiSignature(asset))?;
        wallet.set_attribute(attribute_paths::MULTI_SIGNATURE_LEGACY, AttributeValue::Bool(true))?;
        Ok(())
    }

    fn revert_for_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let address = credit_sender(tx, ctx, tx.amount + tx.fee)?;
        ctx.wallets.find_by_address(&address).forget_attribute(attribute_paths::MULTI_SIGNATURE);
        Ok(())
    }
}

/// Version 2 registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MultiSignatureHandler;

fn asset(tx: &Transaction) -> Result<&MultiSignatureAsset, TransactionError> {
    require(tx.multi_signature_asset(), "multi-signature")
}

impl TransactionHandler for MultiSignatureHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::core(CoreTransactionType::MultiSignature, 2)
    }

    fn wallet_attributes(&self) -> &'static [&'static str] {
        &[attribute_paths::MULTI_SIGNATURE]
    }

    fn default_addon_bytes(&self) -> u64 {
        500
    }

    fn accepts_participant_signatures(&self) -> bool {
        true
    }

    /// The sender signature plus one signature per participant.
    fn verify(&self, tx: &Transaction, _wallets: &WalletRepository) -> bool {
        let Ok(asset) = asset(tx) else {
            return false;
        };
        verify_transaction_signature(tx, &tx.sender_public_key)
            && u8::try_from(asset.public_keys.len())
                .is_ok_and(|all| verify_multi_signatures(tx, &asset.public_keys, all))
    }

    fn check_type_rules(
        &self,
        tx: &Transaction,
        _sender: &Wallet,
        ctx: &HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let asset = asset(tx)?;
        let keys = asset.public_keys.len();
        if asset.min < 1 || usize::from(asset.min) > keys || keys > MAX_PARTICIPANTS {
            return Err(TransactionError::MultiSignatureMinimumKeys { min: asset.min });
        }
        if keys != tx.signatures.len() {
            return Err(TransactionError::MultiSignatureKeyCountMismatch {
                keys,
                signatures: tx.signatures.len(),
            });
        }
        let aggregate = multi_signature_public_key(asset.min, &asset.public_keys);
        let registered = ctx
            .wallets
            .find_by_index(index_names::PUBLIC_KEYS, &aggregate.to_hex())?
            .is_some_and(Wallet::has_multi_signature);
        if registered {
            return Err(TransactionError::MultiSignatureAlreadyRegistered);
        }
        if !verify_multi_signatures(tx, &asset.public_keys, keys as u8) {
            return Err(TransactionError::InvalidMultiSignature);
        }
        Ok(())
    }

    fn apply_to_recipient(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let asset = asset(tx)?;
        let aggregate = multi_signature_public_key(asset.min, &asset.public_keys);
        let wallet = ctx.wallets.find_by_public_key(&aggregate);
        wallet.set_attribute(
            attribute_paths::MULTI_SIGNATURE,
            AttributeValue::MultiSignature(asset.clone()),
        )?;
        let address = wallet.address().clone();
        ctx.wallets.index(&address);
        Ok(())
    }

    fn revert_for_recipient(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let asset = asset(tx)?;
        let aggregate = multi_signature_public_key(asset.min, &asset.public_keys);
        let wallet = ctx.wallets.find_by_public_key(&aggregate);
        wallet.forget_attribute(attribute_paths::MULTI_SIGNATURE);
        let address = wallet.address().clone();
        ctx.wallets.index(&address);
        Ok(())
    }
}
