//! HTLC claim: reveal the secret before expiry and release the locked amount
//! to the lock's recipient. The fee comes out of the locked amount.

use ark_crypto::sha256_hex;
use ark_ledger::Wallet;
use ark_types::{Amount, Balance, CoreTransactionType, Transaction};

use crate::handler::{adjust_balance, credit_sender, debit_sender, require};
use crate::htlc_lock::{find_lock, remove_lock, restore_lock};
use crate::{FeeContext, HandlerContext, HandlerKey, TransactionError, TransactionHandler};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HtlcClaimHandler;

impl TransactionHandler for HtlcClaimHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::core(CoreTransactionType::HtlcClaim, 2)
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
        let claim = require(tx.claim_asset(), "claim")?;
        let (_, lock) = find_lock(&*ctx.wallets, &claim.lock_transaction_id)?;
        if lock.expiration.is_expired(ctx.tip.height, ctx.tip.timestamp) {
            return Err(TransactionError::HtlcLockExpired);
        }
        if sha256_hex(claim.unlock_secret.as_bytes()) != lock.secret_hash {
            return Err(TransactionError::HtlcSecretHashMismatch);
        }
        Ok(())
    }

    fn apply_to_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let claim = require(tx.claim_asset(), "claim")?;
        debit_sender(self, tx, ctx, Amount::ZERO)?;

        let lock_address = find_lock(&*ctx.wallets, &claim.lock_transaction_id)?.0.address().clone();
        let lock = remove_lock(ctx.wallets, &lock_address, &claim.lock_transaction_id)?;
        adjust_balance(ctx.wallets, &lock.recipient_id, Balance::from(lock.amount) - tx.fee);
        Ok(())
    }

    fn revert_for_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let claim = require(tx.claim_asset(), "claim")?;
        credit_sender(tx, ctx, Amount::ZERO)?;

        let (_, lock) = restore_lock(ctx, &claim.lock_transaction_id)?;
        adjust_balance(ctx.wallets, &lock.recipient_id, -(Balance::from(lock.amount) - tx.fee));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::htlc_lock::tests::{lock_tx, SECRET};
    use crate::htlc_lock::HtlcLockHandler;
    use crate::test_support::{keypair, tx, Fixture};
    use ark_crypto::derive_address;
    use ark_types::{HtlcClaimAsset, HtlcExpiration, KeyPair, TransactionAsset, TransactionId};

    fn claim(sender: &KeyPair, lock_id: TransactionId, secret: &str) -> Transaction {
        tx(CoreTransactionType::HtlcClaim, sender)
            .fee(0)
            .asset(TransactionAsset::Claim(HtlcClaimAsset {
                lock_transaction_id: lock_id,
                unlock_secret: secret.into(),
            }))
            .sign(sender)
    }

    #[test]
    fn claim_pays_recipient_and_reverts() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        let bob = keypair(2);
        let bob_address = derive_address(&bob.public);
        fx.fund(&alice, 100);
        let lock = lock_tx(&alice, &bob, 60, HtlcExpiration::BlockHeight(100));
        HtlcLockHandler.apply(&lock, &mut fx.ctx()).unwrap();
        fx.transactions.0.insert(lock.id, lock.clone());

        let mut claim_tx = claim(&bob, lock.id, SECRET);
        claim_tx.fee = Amount::new(5);
        ark_crypto::sign_transaction(&mut claim_tx, &bob.private).unwrap();

        HtlcClaimHandler.apply(&claim_tx, &mut fx.ctx()).unwrap();
        assert_eq!(fx.balance_of(&bob_address), 55);
        assert!(fx.wallet(&alice).locked_balance().unwrap().is_zero());
        assert_eq!(fx.wallet(&bob).nonce, 1);

        HtlcClaimHandler.revert(&claim_tx, &mut fx.ctx()).unwrap();
        assert_eq!(fx.balance_of(&bob_address), 0);
        assert_eq!(fx.wallet(&alice).locked_balance().unwrap(), Balance::new(60));
        assert!(find_lock(&fx.wallets, &lock.id).is_ok());
    }

    #[test]
    fn wrong_secret_rejected() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        let bob = keypair(2);
        fx.fund(&alice, 100);
        let lock = lock_tx(&alice, &bob, 60, HtlcExpiration::BlockHeight(100));
        HtlcLockHandler.apply(&lock, &mut fx.ctx()).unwrap();

        let err = HtlcClaimHandler.apply(&claim(&bob, lock.id, "nope"), &mut fx.ctx()).unwrap_err();
        assert!(matches!(err, TransactionError::HtlcSecretHashMismatch));
    }

    #[test]
    fn expired_or_missing_lock_rejected() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        let bob = keypair(2);
        fx.fund(&alice, 100);
        let lock = lock_tx(&alice, &bob, 60, HtlcExpiration::BlockHeight(20));
        HtlcLockHandler.apply(&lock, &mut fx.ctx()).unwrap();

        fx.tip.height = 20;
        let err = HtlcClaimHandler.apply(&claim(&bob, lock.id, SECRET), &mut fx.ctx()).unwrap_err();
        assert!(matches!(err, TransactionError::HtlcLockExpired));

        let err = HtlcClaimHandler
            .apply(&claim(&bob, TransactionId::new([7; 32]), SECRET), &mut fx.ctx())
            .unwrap_err();
        assert!(matches!(err, TransactionError::HtlcLockTransactionNotFound));
    }

    #[test]
    fn claim_is_free() {
        let alice = keypair(1);
        let claim_tx = claim(&alice, TransactionId::new([1; 32]), SECRET);
        let fee = HtlcClaimHandler
            .dynamic_fee(&FeeContext { transaction: &claim_tx, addon_bytes: 100, satoshi_per_byte: 3 })
            .unwrap();
        assert_eq!(fee, Amount::ZERO);
    }
}
