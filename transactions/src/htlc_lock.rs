//! HTLC lock: funds leave the sender's spendable balance and wait for a
//! claim (with the secret, before expiry) or a refund (after expiry).
//!
//! The lock lives on the sender wallet under `htlc.locks`, keyed by the lock
//! transaction id, and the `locks` index maps that id back to the wallet.

use ark_ledger::{attribute_paths, index_names, HtlcLock, Wallet, WalletRepository};
use ark_types::{Address, Balance, CoreTransactionType, Transaction, TransactionId};

use crate::handler::{credit_sender, debit_sender, require};
use crate::transfer::recipient;
use crate::{HandlerContext, HandlerKey, TransactionError, TransactionHandler};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HtlcLockHandler;

/// The wallet state a lock transaction creates.
pub(crate) fn lock_from_transaction(tx: &Transaction) -> Result<HtlcLock, TransactionError> {
    let asset = require(tx.lock_asset(), "lock")?;
    Ok(HtlcLock {
        amount: tx.amount,
        recipient_id: recipient(tx)?.clone(),
        timestamp: tx.timestamp.unwrap_or_default(),
        vendor_field: tx.vendor_field.clone(),
        secret_hash: asset.secret_hash.clone(),
        expiration: asset.expiration,
    })
}

/// The open lock `id` and the address of the wallet holding it.
pub(crate) fn find_lock<'w>(
    wallets: &'w WalletRepository,
    id: &TransactionId,
) -> Result<(&'w Wallet, &'w HtlcLock), TransactionError> {
    wallets
        .find_by_index(index_names::LOCKS, &id.to_hex())?
        .and_then(|wallet| wallet.locks()?.get(id).map(|lock| (wallet, lock)))
        .ok_or(TransactionError::HtlcLockTransactionNotFound)
}

/// Add `lock` under `id` to the wallet at `address`.
pub(crate) fn insert_lock(
    wallets: &mut WalletRepository,
    address: &Address,
    id: TransactionId,
    lock: HtlcLock,
) -> Result<(), TransactionError> {
    let wallet = wallets.find_by_address(address);
    wallet.add_to_balance_attribute(attribute_paths::HTLC_LOCKED_BALANCE, Balance::from(lock.amount))?;
    wallet.locks_mut()?.insert(id, lock);
    wallets.index(address);
    Ok(())
}

/// Remove the lock `id` from the wallet at `address`, dropping the lock
/// attributes once nothing is locked any more.
pub(crate) fn remove_lock(
    wallets: &mut WalletRepository,
    address: &Address,
    id: &TransactionId,
) -> Result<HtlcLock, TransactionError> {
    let wallet = wallets.find_by_address(address);
    let lock = wallet.locks_mut()?.remove(id).ok_or(TransactionError::HtlcLockTransactionNotFound)?;
    let locked = wallet.locked_balance()? - lock.amount;
    if locked.is_zero() {
        wallet.forget_attribute(attribute_paths::HTLC_LOCKED_BALANCE);
    } else {
        wallet.set_attribute(
            attribute_paths::HTLC_LOCKED_BALANCE,
            ark_ledger::AttributeValue::Balance(locked),
        )?;
    }
    if wallet.locks().is_some_and(|locks| locks.is_empty()) {
        wallet.forget_attribute(attribute_paths::HTLC_LOCKS);
    }
    wallets.index(address);
    Ok(lock)
}

/// Rebuild a claimed or refunded lock from its persisted transaction.
pub(crate) fn restore_lock(
    ctx: &mut HandlerContext<'_>,
    id: &TransactionId,
) -> Result<(Address, HtlcLock), TransactionError> {
    let lock_tx = ctx
        .transactions
        .find_transaction_by_id(id)?
        .ok_or(TransactionError::HtlcLockTransactionNotFound)?;
    let lock = lock_from_transaction(&lock_tx)?;
    let address = ctx.wallets.find_by_public_key(&lock_tx.sender_public_key).address().clone();
    insert_lock(ctx.wallets, &address, lock_tx.id, lock.clone())?;
    Ok((address, lock))
}

impl TransactionHandler for HtlcLockHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::core(CoreTransactionType::HtlcLock, 2)
    }

    fn wallet_attributes(&self) -> &'static [&'static str] {
        &[attribute_paths::HTLC, attribute_paths::HTLC_LOCKS, attribute_paths::HTLC_LOCKED_BALANCE]
    }

    fn check_type_rules(
        &self,
        tx: &Transaction,
        _sender: &Wallet,
        ctx: &HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let lock = lock_from_transaction(tx)?;
        let well_formed = lock.secret_hash.len() == 64
            && lock.secret_hash.bytes().all(|b| b.is_ascii_hexdigit());
        if !well_formed {
            return Err(TransactionError::InvalidTransactionData("invalid HTLC secret hash".into()));
        }
        if lock.expiration.is_expired(ctx.tip.height, ctx.tip.timestamp) {
            return Err(TransactionError::HtlcLockExpired);
        }
        Ok(())
    }

    fn apply_to_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let lock = lock_from_transaction(tx)?;
        let address = debit_sender(self, tx, ctx, tx.amount + tx.fee)?;
        insert_lock(ctx.wallets, &address, tx.id, lock)
    }

    fn revert_for_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let address = credit_sender(tx, ctx, tx.amount + tx.fee)?;
        remove_lock(ctx.wallets, &address, &tx.id).map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::test_support::{keypair, tx, Fixture};
    use ark_crypto::{derive_address, sha256_hex};
    use ark_types::{HtlcExpiration, HtlcLockAsset, KeyPair, TransactionAsset};

    pub const SECRET: &str = "my secret that should be 32bytes";

    pub fn lock_tx(sender: &KeyPair, recipient: &KeyPair, amount: u64, expiration: HtlcExpiration) -> Transaction {
        tx(CoreTransactionType::HtlcLock, sender)
            .amount(amount)
            .recipient(&derive_address(&recipient.public))
            .asset(TransactionAsset::Lock(HtlcLockAsset {
                secret_hash: sha256_hex(SECRET.as_bytes()),
                expiration,
            }))
            .sign(sender)
    }

    #[test]
    fn lock_moves_funds_into_locked_balance() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        let bob = keypair(2);
        let alice_address = fx.fund(&alice, 100);
        let lock = lock_tx(&alice, &bob, 60, HtlcExpiration::BlockHeight(100));

        HtlcLockHandler.apply(&lock, &mut fx.ctx()).unwrap();
        let wallet = fx.wallet(&alice);
        assert_eq!(wallet.balance.raw(), 30);
        assert_eq!(wallet.locked_balance().unwrap(), Balance::new(60));
        assert_eq!(find_lock(&fx.wallets, &lock.id).unwrap().0.address(), &alice_address);
        // The recipient is not credited until the claim.
        assert_eq!(fx.balance_of(&derive_address(&bob.public)), 0);

        HtlcLockHandler.revert(&lock, &mut fx.ctx()).unwrap();
        let wallet = fx.wallet(&alice);
        assert_eq!(wallet.balance.raw(), 100);
        assert!(!wallet.has_attribute(attribute_paths::HTLC));
        assert!(find_lock(&fx.wallets, &lock.id).is_err());
    }

    #[test]
    fn expired_lock_rejected() {
        let mut fx = Fixture::new();
        let alice = keypair(1);
        fx.fund(&alice, 100);
        let lock = lock_tx(&alice, &keypair(2), 10, HtlcExpiration::BlockHeight(fx.tip.height));
        let err = HtlcLockHandler.apply(&lock, &mut fx.ctx()).unwrap_err();
        assert!(matches!(err, TransactionError::HtlcLockExpired));

        let lock = lock_tx(&alice, &keypair(2), 10, HtlcExpiration::EpochTimestamp(fx.tip.timestamp - 1));
        let err = HtlcLockHandler.apply(&lock, &mut fx.ctx()).unwrap_err();
        assert!(matches!(err, TransactionError::HtlcLockExpired));
    }
}
