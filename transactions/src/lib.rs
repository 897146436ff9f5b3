//! Transaction handlers and their registry.
//!
//! Handlers of the core type group:
//! - **Transfer** (v1, v2): move an amount to a recipient
//! - **SecondSignature** (v1, v2): register a second signing key
//! - **DelegateRegistration** (v1, v2): become a delegate under a username
//! - **Vote** (v1, v2): vote or unvote a delegate
//! - **MultiSignature** (legacy v1, v2): register a multi-signature wallet
//! - **Ipfs** (v2): record an IPFS hash
//! - **MultiPayment** (v2): pay several recipients at once
//! - **DelegateResignation** (v2): stop being a forging candidate
//! - **HtlcLock / HtlcClaim / HtlcRefund** (v2): hashed time-locked transfers

pub mod delegate_registration;
pub mod delegate_resignation;
pub mod error;
pub mod handler;
pub mod htlc_claim;
pub mod htlc_lock;
pub mod htlc_refund;
pub mod ipfs;
pub mod multi_payment;
pub mod multi_signature;
pub mod registry;
pub mod second_signature;
pub mod transfer;
pub mod vote;

use ark_ledger::{Wallet, WalletRepository};
use ark_types::{Amount, Milestone, Transaction};

pub use error::TransactionError;
pub use handler::{
    ChainTip, FeeContext, HandlerContext, HandlerKey, TransactionHandler,
};
pub use registry::TransactionHandlerRegistry;

use delegate_registration::DelegateRegistrationHandler;
use delegate_resignation::DelegateResignationHandler;
use htlc_claim::HtlcClaimHandler;
use htlc_lock::HtlcLockHandler;
use htlc_refund::HtlcRefundHandler;
use ipfs::IpfsHandler;
use multi_payment::MultiPaymentHandler;
use multi_signature::{LegacyMultiSignatureHandler, MultiSignatureHandler};
use second_signature::SecondSignatureHandler;
use transfer::TransferHandler;
use vote::VoteHandler;

/// The closed set of handlers the registry can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handler {
    Transfer(TransferHandler),
    SecondSignature(SecondSignatureHandler),
    DelegateRegistration(DelegateRegistrationHandler),
    Vote(VoteHandler),
    LegacyMultiSignature(LegacyMultiSignatureHandler),
    MultiSignature(MultiSignatureHandler),
    Ipfs(IpfsHandler),
    MultiPayment(MultiPaymentHandler),
    DelegateResignation(DelegateResignationHandler),
    HtlcLock(HtlcLockHandler),
    HtlcClaim(HtlcClaimHandler),
    HtlcRefund(HtlcRefundHandler),
}

impl Handler {
    /// Every core handler, dependencies before dependants.
    pub fn core_handlers() -> Vec<Handler> {
        vec![
            Self::Transfer(TransferHandler { version: 1 }),
            Self::Transfer(TransferHandler { version: 2 }),
            Self::SecondSignature(SecondSignatureHandler { version: 1 }),
            Self::SecondSignature(SecondSignatureHandler { version: 2 }),
            Self::DelegateRegistration(DelegateRegistrationHandler { version: 1 }),
            Self::DelegateRegistration(DelegateRegistrationHandler { version: 2 }),
            Self::Vote(VoteHandler { version: 1 }),
            Self::Vote(VoteHandler { version: 2 }),
            Self::LegacyMultiSignature(LegacyMultiSignatureHandler),
            Self::MultiSignature(MultiSignatureHandler),
            Self::Ipfs(IpfsHandler),
            Self::MultiPayment(MultiPaymentHandler),
            Self::DelegateResignation(DelegateResignationHandler),
            Self::HtlcLock(HtlcLockHandler),
            Self::HtlcClaim(HtlcClaimHandler),
            Self::HtlcRefund(HtlcRefundHandler),
        ]
    }

    fn inner(&self) -> &dyn TransactionHandler {
        match self {
            Self::Transfer(h) => h,
            Self::SecondSignature(h) => h,
            Self::DelegateRegistration(h) => h,
            Self::Vote(h) => h,
            Self::LegacyMultiSignature(h) => h,
            Self::MultiSignature(h) => h,
            Self::Ipfs(h) => h,
            Self::MultiPayment(h) => h,
            Self::DelegateResignation(h) => h,
            Self::HtlcLock(h) => h,
            Self::HtlcClaim(h) => h,
            Self::HtlcRefund(h) => h,
        }
    }
}

impl TransactionHandler for Handler {
    fn key(&self) -> HandlerKey {
        self.inner().key()
    }

    fn wallet_attributes(&self) -> &'static [&'static str] {
        self.inner().wallet_attributes()
    }

    fn dependencies(&self) -> Vec<HandlerKey> {
        self.inner().dependencies()
    }

    fn is_activated(&self, milestone: &Milestone) -> bool {
        self.inner().is_activated(milestone)
    }

    fn default_addon_bytes(&self) -> u64 {
        self.inner().default_addon_bytes()
    }

    fn dynamic_fee(&self, ctx: &FeeContext<'_>) -> Result<Amount, TransactionError> {
        self.inner().dynamic_fee(ctx)
    }

    fn verify(&self, tx: &Transaction, wallets: &WalletRepository) -> bool {
        self.inner().verify(tx, wallets)
    }

    fn accepts_participant_signatures(&self) -> bool {
        self.inner().accepts_participant_signatures()
    }

    fn checks_sender_balance(&self) -> bool {
        self.inner().checks_sender_balance()
    }

    fn check_type_rules(
        &self,
        tx: &Transaction,
        sender: &Wallet,
        ctx: &HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        self.inner().check_type_rules(tx, sender, ctx)
    }

    fn throw_if_cannot_be_applied(
        &self,
        tx: &Transaction,
        sender: &Wallet,
        ctx: &HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        self.inner().throw_if_cannot_be_applied(tx, sender, ctx)
    }

    fn apply(&self, tx: &Transaction, ctx: &mut HandlerContext<'_>) -> Result<(), TransactionError> {
        self.inner().apply(tx, ctx)
    }

    fn revert(&self, tx: &Transaction, ctx: &mut HandlerContext<'_>) -> Result<(), TransactionError> {
        self.inner().revert(tx, ctx)
    }

    fn apply_to_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        self.inner().apply_to_sender(tx, ctx)
    }

    fn revert_for_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        self.inner().revert_for_sender(tx, ctx)
    }

    fn apply_to_recipient(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        self.inner().apply_to_recipient(tx, ctx)
    }

    fn revert_for_recipient(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        self.inner().revert_for_recipient(tx, ctx)
    }
}
