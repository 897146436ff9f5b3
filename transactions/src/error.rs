use ark_crypto::CryptoError;
use ark_ledger::LedgerError;
use ark_store::StoreError;
use thiserror::Error;

use crate::HandlerKey;

#[derive(Debug, Error)]
pub enum TransactionError {
    // ── Registry ────────────────────────────────────────────────────────
    #[error("no handler registered for transaction type {0}")]
    InvalidTransactionType(HandlerKey),

    #[error("transaction handler {0} is not activated at this height")]
    DeactivatedTransactionHandler(HandlerKey),

    #[error("transaction handler {0} is already registered")]
    DuplicateHandler(HandlerKey),

    #[error("transaction handler {handler} depends on unregistered handler {dependency}")]
    MissingDependency { handler: HandlerKey, dependency: HandlerKey },

    // ── Generic wallet checks ───────────────────────────────────────────
    #[error("sender public key does not match the wallet")]
    SenderWalletMismatch,

    #[error("failed to verify second signature")]
    InvalidSecondSignature,

    #[error("wallet has no second signature registered but the transaction carries one")]
    UnexpectedSecondSignature,

    #[error("failed to verify multi-signatures")]
    InvalidMultiSignature,

    #[error("wallet has a legacy multi-signature, which can no longer sign")]
    LegacyMultiSignature,

    #[error("wallet has no multi-signature registered but the transaction carries participant signatures")]
    UnsupportedMultiSignatureTransaction,

    #[error("insufficient balance in the wallet")]
    InsufficientBalance,

    #[error("invalid transaction data: {0}")]
    InvalidTransactionData(String),

    // ── Type specific ───────────────────────────────────────────────────
    #[error("wallet already has a second signature registered")]
    SecondSignatureAlreadyRegistered,

    #[error("this transaction type is not supported for multi-signature wallets")]
    NotSupportedForMultiSignatureWallet,

    #[error("wallet is already a delegate")]
    WalletIsAlreadyDelegate,

    #[error("delegate username {0} is already registered")]
    WalletUsernameAlreadyRegistered(String),

    #[error("wallet has already voted")]
    AlreadyVoted,

    #[error("wallet has not voted")]
    NoVote,

    #[error("wallet voted for a different delegate")]
    UnvoteMismatch,

    #[error("vote for {0}, which is not a delegate")]
    VotedForNonDelegate(String),

    #[error("vote for {0}, which is a resigned delegate")]
    VotedForResignedDelegate(String),

    #[error("wallet is not a delegate")]
    WalletNotADelegate,

    #[error("wallet has already resigned as delegate")]
    WalletAlreadyResigned,

    #[error("not enough delegates left to allow another resignation")]
    NotEnoughDelegates,

    #[error("legacy multi-signature registration is no longer supported")]
    LegacyMultiSignatureRegistration,

    #[error("multi-signature wallet is already registered")]
    MultiSignatureAlreadyRegistered,

    #[error("multi-signature registration needs at least {min} keys")]
    MultiSignatureMinimumKeys { min: u8 },

    #[error("multi-signature registration has {keys} keys but {signatures} signatures")]
    MultiSignatureKeyCountMismatch { keys: usize, signatures: usize },

    #[error("IPFS hash {0} is already registered")]
    IpfsHashAlreadyExists(String),

    #[error("HTLC lock transaction not found")]
    HtlcLockTransactionNotFound,

    #[error("HTLC lock has expired")]
    HtlcLockExpired,

    #[error("HTLC lock has not expired yet")]
    HtlcLockNotExpired,

    #[error("HTLC unlock secret does not match the lock's secret hash")]
    HtlcSecretHashMismatch,

    // ── Wrapped ─────────────────────────────────────────────────────────
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),
}
