use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] ark_ledger::LedgerError),

    #[error("transaction error: {0}")]
    Transaction(#[from] ark_transactions::TransactionError),

    #[error("store error: {0}")]
    Store(#[from] ark_store::StoreError),

    #[error("types error: {0}")]
    Types(#[from] ark_types::TypesError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("persisted genesis block {found} does not match the configured genesis block {expected}")]
    GenesisMismatch { expected: String, found: String },

    #[error("blockchain not initialized")]
    NotInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
