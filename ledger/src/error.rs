use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("wallet index already registered: {0}")]
    IndexAlreadyRegistered(String),

    #[error("wallet index not found: {0}")]
    IndexNotFound(String),

    #[error("wallet attribute already registered: {0}")]
    AttributeAlreadyRegistered(String),

    #[error("unknown wallet attribute: {0}")]
    UnknownAttribute(String),

    #[error("wallet attribute {path} is not a {expected}")]
    AttributeType { path: String, expected: &'static str },

    #[error(
        "cannot {} a transaction with nonce {transaction_nonce}: the sender has nonce {wallet_nonce}",
        action(.reverted)
    )]
    UnexpectedNonce {
        transaction_nonce: u64,
        wallet_nonce: u64,
        reverted: bool,
    },
}

fn action(reverted: &bool) -> &'static str {
    if *reverted {
        "revert"
    } else {
        "apply"
    }
}
