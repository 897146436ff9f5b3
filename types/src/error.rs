//! Error type for parsing and validating the shared types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("milestone list is empty")]
    NoMilestones,

    #[error("first milestone must start at height 1, got {0}")]
    FirstMilestoneHeight(u64),

    #[error("milestone at height {height} has zero {field}")]
    ZeroMilestoneValue { height: u64, field: &'static str },
}
