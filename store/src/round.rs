//! Active delegate sets per round.

use serde::{Deserialize, Serialize};

use crate::StoreError;
use ark_types::{Balance, PublicKey, RoundInfo};

/// A delegate of a round, as selected by the forging schedule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegate {
    pub public_key: PublicKey,
    pub username: String,
    pub vote_balance: Balance,
}

/// Source of the active delegate set. Delegate selection itself happens
/// outside the node core; this is the persisted result.
pub trait RoundRepository {
    /// Delegates of the round containing `round.round_height`; empty when
    /// the round has not been saved yet.
    fn get_active_delegates(&self, round: &RoundInfo) -> Result<Vec<Delegate>, StoreError>;

    fn save_round(&self, round: u64, delegates: &[Delegate]) -> Result<(), StoreError>;

    fn delete_round(&self, round: u64) -> Result<(), StoreError>;
}
