//! Network milestones and exception lists.
//!
//! A milestone is a parameter set that becomes active at a given height and
//! stays active until the next milestone. The first milestone must start at
//! height 1 so every height resolves to exactly one parameter set.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{Amount, BlockId, TransactionId, TypesError};

/// Parameter set active from `height` onwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub height: u64,
    /// Seconds per forging slot.
    pub blocktime: u32,
    pub active_delegates: u32,
    /// Reward paid to the forger of each block.
    pub reward: Amount,
    /// Whether version 2 transactions (nonces, new types) are active.
    pub aip11: bool,
    pub max_transactions: u32,
}

impl Milestone {
    fn validate(&self) -> Result<(), TypesError> {
        if self.blocktime == 0 {
            return Err(TypesError::ZeroMilestoneValue { height: self.height, field: "blocktime" });
        }
        if self.active_delegates == 0 {
            return Err(TypesError::ZeroMilestoneValue {
                height: self.height,
                field: "active_delegates",
            });
        }
        Ok(())
    }
}

/// A non-empty, height-sorted list of milestones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Milestone>", into = "Vec<Milestone>")]
pub struct Milestones(Vec<Milestone>);

impl Milestones {
    pub fn new(mut milestones: Vec<Milestone>) -> Result<Self, TypesError> {
        milestones.sort_by_key(|m| m.height);
        let first = milestones.first().ok_or(TypesError::NoMilestones)?;
        if first.height != 1 {
            return Err(TypesError::FirstMilestoneHeight(first.height));
        }
        for milestone in &milestones {
            milestone.validate()?;
        }
        Ok(Self(milestones))
    }

    /// The milestone active at `height`.
    pub fn at(&self, height: u64) -> &Milestone {
        self.0
            .iter()
            .rev()
            .find(|m| m.height <= height)
            .unwrap_or(&self.0[0])
    }

    /// Heights at which a new milestone activates, ascending.
    pub fn heights(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().map(|m| m.height)
    }

    /// Whether a milestone activates exactly at `height`.
    pub fn is_milestone_height(&self, height: u64) -> bool {
        self.0.iter().any(|m| m.height == height)
    }

    pub fn as_slice(&self) -> &[Milestone] {
        &self.0
    }
}

impl TryFrom<Vec<Milestone>> for Milestones {
    type Error = TypesError;

    fn try_from(value: Vec<Milestone>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Milestones> for Vec<Milestone> {
    fn from(value: Milestones) -> Self {
        value.0
    }
}

impl Default for Milestones {
    fn default() -> Self {
        Self(vec![Milestone {
            height: 1,
            blocktime: 8,
            active_delegates: 51,
            reward: Amount::new(200_000_000),
            aip11: true,
            max_transactions: 150,
        }])
    }
}

/// Blocks and transactions that bypass validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Exceptions {
    pub blocks: HashSet<BlockId>,
    pub transactions: HashSet<TransactionId>,
}

impl Exceptions {
    pub fn is_block_exception(&self, id: &BlockId) -> bool {
        self.blocks.contains(id)
    }

    pub fn is_transaction_exception(&self, id: &TransactionId) -> bool {
        self.transactions.contains(id)
    }
}

/// Static network parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Unix time (seconds) of slot zero.
    pub epoch: u64,
    pub milestones: Milestones,
    #[serde(default)]
    pub exceptions: Exceptions,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            // 2017-03-21T13:00:00Z
            epoch: 1_490_101_200,
            milestones: Milestones::default(),
            exceptions: Exceptions::default(),
        }
    }
}
