//! Delegate round arithmetic.
//!
//! A round is a run of `active_delegates` consecutive blocks, one slot per
//! active delegate. Rounds are recomputed across milestone boundaries, so a
//! change of the delegate count takes effect at the first round starting
//! after the milestone height.

use crate::Milestones;

/// Position of a height within the delegate round schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundInfo {
    pub round: u64,
    /// Height of the first block of the round.
    pub round_height: u64,
    /// `round + 1` when the height closes its round, otherwise `round`.
    pub next_round: u64,
    pub max_delegates: u32,
}

impl RoundInfo {
    /// Whether `height` is the last block of this round.
    pub fn is_last_block(&self, height: u64) -> bool {
        height == self.round_height + u64::from(self.max_delegates) - 1
    }
}

/// Compute the round containing `height`.
///
/// Each milestone that changes the delegate count closes the rounds of the
/// previous span; a span that is not a whole number of rounds counts its
/// trailing partial round as complete.
pub fn calculate_round(height: u64, milestones: &Milestones) -> RoundInfo {
    let height = height.max(1);
    let mut round = 1u64;
    let mut round_height = 1u64;
    let mut span_start = 1u64;
    let mut active = u64::from(milestones.at(1).active_delegates);

    for milestone in milestones.as_slice().iter().skip(1) {
        if milestone.height > height {
            break;
        }
        let delegates = u64::from(milestone.active_delegates);
        if delegates == active {
            continue;
        }
        let span = milestone.height - span_start;
        round += span.div_ceil(active);
        round_height = milestone.height;
        span_start = milestone.height;
        active = delegates;
    }

    let increase = (height - span_start) / active;
    round += increase;
    round_height += increase * active;
    let closes_round = (height - span_start + 1) % active == 0;

    RoundInfo {
        round,
        round_height,
        next_round: if closes_round { round + 1 } else { round },
        max_delegates: active as u32,
    }
}
