//! Forging slot arithmetic.
//!
//! Network time is counted in seconds since the network epoch. Each slot lasts
//! `blocktime` seconds of the milestone active at the given height.

use crate::Milestones;

#[derive(Clone, Debug)]
pub struct Slots {
    /// Unix time (seconds) of slot zero.
    epoch: u64,
    milestones: Milestones,
}

impl Slots {
    pub fn new(epoch: u64, milestones: Milestones) -> Self {
        Self { epoch, milestones }
    }

    fn epoch_millis(&self) -> u64 {
        self.epoch.saturating_mul(1000)
    }

    fn blocktime(&self, height: u64) -> u64 {
        u64::from(self.milestones.at(height).blocktime)
    }

    /// Network time (epoch seconds) at the given unix time in milliseconds.
    pub fn time(&self, unix_millis: u64) -> u32 {
        let secs = unix_millis.saturating_sub(self.epoch_millis()) / 1000;
        u32::try_from(secs).unwrap_or(u32::MAX)
    }

    /// Slot containing the network timestamp at `height`.
    pub fn slot_number(&self, timestamp: u32, height: u64) -> u64 {
        u64::from(timestamp) / self.blocktime(height)
    }

    /// Network timestamp at which `slot` begins.
    pub fn slot_time(&self, slot: u64, height: u64) -> u64 {
        slot * self.blocktime(height)
    }

    /// Milliseconds from `unix_millis` until the start of the next slot.
    pub fn time_until_next_slot_ms(&self, unix_millis: u64, height: u64) -> u64 {
        let now = self.time(unix_millis);
        let next_slot = self.slot_number(now, height) + 1;
        let next_start_ms = self.slot_time(next_slot, height) * 1000;
        let elapsed_ms = unix_millis.saturating_sub(self.epoch_millis());
        next_start_ms.saturating_sub(elapsed_ms)
    }
}
