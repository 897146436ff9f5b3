//! Nullable clock: time only moves when the test says so.

use std::sync::atomic::{AtomicU64, Ordering};

use ark_store::Clock;

pub struct NullClock {
    millis: AtomicU64,
}

impl NullClock {
    pub fn new(unix_millis: u64) -> Self {
        Self { millis: AtomicU64::new(unix_millis) }
    }

    pub fn advance_millis(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance_millis(secs.saturating_mul(1000));
    }

    pub fn set_millis(&self, unix_millis: u64) {
        self.millis.store(unix_millis, Ordering::SeqCst);
    }
}

impl Clock for NullClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}
