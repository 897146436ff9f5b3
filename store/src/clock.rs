//! Wall clock contract.

/// Source of the current unix time.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}
