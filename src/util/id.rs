//! A small monotonic id allocator, generalized from the teacher's
//! `SynchronizedCounter` (`usize`-only) into a typed counter that hands out
//! newtype ids, and from `scheduler::work_bucket::WorkUID`'s
//! `AtomicU64::fetch_add` idiom for per-instance unique ids.

use std::sync::atomic::{AtomicU64, Ordering};

/// A process-wide monotonic counter. `next()` never returns the same value
/// twice for the lifetime of the process.
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Reset the counter to zero. Only meant for test teardown, where a
    /// fresh process-wide registry should also start from fresh ids.
    pub fn reset(&self) {
        self.next.store(0, Ordering::Relaxed);
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_is_monotonic_and_never_repeats() {
        let alloc = IdAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        let c = alloc.next();
        assert_eq!([a, b, c], [0, 1, 2]);
    }

    #[test]
    fn reset_restarts_the_counter_from_zero() {
        let alloc = IdAllocator::new();
        alloc.next();
        alloc.next();
        alloc.reset();
        assert_eq!(alloc.next(), 0);
    }
}
