//! The global termination barrier (spec §4.3 `wait`) and captured-exception
//! queue (spec §7: "the first exception raised by any behavior is captured
//! and re-raised by the next `wait()`").
//!
//! Grounded on `original_source/src/pyrona/when.py`'s `_Terminator`
//! (`Condition`-guarded counter starting at 1, `increment`/`decrement`
//! notifying on zero, `wait` decrementing once more before blocking) and on
//! `mmtk-mmtk-core/src/scheduler/scheduler.rs`'s use of a `crossbeam`
//! lock-free queue for cross-worker handoff, generalized here to hold
//! captured errors instead of units of work.

use std::sync::{Condvar, Mutex};

use crossbeam::queue::SegQueue;
use lazy_static::lazy_static;

use crate::error::RegionError;

struct State {
    count: Mutex<usize>,
    changed: Condvar,
}

lazy_static! {
    static ref TERMINATOR: State = State {
        count: Mutex::new(1),
        changed: Condvar::new(),
    };
    static ref FAILURES: SegQueue<RegionError> = SegQueue::new();
}

/// A behavior has been scheduled: one more outstanding unit before the
/// barrier can open.
pub(crate) fn increment() {
    let mut count = TERMINATOR.count.lock().unwrap();
    *count += 1;
}

/// A behavior has finished running (successfully, with a captured error,
/// or via a captured panic).
pub(crate) fn decrement() {
    let mut count = TERMINATOR.count.lock().unwrap();
    *count -= 1;
    if *count == 0 {
        TERMINATOR.changed.notify_all();
    }
}

pub(crate) fn record_failure(e: RegionError) {
    FAILURES.push(e);
}

/// `wait()` (spec §4.3): block until every scheduled behavior (including
/// ones scheduled by other behaviors while waiting) has finished, then
/// re-raise the first captured failure, if any.
///
/// Re-arms the counter back to its starting value of 1 once the barrier
/// opens, so a later `wait()` call (there is no reset between them in, e.g.,
/// a merge-sort that waits once per round) observes the same starting state
/// spec §4.3 describes rather than driving the counter negative.
pub fn wait() -> crate::error::Result<()> {
    let mut count = TERMINATOR.count.lock().unwrap();
    *count -= 1;
    while *count != 0 {
        count = TERMINATOR.changed.wait(count).unwrap();
    }
    *count = 1;
    drop(count);

    if let Some(e) = FAILURES.pop() {
        return Err(e);
    }
    Ok(())
}

/// Reset the barrier and failure queue. Test-only teardown hook (spec §9).
pub fn reset_for_tests() {
    *TERMINATOR.count.lock().unwrap() = 1;
    while FAILURES.pop().is_some() {}
}
