//! The per-region two-phase-locked enqueue request (spec §4.3).
//!
//! Grounded almost line for line on `original_source/src/pyrona/when.py`'s
//! `_Request`: `target`/`next`/`scheduled` with independent locks guarding
//! `next` and `scheduled`, `start_enqueue`/`finish_enqueue`/`release` with
//! the identical MCS-style queue-lock release shape.

use std::sync::Arc;

use spin::Mutex as SpinMutex;

use crate::region::{self, RegionId};
use crate::scheduler::behavior::Behavior;

pub(crate) struct Request {
    pub(crate) target: RegionId,
    next: SpinMutex<Option<Arc<Behavior>>>,
    scheduled: SpinMutex<bool>,
}

impl Request {
    pub(crate) fn new(target: RegionId) -> Self {
        Self {
            target,
            next: SpinMutex::new(None),
            scheduled: SpinMutex::new(false),
        }
    }

    fn is_scheduled(&self) -> bool {
        *self.scheduled.lock()
    }

    fn set_next(&self, behavior: Arc<Behavior>) {
        *self.next.lock() = Some(behavior);
    }

    /// Phase 1 of 2PL: link this request onto the tail of `target`'s
    /// queue. Returns once any predecessor has finished phase 1 on all of
    /// *its* regions (spec §4.3 "rationale for 2PL").
    pub(crate) fn start_enqueue(this: &Arc<Request>, behavior: &Arc<Behavior>) {
        let prev = region::exchange_last(this.target, this.clone());
        match prev {
            None => behavior.resolve_one(),
            Some(prev) => {
                prev.set_next(behavior.clone());
                while !prev.is_scheduled() {
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Phase 2 of 2PL: make this request visible to its successor.
    pub(crate) fn finish_enqueue(&self) {
        *self.scheduled.lock() = true;
    }

    /// Hand the region off to whichever request (if any) enqueued after
    /// this one (spec §4.3 `release`, MCS-style queue-lock release).
    pub(crate) fn release(this: &Arc<Request>) {
        {
            let next = this.next.lock();
            if next.is_none() && region::clear_last_if(this.target, this) {
                return;
            }
        }

        loop {
            let next = this.next.lock().clone();
            if let Some(next_behavior) = next {
                next_behavior.resolve_one();
                return;
            }
            std::hint::spin_loop();
        }
    }
}
