//! The scheduled behavior (spec §4.3): a thunk closed over a canonical,
//! sorted set of regions, plus the per-region requests that carry it
//! through two-phase locking.
//!
//! Grounded on `original_source/src/pyrona/when.py`'s `_Behavior`
//! (`regions`/`requests`/`count`, `resolve_one`/`run`), with the thunk
//! itself caught through `std::panic::catch_unwind` the way
//! `mmtk-mmtk-core/src/scheduler/work.rs`'s `GCWork::do_work_with_stat`
//! wraps worker-run units of work in a stat/log boundary.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use spin::Mutex as SpinMutex;

use crate::error::RegionError;
use crate::region::{self, RegionId};
use crate::scheduler::request::Request;
use crate::scheduler::terminator;
use crate::scheduler::worker;

type Thunk = Box<dyn FnOnce(&[RegionId]) -> crate::error::Result<()> + Send>;

pub(crate) struct Behavior {
    thunk: SpinMutex<Option<Thunk>>,
    regions: Vec<RegionId>,
    requests: Vec<Arc<Request>>,
    /// Counts down from `regions.len() + 1`: one slot per region's phase-1
    /// handoff, plus one slot the scheduling thread itself clears once it
    /// has finished issuing all of phase 1 (spec §4.3's "+1 slack", which
    /// also makes the zero-region case resolve immediately).
    pending: AtomicUsize,
}

impl Behavior {
    pub(crate) fn new(regions: Vec<RegionId>, thunk: Thunk) -> Arc<Self> {
        let mut regions = regions;
        regions.sort_by_key(|r| r.0);
        regions.dedup();

        let requests = regions.iter().map(|r| Arc::new(Request::new(*r))).collect();
        let pending = AtomicUsize::new(regions.len() + 1);

        Arc::new(Behavior {
            thunk: SpinMutex::new(Some(thunk)),
            regions,
            requests,
            pending,
        })
    }

    /// Submit this behavior: register it with the termination barrier, run
    /// 2PL phase 1 and phase 2 across all declared regions in identity
    /// order, then clear this thread's own slack slot.
    pub(crate) fn schedule(self: Arc<Self>) {
        terminator::increment();

        for req in &self.requests {
            Request::start_enqueue(req, &self);
        }
        for req in &self.requests {
            req.finish_enqueue();
        }

        self.resolve_one();
    }

    /// Called once per region this behavior is waiting on (by its
    /// predecessor's `release`), and once by `schedule` itself. Runs the
    /// thunk when the count reaches zero, i.e. every region has been
    /// acquired.
    pub(crate) fn resolve_one(self: &Arc<Self>) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            let this = self.clone();
            std::thread::spawn(move || this.execute());
        }
    }

    fn execute(self: Arc<Self>) {
        let worker = worker::current();
        for r in &self.regions {
            if let Err(e) = region::open_for_behavior(*r, worker) {
                terminator::record_failure(e);
                self.finish();
                return;
            }
        }

        let thunk = self.thunk.lock().take().expect("behavior run twice");
        let regions = self.regions.clone();
        let result = panic::catch_unwind(AssertUnwindSafe(|| thunk(&regions)));

        for r in &self.regions {
            region::close_for_behavior(*r);
        }

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => terminator::record_failure(e),
            Err(payload) => {
                let msg = panic_message(payload);
                terminator::record_failure(RegionError::ThunkPanicked(msg));
            }
        }

        self.finish();
    }

    fn finish(&self) {
        for req in &self.requests {
            Request::release(req);
        }
        terminator::decrement();
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "behavior panicked".to_string()
    }
}
