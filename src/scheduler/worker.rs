//! Worker identity. Each behavior executes on its own short-lived OS
//! thread (`std::thread::spawn`, mirroring the reference implementation's
//! `Thread(target=self).start()` inside `resolve_one`); scoped acquisitions
//! from ordinary code run on whatever thread called them. Either way, the
//! thread needs a stable identity to compare against a region's
//! `state.open_by` (spec §3).
//!
//! Grounded on `mmtk-mmtk-core/src/scheduler/work_bucket.rs`'s `WorkUID`
//! (`static COUNTER: AtomicU64; fetch_add`) for the id-allocation idiom.

use crate::util::id::IdAllocator;

/// The identity a region's `open_by` field compares against (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub(crate) u64);

static WORKER_IDS: IdAllocator = IdAllocator::new();

thread_local! {
    static CURRENT: WorkerId = WorkerId(WORKER_IDS.next());
}

/// The identity of whichever thread calls this — lazily assigned on first
/// use, and stable for the lifetime of the thread.
pub fn current() -> WorkerId {
    CURRENT.with(|w| *w)
}
