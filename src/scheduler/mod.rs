//! The top-level scheduling entry points: [`when`] (spec §4.3) and [`wait`]
//! (spec §4.3, re-exported from [`terminator`]).

pub(crate) mod behavior;
pub(crate) mod request;
mod terminator;
pub(crate) mod worker;

use crate::error::{RegionError, Result};
use crate::region::Region;

pub use terminator::wait;

/// `when(regions, thunk)` (spec §4.3): submit a behavior over the given
/// regions. All declared regions must already be shared — checked here,
/// synchronously, before any enqueueing starts, because spec §7 requires
/// every failure to surface "at the operation site" rather than later on a
/// worker thread (unlike the reference implementation, which defers this
/// check into the thunk's own execution).
pub fn when<F>(regions: &[Region], thunk: F) -> Result<()>
where
    F: FnOnce(&[Region]) -> Result<()> + Send + 'static,
{
    for r in regions {
        if !r.is_shared() {
            return Err(RegionError::MustBeShared(r.name()));
        }
    }

    let ids = regions.iter().map(|r| r.id()).collect();
    let behavior = behavior::Behavior::new(ids, Box::new(move |ids| thunk(&wrap(ids))));
    behavior.schedule();
    Ok(())
}

fn wrap(ids: &[crate::region::RegionId]) -> Vec<Region> {
    ids.iter().map(|id| Region::from_id(*id)).collect()
}

/// Test-only teardown hook (spec §9), resetting every scheduler-owned
/// global: the termination barrier and its captured-failure queue.
pub fn reset_for_tests() {
    terminator::reset_for_tests();
}
