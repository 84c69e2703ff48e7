//! boc-core is a runtime simulator for Behavior-Oriented Concurrency (BoC)
//! over region-based object isolation.
//!
//! Logically, this crate includes these major parts:
//! * [Regions](region::Region): units of exclusive ownership and isolation,
//!   arranged in a containment forest, each holding an attribute namespace
//!   (a root object) that captured mutable values are absorbed into.
//! * [Values](value::Value): deeply-immutable values, region handles, and
//!   references into the process-wide [object arena](arena), the last of
//!   which are only ever read or written through the
//!   [isolated-object wrapper](wrapper::WrappedObject).
//! * [Behaviors](scheduler::when): closures submitted over a set of
//!   regions, run by the [scheduler](scheduler) only once two-phase locking
//!   has acquired every declared region, each on its own short-lived
//!   thread.
//!
//! Mutation is only ever legal through a region that is currently open —
//! either because the calling thread holds a [scoped
//! acquisition](region::Region::acquire_scope) on a private region, or
//! because a scheduled behavior has been granted a shared one. Every
//! mutating operation checks this before touching the arena (spec §4.4).

#[macro_use]
extern crate log;

pub mod arena;
pub mod error;
pub mod region;
pub mod scheduler;
pub(crate) mod util;
pub mod value;
pub mod wrapper;

pub use error::{RegionError, Result};
pub use region::Region;
pub use scheduler::{wait, when};
pub use value::{is_immutable, region_of, regions_of, root_region, Immutable, Payload, Record, Value};
pub use wrapper::WrappedObject;

/// Runtime-wide tunables (spec §9's ambient configuration surface).
/// Currently limited to logger bootstrap; reserved for scheduler tuning
/// (e.g. a bounded worker pool) should the one-thread-per-behavior model
/// ever need an alternative.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Initialize the built-in `env_logger` on [`init`]. Defaults to
    /// `true`; set to `false` if the embedder registers its own `log`
    /// implementation before calling [`init`].
    pub init_logger: bool,
}

impl Default for RuntimeOptions {
    /// Hand-written so the default actually matches the field's documented
    /// default of `true` — a derived `Default` would silently give `false`.
    fn default() -> Self {
        Self { init_logger: true }
    }
}

/// Builds a [`RuntimeOptions`], mirroring `MMTKBuilder`'s role in the
/// teacher crate: a small, explicit place to assemble process-wide config
/// before [`init`] takes effect.
#[derive(Debug, Clone, Default)]
pub struct BocBuilder {
    options: RuntimeOptions,
}

impl BocBuilder {
    pub fn new() -> Self {
        Self {
            options: RuntimeOptions { init_logger: true },
        }
    }

    pub fn init_logger(mut self, enabled: bool) -> Self {
        self.options.init_logger = enabled;
        self
    }

    pub fn build(self) -> RuntimeOptions {
        self.options
    }
}

/// Initialize process-wide runtime state. Optional: every registry is
/// lazily initialized on first use regardless, but calling this up front
/// lets an embedder control logger setup explicitly (spec §9).
pub fn init(options: &RuntimeOptions) {
    if options.init_logger {
        util::logger::try_init();
    }
}

/// Reset every process-wide registry (region registry, object arena,
/// scheduler termination barrier and failure queue, worker-local ids are
/// left alone since they are already per-thread). Test-only teardown hook
/// (spec §9: "provide a teardown hook for test isolation").
pub fn reset_for_tests() {
    region::reset_for_tests();
    arena::reset_for_tests();
    scheduler::reset_for_tests();
}
