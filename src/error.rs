//! The single error family for region isolation failures (spec §7).

use thiserror::Error;

/// All failures this crate can raise are synchronous and surfaced at the
/// operation site; a thunk's failure is instead captured by the scheduler
/// and re-raised by [`crate::wait`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegionError {
    #[error("region '{0}' is not open by the current worker")]
    NotOpen(String),

    #[error("cannot place a value already owned by another region into '{0}'")]
    InvalidAssignment(String),

    #[error("invalid region assignment: '{0}' cannot be attached to '{1}'")]
    InvalidRegionAssignment(String, String),

    #[error("region '{0}' is not free")]
    RegionNotFree(String),

    #[error("region '{0}' is already attached elsewhere")]
    RegionAlreadyAttached(String),

    #[error("region '{0}' must be shared to run a behavior over it")]
    MustBeShared(String),

    #[error("region '{0}' must be private for scoped acquisition")]
    MustBePrivate(String),

    #[error("region '{0}' must be closed for this operation")]
    MustBeClosed(String),

    #[error("region '{0}' must be open for this operation")]
    MustBeOpen(String),

    #[error("region name '{0}' is already in use")]
    NameCollision(String),

    #[error("writing this value would let it leak across regions '{0}' and '{1}'")]
    CrossRegionLeak(String, String),

    #[error("attribute '{0}' not found")]
    AttributeNotFound(String),

    #[error("index {0} out of bounds (len {1})")]
    IndexOutOfBounds(usize, usize),

    #[error("key not found")]
    KeyNotFound,

    #[error("a behavior thunk panicked: {0}")]
    ThunkPanicked(String),
}

pub type Result<T> = std::result::Result<T, RegionError>;
