//! The process-wide object arena: captured mutable payloads addressed by
//! [`ObjectId`], plus [`capture`] (spec §4.1) and [`regions_of`] (spec §6).
//!
//! Grounded on spec §9 ("store captured objects in a per-region arena and
//! reference them by index") and on the lock shape of
//! `mmtk-mmtk-core/src/scheduler/scheduler.rs`'s
//! `spin::RwLock<Injector<...>>` fields: a single process-wide structure,
//! read on every attribute access and written only on capture/freeze/merge.

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use spin::RwLock;

use crate::error::{RegionError, Result};
use crate::region::{self, RegionId};
use crate::util::id::IdAllocator;
use crate::value::{ObjectId, Payload, Value};

struct ArenaSlot {
    payload: Payload,
    owner: Option<RegionId>,
}

struct Arena {
    slots: HashMap<ObjectId, ArenaSlot>,
}

lazy_static! {
    static ref ARENA: RwLock<Arena> = RwLock::new(Arena {
        slots: HashMap::new(),
    });
    static ref OBJECT_IDS: IdAllocator = IdAllocator::new();
}

/// Reset the arena. Test-only teardown hook (spec §9: "provide a teardown
/// hook for test isolation").
pub fn reset_for_tests() {
    ARENA.write().slots.clear();
    OBJECT_IDS.reset();
}

/// Allocate a brand-new, free (unowned) object holding `payload`.
pub fn alloc(payload: Payload) -> ObjectId {
    let id = ObjectId(OBJECT_IDS.next());
    ARENA.write().slots.insert(
        id,
        ArenaSlot {
            payload,
            owner: None,
        },
    );
    id
}

/// `region_of(value)` restricted to arena objects: the region identity the
/// object currently belongs to, or `None` if it is free.
pub fn owner_of(id: ObjectId) -> Option<RegionId> {
    ARENA.read().slots.get(&id).and_then(|s| s.owner)
}

/// Run `f` with read access to an object's payload, after the caller has
/// already verified the isolation check (region open by current worker).
pub(crate) fn with_payload<T>(id: ObjectId, f: impl FnOnce(&Payload) -> T) -> T {
    let arena = ARENA.read();
    let slot = arena.slots.get(&id).expect("dangling ObjectId");
    f(&slot.payload)
}

pub(crate) fn with_payload_mut<T>(id: ObjectId, f: impl FnOnce(&mut Payload) -> T) -> T {
    let mut arena = ARENA.write();
    let slot = arena.slots.get_mut(&id).expect("dangling ObjectId");
    f(&mut slot.payload)
}

/// The internal form of `regions_of` used by the assignment-time leak check
/// (spec §4.2 invariant 5: `regions_of(v) ⊆ {∅, R}`), keeping the `∅` member
/// as an explicit `None` in the set rather than dropping it. [`crate::value::regions_of`]
/// is the public, spec-§6-named surface over the same data, returning
/// `Region` handles with `∅` simply absent from the set.
pub fn regions_of(values: &[Value]) -> HashSet<Option<RegionId>> {
    values
        .iter()
        .map(|v| match v {
            Value::Immutable(_) => None,
            Value::Region(_) => None,
            Value::Wrapped(id) => owner_of(*id),
        })
        .collect()
}

/// `capture(R, v, overwrite)` (spec §4.1): recursively absorb `v` into
/// region `target`.
pub fn capture(target: RegionId, v: &Value, overwrite: bool) -> Result<()> {
    match v {
        Value::Immutable(_) => Ok(()),
        Value::Region(rid) => {
            if region::is_free(*rid) {
                region::attach_child(target, *rid)
            } else if region::owns(target, *rid) || *rid == target {
                Ok(())
            } else {
                Err(RegionError::RegionAlreadyAttached(
                    region::name_of(*rid).unwrap_or_default(),
                ))
            }
        }
        Value::Wrapped(id) => capture_object(target, *id, overwrite),
    }
}

fn capture_object(target: RegionId, id: ObjectId, overwrite: bool) -> Result<()> {
    let current_owner = owner_of(id);
    if let Some(owner) = current_owner {
        if owner == target {
            return Ok(());
        }
        if !overwrite {
            return Err(RegionError::InvalidAssignment(
                region::name_of(target).unwrap_or_default(),
            ));
        }
    }

    // Re-point ownership, then recurse into the elements so the whole
    // subgraph is absorbed.
    let elements: Vec<Value> = {
        let mut arena = ARENA.write();
        let slot = arena.slots.get_mut(&id).expect("dangling ObjectId");
        slot.owner = Some(target);
        match &slot.payload {
            Payload::Sequence(v) => v.clone(),
            Payload::Set(v) => v.clone(),
            Payload::Map(pairs) => pairs.iter().flat_map(|(k, v)| [k.clone(), v.clone()]).collect(),
            Payload::Record(r) => r.fields.iter().map(|(_, v)| v.clone()).collect(),
        }
    };

    for element in &elements {
        capture(target, element, overwrite)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Record;

    #[test]
    fn capture_recurses_into_nested_sequence_elements() {
        crate::reset_for_tests();
        let r = region::create(Some("unit_arena_capture_seq")).unwrap();
        let inner = alloc(Payload::Sequence(vec![Value::int(1)]));
        let outer = alloc(Payload::Sequence(vec![Value::Wrapped(inner)]));

        capture(r, &Value::Wrapped(outer), false).unwrap();

        assert_eq!(owner_of(outer), Some(r));
        assert_eq!(owner_of(inner), Some(r));
    }

    #[test]
    fn capture_of_immutable_value_is_a_no_op() {
        crate::reset_for_tests();
        let r = region::create(Some("unit_arena_capture_immutable")).unwrap();
        capture(r, &Value::int(5), false).unwrap();
    }

    #[test]
    fn capture_without_overwrite_rejects_an_already_owned_object() {
        crate::reset_for_tests();
        let r1 = region::create(Some("unit_arena_capture_r1")).unwrap();
        let r2 = region::create(Some("unit_arena_capture_r2")).unwrap();
        let obj = alloc(Payload::Record(Record::new("X")));

        capture(r1, &Value::Wrapped(obj), false).unwrap();
        let err = capture(r2, &Value::Wrapped(obj), false).unwrap_err();
        assert!(matches!(err, RegionError::InvalidAssignment(_)));
    }

    #[test]
    fn regions_of_reports_none_for_free_values_and_some_for_owned() {
        crate::reset_for_tests();
        let r = region::create(Some("unit_arena_regions_of")).unwrap();
        let obj = alloc(Payload::Record(Record::new("X")));
        capture(r, &Value::Wrapped(obj), false).unwrap();

        let set = regions_of(&[Value::int(1), Value::Wrapped(obj)]);
        assert!(set.contains(&None));
        assert!(set.contains(&Some(r)));
        assert_eq!(set.len(), 2);
    }
}
