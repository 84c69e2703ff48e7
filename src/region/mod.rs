//! Region handles: state, containment tree, attribute namespace, and the
//! merge/freeze/detach lifecycle operations (spec §3, §4.2).
//!
//! Grounded on `original_source/src/pyrona/core.py`'s `Region` class
//! (`__enter__`/`__exit__`, `add_child`/`owns`, `is_free`/`make_shareable`)
//! for the parts the reference implementation already has, and on spec.md
//! §4.2 directly for `merge`/`freeze`/`detach_all`, which it predates.
//! The process-wide registry is grounded on
//! `mmtk-mmtk-core/src/mmtk.rs`'s `lazy_static! { static ref VM_MAP: ... }`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lazy_static::lazy_static;
use spin::Mutex as SpinMutex;

use crate::arena::{self, capture, regions_of};
use crate::error::{RegionError, Result};
use crate::scheduler::request::Request;
use crate::scheduler::worker::{self, WorkerId};
use crate::util::id::IdAllocator;
use crate::value::{Immutable, ObjectId, Payload, Record, Value};

/// The authoritative identity of a region (spec §3: "a monotonically
/// assigned integer").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(pub(crate) u64);

struct RegionInner {
    id: RegionId,
    name: String,
    shared: AtomicBool,
    open_by: SpinMutex<Option<WorkerId>>,
    parent: SpinMutex<Option<RegionId>>,
    children: SpinMutex<Vec<RegionId>>,
    root: SpinMutex<ObjectId>,
    /// Roots absorbed by a prior `merge`, searched as a read fallback when
    /// an attribute is not found directly on `root` (see `merge` below for
    /// why a single flat namespace is not enough on its own).
    merged_roots: SpinMutex<Vec<ObjectId>>,
    alias: SpinMutex<Option<RegionId>>,
    /// Tail of the per-region FIFO acquisition queue (spec §3, §4.3).
    pub(crate) last: SpinMutex<Option<Arc<Request>>>,
}

lazy_static! {
    static ref REGISTRY: SpinMutex<HashMap<RegionId, Arc<RegionInner>>> =
        SpinMutex::new(HashMap::new());
    static ref NAMES: SpinMutex<HashMap<String, RegionId>> = SpinMutex::new(HashMap::new());
    static ref REGION_IDS: IdAllocator = IdAllocator::new();
    static ref ANON_COUNTER: IdAllocator = IdAllocator::new();
}

/// Reset the registry. Test-only teardown hook (spec §9).
pub fn reset_for_tests() {
    REGISTRY.lock().clear();
    NAMES.lock().clear();
    REGION_IDS.reset();
    ANON_COUNTER.reset();
}

fn inner(id: RegionId) -> Arc<RegionInner> {
    REGISTRY
        .lock()
        .get(&id)
        .cloned()
        .expect("dangling RegionId")
}

/// Follow the alias chain installed by `merge` to the canonical region.
/// Collapsed eagerly at `merge` time (see SPEC_FULL.md §9 open question 3),
/// so in practice this is at most one hop, but it is written as a loop so
/// the invariant holds even if that ever changes.
fn resolve(mut id: RegionId) -> RegionId {
    loop {
        let alias = *inner(id).alias.lock();
        match alias {
            Some(next) => id = next,
            None => return id,
        }
    }
}

pub fn name_of(id: RegionId) -> Option<String> {
    REGISTRY.lock().get(&id).map(|r| r.name.clone())
}

/// `create(name?) -> Region` (spec §6).
pub fn create(name: Option<&str>) -> Result<RegionId> {
    let name = match name {
        Some(n) => n.to_string(),
        None => format!("region-{}", ANON_COUNTER.next()),
    };

    let mut names = NAMES.lock();
    if names.contains_key(&name) {
        return Err(RegionError::NameCollision(name));
    }

    let id = RegionId(REGION_IDS.next());
    let root = arena::alloc(Payload::Record(Record::new("Root")));

    let region = Arc::new(RegionInner {
        id,
        name: name.clone(),
        shared: AtomicBool::new(false),
        open_by: SpinMutex::new(None),
        parent: SpinMutex::new(None),
        children: SpinMutex::new(Vec::new()),
        root: SpinMutex::new(root),
        merged_roots: SpinMutex::new(Vec::new()),
        alias: SpinMutex::new(None),
        last: SpinMutex::new(None),
    });

    names.insert(name, id);
    REGISTRY.lock().insert(id, region);
    trace!("created region {:?} (root object {:?})", id, root);
    Ok(id)
}

pub fn is_shared(id: RegionId) -> bool {
    inner(resolve(id)).shared.load(Ordering::SeqCst)
}

pub fn is_open(id: RegionId) -> bool {
    inner(resolve(id)).open_by.lock().is_some()
}

pub fn is_private(id: RegionId) -> bool {
    !is_shared(id)
}

pub fn is_free(id: RegionId) -> bool {
    inner(resolve(id)).parent.lock().is_none()
}

/// `R` owns `other` iff `other` is a (possibly indirect) child of `R`.
pub fn owns(id: RegionId, other: RegionId) -> bool {
    let id = resolve(id);
    let other = resolve(other);
    let children = inner(id).children.lock().clone();
    for child in children {
        if child == other || owns(child, other) {
            return true;
        }
    }
    false
}

/// Attach `child` as a child of `parent`. `child` must currently be free.
pub(crate) fn attach_child(parent: RegionId, child: RegionId) -> Result<()> {
    let parent = resolve(parent);
    let child = resolve(child);
    if !is_free(child) {
        return Err(RegionError::RegionNotFree(
            name_of(child).unwrap_or_default(),
        ));
    }
    *inner(child).parent.lock() = Some(parent);
    inner(parent).children.lock().push(child);
    Ok(())
}

/// `make_shareable(R) -> R` (spec §6). Idempotent.
pub fn make_shareable(id: RegionId) {
    inner(resolve(id)).shared.store(true, Ordering::SeqCst);
}

/// Scoped acquisition guard (spec §4.2 `enter`/`exit`). Dropping the guard
/// always clears `open_by`, even if the caller unwinds through a panic —
/// the same "guaranteed release on every path" contract a Python context
/// manager's `__exit__` gives for free.
pub struct ScopeGuard {
    id: RegionId,
    worker: WorkerId,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let region = inner(self.id);
        let mut open_by = region.open_by.lock();
        if *open_by == Some(self.worker) {
            *open_by = None;
        }
    }
}

/// `acquire_scope(R)` (spec §4.2 `enter`). Private regions only; a nested
/// acquisition (entering a child while its parent is open by the same
/// worker) composes.
pub fn acquire_scope(id: RegionId) -> Result<ScopeGuard> {
    let id = resolve(id);
    if is_shared(id) {
        return Err(RegionError::MustBePrivate(name_of(id).unwrap_or_default()));
    }

    let region = inner(id);
    let me = worker::current();
    let eligible = is_free(id) || {
        match *region.parent.lock() {
            Some(parent) => is_open_by(parent, me),
            None => false,
        }
    };
    if !eligible {
        return Err(RegionError::MustBeOpen(name_of(id).unwrap_or_default()));
    }

    *region.open_by.lock() = Some(me);
    Ok(ScopeGuard { id, worker: me })
}

fn is_open_by(id: RegionId, worker: WorkerId) -> bool {
    *inner(resolve(id)).open_by.lock() == Some(worker)
}

/// Whether `id` is open by the worker currently executing (spec §4.4:
/// "Every such operation first verifies `region(self).open_by == current
/// worker`").
pub fn is_open_by_current(id: RegionId) -> bool {
    is_open_by(id, worker::current())
}

/// `release_scope(R)`: explicit release, equivalent to dropping the guard.
pub fn release_scope(guard: ScopeGuard) {
    drop(guard)
}

/// Opens `id` on behalf of a scheduled behavior. Only legal for shared
/// regions (spec §4.3 execution step 1); a private region here is an
/// isolation failure, not a panic.
pub(crate) fn open_for_behavior(id: RegionId, worker: WorkerId) -> Result<()> {
    let id = resolve(id);
    if !is_shared(id) {
        return Err(RegionError::MustBeShared(name_of(id).unwrap_or_default()));
    }
    *inner(id).open_by.lock() = Some(worker);
    Ok(())
}

pub(crate) fn close_for_behavior(id: RegionId) {
    *inner(resolve(id)).open_by.lock() = None;
}

fn check_open_by_current(id: RegionId) -> Result<RegionId> {
    let id = resolve(id);
    let me = worker::current();
    if *inner(id).open_by.lock() != Some(me) {
        return Err(RegionError::NotOpen(name_of(id).unwrap_or_default()));
    }
    Ok(id)
}

fn root_of(id: RegionId) -> ObjectId {
    *inner(id).root.lock()
}

/// `R.attr` read (spec §4.2 attribute dispatch, §4.4). Falls back to any
/// roots absorbed by a prior `merge`.
pub fn get_field(id: RegionId, name: &str) -> Result<Value> {
    let id = check_open_by_current(id)?;
    let root = root_of(id);
    if let Some(v) = arena::with_payload(root, |p| field_of(p, name)) {
        return Ok(v);
    }
    for merged in inner(id).merged_roots.lock().iter() {
        if let Some(v) = arena::with_payload(*merged, |p| field_of(p, name)) {
            return Ok(v);
        }
    }
    Err(RegionError::AttributeNotFound(name.to_string()))
}

fn field_of(p: &Payload, name: &str) -> Option<Value> {
    match p {
        Payload::Record(r) => r.get(name).cloned(),
        _ => None,
    }
}

/// `R.attr = v` (spec §4.2 assignment semantics).
pub fn set_field(id: RegionId, name: &str, value: Value) -> Result<()> {
    let id = check_open_by_current(id)?;

    if let Value::Region(other) = &value {
        if !can_assign_region(id, *other) {
            return Err(RegionError::InvalidRegionAssignment(
                name_of(*other).unwrap_or_default(),
                name_of(id).unwrap_or_default(),
            ));
        }
        if is_free(*other) {
            attach_child(id, *other)?;
        }
    } else {
        let rset = regions_of(&[value.clone()]);
        let mut full: std::collections::HashSet<Option<RegionId>> = rset;
        full.insert(None);
        full.insert(Some(id));
        if full.len() > 2 {
            return Err(RegionError::CrossRegionLeak(
                name_of(id).unwrap_or_default(),
                "<value>".to_string(),
            ));
        }
        capture(id, &value, false)?;
    }

    let root = root_of(id);
    arena::with_payload_mut(root, |p| {
        if let Payload::Record(r) = p {
            r.set(name, value);
        }
    });
    Ok(())
}

/// §4.2's `can_assign` check for assigning a `Region` value as an
/// attribute: accept iff `v` is shared, OR `v == R`, OR `R` owns `v`, OR
/// (`v` is free AND `root(self) != v`).
fn can_assign_region(target: RegionId, v: RegionId) -> bool {
    let v = resolve(v);
    let target_root = root_region(target);
    is_shared(v) || v == target || owns(target, v) || (is_free(v) && target_root != Some(v))
}

/// `root_region(value)` (spec §6): walk up the containment tree to the
/// free ancestor.
pub fn root_region(id: RegionId) -> Option<RegionId> {
    let mut cur = resolve(id);
    loop {
        match *inner(cur).parent.lock() {
            Some(p) => cur = resolve(p),
            None => return Some(cur),
        }
    }
}

/// `merge(R, other) -> merged_handle` (spec §4.2). `self` (`id`) must be
/// open and free.
pub fn merge(id: RegionId, other: RegionId) -> Result<()> {
    let id = resolve(id);
    let other = resolve(other);

    if !is_open_by(id, worker::current()) {
        return Err(RegionError::MustBeOpen(name_of(id).unwrap_or_default()));
    }
    if !is_free(id) {
        return Err(RegionError::RegionNotFree(name_of(id).unwrap_or_default()));
    }

    let other_root = root_of(other);

    // Re-home `other`'s child regions onto `id` first: a region-valued
    // attribute is a legal child (spec §3 invariant 6), but `capture`'s
    // generic region-ownership check only ever accepts a region that is
    // free or already owned by the target, and `other`'s children are
    // neither until we fix that up here.
    let other_children: Vec<RegionId> = inner(other).children.lock().drain(..).collect();
    for child in &other_children {
        *inner(*child).parent.lock() = Some(id);
    }
    inner(id).children.lock().extend(other_children);

    // Move other's root into self's namespace under a fresh synthetic
    // attribute name, and capture it (and everything it owns) into self.
    let synthetic = format!("__merged_{}", other.0);
    capture(id, &Value::Wrapped(other_root), true)?;
    let self_root = root_of(id);
    arena::with_payload_mut(self_root, |p| {
        if let Payload::Record(r) = p {
            r.set(synthetic, Value::Wrapped(other_root));
        }
    });
    inner(id).merged_roots.lock().push(other_root);

    // Give `other` a fresh, empty root and install the alias so later
    // operations on `other` forward to `self`.
    let fresh = arena::alloc(Payload::Record(Record::new("Root")));
    *inner(other).root.lock() = fresh;
    inner(other).merged_roots.lock().clear();
    *inner(other).alias.lock() = Some(id);

    debug!("merged region {:?} into {:?}", other, id);
    Ok(())
}

/// `freeze(R) -> immutable_snapshot` (spec §4.2). `self` must be closed.
pub fn freeze(id: RegionId) -> Result<Immutable> {
    let id = resolve(id);
    if is_open(id) {
        return Err(RegionError::MustBeClosed(name_of(id).unwrap_or_default()));
    }

    let root = root_of(id);
    let merged: Vec<ObjectId> = inner(id).merged_roots.lock().clone();
    let snapshot = freeze_object(root, &merged);

    // Empty the region and make it free.
    let fresh = arena::alloc(Payload::Record(Record::new("Root")));
    *inner(id).root.lock() = fresh;
    inner(id).merged_roots.lock().clear();
    detach_from_parent(id);

    trace!("froze region {:?}", id);
    Ok(snapshot)
}

fn detach_from_parent(id: RegionId) {
    let parent = inner(id).parent.lock().take();
    if let Some(p) = parent {
        inner(p).children.lock().retain(|c| *c != id);
    }
}

// Each `with_payload`/`with_payload_mut` call below is kept strictly
// non-nested: the payload is cloned out (or the lock released) before any
// recursive call that might itself need the arena or registry lock, since
// both are single process-wide `spin` locks with no self-recursion.

fn raw_fields(id: ObjectId) -> Vec<(String, Value)> {
    arena::with_payload(id, |p| match p {
        Payload::Record(r) => r.fields.clone(),
        _ => Vec::new(),
    })
}

fn freeze_object(id: ObjectId, extra_fields_from: &[ObjectId]) -> Immutable {
    let mut fields: Vec<(String, Immutable)> = Vec::new();
    for (k, v) in raw_fields(id) {
        fields.push((k, freeze_value(&v)));
    }
    for extra in extra_fields_from {
        for (k, v) in raw_fields(*extra) {
            fields.push((k, freeze_value(&v)));
        }
    }
    Immutable::Record("Root".to_string(), fields)
}

fn freeze_value(v: &Value) -> Immutable {
    match v {
        Value::Immutable(imm) => imm.clone(),
        Value::Region(r) => freeze(*r).unwrap_or(Immutable::Null),
        Value::Wrapped(id) => {
            let payload = arena::with_payload(*id, Clone::clone);
            match payload {
                Payload::Sequence(items) => {
                    Immutable::Tuple(items.iter().map(freeze_value).collect())
                }
                Payload::Set(items) => {
                    Immutable::FrozenSet(items.iter().map(freeze_value).collect())
                }
                Payload::Map(pairs) => Immutable::Tuple(
                    pairs
                        .iter()
                        .map(|(k, v)| Immutable::Tuple(vec![freeze_value(k), freeze_value(v)]))
                        .collect(),
                ),
                Payload::Record(r) => Immutable::Record(
                    r.type_name.clone(),
                    r.fields
                        .iter()
                        .map(|(k, v)| (k.clone(), freeze_value(v)))
                        .collect(),
                ),
            }
        }
    }
}

/// `detach_all(R, new_name) -> new_region` (spec §4.2). `self` must be
/// open and shared.
pub fn detach_all(id: RegionId, new_name: &str) -> Result<RegionId> {
    let id = resolve(id);
    if !is_open_by(id, worker::current()) {
        return Err(RegionError::MustBeOpen(name_of(id).unwrap_or_default()));
    }
    if !is_shared(id) {
        return Err(RegionError::MustBeShared(name_of(id).unwrap_or_default()));
    }

    let new_id = create(Some(new_name))?;
    let old_root = root_of(id);
    let merged: Vec<ObjectId> = inner(id).merged_roots.lock().drain(..).collect();

    capture(new_id, &Value::Wrapped(old_root), true)?;
    let new_root = root_of(new_id);
    let old_fields = raw_fields(old_root);
    arena::with_payload_mut(new_root, |p| {
        if let Payload::Record(dst) = p {
            for (k, v) in old_fields {
                dst.set(k, v);
            }
        }
    });
    for m in merged {
        capture(new_id, &Value::Wrapped(m), true)?;
        let m_fields = raw_fields(m);
        arena::with_payload_mut(new_root, |p| {
            if let Payload::Record(dst) = p {
                for (k, v) in m_fields {
                    dst.set(k, v);
                }
            }
        });
    }

    let fresh = arena::alloc(Payload::Record(Record::new("Root")));
    *inner(id).root.lock() = fresh;

    trace!("detached all of {:?} into new region {:?}", id, new_id);
    Ok(new_id)
}

/// `region_of(value) -> Region | none` (spec §6): the region that directly
/// contains `value` — the owning region of a captured object, or the
/// parent of a region value that has itself been attached as another
/// region's child. Immutable values have no region.
pub fn region_of_value(v: &Value) -> Option<RegionId> {
    match v {
        Value::Wrapped(id) => arena::owner_of(*id),
        Value::Region(r) => *inner(resolve(*r)).parent.lock(),
        Value::Immutable(_) => None,
    }
}

/// `root_region(value) -> Region | none` (spec §6): `value`'s immediate
/// region, walked up the containment tree to its free ancestor.
pub fn root_region_of_value(v: &Value) -> Option<RegionId> {
    region_of_value(v).and_then(root_region)
}

/// Atomically swap in `new` as `id`'s queue tail, returning whatever
/// request was there before (spec §4.3 phase 1, `start_enqueue`). Operates
/// on the literal region a behavior declared, without alias resolution: a
/// behavior's 2PL ordering is scoped to the region identity it was
/// submitted against.
pub(crate) fn exchange_last(id: RegionId, new: Arc<Request>) -> Option<Arc<Request>> {
    inner(id).last.lock().replace(new)
}

/// Clear `id`'s queue tail iff it still holds `comparand` (spec §4.3
/// `release`, the no-successor-yet case). Returns whether the clear
/// happened.
pub(crate) fn clear_last_if(id: RegionId, comparand: &Arc<Request>) -> bool {
    let mut last = inner(id).last.lock();
    let matches = match last.as_ref() {
        Some(cur) => Arc::ptr_eq(cur, comparand),
        None => false,
    };
    if matches {
        *last = None;
    }
    matches
}

/// A region handle (spec §3, §6): the public surface over a [`RegionId`].
/// Cheap to copy, comparable by identity; every method forwards to the
/// free functions above, which do the actual state manipulation under the
/// process-wide registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region(RegionId);

impl Region {
    /// `create(name?) -> Region` (spec §6).
    pub fn create(name: Option<&str>) -> Result<Self> {
        create(name).map(Region)
    }

    pub(crate) fn from_id(id: RegionId) -> Self {
        Region(id)
    }

    pub(crate) fn id(&self) -> RegionId {
        self.0
    }

    pub fn name(&self) -> String {
        name_of(self.0).unwrap_or_default()
    }

    pub fn is_shared(&self) -> bool {
        is_shared(self.0)
    }

    pub fn is_private(&self) -> bool {
        is_private(self.0)
    }

    pub fn is_open(&self) -> bool {
        is_open(self.0)
    }

    pub fn is_free(&self) -> bool {
        is_free(self.0)
    }

    pub fn owns(&self, other: Region) -> bool {
        owns(self.0, other.0)
    }

    pub fn root_region(&self) -> Option<Region> {
        root_region(self.0).map(Region)
    }

    /// `make_shareable(R) -> R` (spec §6).
    pub fn make_shareable(&self) -> Self {
        make_shareable(self.0);
        *self
    }

    /// `acquire_scope(R)` / `enter` (spec §4.2). Held for as long as the
    /// returned guard lives.
    pub fn acquire_scope(&self) -> Result<ScopeGuard> {
        acquire_scope(self.0)
    }

    pub fn release_scope(&self, guard: ScopeGuard) {
        release_scope(guard)
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        get_field(self.0, name)
    }

    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        set_field(self.0, name, value)
    }

    /// `merge(R, other)` (spec §4.2). Consumes `other`'s identity into
    /// `self`'s namespace; `other` remains a valid, now-aliased handle.
    pub fn merge(&self, other: Region) -> Result<()> {
        merge(self.0, other.0)
    }

    /// `freeze(R) -> immutable_snapshot` (spec §4.2).
    pub fn freeze(&self) -> Result<Immutable> {
        freeze(self.0)
    }

    /// `detach_all(R, new_name) -> new_region` (spec §4.2).
    pub fn detach_all(&self, new_name: &str) -> Result<Region> {
        detach_all(self.0, new_name).map(Region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owns_is_transitive_over_the_containment_tree() {
        crate::reset_for_tests();
        let parent = create(Some("unit_owns_parent")).unwrap();
        let mid = create(Some("unit_owns_mid")).unwrap();
        let leaf = create(Some("unit_owns_leaf")).unwrap();
        attach_child(parent, mid).unwrap();
        attach_child(mid, leaf).unwrap();

        assert!(owns(parent, mid));
        assert!(owns(parent, leaf));
        assert!(!owns(leaf, parent));
        assert!(!owns(mid, parent));
    }

    #[test]
    fn can_assign_region_accepts_shared_self_and_owned() {
        crate::reset_for_tests();
        let target = create(Some("unit_assign_target")).unwrap();
        let child = create(Some("unit_assign_child")).unwrap();
        let shared = create(Some("unit_assign_shared")).unwrap();
        attach_child(target, child).unwrap();
        make_shareable(shared);

        assert!(can_assign_region(target, target));
        assert!(can_assign_region(target, child));
        assert!(can_assign_region(target, shared));
    }

    #[test]
    fn can_assign_region_rejects_assigning_an_ancestor_as_child() {
        crate::reset_for_tests();
        let parent = create(Some("unit_assign_ancestor_parent")).unwrap();
        let target = create(Some("unit_assign_ancestor_target")).unwrap();
        attach_child(parent, target).unwrap();

        // `parent` is `target`'s own root region, so assigning it back down
        // as one of `target`'s attributes would create a cycle.
        assert!(!can_assign_region(target, parent));
    }

    #[test]
    fn capture_via_set_field_rejects_cross_region_values() {
        crate::reset_for_tests();
        let r1 = create(Some("unit_capture_r1")).unwrap();
        let r2 = create(Some("unit_capture_r2")).unwrap();
        let g1 = acquire_scope(r1).unwrap();
        let obj = arena::alloc(Payload::Record(Record::new("Widget")));
        set_field(r1, "obj", Value::Wrapped(obj)).unwrap();
        let captured = get_field(r1, "obj").unwrap();

        let g2 = acquire_scope(r2).unwrap();
        let err = set_field(r2, "obj", captured).unwrap_err();
        assert!(matches!(err, RegionError::CrossRegionLeak(_, _)));

        release_scope(g2);
        release_scope(g1);
    }
}
