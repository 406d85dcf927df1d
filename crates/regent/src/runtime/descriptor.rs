//! Type descriptors.
//!
//! A [`Descriptor`] is the per-type record the rest of the runtime dispatches
//! through: the allocation footprint plus one entry point per lifecycle
//! operation. Reference enumeration is always present; finalisation,
//! notification and destruction are `None` when the type has nothing to do,
//! so callers skip them without an indirect call.
//!
//! # Registry
//!
//! Rust has no generic statics, so descriptors are memoised in a
//! process-wide registry keyed by the [`TypeId`] of the laid-out
//! representation. The first request for a type builds the descriptor in
//! the global arena; every later request, from any thread, returns the same
//! address.
//!
//! ```text
//! build_descriptor::<T, B>()
//!   read lock  -> hit: return
//!   write lock -> re-check, build in global arena, insert
//! ```
//!
//! One descriptor exists per (type, base) pair: a `T` used both as a region
//! object and as a cown has two footprints and therefore two descriptors.

use crate::runtime::capability::Managed;
use crate::runtime::object::{Base, Object, ObjectStack, VRepr};
use fxhash::FxHashMap;
use regent_log::debug;
use regent_mem::global_arena;
use std::alloc::Layout;
use std::any::{TypeId, type_name};
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::{OnceLock, PoisonError, RwLock};

/// Reference enumeration entry point.
pub type TraceFn = unsafe fn(NonNull<Object>, &mut ObjectStack);

/// Finaliser entry point: object, owning region, sub-region collector.
pub type FinaliserFn = unsafe fn(NonNull<Object>, NonNull<Object>, &mut ObjectStack);

/// Wake notification entry point.
pub type NotifiedFn = unsafe fn(NonNull<Object>);

/// Teardown entry point, run before storage is reclaimed.
pub type DestructorFn = unsafe fn(NonNull<Object>);

/// Immutable runtime metadata for one managed type behind one header kind.
#[repr(C)]
pub struct Descriptor {
    layout: Layout,
    trace: TraceFn,
    finaliser: Option<FinaliserFn>,
    notified: Option<NotifiedFn>,
    destructor: Option<DestructorFn>,
    name: &'static str,
    kind: &'static str,
}

impl Descriptor {
    fn build<T: Managed, B: Base>() -> Self {
        let capabilities = T::CAPABILITIES;

        Descriptor {
            layout: Layout::new::<VRepr<B, T>>(),
            trace: gc_trace::<B, T> as TraceFn,
            finaliser: if capabilities.has_finaliser() {
                Some(gc_final::<B, T> as FinaliserFn)
            } else {
                None
            },
            notified: if capabilities.has_notified() {
                Some(gc_notified::<B, T> as NotifiedFn)
            } else {
                None
            },
            destructor: if std::mem::needs_drop::<T>() {
                Some(gc_destructor::<B, T> as DestructorFn)
            } else {
                None
            },
            name: type_name::<T>(),
            kind: B::KIND,
        }
    }

    /// Footprint in bytes: header plus value.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Required alignment of the storage.
    #[inline]
    #[must_use]
    pub fn align(&self) -> usize {
        self.layout.align()
    }

    /// Layout of one instance.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Reference enumeration entry point.
    #[inline]
    #[must_use]
    pub fn trace(&self) -> TraceFn {
        self.trace
    }

    /// Finaliser entry point, if the type binds one.
    #[inline]
    #[must_use]
    pub fn finaliser(&self) -> Option<FinaliserFn> {
        self.finaliser
    }

    /// Notification entry point, if the type binds one.
    #[inline]
    #[must_use]
    pub fn notified(&self) -> Option<NotifiedFn> {
        self.notified
    }

    /// Teardown entry point, if the type has drop glue.
    #[inline]
    #[must_use]
    pub fn destructor(&self) -> Option<DestructorFn> {
        self.destructor
    }

    /// Name of the described type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Header kind: `"object"` or `"cown"`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("size", &self.size())
            .field("align", &self.align())
            .field("trace", &(self.trace as *const ()))
            .field("finaliser", &self.finaliser.map(|f| f as *const ()))
            .field("notified", &self.notified.map(|f| f as *const ()))
            .field("destructor", &self.destructor.map(|f| f as *const ()))
            .finish()
    }
}

unsafe fn gc_trace<B: Base, T: Managed>(this: NonNull<Object>, stack: &mut ObjectStack) {
    // SAFETY: descriptors are only stamped on `VRepr<B, T>` storage.
    let value = unsafe { VRepr::<B, T>::value_ptr(this).as_ref() };
    value.trace(stack);
}

unsafe fn gc_final<B: Base, T: Managed>(
    this: NonNull<Object>,
    region: NonNull<Object>,
    sub_regions: &mut ObjectStack,
) {
    if let Some(finaliser) = T::CAPABILITIES.finaliser {
        // SAFETY: see `gc_trace`; the caller has exclusive access.
        let value = unsafe { VRepr::<B, T>::value_ptr(this).as_mut() };
        finaliser(value, region, sub_regions);
    }
}

unsafe fn gc_notified<B: Base, T: Managed>(this: NonNull<Object>) {
    if let Some(notified) = T::CAPABILITIES.notified {
        // SAFETY: see `gc_final`.
        let value = unsafe { VRepr::<B, T>::value_ptr(this).as_mut() };
        notified(value, this);
    }
}

unsafe fn gc_destructor<B: Base, T: Managed>(this: NonNull<Object>) {
    // SAFETY: see `gc_trace`; `Object::destruct` runs this at most once.
    unsafe { ptr::drop_in_place(VRepr::<B, T>::value_ptr(this).as_ptr()) };
}

type Registry = RwLock<FxHashMap<TypeId, &'static Descriptor>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| RwLock::new(FxHashMap::default()))
}

/// Returns the descriptor of `T` laid out behind header `B`.
///
/// The descriptor is built on first use and never changes afterwards. Every
/// call with the same pair returns the same address.
///
/// ```
/// use regent::{Managed, Object, build_descriptor};
///
/// struct Leaf(u64);
/// impl Managed for Leaf {}
///
/// let a = build_descriptor::<Leaf, Object>();
/// let b = build_descriptor::<Leaf, Object>();
/// assert!(std::ptr::eq(a, b));
/// assert!(a.finaliser().is_none());
/// ```
pub fn build_descriptor<T: Managed, B: Base>() -> &'static Descriptor {
    let key = TypeId::of::<VRepr<B, T>>();

    if let Some(descriptor) = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return *descriptor;
    }

    let mut map = registry().write().unwrap_or_else(PoisonError::into_inner);
    *map.entry(key).or_insert_with(|| {
        let descriptor: &'static Descriptor =
            global_arena().alloc_value(Descriptor::build::<T, B>());
        debug!(
            "built {} descriptor for {}: {} bytes, finaliser={}, notified={}, destructor={}",
            descriptor.kind,
            descriptor.name,
            descriptor.size(),
            descriptor.finaliser.is_some(),
            descriptor.notified.is_some(),
            descriptor.destructor.is_some()
        );
        descriptor
    })
}

/// Returns the number of descriptors built so far.
#[must_use]
pub fn registered_descriptors() -> usize {
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .len()
}

#[cfg(test)]
#[allow(dead_code)]
mod tests {
    use super::*;
    use crate::runtime::capability::{Capabilities, Finaliser, Notified};
    use crate::runtime::object::Cown;
    use std::mem::size_of;
    use std::sync::{Arc, Barrier};
    use std::thread;

    struct Leaf;
    impl Managed for Leaf {}

    struct Pair(u64, u64);
    impl Managed for Pair {}

    struct Named(String);
    impl Managed for Named {}

    struct Full(Vec<u8>);
    impl Managed for Full {
        const CAPABILITIES: Capabilities<Self> = Capabilities::NONE.finaliser().notified();
    }
    impl Finaliser for Full {
        fn finaliser(&mut self, _: NonNull<Object>, _: &mut ObjectStack) {
            self.0.clear();
        }
    }
    impl Notified for Full {
        fn notified(&mut self, _: NonNull<Object>) {
            self.0.push(1);
        }
    }

    #[test]
    fn test_descriptor_identity() {
        let a = build_descriptor::<Pair, Object>();
        let b = build_descriptor::<Pair, Object>();
        assert!(ptr::eq(a, b));
        assert!(registered_descriptors() >= 1);
    }

    #[test]
    fn test_distinct_per_base() {
        let object = build_descriptor::<Pair, Object>();
        let cown = build_descriptor::<Pair, Cown>();

        assert!(!ptr::eq(object, cown));
        assert_eq!(object.kind(), "object");
        assert_eq!(cown.kind(), "cown");
        assert!(cown.size() > object.size());
    }

    #[test]
    fn test_leaf_has_no_optional_entry_points() {
        let desc = build_descriptor::<Leaf, Object>();

        assert_eq!(desc.size(), size_of::<Object>());
        assert!(desc.finaliser().is_none());
        assert!(desc.notified().is_none());
        assert!(desc.destructor().is_none());
        assert!(desc.name().ends_with("Leaf"));
    }

    #[test]
    fn test_footprint_includes_header() {
        let desc = build_descriptor::<Pair, Object>();
        assert_eq!(desc.size(), size_of::<VRepr<Object, Pair>>());
        assert!(desc.size() >= size_of::<Object>() + size_of::<Pair>());
    }

    #[test]
    fn test_destructor_follows_drop_glue() {
        assert!(build_descriptor::<Named, Object>().destructor().is_some());
        assert!(build_descriptor::<Pair, Object>().destructor().is_none());
    }

    #[test]
    fn test_bound_capabilities() {
        let desc = build_descriptor::<Full, Object>();
        assert!(desc.finaliser().is_some());
        assert!(desc.notified().is_some());
        assert!(desc.destructor().is_some());
    }

    #[test]
    fn test_concurrent_first_use() {
        struct Racy;
        impl Managed for Racy {}

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    ptr::from_ref(build_descriptor::<Racy, Cown>()).addr()
                })
            })
            .collect();

        let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_debug_shows_absent_entry_points() {
        let text = format!("{:?}", build_descriptor::<Leaf, Object>());
        assert!(text.contains("finaliser: None"));
        assert!(text.contains("kind: \"object\""));
    }
}
