//! Object headers and the dispatch surface used by the rest of the runtime.
//!
//! Every managed object starts with an [`Object`] header that binds its
//! storage to a [`Descriptor`]. Region objects use the bare header; concurrent
//! owners use a [`Cown`] header, which begins with an `Object` and adds
//! ownership bookkeeping.
//!
//! # Memory Layout
//!
//! ```text
//! region object                 cown
//! +--------------------+        +--------------------+
//! | Object             |        | Object             |
//! |   descriptor       |        |   descriptor       |
//! |   status           |        |   status           |
//! +--------------------+        | rc, size, alloc    |
//! | T                  |        +--------------------+
//! +--------------------+        | T                  |
//!                               +--------------------+
//!                               | trailing bytes     |  (extended only)
//!                               +--------------------+
//! ```
//!
//! The footprint of a type is the size of the `#[repr(C)]` pair of header
//! and value, so the value always lives at the same offset for a given base.
//!
//! # Dispatch
//!
//! The collector, region teardown, scheduler and reclaimer never see `T`.
//! They call [`Object::trace`], [`Object::finalise`], [`Object::notified`]
//! and [`Object::destruct`], which go through the descriptor and skip absent
//! entry points without making a call.

use crate::runtime::descriptor::Descriptor;
use regent_log::{trace, warn};
use regent_mem::Alloc;
use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{self, AtomicU32, AtomicUsize, Ordering};

/// Status bit: the value's teardown has run.
const DESTROYED: u32 = 1;

/// Header shared by every managed object.
#[repr(C)]
pub struct Object {
    descriptor: &'static Descriptor,
    status: AtomicU32,
}

impl Object {
    /// Stamps `raw` with a region-object header for `descriptor`.
    ///
    /// # Safety
    ///
    /// `raw` must be valid for writes of `descriptor.size()` bytes and
    /// aligned to `descriptor.align()`.
    pub(crate) unsafe fn register_object(
        raw: NonNull<u8>,
        descriptor: &'static Descriptor,
    ) -> NonNull<Object> {
        let object = raw.cast::<Object>();
        // SAFETY: guaranteed by the caller.
        unsafe { object.as_ptr().write(Object::new(descriptor)) };
        object
    }

    pub(crate) const fn new(descriptor: &'static Descriptor) -> Self {
        Object {
            descriptor,
            status: AtomicU32::new(0),
        }
    }

    /// Returns the descriptor this object was stamped with.
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &'static Descriptor {
        self.descriptor
    }

    /// Returns `true` once [`Object::destruct`] has run for this object.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.status.load(Ordering::Acquire) & DESTROYED != 0
    }

    /// Pushes every managed object referenced by `this` onto `stack`.
    ///
    /// # Safety
    ///
    /// `this` must point to a live, fully constructed managed object that is
    /// not being mutated concurrently.
    #[inline]
    pub unsafe fn trace(this: NonNull<Object>, stack: &mut ObjectStack) {
        // SAFETY: guaranteed by the caller.
        let trace = unsafe { this.as_ref() }.descriptor.trace();
        unsafe { trace(this, stack) }
    }

    /// Runs the finaliser of `this`, if its type has one.
    ///
    /// `region` identifies the owning region (see
    /// [`Region::id`](crate::Region::id)), and nested regions the finaliser
    /// discovers are pushed onto `sub_regions`. Returns `false` without
    /// making a call if the type has no finaliser or the value was already
    /// destroyed.
    ///
    /// # Safety
    ///
    /// `this` must point to a fully constructed managed object, and the
    /// caller must have exclusive access to it.
    pub unsafe fn finalise(
        this: NonNull<Object>,
        region: NonNull<Object>,
        sub_regions: &mut ObjectStack,
    ) -> bool {
        // SAFETY: guaranteed by the caller.
        let header = unsafe { this.as_ref() };
        if header.is_destroyed() {
            return false;
        }

        match header.descriptor.finaliser() {
            Some(finaliser) => {
                unsafe { finaliser(this, region, sub_regions) };
                true
            }
            None => false,
        }
    }

    /// Delivers a wake notification to `this`, if its type accepts one and
    /// the value has not been destroyed.
    ///
    /// # Safety
    ///
    /// `this` must point to a fully constructed managed object, and no
    /// other notification for it may run concurrently.
    pub unsafe fn notified(this: NonNull<Object>) -> bool {
        // SAFETY: guaranteed by the caller.
        let header = unsafe { this.as_ref() };
        if header.is_destroyed() {
            return false;
        }

        match header.descriptor.notified() {
            Some(notified) => {
                unsafe { notified(this) };
                true
            }
            None => false,
        }
    }

    /// Tears down the value of `this` before its storage is reclaimed.
    ///
    /// The type's destructor runs at most once per object; later requests
    /// are logged and ignored. Returns `true` if this call marked the object
    /// destroyed (whether or not the type needed a destructor).
    ///
    /// # Safety
    ///
    /// `this` must point to a fully constructed managed object, the caller
    /// must have exclusive access to it, and the value must not be used
    /// after this returns.
    pub unsafe fn destruct(this: NonNull<Object>) -> bool {
        // SAFETY: guaranteed by the caller.
        let header = unsafe { this.as_ref() };
        let previous = header.status.fetch_or(DESTROYED, Ordering::AcqRel);

        if previous & DESTROYED != 0 {
            warn!(
                "ignoring repeated destroy of {} at {:p}",
                header.descriptor.name(),
                this
            );
            #[cfg(feature = "destroy_backtrace")]
            warn!("{:?}", backtrace::Backtrace::new());
            return false;
        }

        if let Some(destructor) = header.descriptor.destructor() {
            unsafe { destructor(this) };
        }
        true
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.descriptor.name())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Header of a concurrent owner.
///
/// Besides the common [`Object`] header a cown records how many handles
/// refer to it and where its storage came from, so the last release can
/// hand the block back to the right allocator.
#[repr(C)]
pub struct Cown {
    object: Object,
    rc: AtomicUsize,
    size: usize,
    alloc: &'static dyn Alloc,
}

impl Cown {
    /// Stamps `raw` with a cown header and registers one owning reference.
    ///
    /// `size` is the number of bytes `raw` was allocated with; it is at
    /// least the descriptor's footprint.
    ///
    /// # Safety
    ///
    /// `raw` must have been allocated from `alloc` with `size` bytes and the
    /// descriptor's alignment, and `descriptor` must describe a cown layout.
    pub(crate) unsafe fn register_object(
        raw: NonNull<u8>,
        descriptor: &'static Descriptor,
        alloc: &'static dyn Alloc,
        size: usize,
    ) -> NonNull<Cown> {
        debug_assert!(size >= descriptor.size());

        let cown = raw.cast::<Cown>();
        // SAFETY: guaranteed by the caller.
        unsafe {
            cown.as_ptr().write(Cown {
                object: Object::new(descriptor),
                rc: AtomicUsize::new(1),
                size,
                alloc,
            });
        }
        cown
    }

    /// Returns the common object header.
    #[inline]
    #[must_use]
    pub fn object(&self) -> &Object {
        &self.object
    }

    /// Returns the number of live references.
    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.rc.load(Ordering::Acquire)
    }

    /// Returns the number of bytes the cown was allocated with.
    #[must_use]
    pub fn allocation_size(&self) -> usize {
        self.size
    }

    /// Adds a reference.
    pub(crate) fn acquire(this: NonNull<Cown>) {
        // SAFETY: callers hold a reference, so the cown is live.
        let old = unsafe { this.as_ref() }.rc.fetch_add(1, Ordering::Relaxed);
        assert!(old < usize::MAX / 2, "cown reference count overflow");
    }

    /// Drops a reference. The last release destroys the value and returns
    /// the storage to its allocator. Returns `true` if the cown was
    /// reclaimed.
    ///
    /// # Safety
    ///
    /// The caller must own one of the cown's references and not use `this`
    /// afterwards.
    pub(crate) unsafe fn release(this: NonNull<Cown>) -> bool {
        // SAFETY: the caller owns a reference.
        let cown = unsafe { this.as_ref() };
        if cown.rc.fetch_sub(1, Ordering::Release) != 1 {
            return false;
        }
        atomic::fence(Ordering::Acquire);

        let alloc = cown.alloc;
        let descriptor = cown.object.descriptor;
        // SAFETY: this exact layout was built and validated at allocation.
        let layout = unsafe { Layout::from_size_align_unchecked(cown.size, descriptor.align()) };

        // SAFETY: that was the last reference.
        unsafe { Object::destruct(this.cast()) };
        trace!("reclaiming cown {} at {:p}", descriptor.name(), this);

        // SAFETY: the block came from `alloc` with this layout.
        unsafe { alloc.dealloc(this.cast(), layout) };
        true
    }
}

impl fmt::Debug for Cown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cown")
            .field("type", &self.object.descriptor.name())
            .field("rc", &self.reference_count())
            .field("size", &self.size)
            .finish()
    }
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Object {}
    impl Sealed for super::Cown {}
}

/// A header a managed value can be laid out behind: [`Object`] for region
/// objects, [`Cown`] for concurrent owners.
pub trait Base: private::Sealed + Sized + 'static {
    /// Name used in diagnostics.
    const KIND: &'static str;
}

impl Base for Object {
    const KIND: &'static str = "object";
}

impl Base for Cown {
    const KIND: &'static str = "cown";
}

/// In-memory representation of a managed `T` behind header `B`.
#[repr(C)]
pub(crate) struct VRepr<B, T> {
    base: B,
    value: T,
}

impl<B: Base, T> VRepr<B, T> {
    /// Returns a pointer to the value stored behind `object`.
    ///
    /// # Safety
    ///
    /// `object` must be the start of a `VRepr<B, T>` allocation.
    #[inline]
    pub(crate) unsafe fn value_ptr(object: NonNull<Object>) -> NonNull<T> {
        let repr = object.cast::<Self>().as_ptr();
        // SAFETY: guaranteed by the caller; no reference to the value is made.
        unsafe { NonNull::new_unchecked(&raw mut (*repr).value) }
    }
}

/// Output collector for reference enumeration and finalisation.
///
/// [`Object::trace`] pushes every outgoing reference of an object here, and
/// finalisers push the nested regions they uncover.
#[derive(Default)]
pub struct ObjectStack {
    objects: Vec<NonNull<Object>>,
}

impl ObjectStack {
    /// Creates an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        ObjectStack { objects: Vec::new() }
    }

    /// Pushes an object.
    #[inline]
    pub fn push(&mut self, object: NonNull<Object>) {
        self.objects.push(object);
    }

    /// Pops the most recently pushed object.
    #[inline]
    pub fn pop(&mut self) -> Option<NonNull<Object>> {
        self.objects.pop()
    }

    /// Returns the number of objects on the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Returns `true` if `object` is on the stack.
    #[must_use]
    pub fn contains(&self, object: NonNull<Object>) -> bool {
        self.objects.contains(&object)
    }

    /// Returns the objects in push order.
    #[must_use]
    pub fn as_slice(&self) -> &[NonNull<Object>] {
        &self.objects
    }
}

impl fmt::Debug for ObjectStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.objects).finish()
    }
}
