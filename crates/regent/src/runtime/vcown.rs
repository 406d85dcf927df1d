//! The concurrent-owner adapter.
//!
//! [`VCown<T>`] allocates a [`Managed`] value as a cown: a unit of state the
//! scheduler hands to one execution context at a time. Cowns sit behind a
//! [`Cown`] header that counts references and remembers which allocator the
//! storage came from.
//!
//! Storage comes from one of three places:
//!
//! | Entry point | Allocator | Size |
//! |-------------|-----------|------|
//! | [`VCown::allocate_default`] | [`ThreadAlloc`] | footprint |
//! | [`VCown::allocate_with`] | caller supplied | footprint |
//! | [`VCown::allocate_extended`] | [`ThreadAlloc`] | caller supplied, at least the footprint |
//!
//! An extended cown keeps the bytes past its footprint for a foreign owner;
//! [`CownHandle::trailing`] points at them.
//!
//! ```
//! use regent::{Managed, VCown};
//!
//! struct Counter(u64);
//! impl Managed for Counter {}
//!
//! let cown = VCown::allocate_extended(VCown::<Counter>::footprint() + 64, Counter(0)).unwrap();
//! assert_eq!(cown.trailing_len(), 64);
//!
//! let too_small = VCown::allocate_extended(1, Counter(0));
//! assert!(too_small.is_err());
//! ```

use crate::error::{Error, Result};
use crate::runtime::capability::Managed;
use crate::runtime::descriptor::{Descriptor, build_descriptor};
use crate::runtime::discipline::emplace;
use crate::runtime::object::{Cown, Object, VRepr};
use crate::runtime::thread_alloc::ThreadAlloc;
use regent_log::trace;
use regent_mem::Alloc;
use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Concurrent-owner adapter for `T`.
pub struct VCown<T>(PhantomData<fn() -> T>);

impl<T: Managed + Send> VCown<T> {
    /// Returns the cown descriptor of `T`.
    #[must_use]
    pub fn desc() -> &'static Descriptor {
        build_descriptor::<T, Cown>()
    }

    /// Bytes one cown of type `T` occupies, header included.
    #[must_use]
    pub fn footprint() -> usize {
        Self::desc().size()
    }

    /// Allocates `value` as a cown from the calling thread's allocator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the allocator refuses.
    pub fn allocate_default(value: T) -> Result<CownHandle<T>> {
        Self::construct(ThreadAlloc::get(), Self::footprint(), value)
    }

    /// Allocates `value` as a cown from `alloc`.
    ///
    /// The allocator must outlive the cown; the last release hands the
    /// storage back to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the allocator refuses.
    pub fn allocate_with<A: Alloc + 'static>(alloc: &'static A, value: T) -> Result<CownHandle<T>> {
        Self::construct(alloc, Self::footprint(), value)
    }

    /// Allocates `value` as a cown in a block of exactly `requested_size`
    /// bytes from the calling thread's allocator.
    ///
    /// The header and value take the front of the block; the rest is left
    /// untouched for a foreign owner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndersizedAllocation`] without allocating if
    /// `requested_size` is smaller than the footprint,
    /// [`Error::InvalidLayout`] if it cannot be allocated at all, and
    /// [`Error::OutOfMemory`] if the allocator refuses.
    pub fn allocate_extended(requested_size: usize, value: T) -> Result<CownHandle<T>> {
        let required = Self::footprint();
        if requested_size < required {
            return Err(Error::UndersizedAllocation {
                requested: requested_size,
                required,
            });
        }
        Self::construct(ThreadAlloc::get(), requested_size, value)
    }

    fn construct(alloc: &'static dyn Alloc, size: usize, value: T) -> Result<CownHandle<T>> {
        let descriptor = Self::desc();
        let align = descriptor.align();
        let layout =
            Layout::from_size_align(size, align).map_err(|_| Error::InvalidLayout { size, align })?;
        let raw = alloc.alloc(layout)?;

        // SAFETY: `raw` holds `size` bytes with the alignment of
        // `VRepr<Cown, T>`, and `size` is at least its footprint.
        let cown = unsafe {
            emplace::<Cown, T>(raw, || value);
            Cown::register_object(raw, descriptor, alloc, size)
        };

        trace!(
            "allocated cown {} ({} bytes) at {:p}",
            descriptor.name(),
            size,
            cown
        );
        Ok(CownHandle {
            cown,
            _marker: PhantomData,
        })
    }
}

/// An owning reference to a cown.
///
/// Cloning adds a reference; dropping removes one. When the last reference
/// goes the value is destroyed and the storage returned to its allocator.
pub struct CownHandle<T> {
    cown: NonNull<Cown>,
    _marker: PhantomData<T>,
}

// SAFETY: the header is only touched atomically, and access to the value
// goes through unsafe methods whose callers provide exclusion.
unsafe impl<T: Send> Send for CownHandle<T> {}
unsafe impl<T: Send> Sync for CownHandle<T> {}

impl<T> CownHandle<T> {
    fn header(&self) -> &Cown {
        // SAFETY: this handle keeps the cown alive.
        unsafe { self.cown.as_ref() }
    }

    /// Returns the common object header.
    #[inline]
    #[must_use]
    pub fn as_object(&self) -> NonNull<Object> {
        self.cown.cast()
    }

    /// Returns the descriptor the cown was stamped with.
    #[must_use]
    pub fn descriptor(&self) -> &'static Descriptor {
        self.header().object().descriptor()
    }

    /// Returns the number of live handles.
    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.header().reference_count()
    }

    /// Returns the size of the cown's block in bytes.
    #[must_use]
    pub fn allocation_size(&self) -> usize {
        self.header().allocation_size()
    }

    /// Returns the first byte past the footprint.
    ///
    /// The bytes from here to the end of the block belong to whoever asked
    /// for the extended allocation; the runtime never reads or writes them.
    #[must_use]
    pub fn trailing(&self) -> NonNull<u8> {
        // SAFETY: the footprint lies within the block, so the result is at
        // most one past its end.
        unsafe { self.cown.cast::<u8>().add(self.descriptor().size()) }
    }

    /// Returns the number of trailing bytes.
    #[must_use]
    pub fn trailing_len(&self) -> usize {
        self.allocation_size() - self.descriptor().size()
    }

    /// Returns the value.
    ///
    /// # Safety
    ///
    /// The caller must hold the scheduler's grant for this cown, or
    /// otherwise ensure nothing mutates the value concurrently.
    #[must_use]
    pub unsafe fn get(&self) -> &T {
        // SAFETY: guaranteed by the caller.
        unsafe { VRepr::<Cown, T>::value_ptr(self.as_object()).as_ref() }
    }

    /// Returns the value mutably.
    ///
    /// # Safety
    ///
    /// The caller must have exclusive access to the value for the lifetime
    /// of the returned borrow.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self) -> &mut T {
        // SAFETY: guaranteed by the caller.
        unsafe { VRepr::<Cown, T>::value_ptr(self.as_object()).as_mut() }
    }

    /// Delivers a wake notification. Returns `false` if the type does not
    /// accept notifications.
    ///
    /// # Safety
    ///
    /// No other notification or access to the value may run concurrently.
    pub unsafe fn notify(&self) -> bool {
        // SAFETY: guaranteed by the caller.
        unsafe { Object::notified(self.as_object()) }
    }
}

impl<T> Clone for CownHandle<T> {
    fn clone(&self) -> Self {
        Cown::acquire(self.cown);
        CownHandle {
            cown: self.cown,
            _marker: PhantomData,
        }
    }
}

impl<T> Drop for CownHandle<T> {
    fn drop(&mut self) {
        // SAFETY: this handle owns one reference and is going away.
        unsafe { Cown::release(self.cown) };
    }
}

impl<T> fmt::Debug for CownHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CownHandle")
            .field("cown", self.header())
            .field("at", &self.cown)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::capability::{Capabilities, Notified};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(u64);
    impl Managed for Counter {}

    struct Bell {
        rings: usize,
    }
    impl Managed for Bell {
        const CAPABILITIES: Capabilities<Self> = Capabilities::NONE.notified();
    }
    impl Notified for Bell {
        fn notified(&mut self, _: NonNull<Object>) {
            self.rings += 1;
        }
    }

    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Tracked;
    impl Managed for Tracked {}
    impl Drop for Tracked {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_footprint_includes_cown_header() {
        assert!(VCown::<Counter>::footprint() >= std::mem::size_of::<Cown>() + 8);
        assert_eq!(VCown::<Counter>::desc().kind(), "cown");
    }

    #[test]
    fn test_allocate_default() {
        let cown = VCown::allocate_default(Counter(11)).unwrap();

        assert_eq!(unsafe { cown.get() }.0, 11);
        assert_eq!(cown.reference_count(), 1);
        assert_eq!(cown.allocation_size(), VCown::<Counter>::footprint());
        assert_eq!(cown.trailing_len(), 0);
        assert!(std::ptr::eq(cown.descriptor(), VCown::<Counter>::desc()));
    }

    #[test]
    fn test_undersized_extended_is_rejected() {
        let footprint = VCown::<Counter>::footprint();
        let err = VCown::allocate_extended(footprint - 1, Counter(0)).unwrap_err();

        assert_eq!(
            err,
            Error::UndersizedAllocation {
                requested: footprint - 1,
                required: footprint
            }
        );
    }

    #[test]
    fn test_extended_trailing_region() {
        let footprint = VCown::<Counter>::footprint();
        let cown = VCown::allocate_extended(footprint + 64, Counter(1)).unwrap();

        assert_eq!(cown.trailing_len(), 64);
        assert_eq!(
            cown.trailing().as_ptr().addr(),
            cown.as_object().as_ptr().addr() + footprint
        );

        unsafe { cown.trailing().as_ptr().write_bytes(0xEE, 64) };
        assert_eq!(unsafe { cown.get() }.0, 1);
    }

    #[test]
    fn test_notify() {
        let bell = VCown::allocate_default(Bell { rings: 0 }).unwrap();
        let counter = VCown::allocate_default(Counter(0)).unwrap();

        assert!(unsafe { bell.notify() });
        assert!(unsafe { bell.notify() });
        assert!(!unsafe { counter.notify() });
        assert_eq!(unsafe { bell.get() }.rings, 2);
    }

    #[test]
    fn test_last_release_destroys_once() {
        let before = DROPS.load(Ordering::SeqCst);

        let a = VCown::allocate_default(Tracked).unwrap();
        let b = a.clone();
        assert_eq!(a.reference_count(), 2);

        drop(a);
        assert_eq!(DROPS.load(Ordering::SeqCst), before);
        assert_eq!(b.reference_count(), 1);

        drop(b);
        assert_eq!(DROPS.load(Ordering::SeqCst), before + 1);
    }
}
