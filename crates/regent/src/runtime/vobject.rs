//! The region-object adapter.
//!
//! [`V<T>`] allocates values of a [`Managed`] type as region objects: the
//! value sits behind a bare [`Object`] header, is stamped with the type's
//! descriptor, and is reclaimed only by the region that owns it.
//!
//! ```
//! use regent::{Managed, Region, RegionType, V};
//!
//! struct Point { x: i32, y: i32 }
//! impl Managed for Point {}
//!
//! let region = Region::new(RegionType::Trace);
//! let p = V::allocate_in_region(&region, Point { x: 1, y: 2 }).unwrap();
//! assert_eq!(p.get().x + p.get().y, 3);
//! assert!(region.contains(p.as_object()));
//!
//! let root = V::allocate_as_new_region(RegionType::Arena, Point { x: 0, y: 0 }).unwrap();
//! assert_eq!(root.region().root(), Some(root.root().as_object()));
//! ```

use crate::error::Result;
use crate::runtime::capability::Managed;
use crate::runtime::descriptor::{Descriptor, build_descriptor};
use crate::runtime::discipline::emplace;
use crate::runtime::object::{Object, ObjectStack, VRepr};
use crate::runtime::region::{Region, RegionApi, RegionType};
use regent_log::trace;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Region-object adapter for `T`.
pub struct V<T>(PhantomData<fn() -> T>);

impl<T: Managed> V<T> {
    /// Returns the region-object descriptor of `T`.
    #[must_use]
    pub fn desc() -> &'static Descriptor {
        build_descriptor::<T, Object>()
    }

    /// Bytes one region object of type `T` occupies, header included.
    #[must_use]
    pub fn footprint() -> usize {
        Self::desc().size()
    }

    /// Allocates `value` as a new member of `region`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`](crate::Error::OutOfMemory) if the
    /// region cannot provide storage.
    pub fn allocate_in_region<'r, R>(region: &'r R, value: T) -> Result<ObjectHandle<'r, T>>
    where
        R: RegionApi + ?Sized,
    {
        Self::construct_in_region(region, || value)
    }

    /// Allocates storage in `region` and builds the value in place with
    /// `init`.
    ///
    /// The object is stamped and admitted to the region only after `init`
    /// returns. If `init` panics the reserved storage is left to the
    /// region and nothing becomes a member.
    ///
    /// # Errors
    ///
    /// See [`V::allocate_in_region`].
    pub fn construct_in_region<'r, R>(
        region: &'r R,
        init: impl FnOnce() -> T,
    ) -> Result<ObjectHandle<'r, T>>
    where
        R: RegionApi + ?Sized,
    {
        let descriptor = Self::desc();
        let raw = region.allocate(descriptor.layout())?;
        let object = Self::stamp(raw, descriptor, init);
        region.insert(object);

        trace!(
            "allocated {} in {} region at {:p}",
            descriptor.name(),
            region.region_type(),
            object
        );
        Ok(ObjectHandle::new(object))
    }

    /// Creates a region of `region_type` whose root is `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`](crate::Error::OutOfMemory) if the
    /// region's first chunk cannot be allocated.
    pub fn allocate_as_new_region(region_type: RegionType, value: T) -> Result<RegionRoot<T>> {
        let descriptor = Self::desc();
        let (region, raw) = Region::create(region_type, descriptor.layout())?;
        let object = Self::stamp(raw, descriptor, || value);
        region.insert(object);
        region.set_root(object);

        trace!(
            "allocated {} as root of new {} region at {:p}",
            descriptor.name(),
            region_type,
            object
        );
        Ok(RegionRoot {
            region,
            object,
            _marker: PhantomData,
        })
    }

    fn stamp(
        raw: NonNull<u8>,
        descriptor: &'static Descriptor,
        init: impl FnOnce() -> T,
    ) -> NonNull<Object> {
        // SAFETY: `raw` came from `RegionApi::allocate` with this
        // descriptor's layout, which is the layout of `VRepr<Object, T>`, so
        // the trait's contract makes it valid and aligned for the write.
        unsafe {
            emplace::<Object, T>(raw, init);
            Object::register_object(raw, descriptor)
        }
    }
}

/// A region object of type `T`, valid while its region is borrowed.
pub struct ObjectHandle<'r, T> {
    object: NonNull<Object>,
    _region: PhantomData<&'r T>,
}

impl<'r, T: Managed> ObjectHandle<'r, T> {
    fn new(object: NonNull<Object>) -> Self {
        ObjectHandle {
            object,
            _region: PhantomData,
        }
    }

    /// Returns the object header, for handing to the collector or storing
    /// in another object's fields.
    #[inline]
    #[must_use]
    pub fn as_object(&self) -> NonNull<Object> {
        self.object
    }

    /// Returns the descriptor the object was stamped with.
    #[must_use]
    pub fn descriptor(&self) -> &'static Descriptor {
        // SAFETY: the object is live while the region is borrowed.
        unsafe { self.object.as_ref() }.descriptor()
    }

    /// Returns the value.
    #[must_use]
    pub fn get(&self) -> &'r T {
        // SAFETY: the region keeps the value alive for 'r, and teardown
        // needs the region by value.
        unsafe { VRepr::<Object, T>::value_ptr(self.object).as_ref() }
    }

    /// Returns the value mutably.
    ///
    /// # Safety
    ///
    /// No other reference to the value may exist for the lifetime of the
    /// returned borrow.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self) -> &'r mut T {
        // SAFETY: guaranteed by the caller.
        unsafe { VRepr::<Object, T>::value_ptr(self.object).as_mut() }
    }

    /// Collects the object's outgoing references.
    #[must_use]
    pub fn references(&self) -> ObjectStack {
        let mut stack = ObjectStack::new();
        // SAFETY: the object is live and only read.
        unsafe { Object::trace(self.object, &mut stack) };
        stack
    }
}

impl<T> Clone for ObjectHandle<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ObjectHandle<'_, T> {}

impl<T> fmt::Debug for ObjectHandle<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectHandle").field(&self.object).finish()
    }
}

/// A fresh region together with its root object.
pub struct RegionRoot<T> {
    region: Region,
    object: NonNull<Object>,
    _marker: PhantomData<T>,
}

impl<T: Managed> RegionRoot<T> {
    /// Returns the region.
    #[must_use]
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Returns the root object.
    #[must_use]
    pub fn root(&self) -> ObjectHandle<'_, T> {
        ObjectHandle::new(self.object)
    }

    /// Gives up the typed view and returns the region.
    #[must_use]
    pub fn into_region(self) -> Region {
        self.region
    }

    /// Tears the region down. See [`Region::release`].
    pub fn release(self) -> ObjectStack {
        self.region.release()
    }
}

impl<T> fmt::Debug for RegionRoot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionRoot")
            .field("region", &self.region)
            .field("root", &self.object)
            .finish()
    }
}
