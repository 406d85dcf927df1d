//! Regions.
//!
//! A region is a reclamation domain: it owns a set of managed objects and
//! decides when their storage goes away. The adapters only need the small
//! [`RegionApi`] surface from it; [`Region`] is the arena-backed
//! implementation the crate ships.
//!
//! # Teardown
//!
//! Releasing (or dropping) a [`Region`] tears it down in two passes:
//!
//! 1. every member with a finaliser is finalised once, receiving
//!    [`Region::id`] as the identifier of the region and a shared collector
//!    for the nested regions it uncovers
//! 2. every member is destroyed once
//!
//! after which the arena returns all storage at once. Finalisers therefore
//! always run while every member of the region is still intact.

use crate::config;
use crate::error::Result;
use crate::runtime::capability::Managed;
use crate::runtime::descriptor::build_descriptor;
use crate::runtime::object::{Object, ObjectStack};
use regent_log::{debug, warn};
use regent_mem::{Arena, ArenaStats};
use std::alloc::Layout;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::ptr::NonNull;

/// Reclamation strategy of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionType {
    /// Reclaimed by tracing from the root.
    Trace,
    /// Reclaimed wholesale when the region goes.
    Arena,
    /// Reclaimed by reference counting.
    Rc,
}

impl fmt::Display for RegionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegionType::Trace => "trace",
            RegionType::Arena => "arena",
            RegionType::Rc => "rc",
        };
        f.write_str(name)
    }
}

/// What the region-object adapter needs from a region.
///
/// # Safety
///
/// The adapters write headers and values into the storage returned by
/// [`RegionApi::allocate`] without further checks. An implementation must
/// guarantee that:
///
/// - the returned storage is valid for reads and writes of `layout.size()`
///   bytes and aligned to `layout.align()`
/// - the storage is not handed out again, and stays valid until the region
///   is torn down
/// - [`RegionApi::insert`] never reclaims or moves the object it is given
///
/// A safe `impl` is rejected:
///
/// ```compile_fail,E0200
/// use regent::{Object, RegionApi, RegionType, Result};
/// use std::alloc::Layout;
/// use std::ptr::NonNull;
///
/// struct Dangling;
///
/// impl RegionApi for Dangling {
///     fn region_type(&self) -> RegionType {
///         RegionType::Arena
///     }
///
///     fn allocate(&self, _: Layout) -> Result<NonNull<u8>> {
///         Ok(NonNull::dangling())
///     }
///
///     fn insert(&self, _: NonNull<Object>) {}
/// }
/// ```
pub unsafe trait RegionApi {
    /// The region's reclamation strategy.
    fn region_type(&self) -> RegionType;

    /// Reserves storage for one object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`](crate::Error::OutOfMemory) if the
    /// region cannot grow.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>>;

    /// Admits a fully constructed, stamped object as a member.
    fn insert(&self, object: NonNull<Object>);
}

/// Value type of the header that identifies a region. Only its
/// descriptor is used; no value is ever stored.
#[allow(dead_code)]
struct RegionHeader;

impl Managed for RegionHeader {}

/// An arena-backed region.
///
/// Members are torn down by [`Region::release`] or when the region is
/// dropped. A region is confined to the thread that created it.
pub struct Region {
    region_type: RegionType,
    header: Box<Object>,
    arena: Arena,
    members: RefCell<Vec<NonNull<Object>>>,
    root: Cell<Option<NonNull<Object>>>,
}

impl Region {
    /// Creates an empty region. Its arena starts with the configured
    /// region chunk size.
    #[must_use]
    pub fn new(region_type: RegionType) -> Self {
        Region {
            region_type,
            header: Box::new(Object::new(build_descriptor::<RegionHeader, Object>())),
            arena: Arena::new(config::current().region_chunk_size),
            members: RefCell::new(Vec::new()),
            root: Cell::new(None),
        }
    }

    /// Creates a region and reserves storage for its first object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`](crate::Error::OutOfMemory) if the
    /// storage cannot be reserved.
    pub fn create(region_type: RegionType, layout: Layout) -> Result<(Region, NonNull<u8>)> {
        let region = Region::new(region_type);
        let storage = region.allocate(layout)?;
        debug!("created {} region with {} byte root", region_type, layout.size());
        Ok((region, storage))
    }

    /// Returns the identifier of this region.
    ///
    /// Every region is stamped with a header object of its own when it is
    /// created, so the identifier is unique among live regions and does not
    /// change for the region's lifetime, whether or not a root is set.
    /// Finalisers receive it during teardown.
    #[inline]
    #[must_use]
    pub fn id(&self) -> NonNull<Object> {
        NonNull::from(&*self.header)
    }

    /// Records `object` as the region's root.
    pub fn set_root(&self, object: NonNull<Object>) {
        debug_assert!(self.contains(object));
        self.root.set(Some(object));
    }

    /// Returns the root object, if one was set.
    #[must_use]
    pub fn root(&self) -> Option<NonNull<Object>> {
        self.root.get()
    }

    /// Returns the number of member objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    /// Returns `true` if the region has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    /// Returns `true` if `object` is a member of this region.
    #[must_use]
    pub fn contains(&self, object: NonNull<Object>) -> bool {
        self.members.borrow().contains(&object)
    }

    /// Returns the members in allocation order.
    #[must_use]
    pub fn objects(&self) -> Vec<NonNull<Object>> {
        self.members.borrow().clone()
    }

    /// Returns statistics of the backing arena.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    /// Tears the region down and returns the nested regions its
    /// finalisers discovered.
    pub fn release(mut self) -> ObjectStack {
        self.teardown()
    }

    fn teardown(&mut self) -> ObjectStack {
        let members = mem::take(self.members.get_mut());
        let region = self.id();
        let mut sub_regions = ObjectStack::new();

        if members.is_empty() {
            return sub_regions;
        }

        let mut finalised = 0usize;
        for &object in &members {
            // SAFETY: members are live, constructed, and owned by this region.
            if unsafe { Object::finalise(object, region, &mut sub_regions) } {
                finalised += 1;
            }
        }

        for &object in &members {
            // SAFETY: as above; nothing touches members after this pass.
            unsafe { Object::destruct(object) };
        }

        debug!(
            "released {} region: {} objects, {} finalised, {} sub-regions",
            self.region_type,
            members.len(),
            finalised,
            sub_regions.len()
        );
        sub_regions
    }
}

// SAFETY: storage comes from the region's own arena, which hands out each
// block once and frees nothing until the region is dropped. `insert` only
// records the object.
unsafe impl RegionApi for Region {
    fn region_type(&self) -> RegionType {
        self.region_type
    }

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        Ok(self.arena.alloc_layout(layout)?)
    }

    fn insert(&self, object: NonNull<Object>) {
        debug_assert!(self.arena.contains(object.cast()));
        self.members.borrow_mut().push(object);
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        let sub_regions = self.teardown();
        if !sub_regions.is_empty() {
            warn!(
                "dropped {} region left {} sub-regions unreleased",
                self.region_type,
                sub_regions.len()
            );
        }
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("type", &self.region_type)
            .field("id", &self.id())
            .field("members", &self.len())
            .field("root", &self.root.get())
            .field("arena", &self.arena.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_region_is_empty() {
        let region = Region::new(RegionType::Trace);

        assert!(region.is_empty());
        assert_eq!(region.root(), None);
        assert_eq!(region.region_type(), RegionType::Trace);
        assert_eq!(region.stats().chunk_count, 0);
    }

    #[test]
    fn test_create_reserves_storage() {
        let layout = Layout::from_size_align(48, 8).unwrap();
        let (region, storage) = Region::create(RegionType::Arena, layout).unwrap();

        assert_eq!(storage.as_ptr().addr() % 8, 0);
        assert!(region.stats().total_allocated >= 48);
        assert!(region.is_empty());
    }

    #[test]
    fn test_id_is_stable_and_distinct() {
        let a = Region::new(RegionType::Trace);
        let b = Region::new(RegionType::Trace);

        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.id());

        let before = a.id();
        let moved = a;
        assert_eq!(moved.id(), before);
    }

    #[test]
    fn test_release_of_empty_region() {
        let region = Region::new(RegionType::Rc);
        assert!(region.release().is_empty());
    }

    #[test]
    fn test_region_type_display() {
        assert_eq!(RegionType::Trace.to_string(), "trace");
        assert_eq!(RegionType::Arena.to_string(), "arena");
        assert_eq!(RegionType::Rc.to_string(), "rc");
    }
}
