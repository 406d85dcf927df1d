//! Allocation discipline.
//!
//! Managed storage belongs to its region or to the cown machinery, never to
//! the code that asked for it. Two rules follow:
//!
//! - **No direct deallocation.** [`release_storage`] is the only way to hand
//!   managed storage back directly, and it never frees anything. It exists
//!   for the construction paths: when building a value panics after its
//!   storage was reserved, the unwind passes through a [`ConstructionGuard`]
//!   and the storage stays with its owner.
//! - **No arrays.** Every managed object has exactly one header and one
//!   descriptor, so there is no way to allocate several values as one
//!   object. Arrays do not implement [`Managed`](crate::Managed) and cannot
//!   be made to, and the adapters have no array entry point:
//!
//! ```compile_fail
//! use regent::{Managed, Region, RegionType, V};
//!
//! struct Leaf;
//! impl Managed for Leaf {}
//!
//! let region = Region::new(RegionType::Arena);
//! let _ = V::<[Leaf; 4]>::allocate_in_region(&region, [Leaf, Leaf, Leaf, Leaf]);
//! ```
//!
//! ```compile_fail
//! use regent::Managed;
//!
//! struct Leaf;
//! impl Managed for [Leaf; 4] {}
//! ```

use crate::runtime::object::{Base, VRepr};
use regent_log::trace;
use std::mem;
use std::ptr::NonNull;

/// Directly deallocates managed storage, which is always a no-op.
///
/// Reclamation belongs to the owning region or cown; this call leaves the
/// storage, its header and its membership exactly as they were. Normal code
/// never needs it.
#[inline]
pub fn release_storage(storage: NonNull<u8>) {
    trace!("ignoring direct release of managed storage at {:p}", storage);
}

/// Unwind guard for in-place construction.
///
/// Created once storage is reserved and disarmed once the value is written.
/// If construction unwinds in between, the guard hands the storage to
/// [`release_storage`].
#[derive(Debug)]
#[must_use = "dropping the guard immediately releases the storage"]
pub struct ConstructionGuard {
    storage: NonNull<u8>,
}

impl ConstructionGuard {
    /// Guards `storage` until [`ConstructionGuard::disarm`] is called.
    pub fn new(storage: NonNull<u8>) -> Self {
        ConstructionGuard { storage }
    }

    /// Construction succeeded; the storage now holds a live value.
    pub fn disarm(self) {
        mem::forget(self);
    }
}

impl Drop for ConstructionGuard {
    fn drop(&mut self) {
        release_storage(self.storage);
    }
}

/// Builds a `T` with `init` and moves it into the value slot of the
/// `VRepr<B, T>` at `raw`. The header is left for the caller to stamp.
///
/// # Safety
///
/// `raw` must be valid for writes of `size_of::<VRepr<B, T>>()` bytes and
/// suitably aligned.
pub(crate) unsafe fn emplace<B: Base, T>(raw: NonNull<u8>, init: impl FnOnce() -> T) {
    let guard = ConstructionGuard::new(raw);
    let value = init();
    // SAFETY: guaranteed by the caller; nothing reads the slot before this.
    unsafe { VRepr::<B, T>::value_ptr(raw.cast()).as_ptr().write(value) };
    guard.disarm();
}
