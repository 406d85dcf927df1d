//! `Regent` runtime module.
//!
//! This module turns user types into managed objects:
//!
//! - [`capability`]: the [`Managed`] contract and optional lifecycle capabilities
//! - [`descriptor`]: per-type descriptors and their registry
//! - [`object`]: object and cown headers, and descriptor dispatch
//! - [`vobject`]: the region-object adapter [`V`]
//! - [`vcown`]: the concurrent-owner adapter [`VCown`]
//! - [`region`]: the region interface and the arena-backed [`Region`]
//! - [`thread_alloc`]: the ambient per-thread allocator
//! - [`discipline`]: the no-op deallocation guard
//!
//! # Data Flow
//!
//! ```text
//! T: Managed -> Capabilities -> Descriptor (once per type)
//!                                   |
//!            V::allocate_*  --------+-------- VCown::allocate_*
//!                 |                                 |
//!          Region storage                    Alloc storage
//!                 \                                 /
//!                  +--- stamp header, register ----+
//! ```

pub mod capability;
pub mod descriptor;
pub mod discipline;
pub mod object;
pub mod region;
pub mod thread_alloc;
pub mod vcown;
pub mod vobject;

pub use capability::{
    Capabilities, Finaliser, Managed, Notified, has_destructor, has_finaliser, has_notified,
};
pub use descriptor::{
    DestructorFn, Descriptor, FinaliserFn, NotifiedFn, TraceFn, build_descriptor,
    registered_descriptors,
};
pub use discipline::{ConstructionGuard, release_storage};
pub use object::{Base, Cown, Object, ObjectStack};
pub use region::{Region, RegionApi, RegionType};
pub use thread_alloc::ThreadAlloc;
pub use vcown::{CownHandle, VCown};
pub use vobject::{ObjectHandle, RegionRoot, V};
