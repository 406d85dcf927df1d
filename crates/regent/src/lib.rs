//! `Regent`: managed objects for a region-based concurrent runtime
//!
//! `Regent` is the layer between user data structures and the runtime that
//! collects, tears down and schedules them. For every managed type it builds
//! one immutable [`Descriptor`] holding the type's footprint and lifecycle
//! entry points, and it offers two allocation fronts that stamp storage with
//! that descriptor:
//!
//! - **Region objects** via [`V`]: allocated into a region, reclaimed only by
//!   the region
//! - **Concurrent owners** via [`VCown`]: reference-counted units of
//!   scheduling, optionally with trailing bytes for a foreign owner
//!
//! Managed storage is never freed directly; see [`runtime::discipline`].
//!
//! # Example
//!
//! ```rust
//! use regent::{Managed, Object, ObjectStack, Region, RegionType, V, VCown};
//! use std::ptr::NonNull;
//!
//! struct Node {
//!     next: Option<NonNull<Object>>,
//! }
//!
//! impl Managed for Node {
//!     fn trace(&self, stack: &mut ObjectStack) {
//!         if let Some(next) = self.next {
//!             stack.push(next);
//!         }
//!     }
//! }
//!
//! let region = Region::new(RegionType::Trace);
//! let tail = V::allocate_in_region(&region, Node { next: None }).unwrap();
//! let head = V::allocate_in_region(&region, Node { next: Some(tail.as_object()) }).unwrap();
//! assert_eq!(head.references().as_slice(), &[tail.as_object()]);
//!
//! // Cowns may move between threads, so their values must be `Send`.
//! struct Counter(u64);
//! impl Managed for Counter {}
//!
//! let owner = VCown::allocate_default(Counter(0)).unwrap();
//! assert_eq!(owner.reference_count(), 1);
//! ```

pub mod config;
pub mod error;
pub mod runtime;

pub use config::{ConfigError, RuntimeConfig};
pub use error::{Error, Result};
pub use runtime::{
    Base, Capabilities, ConstructionGuard, Cown, CownHandle, Descriptor, Finaliser, Managed,
    Notified, Object, ObjectHandle, ObjectStack, Region, RegionApi, RegionRoot, RegionType,
    ThreadAlloc, V, VCown, build_descriptor, has_destructor, has_finaliser, has_notified,
    registered_descriptors, release_storage,
};

/// Installs `config` for the process and applies its log level.
///
/// Until this is called every component uses [`RuntimeConfig::default`].
///
/// # Errors
///
/// Returns [`ConfigError`] if the configuration is invalid or a
/// configuration was already installed.
///
/// ```
/// let config = regent::RuntimeConfig::builder()
///     .log_level(regent_log::Level::Warn)
///     .build()
///     .unwrap();
/// regent::init(config).unwrap();
///
/// assert_eq!(regent::config().log_level, regent_log::Level::Warn);
/// assert!(regent::init(regent::RuntimeConfig::default()).is_err());
/// ```
pub fn init(config: RuntimeConfig) -> std::result::Result<(), ConfigError> {
    let installed = config::install(config)?;
    regent_log::set_level(installed.log_level);
    regent_log::debug!(
        "regent initialised: region chunk size {}",
        installed.region_chunk_size
    );
    Ok(())
}

/// Returns the active configuration.
#[must_use]
pub fn config() -> &'static RuntimeConfig {
    config::current()
}
