//! Lifecycle capabilities of managed types.
//!
//! A user type becomes manageable by implementing [`Managed`]. Reference
//! enumeration (`trace`) is always part of the contract and defaults to
//! reporting no references. The other lifecycle operations are optional:
//!
//! - **finaliser**: implement [`Finaliser`] and bind it with
//!   [`Capabilities::finaliser`]
//! - **notified**: implement [`Notified`] and bind it with
//!   [`Capabilities::notified`]
//! - **destructor**: implied by the type having drop glue
//!   ([`std::mem::needs_drop`])
//!
//! Binding happens in the `const` [`Managed::CAPABILITIES`] item. Each
//! binder only exists for types implementing the matching capability trait,
//! so a capability bound with a mismatched signature is rejected by the
//! compiler at that line, and an unbound capability costs nothing at run
//! time: its descriptor slot is simply empty.
//!
//! # Example
//!
//! ```
//! use regent::{Capabilities, Finaliser, Managed, Object, ObjectStack};
//! use std::ptr::NonNull;
//!
//! struct Node {
//!     next: Option<NonNull<Object>>,
//!     closed: bool,
//! }
//!
//! impl Managed for Node {
//!     const CAPABILITIES: Capabilities<Self> = Capabilities::NONE.finaliser();
//!
//!     fn trace(&self, stack: &mut ObjectStack) {
//!         if let Some(next) = self.next {
//!             stack.push(next);
//!         }
//!     }
//! }
//!
//! impl Finaliser for Node {
//!     fn finaliser(&mut self, _region: NonNull<Object>, _sub_regions: &mut ObjectStack) {
//!         self.closed = true;
//!     }
//! }
//!
//! assert!(regent::has_finaliser::<Node>());
//! assert!(!regent::has_notified::<Node>());
//! ```

use crate::runtime::object::{Object, ObjectStack};
use std::fmt;
use std::ptr::NonNull;

/// A type that can live as a managed object.
pub trait Managed: Sized + 'static {
    /// Optional lifecycle operations this type binds.
    const CAPABILITIES: Capabilities<Self> = Capabilities::NONE;

    /// Pushes every managed object this value references onto `stack`.
    ///
    /// Types that hold references to other managed objects must override
    /// this; the collector cannot discover edges it is not told about. It
    /// may be called any number of times and must not mutate the value.
    fn trace(&self, stack: &mut ObjectStack) {
        let _ = stack;
    }
}

/// Teardown run when the owning region is torn down.
///
/// Implementing this trait does not bind the capability. The type must also
/// bind it in [`Managed::CAPABILITIES`] with [`Capabilities::finaliser`];
/// otherwise the finaliser is absent, its descriptor slot stays empty and
/// [`has_finaliser`](crate::has_finaliser) reports `false`.
pub trait Finaliser: Managed {
    /// `region` is the [`Region::id`](crate::Region::id) of the region being
    /// torn down. Nested regions that now need their own finalisation are
    /// pushed onto `sub_regions`.
    fn finaliser(&mut self, region: NonNull<Object>, sub_regions: &mut ObjectStack);
}

/// Wake callback delivered to a concurrent owner by the scheduler.
///
/// As with [`Finaliser`], the trait alone is not enough: without
/// [`Capabilities::notified`] in [`Managed::CAPABILITIES`] the capability is
/// absent and notifications are skipped.
pub trait Notified: Managed {
    /// `this` is the object the notification was delivered to.
    fn notified(&mut self, this: NonNull<Object>);
}

pub(crate) type FinaliserHook<T> = fn(&mut T, NonNull<Object>, &mut ObjectStack);
pub(crate) type NotifiedHook<T> = fn(&mut T, NonNull<Object>);

/// The optional lifecycle operations bound for `T`.
pub struct Capabilities<T> {
    pub(crate) finaliser: Option<FinaliserHook<T>>,
    pub(crate) notified: Option<NotifiedHook<T>>,
}

impl<T> Capabilities<T> {
    /// No optional operations.
    pub const NONE: Self = Capabilities {
        finaliser: None,
        notified: None,
    };

    /// Returns `true` if a finaliser is bound.
    #[must_use]
    pub const fn has_finaliser(&self) -> bool {
        self.finaliser.is_some()
    }

    /// Returns `true` if a notification handler is bound.
    #[must_use]
    pub const fn has_notified(&self) -> bool {
        self.notified.is_some()
    }
}

impl<T: Finaliser> Capabilities<T> {
    /// Binds [`Finaliser::finaliser`].
    #[must_use]
    pub const fn finaliser(self) -> Self {
        let hook: FinaliserHook<T> = T::finaliser;
        Capabilities {
            finaliser: Some(hook),
            notified: self.notified,
        }
    }
}

impl<T: Notified> Capabilities<T> {
    /// Binds [`Notified::notified`].
    #[must_use]
    pub const fn notified(self) -> Self {
        let hook: NotifiedHook<T> = T::notified;
        Capabilities {
            finaliser: self.finaliser,
            notified: Some(hook),
        }
    }
}

impl<T> Clone for Capabilities<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Capabilities<T> {}

impl<T> fmt::Debug for Capabilities<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("finaliser", &self.has_finaliser())
            .field("notified", &self.has_notified())
            .finish()
    }
}

/// Returns `true` if `T` binds a finaliser.
#[must_use]
pub const fn has_finaliser<T: Managed>() -> bool {
    T::CAPABILITIES.has_finaliser()
}

/// Returns `true` if `T` binds a notification handler.
#[must_use]
pub const fn has_notified<T: Managed>() -> bool {
    T::CAPABILITIES.has_notified()
}

/// Returns `true` if `T` has teardown work to do before its storage is
/// reclaimed.
#[must_use]
pub const fn has_destructor<T>() -> bool {
    std::mem::needs_drop::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;
    impl Managed for Plain {}

    struct Closing;
    impl Managed for Closing {
        const CAPABILITIES: Capabilities<Self> = Capabilities::NONE.finaliser();
    }
    impl Finaliser for Closing {
        fn finaliser(&mut self, _: NonNull<Object>, _: &mut ObjectStack) {}
    }

    struct Waking;
    impl Managed for Waking {
        const CAPABILITIES: Capabilities<Self> = Capabilities::NONE.notified();
    }
    impl Notified for Waking {
        fn notified(&mut self, _: NonNull<Object>) {}
    }

    struct Both;
    impl Managed for Both {
        const CAPABILITIES: Capabilities<Self> = Capabilities::NONE.notified().finaliser();
    }
    impl Finaliser for Both {
        fn finaliser(&mut self, _: NonNull<Object>, _: &mut ObjectStack) {}
    }
    impl Notified for Both {
        fn notified(&mut self, _: NonNull<Object>) {}
    }

    // Implements the trait but never binds it.
    struct Unbound;
    impl Managed for Unbound {}
    impl Finaliser for Unbound {
        fn finaliser(&mut self, _: NonNull<Object>, _: &mut ObjectStack) {}
    }
    impl Notified for Unbound {
        fn notified(&mut self, _: NonNull<Object>) {}
    }

    #[test]
    fn test_capability_queries() {
        assert!(!has_finaliser::<Plain>());
        assert!(!has_notified::<Plain>());

        assert!(has_finaliser::<Closing>());
        assert!(!has_notified::<Closing>());

        assert!(!has_finaliser::<Waking>());
        assert!(has_notified::<Waking>());

        assert!(has_finaliser::<Both>());
        assert!(has_notified::<Both>());
    }

    #[test]
    fn test_unbound_capability_is_absent() {
        let descriptor = crate::runtime::descriptor::build_descriptor::<Unbound, Object>();

        assert!(!has_finaliser::<Unbound>());
        assert!(!has_notified::<Unbound>());
        assert!(descriptor.finaliser().is_none());
        assert!(descriptor.notified().is_none());
    }

    #[test]
    fn test_capability_queries_are_const() {
        const CLOSING: bool = has_finaliser::<Closing>();
        const PLAIN_DROPS: bool = has_destructor::<Plain>();
        assert!(CLOSING);
        assert!(!PLAIN_DROPS);
    }

    #[test]
    fn test_destructor_query() {
        struct Owns(#[allow(dead_code)] Vec<u8>);

        assert!(!has_destructor::<Plain>());
        assert!(!has_destructor::<[u64; 4]>());
        assert!(has_destructor::<Owns>());
        assert!(has_destructor::<String>());
    }

    #[test]
    fn test_default_trace_reports_nothing() {
        let mut stack = ObjectStack::new();
        Plain.trace(&mut stack);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_debug() {
        let caps = Both::CAPABILITIES;
        assert_eq!(
            format!("{caps:?}"),
            "Capabilities { finaliser: true, notified: true }"
        );
    }
}
