//! The ambient per-thread allocator.
//!
//! [`VCown::allocate_default`](crate::VCown::allocate_default) draws storage
//! from whatever allocator the current thread has installed. Threads start
//! on the process allocator; a scope can swap in another with
//! [`ThreadAlloc::using`].

use regent_mem::{Alloc, SystemAlloc};
use std::cell::Cell;

static SYSTEM: SystemAlloc = SystemAlloc;

thread_local! {
    static CURRENT: Cell<Option<&'static dyn Alloc>> = const { Cell::new(None) };
}

/// Access to the calling thread's allocator.
#[derive(Debug, Clone, Copy)]
pub struct ThreadAlloc;

impl ThreadAlloc {
    /// Returns the allocator installed on the calling thread.
    #[must_use]
    pub fn get() -> &'static dyn Alloc {
        CURRENT.with(Cell::get).unwrap_or(&SYSTEM)
    }

    /// Runs `f` with `alloc` installed as the calling thread's allocator.
    ///
    /// The previous allocator is restored when `f` returns or unwinds.
    ///
    /// ```
    /// use regent::ThreadAlloc;
    /// use regent_mem::Arena;
    /// use std::sync::OnceLock;
    ///
    /// static ARENA: OnceLock<Arena> = OnceLock::new();
    /// let arena = ARENA.get_or_init(|| Arena::new(4096));
    ///
    /// ThreadAlloc::using(arena, || {
    ///     let current = ThreadAlloc::get() as *const dyn regent_mem::Alloc as *const ();
    ///     assert_eq!(current, arena as *const _ as *const ());
    /// });
    /// ```
    pub fn using<R>(alloc: &'static dyn Alloc, f: impl FnOnce() -> R) -> R {
        struct Restore(Option<&'static dyn Alloc>);

        impl Drop for Restore {
            fn drop(&mut self) {
                CURRENT.with(|current| current.set(self.0));
            }
        }

        let _restore = Restore(CURRENT.with(|current| current.replace(Some(alloc))));
        f()
    }
}
