//! The allocator interface.
//!
//! Every block of managed storage comes from an [`Alloc`]. The object model
//! only ever asks for one block per object and records the layout it asked
//! for, so implementations never have to remember sizes themselves.

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

/// Error returned when an allocator cannot satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError {
    /// Requested size in bytes.
    pub size: usize,
    /// Requested alignment in bytes.
    pub align: usize,
}

impl AllocError {
    /// Creates an error describing a failed request for `layout`.
    #[must_use]
    pub const fn new(layout: Layout) -> Self {
        Self {
            size: layout.size(),
            align: layout.align(),
        }
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Allocation failed: {} bytes aligned to {}",
            self.size, self.align
        )
    }
}

impl std::error::Error for AllocError {}

/// A source of raw storage.
///
/// # Safety
///
/// Implementors must guarantee that a pointer returned by `alloc` is
/// non-null, aligned to `layout.align()`, valid for reads and writes of
/// `layout.size()` bytes, and not handed out again until it has been passed
/// to `dealloc` (or the allocator itself has been dropped).
pub unsafe trait Alloc: Send + Sync {
    /// Allocates a block described by `layout`. The contents are
    /// unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] if the request cannot be satisfied.
    fn alloc(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Returns a block to the allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `alloc` on this allocator with the
    /// same `layout`, and must not be used afterwards.
    unsafe fn dealloc(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The process allocator (`std::alloc`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAlloc;

unsafe impl Alloc for SystemAlloc {
    fn alloc(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Err(AllocError::new(layout));
        }

        // SAFETY: layout has a non-zero size (checked above).
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::new(layout))
    }

    unsafe fn dealloc(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: the caller guarantees ptr came from `alloc` with `layout`.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_alloc_round_trip() {
        let layout = Layout::from_size_align(64, 16).unwrap();
        let ptr = SystemAlloc.alloc(layout).unwrap();

        assert_eq!(ptr.as_ptr() as usize % 16, 0);

        unsafe {
            ptr.as_ptr().write_bytes(0xAB, 64);
            assert_eq!(*ptr.as_ptr().add(63), 0xAB);
            SystemAlloc.dealloc(ptr, layout);
        }
    }

    #[test]
    fn test_system_alloc_rejects_zero_size() {
        let layout = Layout::from_size_align(0, 8).unwrap();
        assert_eq!(
            SystemAlloc.alloc(layout),
            Err(AllocError { size: 0, align: 8 })
        );
    }

    #[test]
    fn test_alloc_error_display() {
        let err = AllocError { size: 128, align: 64 };
        assert_eq!(err.to_string(), "Allocation failed: 128 bytes aligned to 64");
    }
}
