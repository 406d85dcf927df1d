//! Bump arena for region storage and runtime metadata.
//!
//! An [`Arena`] hands out blocks by advancing an atomic bump pointer inside
//! its current chunk and never frees individual blocks. All chunks are
//! returned to the system allocator together when the arena is dropped,
//! which is exactly the lifetime a region gives the objects it owns.
//!
//! - **Fast allocation** through a CAS bump pointer
//! - **Stable pointers** (blocks never move)
//! - **Thread-safe**: any number of threads may allocate concurrently
//! - **Lazy**: creating an arena allocates nothing until the first request
//!
//! # Examples
//!
//! ```
//! use regent_mem::arena::Arena;
//!
//! let arena = Arena::new(8192);
//!
//! let a = arena.alloc_value(42u32);
//! let b = arena.alloc_value(7u64);
//! assert_eq!(*a + *b as u32, 49);
//!
//! // Everything is reclaimed when `arena` goes out of scope.
//! ```

use crate::alloc::{Alloc, AllocError};
use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

/// Alignment of every chunk's base address.
const CHUNK_ALIGNMENT: usize = 16;

/// Minimum chunk size (4 KiB).
pub const MIN_CHUNK_SIZE: usize = 4096;

/// Chunk sizes stop doubling here; larger requests get a dedicated chunk.
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Arena allocation statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Bytes handed out, including alignment padding of each request.
    pub total_allocated: usize,
    /// Number of chunks owned by the arena.
    pub chunk_count: usize,
    /// Total capacity of all chunks in bytes.
    pub total_capacity: usize,
}

/// A fixed-size block of memory with an atomic bump pointer.
///
/// # Safety
///
/// - Chunk memory is released only when the chunk is dropped
/// - The bump pointer only advances and never passes `end`
/// - The CAS loop guarantees no two callers receive overlapping blocks
struct Chunk {
    start: NonNull<u8>,
    /// Stored as `AtomicPtr` to keep provenance across updates.
    ptr: AtomicPtr<u8>,
    end: usize,
    capacity: usize,
}

impl Chunk {
    fn new(size: usize) -> Result<Self, AllocError> {
        let layout = Layout::from_size_align(size, CHUNK_ALIGNMENT)
            .map_err(|_| AllocError { size, align: CHUNK_ALIGNMENT })?;

        // SAFETY: size is at least MIN_CHUNK_SIZE, so the layout is non-zero.
        let start = unsafe { alloc::alloc(layout) };
        let start = NonNull::new(start).ok_or(AllocError::new(layout))?;

        Ok(Chunk {
            start,
            ptr: AtomicPtr::new(start.as_ptr()),
            end: start.as_ptr().addr() + size,
            capacity: size,
        })
    }

    #[inline(always)]
    fn try_alloc(&self, layout: Layout) -> Option<NonNull<u8>> {
        let align = layout.align();

        loop {
            let current = self.ptr.load(Ordering::Acquire);
            let aligned_start = current.addr().checked_add(align - 1)? & !(align - 1);
            let new_addr = aligned_start.checked_add(layout.size())?;

            if new_addr > self.end {
                return None;
            }

            // with_addr keeps the provenance of the chunk allocation.
            let new_ptr = current.with_addr(new_addr);

            if self
                .ptr
                .compare_exchange_weak(current, new_ptr, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // SAFETY: aligned_start lies inside the chunk, which is non-null.
                return Some(unsafe { NonNull::new_unchecked(current.with_addr(aligned_start)) });
            }
        }
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        // SAFETY: start was allocated in `Chunk::new` with exactly this layout.
        unsafe {
            alloc::dealloc(
                self.start.as_ptr(),
                Layout::from_size_align_unchecked(self.capacity, CHUNK_ALIGNMENT),
            );
        }
    }
}

/// Thread-safe bump arena.
///
/// Blocks handed out by an `Arena` stay valid until the arena is dropped.
/// [`Alloc::dealloc`] on an arena does nothing; the memory comes back when
/// the whole arena goes.
///
/// # Examples
///
/// ```
/// use regent_mem::{Alloc, Arena};
/// use std::alloc::Layout;
///
/// let arena = Arena::new(4096);
/// let block = arena.alloc(Layout::from_size_align(48, 16).unwrap()).unwrap();
/// assert_eq!(block.as_ptr() as usize % 16, 0);
///
/// let stats = arena.stats();
/// assert_eq!(stats.chunk_count, 1);
/// assert!(stats.total_allocated >= 48);
/// ```
pub struct Arena {
    /// Every chunk ever allocated; owned (boxed) so `current` stays stable.
    chunks: Mutex<Vec<NonNull<Chunk>>>,
    current: AtomicPtr<Chunk>,
    chunk_size: AtomicUsize,
    total_allocated: AtomicUsize,
}

// SAFETY: chunks are only reached through atomics or the mutex, and chunk
// memory is never handed out twice.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Creates an empty arena whose first chunk will be `chunk_size` bytes,
    /// rounded up to a power of two and to at least [`MIN_CHUNK_SIZE`].
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Arena {
            chunks: Mutex::new(Vec::new()),
            current: AtomicPtr::new(ptr::null_mut()),
            chunk_size: AtomicUsize::new(chunk_size.max(MIN_CHUNK_SIZE).next_power_of_two()),
            total_allocated: AtomicUsize::new(0),
        }
    }

    /// Allocates a block for `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] if a new chunk was needed and the system
    /// allocator refused it.
    #[inline]
    pub fn alloc_layout(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        loop {
            let current = self.current.load(Ordering::Acquire);

            if !current.is_null() {
                // SAFETY: chunks are freed only when the arena drops.
                let chunk = unsafe { &*current };

                if let Some(block) = chunk.try_alloc(layout) {
                    self.total_allocated.fetch_add(layout.size(), Ordering::Relaxed);
                    return Ok(block);
                }
            }

            self.grow(current, layout)?;
        }
    }

    /// Moves `value` into the arena.
    ///
    /// The value is never dropped; use it for plain data that lives as long
    /// as the arena.
    ///
    /// # Panics
    ///
    /// Panics if the system allocator is out of memory.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_value<T>(&self, value: T) -> &mut T {
        let layout = Layout::new::<T>();
        let Ok(block) = self.alloc_layout(layout) else {
            alloc::handle_alloc_error(layout);
        };
        let slot = block.cast::<T>();

        // SAFETY: the block is fresh, aligned, and large enough for T.
        unsafe {
            slot.as_ptr().write(value);
            &mut *slot.as_ptr()
        }
    }

    /// Installs a fresh chunk, unless another thread already replaced
    /// `seen` with one.
    #[cold]
    fn grow(&self, seen: *mut Chunk, layout: Layout) -> Result<(), AllocError> {
        let mut chunks = self.chunks.lock().unwrap_or_else(|e| e.into_inner());

        if self.current.load(Ordering::Acquire) != seen {
            return Ok(());
        }

        let wanted = layout.size() + layout.align();
        let size = self.chunk_size.load(Ordering::Relaxed).max(wanted.next_power_of_two());
        let chunk = Box::new(Chunk::new(size)?);
        let chunk = NonNull::from(Box::leak(chunk));

        chunks.push(chunk);
        self.current.store(chunk.as_ptr(), Ordering::Release);
        self.chunk_size.store((size * 2).min(MAX_CHUNK_SIZE), Ordering::Relaxed);
        Ok(())
    }

    /// Returns allocation statistics for this arena.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let chunks = self.chunks.lock().unwrap_or_else(|e| e.into_inner());
        let total_capacity = chunks
            .iter()
            // SAFETY: every pointer in the list is a live, leaked Chunk box.
            .map(|c| unsafe { c.as_ref().capacity })
            .sum();

        ArenaStats {
            total_allocated: self.total_allocated.load(Ordering::Relaxed),
            chunk_count: chunks.len(),
            total_capacity,
        }
    }

    /// Returns `true` if `ptr` points into memory owned by this arena.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        let addr = ptr.as_ptr().addr();
        let chunks = self.chunks.lock().unwrap_or_else(|e| e.into_inner());
        chunks.iter().any(|c| {
            // SAFETY: see `stats`.
            let chunk = unsafe { c.as_ref() };
            let start = chunk.start.as_ptr().addr();
            (start..chunk.end).contains(&addr)
        })
    }
}

unsafe impl Alloc for Arena {
    fn alloc(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.alloc_layout(layout)
    }

    unsafe fn dealloc(&self, _ptr: NonNull<u8>, _layout: Layout) {}
}

impl Drop for Arena {
    fn drop(&mut self) {
        let chunks = self.chunks.get_mut().unwrap_or_else(|e| e.into_inner());
        for chunk in chunks.drain(..) {
            // SAFETY: each pointer came from Box::leak in `grow` and is
            // dropped exactly once here.
            drop(unsafe { Box::from_raw(chunk.as_ptr()) });
        }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena").field("stats", &self.stats()).finish()
    }
}

/// Process-lifetime arena for runtime metadata.
///
/// Type descriptors live here: they are built once, shared by every object
/// of their type, and never freed.
///
/// ```
/// use regent_mem::global_arena;
///
/// assert!(std::ptr::eq(global_arena(), global_arena()));
/// ```
#[must_use]
pub fn global_arena() -> &'static Arena {
    static ARENA: OnceLock<Arena> = OnceLock::new();
    ARENA.get_or_init(|| Arena::new(64 * 1024))
}
