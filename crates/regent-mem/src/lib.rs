//! `Regent` memory infrastructure
//!
//! This crate provides the allocation primitives the `Regent` object model
//! sits on:
//!
//! - **[`Alloc`]**: the allocator interface managed storage is drawn from
//! - **[`Arena`]**: a thread-safe bump allocator that reclaims everything at
//!   once when dropped (region storage, runtime metadata)
//! - **[`SystemAlloc`]**: the process allocator, for storage that is returned
//!   one block at a time
//! - **[`global_arena`]**: process-lifetime arena for metadata that is never
//!   freed
//!

pub mod alloc;
pub mod arena;

pub use alloc::{Alloc, AllocError, SystemAlloc};
pub use arena::{Arena, ArenaStats, global_arena};
