//! Error types for the `Regent` object model.
//!
//! Allocation through the adapters either yields a handle or fails
//! immediately with one of these errors. Nothing is retried and nothing is
//! partially constructed.

use regent_mem::AllocError;
use std::fmt;

/// Errors that can occur while allocating managed objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An extended cown allocation asked for fewer bytes than the cown
    /// itself occupies.
    UndersizedAllocation {
        /// The size the caller asked for.
        requested: usize,
        /// The footprint of the cown type.
        required: usize,
    },

    /// The allocator or region could not provide storage.
    OutOfMemory {
        /// The requested allocation size.
        size: usize,
        /// The requested alignment.
        align: usize,
    },

    /// A size and alignment pair does not describe a valid layout.
    InvalidLayout {
        /// The requested allocation size.
        size: usize,
        /// The requested alignment.
        align: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UndersizedAllocation { requested, required } => {
                write!(
                    f,
                    "Undersized allocation: requested {requested} bytes, cown needs at least {required} bytes"
                )
            }
            Error::OutOfMemory { size, align } => {
                write!(f, "Out of memory: {size} bytes aligned to {align}")
            }
            Error::InvalidLayout { size, align } => {
                write!(f, "Invalid layout: {size} bytes aligned to {align}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<AllocError> for Error {
    fn from(err: AllocError) -> Self {
        Error::OutOfMemory {
            size: err.size,
            align: err.align,
        }
    }
}

/// Result type for `Regent` operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::UndersizedAllocation { requested: 8, required: 32 }.to_string(),
            "Undersized allocation: requested 8 bytes, cown needs at least 32 bytes"
        );
        assert_eq!(
            Error::OutOfMemory { size: 64, align: 8 }.to_string(),
            "Out of memory: 64 bytes aligned to 8"
        );
    }

    #[test]
    fn test_alloc_error_conversion() {
        let err: Error = AllocError { size: 100, align: 16 }.into();
        assert_eq!(err, Error::OutOfMemory { size: 100, align: 16 });
    }
}
