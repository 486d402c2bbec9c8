//! Arena error type.

use std::alloc::LayoutError;
use std::io;

/// Errors surfaced by arena construction and allocation.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    /// The backing region could not be reserved.
    #[error("failed to reserve {size} bytes for arena: {source}")]
    Reserve {
        /// Total bytes requested from the environment, footer included.
        size: usize,
        /// Underlying reservation failure.
        #[source]
        source: io::Error,
    },

    /// The requested capacity plus footer does not fit in the address space.
    #[error("arena capacity {requested} overflows the address space")]
    CapacityOverflow {
        /// Usable bytes the caller asked for.
        requested: usize,
    },

    /// An allocation did not fit and the failure handler returned.
    #[error("arena exhausted: allocation (size={size} align={align}) with {remaining} bytes left")]
    Exhausted {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment.
        align: usize,
        /// Bytes that were left when the request was made.
        remaining: usize,
    },

    /// A typed allocation's layout could not be computed.
    #[error("invalid allocation layout: {0}")]
    Layout(#[from] LayoutError),
}

impl ArenaError {
    /// Whether this error came from running out of arena space.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}
