//! # pagebump-memory
//!
//! Page-backed bump arena for short-lived, variably sized temporaries.
//!
//! An [`Arena`] reserves one block of zero-filled pages up front and serves
//! every allocation by advancing a cursor through it. Nothing is freed
//! individually: dropping (or [`Arena::release`]-ing) the arena returns the
//! whole block in a single call.
//!
//! The arena's control state (the owned region, failure handler, poisoner and
//! counters) lives in a footer written into the last bytes of the same
//! reservation, so the handle itself is just a cursor and a byte count.
//!
//! # Example
//! ```
//! use pagebump_memory::Arena;
//!
//! let arena = Arena::new(64).unwrap();
//! let a = arena.alloc_bytes(10, 1).unwrap();
//! assert_eq!(a.len(), 10);
//! assert_eq!(arena.remaining(), 54);
//! ```
#![warn(missing_docs)]

pub mod arena;
pub mod constants;
pub mod error;
pub mod failure;
mod footer;
pub mod poison;
pub mod region;
pub mod stats;

pub use arena::{Arena, ArenaBuilder};
pub use constants::DEFAULT_POISON_LOOKAHEAD;
pub use error::ArenaError;
pub use failure::{AbortOnExhaustion, Exhaustion, FailureHandler, ReportExhaustion};
pub use poison::{NoPoison, Poisoner, Shadow, ShadowPoisoner};
pub use region::{page_size, HeapRegion, MmapRegion, Region};
pub use stats::ArenaStats;

#[cfg(feature = "asan")]
pub use poison::AsanPoisoner;
