//! Tuning constants for arena reservation and diagnostics.

/// Bytes past each allocation that get re-poisoned on the fast path, on top
/// of the allocation's own size.
pub const DEFAULT_POISON_LOOKAHEAD: usize = 256;

/// Page size assumed when the platform cannot be queried.
pub const FALLBACK_PAGE_SIZE: usize = 4096;
