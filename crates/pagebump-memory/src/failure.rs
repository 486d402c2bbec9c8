//! Exhaustion policy.
//!
//! When a request does not fit in what is left of an arena, the arena hands
//! an [`Exhaustion`] report to its [`FailureHandler`]. The handler may end the
//! process ([`AbortOnExhaustion`], the default) or return, in which case the
//! allocation fails with [`ArenaError::Exhausted`](crate::ArenaError).
//! The arena never retries or grows after the handler returns.

use std::fmt;

/// Details of an allocation that did not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhaustion {
    /// Requested size in bytes.
    pub size: usize,
    /// Requested alignment.
    pub align: usize,
    /// Usable size the arena was created with.
    pub capacity: usize,
    /// Bytes left when the request was made.
    pub remaining: usize,
}

impl fmt::Display for Exhaustion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allocation (size={} align={}) failed from arena of size {}",
            self.size, self.align, self.capacity
        )
    }
}

/// Policy invoked when an allocation cannot be satisfied.
///
/// Handlers only see the report, never the arena, so they cannot re-enter it.
/// Any `Fn(&Exhaustion) + Send` closure is a handler.
pub trait FailureHandler: Send {
    /// React to an exhausted arena. Returning means the allocation fails.
    fn on_exhausted(&self, exhaustion: &Exhaustion);
}

impl<F> FailureHandler for F
where
    F: Fn(&Exhaustion) + Send,
{
    fn on_exhausted(&self, exhaustion: &Exhaustion) {
        self(exhaustion);
    }
}

/// Print a diagnostic and abort the process.
///
/// Running out of arena space is treated as a sizing bug under this policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortOnExhaustion;

impl FailureHandler for AbortOnExhaustion {
    fn on_exhausted(&self, exhaustion: &Exhaustion) {
        tracing::error!(
            size = exhaustion.size,
            align = exhaustion.align,
            capacity = exhaustion.capacity,
            "arena exhausted, aborting"
        );
        eprintln!("Critical: {exhaustion}");
        std::process::abort();
    }
}

/// Log the exhaustion and let the allocation fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportExhaustion;

impl FailureHandler for ReportExhaustion {
    fn on_exhausted(&self, exhaustion: &Exhaustion) {
        tracing::warn!(
            size = exhaustion.size,
            align = exhaustion.align,
            capacity = exhaustion.capacity,
            remaining = exhaustion.remaining,
            "arena exhausted"
        );
    }
}
