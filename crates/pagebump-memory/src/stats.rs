//! Arena usage snapshot.

use serde::Serialize;

/// Point-in-time view of an arena's accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArenaStats {
    /// Usable bytes requested at construction.
    pub capacity: usize,
    /// Bytes consumed so far, alignment padding included.
    pub used: usize,
    /// Bytes still available.
    pub remaining: usize,
    /// Total bytes reserved, footer and page rounding included.
    pub region_size: usize,
    /// Number of requests that reached the failure handler.
    pub exhaustions: u64,
}

impl ArenaStats {
    /// Fraction of capacity in use, in `[0, 1]`. A zero-capacity arena reports 1.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            1.0
        } else {
            self.used as f64 / self.capacity as f64
        }
    }

    /// Bytes reserved beyond the usable capacity.
    #[must_use]
    pub fn overhead(&self) -> usize {
        self.region_size.saturating_sub(self.capacity)
    }
}
