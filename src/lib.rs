//! Shared helpers for the workspace integration tests in `tests/`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pagebump_memory::{Arena, ArenaError, Exhaustion};

/// Arena whose failure handler counts calls instead of aborting.
pub fn counting_arena(capacity: usize) -> Result<(Arena, Arc<AtomicUsize>), ArenaError> {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let arena = Arena::with_failure_handler(capacity, move |_: &Exhaustion| {
        seen.fetch_add(1, Ordering::Relaxed);
    })?;
    Ok((arena, calls))
}

/// Path to a file under `tests/testdata`.
#[must_use]
pub fn testdata(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("testdata")
        .join(name)
}
