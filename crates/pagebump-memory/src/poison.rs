//! Diagnostic poisoning of arena memory.
//!
//! The arena tells a [`Poisoner`] which byte ranges are currently off limits
//! (reserved but not handed out) and which were just handed out. With
//! [`NoPoison`] every call compiles away. [`ShadowPoisoner`] keeps a software
//! shadow that tests and tools can query, and `AsanPoisoner` (feature `asan`)
//! forwards to the AddressSanitizer runtime.
#![allow(unsafe_code)]

use std::sync::Arc;

use parking_lot::Mutex;

/// Marks byte ranges as inaccessible or accessible.
///
/// Swapping one implementation for another must not change arena behavior
/// beyond the diagnostics it produces.
pub trait Poisoner: Send {
    /// Mark `[start, start + len)` as not valid to touch.
    fn poison(&self, start: *const u8, len: usize);

    /// Mark `[start, start + len)` as valid to read and write.
    fn unpoison(&self, start: *const u8, len: usize);

    /// Called once, right before the backing region of `[start, start + len)`
    /// is returned to the environment.
    ///
    /// Defaults to unpoisoning, so that shadow state does not outlive the
    /// memory it describes.
    fn retire(&self, start: *const u8, len: usize) {
        self.unpoison(start, len);
    }
}

/// Poisoner that does nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoPoison;

impl Poisoner for NoPoison {
    #[inline(always)]
    fn poison(&self, _start: *const u8, _len: usize) {}

    #[inline(always)]
    fn unpoison(&self, _start: *const u8, _len: usize) {}
}

/// State of a byte as recorded by [`ShadowPoisoner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shadow {
    /// Reserved but not handed out.
    Poisoned,
    /// Handed out to a caller.
    Unpoisoned,
    /// Belonged to an arena that has been released.
    Retired,
}

#[derive(Debug, Default)]
struct ShadowLog {
    marks: Vec<(usize, usize, Shadow)>,
}

impl ShadowLog {
    fn mark(&mut self, start: *const u8, len: usize, state: Shadow) {
        if len > 0 {
            self.marks.push((start as usize, len, state));
        }
    }

    fn state(&self, addr: usize) -> Option<Shadow> {
        self.marks
            .iter()
            .rev()
            .find(|&&(start, len, _)| addr >= start && addr - start < len)
            .map(|&(_, _, state)| state)
    }
}

/// Software shadow memory.
///
/// Every call is appended to a shared log; the latest mark covering an
/// address wins. Clones share the same log, so a test can keep one handle
/// while the arena owns another. The log grows with every allocation, so this
/// is meant for tests and diagnostic runs, not for production arenas.
#[derive(Debug, Clone, Default)]
pub struct ShadowPoisoner {
    log: Arc<Mutex<ShadowLog>>,
}

impl ShadowPoisoner {
    /// Create an empty shadow.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest recorded state of the byte at `addr`, if it was ever marked.
    #[must_use]
    pub fn state(&self, addr: *const u8) -> Option<Shadow> {
        self.log.lock().state(addr as usize)
    }

    /// Whether every byte of `[start, start + len)` is currently in `state`.
    #[must_use]
    pub fn range_is(&self, start: *const u8, len: usize, state: Shadow) -> bool {
        let log = self.log.lock();
        (0..len).all(|i| log.state(start as usize + i) == Some(state))
    }

    /// Number of marks recorded so far.
    #[must_use]
    pub fn marks(&self) -> usize {
        self.log.lock().marks.len()
    }
}

impl Poisoner for ShadowPoisoner {
    fn poison(&self, start: *const u8, len: usize) {
        self.log.lock().mark(start, len, Shadow::Poisoned);
    }

    fn unpoison(&self, start: *const u8, len: usize) {
        self.log.lock().mark(start, len, Shadow::Unpoisoned);
    }

    fn retire(&self, start: *const u8, len: usize) {
        self.log.lock().mark(start, len, Shadow::Retired);
    }
}

/// Forwards to the AddressSanitizer runtime.
///
/// Only meaningful when the program is built with `-Zsanitizer=address`.
#[cfg(feature = "asan")]
#[derive(Debug, Clone, Copy, Default)]
pub struct AsanPoisoner;

#[cfg(feature = "asan")]
extern "C" {
    fn __asan_poison_memory_region(addr: *const std::ffi::c_void, size: usize);
    fn __asan_unpoison_memory_region(addr: *const std::ffi::c_void, size: usize);
}

#[cfg(feature = "asan")]
impl Poisoner for AsanPoisoner {
    fn poison(&self, start: *const u8, len: usize) {
        // SAFETY: the arena only passes ranges inside its own live region.
        unsafe { __asan_poison_memory_region(start.cast(), len) };
    }

    fn unpoison(&self, start: *const u8, len: usize) {
        // SAFETY: as above.
        unsafe { __asan_unpoison_memory_region(start.cast(), len) };
    }
}
