//! Bump arena over a single page-aligned reservation.
//!
//! The handle is two cells: the next free address and the number of bytes
//! between it and the footer. Everything else (the owned region, failure
//! handler, poisoner, counters) lives in the footer at `cursor + remaining`.
//!
//! Allocation only moves the cursor forward. Memory is handed out zero
//! filled, because the reservation starts zeroed and no byte is ever handed
//! out twice. Values placed in the arena are never dropped.
#![allow(unsafe_code)]

use std::alloc::Layout;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::slice;

use crate::constants::DEFAULT_POISON_LOOKAHEAD;
use crate::error::ArenaError;
use crate::failure::{AbortOnExhaustion, Exhaustion, FailureHandler};
use crate::footer::Footer;
use crate::poison::{NoPoison, Poisoner};
use crate::region::{page_size, MmapRegion, Region};
use crate::stats::ArenaStats;

/// Fixed-capacity bump arena.
///
/// Not `Sync`: one arena serves one thread at a time. It can be moved to
/// another thread, which is how per-thread arenas are set up.
pub struct Arena<R: Region = MmapRegion, P: Poisoner = NoPoison> {
    cursor: Cell<NonNull<u8>>,
    remaining: Cell<usize>,
    _footer: PhantomData<Footer<R, P>>,
}

// SAFETY: the arena exclusively owns its region; the footer's handler,
// poisoner and region are all `Send`.
unsafe impl<R: Region, P: Poisoner> Send for Arena<R, P> {}

impl Arena {
    /// Reserve an arena with `capacity` usable bytes and the aborting
    /// failure policy.
    pub fn new(capacity: usize) -> Result<Self, ArenaError> {
        Self::builder(capacity).build()
    }

    /// Reserve an arena with `capacity` usable bytes and a custom failure
    /// policy.
    pub fn with_failure_handler<H>(capacity: usize, handler: H) -> Result<Self, ArenaError>
    where
        H: FailureHandler + 'static,
    {
        Self::builder(capacity).failure_handler(handler).build()
    }

    /// Start configuring an arena with `capacity` usable bytes.
    #[must_use]
    pub fn builder(capacity: usize) -> ArenaBuilder {
        ArenaBuilder::new(capacity)
    }
}

impl<R: Region, P: Poisoner> Arena<R, P> {
    /// Allocate `size` bytes aligned to `align` and return their address.
    ///
    /// `align` must be a power of two. A zero `size` yields an aligned
    /// address that must not be dereferenced.
    ///
    /// When the request does not fit, the failure handler runs; if it
    /// returns, so does this, with [`ArenaError::Exhausted`] and nothing
    /// consumed.
    #[inline]
    pub fn alloc_raw(&self, size: usize, align: usize) -> Result<NonNull<u8>, ArenaError> {
        debug_assert!(align.is_power_of_two(), "alignment {align} is not a power of two");
        let cursor = self.cursor.get();
        let remaining = self.remaining.get();
        let skip = (cursor.as_ptr() as usize).wrapping_neg() & (align - 1);

        match size.checked_add(skip) {
            Some(needed) if needed <= remaining => {
                let left = remaining - needed;
                // SAFETY: skip <= needed <= remaining, so both addresses stay
                // within [cursor, footer].
                let (addr, next) = unsafe {
                    (
                        NonNull::new_unchecked(cursor.as_ptr().add(skip)),
                        NonNull::new_unchecked(cursor.as_ptr().add(needed)),
                    )
                };
                self.cursor.set(next);
                self.remaining.set(left);

                let footer = self.footer();
                let lookahead = size.saturating_add(footer.lookahead).min(left);
                footer.poisoner.poison(next.as_ptr(), lookahead);
                footer.poisoner.unpoison(addr.as_ptr(), size);
                Ok(addr)
            }
            _ => Err(self.exhausted(size, align)),
        }
    }

    /// Allocate space for `layout`.
    #[inline]
    pub fn alloc_layout(&self, layout: Layout) -> Result<NonNull<u8>, ArenaError> {
        self.alloc_raw(layout.size(), layout.align())
    }

    /// Allocate `size` zero-filled bytes aligned to `align`.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_bytes(&self, size: usize, align: usize) -> Result<&mut [u8], ArenaError> {
        let ptr = self.alloc_raw(size, align)?;
        // SAFETY: `size` fresh bytes, zero filled, handed out only here.
        Ok(unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), size) })
    }

    /// Move `value` into the arena. It will never be dropped.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc<T>(&self, value: T) -> Result<&mut T, ArenaError> {
        let ptr = self.alloc_layout(Layout::new::<T>())?.cast::<T>();
        // SAFETY: properly sized and aligned for `T`, exclusively ours.
        unsafe {
            ptr.as_ptr().write(value);
            Ok(&mut *ptr.as_ptr())
        }
    }

    /// Copy `src` into the arena.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice_copy<T: Copy>(&self, src: &[T]) -> Result<&mut [T], ArenaError> {
        let ptr = self.alloc_layout(Layout::for_value(src))?.cast::<T>();
        // SAFETY: room for `src.len()` elements; fresh memory cannot overlap
        // `src`.
        unsafe {
            ptr.as_ptr()
                .copy_from_nonoverlapping(src.as_ptr(), src.len());
            Ok(slice::from_raw_parts_mut(ptr.as_ptr(), src.len()))
        }
    }

    /// Allocate `len` elements, initializing element `i` with `fill(i)`.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice_fill_with<T, F>(&self, len: usize, mut fill: F) -> Result<&mut [T], ArenaError>
    where
        F: FnMut(usize) -> T,
    {
        let ptr = self.alloc_layout(Layout::array::<T>(len)?)?.cast::<T>();
        for i in 0..len {
            // SAFETY: `i < len`, inside the allocation.
            unsafe { ptr.as_ptr().add(i).write(fill(i)) };
        }
        // SAFETY: all `len` elements were written above.
        Ok(unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), len) })
    }

    /// Copy `s` into the arena.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_str(&self, s: &str) -> Result<&mut str, ArenaError> {
        let bytes = self.alloc_slice_copy(s.as_bytes())?;
        // SAFETY: copied from a valid `str`.
        Ok(unsafe { std::str::from_utf8_unchecked_mut(bytes) })
    }

    /// Usable bytes the arena was created with.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.footer().capacity
    }

    /// Bytes still available from the cursor.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.get()
    }

    /// Bytes consumed so far, alignment padding included.
    #[must_use]
    pub fn used(&self) -> usize {
        self.capacity() - self.remaining()
    }

    /// Total bytes reserved from the environment.
    #[must_use]
    pub fn region_size(&self) -> usize {
        self.footer().region.len()
    }

    /// Whether `ptr` lies in this arena's usable span.
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        let end = self.footer_ptr().as_ptr() as usize;
        let start = end - self.capacity();
        (start..end).contains(&(ptr as usize))
    }

    /// Snapshot of the arena's accounting.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let footer = self.footer();
        ArenaStats {
            capacity: footer.capacity,
            used: footer.capacity - self.remaining(),
            remaining: self.remaining(),
            region_size: footer.region.len(),
            exhaustions: footer.exhaustions.get(),
        }
    }

    /// Release the arena and everything allocated from it.
    ///
    /// Same as dropping it.
    pub fn release(self) {
        drop(self);
    }

    #[inline]
    fn footer_ptr(&self) -> NonNull<Footer<R, P>> {
        // SAFETY: cursor + remaining is always the footer slot.
        unsafe {
            NonNull::new_unchecked(self.cursor.get().as_ptr().add(self.remaining.get())).cast()
        }
    }

    #[inline]
    fn footer(&self) -> &Footer<R, P> {
        // SAFETY: the footer was installed at construction and is only moved
        // out in `drop`.
        unsafe { self.footer_ptr().as_ref() }
    }

    #[cold]
    #[inline(never)]
    fn exhausted(&self, size: usize, align: usize) -> ArenaError {
        let remaining = self.remaining();
        let footer = self.footer();
        footer.exhaustions.set(footer.exhaustions.get() + 1);
        footer.handler.on_exhausted(&Exhaustion {
            size,
            align,
            capacity: footer.capacity,
            remaining,
        });
        ArenaError::Exhausted {
            size,
            align,
            remaining,
        }
    }
}

impl<R: Region, P: Poisoner> Drop for Arena<R, P> {
    fn drop(&mut self) {
        let at = self.footer_ptr();
        // SAFETY: taken exactly once; the handle is gone after this.
        let footer = unsafe { Footer::take(at) };
        debug_assert!(
            footer.is_at(at.as_ptr()),
            "arena handle does not match the footer it was built with"
        );
        footer.poisoner.retire(footer.base().as_ptr(), footer.span());
        tracing::debug!(
            capacity = footer.capacity,
            used = footer.capacity - self.remaining.get(),
            region_size = footer.region.len(),
            "releasing arena"
        );
    }
}

impl<R: Region, P: Poisoner> fmt::Debug for Arena<R, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("cursor", &self.cursor.get())
            .field("remaining", &self.remaining())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Configures and reserves an [`Arena`].
pub struct ArenaBuilder<R: Region = MmapRegion, P: Poisoner = NoPoison> {
    capacity: usize,
    lookahead: usize,
    handler: Box<dyn FailureHandler>,
    poisoner: P,
    _region: PhantomData<fn() -> R>,
}

impl ArenaBuilder {
    /// Defaults: anonymous mapping, no poisoning, abort on exhaustion.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lookahead: DEFAULT_POISON_LOOKAHEAD,
            handler: Box::new(AbortOnExhaustion),
            poisoner: NoPoison,
            _region: PhantomData,
        }
    }
}

impl<R: Region, P: Poisoner> ArenaBuilder<R, P> {
    /// Policy for requests that do not fit.
    #[must_use]
    pub fn failure_handler<H>(mut self, handler: H) -> Self
    where
        H: FailureHandler + 'static,
    {
        self.handler = Box::new(handler);
        self
    }

    /// Extra bytes re-poisoned past each allocation.
    #[must_use]
    pub fn poison_lookahead(mut self, bytes: usize) -> Self {
        self.lookahead = bytes;
        self
    }

    /// Poisoning strategy.
    #[must_use]
    pub fn poisoner<Q: Poisoner>(self, poisoner: Q) -> ArenaBuilder<R, Q> {
        ArenaBuilder {
            capacity: self.capacity,
            lookahead: self.lookahead,
            handler: self.handler,
            poisoner,
            _region: PhantomData,
        }
    }

    /// Backing memory provider.
    #[must_use]
    pub fn region<S: Region>(self) -> ArenaBuilder<S, P> {
        ArenaBuilder {
            capacity: self.capacity,
            lookahead: self.lookahead,
            handler: self.handler,
            poisoner: self.poisoner,
            _region: PhantomData,
        }
    }

    /// Reserve the backing region and install the footer.
    pub fn build(self) -> Result<Arena<R, P>, ArenaError> {
        let capacity = self.capacity;
        let len = Footer::<R, P>::region_len(capacity, page_size())
            .ok_or(ArenaError::CapacityOverflow {
                requested: capacity,
            })?;
        let region = R::reserve(len).map_err(|source| ArenaError::Reserve { size: len, source })?;

        let (footer, cursor) =
            Footer::install(region, capacity, self.lookahead, self.handler, self.poisoner);
        let arena = Arena {
            cursor: Cell::new(cursor),
            remaining: Cell::new(capacity),
            _footer: PhantomData,
        };
        debug_assert_eq!(arena.footer_ptr(), footer);

        let installed = arena.footer();
        installed
            .poisoner
            .poison(installed.base().as_ptr(), installed.span());
        tracing::debug!(
            capacity,
            region_size = installed.region.len(),
            "reserved arena"
        );
        Ok(arena)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::ReportExhaustion;
    use crate::poison::{Shadow, ShadowPoisoner};
    use crate::region::HeapRegion;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn reporting(capacity: usize) -> Arena {
        Arena::with_failure_handler(capacity, ReportExhaustion).unwrap()
    }

    fn counting(capacity: usize) -> (Arena, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let arena = Arena::with_failure_handler(capacity, move |_: &Exhaustion| {
            seen.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
        (arena, calls)
    }

    #[test]
    fn new_arena_is_empty() {
        let arena = Arena::new(1024).unwrap();
        assert_eq!(arena.capacity(), 1024);
        assert_eq!(arena.remaining(), 1024);
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.region_size() % page_size(), 0);
        assert!(arena.region_size() > 1024);
    }

    #[test]
    fn fills_exactly_then_exhausts() {
        let (arena, calls) = counting(64);
        arena.alloc_raw(10, 1).unwrap();
        assert_eq!(arena.remaining(), 54);
        arena.alloc_raw(54, 1).unwrap();
        assert_eq!(arena.remaining(), 0);

        let err = arena.alloc_raw(1, 1).unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(arena.remaining(), 0);
    }

    #[test]
    fn pads_to_alignment() {
        let arena = reporting(16);
        let first = arena.alloc_raw(1, 1).unwrap();
        let second = arena.alloc_raw(8, 8).unwrap();
        assert_eq!(second.as_ptr() as usize % 8, 0);
        assert_eq!(second.as_ptr() as usize - first.as_ptr() as usize, 8);
        assert_eq!(arena.remaining(), 0);
    }

    #[test]
    fn handler_sees_request_and_capacity() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let slot = Arc::clone(&seen);
        let arena = Arena::with_failure_handler(32, move |e: &Exhaustion| {
            *slot.lock() = Some(*e);
        })
        .unwrap();
        arena.alloc_raw(30, 1).unwrap();
        let _ = arena.alloc_raw(40, 4);

        let report = (*seen.lock()).expect("handler should have run");
        assert_eq!(report.size, 40);
        assert_eq!(report.align, 4);
        assert_eq!(report.capacity, 32);
        assert_eq!(report.remaining, 2);
    }

    #[test]
    fn failed_request_consumes_nothing() {
        let arena = reporting(32);
        arena.alloc_raw(3, 1).unwrap();
        let before = arena.remaining();
        assert!(arena.alloc_raw(100, 16).is_err());
        assert_eq!(arena.remaining(), before);
        arena.alloc_raw(before, 1).unwrap();
        assert_eq!(arena.remaining(), 0);
    }

    #[test]
    fn oversized_request_does_not_overflow() {
        let arena = reporting(8);
        arena.alloc_raw(1, 1).unwrap();
        assert!(arena.alloc_raw(usize::MAX, 8).is_err());
        assert_eq!(arena.stats().exhaustions, 1);
    }

    #[test]
    fn zero_size_consumes_only_padding() {
        let arena = reporting(32);
        arena.alloc_raw(3, 1).unwrap();
        let p = arena.alloc_raw(0, 4).unwrap();
        assert_eq!(p.as_ptr() as usize % 4, 0);
        assert_eq!(arena.remaining(), 28);
        arena.alloc_raw(0, 1).unwrap();
        assert_eq!(arena.remaining(), 28);
    }

    #[test]
    fn zero_capacity_arena() {
        let arena = reporting(0);
        assert_eq!(arena.remaining(), 0);
        arena.alloc_raw(0, 1).unwrap();
        assert!(arena.alloc_raw(1, 1).is_err());
    }

    #[test]
    fn bytes_are_zeroed_and_writable() {
        let arena = reporting(256);
        let a = arena.alloc_bytes(100, 8).unwrap();
        assert!(a.iter().all(|&b| b == 0));
        a.fill(0xAB);
        let b = arena.alloc_bytes(100, 8).unwrap();
        assert!(b.iter().all(|&b| b == 0));
        assert!(a.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn typed_allocations() {
        let arena = reporting(1024);
        let n: &u64 = arena.alloc(42u64).unwrap();
        assert_eq!(*n, 42);
        assert_eq!(n as *const u64 as usize % std::mem::align_of::<u64>(), 0);

        let s = arena.alloc_str("hello arena").unwrap();
        assert_eq!(s, "hello arena");

        let v = arena.alloc_slice_copy(&[1u32, 2, 3]).unwrap();
        v[1] = 20;
        assert_eq!(v, &[1, 20, 3]);

        let squares = arena.alloc_slice_fill_with(5, |i| i * i).unwrap();
        assert_eq!(squares, &[0, 1, 4, 9, 16]);

        assert!(arena.owns(n as *const u64 as *const u8));
        assert!(arena.owns(s.as_ptr()));
    }

    #[test]
    fn array_layout_overflow_is_reported() {
        let arena = reporting(64);
        let err = arena
            .alloc_slice_fill_with::<u64, _>(usize::MAX, |_| 0)
            .unwrap_err();
        assert!(matches!(err, ArenaError::Layout(_)));
        assert_eq!(arena.remaining(), 64);
    }

    #[test]
    fn capacity_overflow_is_reported() {
        let err = Arena::new(usize::MAX).unwrap_err();
        assert!(matches!(err, ArenaError::CapacityOverflow { .. }));
    }

    #[test]
    fn heap_backed_arena() {
        let arena = Arena::builder(128)
            .failure_handler(ReportExhaustion)
            .region::<HeapRegion>()
            .build()
            .unwrap();
        let x = arena.alloc(7u16).unwrap();
        assert_eq!(*x, 7);
        assert_eq!(arena.remaining(), 126);
        arena.release();
    }

    #[test]
    fn stats_track_usage() {
        let arena = reporting(64);
        arena.alloc_raw(10, 1).unwrap();
        let _ = arena.alloc_raw(100, 1);
        let stats = arena.stats();
        assert_eq!(stats.capacity, 64);
        assert_eq!(stats.used, 10);
        assert_eq!(stats.remaining, 54);
        assert_eq!(stats.exhaustions, 1);
        assert_eq!(stats.region_size, arena.region_size());
    }

    #[test]
    fn poisoning_follows_allocations() {
        let shadow = ShadowPoisoner::new();
        let arena = Arena::builder(1024)
            .failure_handler(ReportExhaustion)
            .poisoner(shadow.clone())
            .build()
            .unwrap();

        let a = arena.alloc_raw(16, 8).unwrap().as_ptr();
        assert!(shadow.range_is(a, 16, Shadow::Unpoisoned));
        // SAFETY: one past the allocation, still inside the arena.
        let after = unsafe { a.add(16) };
        assert!(shadow.range_is(after, 16 + 256, Shadow::Poisoned));

        // Far beyond the lookahead window the initial poisoning still holds.
        // SAFETY: inside the usable span.
        let far = unsafe { a.add(1000) };
        assert_eq!(shadow.state(far), Some(Shadow::Poisoned));
    }

    #[test]
    fn lookahead_window_covers_size_plus_lookahead() {
        let shadow = ShadowPoisoner::new();
        let arena = Arena::builder(2048)
            .failure_handler(ReportExhaustion)
            .poisoner(shadow.clone())
            .build()
            .unwrap();

        let a = arena.alloc_raw(16, 8).unwrap().as_ptr();
        // Clear the poisoning done at construction so only the next bump shows.
        shadow.unpoison(a, 2048);

        let b = arena.alloc_raw(4, 1).unwrap().as_ptr();
        assert_eq!(b as usize, a as usize + 16);
        assert!(shadow.range_is(b, 4, Shadow::Unpoisoned));
        // SAFETY: inside the usable span.
        let next = unsafe { b.add(4) };
        assert!(shadow.range_is(next, 4 + 256, Shadow::Poisoned));
        // SAFETY: inside the usable span.
        let past = unsafe { next.add(4 + 256) };
        assert_eq!(shadow.state(past), Some(Shadow::Unpoisoned));
    }

    #[test]
    fn lookahead_is_clamped_to_remaining() {
        let shadow = ShadowPoisoner::new();
        let arena = Arena::builder(40)
            .failure_handler(ReportExhaustion)
            .poisoner(shadow.clone())
            .poison_lookahead(0)
            .build()
            .unwrap();
        let a = arena.alloc_raw(30, 1).unwrap().as_ptr();
        let marks = shadow.marks();
        arena.alloc_raw(10, 1).unwrap();
        // The second bump leaves nothing to poison, so only the unpoison mark
        // is added.
        assert_eq!(shadow.marks(), marks + 1);
        assert!(shadow.range_is(a, 40, Shadow::Unpoisoned));
    }

    #[test]
    fn release_retires_region() {
        let shadow = ShadowPoisoner::new();
        let arena = Arena::builder(64)
            .poisoner(shadow.clone())
            .build()
            .unwrap();
        let p = arena.alloc_raw(8, 8).unwrap().as_ptr() as usize;
        arena.release();
        assert_eq!(shadow.state(p as *const u8), Some(Shadow::Retired));
    }

    #[test]
    fn arena_moves_across_threads() {
        let arena = reporting(64);
        let remaining = std::thread::spawn(move || {
            arena.alloc_raw(8, 8).unwrap();
            arena.remaining()
        })
        .join()
        .unwrap();
        assert_eq!(remaining, 56);
    }

    #[test]
    fn debug_shows_accounting() {
        let arena = reporting(64);
        let dbg = format!("{arena:?}");
        assert!(dbg.contains("remaining: 64"));
        assert!(dbg.contains("capacity: 64"));
    }
}
