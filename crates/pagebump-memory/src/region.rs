//! Backing memory for arenas.
//!
//! A [`Region`] is a block of fresh, zero-filled, page-aligned, read-write
//! memory that is reserved in one call and released in one call when the
//! value is dropped. The arena never looks past this interface, so any
//! primitive that can satisfy it will do.
#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::io;
use std::ptr::NonNull;
use std::sync::OnceLock;

use memmap2::MmapMut;

use crate::constants::FALLBACK_PAGE_SIZE;

/// A reserved block of memory, released when dropped.
///
/// # Safety
///
/// Implementations must hand out `len()` bytes starting at `base()` that are
/// zero-filled, readable, writable, aligned to [`page_size`], and stay valid
/// and unaliased until the value is dropped. Moving the value must not move
/// the memory.
pub unsafe trait Region: Sized + Send {
    /// Reserve at least `len` bytes. `len` is a non-zero multiple of the page
    /// size.
    fn reserve(len: usize) -> io::Result<Self>;

    /// First byte of the reservation.
    fn base(&self) -> NonNull<u8>;

    /// Size of the reservation in bytes.
    fn len(&self) -> usize;

    /// Whether the reservation is empty. Never true for a reserved region.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Platform page granularity, queried once.
#[must_use]
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(query_page_size)
}

#[cfg(unix)]
fn query_page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size)
        .ok()
        .filter(|s| s.is_power_of_two())
        .unwrap_or(FALLBACK_PAGE_SIZE)
}

#[cfg(not(unix))]
fn query_page_size() -> usize {
    FALLBACK_PAGE_SIZE
}

/// Round `len` up to a multiple of `page`, which must be a power of two.
pub(crate) fn round_to_page(len: usize, page: usize) -> Option<usize> {
    debug_assert!(page.is_power_of_two());
    len.checked_add(page - 1).map(|n| n & !(page - 1))
}

/// Anonymous private mapping.
pub struct MmapRegion {
    base: NonNull<u8>,
    map: MmapMut,
}

// SAFETY: the mapping is exclusively owned; `base` points into it.
unsafe impl Send for MmapRegion {}

// SAFETY: anonymous mappings are zero-filled, page-aligned and read-write;
// the mapping stays put until `MmapMut` is dropped.
unsafe impl Region for MmapRegion {
    fn reserve(len: usize) -> io::Result<Self> {
        let mut map = MmapMut::map_anon(len)?;
        let base = NonNull::new(map.as_mut_ptr())
            .ok_or_else(|| io::Error::other("mmap returned a null base"))?;
        Ok(Self { base, map })
    }

    fn base(&self) -> NonNull<u8> {
        self.base
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Page-aligned zeroed block from the global allocator.
///
/// Useful where mappings are unavailable or unwanted, such as under Miri.
pub struct HeapRegion {
    base: NonNull<u8>,
    layout: Layout,
}

// SAFETY: the block is exclusively owned.
unsafe impl Send for HeapRegion {}

// SAFETY: `alloc_zeroed` returns zeroed memory with the requested page
// alignment, valid until `dealloc` in `Drop`.
unsafe impl Region for HeapRegion {
    fn reserve(len: usize) -> io::Result<Self> {
        let layout = Layout::from_size_align(len, page_size())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        if layout.size() == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot reserve an empty region",
            ));
        }
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let base = NonNull::new(ptr).ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))?;
        Ok(Self { base, layout })
    }

    fn base(&self) -> NonNull<u8> {
        self.base
    }

    fn len(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        // SAFETY: allocated in `reserve` with this exact layout.
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}
