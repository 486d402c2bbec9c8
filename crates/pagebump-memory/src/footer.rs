//! Control block stored at the tail of an arena's own reservation.
//!
//! ```text
//!  base                     cursor            cursor + remaining
//!   │ page slack (never used) │ usable bytes ... │ Footer │ ← region end
//! ```
//!
//! The footer owns the region it lives in. Reading it out with
//! [`Footer::take`] is the only way to drop it, and dropping it releases the
//! reservation.
#![allow(unsafe_code)]

use std::cell::Cell;
use std::mem;
use std::ptr::{self, NonNull};

use crate::failure::FailureHandler;
use crate::poison::Poisoner;
use crate::region::Region;

pub(crate) struct Footer<R, P> {
    /// Address this footer was written to.
    this: usize,
    pub(crate) capacity: usize,
    pub(crate) lookahead: usize,
    pub(crate) exhaustions: Cell<u64>,
    pub(crate) handler: Box<dyn FailureHandler>,
    pub(crate) poisoner: P,
    pub(crate) region: R,
}

impl<R: Region, P: Poisoner> Footer<R, P> {
    pub(crate) const SIZE: usize = mem::size_of::<Self>();

    /// Region size needed for `capacity` usable bytes plus the footer.
    pub(crate) fn region_len(capacity: usize, page: usize) -> Option<usize> {
        capacity
            .checked_add(Self::SIZE)
            .and_then(|len| crate::region::round_to_page(len, page))
    }

    /// Write a footer into the last bytes of `region` and return its address
    /// together with the start of the usable span.
    ///
    /// The region must be at least `capacity + SIZE` bytes long.
    pub(crate) fn install(
        region: R,
        capacity: usize,
        lookahead: usize,
        handler: Box<dyn FailureHandler>,
        poisoner: P,
    ) -> (NonNull<Self>, NonNull<u8>) {
        assert!(
            region.len() >= capacity + Self::SIZE,
            "region too small for arena"
        );
        let base = region.base();
        // SAFETY: the offset is in bounds by the assertion above. The region
        // end is page aligned and SIZE is a multiple of the footer's
        // alignment, so the footer slot is aligned.
        let slot = unsafe { base.as_ptr().add(region.len() - Self::SIZE) }.cast::<Self>();
        debug_assert_eq!(slot as usize % mem::align_of::<Self>(), 0);

        let footer = Self {
            this: slot as usize,
            capacity,
            lookahead,
            exhaustions: Cell::new(0),
            handler,
            poisoner,
            region,
        };
        // SAFETY: the slot is in bounds, aligned, and not otherwise in use.
        unsafe { ptr::write(slot, footer) };

        // SAFETY: `slot - capacity` is still inside the region.
        let data = unsafe { slot.cast::<u8>().sub(capacity) };
        // SAFETY: both derive from the non-null region base.
        unsafe { (NonNull::new_unchecked(slot), NonNull::new_unchecked(data)) }
    }

    /// Whether the footer at `at` is the one that was installed there.
    pub(crate) fn is_at(&self, at: *const Self) -> bool {
        let base = self.region.base().as_ptr() as usize;
        self.this == at as usize && base + self.region.len() - Self::SIZE == self.this
    }

    /// Move the footer out of the reservation.
    ///
    /// # Safety
    ///
    /// `at` must point to a footer produced by [`Footer::install`] that has
    /// not been taken yet. The slot must not be read again afterwards.
    pub(crate) unsafe fn take(at: NonNull<Self>) -> Self {
        ptr::read(at.as_ptr())
    }

    /// Start of the reservation.
    pub(crate) fn base(&self) -> NonNull<u8> {
        self.region.base()
    }

    /// Bytes between the region base and the footer.
    pub(crate) fn span(&self) -> usize {
        self.this - self.region.base().as_ptr() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::ReportExhaustion;
    use crate::poison::NoPoison;
    use crate::region::{page_size, HeapRegion};

    type TestFooter = Footer<HeapRegion, NoPoison>;

    #[test]
    fn region_len_rounds_to_pages() {
        let page = page_size();
        assert_eq!(TestFooter::region_len(0, page), Some(page));
        assert_eq!(TestFooter::region_len(page - TestFooter::SIZE, page), Some(page));
        assert_eq!(
            TestFooter::region_len(page - TestFooter::SIZE + 1, page),
            Some(2 * page)
        );
        assert_eq!(TestFooter::region_len(usize::MAX, page), None);
    }

    #[test]
    fn install_places_footer_at_region_tail() {
        let page = page_size();
        let region = HeapRegion::reserve(page).unwrap();
        let end = region.base().as_ptr() as usize + region.len();

        let (footer, data) =
            TestFooter::install(region, 100, 256, Box::new(ReportExhaustion), NoPoison);
        assert_eq!(footer.as_ptr() as usize + TestFooter::SIZE, end);
        assert_eq!(data.as_ptr() as usize + 100, footer.as_ptr() as usize);

        // SAFETY: freshly installed and taken exactly once.
        let taken = unsafe { TestFooter::take(footer) };
        assert!(taken.is_at(footer.as_ptr()));
        assert_eq!(taken.capacity, 100);
        assert_eq!(taken.lookahead, 256);
        assert_eq!(taken.span(), page - TestFooter::SIZE);
    }

    #[test]
    fn footer_size_is_multiple_of_alignment() {
        assert_eq!(TestFooter::SIZE % mem::align_of::<TestFooter>(), 0);
    }
}
