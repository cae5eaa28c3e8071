//! Free-space bitmap for page allocation.
//!
//! One bit per page: set means allocated. Page 0 is permanently set so that
//! a zero reference can mean "no page".
//!
//! Word layout:
//! ```text
//! word 0: bit 0 = page 0 (reserved), bit 1 = page 1, ...
//! word 1: bit 0 = page 64, ...
//! ```

use oakdb_common::page::PageId;
use oakdb_common::{OakError, Result};

const BITS_PER_WORD: usize = 64;

/// Largest page number the bitmap hands out.
pub const MAX_PAGE_NUM: u32 = u32::MAX - 1;

/// Allocation bitmap over page numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeSpaceBitmap {
    words: Vec<u64>,
    allocated: usize,
}

impl FreeSpaceBitmap {
    /// Creates a bitmap with only the reserved page 0 set.
    pub fn new() -> Self {
        Self {
            words: vec![1],
            allocated: 0,
        }
    }

    /// Creates a bitmap with room for `pages` page numbers.
    pub fn with_capacity(pages: usize) -> Self {
        let mut words = Vec::with_capacity(pages.div_ceil(BITS_PER_WORD).max(1));
        words.push(1);
        Self {
            words,
            allocated: 0,
        }
    }

    /// Sets the lowest clear bit and returns its page.
    pub fn allocate(&mut self) -> Result<PageId> {
        let word_idx = match self.words.iter().position(|&w| w != u64::MAX) {
            Some(idx) => idx,
            None => {
                self.words.push(0);
                self.words.len() - 1
            }
        };
        let bit = (!self.words[word_idx]).trailing_zeros() as usize;
        let page_num = word_idx * BITS_PER_WORD + bit;
        if page_num > MAX_PAGE_NUM as usize {
            return Err(OakError::OutOfPages);
        }
        self.words[word_idx] |= 1u64 << bit;
        self.allocated += 1;
        Ok(PageId::new(page_num as u32))
    }

    /// Clears the bit of a page. Releasing page 0 or a clear bit is ignored.
    pub fn release(&mut self, page_id: PageId) {
        if page_id.is_null() {
            return;
        }
        let (word_idx, mask) = Self::locate(page_id);
        if let Some(word) = self.words.get_mut(word_idx) {
            if *word & mask != 0 {
                *word &= !mask;
                self.allocated -= 1;
            }
        }
    }

    /// Returns true if the page is allocated. Page 0 never is.
    pub fn is_allocated(&self, page_id: PageId) -> bool {
        if page_id.is_null() {
            return false;
        }
        let (word_idx, mask) = Self::locate(page_id);
        self.words.get(word_idx).is_some_and(|w| w & mask != 0)
    }

    /// Returns the number of allocated pages.
    pub fn allocated_count(&self) -> usize {
        self.allocated
    }

    #[inline]
    fn locate(page_id: PageId) -> (usize, u64) {
        let n = page_id.as_u32() as usize;
        (n / BITS_PER_WORD, 1u64 << (n % BITS_PER_WORD))
    }
}

impl Default for FreeSpaceBitmap {
    fn default() -> Self {
        Self::new()
    }
}
