//! Page identifiers and page geometry shared by the page pool and the B+ tree.

use serde::{Deserialize, Serialize};

/// Default page size in bytes (16 KB).
pub const PAGE_SIZE: usize = 16 * 1024;

/// Smallest supported page size. Small pages are mostly useful in tests,
/// where they force deep trees with a handful of keys.
pub const MIN_PAGE_SIZE: usize = 64;

/// Largest supported page size. Heap offsets and item counts are 16-bit.
pub const MAX_PAGE_SIZE: usize = 64 * 1024;

/// Size of the common page header: item_count (u16) + used_size (u16).
pub const PAGE_HEADER_SIZE: usize = 4;

/// Identifier of a page within the page pool.
///
/// Page 0 is never allocated; a zero reference on disk means "no page".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// The null page reference.
    pub const NULL: PageId = PageId(0);

    /// Creates a new PageId.
    pub fn new(page_num: u32) -> Self {
        Self(page_num)
    }

    /// Returns the raw 4-byte reference stored in pages.
    #[inline]
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns true if this is the null reference.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page:{}", self.0)
    }
}

/// Identifier of a persistent object referenced from B+ tree leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// The null object reference.
    pub const NULL: ObjectId = ObjectId(0);

    /// Returns the raw 4-byte reference stored in pages.
    #[inline]
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns true if this is the null reference.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "oid:{}", self.0)
    }
}

/// Returns the number of bytes available for keys, references and heap in
/// a page of the given size.
#[inline]
pub fn key_space(page_size: usize) -> usize {
    page_size - PAGE_HEADER_SIZE
}
