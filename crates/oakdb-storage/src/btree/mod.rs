//! B+ tree page engine.
//!
//! The tree works directly on fixed-size pages acquired from a `PagePool`.
//! Two page formats exist, chosen by the index key type:
//!
//! - Scalar pages for fixed-width keys (booleans, integers, floats, dates,
//!   object references): a key array growing forward and a reference array
//!   growing backward.
//! - Variable-length pages for strings and byte arrays: 8-byte slot
//!   descriptors growing forward and a key heap growing backward.
//!
//! See `layout` for the exact byte format.
//!
//! ## Tree shape
//!
//! ```text
//!                 [ k1 | k2 ]            internal: n keys, n+1 children
//!                /     |     \
//!        [.. k1]   [.. k2]   [.. ]       leaves: n keys, n object ids
//! ```
//!
//! Separator key `i` of an internal page is an inclusive upper bound of
//! child `i`. When a page splits, the new page takes the lower half and its
//! last key becomes the separator inserted into the parent.
//!
//! Insert reports `Overflow` upward, remove reports `Underflow` upward; the
//! owning `BtreeIndex` grows or collapses the root.

/// Returns `OakError::InternalConsistency` from the enclosing function when
/// the condition does not hold.
macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err(oakdb_common::OakError::InternalConsistency(format!($($arg)+)));
        }
    };
}

pub mod compact;
pub mod compare;
pub mod index;
pub mod insert;
pub mod layout;
pub mod remove;
pub mod search;
pub mod traverse;

pub use compact::{compactify, Pivot};
pub use index::BtreeIndex;
pub use traverse::ObjectResolver;

use oakdb_buffer::PagePool;
use oakdb_common::page::key_space;
use oakdb_common::{Key, KeyType, ObjectId};

/// Outcome of a page-level insert or remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpResult {
    /// The operation completed within the page.
    Done,
    /// The page was split; the separator and new page are in the `BtreeKey`.
    Overflow,
    /// The page fell below its minimum load.
    Underflow,
    /// The key already exists in a unique index; nothing changed.
    Duplicate,
    /// The key existed and its id was replaced; the old id is in `old_oid`.
    Overwrite,
    /// No matching entry.
    NotFound,
}

/// Key and id travelling through one insert or remove.
///
/// On `Overflow` the tree rewrites `key` and `oid` with the separator key
/// and the id of the new page, which the caller inserts one level up.
#[derive(Debug, Clone, PartialEq)]
pub struct BtreeKey {
    /// The probe key.
    pub key: Key,
    /// Object id at leaf level, child page id at internal level. 0 is the
    /// wildcard for removal.
    pub oid: u32,
    /// Previous id after `Overwrite` or a successful remove.
    pub old_oid: u32,
}

impl BtreeKey {
    pub fn new(key: Key, oid: ObjectId) -> Self {
        Self {
            key,
            oid: oid.as_u32(),
            old_oid: 0,
        }
    }
}

/// One end of a range query.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub key: Key,
    pub inclusive: bool,
}

impl Bound {
    pub fn inclusive(key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            inclusive: true,
        }
    }

    pub fn exclusive(key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            inclusive: false,
        }
    }

    /// The inclusion flag as the comparator threshold (0 or 1).
    #[inline]
    pub(crate) fn inclusion(&self) -> i32 {
        self.inclusive as i32
    }
}

/// Page representation used for a key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Fixed-width keys of `width` bytes.
    Scalar { width: usize },
    /// UTF-16 string keys.
    String,
    /// Raw byte-array keys.
    ByteArray,
}

impl PageKind {
    pub fn of(key_type: KeyType) -> Self {
        match key_type {
            KeyType::String => PageKind::String,
            KeyType::ByteArray => PageKind::ByteArray,
            other => PageKind::Scalar {
                width: other.fixed_size().unwrap_or(4),
            },
        }
    }

    /// Bytes per key length unit on variable-length pages.
    #[inline]
    pub fn unit(&self) -> usize {
        match self {
            PageKind::String => 2,
            PageKind::ByteArray => 1,
            PageKind::Scalar { width } => *width,
        }
    }

    #[inline]
    pub fn is_scalar(&self) -> bool {
        matches!(self, PageKind::Scalar { .. })
    }
}

/// Everything a page-level operation needs besides the page itself.
pub(crate) struct TreeContext<'a> {
    pub pool: &'a PagePool,
    pub key_type: KeyType,
    pub kind: PageKind,
    pub key_space: usize,
}

impl<'a> TreeContext<'a> {
    pub fn new(pool: &'a PagePool, key_type: KeyType) -> Self {
        Self {
            pool,
            key_type,
            kind: PageKind::of(key_type),
            key_space: key_space(pool.page_size()),
        }
    }

    /// Load below which a page reports `Underflow`.
    #[inline]
    pub fn underflow_limit(&self) -> usize {
        self.key_space / 3
    }

    /// Maximum number of key/reference pairs on a scalar page.
    #[inline]
    pub fn max_items(&self, width: usize) -> usize {
        layout::max_scalar_items(self.key_space, width)
    }

    /// Reads the child or object id at slot `i` of either page format.
    #[inline]
    pub fn child(&self, data: &[u8], i: usize) -> u32 {
        match self.kind {
            PageKind::Scalar { .. } => layout::reference(data, i),
            _ => layout::slot_oid(data, i),
        }
    }

    /// Decodes the key at slot `i`.
    pub fn key_at(&self, data: &[u8], i: usize) -> Key {
        match self.kind {
            PageKind::Scalar { width } => {
                Key::decode_scalar(self.key_type, layout::scalar_key(data, width, i))
            }
            kind => Key::decode_var(self.key_type, layout::var_key(data, i, kind.unit())),
        }
    }
}

/// Largest variable-length key, in bytes, that pages of this key space accept.
#[inline]
pub fn max_var_key_bytes(key_space: usize) -> usize {
    (key_space / 2).saturating_sub(16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_kind_of() {
        assert_eq!(PageKind::of(KeyType::Int), PageKind::Scalar { width: 4 });
        assert_eq!(PageKind::of(KeyType::Date), PageKind::Scalar { width: 8 });
        assert_eq!(PageKind::of(KeyType::String), PageKind::String);
        assert_eq!(PageKind::of(KeyType::ByteArray).unit(), 1);
        assert_eq!(PageKind::String.unit(), 2);
        assert!(!PageKind::ByteArray.is_scalar());
    }

    #[test]
    fn test_bound_inclusion() {
        assert_eq!(Bound::inclusive(3).inclusion(), 1);
        assert_eq!(Bound::exclusive("a").inclusion(), 0);
    }

    #[test]
    fn test_max_var_key_bytes() {
        assert_eq!(max_var_key_bytes(16380), 8174);
        assert_eq!(max_var_key_bytes(60), 14);
    }

    #[test]
    fn test_ensure_macro() {
        fn check(v: usize) -> oakdb_common::Result<usize> {
            ensure!(v < 10, "value {} out of range", v);
            Ok(v)
        }
        assert_eq!(check(3).unwrap(), 3);
        let err = check(12).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Internal consistency violation: value 12 out of range"
        );
    }
}
