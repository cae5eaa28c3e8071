//! Key comparison against keys stored in pages.
//!
//! Comparisons are always "probe versus stored key at slot i", so the
//! probe never has to be encoded.

use super::layout;
use super::{PageKind, TreeContext};
use oakdb_common::Key;
use std::cmp::Ordering;

/// IEEE comparison with `<` and `==`: anything unordered (NaN) is Greater.
#[inline]
fn float_order<T: PartialOrd>(a: T, b: T) -> Ordering {
    if a < b {
        Ordering::Less
    } else if a == b {
        Ordering::Equal
    } else {
        Ordering::Greater
    }
}

/// Orders two scalar keys of the same type.
pub fn compare_scalars(a: &Key, b: &Key) -> Ordering {
    match (a, b) {
        (Key::Boolean(x), Key::Boolean(y)) => x.cmp(y),
        (Key::Byte(x), Key::Byte(y)) => x.cmp(y),
        (Key::Char(x), Key::Char(y)) => x.cmp(y),
        (Key::Short(x), Key::Short(y)) => x.cmp(y),
        (Key::Int(x), Key::Int(y)) | (Key::Enum(x), Key::Enum(y)) => x.cmp(y),
        (Key::Long(x), Key::Long(y)) | (Key::Date(x), Key::Date(y)) => x.cmp(y),
        (Key::Object(x), Key::Object(y)) => x.cmp(y),
        (Key::Float(x), Key::Float(y)) => float_order(*x, *y),
        (Key::Double(x), Key::Double(y)) => float_order(*x, *y),
        _ => unreachable!(
            "mismatched scalar keys {:?} and {:?}",
            a.key_type(),
            b.key_type()
        ),
    }
}

/// Orders UTF-16 code units against their little-endian heap image.
fn compare_units(probe: &[u16], stored: &[u8]) -> Ordering {
    for (unit, chunk) in probe.iter().zip(stored.chunks_exact(2)) {
        let stored_unit = u16::from_le_bytes([chunk[0], chunk[1]]);
        match unit.cmp(&stored_unit) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    probe.len().cmp(&(stored.len() / 2))
}

/// Compares only the first `min(len(probe), len(stored))` units.
///
/// Equal means the stored key starts with the probe. A stored key that is a
/// proper prefix of the probe orders before it (Greater).
fn prefix_order<T: Ord>(
    probe: &[T],
    stored_len: usize,
    stored_at: impl Fn(usize) -> T,
) -> Ordering {
    let common = probe.len().min(stored_len);
    for (i, unit) in probe.iter().take(common).enumerate() {
        match unit.cmp(&stored_at(i)) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    if stored_len < probe.len() {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

impl TreeContext<'_> {
    /// Orders the probe against the key at slot `i`.
    pub fn compare(&self, probe: &Key, data: &[u8], i: usize) -> Ordering {
        match (self.kind, probe) {
            (PageKind::Scalar { width }, _) => {
                let stored = Key::decode_scalar(self.key_type, layout::scalar_key(data, width, i));
                compare_scalars(probe, &stored)
            }
            (PageKind::String, Key::Str(units)) => {
                compare_units(units, layout::var_key(data, i, 2))
            }
            (PageKind::ByteArray, Key::Bytes(bytes)) => {
                bytes[..].cmp(layout::var_key(data, i, 1))
            }
            _ => unreachable!("probe {:?} on {:?} page", probe.key_type(), self.kind),
        }
    }

    /// Prefix comparison of the probe against the key at slot `i`.
    ///
    /// Scalar keys have no prefixes; they fall back to `compare`.
    pub fn compare_prefix(&self, probe: &Key, data: &[u8], i: usize) -> Ordering {
        match (self.kind, probe) {
            (PageKind::String, Key::Str(units)) => {
                let stored = layout::var_key(data, i, 2);
                prefix_order(units, stored.len() / 2, |j| {
                    u16::from_le_bytes([stored[2 * j], stored[2 * j + 1]])
                })
            }
            (PageKind::ByteArray, Key::Bytes(bytes)) => {
                let stored = layout::var_key(data, i, 1);
                prefix_order(&bytes[..], stored.len(), |j| stored[j])
            }
            _ => self.compare(probe, data, i),
        }
    }

    /// Orders the probe against slot `i` as the comparator threshold value.
    #[inline]
    pub fn compare_i32(&self, probe: &Key, data: &[u8], i: usize) -> i32 {
        self.compare(probe, data, i) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::layout::*;
    use oakdb_buffer::PagePool;
    use oakdb_common::{KeyType, ObjectId};

    fn var_page(keys: &[&[u8]]) -> Vec<u8> {
        let mut page = vec![0u8; 128];
        let mut top = key_space(&page);
        for (i, key) in keys.iter().enumerate() {
            top -= key.len();
            heap_bytes_mut(&mut page, top, key.len()).copy_from_slice(key);
            set_slot(&mut page, i, 1, key.len(), top);
        }
        set_item_count(&mut page, keys.len());
        let ks = key_space(&page);
        set_used_size(&mut page, ks - top);
        page
    }

    fn string_page(keys: &[&str]) -> Vec<u8> {
        let mut page = vec![0u8; 128];
        let mut top = key_space(&page);
        for (i, s) in keys.iter().enumerate() {
            let key = Key::from(*s);
            let len = key.var_byte_len();
            top -= len;
            key.encode_var(heap_bytes_mut(&mut page, top, len));
            set_slot(&mut page, i, 1, key.var_len(), top);
        }
        set_item_count(&mut page, keys.len());
        page
    }

    #[test]
    fn test_compare_scalars() {
        assert_eq!(compare_scalars(&Key::Int(-5), &Key::Int(3)), Ordering::Less);
        assert_eq!(
            compare_scalars(&Key::Boolean(false), &Key::Boolean(true)),
            Ordering::Less
        );
        assert_eq!(
            compare_scalars(&Key::Date(10), &Key::Date(10)),
            Ordering::Equal
        );
        assert_eq!(
            compare_scalars(&Key::Object(ObjectId(9)), &Key::Object(ObjectId(2))),
            Ordering::Greater
        );
        assert_eq!(
            compare_scalars(&Key::Double(-0.5), &Key::Double(0.25)),
            Ordering::Less
        );
    }

    #[test]
    fn test_compare_nan_is_greater() {
        assert_eq!(
            compare_scalars(&Key::Double(f64::NAN), &Key::Double(1.0)),
            Ordering::Greater
        );
        assert_eq!(
            compare_scalars(&Key::Float(1.0), &Key::Float(f32::NAN)),
            Ordering::Greater
        );
        assert_eq!(
            compare_scalars(&Key::Float(f32::NAN), &Key::Float(f32::NAN)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_compare_scalar_slot() {
        let pool = PagePool::with_page_size(64).unwrap();
        let ctx = TreeContext::new(&pool, KeyType::Long);
        let mut page = vec![0u8; 64];
        Key::Long(100).encode_scalar(scalar_key_mut(&mut page, 8, 1));
        assert_eq!(ctx.compare(&Key::Long(99), &page, 1), Ordering::Less);
        assert_eq!(ctx.compare(&Key::Long(100), &page, 1), Ordering::Equal);
        assert_eq!(ctx.compare_i32(&Key::Long(-1), &page, 1), -1);
    }

    #[test]
    fn test_compare_byte_arrays_unsigned() {
        let pool = PagePool::with_page_size(128).unwrap();
        let ctx = TreeContext::new(&pool, KeyType::ByteArray);
        let page = var_page(&[b"\x80", b"ab", b""]);

        // 0x7f < 0x80 when compared unsigned
        assert_eq!(
            ctx.compare(&Key::from(&b"\x7f"[..]), &page, 0),
            Ordering::Less
        );
        // A proper prefix orders first
        assert_eq!(ctx.compare(&Key::from(&b"a"[..]), &page, 1), Ordering::Less);
        assert_eq!(
            ctx.compare(&Key::from(&b"abc"[..]), &page, 1),
            Ordering::Greater
        );
        assert_eq!(ctx.compare(&Key::from(&b""[..]), &page, 2), Ordering::Equal);
    }

    #[test]
    fn test_compare_strings() {
        let pool = PagePool::with_page_size(128).unwrap();
        let ctx = TreeContext::new(&pool, KeyType::String);
        let page = string_page(&["banana", "app"]);

        assert_eq!(ctx.compare(&Key::from("banana"), &page, 0), Ordering::Equal);
        assert_eq!(ctx.compare(&Key::from("apple"), &page, 0), Ordering::Less);
        assert_eq!(
            ctx.compare(&Key::from("apple"), &page, 1),
            Ordering::Greater
        );
        assert_eq!(ctx.compare(&Key::from("ap"), &page, 1), Ordering::Less);
    }

    #[test]
    fn test_compare_prefix() {
        let pool = PagePool::with_page_size(128).unwrap();
        let ctx = TreeContext::new(&pool, KeyType::String);
        let page = string_page(&["apple", "ap", "banana"]);

        // "apple" starts with "app"
        assert_eq!(
            ctx.compare_prefix(&Key::from("app"), &page, 0),
            Ordering::Equal
        );
        // "ap" is shorter than the probe and sorts before every "app..." key
        assert_eq!(
            ctx.compare_prefix(&Key::from("app"), &page, 1),
            Ordering::Greater
        );
        assert_eq!(
            ctx.compare_prefix(&Key::from("app"), &page, 2),
            Ordering::Less
        );
        assert_eq!(
            ctx.compare_prefix(&Key::from(""), &page, 2),
            Ordering::Equal
        );
    }
}
