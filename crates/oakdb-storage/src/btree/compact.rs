//! Heap compaction for variable-length pages.

use super::layout::{self, SLOT_SIZE};

/// Which entries a compaction drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pivot {
    /// Drop the first `m` entries and shift the survivors to the front.
    Front(usize),
    /// Drop the last `m` entries.
    Back(usize),
}

/// Rebuilds the heap of a variable-length page contiguously from the high end.
///
/// Live keys are relocated in descending order of their current offset, so
/// every copy moves bytes toward the end of the page and never overwrites a
/// key that has not been moved yet. `has_extra` marks an internal page whose
/// slot at index `item_count` carries the extra child reference. After the
/// compaction the slot at the new item count is the extra slot, with length 0.
///
/// Returns the new item count; the header is updated.
pub fn compactify(data: &mut [u8], pivot: Pivot, has_extra: bool, unit: usize) -> usize {
    let n = layout::item_count(data);
    let key_space = layout::key_space(data);
    let (first, new_n) = match pivot {
        Pivot::Front(m) => (m, n - m),
        Pivot::Back(m) => (0, n - m),
    };

    // With Back(m) the child of the first dropped key becomes the extra reference.
    if first > 0 {
        let moved = if has_extra { new_n + 1 } else { new_n };
        layout::move_slots(data, 0, first, moved);
    }

    // (current offset, byte length, slot) of every non-empty survivor
    let mut live: Vec<(usize, usize, usize)> = (0..new_n)
        .filter_map(|i| {
            let len = layout::slot_len(data, i) * unit;
            (len > 0).then(|| (layout::slot_offs(data, i), len, i))
        })
        .collect();
    live.sort_unstable_by(|a, b| b.0.cmp(&a.0));

    let mut top = key_space;
    for (offs, len, slot) in live {
        top -= len;
        if offs != top {
            layout::move_heap(data, top, offs, len);
        }
        layout::set_slot_offs(data, slot, top);
    }

    for i in 0..new_n {
        if layout::slot_len(data, i) == 0 {
            layout::set_slot_offs(data, i, key_space);
        }
    }
    if has_extra {
        layout::set_slot_len(data, new_n, 0);
        layout::set_slot_offs(data, new_n, key_space);
    }

    layout::set_used_size(data, key_space - top);
    layout::set_item_count(data, new_n);
    layout::debug_check_var_page(data, new_n + has_extra as usize);
    debug_assert!(new_n * SLOT_SIZE <= top);
    new_n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::layout::*;

    /// Builds a leaf page holding `keys` with a deliberately fragmented heap:
    /// each key is followed by a gap of 3 bytes.
    fn fragmented_page(keys: &[&[u8]]) -> Vec<u8> {
        let mut page = vec![0u8; 128];
        let key_space = key_space(&page);
        let mut top = key_space;
        for (i, key) in keys.iter().enumerate() {
            top -= key.len() + 3;
            heap_bytes_mut(&mut page, top, key.len()).copy_from_slice(key);
            set_slot(&mut page, i, i as u32 + 1, key.len(), top);
        }
        set_item_count(&mut page, keys.len());
        set_used_size(&mut page, key_space - top);
        page
    }

    fn keys_of(page: &[u8]) -> Vec<Vec<u8>> {
        (0..item_count(page)).map(|i| var_key(page, i, 1).to_vec()).collect()
    }

    #[test]
    fn test_compactify_full() {
        let mut page = fragmented_page(&[b"aa", b"bbb", b"", b"c"]);
        let n = compactify(&mut page, Pivot::Front(0), false, 1);
        assert_eq!(n, 4);
        assert_eq!(used_size(&page), 6);
        assert_eq!(
            keys_of(&page),
            vec![b"aa".to_vec(), b"bbb".to_vec(), vec![], b"c".to_vec()]
        );
        // Heap is packed against the page end
        assert_eq!(&page[128 - 6..], b"cbbbaa");
    }

    #[test]
    fn test_compactify_is_idempotent() {
        let mut page = fragmented_page(&[b"apple", b"", b"kiwi", b"z"]);
        compactify(&mut page, Pivot::Front(0), false, 1);
        let once = page.clone();
        compactify(&mut page, Pivot::Front(0), false, 1);
        assert_eq!(page, once);
    }

    #[test]
    fn test_compactify_front_drops_prefix() {
        let mut page = fragmented_page(&[b"aa", b"bbb", b"cccc"]);
        let n = compactify(&mut page, Pivot::Front(2), false, 1);
        assert_eq!(n, 1);
        assert_eq!(keys_of(&page), vec![b"cccc".to_vec()]);
        assert_eq!(slot_oid(&page, 0), 3);
        assert_eq!(used_size(&page), 4);
    }

    #[test]
    fn test_compactify_back_drops_suffix() {
        let mut page = fragmented_page(&[b"aa", b"bbb", b"cccc"]);
        let n = compactify(&mut page, Pivot::Back(1), false, 1);
        assert_eq!(n, 2);
        assert_eq!(keys_of(&page), vec![b"aa".to_vec(), b"bbb".to_vec()]);
        assert_eq!(used_size(&page), 5);
    }

    #[test]
    fn test_compactify_keeps_extra_slot() {
        let mut page = fragmented_page(&[b"aa", b"bbb", b"cccc"]);
        // Internal page: slot 3 carries the extra child
        set_slot(&mut page, 3, 77, 0, 0);

        let n = compactify(&mut page, Pivot::Front(1), true, 1);
        assert_eq!(n, 2);
        assert_eq!(slot_oid(&page, 2), 77);
        assert_eq!(slot_len(&page, 2), 0);

        let n = compactify(&mut page, Pivot::Back(1), true, 1);
        assert_eq!(n, 1);
        // The extra reference is now the child of the dropped key
        assert_eq!(slot_oid(&page, 1), 3);
        assert_eq!(slot_len(&page, 1), 0);
        assert_eq!(keys_of(&page), vec![b"bbb".to_vec()]);
    }

    #[test]
    fn test_compactify_string_units() {
        let mut page = vec![0u8; 64];
        let key_space = key_space(&page);
        // Two 2-unit keys with a gap between them
        heap_bytes_mut(&mut page, key_space - 4, 4).copy_from_slice(&[1, 0, 2, 0]);
        heap_bytes_mut(&mut page, key_space - 10, 4).copy_from_slice(&[3, 0, 4, 0]);
        set_slot(&mut page, 0, 1, 2, key_space - 4);
        set_slot(&mut page, 1, 2, 2, key_space - 10);
        set_item_count(&mut page, 2);
        set_used_size(&mut page, 10);

        compactify(&mut page, Pivot::Front(0), false, 2);
        assert_eq!(used_size(&page), 8);
        assert_eq!(var_key(&page, 1, 2), &[3, 0, 4, 0]);
        assert_eq!(slot_offs(&page, 1), key_space - 8);
    }
}
