//! Insertion and page splits.

use super::compact::{compactify, Pivot};
use super::layout::{self, SLOT_SIZE};
use super::{BtreeKey, OpResult, PageKind, TreeContext};
use log::debug;
use oakdb_common::page::PageId;
use oakdb_common::{Key, Result};
use std::cmp::Ordering;

enum InsertStep {
    Descend(usize, u32),
    Overwrite(usize),
    Insert(usize),
}

impl TreeContext<'_> {
    /// Inserts `ins` into the subtree rooted at `page_id`.
    ///
    /// On `Overflow`, `ins` holds the separator key and the id of the new
    /// page, which the caller inserts at its own slot.
    pub fn insert(
        &self,
        page_id: PageId,
        ins: &mut BtreeKey,
        height: u32,
        unique: bool,
        overwrite: bool,
    ) -> Result<OpResult> {
        let step = {
            let guard = self.pool.acquire_read(page_id)?;
            let data = guard.data();
            let n = layout::item_count(&data);
            let ahead = unique as i32;
            let (mut l, mut r) = (0, n);
            while l < r {
                let i = (l + r) >> 1;
                if self.compare_i32(&ins.key, &data, i) >= ahead {
                    l = i + 1;
                } else {
                    r = i;
                }
            }
            ensure!(l == r, "binary search ended at {} and {}", l, r);

            if height > 1 {
                InsertStep::Descend(r, self.child(&data, r))
            } else if r < n && self.compare(&ins.key, &data, r) == Ordering::Equal {
                if overwrite {
                    InsertStep::Overwrite(r)
                } else if unique {
                    return Ok(OpResult::Duplicate);
                } else {
                    InsertStep::Insert(r)
                }
            } else {
                InsertStep::Insert(r)
            }
        };

        match step {
            InsertStep::Descend(r, child) => {
                match self.insert(PageId::new(child), ins, height - 1, unique, overwrite)? {
                    OpResult::Overflow => self.insert_in_page(page_id, r, ins, false),
                    other => Ok(other),
                }
            }
            InsertStep::Overwrite(r) => {
                let guard = self.pool.acquire_write(page_id)?;
                let mut data = guard.data_mut();
                ins.old_oid = self.child(&data, r);
                match self.kind {
                    PageKind::Scalar { .. } => layout::set_reference(&mut data, r, ins.oid),
                    _ => layout::set_slot_oid(&mut data, r, ins.oid),
                }
                Ok(OpResult::Overwrite)
            }
            InsertStep::Insert(r) => self.insert_in_page(page_id, r, ins, true),
        }
    }

    /// Allocates a root holding the single key of `ins`.
    ///
    /// With a non-null `old_root` the page is internal: `ins.oid` is the
    /// child for keys up to `ins.key` and `old_root` the extra child.
    pub fn allocate_root(&self, old_root: PageId, ins: &BtreeKey) -> Result<PageId> {
        let page_id = self.pool.allocate_page()?;
        let guard = self.pool.acquire_write(page_id)?;
        let mut data = guard.data_mut();
        match self.kind {
            PageKind::Scalar { width } => {
                ins.key.encode_scalar(layout::scalar_key_mut(&mut data, width, 0));
                layout::set_reference(&mut data, 0, ins.oid);
                layout::set_reference(&mut data, 1, old_root.as_u32());
            }
            _ => {
                let len = ins.key.var_byte_len();
                let offs = self.key_space - len;
                layout::set_slot(&mut data, 0, ins.oid, ins.key.var_len(), offs);
                ins.key.encode_var(layout::heap_bytes_mut(&mut data, offs, len));
                if !old_root.is_null() {
                    layout::set_slot(&mut data, 1, old_root.as_u32(), 0, self.key_space);
                }
                layout::set_used_size(&mut data, len);
            }
        }
        layout::set_item_count(&mut data, 1);
        debug!("allocated root {} over {}", page_id, old_root);
        Ok(page_id)
    }

    /// Page-local insert at slot `r`, splitting the page when it is full.
    fn insert_in_page(
        &self,
        page_id: PageId,
        r: usize,
        ins: &mut BtreeKey,
        leaf: bool,
    ) -> Result<OpResult> {
        let guard = self.pool.acquire_write(page_id)?;
        let mut data = guard.data_mut();
        let result = match self.kind {
            PageKind::Scalar { width } => self.insert_scalar_key(&mut data, r, ins, leaf, width)?,
            _ => self.insert_var_key(&mut data, r, ins, leaf)?,
        };
        match result {
            OpResult::Overflow => {
                debug!(
                    "split {} at slot {}: new page {} takes the lower half",
                    page_id,
                    r,
                    PageId::new(ins.oid)
                );
                Ok(OpResult::Overflow)
            }
            // An insert never leaves a page less loaded than before.
            _ => Ok(OpResult::Done),
        }
    }

    /// Inserts a key/reference pair into a scalar page.
    ///
    /// A full page is split at `m = (max + 1) / 2`; the new page receives the
    /// lower `m` pairs. Internal pages count their extra reference as a pair
    /// whose key slot is unused.
    pub fn insert_scalar_key(
        &self,
        pg: &mut [u8],
        r: usize,
        ins: &mut BtreeKey,
        leaf: bool,
        width: usize,
    ) -> Result<OpResult> {
        let n = layout::item_count(pg);
        let pairs = if leaf { n } else { n + 1 };
        let max = self.max_items(width);

        if pairs < max {
            layout::move_pairs(pg, r + 1, r, pairs - r, width);
            ins.key.encode_scalar(layout::scalar_key_mut(pg, width, r));
            layout::set_reference(pg, r, ins.oid);
            layout::set_item_count(pg, n + 1);
            return Ok(OpResult::Done);
        }
        ensure!(
            pairs == max,
            "scalar page holds {} pairs, capacity {}",
            pairs,
            max
        );

        let b_id = self.pool.allocate_page()?;
        let b_guard = self.pool.acquire_write(b_id)?;
        let mut b = b_guard.data_mut();
        let m = (max + 1) / 2;
        if r < m {
            layout::copy_pairs(&mut b, 0, pg, 0, r, width);
            ins.key.encode_scalar(layout::scalar_key_mut(&mut b, width, r));
            layout::set_reference(&mut b, r, ins.oid);
            layout::copy_pairs(&mut b, r + 1, pg, r, m - r - 1, width);
            layout::move_pairs(pg, 0, m - 1, max - m + 1, width);
        } else {
            layout::copy_pairs(&mut b, 0, pg, 0, m, width);
            layout::move_pairs(pg, 0, m, r - m, width);
            layout::move_pairs(pg, r - m + 1, r, max - r, width);
            ins.key.encode_scalar(layout::scalar_key_mut(pg, width, r - m));
            layout::set_reference(pg, r - m, ins.oid);
        }

        ins.key = Key::decode_scalar(self.key_type, layout::scalar_key(&b, width, m - 1));
        ins.oid = b_id.as_u32();
        if leaf {
            layout::set_item_count(pg, max - m + 1);
            layout::set_item_count(&mut b, m);
        } else {
            layout::set_item_count(pg, max - m);
            layout::set_item_count(&mut b, m - 1);
        }
        Ok(OpResult::Overflow)
    }

    /// Inserts a key into a variable-length page.
    ///
    /// Returns `Underflow` when the page is still lightly loaded afterwards,
    /// which matters when the insert replaces a separator. A full page is
    /// split by moving entries into a new page one at a time until the byte
    /// balance between the two pages stops improving.
    pub fn insert_var_key(
        &self,
        pg: &mut [u8],
        r: usize,
        ins: &mut BtreeKey,
        leaf: bool,
    ) -> Result<OpResult> {
        let unit = self.kind.unit();
        let key_space = self.key_space;
        let n = layout::item_count(pg);

        if put_var_key(pg, r, &ins.key, ins.oid, leaf) {
            let size = layout::used_size(pg);
            return Ok(if size + SLOT_SIZE * (n + 1) < self.underflow_limit() {
                OpResult::Underflow
            } else {
                OpResult::Done
            });
        }

        let b_id = self.pool.allocate_page()?;
        let b_guard = self.pool.acquire_write(b_id)?;
        let mut b = b_guard.data_mut();

        let len = ins.key.var_byte_len();
        let byte_len = |i: usize| layout::slot_len(pg, i) * unit;
        let slot = SLOT_SIZE as i64;
        let mut size = layout::used_size(pg) as i64;
        let mut moved = 0usize;
        let mut inserted = (len + SLOT_SIZE) as i64;
        let mut prev_delta = i64::MIN + 1;
        let mut i = 0usize;
        let mut bn = 0usize;

        loop {
            let mut j = n as i64 - i as i64 - 1;
            let (key_len, add, sub);
            if bn == r {
                key_len = len;
                inserted = 0;
                add = len;
                if leaf {
                    sub = 0;
                    j += 1;
                } else {
                    sub = byte_len(i);
                }
            } else {
                key_len = byte_len(i);
                add = key_len;
                let mut s = key_len;
                if !leaf {
                    if i + 1 != r {
                        s += byte_len(i + 1);
                        j -= 1;
                    } else {
                        inserted = 0;
                    }
                }
                sub = s;
            }

            let delta = (moved + add + (bn + 1) * SLOT_SIZE) as i64
                - (j * slot + size - sub as i64 + inserted);
            if delta >= -prev_delta {
                break;
            }

            moved += key_len;
            prev_delta = delta;
            ensure!(
                moved + (bn + 1) * SLOT_SIZE <= key_space,
                "split moved {} bytes in {} slots past the key space",
                moved,
                bn + 1
            );
            let offs = if key_len == 0 { key_space } else { key_space - moved };
            if bn == r {
                layout::set_slot(&mut b, bn, ins.oid, ins.key.var_len(), offs);
                ins.key.encode_var(layout::heap_bytes_mut(&mut b, offs, len));
            } else {
                layout::set_slot(
                    &mut b,
                    bn,
                    layout::slot_oid(pg, i),
                    layout::slot_len(pg, i),
                    offs,
                );
                let src = layout::slot_offs(pg, i);
                layout::heap_bytes_mut(&mut b, offs, key_len)
                    .copy_from_slice(layout::heap_bytes(pg, src, key_len));
                size -= key_len as i64;
                i += 1;
            }
            bn += 1;
        }

        let separator = if leaf {
            Key::decode_var(self.key_type, layout::var_key(&b, bn - 1, unit))
        } else {
            ensure!(
                moved + (bn + 1) * SLOT_SIZE <= key_space,
                "no room for the extra slot of the new page"
            );
            if bn != r {
                // Key i moves up; its child becomes the extra child of the new page.
                let separator = self.key_at(pg, i);
                layout::set_slot(&mut b, bn, layout::slot_oid(pg, i), 0, key_space);
                i += 1;
                separator
            } else {
                layout::set_slot(&mut b, bn, ins.oid, 0, key_space);
                ins.key.clone()
            }
        };

        compactify(pg, Pivot::Front(i), !leaf, unit);
        if bn < r || (bn == r && leaf) {
            ensure!(
                put_var_key(pg, r - i, &ins.key, ins.oid, leaf),
                "key of {} bytes does not fit after split",
                len
            );
        }
        layout::set_item_count(&mut b, bn);
        layout::set_used_size(&mut b, moved);
        layout::debug_check_var_page(&b, bn + !leaf as usize);

        ins.key = separator;
        ins.oid = b_id.as_u32();
        Ok(OpResult::Overflow)
    }
}

/// Writes a key into slot `r` of a variable-length page if it fits.
///
/// Slots from `r` on (including the extra slot of an internal page) move up
/// by one; the key bytes go to the bottom of the heap.
pub(crate) fn put_var_key(pg: &mut [u8], r: usize, key: &Key, oid: u32, leaf: bool) -> bool {
    let key_space = layout::key_space(pg);
    let n = layout::item_count(pg);
    let n_slots = if leaf { n } else { n + 1 };
    let len = key.var_byte_len();
    let mut size = layout::used_size(pg);
    if size + len + (n_slots + 1) * SLOT_SIZE > key_space {
        return false;
    }

    layout::move_slots(pg, r + 1, r, n_slots - r);
    size += len;
    let offs = if len == 0 { key_space } else { key_space - size };
    layout::set_slot(pg, r, oid, key.var_len(), offs);
    key.encode_var(layout::heap_bytes_mut(pg, offs, len));
    layout::set_used_size(pg, size);
    layout::set_item_count(pg, n + 1);
    layout::debug_check_var_page(pg, n_slots + 1);
    true
}
