//! Removal, merging and redistribution of underflowed pages.

use super::compact::{compactify, Pivot};
use super::layout::{self, SLOT_SIZE};
use super::{BtreeKey, OpResult, PageKind, TreeContext};
use log::debug;
use oakdb_common::page::PageId;
use oakdb_common::{Key, Result};
use std::cmp::Ordering;

impl TreeContext<'_> {
    /// Removes the entry matching `rem` from the subtree rooted at `page_id`.
    ///
    /// `rem.oid == 0` removes the first entry with an equal key. The removed
    /// id is stored in `rem.old_oid`. An `Overflow` result carries a
    /// separator and a new page in `rem` that the caller must insert.
    pub fn remove(&self, page_id: PageId, rem: &mut BtreeKey, height: u32) -> Result<OpResult> {
        if height == 1 {
            return self.remove_from_leaf(page_id, rem);
        }

        let (r, children) = {
            let guard = self.pool.acquire_read(page_id)?;
            let data = guard.data();
            let n = layout::item_count(&data);
            let r = self.lower_bound(&data, &rem.key, n);
            // A run of equal keys may continue into the next child.
            let children: Vec<(u32, bool)> = (r..=n)
                .map(|i| {
                    let last = i == n || self.compare(&rem.key, &data, i) == Ordering::Less;
                    (self.child(&data, i), last)
                })
                .collect();
            (r, children)
        };

        for (slot, (child, last)) in (r..).zip(children) {
            match self.remove(PageId::new(child), rem, height - 1)? {
                OpResult::NotFound if !last => continue,
                OpResult::NotFound => break,
                OpResult::Underflow => {
                    let guard = self.pool.acquire_write(page_id)?;
                    let mut data = guard.data_mut();
                    return self.handle_underflow(&mut data, slot, rem, height);
                }
                OpResult::Overflow => {
                    let guard = self.pool.acquire_write(page_id)?;
                    let mut data = guard.data_mut();
                    return self.insert_var_key(&mut data, slot, rem, false);
                }
                other => return Ok(other),
            }
        }
        Ok(OpResult::NotFound)
    }

    /// First slot whose key is not less than `key`.
    fn lower_bound(&self, data: &[u8], key: &Key, n: usize) -> usize {
        let (mut l, mut r) = (0, n);
        while l < r {
            let i = (l + r) >> 1;
            if self.compare(key, data, i) == Ordering::Greater {
                l = i + 1;
            } else {
                r = i;
            }
        }
        r
    }

    fn remove_from_leaf(&self, page_id: PageId, rem: &mut BtreeKey) -> Result<OpResult> {
        let guard = self.pool.acquire_write(page_id)?;
        let mut data = guard.data_mut();
        let n = layout::item_count(&data);
        let mut i = self.lower_bound(&data, &rem.key, n);

        while i < n && self.compare(&rem.key, &data, i) == Ordering::Equal {
            let oid = self.child(&data, i);
            if rem.oid == 0 || oid == rem.oid {
                rem.old_oid = oid;
                return Ok(match self.kind {
                    PageKind::Scalar { width } => {
                        layout::move_pairs(&mut data, i, i + 1, n - i - 1, width);
                        layout::set_item_count(&mut data, n - 1);
                        self.scalar_load(n - 1, width)
                    }
                    _ => self.remove_var_key(&mut data, i, false),
                });
            }
            i += 1;
        }
        Ok(OpResult::NotFound)
    }

    #[inline]
    fn scalar_load(&self, n: usize, width: usize) -> OpResult {
        if n * (width + layout::REF_SIZE) < self.underflow_limit() {
            OpResult::Underflow
        } else {
            OpResult::Done
        }
    }

    /// Removes slot `r` of a variable-length page and closes the heap gap.
    ///
    /// Keys stored below the removed one move up by its length so the heap
    /// stays contiguous.
    pub fn remove_var_key(&self, pg: &mut [u8], r: usize, has_extra: bool) -> OpResult {
        let unit = self.kind.unit();
        let key_space = self.key_space;
        let n = layout::item_count(pg);
        let n_slots = n + has_extra as usize;
        let len = layout::slot_len(pg, r) * unit;
        let offs = layout::slot_offs(pg, r);
        let mut size = layout::used_size(pg);

        layout::move_slots(pg, r, r + 1, n_slots - r - 1);
        if len > 0 {
            let bottom = key_space - size;
            layout::move_heap(pg, bottom + len, bottom, offs - bottom);
            for i in 0..n_slots - 1 {
                if layout::slot_len(pg, i) > 0 {
                    let o = layout::slot_offs(pg, i);
                    if o < offs {
                        layout::set_slot_offs(pg, i, o + len);
                    }
                }
            }
            size -= len;
            layout::set_used_size(pg, size);
        }
        layout::set_item_count(pg, n - 1);
        layout::debug_check_var_page(pg, n_slots - 1);

        if size + SLOT_SIZE * n < self.underflow_limit() {
            OpResult::Underflow
        } else {
            OpResult::Done
        }
    }

    /// Repairs child `r` of the internal page `pg` after it underflowed.
    ///
    /// The child is merged with a neighbour when both fit in one page;
    /// otherwise entries are moved over from the neighbour and the separator
    /// between them is replaced.
    pub fn handle_underflow(
        &self,
        pg: &mut [u8],
        r: usize,
        rem: &mut BtreeKey,
        height: u32,
    ) -> Result<OpResult> {
        let n = layout::item_count(pg);
        ensure!(n > 0, "underflow below an internal page without keys");
        let s = if r < n { r } else { r - 1 };
        let leaf = height == 2;
        match self.kind {
            PageKind::Scalar { width } => self.scalar_underflow(pg, s, r == s, leaf, width),
            _ => self.var_underflow(pg, s, r == s, rem, leaf),
        }
    }

    fn scalar_underflow(
        &self,
        pg: &mut [u8],
        s: usize,
        left_under: bool,
        leaf: bool,
        width: usize,
    ) -> Result<OpResult> {
        let n = layout::item_count(pg);
        let left_id = PageId::new(layout::reference(pg, s));
        let right_id = PageId::new(layout::reference(pg, s + 1));
        let max = self.max_items(width);
        let extra = !leaf as usize;

        let a_guard = self.pool.acquire_write(left_id)?;
        let mut a = a_guard.data_mut();
        let b_guard = self.pool.acquire_write(right_id)?;
        let mut b = b_guard.data_mut();
        let an = layout::item_count(&a);
        let bn = layout::item_count(&b);

        if an + bn + 2 * extra <= max {
            if leaf {
                layout::copy_pairs(&mut a, an, &b, 0, bn, width);
                layout::set_item_count(&mut a, an + bn);
            } else {
                layout::scalar_key_mut(&mut a, width, an)
                    .copy_from_slice(layout::scalar_key(pg, width, s));
                layout::copy_pairs(&mut a, an + 1, &b, 0, bn + 1, width);
                layout::set_item_count(&mut a, an + 1 + bn);
            }
            drop(b);
            drop(b_guard);
            self.pool.free_page(right_id)?;
            debug!("merged {} into {}", right_id, left_id);

            layout::set_reference(pg, s + 1, left_id.as_u32());
            layout::move_pairs(pg, s, s + 1, n - s, width);
            layout::set_item_count(pg, n - 1);
            return Ok(self.scalar_load(n - 1, width));
        }

        let (u, o) = if left_under { (an, bn) } else { (bn, an) };
        let (u, o) = (u + extra, o + extra);
        let i = o - (u + o) / 2;
        if i == 0 {
            return Ok(OpResult::Done);
        }

        let separator_slot = match (left_under, leaf) {
            (true, true) => {
                layout::copy_pairs(&mut a, an, &b, 0, i, width);
                layout::move_pairs(&mut b, 0, i, bn - i, width);
                layout::set_item_count(&mut a, an + i);
                layout::set_item_count(&mut b, bn - i);
                an + i - 1
            }
            (true, false) => {
                layout::scalar_key_mut(&mut a, width, an)
                    .copy_from_slice(layout::scalar_key(pg, width, s));
                layout::copy_pairs(&mut a, an + 1, &b, 0, i, width);
                layout::move_pairs(&mut b, 0, i, bn + 1 - i, width);
                layout::set_item_count(&mut a, an + i);
                layout::set_item_count(&mut b, bn - i);
                an + i
            }
            (false, true) => {
                layout::move_pairs(&mut b, i, 0, bn, width);
                layout::copy_pairs(&mut b, 0, &a, an - i, i, width);
                layout::set_item_count(&mut a, an - i);
                layout::set_item_count(&mut b, bn + i);
                an - i - 1
            }
            (false, false) => {
                layout::move_pairs(&mut b, i, 0, bn + 1, width);
                layout::copy_pairs(&mut b, 0, &a, an - i + 1, i, width);
                layout::scalar_key_mut(&mut b, width, i - 1)
                    .copy_from_slice(layout::scalar_key(pg, width, s));
                layout::set_item_count(&mut a, an - i);
                layout::set_item_count(&mut b, bn + i);
                an - i
            }
        };
        layout::scalar_key_mut(pg, width, s)
            .copy_from_slice(layout::scalar_key(&a, width, separator_slot));
        debug!(
            "moved {} entries {} between {} and {}",
            i,
            if left_under { "left" } else { "right" },
            left_id,
            right_id
        );
        Ok(OpResult::Done)
    }

    fn var_underflow(
        &self,
        pg: &mut [u8],
        s: usize,
        left_under: bool,
        rem: &mut BtreeKey,
        leaf: bool,
    ) -> Result<OpResult> {
        let unit = self.kind.unit();
        let key_space = self.key_space;
        let left_id = PageId::new(layout::slot_oid(pg, s));
        let right_id = PageId::new(layout::slot_oid(pg, s + 1));
        let sep_len = layout::slot_len(pg, s) * unit;

        let a_guard = self.pool.acquire_write(left_id)?;
        let mut a = a_guard.data_mut();
        let b_guard = self.pool.acquire_write(right_id)?;
        let mut b = b_guard.data_mut();
        let an = layout::item_count(&a);
        let bn = layout::item_count(&b);
        let sa = layout::used_size(&a);
        let sb = layout::used_size(&b);

        let mut merged = (an + bn) * SLOT_SIZE + sa + sb;
        if !leaf {
            merged += sep_len + 2 * SLOT_SIZE;
        }

        if merged <= key_space {
            let mut top = key_space - sa;
            let mut slot = an;
            if !leaf {
                // The separator takes over the extra child of the left page.
                let extra = layout::slot_oid(&a, an);
                put_entry(
                    &mut a,
                    slot,
                    &mut top,
                    extra,
                    layout::slot_len(pg, s),
                    layout::var_key(pg, s, unit),
                );
                slot += 1;
            }
            // The right heap is compact, so it moves as one block.
            let shift = key_space - top;
            layout::heap_bytes_mut(&mut a, top - sb, sb)
                .copy_from_slice(layout::heap_bytes(&b, key_space - sb, sb));
            for j in 0..bn + !leaf as usize {
                let len = layout::slot_len(&b, j);
                let offs = if len == 0 {
                    key_space
                } else {
                    layout::slot_offs(&b, j) - shift
                };
                layout::set_slot(&mut a, slot + j, layout::slot_oid(&b, j), len, offs);
            }
            layout::set_item_count(&mut a, slot + bn);
            layout::set_used_size(&mut a, key_space - top + sb);
            layout::debug_check_var_page(&a, slot + bn + !leaf as usize);

            drop(b);
            drop(b_guard);
            self.pool.free_page(right_id)?;
            debug!("merged {} into {}", right_id, left_id);

            layout::set_slot_oid(pg, s + 1, left_id.as_u32());
            return Ok(self.remove_var_key(pg, s, true));
        }

        // Walk the entries that would move from the fuller sibling and stop
        // once the byte balance crosses zero.
        let (un, on, mut su, mut so) = if left_under {
            (an, bn, sa as i64, sb as i64)
        } else {
            (bn, an, sb as i64, sa as i64)
        };
        if on < 2 {
            return Ok(OpResult::Done);
        }
        let sibling_len = |k: usize| -> i64 {
            let len = if left_under {
                layout::slot_len(&b, k)
            } else {
                layout::slot_len(&a, an - 1 - k)
            };
            (len * unit) as i64
        };
        let slot = SLOT_SIZE as i64;
        let mut prev = (un as i64 * slot + su) - (on as i64 * slot + so);
        let (mut add, mut sub) = if leaf {
            (sibling_len(0), sibling_len(0))
        } else {
            (sep_len as i64, sibling_len(0))
        };
        let mut i = 0usize;
        loop {
            i += 1;
            let delta = ((un + i) as i64 * slot + su + add) - ((on - i) as i64 * slot + so - sub);
            if delta >= 0 {
                if delta >= -prev {
                    i -= 1;
                }
                break;
            }
            su += add;
            so -= sub;
            prev = delta;
            if i + 1 >= on {
                break;
            }
            if leaf {
                add = sibling_len(i);
                sub = add;
            } else {
                add = sub;
                sub = sibling_len(i);
            }
        }
        if i == 0 {
            return Ok(OpResult::Done);
        }

        let separator = if left_under {
            let mut top = key_space - sa;
            let separator = if leaf {
                for k in 0..i {
                    put_entry(
                        &mut a,
                        an + k,
                        &mut top,
                        layout::slot_oid(&b, k),
                        layout::slot_len(&b, k),
                        layout::var_key(&b, k, unit),
                    );
                }
                self.key_at(&a, an + i - 1)
            } else {
                let extra = layout::slot_oid(&a, an);
                put_entry(
                    &mut a,
                    an,
                    &mut top,
                    extra,
                    layout::slot_len(pg, s),
                    layout::var_key(pg, s, unit),
                );
                for k in 0..i - 1 {
                    put_entry(
                        &mut a,
                        an + 1 + k,
                        &mut top,
                        layout::slot_oid(&b, k),
                        layout::slot_len(&b, k),
                        layout::var_key(&b, k, unit),
                    );
                }
                layout::set_slot(&mut a, an + i, layout::slot_oid(&b, i - 1), 0, key_space);
                self.key_at(&b, i - 1)
            };
            ensure!(
                (an + i + !leaf as usize) * SLOT_SIZE <= top,
                "redistribution overfilled {}",
                left_id
            );
            layout::set_item_count(&mut a, an + i);
            layout::set_used_size(&mut a, key_space - top);
            layout::debug_check_var_page(&a, an + i + !leaf as usize);
            compactify(&mut b, Pivot::Front(i), !leaf, unit);
            separator
        } else {
            layout::move_slots(&mut b, i, 0, bn + !leaf as usize);
            let mut top = key_space - sb;
            let separator = if leaf {
                for k in 0..i {
                    let j = an - i + k;
                    put_entry(
                        &mut b,
                        k,
                        &mut top,
                        layout::slot_oid(&a, j),
                        layout::slot_len(&a, j),
                        layout::var_key(&a, j, unit),
                    );
                }
                self.key_at(&a, an - i - 1)
            } else {
                for k in 0..i - 1 {
                    let j = an - i + 1 + k;
                    put_entry(
                        &mut b,
                        k,
                        &mut top,
                        layout::slot_oid(&a, j),
                        layout::slot_len(&a, j),
                        layout::var_key(&a, j, unit),
                    );
                }
                let extra = layout::slot_oid(&a, an);
                put_entry(
                    &mut b,
                    i - 1,
                    &mut top,
                    extra,
                    layout::slot_len(pg, s),
                    layout::var_key(pg, s, unit),
                );
                self.key_at(&a, an - i)
            };
            ensure!(
                (bn + i + !leaf as usize) * SLOT_SIZE <= top,
                "redistribution overfilled {}",
                right_id
            );
            layout::set_item_count(&mut b, bn + i);
            layout::set_used_size(&mut b, key_space - top);
            layout::debug_check_var_page(&b, bn + i + !leaf as usize);
            compactify(&mut a, Pivot::Back(i), !leaf, unit);
            separator
        };
        debug!(
            "moved {} entries {} between {} and {}",
            i,
            if left_under { "left" } else { "right" },
            left_id,
            right_id
        );

        // Replace the separator; a longer key may split the parent.
        rem.key = separator;
        rem.oid = left_id.as_u32();
        self.remove_var_key(pg, s, true);
        self.insert_var_key(pg, s, rem, false)
    }
}

/// Writes a slot and its key bytes below the heap top `top`.
fn put_entry(dst: &mut [u8], slot: usize, top: &mut usize, oid: u32, len_units: usize, key: &[u8]) {
    let offs = if key.is_empty() {
        layout::key_space(dst)
    } else {
        *top -= key.len();
        layout::heap_bytes_mut(dst, *top, key.len()).copy_from_slice(key);
        *top
    };
    layout::set_slot(dst, slot, oid, len_units, offs);
}
