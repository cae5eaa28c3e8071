//! Page layout codec.
//!
//! Every B+ tree page starts with the same 4-byte header followed by the
//! key space. Two body formats share the header:
//!
//! Scalar page (fixed-width keys):
//! ```text
//! +----------------------+ 0
//! | item_count: u16      |
//! | used_size: u16       | 4 (FIRST_KEY_OFFS)
//! +----------------------+
//! | key 0 | key 1 | ...  |  -> grows forward, `width` bytes each
//! |                      |
//! |  ... | ref 1 | ref 0 |  <- grows backward, 4 bytes each
//! +----------------------+ page_size
//! ```
//! Reference `i` sits at reference position `MAX_REFS - 1 - i`, where
//! `MAX_REFS = key_space / 4` counts 4-byte units from `FIRST_KEY_OFFS`.
//!
//! Variable-length page (string and byte-array keys):
//! ```text
//! +----------------------+ 0
//! | item_count: u16      |
//! | used_size: u16       | 4 (FIRST_KEY_OFFS)
//! +----------------------+
//! | slot 0 | slot 1 |... |  -> 8 bytes each: id u32, len u16, offs u16
//! |                      |
//! |   ... heap bytes     |  <- grows backward, `used_size` bytes
//! +----------------------+ page_size
//! ```
//! Slot offsets are relative to `FIRST_KEY_OFFS`; lengths count key units.
//!
//! All functions take the whole page buffer. Out-of-range indices panic.

use oakdb_common::page::PAGE_HEADER_SIZE;

/// Offset of the first key slot.
pub const FIRST_KEY_OFFS: usize = PAGE_HEADER_SIZE;

/// Size of a child or object reference.
pub const REF_SIZE: usize = 4;

/// Size of a variable-length slot descriptor.
pub const SLOT_SIZE: usize = 8;

// Header

#[inline]
pub fn key_space(data: &[u8]) -> usize {
    data.len() - FIRST_KEY_OFFS
}

#[inline]
pub fn item_count(data: &[u8]) -> usize {
    u16::from_le_bytes([data[0], data[1]]) as usize
}

#[inline]
pub fn set_item_count(data: &mut [u8], n: usize) {
    debug_assert!(n <= u16::MAX as usize);
    data[0..2].copy_from_slice(&(n as u16).to_le_bytes());
}

#[inline]
pub fn used_size(data: &[u8]) -> usize {
    u16::from_le_bytes([data[2], data[3]]) as usize
}

#[inline]
pub fn set_used_size(data: &mut [u8], size: usize) {
    debug_assert!(size <= u16::MAX as usize);
    data[2..4].copy_from_slice(&(size as u16).to_le_bytes());
}

// Scalar pages

/// Maximum number of key/reference pairs on a scalar page.
#[inline]
pub fn max_scalar_items(key_space: usize, width: usize) -> usize {
    key_space / (width + REF_SIZE)
}

#[inline]
fn max_refs(data: &[u8]) -> usize {
    key_space(data) / REF_SIZE
}

#[inline]
fn ref_offset(data: &[u8], i: usize) -> usize {
    FIRST_KEY_OFFS + (max_refs(data) - 1 - i) * REF_SIZE
}

#[inline]
fn scalar_key_offset(width: usize, i: usize) -> usize {
    FIRST_KEY_OFFS + i * width
}

/// Returns reference `i` of a scalar page.
#[inline]
pub fn reference(data: &[u8], i: usize) -> u32 {
    let off = ref_offset(data, i);
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

#[inline]
pub fn set_reference(data: &mut [u8], i: usize, oid: u32) {
    let off = ref_offset(data, i);
    data[off..off + REF_SIZE].copy_from_slice(&oid.to_le_bytes());
}

/// Returns the raw bytes of scalar key `i`.
#[inline]
pub fn scalar_key(data: &[u8], width: usize, i: usize) -> &[u8] {
    let off = scalar_key_offset(width, i);
    &data[off..off + width]
}

#[inline]
pub fn scalar_key_mut(data: &mut [u8], width: usize, i: usize) -> &mut [u8] {
    let off = scalar_key_offset(width, i);
    &mut data[off..off + width]
}

/// Copies `len` scalar keys from `src[src_idx..]` to `dst[dst_idx..]`.
pub fn copy_keys(
    dst: &mut [u8],
    dst_idx: usize,
    src: &[u8],
    src_idx: usize,
    len: usize,
    width: usize,
) {
    let d = scalar_key_offset(width, dst_idx);
    let s = scalar_key_offset(width, src_idx);
    dst[d..d + len * width].copy_from_slice(&src[s..s + len * width]);
}

/// Moves `len` scalar keys within one page.
pub fn move_keys(data: &mut [u8], dst_idx: usize, src_idx: usize, len: usize, width: usize) {
    let d = scalar_key_offset(width, dst_idx);
    let s = scalar_key_offset(width, src_idx);
    data.copy_within(s..s + len * width, d);
}

/// Physical byte range of references `[idx, idx + len)`.
///
/// References are stored in reverse, so a logical range is one contiguous
/// block that starts at reference position `MAX_REFS - idx - len`.
#[inline]
fn ref_range(data: &[u8], idx: usize, len: usize) -> std::ops::Range<usize> {
    let start = FIRST_KEY_OFFS + (max_refs(data) - idx - len) * REF_SIZE;
    start..start + len * REF_SIZE
}

/// Copies `len` references from `src[src_idx..]` to `dst[dst_idx..]`.
pub fn copy_refs(dst: &mut [u8], dst_idx: usize, src: &[u8], src_idx: usize, len: usize) {
    if len == 0 {
        return;
    }
    let d = ref_range(dst, dst_idx, len);
    let s = ref_range(src, src_idx, len);
    dst[d].copy_from_slice(&src[s]);
}

/// Moves `len` references within one page.
pub fn move_refs(data: &mut [u8], dst_idx: usize, src_idx: usize, len: usize) {
    if len == 0 {
        return;
    }
    let d = ref_range(data, dst_idx, len).start;
    let s = ref_range(data, src_idx, len);
    data.copy_within(s, d);
}

/// Copies `len` key/reference pairs between two scalar pages.
pub fn copy_pairs(
    dst: &mut [u8],
    dst_idx: usize,
    src: &[u8],
    src_idx: usize,
    len: usize,
    width: usize,
) {
    copy_keys(dst, dst_idx, src, src_idx, len, width);
    copy_refs(dst, dst_idx, src, src_idx, len);
}

/// Moves `len` key/reference pairs within one scalar page.
pub fn move_pairs(data: &mut [u8], dst_idx: usize, src_idx: usize, len: usize, width: usize) {
    move_keys(data, dst_idx, src_idx, len, width);
    move_refs(data, dst_idx, src_idx, len);
}

// Variable-length pages

#[inline]
fn slot_offset(i: usize) -> usize {
    FIRST_KEY_OFFS + i * SLOT_SIZE
}

/// Returns the child or object id of slot `i`.
#[inline]
pub fn slot_oid(data: &[u8], i: usize) -> u32 {
    let off = slot_offset(i);
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

#[inline]
pub fn set_slot_oid(data: &mut [u8], i: usize, oid: u32) {
    let off = slot_offset(i);
    data[off..off + 4].copy_from_slice(&oid.to_le_bytes());
}

/// Returns the key length of slot `i` in key units.
#[inline]
pub fn slot_len(data: &[u8], i: usize) -> usize {
    let off = slot_offset(i) + 4;
    u16::from_le_bytes([data[off], data[off + 1]]) as usize
}

#[inline]
pub fn set_slot_len(data: &mut [u8], i: usize, len: usize) {
    debug_assert!(len <= u16::MAX as usize);
    let off = slot_offset(i) + 4;
    data[off..off + 2].copy_from_slice(&(len as u16).to_le_bytes());
}

/// Returns the heap offset of slot `i`, relative to `FIRST_KEY_OFFS`.
#[inline]
pub fn slot_offs(data: &[u8], i: usize) -> usize {
    let off = slot_offset(i) + 6;
    u16::from_le_bytes([data[off], data[off + 1]]) as usize
}

#[inline]
pub fn set_slot_offs(data: &mut [u8], i: usize, offs: usize) {
    debug_assert!(offs <= u16::MAX as usize);
    let off = slot_offset(i) + 6;
    data[off..off + 2].copy_from_slice(&(offs as u16).to_le_bytes());
}

/// Writes a whole slot descriptor.
#[inline]
pub fn set_slot(data: &mut [u8], i: usize, oid: u32, len: usize, offs: usize) {
    set_slot_oid(data, i, oid);
    set_slot_len(data, i, len);
    set_slot_offs(data, i, offs);
}

/// Returns the heap bytes at `offs` (relative to `FIRST_KEY_OFFS`).
#[inline]
pub fn heap_bytes(data: &[u8], offs: usize, len_bytes: usize) -> &[u8] {
    let start = FIRST_KEY_OFFS + offs;
    &data[start..start + len_bytes]
}

#[inline]
pub fn heap_bytes_mut(data: &mut [u8], offs: usize, len_bytes: usize) -> &mut [u8] {
    let start = FIRST_KEY_OFFS + offs;
    &mut data[start..start + len_bytes]
}

/// Returns the key bytes of slot `i`.
#[inline]
pub fn var_key(data: &[u8], i: usize, unit: usize) -> &[u8] {
    heap_bytes(data, slot_offs(data, i), slot_len(data, i) * unit)
}

/// Moves `len` slot descriptors within one page.
pub fn move_slots(data: &mut [u8], dst_idx: usize, src_idx: usize, len: usize) {
    let d = slot_offset(dst_idx);
    let s = slot_offset(src_idx);
    data.copy_within(s..s + len * SLOT_SIZE, d);
}

/// Moves heap bytes within one page.
pub fn move_heap(data: &mut [u8], dst_offs: usize, src_offs: usize, len_bytes: usize) {
    let s = FIRST_KEY_OFFS + src_offs;
    data.copy_within(s..s + len_bytes, FIRST_KEY_OFFS + dst_offs);
}

/// Debug check that slots and heap do not overlap.
#[inline]
pub fn debug_check_var_page(data: &[u8], n_slots: usize) {
    debug_assert!(
        n_slots * SLOT_SIZE + used_size(data) <= key_space(data),
        "slot array ({} slots) overlaps heap ({} bytes) in {}-byte key space",
        n_slots,
        used_size(data),
        key_space(data)
    );
}
