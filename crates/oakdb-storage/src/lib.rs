//! B+ tree page engine for OakDB.
//!
//! This crate provides:
//! - The on-page layout codec for scalar and variable-length key pages
//! - Key comparison against stored keys, including prefix comparison
//! - Range, point and prefix search
//! - Insert with page splits, remove with merge and redistribution
//! - Heap compaction for variable-length pages
//! - In-order traversal and purge
//! - `BtreeIndex`, the owning index object that grows and collapses the root

mod btree;

pub use btree::compare::compare_scalars;
pub use btree::{
    compactify, layout, max_var_key_bytes, Bound, BtreeIndex, BtreeKey, ObjectResolver, OpResult,
    PageKind, Pivot,
};
