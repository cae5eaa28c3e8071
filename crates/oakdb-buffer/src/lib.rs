//! Page pool for OakDB.
//!
//! This crate provides the page store the B+ tree runs on:
//! - Page frames with pin counting
//! - Copy-on-write shadow images with commit and rollback
//! - Free-space bitmap allocation (page 0 is the null reference)
//! - RAII read and write guards that unpin on drop

mod bitmap;
mod frame;
mod pool;

pub use bitmap::FreeSpaceBitmap;
pub use frame::PageFrame;
pub use pool::{PagePool, PagePoolStats, PageReadGuard, PageWriteGuard};
