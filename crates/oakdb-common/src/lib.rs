//! OakDB common types, errors, and configuration.
//!
//! This crate provides shared definitions used by the page pool and the
//! B+ tree page engine.

pub mod config;
pub mod error;
pub mod page;
pub mod types;

pub use config::{IndexConfig, PagePoolConfig};
pub use error::{OakError, Result};
pub use page::{
    key_space, ObjectId, PageId, MAX_PAGE_SIZE, MIN_PAGE_SIZE, PAGE_HEADER_SIZE, PAGE_SIZE,
};
pub use types::{Key, KeyType};
