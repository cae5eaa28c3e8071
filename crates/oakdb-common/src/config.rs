//! Configuration structures for OakDB.

use crate::error::{OakError, Result};
use crate::page::{MAX_PAGE_SIZE, MIN_PAGE_SIZE, PAGE_SIZE};
use crate::types::KeyType;
use serde::{Deserialize, Serialize};

/// Page pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagePoolConfig {
    /// Page size in bytes.
    pub page_size: usize,
    /// Number of frames the pool reserves room for up front.
    pub initial_capacity: usize,
}

impl Default for PagePoolConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            initial_capacity: 1024, // 16 MB with 16 KB pages
        }
    }
}

impl PagePoolConfig {
    /// Creates a config with the given page size and the default capacity.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    /// Checks that the page size is usable by the page formats.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(OakError::InvalidPageSize {
                size: self.page_size,
                min: MIN_PAGE_SIZE,
                max: MAX_PAGE_SIZE,
            });
        }
        if self.page_size % 4 != 0 {
            return Err(OakError::ConfigError(format!(
                "page size {} is not a multiple of 4",
                self.page_size
            )));
        }
        Ok(())
    }

    /// Returns the memory reserved by the initial capacity in bytes.
    pub fn initial_size_bytes(&self) -> usize {
        self.initial_capacity * self.page_size
    }
}

/// Index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Type of every key stored in the index.
    pub key_type: KeyType,
    /// Reject duplicate keys.
    pub unique: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            key_type: KeyType::Int,
            unique: true,
        }
    }
}

impl IndexConfig {
    pub fn new(key_type: KeyType, unique: bool) -> Self {
        Self { key_type, unique }
    }

    /// Checks that the index can store its key type on pages of the given size.
    pub fn validate(&self, page_size: usize) -> Result<()> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(OakError::InvalidPageSize {
                size: page_size,
                min: MIN_PAGE_SIZE,
                max: MAX_PAGE_SIZE,
            });
        }
        // A split needs at least two entries on each side.
        if let Some(width) = self.key_type.fixed_size() {
            let max_items = crate::page::key_space(page_size) / (4 + width);
            if max_items < 4 {
                return Err(OakError::ConfigError(format!(
                    "{} keys: page of {} bytes holds only {} entries",
                    self.key_type, page_size, max_items
                )));
            }
        }
        Ok(())
    }
}
