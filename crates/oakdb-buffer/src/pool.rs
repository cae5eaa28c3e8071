//! Copy-on-write page pool.

use crate::bitmap::FreeSpaceBitmap;
use crate::frame::PageFrame;
use log::{debug, trace};
use oakdb_common::config::PagePoolConfig;
use oakdb_common::page::PageId;
use oakdb_common::{OakError, Result};
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Allocation state of the current transaction.
#[derive(Debug)]
struct TxnState {
    /// Bitmap including this transaction's allocations.
    bitmap: FreeSpaceBitmap,
    /// Bitmap as of the last commit.
    committed_bitmap: FreeSpaceBitmap,
    /// Pages allocated since the last commit.
    allocated: Vec<PageId>,
    /// Pages freed since the last commit; their bits are released at commit.
    freed: Vec<PageId>,
}

/// In-memory page store with shadow-paging transactions.
///
/// Every page lives in a `PageFrame`. The first write acquisition of a page
/// in a transaction copies its committed image into a shadow copy; `commit`
/// publishes the shadows and `rollback` discards them.
pub struct PagePool {
    /// Configuration.
    config: PagePoolConfig,
    /// Page ID to frame mapping.
    frames: RwLock<HashMap<PageId, Arc<PageFrame>>>,
    /// Allocator and transaction bookkeeping.
    txn: Mutex<TxnState>,
}

impl PagePool {
    /// Creates a new page pool.
    pub fn new(config: PagePoolConfig) -> Result<Self> {
        config.validate()?;
        let bitmap = FreeSpaceBitmap::with_capacity(config.initial_capacity);
        debug!(
            "page pool: {} byte pages, {} bytes reserved",
            config.page_size,
            config.initial_size_bytes()
        );
        Ok(Self {
            frames: RwLock::new(HashMap::with_capacity(config.initial_capacity)),
            txn: Mutex::new(TxnState {
                committed_bitmap: bitmap.clone(),
                bitmap,
                allocated: Vec::new(),
                freed: Vec::new(),
            }),
            config,
        })
    }

    /// Creates a pool of pages of the given size.
    pub fn with_page_size(page_size: usize) -> Result<Self> {
        Self::new(PagePoolConfig::with_page_size(page_size))
    }

    /// Returns the page size in bytes.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    /// Returns the number of allocated pages.
    pub fn page_count(&self) -> usize {
        self.txn.lock().bitmap.allocated_count()
    }

    /// Checks if a page is allocated and not freed.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.frames
            .read()
            .get(&page_id)
            .is_some_and(|frame| !frame.is_freed())
    }

    /// Looks up a live frame and pins it.
    fn fetch_frame(&self, page_id: PageId) -> Result<Arc<PageFrame>> {
        let frames = self.frames.read();
        match frames.get(&page_id) {
            Some(frame) if !frame.is_freed() => {
                frame.pin();
                Ok(Arc::clone(frame))
            }
            _ => Err(OakError::PageNotFound {
                page_id: page_id.as_u32(),
            }),
        }
    }

    /// Acquires a page for reading.
    ///
    /// The page stays pinned until the guard is dropped.
    pub fn acquire_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame = self.fetch_frame(page_id)?;
        trace!("acquire_read {}", page_id);
        Ok(PageReadGuard { frame, _pool: PhantomData })
    }

    /// Acquires a page for writing.
    ///
    /// On the first write of the transaction the committed image is copied
    /// into a shadow copy, which all later reads and writes see.
    pub fn acquire_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame = self.fetch_frame(page_id)?;
        frame.prepare_write();
        trace!("acquire_write {}", page_id);
        Ok(PageWriteGuard { frame, _pool: PhantomData })
    }

    /// Allocates a zero-filled page.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut txn = self.txn.lock();
        let page_id = txn.bitmap.allocate()?;
        txn.allocated.push(page_id);
        self.frames.write().insert(
            page_id,
            Arc::new(PageFrame::new(page_id, self.config.page_size)),
        );
        trace!("allocate {}", page_id);
        Ok(page_id)
    }

    /// Frees a page.
    ///
    /// The page is inaccessible from now on; its bit is released at commit.
    /// Fails with `PagePinned` while any guard holds the page.
    pub fn free_page(&self, page_id: PageId) -> Result<()> {
        let mut txn = self.txn.lock();
        let frames = self.frames.read();
        let frame = match frames.get(&page_id) {
            Some(frame) if !frame.is_freed() => frame,
            _ => {
                return Err(OakError::PageNotFound {
                    page_id: page_id.as_u32(),
                })
            }
        };
        if frame.is_pinned() {
            return Err(OakError::PagePinned {
                page_id: page_id.as_u32(),
            });
        }
        frame.set_freed(true);
        txn.freed.push(page_id);
        trace!("free {}", page_id);
        Ok(())
    }

    /// Publishes every shadow copy and applies pending frees.
    ///
    /// Returns the number of pages published.
    pub fn commit(&self) -> Result<usize> {
        let mut txn = self.txn.lock();
        let mut frames = self.frames.write();

        if let Some(frame) = frames.values().find(|frame| frame.is_pinned()) {
            return Err(OakError::PagePinned {
                page_id: frame.page_id().as_u32(),
            });
        }

        let freed = std::mem::take(&mut txn.freed);
        for page_id in &freed {
            frames.remove(page_id);
            txn.bitmap.release(*page_id);
        }

        let mut published = 0;
        for frame in frames.values() {
            if frame.commit() {
                published += 1;
            }
        }

        txn.allocated.clear();
        txn.committed_bitmap = txn.bitmap.clone();
        debug!(
            "commit: {} pages published, {} pages freed",
            published,
            freed.len()
        );
        Ok(published)
    }

    /// Discards the current transaction.
    ///
    /// Shadow copies and pages allocated since the last commit are dropped;
    /// pages freed since the last commit become accessible again.
    pub fn rollback(&self) {
        let mut txn = self.txn.lock();
        let mut frames = self.frames.write();

        let allocated = std::mem::take(&mut txn.allocated);
        for page_id in &allocated {
            frames.remove(page_id);
        }
        for frame in frames.values() {
            frame.rollback();
        }

        let freed = std::mem::take(&mut txn.freed);
        txn.bitmap = txn.committed_bitmap.clone();
        debug!(
            "rollback: {} allocations dropped, {} frees undone",
            allocated.len(),
            freed.len()
        );
    }

    /// Returns statistics about the pool.
    pub fn stats(&self) -> PagePoolStats {
        let allocated_pages = self.page_count();
        let frames = self.frames.read();
        let mut pinned_pages = 0;
        let mut dirty_pages = 0;
        let mut freed_pages = 0;

        for frame in frames.values() {
            if frame.is_pinned() {
                pinned_pages += 1;
            }
            if frame.is_dirty() {
                dirty_pages += 1;
            }
            if frame.is_freed() {
                freed_pages += 1;
            }
        }

        PagePoolStats {
            page_size: self.config.page_size,
            allocated_pages,
            resident_frames: frames.len(),
            pinned_pages,
            dirty_pages,
            freed_pages,
        }
    }
}

impl std::fmt::Debug for PagePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagePool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Statistics about the page pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePoolStats {
    /// Page size in bytes.
    pub page_size: usize,
    /// Number of pages allocated in the bitmap.
    pub allocated_pages: usize,
    /// Number of frames in memory, including freed ones awaiting commit.
    pub resident_frames: usize,
    /// Number of pinned pages.
    pub pinned_pages: usize,
    /// Number of pages written in the current transaction.
    pub dirty_pages: usize,
    /// Number of pages freed in the current transaction.
    pub freed_pages: usize,
}

/// RAII guard for reading a page.
pub struct PageReadGuard<'a> {
    frame: Arc<PageFrame>,
    _pool: PhantomData<&'a PagePool>,
}

impl PageReadGuard<'_> {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.frame.page_id()
    }

    /// Returns the page data.
    pub fn data(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        self.frame.read_data()
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.frame.unpin();
    }
}

/// RAII guard for writing a page.
pub struct PageWriteGuard<'a> {
    frame: Arc<PageFrame>,
    _pool: PhantomData<&'a PagePool>,
}

impl PageWriteGuard<'_> {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.frame.page_id()
    }

    /// Returns the page data.
    pub fn data(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        self.frame.read_data()
    }

    /// Returns mutable access to the shadow copy of the page.
    pub fn data_mut(&self) -> MappedRwLockWriteGuard<'_, [u8]> {
        self.frame.write_data()
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.frame.unpin();
    }
}
