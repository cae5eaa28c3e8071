//! Page frames with copy-on-write images.

use oakdb_common::page::PageId;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Page images held by a frame.
///
/// `committed` is the image visible after the last commit. `shadow` is the
/// private copy made on the first write of the current transaction; while it
/// exists it is the current image.
struct FrameData {
    committed: Box<[u8]>,
    shadow: Option<Box<[u8]>>,
}

impl FrameData {
    #[inline]
    fn current(&self) -> &[u8] {
        self.shadow.as_deref().unwrap_or(&self.committed)
    }
}

/// A frame in the page pool holding a single page.
pub struct PageFrame {
    /// The page stored in this frame.
    page_id: PageId,
    /// Page images.
    data: RwLock<FrameData>,
    /// Number of guards currently holding this page.
    pin_count: AtomicU32,
    /// Whether the page was written in the current transaction.
    is_dirty: AtomicBool,
    /// Whether the page was freed in the current transaction.
    is_freed: AtomicBool,
}

impl PageFrame {
    /// Creates a frame holding a zero-filled page.
    pub fn new(page_id: PageId, page_size: usize) -> Self {
        Self {
            page_id,
            data: RwLock::new(FrameData {
                committed: vec![0u8; page_size].into_boxed_slice(),
                shadow: None,
            }),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            is_freed: AtomicBool::new(false),
        }
    }

    /// Returns the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the current pin count.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the previous pin count.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel)
    }

    /// Decrements the pin count.
    ///
    /// Returns the new pin count.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            // Unbalanced unpin; clamp at zero
            self.pin_count.store(0, Ordering::Release);
            return 0;
        }
        prev - 1
    }

    /// Returns true if this frame is pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Returns true if this frame was written in the current transaction.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    /// Returns true if this frame was freed in the current transaction.
    #[inline]
    pub fn is_freed(&self) -> bool {
        self.is_freed.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_freed(&self, freed: bool) {
        self.is_freed.store(freed, Ordering::Release);
    }

    /// Makes sure a shadow image exists and marks the frame dirty.
    ///
    /// The first call in a transaction copies the committed image.
    pub(crate) fn prepare_write(&self) {
        let mut data = self.data.write();
        let FrameData { committed, shadow } = &mut *data;
        shadow.get_or_insert_with(|| committed.clone());
        self.is_dirty.store(true, Ordering::Release);
    }

    /// Reads the current page image.
    #[inline]
    pub fn read_data(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.data.read(), |d| d.current())
    }

    /// Writes the shadow image. `prepare_write` must have been called.
    #[inline]
    pub(crate) fn write_data(&self) -> MappedRwLockWriteGuard<'_, [u8]> {
        RwLockWriteGuard::map(self.data.write(), |d| {
            let FrameData { committed, shadow } = d;
            &mut **shadow.get_or_insert_with(|| committed.clone())
        })
    }

    /// Publishes the shadow image. Returns true if there was one.
    pub(crate) fn commit(&self) -> bool {
        let mut data = self.data.write();
        self.is_dirty.store(false, Ordering::Release);
        match data.shadow.take() {
            Some(shadow) => {
                data.committed = shadow;
                true
            }
            None => false,
        }
    }

    /// Discards the shadow image and the freed mark.
    pub(crate) fn rollback(&self) {
        self.data.write().shadow = None;
        self.is_dirty.store(false, Ordering::Release);
        self.is_freed.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for PageFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFrame")
            .field("page_id", &self.page_id)
            .field("pin_count", &self.pin_count())
            .field("is_dirty", &self.is_dirty())
            .field("is_freed", &self.is_freed())
            .finish()
    }
}
