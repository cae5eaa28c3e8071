//! In-order traversal, export and purge.

use super::TreeContext;
use log::trace;
use oakdb_common::page::PageId;
use oakdb_common::{Key, ObjectId, OakError, Result};

/// Turns the object ids stored in leaves into values.
pub trait ObjectResolver {
    type Object;

    fn resolve(&self, id: ObjectId) -> Result<Self::Object>;
}

impl<T, F> ObjectResolver for F
where
    F: Fn(ObjectId) -> Result<T>,
{
    type Object = T;

    fn resolve(&self, id: ObjectId) -> Result<T> {
        self(id)
    }
}

impl TreeContext<'_> {
    /// Children (or object ids) of a page, read under a short-lived guard.
    fn children(&self, page_id: PageId, leaf: bool) -> Result<Vec<u32>> {
        let guard = self.pool.acquire_read(page_id)?;
        let data = guard.data();
        let n = super::layout::item_count(&data);
        let end = if leaf { n } else { n + 1 };
        Ok((0..end).map(|i| self.child(&data, i)).collect())
    }

    /// Resolves every leaf entry in key order into `out`, starting at `pos`.
    ///
    /// Returns the position after the last written element.
    pub fn traverse_forward<R: ObjectResolver>(
        &self,
        page_id: PageId,
        height: u32,
        resolver: &R,
        out: &mut [Option<R::Object>],
        mut pos: usize,
    ) -> Result<usize> {
        let leaf = height == 1;
        let capacity = out.len();
        for id in self.children(page_id, leaf)? {
            if leaf {
                let slot = out.get_mut(pos).ok_or_else(|| OakError::InvalidParameter {
                    name: "out".to_string(),
                    value: format!("slice of {} has no position {}", capacity, pos),
                })?;
                *slot = Some(resolver.resolve(ObjectId(id))?);
                pos += 1;
            } else {
                pos = self.traverse_forward(PageId::new(id), height - 1, resolver, out, pos)?;
            }
        }
        Ok(pos)
    }

    /// Appends every `(key, id)` entry below `page_id` in key order.
    pub fn collect_entries(
        &self,
        page_id: PageId,
        height: u32,
        out: &mut Vec<(Key, ObjectId)>,
    ) -> Result<()> {
        if height == 1 {
            let guard = self.pool.acquire_read(page_id)?;
            let data = guard.data();
            let n = super::layout::item_count(&data);
            out.extend((0..n).map(|i| {
                (self.key_at(&data, i), ObjectId(self.child(&data, i)))
            }));
            return Ok(());
        }
        for child in self.children(page_id, false)? {
            self.collect_entries(PageId::new(child), height - 1, out)?;
        }
        Ok(())
    }

    /// Frees every page of the subtree, children first.
    pub fn purge(&self, page_id: PageId, height: u32) -> Result<()> {
        if height > 1 {
            for child in self.children(page_id, false)? {
                self.purge(PageId::new(child), height - 1)?;
            }
        }
        trace!("purge {}", page_id);
        self.pool.free_page(page_id)
    }
}
