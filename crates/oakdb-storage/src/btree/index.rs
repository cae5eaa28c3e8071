//! Page-based B+ tree index.

use super::{max_var_key_bytes, Bound, BtreeKey, ObjectResolver, OpResult, TreeContext};
use log::debug;
use oakdb_buffer::PagePool;
use oakdb_common::page::PageId;
use oakdb_common::{IndexConfig, Key, KeyType, ObjectId, OakError, Result};

/// A B+ tree mapping keys to object ids.
///
/// The index only records where its tree lives: root page, height and
/// element count. Pages belong to the `PagePool` passed to every call, so
/// cloning the index before a transaction and restoring the clone after
/// `PagePool::rollback` undoes both.
#[derive(Debug, Clone)]
pub struct BtreeIndex {
    /// Root page, or `PageId::NULL` for an empty tree.
    root: PageId,
    /// Number of page levels (0 for an empty tree, 1 when the root is a leaf).
    height: u32,
    /// Number of entries.
    n_items: usize,
    /// Page size of the pool the tree was built in.
    page_size: usize,
    config: IndexConfig,
}

impl BtreeIndex {
    /// Creates an empty index for pages of `pool`.
    pub fn new(pool: &PagePool, config: IndexConfig) -> Result<Self> {
        config.validate(pool.page_size())?;
        Ok(Self {
            root: PageId::NULL,
            height: 0,
            n_items: 0,
            page_size: pool.page_size(),
            config,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.n_items
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_items == 0
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn root(&self) -> PageId {
        self.root
    }

    #[inline]
    pub fn key_type(&self) -> KeyType {
        self.config.key_type
    }

    #[inline]
    pub fn is_unique(&self) -> bool {
        self.config.unique
    }

    // =========================================================================
    // Argument checks
    // =========================================================================

    fn context<'a>(&self, pool: &'a PagePool) -> Result<TreeContext<'a>> {
        if pool.page_size() != self.page_size {
            return Err(OakError::PageSizeMismatch {
                expected: self.page_size,
                actual: pool.page_size(),
            });
        }
        Ok(TreeContext::new(pool, self.config.key_type))
    }

    fn check_key(&self, key: &Key) -> Result<()> {
        if key.key_type() != self.config.key_type {
            return Err(OakError::TypeMismatch {
                expected: self.config.key_type.to_string(),
                actual: key.key_type().to_string(),
            });
        }
        if !self.config.key_type.is_fixed_size() {
            let max = max_var_key_bytes(oakdb_common::key_space(self.page_size));
            let size = key.var_byte_len();
            if size > max {
                return Err(OakError::KeyTooLarge { size, max });
            }
        }
        Ok(())
    }

    fn check_id(id: ObjectId) -> Result<()> {
        if id.is_null() {
            return Err(OakError::InvalidParameter {
                name: "id".to_string(),
                value: id.to_string(),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Modification
    // =========================================================================

    /// Inserts `key -> id`.
    ///
    /// Returns false, leaving the tree unchanged, when a unique index already
    /// holds the key.
    pub fn insert(&mut self, pool: &PagePool, key: impl Into<Key>, id: ObjectId) -> Result<bool> {
        let result = self.put(pool, key.into(), id, false)?;
        Ok(result.is_some())
    }

    /// Inserts `key -> id`, replacing the id of an existing equal key.
    ///
    /// Returns the replaced id. A non-unique index always adds an entry.
    pub fn set(
        &mut self,
        pool: &PagePool,
        key: impl Into<Key>,
        id: ObjectId,
    ) -> Result<Option<ObjectId>> {
        Ok(self.put(pool, key.into(), id, true)?.flatten())
    }

    /// Shared insert path: `None` for a rejected duplicate, `Some(old)` otherwise.
    fn put(
        &mut self,
        pool: &PagePool,
        key: Key,
        id: ObjectId,
        overwrite: bool,
    ) -> Result<Option<Option<ObjectId>>> {
        self.check_key(&key)?;
        Self::check_id(id)?;
        let ctx = self.context(pool)?;
        let mut ins = BtreeKey::new(key, id);

        if self.root.is_null() {
            self.root = ctx.allocate_root(PageId::NULL, &ins)?;
            self.height = 1;
            self.n_items = 1;
            return Ok(Some(None));
        }

        let unique = self.config.unique;
        match ctx.insert(self.root, &mut ins, self.height, unique, overwrite)? {
            OpResult::Duplicate => return Ok(None),
            OpResult::Overwrite => return Ok(Some(Some(ObjectId(ins.old_oid)))),
            OpResult::Overflow => self.grow(&ctx, &ins)?,
            _ => {}
        }
        self.n_items += 1;
        Ok(Some(None))
    }

    /// Removes an entry with `key`.
    ///
    /// With `Some(id)` only the entry pointing to `id` is removed; with
    /// `None` the first entry with the key. Returns the removed id.
    pub fn remove(
        &mut self,
        pool: &PagePool,
        key: impl Into<Key>,
        id: Option<ObjectId>,
    ) -> Result<ObjectId> {
        let key = key.into();
        self.check_key(&key)?;
        let ctx = self.context(pool)?;
        if self.root.is_null() {
            return Err(OakError::KeyNotFound);
        }

        let mut rem = BtreeKey::new(key, id.unwrap_or(ObjectId::NULL));
        match ctx.remove(self.root, &mut rem, self.height)? {
            OpResult::NotFound => return Err(OakError::KeyNotFound),
            OpResult::Underflow => self.collapse(&ctx)?,
            OpResult::Overflow => self.grow(&ctx, &rem)?,
            _ => {}
        }
        self.n_items -= 1;
        Ok(ObjectId(rem.old_oid))
    }

    /// Puts a new root above the old one after the root split.
    fn grow(&mut self, ctx: &TreeContext<'_>, sep: &BtreeKey) -> Result<()> {
        let old_root = self.root;
        self.root = ctx.allocate_root(old_root, sep)?;
        self.height += 1;
        debug!("root grew to {} (height {})", self.root, self.height);
        Ok(())
    }

    /// Replaces a root left without keys by its only child.
    fn collapse(&mut self, ctx: &TreeContext<'_>) -> Result<()> {
        let next = {
            let guard = ctx.pool.acquire_read(self.root)?;
            let data = guard.data();
            if super::layout::item_count(&data) != 0 {
                return Ok(());
            }
            if self.height > 1 {
                PageId::new(ctx.child(&data, 0))
            } else {
                PageId::NULL
            }
        };
        ctx.pool.free_page(self.root)?;
        debug!("root {} collapsed into {}", self.root, next);
        self.root = next;
        self.height -= 1;
        Ok(())
    }

    /// Frees every page and leaves the index empty.
    pub fn clear(&mut self, pool: &PagePool) -> Result<()> {
        let ctx = self.context(pool)?;
        if !self.root.is_null() {
            ctx.purge(self.root, self.height)?;
        }
        debug!("cleared index of {} entries", self.n_items);
        self.root = PageId::NULL;
        self.height = 0;
        self.n_items = 0;
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Returns the id stored under `key`; the first one in a non-unique index.
    pub fn get(&self, pool: &PagePool, key: impl Into<Key>) -> Result<Option<ObjectId>> {
        let key = key.into();
        self.check_key(&key)?;
        let ctx = self.context(pool)?;
        Ok(ctx
            .get(self.root, &key, self.height, self.config.unique)?
            .map(ObjectId))
    }

    /// Returns the ids of all entries within the bounds, in key order.
    pub fn find(
        &self,
        pool: &PagePool,
        from: Option<&Bound>,
        till: Option<&Bound>,
    ) -> Result<Vec<ObjectId>> {
        for bound in from.iter().chain(till.iter()) {
            self.check_key(&bound.key)?;
        }
        let ctx = self.context(pool)?;
        let mut result = Vec::new();
        if !self.root.is_null() {
            ctx.find(self.root, from, till, self.height, &mut result)?;
        }
        Ok(result.into_iter().map(ObjectId).collect())
    }

    /// Returns the ids of all entries whose key starts with `prefix`.
    ///
    /// Only string and byte-array indexes support prefixes.
    pub fn prefix_search(&self, pool: &PagePool, prefix: &Key) -> Result<Vec<ObjectId>> {
        if self.config.key_type.is_fixed_size() {
            return Err(OakError::InvalidParameter {
                name: "prefix".to_string(),
                value: format!("prefix search on {} keys", self.config.key_type),
            });
        }
        self.check_key(prefix)?;
        let ctx = self.context(pool)?;
        let mut result = Vec::new();
        if !self.root.is_null() {
            ctx.prefix_search(self.root, prefix, self.height, &mut result)?;
        }
        Ok(result.into_iter().map(ObjectId).collect())
    }

    /// Resolves every entry in key order into `out` from position `pos`.
    ///
    /// Returns the position after the last written element.
    pub fn traverse<R: ObjectResolver>(
        &self,
        pool: &PagePool,
        resolver: &R,
        out: &mut [Option<R::Object>],
        pos: usize,
    ) -> Result<usize> {
        let ctx = self.context(pool)?;
        if self.root.is_null() {
            return Ok(pos);
        }
        ctx.traverse_forward(self.root, self.height, resolver, out, pos)
    }

    /// Resolves every entry in key order.
    pub fn to_vec<R: ObjectResolver>(
        &self,
        pool: &PagePool,
        resolver: &R,
    ) -> Result<Vec<R::Object>> {
        let mut out: Vec<Option<R::Object>> = (0..self.n_items).map(|_| None).collect();
        let end = self.traverse(pool, resolver, &mut out, 0)?;
        if end != self.n_items {
            return Err(OakError::InternalConsistency(format!(
                "traversal produced {} of {} entries",
                end, self.n_items
            )));
        }
        Ok(out.into_iter().flatten().collect())
    }

    /// Returns every `(key, id)` entry in key order.
    pub fn entries(&self, pool: &PagePool) -> Result<Vec<(Key, ObjectId)>> {
        let ctx = self.context(pool)?;
        let mut out = Vec::with_capacity(self.n_items);
        if !self.root.is_null() {
            ctx.collect_entries(self.root, self.height, &mut out)?;
        }
        Ok(out)
    }
}
