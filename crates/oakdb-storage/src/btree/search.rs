//! Range, point and prefix search.

use super::{Bound, TreeContext};
use oakdb_common::page::PageId;
use oakdb_common::{Key, Result};
use std::cmp::Ordering;

impl TreeContext<'_> {
    /// Collects the ids of every entry within `[from, till]` below `page_id`.
    ///
    /// Returns false once an entry beyond `till` was seen, which stops the
    /// walk in every ancestor.
    pub fn find(
        &self,
        page_id: PageId,
        from: Option<&Bound>,
        till: Option<&Bound>,
        height: u32,
        result: &mut Vec<u32>,
    ) -> Result<bool> {
        let (n, mut l, children) = {
            let guard = self.pool.acquire_read(page_id)?;
            let data = guard.data();
            let n = crate::btree::layout::item_count(&data);
            let mut l = 0;
            if let Some(from) = from {
                let mut r = n;
                while l < r {
                    let i = (l + r) >> 1;
                    if self.compare_i32(&from.key, &data, i) >= from.inclusion() {
                        l = i + 1;
                    } else {
                        r = i;
                    }
                }
                ensure!(l == r, "binary search ended at {} and {}", l, r);
            }

            if height == 1 {
                while l < n {
                    if let Some(till) = till {
                        if -self.compare_i32(&till.key, &data, l) >= till.inclusion() {
                            return Ok(false);
                        }
                    }
                    result.push(self.child(&data, l));
                    l += 1;
                }
                return Ok(true);
            }

            // Separators are needed after the children are visited.
            let children: Vec<(u32, Option<Ordering>)> = (l..=n)
                .map(|i| {
                    let past_till = match (till, i < n) {
                        (Some(till), true) => Some(self.compare(&till.key, &data, i)),
                        _ => None,
                    };
                    (self.child(&data, i), past_till)
                })
                .collect();
            (n, l, children)
        };

        for (child, till_order) in children {
            if !self.find(PageId::new(child), from, till, height - 1, result)? {
                return Ok(false);
            }
            if l == n {
                return Ok(true);
            }
            l += 1;
            if let Some(order) = till_order {
                if order == Ordering::Less {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Collects the ids of every entry whose key starts with `prefix`.
    pub fn prefix_search(
        &self,
        page_id: PageId,
        prefix: &Key,
        height: u32,
        result: &mut Vec<u32>,
    ) -> Result<bool> {
        let (n, mut l, children) = {
            let guard = self.pool.acquire_read(page_id)?;
            let data = guard.data();
            let n = crate::btree::layout::item_count(&data);
            let (mut l, mut r) = (0, n);
            while l < r {
                let i = (l + r) >> 1;
                if self.compare_prefix(prefix, &data, i) == Ordering::Greater {
                    l = i + 1;
                } else {
                    r = i;
                }
            }
            ensure!(l == r, "binary search ended at {} and {}", l, r);

            if height == 1 {
                while l < n {
                    if self.compare_prefix(prefix, &data, l) == Ordering::Less {
                        return Ok(false);
                    }
                    result.push(self.child(&data, l));
                    l += 1;
                }
                return Ok(true);
            }

            let children: Vec<(u32, Option<Ordering>)> = (l..=n)
                .map(|i| {
                    let order = (i < n).then(|| self.compare_prefix(prefix, &data, i));
                    (self.child(&data, i), order)
                })
                .collect();
            (n, l, children)
        };

        for (child, order) in children {
            if !self.prefix_search(PageId::new(child), prefix, height - 1, result)? {
                return Ok(false);
            }
            if l == n {
                return Ok(true);
            }
            l += 1;
            if order == Some(Ordering::Less) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Looks up the single id stored under `key`.
    ///
    /// More than one match in a unique index is a consistency violation.
    pub fn get(&self, root: PageId, key: &Key, height: u32, unique: bool) -> Result<Option<u32>> {
        if root.is_null() {
            return Ok(None);
        }
        let bound = Bound {
            key: key.clone(),
            inclusive: true,
        };
        let mut result = Vec::new();
        self.find(root, Some(&bound), Some(&bound), height, &mut result)?;
        if unique {
            ensure!(
                result.len() <= 1,
                "{} entries for one key in a unique index",
                result.len()
            );
        }
        Ok(result.first().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::layout::*;
    use oakdb_buffer::PagePool;
    use oakdb_common::KeyType;

    /// Builds a two-level Int tree by hand:
    /// root [20 | 40] -> leaves [10, 20] [30, 40] [50, 60]
    fn two_level_tree(pool: &PagePool) -> PageId {
        let leaves: Vec<PageId> = [[10, 20], [30, 40], [50, 60]]
            .iter()
            .map(|keys| {
                let id = pool.allocate_page().unwrap();
                let guard = pool.acquire_write(id).unwrap();
                let mut data = guard.data_mut();
                for (i, k) in keys.iter().enumerate() {
                    Key::Int(*k).encode_scalar(scalar_key_mut(&mut data, 4, i));
                    set_reference(&mut data, i, *k as u32 * 10);
                }
                set_item_count(&mut data, 2);
                id
            })
            .collect();

        let root = pool.allocate_page().unwrap();
        let guard = pool.acquire_write(root).unwrap();
        let mut data = guard.data_mut();
        Key::Int(20).encode_scalar(scalar_key_mut(&mut data, 4, 0));
        Key::Int(40).encode_scalar(scalar_key_mut(&mut data, 4, 1));
        for (i, leaf) in leaves.iter().enumerate() {
            set_reference(&mut data, i, leaf.as_u32());
        }
        set_item_count(&mut data, 2);
        root
    }

    fn find_ids(
        ctx: &TreeContext,
        root: PageId,
        from: Option<Bound>,
        till: Option<Bound>,
    ) -> Vec<u32> {
        let mut result = Vec::new();
        ctx.find(root, from.as_ref(), till.as_ref(), 2, &mut result)
            .unwrap();
        result
    }

    #[test]
    fn test_find_ranges() {
        let pool = PagePool::with_page_size(64).unwrap();
        let ctx = TreeContext::new(&pool, KeyType::Int);
        let root = two_level_tree(&pool);

        assert_eq!(
            find_ids(&ctx, root, None, None),
            vec![100, 200, 300, 400, 500, 600]
        );
        assert_eq!(
            find_ids(
                &ctx,
                root,
                Some(Bound::inclusive(20)),
                Some(Bound::inclusive(50)),
            ),
            vec![200, 300, 400, 500]
        );
        assert_eq!(
            find_ids(
                &ctx,
                root,
                Some(Bound::exclusive(20)),
                Some(Bound::exclusive(50)),
            ),
            vec![300, 400]
        );
        assert_eq!(
            find_ids(&ctx, root, Some(Bound::inclusive(61)), None),
            Vec::<u32>::new()
        );
        assert_eq!(
            find_ids(&ctx, root, None, Some(Bound::exclusive(10))),
            Vec::<u32>::new()
        );
        assert_eq!(pool.stats().pinned_pages, 0);
    }

    #[test]
    fn test_find_stops_at_upper_bound() {
        let pool = PagePool::with_page_size(64).unwrap();
        let ctx = TreeContext::new(&pool, KeyType::Int);
        let root = two_level_tree(&pool);

        let mut result = Vec::new();
        let more = ctx
            .find(root, None, Some(&Bound::inclusive(25)), 2, &mut result)
            .unwrap();
        assert!(!more);
        assert_eq!(result, vec![100, 200]);
    }

    #[test]
    fn test_get_point_lookup() {
        let pool = PagePool::with_page_size(64).unwrap();
        let ctx = TreeContext::new(&pool, KeyType::Int);
        let root = two_level_tree(&pool);

        assert_eq!(ctx.get(root, &Key::Int(40), 2, true).unwrap(), Some(400));
        assert_eq!(ctx.get(root, &Key::Int(45), 2, true).unwrap(), None);
        assert_eq!(ctx.get(PageId::NULL, &Key::Int(45), 0, true).unwrap(), None);
    }
}
