//! # Skip-List Index Service
//!
//! Persistent, ordered, multi-level skip lists over index pages. Each
//! collection index owns a HEAD sentinel (`MinKey`) and TAIL sentinel
//! (`MaxKey`) at full height; real nodes draw their height from a
//! geometric distribution (`P(h = k) = 2^-k`) capped at `MAX_LEVEL`.
//!
//! ## Search
//!
//! Descent starts at HEAD's top level and moves forward while the next
//! key is smaller, dropping a level otherwise. The per-level
//! predecessors collected on the way down (`update` array) are exactly
//! the nodes whose forward pointers change on insert and delete.
//!
//! ## Placement
//!
//! Nodes are packed into index pages through the per-index free-page
//! list (free bytes descending). A node's width is fixed at creation,
//! so pointer updates never move it; delete frees its bytes and re-ranks
//! (or releases) the page.
//!
//! All key comparisons defer to the document value ordering.

use rand::Rng;

use crate::config::{MAX_INDEX_KEY_SIZE, MAX_LEVEL, PAGE_ID_EMPTY};
use crate::document::{write_value, Value};
use crate::error::{Error, Result};
use crate::storage::{
    CollectionIndex, CollectionPage, IndexNode, IndexPage, PageAddress, PageCache,
};

use super::collection::validate_name;

/// Draws a node height: `P(h = k) = 2^-k`, capped at `MAX_LEVEL`.
fn random_level() -> u8 {
    let mut rng = rand::thread_rng();
    let mut level = 1u8;
    while level < MAX_LEVEL as u8 && rng.gen_bool(0.5) {
        level += 1;
    }
    level
}

/// One index of one collection, bound to the cache for a sequence of
/// operations.
pub(crate) struct SkipIndex<'a> {
    cache: &'a mut PageCache,
    col_id: u32,
    slot: u8,
}

impl<'a> SkipIndex<'a> {
    pub fn new(cache: &'a mut PageCache, col_id: u32, slot: u8) -> Self {
        Self { cache, col_id, slot }
    }

    /// Creates a new index on `field`: reserves a table slot, allocates
    /// its first page and plants the HEAD/TAIL sentinels.
    pub fn create(cache: &mut PageCache, col_id: u32, field: &str, unique: bool) -> Result<u8> {
        validate_name("index field", field)?;

        let slot = cache.get::<CollectionPage>(col_id)?.next_free_slot()?;
        let page_id = cache.new_page::<IndexPage>(None)?;

        let head_addr = PageAddress::new(page_id, 0);
        let tail_addr = PageAddress::new(page_id, 1);

        let mut head = IndexNode::new(slot, MAX_LEVEL as u8, Value::MinKey, PageAddress::EMPTY)?;
        for level in 0..MAX_LEVEL {
            head.next[level] = tail_addr;
        }
        let mut tail = IndexNode::new(slot, MAX_LEVEL as u8, Value::MaxKey, PageAddress::EMPTY)?;
        tail.prev = head_addr;

        let page = cache.get_mut::<IndexPage>(page_id)?;
        page.nodes.insert(0, head);
        page.nodes.insert(1, tail);

        let free_head = cache.free_list_insert(PAGE_ID_EMPTY, page_id)?;
        cache.get_mut::<CollectionPage>(col_id)?.add_index(CollectionIndex {
            slot,
            field: field.to_string(),
            unique,
            head: head_addr,
            tail: tail_addr,
            free_index_page_id: free_head,
        })?;
        Ok(slot)
    }

    fn meta(&mut self) -> Result<CollectionIndex> {
        let slot = self.slot;
        let col = self.cache.get::<CollectionPage>(self.col_id)?;
        col.index_by_slot(slot).cloned().ok_or_else(|| {
            Error::FileCorrupted(format!(
                "collection \"{}\" has no index slot {}",
                col.name, slot
            ))
        })
    }

    fn set_free_head(&mut self, head: u32) -> Result<()> {
        let slot = self.slot;
        let col = self.cache.get_mut::<CollectionPage>(self.col_id)?;
        let name = col.name.clone();
        let entry = col.index_by_slot_mut(slot).ok_or_else(|| {
            Error::FileCorrupted(format!("collection \"{}\" has no index slot {}", name, slot))
        })?;
        entry.free_index_page_id = head;
        Ok(())
    }

    /// A clone of the node at `addr`.
    pub fn node_at(&mut self, addr: PageAddress) -> Result<IndexNode> {
        let page = self.cache.get::<IndexPage>(addr.page_id)?;
        page.node(addr.index).cloned()
    }

    fn set_next(&mut self, addr: PageAddress, level: usize, to: PageAddress) -> Result<()> {
        let page = self.cache.get_mut::<IndexPage>(addr.page_id)?;
        page.node_mut(addr.index)?.next[level] = to;
        Ok(())
    }

    fn set_prev(&mut self, addr: PageAddress, to: PageAddress) -> Result<()> {
        let page = self.cache.get_mut::<IndexPage>(addr.page_id)?;
        page.node_mut(addr.index)?.prev = to;
        Ok(())
    }

    /// Collects, per level, the last node strictly before `key` (or, for
    /// a delete, before the target node among equal keys). The search
    /// touches `O(log n)` nodes in expectation.
    fn find_path(
        &mut self,
        key: &Value,
        target: Option<PageAddress>,
    ) -> Result<[PageAddress; MAX_LEVEL]> {
        let meta = self.meta()?;
        let mut update = [meta.head; MAX_LEVEL];
        let mut pred = meta.head;

        for level in (0..MAX_LEVEL).rev() {
            loop {
                let next_addr = self.node_at(pred)?.next[level];
                let next = self.node_at(next_addr)?;
                let advance = match next.key.cmp(key) {
                    std::cmp::Ordering::Less => true,
                    std::cmp::Ordering::Equal => target.is_some_and(|t| t != next_addr),
                    std::cmp::Ordering::Greater => false,
                };
                if !advance {
                    break;
                }
                pred = next_addr;
            }
            update[level] = pred;
        }
        Ok(update)
    }

    /// Address of the first node with `key >= target` (possibly TAIL).
    pub fn find_first_gte(&mut self, key: &Value) -> Result<PageAddress> {
        let update = self.find_path(key, None)?;
        Ok(self.node_at(update[0])?.next[0])
    }

    /// Inserts a key pointing at `data_block`; returns the node address.
    pub fn insert(&mut self, key: Value, data_block: PageAddress) -> Result<PageAddress> {
        let meta = self.meta()?;

        if matches!(key, Value::MinKey | Value::MaxKey) {
            return Err(Error::InvalidDataType {
                context: "index key",
                kind: key.kind_name(),
            });
        }
        let mut key_bytes = Vec::new();
        write_value(&mut key_bytes, &key, 0)?;
        if key_bytes.len() > MAX_INDEX_KEY_SIZE {
            return Err(Error::IndexKeyTooLong {
                field: meta.field.clone(),
                max: MAX_INDEX_KEY_SIZE,
            });
        }

        let update = self.find_path(&key, None)?;

        if meta.unique {
            let candidate_addr = self.node_at(update[0])?.next[0];
            let candidate = self.node_at(candidate_addr)?;
            if !candidate.is_sentinel() && candidate.key == key {
                return Err(Error::IndexDuplicateKey {
                    field: meta.field.clone(),
                    key: key.to_string(),
                });
            }
        }

        let levels = random_level();
        let node = IndexNode::new(self.slot, levels, key, data_block)?;
        let size = node.on_disk_size();

        let (page_id, is_new) = self
            .cache
            .get_free::<IndexPage>(meta.free_index_page_id, size)?;
        let node_index = {
            let page = self.cache.get_mut::<IndexPage>(page_id)?;
            let index = page.next_index();
            page.nodes.insert(index, node);
            index
        };
        let node_addr = PageAddress::new(page_id, node_index);

        let free_head = if is_new {
            self.cache.free_list_insert(meta.free_index_page_id, page_id)?
        } else {
            self.cache
                .free_list_reposition(meta.free_index_page_id, page_id)?
        };
        self.set_free_head(free_head)?;

        for level in 0..levels as usize {
            let pred = update[level];
            let succ = self.node_at(pred)?.next[level];
            self.set_next(node_addr, level, succ)?;
            self.set_next(pred, level, node_addr)?;
            if level == 0 {
                self.set_prev(node_addr, pred)?;
                self.set_prev(succ, node_addr)?;
            }
        }

        Ok(node_addr)
    }

    /// Finds the node for `(key, data_block)` along the level-0 chain.
    fn find_node(&mut self, key: &Value, data_block: PageAddress) -> Result<PageAddress> {
        let mut addr = self.find_first_gte(key)?;
        loop {
            let node = self.node_at(addr)?;
            if node.is_sentinel() || node.key != *key {
                return Err(Error::FileCorrupted(format!(
                    "index slot {} has no node for key {} at {}",
                    self.slot, key, data_block
                )));
            }
            if node.data_block == data_block {
                return Ok(addr);
            }
            addr = node.next[0];
        }
    }

    /// Removes the node for `(key, data_block)`: unlinks every level it
    /// participates in and frees its bytes on the host page.
    pub fn delete(&mut self, key: &Value, data_block: PageAddress) -> Result<()> {
        let meta = self.meta()?;
        let addr = self.find_node(key, data_block)?;
        let node = self.node_at(addr)?;

        let update = self.find_path(&node.key, Some(addr))?;
        for level in 0..node.levels as usize {
            let pred = update[level];
            let pred_next = self.node_at(pred)?.next[level];
            if pred_next != addr {
                return Err(Error::FileCorrupted(format!(
                    "index slot {} is not linked to node {} at level {}",
                    self.slot, addr, level
                )));
            }
            let succ = node.next[level];
            self.set_next(pred, level, succ)?;
            if level == 0 {
                self.set_prev(succ, pred)?;
            }
        }

        let page = self.cache.get_mut::<IndexPage>(addr.page_id)?;
        page.nodes.remove(&addr.index);
        let now_empty = page.nodes.is_empty();

        let free_head = if now_empty {
            let head = self
                .cache
                .free_list_remove(meta.free_index_page_id, addr.page_id)?;
            self.cache.delete_page(addr.page_id, false)?;
            head
        } else {
            self.cache
                .free_list_reposition(meta.free_index_page_id, addr.page_id)?
        };
        self.set_free_head(free_head)?;
        Ok(())
    }

    /// Re-points the node for `(key, old)` at a relocated data block.
    pub fn update_data_block(
        &mut self,
        key: &Value,
        old: PageAddress,
        new: PageAddress,
    ) -> Result<()> {
        let addr = self.find_node(key, old)?;
        let page = self.cache.get_mut::<IndexPage>(addr.page_id)?;
        page.node_mut(addr.index)?.data_block = new;
        Ok(())
    }

    /// First real node in key order, `None` for an empty index.
    pub fn first(&mut self) -> Result<Option<(PageAddress, IndexNode)>> {
        let meta = self.meta()?;
        let addr = self.node_at(meta.head)?.next[0];
        let node = self.node_at(addr)?;
        Ok(if node.is_sentinel() { None } else { Some((addr, node)) })
    }

    /// Last real node in key order, `None` for an empty index.
    pub fn last(&mut self) -> Result<Option<(PageAddress, IndexNode)>> {
        let meta = self.meta()?;
        let addr = self.node_at(meta.tail)?.prev;
        let node = self.node_at(addr)?;
        Ok(if node.is_sentinel() { None } else { Some((addr, node)) })
    }

    pub fn head_addr(&mut self) -> Result<PageAddress> {
        Ok(self.meta()?.head)
    }

    pub fn tail_addr(&mut self) -> Result<PageAddress> {
        Ok(self.meta()?.tail)
    }
}
