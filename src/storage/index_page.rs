//! # Index Pages and Skip-List Nodes
//!
//! Index pages pack variable-width skip-list nodes; nodes reference each
//! other across pages by [`PageAddress`]. A node's width is fixed at
//! creation (its height and key never change), so later pointer updates
//! never move it.
//!
//! ## Node Layout
//!
//! ```text
//! index       u16  slot inside the page
//! slot        u8   which index of the collection owns this node
//! levels      u8   node height (1..=MAX_LEVEL)
//! data_block  PageAddress (6)
//! prev        PageAddress (6)  level-0 back link
//! next        levels * PageAddress (6)  forward links per level
//! key         value codec bytes (tag + payload)
//! ```
//!
//! Every index owns a HEAD sentinel (`MinKey`) and TAIL sentinel
//! (`MaxKey`), both at full height; iteration terminates on them.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::config::MAX_LEVEL;
use crate::document::{read_value, write_value, ByteReader, Value};
use crate::error::{Error, Result};

use super::page::PageInfo;
use super::PageAddress;

/// Fixed per-node cost: slot index + owner slot + height + data-block
/// pointer + back pointer.
pub(crate) const INDEX_NODE_OVERHEAD: usize = 2 + 1 + 1 + 2 * PageAddress::SERIALIZED_SIZE;

/// One skip-list entry.
#[derive(Debug, Clone)]
pub(crate) struct IndexNode {
    /// Which index of the collection this node belongs to.
    pub slot: u8,
    /// Node height; forward pointers exist for levels `0..levels`.
    pub levels: u8,
    pub key: Value,
    /// The document block this node points at. Empty for sentinels.
    pub data_block: PageAddress,
    /// Level-0 back link.
    pub prev: PageAddress,
    /// Forward links, one per level.
    pub next: SmallVec<[PageAddress; 4]>,
    key_size: u16,
}

impl IndexNode {
    pub fn new(slot: u8, levels: u8, key: Value, data_block: PageAddress) -> Result<Self> {
        let mut key_bytes = Vec::new();
        write_value(&mut key_bytes, &key, 0)?;
        Ok(Self {
            slot,
            levels,
            key,
            data_block,
            prev: PageAddress::EMPTY,
            next: SmallVec::from_elem(PageAddress::EMPTY, levels as usize),
            key_size: key_bytes.len() as u16,
        })
    }

    /// True for the HEAD/TAIL sentinels that bound every index.
    pub fn is_sentinel(&self) -> bool {
        matches!(self.key, Value::MinKey | Value::MaxKey)
    }

    pub fn on_disk_size(&self) -> usize {
        INDEX_NODE_OVERHEAD
            + self.levels as usize * PageAddress::SERIALIZED_SIZE
            + self.key_size as usize
    }
}

#[derive(Debug, Clone)]
pub(crate) struct IndexPage {
    pub info: PageInfo,
    pub nodes: BTreeMap<u16, IndexNode>,
}

impl IndexPage {
    pub fn new(id: u32) -> Self {
        Self {
            info: PageInfo::new(id),
            nodes: BTreeMap::new(),
        }
    }

    pub fn read_body(info: PageInfo, item_count: u16, reader: &mut ByteReader<'_>) -> Result<Self> {
        let mut nodes = BTreeMap::new();
        for _ in 0..item_count {
            let index = reader.read_u16()?;
            let slot = reader.read_u8()?;
            let levels = reader.read_u8()?;
            if levels == 0 || levels as usize > MAX_LEVEL {
                return Err(Error::FileCorrupted(format!(
                    "index page {} node {} has height {}",
                    info.id, index, levels
                )));
            }
            let data_block = PageAddress::read_from(reader)?;
            let prev = PageAddress::read_from(reader)?;
            let mut next = SmallVec::with_capacity(levels as usize);
            for _ in 0..levels {
                next.push(PageAddress::read_from(reader)?);
            }
            let before = reader.remaining();
            let key = read_value(reader, 0)?;
            let key_size = (before - reader.remaining()) as u16;

            if nodes
                .insert(
                    index,
                    IndexNode {
                        slot,
                        levels,
                        key,
                        data_block,
                        prev,
                        next,
                        key_size,
                    },
                )
                .is_some()
            {
                return Err(Error::FileCorrupted(format!(
                    "index page {} repeats node index {}",
                    info.id, index
                )));
            }
        }
        Ok(Self { info, nodes })
    }

    pub fn write_body(&self, out: &mut Vec<u8>) -> Result<()> {
        for (index, node) in &self.nodes {
            out.extend_from_slice(&index.to_le_bytes());
            out.push(node.slot);
            out.push(node.levels);
            node.data_block.write_to(out);
            node.prev.write_to(out);
            for addr in &node.next {
                addr.write_to(out);
            }
            write_value(out, &node.key, 0)?;
        }
        Ok(())
    }

    pub fn item_count(&self) -> u16 {
        self.nodes.len() as u16
    }

    pub fn content_size(&self) -> usize {
        self.nodes.values().map(|n| n.on_disk_size()).sum()
    }

    /// Lowest unused slot number.
    pub fn next_index(&self) -> u16 {
        let mut candidate = 0u16;
        for index in self.nodes.keys() {
            if *index != candidate {
                break;
            }
            candidate += 1;
        }
        candidate
    }

    pub fn node(&self, index: u16) -> Result<&IndexNode> {
        self.nodes.get(&index).ok_or_else(|| {
            Error::FileCorrupted(format!(
                "index page {} has no node {}",
                self.info.id, index
            ))
        })
    }

    pub fn node_mut(&mut self, index: u16) -> Result<&mut IndexNode> {
        let id = self.info.id;
        self.nodes.get_mut(&index).ok_or_else(|| {
            Error::FileCorrupted(format!("index page {} has no node {}", id, index))
        })
    }
}
