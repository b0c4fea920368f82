//! # Data and Extend Pages
//!
//! A document's payload lives in a [`DataBlock`] on a data page. Payload
//! that does not fit the block's page spills into a chain of extend
//! pages linked through their `next` header field.
//!
//! ## Data Page Body Layout
//!
//! Blocks are stored in slot order:
//!
//! ```text
//! per block:
//!   index           u16  slot number (stable while the block lives)
//!   extend_page_id  u32  first extend page, or u32::MAX
//!   id_node         PageAddress (6)  back-reference to the _id node
//!   data_len        u16
//!   data            data_len bytes
//! ```
//!
//! ## Extend Page Body Layout
//!
//! ```text
//! data_len  u16
//! data      data_len bytes
//! ```
//!
//! Data pages always sit on their collection's free-data list ordered by
//! free bytes descending; extend pages belong to exactly one block chain
//! and are never on a free list.

use std::collections::BTreeMap;

use crate::config::PAGE_AVAILABLE_BYTES;
use crate::document::ByteReader;
use crate::error::{Error, Result};

use super::page::PageInfo;
use super::PageAddress;

/// Fixed per-block cost: slot + extend link + id-node backref + length.
pub(crate) const DATA_BLOCK_OVERHEAD: usize = 2 + 4 + PageAddress::SERIALIZED_SIZE + 2;

/// Payload bytes one extend page can carry.
pub(crate) const EXTEND_PAGE_CAPACITY: usize = PAGE_AVAILABLE_BYTES - 2;

/// One document's payload head.
#[derive(Debug, Clone)]
pub(crate) struct DataBlock {
    /// First extend page of the spill chain, `PAGE_ID_EMPTY` if none.
    pub extend_page_id: u32,
    /// The `_id` index node owning this block.
    pub id_node: PageAddress,
    /// The slice of the payload hosted on this page.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub(crate) struct DataPage {
    pub info: PageInfo,
    pub blocks: BTreeMap<u16, DataBlock>,
}

impl DataPage {
    pub fn new(id: u32) -> Self {
        Self {
            info: PageInfo::new(id),
            blocks: BTreeMap::new(),
        }
    }

    pub fn read_body(info: PageInfo, item_count: u16, reader: &mut ByteReader<'_>) -> Result<Self> {
        let mut blocks = BTreeMap::new();
        for _ in 0..item_count {
            let index = reader.read_u16()?;
            let extend_page_id = reader.read_u32()?;
            let id_node = PageAddress::read_from(reader)?;
            let data_len = reader.read_u16()? as usize;
            let data = reader.read_bytes(data_len)?.to_vec();
            if blocks.insert(index, DataBlock { extend_page_id, id_node, data }).is_some() {
                return Err(Error::FileCorrupted(format!(
                    "data page {} repeats block index {}",
                    info.id, index
                )));
            }
        }
        Ok(Self { info, blocks })
    }

    pub fn write_body(&self, out: &mut Vec<u8>) -> Result<()> {
        for (index, block) in &self.blocks {
            out.extend_from_slice(&index.to_le_bytes());
            out.extend_from_slice(&block.extend_page_id.to_le_bytes());
            block.id_node.write_to(out);
            out.extend_from_slice(&(block.data.len() as u16).to_le_bytes());
            out.extend_from_slice(&block.data);
        }
        Ok(())
    }

    pub fn item_count(&self) -> u16 {
        self.blocks.len() as u16
    }

    pub fn content_size(&self) -> usize {
        self.blocks
            .values()
            .map(|b| DATA_BLOCK_OVERHEAD + b.data.len())
            .sum()
    }

    /// Lowest unused slot number.
    pub fn next_index(&self) -> u16 {
        let mut candidate = 0u16;
        for index in self.blocks.keys() {
            if *index != candidate {
                break;
            }
            candidate += 1;
        }
        candidate
    }

    pub fn block(&self, index: u16) -> Result<&DataBlock> {
        self.blocks.get(&index).ok_or_else(|| {
            Error::FileCorrupted(format!(
                "data page {} has no block {}",
                self.info.id, index
            ))
        })
    }

    pub fn block_mut(&mut self, index: u16) -> Result<&mut DataBlock> {
        let id = self.info.id;
        self.blocks.get_mut(&index).ok_or_else(|| {
            Error::FileCorrupted(format!("data page {} has no block {}", id, index))
        })
    }
}

/// Overflow page carrying one slice of a spilled payload.
#[derive(Debug, Clone)]
pub(crate) struct ExtendPage {
    pub info: PageInfo,
    pub data: Vec<u8>,
}

impl ExtendPage {
    pub fn new(id: u32) -> Self {
        Self {
            info: PageInfo::new(id),
            data: Vec::new(),
        }
    }

    pub fn read_body(info: PageInfo, reader: &mut ByteReader<'_>) -> Result<Self> {
        let data_len = reader.read_u16()? as usize;
        let data = reader.read_bytes(data_len)?.to_vec();
        Ok(Self { info, data })
    }

    pub fn write_body(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&(self.data.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.data);
        Ok(())
    }

    pub fn content_size(&self) -> usize {
        2 + self.data.len()
    }
}
