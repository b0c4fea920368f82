//! # Collection Page
//!
//! One per collection: document count, the head of the free-data-page
//! list (data pages ranked by free space, descending), and the
//! fixed-capacity index table. Slot 0 is always the unique `_id` index.
//!
//! ## Body Layout
//!
//! ```text
//! name               u8 len + bytes
//! document_count     u32
//! free_data_page_id  u32
//! index count        u8
//! per index entry:
//!   slot               u8
//!   field              u8 len + bytes
//!   unique             u8
//!   head               PageAddress (6)
//!   tail               PageAddress (6)
//!   free_index_page_id u32
//! ```

use crate::config::{MAX_INDEXES_PER_COLLECTION, PAGE_ID_EMPTY};
use crate::document::ByteReader;
use crate::error::{Error, Result};

use super::page::PageInfo;
use super::PageAddress;

/// One entry of a collection's index table.
#[derive(Debug, Clone)]
pub(crate) struct CollectionIndex {
    pub slot: u8,
    pub field: String,
    pub unique: bool,
    /// HEAD sentinel node (`MinKey`, full height).
    pub head: PageAddress,
    /// TAIL sentinel node (`MaxKey`, full height).
    pub tail: PageAddress,
    /// Head of this index's free-index-page list (free space descending).
    pub free_index_page_id: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct CollectionPage {
    pub info: PageInfo,
    pub name: String,
    pub document_count: u32,
    /// Head of the free-data-page list (free space descending).
    pub free_data_page_id: u32,
    indexes: Vec<CollectionIndex>,
}

impl CollectionPage {
    pub fn new(id: u32) -> Self {
        Self {
            info: PageInfo::new(id),
            name: String::new(),
            document_count: 0,
            free_data_page_id: PAGE_ID_EMPTY,
            indexes: Vec::new(),
        }
    }

    pub fn read_body(info: PageInfo, item_count: u16, reader: &mut ByteReader<'_>) -> Result<Self> {
        let name_len = reader.read_u8()? as usize;
        let name = String::from_utf8(reader.read_bytes(name_len)?.to_vec())
            .map_err(|_| Error::FileCorrupted("collection name is not utf-8".to_string()))?;
        let document_count = reader.read_u32()?;
        let free_data_page_id = reader.read_u32()?;
        let count = reader.read_u8()? as usize;
        if count != item_count as usize {
            return Err(Error::FileCorrupted(format!(
                "collection \"{}\": index table count {} != item count {}",
                name, count, item_count
            )));
        }

        let mut indexes = Vec::with_capacity(count);
        for _ in 0..count {
            let slot = reader.read_u8()?;
            let field_len = reader.read_u8()? as usize;
            let field = String::from_utf8(reader.read_bytes(field_len)?.to_vec())
                .map_err(|_| Error::FileCorrupted("index field is not utf-8".to_string()))?;
            let unique = reader.read_u8()? != 0;
            let head = PageAddress::read_from(reader)?;
            let tail = PageAddress::read_from(reader)?;
            let free_index_page_id = reader.read_u32()?;
            indexes.push(CollectionIndex {
                slot,
                field,
                unique,
                head,
                tail,
                free_index_page_id,
            });
        }

        Ok(Self {
            info,
            name,
            document_count,
            free_data_page_id,
            indexes,
        })
    }

    pub fn write_body(&self, out: &mut Vec<u8>) -> Result<()> {
        out.push(self.name.len() as u8);
        out.extend_from_slice(self.name.as_bytes());
        out.extend_from_slice(&self.document_count.to_le_bytes());
        out.extend_from_slice(&self.free_data_page_id.to_le_bytes());
        out.push(self.indexes.len() as u8);
        for index in &self.indexes {
            out.push(index.slot);
            out.push(index.field.len() as u8);
            out.extend_from_slice(index.field.as_bytes());
            out.push(index.unique as u8);
            index.head.write_to(out);
            index.tail.write_to(out);
            out.extend_from_slice(&index.free_index_page_id.to_le_bytes());
        }
        Ok(())
    }

    pub fn item_count(&self) -> u16 {
        self.indexes.len() as u16
    }

    pub fn content_size(&self) -> usize {
        10 + self.name.len()
            + self
                .indexes
                .iter()
                .map(|ix| 3 + ix.field.len() + 2 * PageAddress::SERIALIZED_SIZE + 4)
                .sum::<usize>()
    }

    pub fn indexes(&self) -> &[CollectionIndex] {
        &self.indexes
    }

    pub fn index_for(&self, field: &str) -> Option<&CollectionIndex> {
        self.indexes.iter().find(|ix| ix.field == field)
    }

    pub fn index_for_mut(&mut self, field: &str) -> Option<&mut CollectionIndex> {
        self.indexes.iter_mut().find(|ix| ix.field == field)
    }

    pub fn index_by_slot(&self, slot: u8) -> Option<&CollectionIndex> {
        self.indexes.iter().find(|ix| ix.slot == slot)
    }

    pub fn index_by_slot_mut(&mut self, slot: u8) -> Option<&mut CollectionIndex> {
        self.indexes.iter_mut().find(|ix| ix.slot == slot)
    }

    /// The `_id` index; present on every materialized collection.
    pub fn id_index(&self) -> Result<&CollectionIndex> {
        self.index_by_slot(0).ok_or_else(|| {
            Error::FileCorrupted(format!("collection \"{}\" has no _id index", self.name))
        })
    }

    /// Reserves the next free slot in the index table.
    pub fn add_index(&mut self, index: CollectionIndex) -> Result<()> {
        if self.indexes.len() >= MAX_INDEXES_PER_COLLECTION {
            return Err(Error::CollectionLimitSize(format!(
                "collection \"{}\" holds at most {} indexes",
                self.name, MAX_INDEXES_PER_COLLECTION
            )));
        }
        self.indexes.push(index);
        Ok(())
    }

    pub fn next_free_slot(&self) -> Result<u8> {
        (0..MAX_INDEXES_PER_COLLECTION as u8)
            .find(|slot| self.index_by_slot(*slot).is_none())
            .ok_or_else(|| {
                Error::CollectionLimitSize(format!(
                    "collection \"{}\" holds at most {} indexes",
                    self.name, MAX_INDEXES_PER_COLLECTION
                ))
            })
    }

    pub fn remove_index(&mut self, slot: u8) -> Option<CollectionIndex> {
        let pos = self.indexes.iter().position(|ix| ix.slot == slot)?;
        Some(self.indexes.remove(pos))
    }
}
