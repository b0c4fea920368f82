//! # Header Page
//!
//! The singleton at page 0: file identity, allocation high-water mark,
//! the empty-page pool head, the commit change counter, and the
//! name -> first-page directory of collections.
//!
//! ## Body Layout
//!
//! ```text
//! Offset  Size  Field               Description
//! ------  ----  ------------------  --------------------------------
//! 0       16    magic               fixed identification string
//! 16      1     version             format version (currently 1)
//! 17      4     last_page_id        highest page id ever allocated
//! 21      4     free_empty_page_id  head of the empty-page pool
//! 25      4     change_counter      bumped by every commit
//! 29      1     collection count    directory entries that follow
//! 30      ...   entries             name (u8 len + bytes) + u32 page id
//! ```

use crate::config::{MAX_COLLECTIONS, PAGE_ID_EMPTY};
use crate::document::ByteReader;
use crate::error::{Error, Result};

use super::page::PageInfo;

pub(crate) const HEADER_MAGIC: [u8; 16] = *b"** kitedbfile **";
pub(crate) const FILE_VERSION: u8 = 1;

/// Page 0. Always resident while the engine is open.
#[derive(Debug, Clone)]
pub(crate) struct HeaderPage {
    pub info: PageInfo,
    pub version: u8,
    /// Highest page id ever allocated; the datafile spans `0..=last_page_id`.
    pub last_page_id: u32,
    /// Head of the (unordered) empty-page pool.
    pub free_empty_page_id: u32,
    /// Monotonic commit counter; readers use it to detect staleness.
    pub change_counter: u32,
    collections: Vec<(String, u32)>,
}

impl HeaderPage {
    pub fn new(id: u32) -> Self {
        Self {
            info: PageInfo::new(id),
            version: FILE_VERSION,
            last_page_id: 0,
            free_empty_page_id: PAGE_ID_EMPTY,
            change_counter: 0,
            collections: Vec::new(),
        }
    }

    pub fn read_body(info: PageInfo, reader: &mut ByteReader<'_>) -> Result<Self> {
        let magic = reader.read_array::<16>()?;
        if magic != HEADER_MAGIC {
            return Err(Error::InvalidDatabase(
                "header magic mismatch".to_string(),
            ));
        }

        let version = reader.read_u8()?;
        if version != FILE_VERSION {
            return Err(Error::InvalidDatabaseVersion {
                expected: FILE_VERSION,
                found: version,
            });
        }

        let last_page_id = reader.read_u32()?;
        let free_empty_page_id = reader.read_u32()?;
        let change_counter = reader.read_u32()?;
        let count = reader.read_u8()? as usize;

        let mut collections = Vec::with_capacity(count);
        for _ in 0..count {
            let name_len = reader.read_u8()? as usize;
            let name_bytes = reader.read_bytes(name_len)?;
            let name = String::from_utf8(name_bytes.to_vec()).map_err(|_| {
                Error::FileCorrupted("collection name is not utf-8".to_string())
            })?;
            let page_id = reader.read_u32()?;
            collections.push((name, page_id));
        }

        Ok(Self {
            info,
            version,
            last_page_id,
            free_empty_page_id,
            change_counter,
            collections,
        })
    }

    pub fn write_body(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&HEADER_MAGIC);
        out.push(self.version);
        out.extend_from_slice(&self.last_page_id.to_le_bytes());
        out.extend_from_slice(&self.free_empty_page_id.to_le_bytes());
        out.extend_from_slice(&self.change_counter.to_le_bytes());
        out.push(self.collections.len() as u8);
        for (name, page_id) in &self.collections {
            out.push(name.len() as u8);
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&page_id.to_le_bytes());
        }
        Ok(())
    }

    pub fn item_count(&self) -> u16 {
        self.collections.len() as u16
    }

    pub fn content_size(&self) -> usize {
        30 + self
            .collections
            .iter()
            .map(|(name, _)| 1 + name.len() + 4)
            .sum::<usize>()
    }

    pub fn collection(&self, name: &str) -> Option<u32> {
        self.collections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    pub fn collections(&self) -> impl Iterator<Item = (&str, u32)> {
        self.collections.iter().map(|(n, id)| (n.as_str(), *id))
    }

    pub fn add_collection(&mut self, name: &str, page_id: u32) -> Result<()> {
        if self.collections.len() >= MAX_COLLECTIONS {
            return Err(Error::CollectionLimitSize(format!(
                "directory holds at most {} collections",
                MAX_COLLECTIONS
            )));
        }
        self.collections.push((name.to_string(), page_id));
        Ok(())
    }

    pub fn remove_collection(&mut self, name: &str) -> Option<u32> {
        let pos = self.collections.iter().position(|(n, _)| n == name)?;
        Some(self.collections.remove(pos).1)
    }

    pub fn rename_collection(&mut self, old: &str, new: &str) -> bool {
        match self.collections.iter_mut().find(|(n, _)| n == old) {
            Some(entry) => {
                entry.0 = new.to_string();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAGE_SIZE;
    use crate::storage::Page;

    fn roundtrip(header: HeaderPage) -> HeaderPage {
        let mut buf = [0u8; PAGE_SIZE];
        Page::Header(header).write(&mut buf).unwrap();
        match Page::read(0, &buf).unwrap() {
            Page::Header(h) => h,
            other => panic!("expected header page, got {:?}", other.page_type()),
        }
    }

    #[test]
    fn roundtrips_directory() {
        let mut header = HeaderPage::new(0);
        header.last_page_id = 41;
        header.free_empty_page_id = 7;
        header.change_counter = 3;
        header.add_collection("docs", 1).unwrap();
        header.add_collection("other", 5).unwrap();

        let back = roundtrip(header);

        assert_eq!(back.last_page_id, 41);
        assert_eq!(back.free_empty_page_id, 7);
        assert_eq!(back.change_counter, 3);
        assert_eq!(back.collection("docs"), Some(1));
        assert_eq!(back.collection("other"), Some(5));
        assert_eq!(back.collection("missing"), None);
    }

    #[test]
    fn directory_capacity_is_enforced() {
        let mut header = HeaderPage::new(0);
        for i in 0..MAX_COLLECTIONS {
            header.add_collection(&format!("c{}", i), i as u32 + 1).unwrap();
        }

        let err = header.add_collection("overflow", 99).unwrap_err();
        assert!(matches!(err, Error::CollectionLimitSize(_)));
    }

    #[test]
    fn bad_magic_is_invalid_database() {
        let mut buf = [0u8; PAGE_SIZE];
        Page::Header(HeaderPage::new(0)).write(&mut buf).unwrap();
        buf[32] = b'x';

        let err = Page::read(0, &buf).unwrap_err();
        assert!(matches!(err, Error::InvalidDatabase(_)));
    }

    #[test]
    fn wrong_version_is_reported() {
        let mut buf = [0u8; PAGE_SIZE];
        Page::Header(HeaderPage::new(0)).write(&mut buf).unwrap();
        buf[48] = 9;

        let err = Page::read(0, &buf).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidDatabaseVersion { expected: 1, found: 9 }
        ));
    }

    #[test]
    fn rename_updates_directory() {
        let mut header = HeaderPage::new(0);
        header.add_collection("old", 2).unwrap();

        assert!(header.rename_collection("old", "new"));
        assert_eq!(header.collection("old"), None);
        assert_eq!(header.collection("new"), Some(2));
        assert!(!header.rename_collection("old", "other"));
    }
}
