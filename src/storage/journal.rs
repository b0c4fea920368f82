//! # Commit Journal
//!
//! A side file (`<datafile>.journal`) that makes commits atomic. During
//! commit the serialized images of every changed page are appended and
//! fsynced, then a commit marker is appended and fsynced, and only then
//! does the datafile get updated in place. Replaying a committed journal
//! is idempotent: records are full page images.
//!
//! ## Record Format
//!
//! Each record is a 32-byte header followed by one page image:
//!
//! ```text
//! +------------------+------------------+
//! | Record Header    | Page Image       |
//! | (32 bytes)       | (4096 bytes)     |
//! +------------------+------------------+
//! ```
//!
//! The header carries:
//! - `magic`: record kind (`page` or `commit marker`)
//! - `page_id`: target page (page records) or record count (marker)
//! - `checksum`: CRC-64/ECMA over the page image (or the count)
//!
//! The marker has no payload. A journal whose marker is missing, whose
//! marker count disagrees, or whose records fail their checksum is a
//! pre-commit crash: the datafile is intact and the journal is discarded.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;

use crc::{Crc, CRC_64_ECMA_182};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::config::{JOURNAL_RECORD_HEADER_SIZE, PAGE_SIZE};
use crate::error::Result;

use super::PageBuf;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

const PAGE_RECORD_MAGIC: u32 = 0x4C4E524A; // "JRNL"
const COMMIT_MARKER_MAGIC: u32 = 0x544D4D43; // "CMMT"

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct RecordHeader {
    magic: u32,
    page_id: u32,
    checksum: u64,
    _reserved: [u8; 16],
}

const _: () = assert!(size_of::<RecordHeader>() == JOURNAL_RECORD_HEADER_SIZE);

fn page_checksum(data: &PageBuf) -> u64 {
    let mut digest = CRC64.digest();
    digest.update(data);
    digest.finalize()
}

fn marker_checksum(count: u32) -> u64 {
    let mut digest = CRC64.digest();
    digest.update(&count.to_le_bytes());
    digest.finalize()
}

pub(crate) struct Journal {
    path: PathBuf,
    file: Option<File>,
}

impl Journal {
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn file(&mut self) -> Result<&mut File> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .read(true)
                .append(true)
                .create(true)
                .open(&self.path)?;
            self.file = Some(file);
        }
        Ok(self.file.as_mut().expect("journal file just opened"))
    }

    /// Appends one page image record.
    pub fn write_page(&mut self, page_id: u32, data: &PageBuf) -> Result<()> {
        let header = RecordHeader {
            magic: PAGE_RECORD_MAGIC,
            page_id,
            checksum: page_checksum(data),
            _reserved: [0; 16],
        };
        let file = self.file()?;
        file.write_all(header.as_bytes())?;
        file.write_all(data)?;
        Ok(())
    }

    /// Appends the commit marker. Once this record is on stable storage
    /// the commit is durable.
    pub fn write_commit_marker(&mut self, record_count: u32) -> Result<()> {
        let header = RecordHeader {
            magic: COMMIT_MARKER_MAGIC,
            page_id: record_count,
            checksum: marker_checksum(record_count),
            _reserved: [0; 16],
        };
        self.file()?.write_all(header.as_bytes())?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Deletes the journal file.
    pub fn clear(&mut self) -> Result<()> {
        self.file = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Scans the journal. Returns the page images to re-apply when a
    /// valid commit marker is present, `None` for a missing or partial
    /// journal.
    pub fn committed_pages(&mut self) -> Result<Option<Vec<(u32, Box<PageBuf>)>>> {
        if !self.exists() {
            return Ok(None);
        }

        let mut file = File::open(&self.path)?;
        let mut records: Vec<(u32, Box<PageBuf>)> = Vec::new();

        loop {
            let mut header_bytes = [0u8; JOURNAL_RECORD_HEADER_SIZE];
            match file.read_exact(&mut header_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
            }
            let header = match RecordHeader::read_from_bytes(&header_bytes) {
                Ok(h) => h,
                Err(_) => return Ok(None),
            };

            match header.magic {
                PAGE_RECORD_MAGIC => {
                    let mut data: Box<PageBuf> = Box::new([0u8; PAGE_SIZE]);
                    match file.read_exact(data.as_mut_slice()) {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                        Err(e) => return Err(e.into()),
                    }
                    if page_checksum(&data) != header.checksum {
                        return Ok(None);
                    }
                    records.push((header.page_id, data));
                }
                COMMIT_MARKER_MAGIC => {
                    let complete = header.page_id as usize == records.len()
                        && marker_checksum(header.page_id) == header.checksum;
                    return Ok(if complete { Some(records) } else { None });
                }
                _ => return Ok(None),
            }
        }
    }
}
