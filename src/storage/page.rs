//! # Page Types and Header Layout
//!
//! Every 4 KiB page begins with a 32-byte header followed by a
//! type-specific body. Pages deserialize into typed structs which the
//! cache owns; the codec here dispatches between the two forms.
//!
//! ## Page Header Layout (32 bytes)
//!
//! ```text
//! Offset  Size  Field         Description
//! ------  ----  ------------  ----------------------------------------
//! 0       4     page_id       This page's id (page 0 = header page)
//! 4       4     prev_page_id  Previous page in this page's list
//! 8       4     next_page_id  Next page in this page's list
//! 12      2     item_count    Number of items in the body
//! 14      2     free_bytes    Unused body bytes
//! 16      1     page_type     Empty/Header/Collection/Index/Data/Extend
//! 17      15    reserved      Zero
//! ```
//!
//! `u32::MAX` in a link field means "no link". The `prev`/`next` links
//! carry whichever list the page belongs to: the global empty-page pool,
//! a collection's free-data list, an index's free-index list, or an
//! extend chain.
//!
//! ## Zero Pages
//!
//! Reading past the end of the datafile yields a zeroed buffer. A zeroed
//! buffer decodes as a fresh [`EmptyPage`] with the id the caller asked
//! for; a persisted empty page is distinguishable because it stores its
//! real id and a non-zero `free_bytes`.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::config::{PAGE_AVAILABLE_BYTES, PAGE_HEADER_SIZE, PAGE_ID_EMPTY};
use crate::document::ByteReader;
use crate::error::{Error, Result};

use super::collection_page::CollectionPage;
use super::data_page::{DataPage, ExtendPage};
use super::header_page::HeaderPage;
use super::index_page::IndexPage;
use super::PageBuf;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageType {
    Empty = 0,
    Header = 1,
    Collection = 2,
    Index = 3,
    Data = 4,
    Extend = 5,
}

impl PageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(PageType::Empty),
            1 => Some(PageType::Header),
            2 => Some(PageType::Collection),
            3 => Some(PageType::Index),
            4 => Some(PageType::Data),
            5 => Some(PageType::Extend),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PageType::Empty => "empty",
            PageType::Header => "header",
            PageType::Collection => "collection",
            PageType::Index => "index",
            PageType::Data => "data",
            PageType::Extend => "extend",
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct PageHeader {
    page_id: u32,
    prev_page_id: u32,
    next_page_id: u32,
    item_count: u16,
    free_bytes: u16,
    page_type: u8,
    _reserved: [u8; 15],
}

const _: () = assert!(size_of::<PageHeader>() == PAGE_HEADER_SIZE);

/// Identity and list links shared by every page type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageInfo {
    pub id: u32,
    pub prev: u32,
    pub next: u32,
}

impl PageInfo {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            prev: PAGE_ID_EMPTY,
            next: PAGE_ID_EMPTY,
        }
    }
}

/// A page with no content, pooled on the global empty-page list.
#[derive(Debug, Clone)]
pub(crate) struct EmptyPage {
    pub info: PageInfo,
}

impl EmptyPage {
    pub fn new(id: u32) -> Self {
        Self {
            info: PageInfo::new(id),
        }
    }
}

/// A typed, decoded page. The cache owns exactly one of these per id.
#[derive(Debug, Clone)]
pub(crate) enum Page {
    Header(HeaderPage),
    Collection(CollectionPage),
    Index(IndexPage),
    Data(DataPage),
    Extend(ExtendPage),
    Empty(EmptyPage),
}

impl Page {
    /// Decodes a raw buffer. `expected_id` is the position the buffer was
    /// read from; a mismatch is corruption except for the all-zero fresh
    /// page case.
    pub fn read(expected_id: u32, buf: &PageBuf) -> Result<Self> {
        let header = PageHeader::read_from_bytes(&buf[..PAGE_HEADER_SIZE])
            .map_err(|e| Error::FileCorrupted(format!("unreadable page header: {:?}", e)))?;

        let is_fresh =
            header.page_type == 0 && header.page_id == 0 && header.free_bytes == 0;
        if is_fresh {
            return Ok(Page::Empty(EmptyPage::new(expected_id)));
        }

        if header.page_id != expected_id {
            return Err(Error::FileCorrupted(format!(
                "page {} stores id {}",
                expected_id, header.page_id
            )));
        }

        let page_type = PageType::from_byte(header.page_type).ok_or_else(|| {
            Error::FileCorrupted(format!(
                "page {} has unknown type 0x{:02x}",
                expected_id, header.page_type
            ))
        })?;

        let info = PageInfo {
            id: header.page_id,
            prev: header.prev_page_id,
            next: header.next_page_id,
        };
        let mut reader = ByteReader::new(&buf[PAGE_HEADER_SIZE..]);

        let page = match page_type {
            PageType::Empty => Page::Empty(EmptyPage { info }),
            PageType::Header => Page::Header(HeaderPage::read_body(info, &mut reader)?),
            PageType::Collection => {
                Page::Collection(CollectionPage::read_body(info, header.item_count, &mut reader)?)
            }
            PageType::Index => {
                Page::Index(IndexPage::read_body(info, header.item_count, &mut reader)?)
            }
            PageType::Data => {
                Page::Data(DataPage::read_body(info, header.item_count, &mut reader)?)
            }
            PageType::Extend => Page::Extend(ExtendPage::read_body(info, &mut reader)?),
        };
        Ok(page)
    }

    /// Encodes into a raw buffer. The computed `free_bytes`/`item_count`
    /// land in the header, keeping the on-disk invariant
    /// `free_bytes = available - content` true by construction.
    pub fn write(&self, buf: &mut PageBuf) -> Result<()> {
        let mut body = Vec::with_capacity(256);
        match self {
            Page::Header(p) => p.write_body(&mut body)?,
            Page::Collection(p) => p.write_body(&mut body)?,
            Page::Index(p) => p.write_body(&mut body)?,
            Page::Data(p) => p.write_body(&mut body)?,
            Page::Extend(p) => p.write_body(&mut body)?,
            Page::Empty(_) => {}
        }

        if body.len() > PAGE_AVAILABLE_BYTES {
            return Err(Error::FileCorrupted(format!(
                "page {} body overflows: {} > {}",
                self.info().id,
                body.len(),
                PAGE_AVAILABLE_BYTES
            )));
        }

        let info = self.info();
        let header = PageHeader {
            page_id: info.id,
            prev_page_id: info.prev,
            next_page_id: info.next,
            item_count: self.item_count(),
            free_bytes: self.free_bytes(),
            page_type: self.page_type() as u8,
            _reserved: [0; 15],
        };

        buf.fill(0);
        buf[..PAGE_HEADER_SIZE].copy_from_slice(header.as_bytes());
        buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + body.len()].copy_from_slice(&body);
        Ok(())
    }

    pub fn page_type(&self) -> PageType {
        match self {
            Page::Header(_) => PageType::Header,
            Page::Collection(_) => PageType::Collection,
            Page::Index(_) => PageType::Index,
            Page::Data(_) => PageType::Data,
            Page::Extend(_) => PageType::Extend,
            Page::Empty(_) => PageType::Empty,
        }
    }

    pub fn info(&self) -> &PageInfo {
        match self {
            Page::Header(p) => &p.info,
            Page::Collection(p) => &p.info,
            Page::Index(p) => &p.info,
            Page::Data(p) => &p.info,
            Page::Extend(p) => &p.info,
            Page::Empty(p) => &p.info,
        }
    }

    pub fn info_mut(&mut self) -> &mut PageInfo {
        match self {
            Page::Header(p) => &mut p.info,
            Page::Collection(p) => &mut p.info,
            Page::Index(p) => &mut p.info,
            Page::Data(p) => &mut p.info,
            Page::Extend(p) => &mut p.info,
            Page::Empty(p) => &mut p.info,
        }
    }

    pub fn item_count(&self) -> u16 {
        match self {
            Page::Header(p) => p.item_count(),
            Page::Collection(p) => p.item_count(),
            Page::Index(p) => p.item_count(),
            Page::Data(p) => p.item_count(),
            Page::Extend(_) => 1,
            Page::Empty(_) => 0,
        }
    }

    pub fn content_size(&self) -> usize {
        match self {
            Page::Header(p) => p.content_size(),
            Page::Collection(p) => p.content_size(),
            Page::Index(p) => p.content_size(),
            Page::Data(p) => p.content_size(),
            Page::Extend(p) => p.content_size(),
            Page::Empty(_) => 0,
        }
    }

    pub fn free_bytes(&self) -> u16 {
        (PAGE_AVAILABLE_BYTES.saturating_sub(self.content_size())) as u16
    }
}

/// Typed access into the [`Page`] enum, used by the cache's generic
/// `get`/`get_mut`/`new_page`.
pub(crate) trait TypedPage: Sized {
    const PAGE_TYPE: PageType;

    fn new(id: u32) -> Self;
    fn into_page(self) -> Page;
    fn from_page(page: &Page) -> Option<&Self>;
    fn from_page_mut(page: &mut Page) -> Option<&mut Self>;
}

macro_rules! impl_typed_page {
    ($ty:ident, $variant:ident) => {
        impl TypedPage for $ty {
            const PAGE_TYPE: PageType = PageType::$variant;

            fn new(id: u32) -> Self {
                $ty::new(id)
            }

            fn into_page(self) -> Page {
                Page::$variant(self)
            }

            fn from_page(page: &Page) -> Option<&Self> {
                match page {
                    Page::$variant(p) => Some(p),
                    _ => None,
                }
            }

            fn from_page_mut(page: &mut Page) -> Option<&mut Self> {
                match page {
                    Page::$variant(p) => Some(p),
                    _ => None,
                }
            }
        }
    };
}

impl_typed_page!(HeaderPage, Header);
impl_typed_page!(CollectionPage, Collection);
impl_typed_page!(IndexPage, Index);
impl_typed_page!(DataPage, Data);
impl_typed_page!(ExtendPage, Extend);
impl_typed_page!(EmptyPage, Empty);
