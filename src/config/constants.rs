//! # kitedb Configuration Constants
//!
//! Centralizes the on-disk geometry and fixed limits. Constants that
//! depend on each other are co-located and guarded by compile-time
//! assertions so a change to one cannot silently break another.
//!
//! ## Dependency Graph
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> PAGE_HEADER_SIZE (32 bytes, fixed)
//!       │
//!       ├─> PAGE_AVAILABLE_BYTES (derived: PAGE_SIZE - PAGE_HEADER_SIZE)
//!       │
//!       └─> JOURNAL_RECORD_SIZE (derived: record header + full page)
//!
//! MAX_LEVEL (32)
//!       │
//!       └─> skip-list node heights are drawn geometrically and capped
//!           here; the HEAD/TAIL sentinels are always this tall
//!
//! MAX_INDEX_KEY_SIZE (512)
//!       │
//!       └─> must leave room for a maximum-height node plus its pointer
//!           array inside one page
//! ```

/// Size of each database page in bytes. The sole unit of I/O.
pub const PAGE_SIZE: usize = 4096;

/// Size of the page header in bytes. Every page begins with this header.
pub const PAGE_HEADER_SIZE: usize = 32;

/// Usable space in a page after the header.
pub const PAGE_AVAILABLE_BYTES: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

/// Sentinel page id meaning "no link".
pub const PAGE_ID_EMPTY: u32 = u32::MAX;

/// Maximum skip-list height. `P(height = k) = 2^-k`, capped here.
pub const MAX_LEVEL: usize = 32;

/// Maximum serialized size of one index key in bytes.
pub const MAX_INDEX_KEY_SIZE: usize = 512;

/// Maximum nesting depth the document codec accepts.
pub const MAX_DOCUMENT_DEPTH: usize = 20;

/// Maximum collection name length in bytes.
pub const MAX_COLLECTION_NAME_SIZE: usize = 60;

/// Fixed capacity of the header page's collection directory.
pub const MAX_COLLECTIONS: usize = 16;

/// Fixed capacity of the per-collection index table.
pub const MAX_INDEXES_PER_COLLECTION: usize = 16;

/// Size of a journal record header in bytes.
pub const JOURNAL_RECORD_HEADER_SIZE: usize = 32;

/// Size of a complete journal record (header + page image).
pub const JOURNAL_RECORD_SIZE: usize = JOURNAL_RECORD_HEADER_SIZE + PAGE_SIZE;

/// Default soft cap for the page cache, in pages.
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Default lock-acquire timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Default number of documents per transaction in batched writes.
pub const DEFAULT_WRITE_BUFFER: usize = 1000;

const _: () = assert!(
    PAGE_AVAILABLE_BYTES == PAGE_SIZE - PAGE_HEADER_SIZE,
    "PAGE_AVAILABLE_BYTES derivation mismatch"
);

const _: () = assert!(
    JOURNAL_RECORD_SIZE == JOURNAL_RECORD_HEADER_SIZE + PAGE_SIZE,
    "JOURNAL_RECORD_SIZE derivation mismatch"
);

const _: () = assert!(
    // a max-height node (16 fixed + 6 per level + key) must fit a page
    16 + 6 * MAX_LEVEL + MAX_INDEX_KEY_SIZE <= PAGE_AVAILABLE_BYTES,
    "a maximum-height index node must fit in one page"
);
