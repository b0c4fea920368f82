//! # kitedb - Embedded Single-File Document Database
//!
//! kitedb persists schemaless documents into one paged file and serves
//! point and range queries through on-disk skip-list indexes, with
//! crash-safe updates via a commit journal.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kitedb::{doc, Engine, Query};
//!
//! let db = Engine::open("./app.db")?;
//!
//! db.insert("users", [
//!     doc! { "_id" => 1, "name" => "alice", "age" => 31 },
//!     doc! { "_id" => 2, "name" => "bob", "age" => 27 },
//! ])?;
//!
//! let adults = db.find("users", &Query::gte("age", 30))?;
//! assert_eq!(adults.len(), 1);
//! # Ok::<(), kitedb::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Engine facade + Locker           │
//! ├─────────────────────────────────────────┤
//! │  Query executor │ Skip-list indexes     │
//! ├─────────────────┴───────────────────────┤
//! │  Collection store (blocks + extends)    │
//! ├─────────────────────────────────────────┤
//! │  Page cache / allocator / free lists    │
//! ├─────────────────────────────────────────┤
//! │  Page codec (4 KiB typed pages)         │
//! ├────────────────────┬────────────────────┤
//! │  Datafile I/O      │  Commit journal    │
//! └────────────────────┴────────────────────┘
//! ```
//!
//! One writer at a time, any number of readers: writers take the
//! exclusive lock and commit through the journal; readers take the
//! shared lock and see whole commits or nothing (the journal's commit
//! marker is the atomicity point).
//!
//! ## Module Overview
//!
//! - [`Engine`]: open/close, CRUD, queries, index and collection
//!   management
//! - [`Query`]: the query algebra (EQ/ranges/StartsWith/In/All and
//!   And/Or/Not)
//! - [`Document`], [`Value`], [`ObjectId`]: the document model and its
//!   codec
//! - `storage` (internal): pages, cache, allocator, journal

mod config;
mod document;
mod engine;
mod error;
mod storage;

pub use config::EngineOptions;
pub use document::{decode_document, encode_document, Document, ObjectId, Value};
pub use engine::{AutoId, Engine, EngineBuilder, Query};
pub use error::{Error, Result};
pub use storage::CacheStats;
