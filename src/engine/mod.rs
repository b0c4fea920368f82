//! # Engine Facade
//!
//! [`Engine`] is the public entry point: it owns the datafile, journal,
//! page cache and locker, and exposes the document operations. Every
//! write acquires the exclusive lock and runs inside an implicit
//! transaction (commit on success, rollback on error); every read
//! acquires the shared lock and sees either the full pre-commit or full
//! post-commit state of any concurrent writer.
//!
//! ## Locking and Cache Staleness
//!
//! One engine instance serializes its writers through the locker.
//! Readers serialize on the internal cache mutex but hold only the
//! shared lock, so they never interleave with a writer. A reader (or
//! writer) that observes a newer change counter than the state it last
//! acted on evicts the page cache first, so committed pages are
//! re-read from disk before anything is trusted.
//!
//! ## Auto-Index
//!
//! `find`, `count`, `exists`, `min`, `max`, `delete` and `update`
//! resolve `IndexNotFound` by building the missing index from a
//! collection scan and retrying the operation, once per missing field.

mod autoid;
mod builder;
mod collection;
mod data;
mod index;
mod locker;
mod query;
mod transaction;

pub use autoid::AutoId;
pub use builder::EngineBuilder;
pub use query::Query;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::{EngineOptions, DEFAULT_WRITE_BUFFER, PAGE_ID_EMPTY};
use crate::document::{decode_document, encode_document, Document, Value};
use crate::error::{Error, Result};
use crate::storage::{
    CacheStats, CollectionPage, DataFile, HeaderPage, Journal, Page, PageAddress, PageCache,
};

use index::SkipIndex;
use locker::Locker;

struct EngineInner {
    cache: PageCache,
    journal: Journal,
    last_change: u64,
}

/// An open kitedb datafile.
pub struct Engine {
    locker: Locker,
    inner: Mutex<EngineInner>,
    options: EngineOptions,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Opens (or creates) a datafile with default options.
    pub fn open(path: impl Into<std::path::PathBuf>) -> Result<Engine> {
        Engine::open_with(EngineOptions::new(path))
    }

    /// Fluent configuration; finish with [`EngineBuilder::open`].
    pub fn builder(path: impl Into<std::path::PathBuf>) -> EngineBuilder {
        EngineBuilder::new(path)
    }

    /// Opens (or creates) a datafile, replaying or discarding a leftover
    /// journal first.
    pub fn open_with(options: EngineOptions) -> Result<Engine> {
        let mut journal = Journal::new(options.journal_path());
        let mut disk = DataFile::open(&options.path, options.read_only, options.initial_size)?;
        transaction::recover(&mut disk, &mut journal, options.read_only)?;

        let mut cache = PageCache::new(disk);
        if cache.page_count() == 0 {
            if options.read_only {
                return Err(Error::InvalidDatabase("datafile is empty".to_string()));
            }
            cache.bootstrap(Page::Header(HeaderPage::new(0)));
            cache.commit(None)?;
            debug!(path = %options.path.display(), "created datafile");
        }

        let change = cache.header()?.change_counter as u64;
        Ok(Engine {
            locker: Locker::new(options.timeout, change),
            inner: Mutex::new(EngineInner {
                cache,
                journal,
                last_change: change,
            }),
            options,
        })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Cumulative page I/O counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().cache.stats()
    }

    // ----- lock/transaction plumbing ---------------------------------

    fn refresh(&self, inner: &mut EngineInner) {
        let current = self.locker.changes();
        if inner.last_change != current {
            inner.cache.clear();
            inner.last_change = current;
        }
    }

    fn commit_inner(&self, inner: &mut EngineInner) -> Result<()> {
        let EngineInner { cache, journal, .. } = inner;
        let written = transaction::commit(
            cache,
            journal,
            self.options.journal,
            self.locker.next_change() as u32,
        )?;
        if written > 0 {
            inner.last_change = self.locker.bump();
        }
        Ok(())
    }

    fn read_op<T>(&self, f: impl FnOnce(&mut EngineInner) -> Result<T>) -> Result<T> {
        let _shared = self.locker.shared()?;
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        let result = f(&mut inner);
        inner.cache.trim(self.options.cache_size);
        result
    }

    fn write_op<T>(&self, f: impl FnOnce(&Engine, &mut EngineInner) -> Result<T>) -> Result<T> {
        if self.options.read_only {
            return Err(Error::ReadOnly);
        }
        let _exclusive = self.locker.exclusive()?;
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        match f(self, &mut inner).and_then(|value| {
            self.commit_inner(&mut inner)?;
            Ok(value)
        }) {
            Ok(value) => {
                inner.cache.trim(self.options.cache_size);
                Ok(value)
            }
            Err(e) => {
                transaction::rollback(&mut inner.cache);
                Err(e)
            }
        }
    }

    /// Retries `f` after building each missing index, at most once per
    /// field.
    fn with_auto_index<T>(
        &self,
        collection: &str,
        f: impl Fn(&Engine) -> Result<T>,
    ) -> Result<T> {
        let mut built: Vec<String> = Vec::new();
        loop {
            match f(self) {
                Err(Error::IndexNotFound { field }) if !built.contains(&field) => {
                    self.ensure_index(collection, &field, false)?;
                    built.push(field);
                }
                other => return other,
            }
        }
    }

    // ----- writes ----------------------------------------------------

    /// Inserts documents, assigning ObjectId `_id`s where absent.
    /// Returns the number of documents inserted.
    pub fn insert(
        &self,
        collection: &str,
        docs: impl IntoIterator<Item = Document>,
    ) -> Result<usize> {
        self.insert_with(collection, docs, AutoId::ObjectId, DEFAULT_WRITE_BUFFER)
    }

    /// Inserts with an explicit id strategy and batch size. A commit
    /// runs every `buffer_size` documents; on failure the open batch
    /// rolls back while previously committed batches stay durable.
    pub fn insert_with(
        &self,
        collection: &str,
        docs: impl IntoIterator<Item = Document>,
        auto_id: AutoId,
        buffer_size: usize,
    ) -> Result<usize> {
        let buffer_size = buffer_size.max(1);
        self.write_op(|engine, inner| {
            let col_id = collection::get_or_create(&mut inner.cache, collection)?;
            let mut count = 0usize;
            let mut buffered = 0usize;
            for mut doc in docs {
                prepare_id(&mut inner.cache, col_id, &mut doc, auto_id)?;
                insert_document(&mut inner.cache, col_id, &doc)?;
                count += 1;
                buffered += 1;
                if buffered >= buffer_size {
                    engine.commit_inner(inner)?;
                    buffered = 0;
                }
            }
            Ok(count)
        })
    }

    /// Convenience for a single document.
    pub fn insert_one(&self, collection: &str, doc: Document) -> Result<usize> {
        self.insert(collection, [doc])
    }

    /// Replaces documents whole, matched by `_id`. Documents without a
    /// stored counterpart are skipped. Returns the number updated.
    pub fn update(
        &self,
        collection: &str,
        docs: impl IntoIterator<Item = Document>,
    ) -> Result<usize> {
        self.update_with(collection, docs, DEFAULT_WRITE_BUFFER)
    }

    /// Like [`Engine::update`] with an explicit batch size.
    pub fn update_with(
        &self,
        collection: &str,
        docs: impl IntoIterator<Item = Document>,
        buffer_size: usize,
    ) -> Result<usize> {
        let buffer_size = buffer_size.max(1);
        self.write_op(|engine, inner| {
            let Some(col_id) = collection::find(&mut inner.cache, collection)? else {
                return Ok(0);
            };
            let mut count = 0usize;
            let mut buffered = 0usize;
            for doc in docs {
                if update_document(&mut inner.cache, col_id, &doc)? {
                    count += 1;
                    buffered += 1;
                    if buffered >= buffer_size {
                        engine.commit_inner(inner)?;
                        buffered = 0;
                    }
                }
            }
            Ok(count)
        })
    }

    /// Deletes every document matching `query`; returns how many.
    pub fn delete(&self, collection: &str, query: &Query) -> Result<usize> {
        self.with_auto_index(collection, |engine| {
            engine.write_op(|_, inner| {
                let Some(col_id) = collection::find(&mut inner.cache, collection)? else {
                    return Ok(0);
                };
                let addrs = query.run(&mut inner.cache, col_id)?;
                for addr in &addrs {
                    delete_document(&mut inner.cache, col_id, *addr)?;
                }
                Ok(addrs.len())
            })
        })
    }

    // ----- reads -----------------------------------------------------

    /// All documents matching `query`, in index order for leaf queries.
    pub fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        self.find_with(collection, query, 0, usize::MAX)
    }

    /// Paged variant of [`Engine::find`]: applies `skip`/`limit` before
    /// any document is materialized.
    pub fn find_with(
        &self,
        collection: &str,
        query: &Query,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Document>> {
        self.with_auto_index(collection, |engine| {
            engine.read_op(|inner| {
                let Some(col_id) = collection::find(&mut inner.cache, collection)? else {
                    return Ok(Vec::new());
                };
                let addrs = query.run(&mut inner.cache, col_id)?;
                addrs
                    .into_iter()
                    .skip(skip)
                    .take(limit)
                    .map(|addr| decode_document(&data::read(&mut inner.cache, addr)?))
                    .collect()
            })
        })
    }

    /// First match, if any.
    pub fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Document>> {
        Ok(self.find_with(collection, query, 0, 1)?.pop())
    }

    /// Matching document count; `None` counts the whole collection in
    /// O(1) from its metadata.
    pub fn count(&self, collection: &str, query: Option<&Query>) -> Result<usize> {
        match query {
            None => self.read_op(|inner| {
                let Some(col_id) = collection::find(&mut inner.cache, collection)? else {
                    return Ok(0);
                };
                Ok(inner.cache.get::<CollectionPage>(col_id)?.document_count as usize)
            }),
            Some(query) => self.with_auto_index(collection, |engine| {
                engine.read_op(|inner| {
                    let Some(col_id) = collection::find(&mut inner.cache, collection)? else {
                        return Ok(0);
                    };
                    Ok(query.run(&mut inner.cache, col_id)?.len())
                })
            }),
        }
    }

    /// Does any document match?
    pub fn exists(&self, collection: &str, query: &Query) -> Result<bool> {
        Ok(self.count(collection, Some(query))? > 0)
    }

    /// Smallest key of the field's index: an O(1) edge read.
    pub fn min(&self, collection: &str, field: &str) -> Result<Option<Value>> {
        self.with_auto_index(collection, |engine| {
            engine.read_op(|inner| {
                let Some(col_id) = collection::find(&mut inner.cache, collection)? else {
                    return Ok(None);
                };
                let mut index = bind_index(&mut inner.cache, col_id, field)?;
                Ok(index.first()?.map(|(_, node)| node.key))
            })
        })
    }

    /// Largest key of the field's index: an O(1) edge read.
    pub fn max(&self, collection: &str, field: &str) -> Result<Option<Value>> {
        self.with_auto_index(collection, |engine| {
            engine.read_op(|inner| {
                let Some(col_id) = collection::find(&mut inner.cache, collection)? else {
                    return Ok(None);
                };
                let mut index = bind_index(&mut inner.cache, col_id, field)?;
                Ok(index.last()?.map(|(_, node)| node.key))
            })
        })
    }

    // ----- schema ----------------------------------------------------

    /// Creates an index on `field`, building it from the existing
    /// documents. Returns `false` when it already exists.
    pub fn ensure_index(&self, collection: &str, field: &str, unique: bool) -> Result<bool> {
        self.write_op(|_, inner| {
            let col_id = collection::get_or_create(&mut inner.cache, collection)?;
            if inner
                .cache
                .get::<CollectionPage>(col_id)?
                .index_for(field)
                .is_some()
            {
                return Ok(false);
            }
            let slot = SkipIndex::create(&mut inner.cache, col_id, field, unique)?;

            // build from a full scan of the _id index
            let mut current = {
                let mut id_index = SkipIndex::new(&mut inner.cache, col_id, 0);
                let head = id_index.head_addr()?;
                id_index.node_at(head)?.next[0]
            };
            loop {
                let node = SkipIndex::new(&mut inner.cache, col_id, 0).node_at(current)?;
                if node.is_sentinel() {
                    break;
                }
                let doc = decode_document(&data::read(&mut inner.cache, node.data_block)?)?;
                SkipIndex::new(&mut inner.cache, col_id, slot)
                    .insert(doc.get_or_null(field), node.data_block)?;
                current = node.next[0];
            }

            debug!(collection, field, "built index from collection scan");
            Ok(true)
        })
    }

    /// Drops the index on `field`. The `_id` index cannot be dropped.
    pub fn drop_index(&self, collection: &str, field: &str) -> Result<bool> {
        if field == "_id" {
            return Err(Error::InvalidFormat(
                "the _id index cannot be dropped".to_string(),
            ));
        }
        self.write_op(|_, inner| {
            let Some(col_id) = collection::find(&mut inner.cache, collection)? else {
                return Ok(false);
            };
            let Some((slot, pages)) = inner
                .cache
                .get::<CollectionPage>(col_id)?
                .index_for(field)
                .map(|ix| (ix.slot, ix.free_index_page_id))
            else {
                return Ok(false);
            };
            collection::delete_list(&mut inner.cache, pages)?;
            inner
                .cache
                .get_mut::<CollectionPage>(col_id)?
                .remove_index(slot);
            Ok(true)
        })
    }

    /// Drops a collection and all its pages.
    pub fn drop_collection(&self, collection: &str) -> Result<bool> {
        self.write_op(|_, inner| collection::drop_collection(&mut inner.cache, collection))
    }

    /// Renames a collection.
    pub fn rename_collection(&self, from: &str, to: &str) -> Result<bool> {
        self.write_op(|_, inner| collection::rename(&mut inner.cache, from, to))
    }

    /// Names of all collections in the datafile.
    pub fn collection_names(&self) -> Result<Vec<String>> {
        self.read_op(|inner| {
            Ok(inner
                .cache
                .header()?
                .collections()
                .map(|(name, _)| name.to_string())
                .collect())
        })
    }

    /// Textual page map for debugging: one line per page with type,
    /// links, item count and free bytes.
    pub fn dump(&self) -> Result<String> {
        self.read_op(|inner| {
            let last = inner.cache.header()?.last_page_id;
            let mut out = String::new();
            for page_id in 0..=last {
                let summary = inner.cache.page_info(page_id)?;
                let link = |id: u32| {
                    if id == PAGE_ID_EMPTY {
                        "-".to_string()
                    } else {
                        id.to_string()
                    }
                };
                out.push_str(&format!(
                    "page {:>5}: {:<10} prev={} next={} items={} free={}\n",
                    page_id,
                    summary.page_type.name(),
                    link(summary.info.prev),
                    link(summary.info.next),
                    summary.item_count,
                    summary.free_bytes,
                ));
            }
            Ok(out)
        })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if !self.options.read_only {
            let _ = self.inner.lock().cache.flush_disk();
        }
    }
}

// ----- per-document helpers ------------------------------------------

/// Binds the index on `field` or fails with `IndexNotFound`.
fn bind_index<'a>(cache: &'a mut PageCache, col_id: u32, field: &str) -> Result<SkipIndex<'a>> {
    let slot = cache
        .get::<CollectionPage>(col_id)?
        .index_for(field)
        .map(|ix| ix.slot)
        .ok_or_else(|| Error::IndexNotFound {
            field: field.to_string(),
        })?;
    Ok(SkipIndex::new(cache, col_id, slot))
}

/// Assigns a generated `_id` when absent (or `Null`) and rejects kinds
/// that cannot serve as primary keys.
fn prepare_id(
    cache: &mut PageCache,
    col_id: u32,
    doc: &mut Document,
    auto_id: AutoId,
) -> Result<()> {
    let missing = doc.get("_id").map_or(true, Value::is_null);
    if missing {
        let last = match auto_id {
            AutoId::Int32 | AutoId::Int64 => SkipIndex::new(cache, col_id, 0)
                .last()?
                .map(|(_, node)| node.key),
            _ => None,
        };
        doc.insert("_id", autoid::generate(auto_id, last.as_ref()));
    }

    let id = doc.get("_id").expect("just ensured");
    match id {
        Value::MinKey | Value::MaxKey | Value::Null | Value::Document(_) | Value::Array(_) => {
            Err(Error::InvalidDataType {
                context: "_id",
                kind: id.kind_name(),
            })
        }
        _ => Ok(()),
    }
}

fn indexed_fields(cache: &mut PageCache, col_id: u32) -> Result<Vec<(u8, String)>> {
    Ok(cache
        .get::<CollectionPage>(col_id)?
        .indexes()
        .iter()
        .map(|ix| (ix.slot, ix.field.clone()))
        .collect())
}

fn insert_document(cache: &mut PageCache, col_id: u32, doc: &Document) -> Result<()> {
    let bytes = encode_document(doc)?;
    let addr = data::insert(cache, col_id, &bytes)?;

    let id = doc.get("_id").expect("validated by prepare_id").clone();
    let id_node = SkipIndex::new(cache, col_id, 0).insert(id, addr)?;
    data::set_id_node(cache, addr, id_node)?;

    for (slot, field) in indexed_fields(cache, col_id)? {
        if slot == 0 {
            continue;
        }
        let key = doc.get_or_null(&field);
        SkipIndex::new(cache, col_id, slot).insert(key, addr)?;
    }

    cache.get_mut::<CollectionPage>(col_id)?.document_count += 1;
    Ok(())
}

/// Replaces a stored document by `_id`. Returns `false` when no document
/// carries that id.
fn update_document(cache: &mut PageCache, col_id: u32, doc: &Document) -> Result<bool> {
    let id = doc
        .get("_id")
        .ok_or(Error::InvalidDataType {
            context: "_id",
            kind: "missing",
        })?
        .clone();

    let old_addr = {
        let mut id_index = SkipIndex::new(cache, col_id, 0);
        let addr = id_index.find_first_gte(&id)?;
        let node = id_index.node_at(addr)?;
        if node.is_sentinel() || node.key != id {
            return Ok(false);
        }
        node.data_block
    };

    let old_doc = decode_document(&data::read(cache, old_addr)?)?;
    let new_bytes = encode_document(doc)?;
    let new_addr = data::update(cache, col_id, old_addr, &new_bytes)?;

    for (slot, field) in indexed_fields(cache, col_id)? {
        let old_key = old_doc.get_or_null(&field);
        let new_key = doc.get_or_null(&field);
        let mut index = SkipIndex::new(cache, col_id, slot);
        if old_key != new_key {
            index.delete(&old_key, old_addr)?;
            index.insert(new_key, new_addr)?;
        } else if new_addr != old_addr {
            index.update_data_block(&old_key, old_addr, new_addr)?;
        }
    }
    Ok(true)
}

/// Removes the document block at `addr` and its node in every index.
fn delete_document(cache: &mut PageCache, col_id: u32, addr: PageAddress) -> Result<()> {
    let doc = decode_document(&data::read(cache, addr)?)?;
    for (slot, field) in indexed_fields(cache, col_id)? {
        let key = doc.get_or_null(&field);
        SkipIndex::new(cache, col_id, slot).delete(&key, addr)?;
    }
    data::delete(cache, col_id, addr)?;

    let col = cache.get_mut::<CollectionPage>(col_id)?;
    col.document_count = col.document_count.saturating_sub(1);
    Ok(())
}
