//! # Collection Service
//!
//! The header page's directory maps collection names to collection
//! pages. Creating a collection allocates its page and plants the unique
//! `_id` index; dropping one releases every page it reaches (index
//! pages, data pages, extend chains) back to the empty pool.

use tracing::debug;

use crate::config::{MAX_COLLECTION_NAME_SIZE, PAGE_ID_EMPTY};
use crate::error::{Error, Result};
use crate::storage::{CollectionPage, PageCache};

use super::index::SkipIndex;

/// Collection and index-field names: non-empty, at most
/// `MAX_COLLECTION_NAME_SIZE` bytes, not starting with `$`.
pub(crate) fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidFormat(format!("{} name is empty", kind)));
    }
    if name.len() > MAX_COLLECTION_NAME_SIZE {
        return Err(Error::InvalidFormat(format!(
            "{} name \"{}\" exceeds {} bytes",
            kind, name, MAX_COLLECTION_NAME_SIZE
        )));
    }
    if name.starts_with('$') {
        return Err(Error::InvalidFormat(format!(
            "{} name \"{}\" starts with '$'",
            kind, name
        )));
    }
    Ok(())
}

/// Looks a collection up in the header directory.
pub(crate) fn find(cache: &mut PageCache, name: &str) -> Result<Option<u32>> {
    Ok(cache.header()?.collection(name))
}

/// Finds or materializes a collection: page, directory entry and the
/// unique `_id` index.
pub(crate) fn get_or_create(cache: &mut PageCache, name: &str) -> Result<u32> {
    if let Some(col_id) = find(cache, name)? {
        return Ok(col_id);
    }
    validate_name("collection", name)?;

    let col_id = cache.new_page::<CollectionPage>(None)?;
    cache.get_mut::<CollectionPage>(col_id)?.name = name.to_string();
    SkipIndex::create(cache, col_id, "_id", true)?;
    cache.header_mut()?.add_collection(name, col_id)?;

    debug!(collection = name, page = col_id, "created collection");
    Ok(col_id)
}

/// Drops a collection and releases all its pages. Returns `false` when
/// the collection does not exist.
pub(crate) fn drop_collection(cache: &mut PageCache, name: &str) -> Result<bool> {
    let Some(col_id) = find(cache, name)? else {
        return Ok(false);
    };

    // every index page of every index sits on that index's free list
    let index_heads: Vec<u32> = cache
        .get::<CollectionPage>(col_id)?
        .indexes()
        .iter()
        .map(|ix| ix.free_index_page_id)
        .collect();
    for head in index_heads {
        delete_list(cache, head)?;
    }

    // data pages carry their extend chains
    let mut current = cache.get::<CollectionPage>(col_id)?.free_data_page_id;
    while current != PAGE_ID_EMPTY {
        let next = cache.page_info(current)?.info.next;
        let extends: Vec<u32> = cache
            .get::<crate::storage::DataPage>(current)?
            .blocks
            .values()
            .map(|b| b.extend_page_id)
            .filter(|id| *id != PAGE_ID_EMPTY)
            .collect();
        for extend in extends {
            cache.delete_page(extend, true)?;
        }
        cache.delete_page(current, false)?;
        current = next;
    }

    cache.delete_page(col_id, false)?;
    cache.header_mut()?.remove_collection(name);

    debug!(collection = name, "dropped collection");
    Ok(true)
}

/// Renames a collection in both the directory and its page. Returns
/// `false` when the source does not exist.
pub(crate) fn rename(cache: &mut PageCache, old: &str, new: &str) -> Result<bool> {
    validate_name("collection", new)?;
    if find(cache, new)?.is_some() {
        return Err(Error::InvalidFormat(format!(
            "collection \"{}\" already exists",
            new
        )));
    }
    let Some(col_id) = find(cache, old)? else {
        return Ok(false);
    };

    cache.get_mut::<CollectionPage>(col_id)?.name = new.to_string();
    cache.header_mut()?.rename_collection(old, new);
    Ok(true)
}

/// Releases every page of a linked list onto the empty pool.
pub(crate) fn delete_list(cache: &mut PageCache, head: u32) -> Result<()> {
    let mut current = head;
    while current != PAGE_ID_EMPTY {
        let next = cache.page_info(current)?.info.next;
        cache.delete_page(current, false)?;
        current = next;
    }
    Ok(())
}
