//! # Data Block Service
//!
//! Stores document payloads: the head chunk lives in a [`DataBlock`] on
//! a data page picked through the collection's free-data list, and any
//! remainder spills through a chain of extend pages.
//!
//! The free-data list always contains every data page of the collection
//! ordered by free bytes descending, so placement is a head-only check
//! and deletes/updates re-rank the touched page.

use crate::config::{PAGE_AVAILABLE_BYTES, PAGE_ID_EMPTY};
use crate::error::{Error, Result};
use crate::storage::{
    CollectionPage, DataBlock, DataPage, ExtendPage, PageAddress, PageCache, DATA_BLOCK_OVERHEAD,
    EXTEND_PAGE_CAPACITY,
};

/// Largest head-chunk payload a single data page can host.
const MAX_BLOCK_PAYLOAD: usize = PAGE_AVAILABLE_BYTES - DATA_BLOCK_OVERHEAD;

/// Stores a payload; returns the new block's address.
pub(crate) fn insert(cache: &mut PageCache, col_id: u32, bytes: &[u8]) -> Result<PageAddress> {
    let free_head = cache.get::<CollectionPage>(col_id)?.free_data_page_id;

    let request = DATA_BLOCK_OVERHEAD + bytes.len().min(MAX_BLOCK_PAYLOAD);
    let (page_id, is_new) = cache.get_free::<DataPage>(free_head, request)?;

    let free = cache.page_info(page_id)?.free_bytes;
    let payload = bytes.len().min(free as usize - DATA_BLOCK_OVERHEAD);

    let index = {
        let page = cache.get_mut::<DataPage>(page_id)?;
        let index = page.next_index();
        page.blocks.insert(
            index,
            DataBlock {
                extend_page_id: PAGE_ID_EMPTY,
                id_node: PageAddress::EMPTY,
                data: bytes[..payload].to_vec(),
            },
        );
        index
    };
    let addr = PageAddress::new(page_id, index);

    // spill the remainder through an extend chain
    let mut remaining = &bytes[payload..];
    let mut prev: Option<u32> = None;
    let mut first_extend = PAGE_ID_EMPTY;
    while !remaining.is_empty() {
        let extend_id = cache.new_page::<ExtendPage>(prev)?;
        if first_extend == PAGE_ID_EMPTY {
            first_extend = extend_id;
        }
        let chunk = remaining.len().min(EXTEND_PAGE_CAPACITY);
        cache.get_mut::<ExtendPage>(extend_id)?.data = remaining[..chunk].to_vec();
        remaining = &remaining[chunk..];
        prev = Some(extend_id);
    }
    if first_extend != PAGE_ID_EMPTY {
        cache
            .get_mut::<DataPage>(page_id)?
            .block_mut(index)?
            .extend_page_id = first_extend;
    }

    let new_head = if is_new {
        cache.free_list_insert(free_head, page_id)?
    } else {
        cache.free_list_reposition(free_head, page_id)?
    };
    cache.get_mut::<CollectionPage>(col_id)?.free_data_page_id = new_head;

    Ok(addr)
}

/// Reassembles a payload from its head chunk and extend chain.
pub(crate) fn read(cache: &mut PageCache, addr: PageAddress) -> Result<Vec<u8>> {
    let (mut bytes, mut extend) = {
        let page = cache.get::<DataPage>(addr.page_id)?;
        let block = page.block(addr.index)?;
        (block.data.clone(), block.extend_page_id)
    };
    while extend != PAGE_ID_EMPTY {
        let page = cache.get::<ExtendPage>(extend)?;
        bytes.extend_from_slice(&page.data);
        extend = page.info.next;
    }
    Ok(bytes)
}

/// The `_id` index node owning the block at `addr`.
pub(crate) fn id_node(cache: &mut PageCache, addr: PageAddress) -> Result<PageAddress> {
    let page = cache.get::<DataPage>(addr.page_id)?;
    Ok(page.block(addr.index)?.id_node)
}

/// Records the `_id` index node owning the block at `addr`.
pub(crate) fn set_id_node(
    cache: &mut PageCache,
    addr: PageAddress,
    node: PageAddress,
) -> Result<()> {
    cache
        .get_mut::<DataPage>(addr.page_id)?
        .block_mut(addr.index)?
        .id_node = node;
    Ok(())
}

/// Replaces a payload. Rewrites in place when the new bytes fit the
/// block's page share plus its existing extend chain (surplus extends
/// are freed); otherwise the block moves and the returned address
/// differs from `addr`. The caller re-points index nodes on a move.
pub(crate) fn update(
    cache: &mut PageCache,
    col_id: u32,
    addr: PageAddress,
    bytes: &[u8],
) -> Result<PageAddress> {
    let (old_len, first_extend, free) = {
        let free = cache.page_info(addr.page_id)?.free_bytes;
        let page = cache.get::<DataPage>(addr.page_id)?;
        let block = page.block(addr.index)?;
        (block.data.len(), block.extend_page_id, free as usize)
    };

    let mut chain = Vec::new();
    let mut current = first_extend;
    while current != PAGE_ID_EMPTY {
        chain.push(current);
        current = cache.get::<ExtendPage>(current)?.info.next;
    }

    let head_capacity = free + old_len;
    let chain_capacity = head_capacity + chain.len() * EXTEND_PAGE_CAPACITY;

    if bytes.len() > chain_capacity {
        // relocate: the id-node backref survives the move
        let id_node = self::id_node(cache, addr)?;
        delete(cache, col_id, addr)?;
        let new_addr = insert(cache, col_id, bytes)?;
        set_id_node(cache, new_addr, id_node)?;
        return Ok(new_addr);
    }

    let payload = bytes.len().min(head_capacity);
    cache
        .get_mut::<DataPage>(addr.page_id)?
        .block_mut(addr.index)?
        .data = bytes[..payload].to_vec();

    let mut remaining = &bytes[payload..];
    let mut used = 0usize;
    for extend_id in &chain {
        if remaining.is_empty() {
            break;
        }
        let chunk = remaining.len().min(EXTEND_PAGE_CAPACITY);
        cache.get_mut::<ExtendPage>(*extend_id)?.data = remaining[..chunk].to_vec();
        remaining = &remaining[chunk..];
        used += 1;
    }

    // free surplus extends and cut the chain before them
    if used < chain.len() {
        let surplus = chain[used];
        if used == 0 {
            cache
                .get_mut::<DataPage>(addr.page_id)?
                .block_mut(addr.index)?
                .extend_page_id = PAGE_ID_EMPTY;
        } else {
            cache.get_mut::<ExtendPage>(chain[used - 1])?.info.next = PAGE_ID_EMPTY;
        }
        cache.delete_page(surplus, true)?;
    }

    let free_head = cache.get::<CollectionPage>(col_id)?.free_data_page_id;
    let new_head = cache.free_list_reposition(free_head, addr.page_id)?;
    cache.get_mut::<CollectionPage>(col_id)?.free_data_page_id = new_head;

    Ok(addr)
}

/// Removes a block: frees its extend chain, re-ranks its page or, when
/// the page is left empty, releases the page to the empty pool.
pub(crate) fn delete(cache: &mut PageCache, col_id: u32, addr: PageAddress) -> Result<()> {
    let block = cache
        .get_mut::<DataPage>(addr.page_id)?
        .blocks
        .remove(&addr.index)
        .ok_or_else(|| {
            Error::FileCorrupted(format!("no data block at {} to delete", addr))
        })?;

    if block.extend_page_id != PAGE_ID_EMPTY {
        cache.delete_page(block.extend_page_id, true)?;
    }

    let free_head = cache.get::<CollectionPage>(col_id)?.free_data_page_id;
    let now_empty = cache.get::<DataPage>(addr.page_id)?.blocks.is_empty();
    let new_head = if now_empty {
        let head = cache.free_list_remove(free_head, addr.page_id)?;
        cache.delete_page(addr.page_id, false)?;
        head
    } else {
        cache.free_list_reposition(free_head, addr.page_id)?
    };
    cache.get_mut::<CollectionPage>(col_id)?.free_data_page_id = new_head;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAGE_SIZE;
    use crate::storage::{DataFile, HeaderPage, Page};
    use tempfile::tempdir;

    fn setup(dir: &tempfile::TempDir) -> (PageCache, u32) {
        let disk = DataFile::open(&dir.path().join("db"), false, 0).unwrap();
        let mut cache = PageCache::new(disk);
        cache.bootstrap(Page::Header(HeaderPage::new(0)));
        let col_id = cache.new_page::<CollectionPage>(None).unwrap();
        cache.get_mut::<CollectionPage>(col_id).unwrap().name = "t".to_string();
        (cache, col_id)
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn small_payload_roundtrips_without_extends() {
        let dir = tempdir().unwrap();
        let (mut cache, col_id) = setup(&dir);

        let bytes = payload(100);
        let addr = insert(&mut cache, col_id, &bytes).unwrap();

        assert_eq!(read(&mut cache, addr).unwrap(), bytes);
        let page = cache.get::<DataPage>(addr.page_id).unwrap();
        assert_eq!(page.block(addr.index).unwrap().extend_page_id, PAGE_ID_EMPTY);
    }

    #[test]
    fn large_payload_spills_into_extend_chain() {
        let dir = tempdir().unwrap();
        let (mut cache, col_id) = setup(&dir);

        let bytes = payload(3 * PAGE_SIZE);
        let addr = insert(&mut cache, col_id, &bytes).unwrap();

        assert_eq!(read(&mut cache, addr).unwrap(), bytes);
        let first = cache
            .get::<DataPage>(addr.page_id)
            .unwrap()
            .block(addr.index)
            .unwrap()
            .extend_page_id;
        assert_ne!(first, PAGE_ID_EMPTY);
    }

    #[test]
    fn second_insert_reuses_the_same_page() {
        let dir = tempdir().unwrap();
        let (mut cache, col_id) = setup(&dir);

        let a = insert(&mut cache, col_id, &payload(100)).unwrap();
        let b = insert(&mut cache, col_id, &payload(100)).unwrap();

        assert_eq!(a.page_id, b.page_id);
        assert_ne!(a.index, b.index);
    }

    #[test]
    fn update_in_place_keeps_the_address() {
        let dir = tempdir().unwrap();
        let (mut cache, col_id) = setup(&dir);

        let addr = insert(&mut cache, col_id, &payload(500)).unwrap();
        let smaller = payload(80);
        let back = update(&mut cache, col_id, addr, &smaller).unwrap();

        assert_eq!(back, addr);
        assert_eq!(read(&mut cache, addr).unwrap(), smaller);
    }

    #[test]
    fn update_shrink_frees_surplus_extends() {
        let dir = tempdir().unwrap();
        let (mut cache, col_id) = setup(&dir);

        let addr = insert(&mut cache, col_id, &payload(3 * PAGE_SIZE)).unwrap();
        let free_before = cache.header().unwrap().free_empty_page_id;
        assert_eq!(free_before, PAGE_ID_EMPTY);

        let small = payload(50);
        let back = update(&mut cache, col_id, addr, &small).unwrap();

        assert_eq!(back, addr);
        assert_eq!(read(&mut cache, addr).unwrap(), small);
        assert_ne!(cache.header().unwrap().free_empty_page_id, PAGE_ID_EMPTY);
        assert_eq!(
            cache
                .get::<DataPage>(addr.page_id)
                .unwrap()
                .block(addr.index)
                .unwrap()
                .extend_page_id,
            PAGE_ID_EMPTY
        );
    }

    #[test]
    fn update_that_outgrows_the_chain_moves_the_block() {
        let dir = tempdir().unwrap();
        let (mut cache, col_id) = setup(&dir);

        // fill the first page so the block's share of it is tight
        let addr = insert(&mut cache, col_id, &payload(1000)).unwrap();
        insert(&mut cache, col_id, &payload(2800)).unwrap();
        set_id_node(&mut cache, addr, PageAddress::new(77, 3)).unwrap();

        let big = payload(6 * PAGE_SIZE);
        let moved = update(&mut cache, col_id, addr, &big).unwrap();

        assert_eq!(read(&mut cache, moved).unwrap(), big);
        assert_eq!(id_node(&mut cache, moved).unwrap(), PageAddress::new(77, 3));
    }

    #[test]
    fn delete_releases_empty_pages_for_reuse() {
        let dir = tempdir().unwrap();
        let (mut cache, col_id) = setup(&dir);

        let addr = insert(&mut cache, col_id, &payload(2 * PAGE_SIZE)).unwrap();
        delete(&mut cache, col_id, addr).unwrap();

        assert_ne!(cache.header().unwrap().free_empty_page_id, PAGE_ID_EMPTY);
        assert_eq!(
            cache.get::<CollectionPage>(col_id).unwrap().free_data_page_id,
            PAGE_ID_EMPTY
        );

        // a fresh insert recycles rather than growing
        let last_before = cache.header().unwrap().last_page_id;
        insert(&mut cache, col_id, &payload(100)).unwrap();
        assert_eq!(cache.header().unwrap().last_page_id, last_before);
    }

    #[test]
    fn delete_keeps_page_listed_while_blocks_remain() {
        let dir = tempdir().unwrap();
        let (mut cache, col_id) = setup(&dir);

        let a = insert(&mut cache, col_id, &payload(100)).unwrap();
        let b = insert(&mut cache, col_id, &payload(100)).unwrap();
        delete(&mut cache, col_id, a).unwrap();

        assert_eq!(
            cache.get::<CollectionPage>(col_id).unwrap().free_data_page_id,
            b.page_id
        );
        assert_eq!(read(&mut cache, b).unwrap(), payload(100));
    }
}
