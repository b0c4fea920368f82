//! # Transactions and Recovery
//!
//! Every facade write runs inside an implicit transaction. A transaction
//! is simply the set of dirty pages in the cache; commit pushes them
//! through the journal into the datafile, rollback discards them.
//!
//! ## Commit Protocol
//!
//! 1. Serialize every dirty page; drop the ones whose bytes match their
//!    pre-image.
//! 2. Append each remaining image to the journal, fsync.
//! 3. Append the commit marker, fsync. The commit is now durable.
//! 4. Write the images to their home positions in the datafile, fsync.
//! 5. Delete the journal.
//!
//! ## Recovery
//!
//! On open, an existing journal means the previous process died between
//! steps 2 and 5. A valid marker proves the commit completed its journal
//! writes: the images are re-applied to the datafile (idempotently) and
//! the journal is deleted. Anything less than a valid marker means the
//! datafile was never touched: the journal is discarded.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::storage::{DataFile, Journal, PageCache};

/// Replays or discards a leftover journal. Returns the number of pages
/// re-applied to the datafile.
pub(crate) fn recover(disk: &mut DataFile, journal: &mut Journal, read_only: bool) -> Result<u32> {
    if !journal.exists() {
        return Ok(0);
    }

    match journal.committed_pages()? {
        Some(records) => {
            if read_only {
                // replay would mutate the datafile this handle may not touch
                return Err(Error::ReadOnly);
            }
            let count = records.len() as u32;
            for (page_id, image) in records {
                disk.write_page(page_id, &image)?;
            }
            disk.flush()?;
            journal.clear()?;
            warn!(pages = count, "re-applied committed journal on open");
            Ok(count)
        }
        None => {
            if !read_only {
                journal.clear()?;
                debug!("discarded partial journal from pre-commit crash");
            }
            Ok(0)
        }
    }
}

/// Commits the dirty page set. `change_counter` is persisted into the
/// header so a reopened engine resumes the counter sequence. Returns the
/// number of pages written.
pub(crate) fn commit(
    cache: &mut PageCache,
    journal: &mut Journal,
    journal_enabled: bool,
    change_counter: u32,
) -> Result<u32> {
    if !cache.has_dirty() {
        return Ok(0);
    }
    cache.header_mut()?.change_counter = change_counter;
    let written = cache.commit(journal_enabled.then_some(journal))?;
    debug!(pages = written, "transaction committed");
    Ok(written)
}

/// Abandons the dirty page set; the cache re-reads committed state on
/// the next access.
pub(crate) fn rollback(cache: &mut PageCache) {
    cache.rollback();
    debug!("transaction rolled back");
}
