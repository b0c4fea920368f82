//! # Locker
//!
//! Single-writer/multi-reader coordination for one engine instance.
//! Shared mode admits any number of readers and excludes the writer;
//! exclusive mode admits one writer and excludes everyone. Acquisition
//! is bounded by the configured timeout.
//!
//! The change counter increments once per committed transaction (under
//! the exclusive lock). A reader acquiring a fresh shared lock compares
//! it against the last value it acted on; a difference means committed
//! state changed underneath its cache, which must then be invalidated
//! before any page is trusted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Error, Result};

pub(crate) struct Locker {
    rw: RwLock<()>,
    changes: AtomicU64,
    timeout: Duration,
}

/// Shared (read) lock guard. Released on drop.
pub(crate) struct SharedLock<'a> {
    _guard: RwLockReadGuard<'a, ()>,
}

/// Exclusive (write) lock guard. Released on drop.
pub(crate) struct ExclusiveLock<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
}

impl Locker {
    pub fn new(timeout: Duration, initial_changes: u64) -> Self {
        Self {
            rw: RwLock::new(()),
            changes: AtomicU64::new(initial_changes),
            timeout,
        }
    }

    pub fn shared(&self) -> Result<SharedLock<'_>> {
        match self.rw.try_read_for(self.timeout) {
            Some(guard) => Ok(SharedLock { _guard: guard }),
            None => Err(Error::LockTimeout {
                mode: "shared",
                timeout: self.timeout,
            }),
        }
    }

    pub fn exclusive(&self) -> Result<ExclusiveLock<'_>> {
        match self.rw.try_write_for(self.timeout) {
            Some(guard) => Ok(ExclusiveLock { _guard: guard }),
            None => Err(Error::LockTimeout {
                mode: "exclusive",
                timeout: self.timeout,
            }),
        }
    }

    pub fn changes(&self) -> u64 {
        self.changes.load(Ordering::Acquire)
    }

    /// The counter value the in-flight commit will publish.
    pub fn next_change(&self) -> u64 {
        self.changes().wrapping_add(1)
    }

    /// Publishes a commit. Called only while holding the exclusive lock.
    pub fn bump(&self) -> u64 {
        self.changes.fetch_add(1, Ordering::AcqRel) + 1
    }
}
