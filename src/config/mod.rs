//! # Configuration
//!
//! Geometry constants and the [`EngineOptions`] block consumed by
//! [`Engine::open_with`](crate::Engine::open_with). Use
//! [`Engine::builder`](crate::Engine::builder) for fluent
//! configuration.

pub mod constants;

pub use constants::*;

use std::path::PathBuf;
use std::time::Duration;

/// Options recognized when opening an engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Path to the datafile. The journal lives beside it with a
    /// `.journal` suffix.
    pub path: PathBuf,
    /// Enable the write-ahead journal. Disabling trades crash atomicity
    /// for fewer fsyncs.
    pub journal: bool,
    /// Soft cap for the page cache, in pages. Clean pages beyond the cap
    /// are evicted after each operation.
    pub cache_size: usize,
    /// Lock-acquire timeout. Expiry fails the operation with
    /// [`Error::LockTimeout`](crate::Error::LockTimeout).
    pub timeout: Duration,
    /// Pre-allocate the datafile to this many bytes on creation (rounded
    /// up to whole pages).
    pub initial_size: u64,
    /// Open without write permission. Mutating operations fail with
    /// [`Error::ReadOnly`](crate::Error::ReadOnly).
    pub read_only: bool,
}

impl EngineOptions {
    /// Options with defaults for the given datafile path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            journal: true,
            cache_size: DEFAULT_CACHE_SIZE,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            initial_size: 0,
            read_only: false,
        }
    }

    /// Path of the journal side file for this datafile.
    pub fn journal_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".journal");
        PathBuf::from(name)
    }
}
