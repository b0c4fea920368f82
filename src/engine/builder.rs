//! # Engine Builder
//!
//! Fluent configuration for opening an [`Engine`]. Every option defaults
//! to the values in [`EngineOptions::new`]; chain setters and finish
//! with [`EngineBuilder::open`].
//!
//! ```no_run
//! use kitedb::Engine;
//! use std::time::Duration;
//!
//! let db = Engine::builder("./app.db")
//!     .cache_size(256)
//!     .timeout(Duration::from_secs(5))
//!     .open()?;
//! # Ok::<(), kitedb::Error>(())
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::config::EngineOptions;
use crate::error::Result;

use super::Engine;

/// Builder for [`Engine`] configuration.
pub struct EngineBuilder {
    options: EngineOptions,
}

impl EngineBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            options: EngineOptions::new(path),
        }
    }

    /// Enables or disables the commit journal. Disabling trades crash
    /// atomicity for fewer fsyncs; default is enabled.
    pub fn journal(mut self, enabled: bool) -> Self {
        self.options.journal = enabled;
        self
    }

    /// Soft cap for the page cache, in pages.
    pub fn cache_size(mut self, pages: usize) -> Self {
        self.options.cache_size = pages;
        self
    }

    /// Lock-acquire timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Pre-allocates the datafile to this many bytes on creation.
    pub fn initial_size(mut self, bytes: u64) -> Self {
        self.options.initial_size = bytes;
        self
    }

    /// Opens without write permission; mutating operations will fail
    /// with [`Error::ReadOnly`](crate::Error::ReadOnly).
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.options.read_only = read_only;
        self
    }

    /// Opens the engine with the configured options.
    pub fn open(self) -> Result<Engine> {
        Engine::open_with(self.options)
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }
}
