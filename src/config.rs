//! Reader configuration

use crate::buffer::FileAccessMode;
use crate::error::{MmdbError, Result};
use serde::{Deserialize, Serialize};

/// Default number of bound records kept by [`crate::Reader::find_as`]
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Options for opening a database
///
/// Missing fields take their defaults when deserialized:
///
/// ```
/// use mmdb_lookup::{FileAccessMode, ReaderOptions};
///
/// let options = ReaderOptions::from_json(r#"{"mode": "memory"}"#)?;
/// assert_eq!(options.mode, FileAccessMode::Memory);
/// assert_eq!(options.cache_capacity, 4096);
/// # Ok::<(), mmdb_lookup::MmdbError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// How the file contents are held
    pub mode: FileAccessMode,
    /// Maximum cached records, 0 disables the cache
    pub cache_capacity: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            mode: FileAccessMode::Mmap,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl ReaderOptions {
    /// Set the access mode
    pub fn with_mode(mut self, mode: FileAccessMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the cache capacity
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Parse options from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| MmdbError::invalid_input(format!("invalid reader options: {}", e)))
    }
}
