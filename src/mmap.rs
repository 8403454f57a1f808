//! Memory-mapped database files.
//!
//! A [`MappedFile`] is a read-only view over the OS page cache. Opening the same
//! file (same canonical path, length and modification time) twice in one process
//! hands back the same mapping instead of creating a second one.
//!
//! # Shared mapping registry
//!
//! The registry is explicit process-wide state: a table of weak references keyed
//! by file identity, guarded by one mutex. The mutex is held only while a mapping
//! is being created or looked up in [`MappedFile::open`]; reads through an
//! existing mapping never touch it. Entries whose mappings have been dropped are
//! pruned on the next open. [`MappedFile::release_registry`] clears the table;
//! mappings that are still in use stay valid because each reader holds its own
//! strong reference.
//!
//! # Example
//!
//! ```no_run
//! use mmdb_lookup::mmap::MappedFile;
//!
//! let mapped = MappedFile::open("GeoLite2-City.mmdb")?;
//! println!("Size: {} bytes", mapped.len());
//! # Ok::<(), mmdb_lookup::MmdbError>(())
//! ```

use crate::error::{MmdbError, Result};
use memmap2::Mmap;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::SystemTime;

/// Identity of one version of a file on disk
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MapKey {
    path: PathBuf,
    len: u64,
    modified: Option<SystemTime>,
}

type Registry = Mutex<HashMap<MapKey, Weak<Mmap>>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A read-only memory mapping of a database file.
///
/// `MappedFile` is `Send + Sync`: the mapping is immutable and every access goes
/// through a shared slice, so any number of threads may read it concurrently.
pub struct MappedFile {
    mmap: Arc<Mmap>,
    /// Keeps an anonymous spool file alive for mappings created from a stream
    _spool: Option<File>,
}

impl MappedFile {
    /// Open and memory-map a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped, or if it is empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let meta = file.metadata()?;
        if meta.len() == 0 {
            return Err(MmdbError::invalid_database(format!(
                "{} is empty and is not a valid MaxMind DB file",
                path.display()
            )));
        }

        let key = MapKey {
            path: fs::canonicalize(path)?,
            len: meta.len(),
            modified: meta.modified().ok(),
        };

        let mut table = registry().lock().unwrap_or_else(PoisonError::into_inner);
        table.retain(|_, weak| weak.strong_count() > 0);

        if let Some(existing) = table.get(&key).and_then(Weak::upgrade) {
            tracing::debug!(path = %key.path.display(), len = key.len, "reusing shared mapping");
            return Ok(MappedFile {
                mmap: existing,
                _spool: None,
            });
        }

        // SAFETY: the mapping is read-only. Database files are replaced by
        // writing a new file and renaming it, never modified in place.
        let mmap = Arc::new(unsafe { Mmap::map(&file)? });
        table.insert(key.clone(), Arc::downgrade(&mmap));
        tracing::debug!(path = %key.path.display(), len = key.len, "created mapping");

        Ok(MappedFile { mmap, _spool: None })
    }

    /// Map the contents of an arbitrary (possibly non-seekable) reader.
    ///
    /// The stream is copied into an anonymous temporary file which is then mapped.
    /// Spooled mappings are private to the returned value and never registered.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut spool = tempfile::tempfile()?;
        let copied = io::copy(&mut reader, &mut spool)?;
        if copied == 0 {
            return Err(MmdbError::invalid_database(
                "The source stream is empty and is not a valid MaxMind DB file",
            ));
        }
        spool.flush()?;
        tracing::debug!(bytes = copied, "spooled stream to temporary file");

        // SAFETY: the spool file is anonymous and owned by this value; nothing
        // else can write to it once the copy is done.
        let mmap = unsafe { Mmap::map(&spool)? };

        Ok(MappedFile {
            mmap: Arc::new(mmap),
            _spool: Some(spool),
        })
    }

    /// Size of the mapped region in bytes
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Always false; empty files are rejected at construction
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// The whole mapped region
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// True when both values are views of the same OS mapping
    pub fn shares_mapping_with(&self, other: &MappedFile) -> bool {
        Arc::ptr_eq(&self.mmap, &other.mmap)
    }

    /// Drop every registry entry.
    ///
    /// Subsequent opens create fresh mappings. Existing `MappedFile` values are
    /// unaffected.
    pub fn release_registry() {
        if let Some(table) = REGISTRY.get() {
            table.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }
}

impl fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedFile")
            .field("size", &self.len())
            .field("spooled", &self._spool.is_some())
            .finish()
    }
}
