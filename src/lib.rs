//! mmdb-lookup - Read-only MaxMind DB lookups
//!
//! Answers "which record is associated with this IP address?" against a MaxMind
//! DB file: a binary trie over address bits followed by a compact, pointer
//! deduplicated data section and a metadata map.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mmdb_lookup::{Reader, PathElement};
//!
//! let reader = Reader::open("GeoLite2-Country.mmdb")?;
//! println!("{} built at {:?}", reader.metadata().database_type, reader.metadata().build_time());
//!
//! if let Some(record) = reader.find("8.8.8.8")? {
//!     let iso = record.get_path(&[PathElement::Key("country"), PathElement::Key("iso_code")]);
//!     println!("{:?}", iso.and_then(|v| v.as_str()));
//! }
//! # Ok::<(), mmdb_lookup::MmdbError>(())
//! ```
//!
//! # File Layout
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  1. Search tree (node_count nodes)   │
//! │  2. 16 zero bytes                    │
//! │  3. Data section                     │
//! │  4. "\xAB\xCD\xEFMaxMind.com"        │
//! │  5. Metadata map                     │
//! └──────────────────────────────────────┘
//! ```
//!
//! # Key Features
//!
//! - **Two storage modes**: memory-mapped (default) or fully owned copy
//! - **Shared mappings**: opening the same file twice reuses one mapping
//! - **Concurrent lookups**: `Reader` is `Send + Sync`, no locks on the read path
//! - **Typed binding**: static field tables via [`binding::Record`], with a
//!   bounded record cache
//! - **Bounded decoding**: pointer cycles and deep nesting fail cleanly

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binding;
pub mod buffer;
pub mod cache;
pub mod config;
pub mod data_section;
pub mod error;
pub mod metadata;
pub mod mmap;
pub mod reader;
pub mod tree;
pub mod value;

pub use crate::buffer::{Buffer, FileAccessMode};
pub use crate::config::ReaderOptions;
pub use crate::error::{MmdbError, Result};
pub use crate::metadata::Metadata;
pub use crate::reader::{LookupResult, Reader};
pub use crate::value::{DataValue, Map, PathElement};

/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
