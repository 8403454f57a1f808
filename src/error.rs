//! Error types for the mmdb-lookup library

use thiserror::Error;

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, MmdbError>;

/// Main error type for database operations
///
/// Every structural problem with the file surfaces as [`MmdbError::InvalidDatabase`];
/// the file will not become valid by retrying, so callers should treat it as fatal
/// for the operation in flight.
#[derive(Debug, Error)]
pub enum MmdbError {
    /// The file violates the on-disk format (bad offsets, bad encodings,
    /// missing metadata, corrupt search tree, ...)
    #[error("{0}")]
    InvalidDatabase(String),

    /// The caller supplied an address that cannot be looked up
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A record's `from_fields` asked for a field missing from its own field
    /// table. This is a bug in the record type, not in the file.
    #[error("Field '{0}' is not declared in the record's field table")]
    UndeclaredField(String),

    /// Opening, reading, or mapping the source failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MmdbError {
    /// Generic invalid-database error with a free-form message
    pub fn invalid_database(msg: impl Into<String>) -> Self {
        MmdbError::InvalidDatabase(msg.into())
    }

    /// Corruption found while decoding the data section
    pub fn bad_data(detail: impl std::fmt::Display) -> Self {
        MmdbError::InvalidDatabase(format!(
            "The MaxMind DB file's data section contains bad data: {}",
            detail
        ))
    }

    /// Corruption found while walking the search tree
    pub fn corrupt_tree(detail: impl std::fmt::Display) -> Self {
        MmdbError::InvalidDatabase(format!(
            "The MaxMind DB file's search tree is corrupt: {}",
            detail
        ))
    }

    /// Malformed lookup input
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        MmdbError::InvalidInput(msg.into())
    }

    /// True for every variant that describes a broken file
    pub fn is_invalid_database(&self) -> bool {
        matches!(self, MmdbError::InvalidDatabase(_))
    }
}
