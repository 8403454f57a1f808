//! Random-access byte storage for a database file.
//!
//! A [`Buffer`] holds the raw bytes of the file, either as an owned copy or as a
//! memory-mapped view, and exposes primitive reads that are fully specified by an
//! explicit `u64` offset. There is no cursor: every method takes `&self`, so one
//! buffer can serve any number of threads without synchronization.
//!
//! Offsets are `u64` throughout so files larger than 2 GiB (and pointer targets
//! beyond `i32::MAX`) are addressed without narrowing.

use crate::error::{MmdbError, Result};
use crate::mmap::MappedFile;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// How the file contents are made available to the reader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAccessMode {
    /// Map the file read-only into memory (shared with the OS page cache)
    #[default]
    Mmap,
    /// Copy the whole file into an owned heap allocation
    Memory,
}

/// Storage for database data - either owned or memory-mapped
pub enum Buffer {
    /// Whole file copied into a contiguous owned region
    Owned(Box<[u8]>),
    /// Read-only view over a mapped file
    Mapped(MappedFile),
}

impl Buffer {
    /// Take ownership of an in-memory copy of the file
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.is_empty() {
            return Err(MmdbError::invalid_database(
                "The buffer is empty and is not a valid MaxMind DB file",
            ));
        }
        Ok(Buffer::Owned(data.into_boxed_slice()))
    }

    /// Open a file on disk with the given access mode
    pub fn open<P: AsRef<Path>>(path: P, mode: FileAccessMode) -> Result<Self> {
        match mode {
            FileAccessMode::Mmap => Ok(Buffer::Mapped(MappedFile::open(path)?)),
            FileAccessMode::Memory => {
                let path = path.as_ref();
                let data = std::fs::read(path)?;
                if data.is_empty() {
                    return Err(MmdbError::invalid_database(format!(
                        "{} is empty and is not a valid MaxMind DB file",
                        path.display()
                    )));
                }
                Self::from_bytes(data)
            }
        }
    }

    /// Consume an arbitrary stream.
    ///
    /// In [`FileAccessMode::Mmap`] mode the stream is spooled to a temporary file
    /// first, since a stream cannot be mapped directly.
    pub fn from_reader<R: Read>(mut reader: R, mode: FileAccessMode) -> Result<Self> {
        match mode {
            FileAccessMode::Mmap => Ok(Buffer::Mapped(MappedFile::from_reader(reader)?)),
            FileAccessMode::Memory => {
                let mut data = Vec::new();
                reader.read_to_end(&mut data)?;
                Self::from_bytes(data)
            }
        }
    }

    /// The whole file
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Buffer::Owned(v) => &v[..],
            Buffer::Mapped(m) => m.as_slice(),
        }
    }

    /// Total length in bytes
    pub fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    /// Always false for a constructed buffer
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Access mode this buffer was created with
    pub fn mode(&self) -> FileAccessMode {
        match self {
            Buffer::Owned(_) => FileAccessMode::Memory,
            Buffer::Mapped(_) => FileAccessMode::Mmap,
        }
    }

    /// Exactly `count` bytes starting at `offset`
    pub fn read(&self, offset: u64, count: u64) -> Result<&[u8]> {
        let len = self.len();
        match offset.checked_add(count) {
            Some(end) if end <= len => Ok(&self.as_slice()[offset as usize..end as usize]),
            _ => Err(MmdbError::invalid_database(format!(
                "Attempt to read {} bytes at offset {} beyond the end of the MaxMind DB file ({} bytes)",
                count, offset, len
            ))),
        }
    }

    /// One byte at `offset`
    pub fn read_one(&self, offset: u64) -> Result<u8> {
        Ok(self.read(offset, 1)?[0])
    }

    /// A UTF-8 string of `count` bytes, validated in place
    pub fn read_string(&self, offset: u64, count: u64) -> Result<&str> {
        std::str::from_utf8(self.read(offset, count)?)
            .map_err(|e| MmdbError::bad_data(format!("invalid UTF-8 at offset {}: {}", offset, e)))
    }

    /// Big-endian signed 32-bit integer (always 4 bytes)
    pub fn read_fixed_i32(&self, offset: u64) -> Result<i32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.read(offset, 4)?);
        Ok(i32::from_be_bytes(bytes))
    }

    /// Big-endian unsigned integer of 0 to 4 bytes, zero-extended
    pub fn read_var_uint(&self, offset: u64, count: u64) -> Result<u32> {
        if count > 4 {
            return Err(MmdbError::bad_data(format!(
                "variable-width integer of {} bytes exceeds 4",
                count
            )));
        }
        Ok(self
            .read(offset, count)?
            .iter()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32))
    }

    /// Big-endian unsigned integer of 0 to 8 bytes, zero-extended
    pub fn read_u64(&self, offset: u64, count: u64) -> Result<u64> {
        if count > 8 {
            return Err(MmdbError::bad_data(format!(
                "invalid size of uint64: {} bytes",
                count
            )));
        }
        Ok(self
            .read(offset, count)?
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    /// Big-endian unsigned integer of 0 to 16 bytes.
    ///
    /// Accumulating into an unsigned type means a set top bit is a value bit;
    /// the result is never negative.
    pub fn read_big_uint(&self, offset: u64, count: u64) -> Result<u128> {
        if count > 16 {
            return Err(MmdbError::bad_data(format!(
                "invalid size of uint128: {} bytes",
                count
            )));
        }
        Ok(self
            .read(offset, count)?
            .iter()
            .fold(0u128, |acc, &b| (acc << 8) | b as u128))
    }

    /// IEEE 754 double, big-endian
    pub fn read_f64(&self, offset: u64) -> Result<f64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.read(offset, 8)?);
        Ok(f64::from_be_bytes(bytes))
    }

    /// IEEE 754 single, big-endian
    pub fn read_f32(&self, offset: u64) -> Result<f32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.read(offset, 4)?);
        Ok(f32::from_be_bytes(bytes))
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("mode", &self.mode())
            .field("len", &self.len())
            .finish()
    }
}
