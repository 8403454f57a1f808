//! Database metadata
//!
//! The metadata is a map encoded after the last occurrence of the marker
//! `"\xAB\xCD\xEFMaxMind.com"` near the end of the file. It is decoded with its
//! own pointer base (the first byte after the marker) and bound into
//! [`Metadata`] through the same field table mechanism as user records.

use crate::binding::{bind, FieldSpec, FieldValues, Record};
use crate::buffer::Buffer;
use crate::data_section::Decoder;
use crate::error::{MmdbError, Result};
use crate::tree::{RecordSize, DATA_SECTION_SEPARATOR_SIZE};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Metadata marker: "\xAB\xCD\xEFMaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Only major version of the binary format this crate reads
pub const SUPPORTED_MAJOR_VERSION: u16 = 2;

/// Metadata describing a database file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    /// Major version of the binary format
    pub binary_format_major_version: u16,
    /// Minor version of the binary format
    pub binary_format_minor_version: u16,
    /// Build time, seconds since the Unix epoch
    pub build_epoch: u64,
    /// Free-form database type, e.g. `GeoIP2-City`
    pub database_type: String,
    /// Descriptions keyed by locale code
    pub description: BTreeMap<String, String>,
    /// 4 for an IPv4-only tree, 6 for an IPv6 tree
    pub ip_version: u16,
    /// Locale codes the database may contain names for
    pub languages: Vec<String>,
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size in bits
    pub record_size: u16,
}

impl Record for Metadata {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("binary_format_major_version"),
        FieldSpec::new("binary_format_minor_version"),
        FieldSpec::new("build_epoch"),
        FieldSpec::new("database_type"),
        FieldSpec::new("description").always_materialize(),
        FieldSpec::new("ip_version"),
        FieldSpec::new("languages").always_materialize(),
        FieldSpec::new("node_count"),
        FieldSpec::new("record_size"),
    ];

    fn from_fields(mut fields: FieldValues) -> Result<Self> {
        Ok(Metadata {
            binary_format_major_version: fields.required("binary_format_major_version")?,
            binary_format_minor_version: fields.required("binary_format_minor_version")?,
            build_epoch: fields.required("build_epoch")?,
            database_type: fields.required("database_type")?,
            description: fields.required("description")?,
            ip_version: fields.required("ip_version")?,
            languages: fields.required("languages")?,
            node_count: fields.required("node_count")?,
            record_size: fields.required("record_size")?,
        })
    }
}

impl Metadata {
    /// Locate, decode and validate the metadata of a database file.
    ///
    /// Returns the metadata together with the offset where its payload starts.
    pub fn read(buffer: &Buffer) -> Result<(Self, u64)> {
        let start = find_metadata_start(buffer.as_slice())?;
        let decoder = Decoder::new(buffer, start);
        let (value, _) = decoder.decode(start)?;
        let metadata: Metadata = bind(&value, None)?;
        metadata.validate(start)?;
        Ok((metadata, start))
    }

    fn validate(&self, metadata_start: u64) -> Result<()> {
        if self.binary_format_major_version != SUPPORTED_MAJOR_VERSION {
            return Err(MmdbError::invalid_database(format!(
                "Unsupported binary format major version: {}",
                self.binary_format_major_version
            )));
        }
        if self.ip_version != 4 && self.ip_version != 6 {
            return Err(MmdbError::invalid_database(format!(
                "Invalid IP version in metadata: {}",
                self.ip_version
            )));
        }
        self.record_size_bits()?;

        let data_start = self.search_tree_size() + DATA_SECTION_SEPARATOR_SIZE;
        let marker_start = metadata_start - METADATA_MARKER.len() as u64;
        if data_start > marker_start {
            return Err(MmdbError::invalid_database(format!(
                "Search tree of {} nodes does not fit before the metadata",
                self.node_count
            )));
        }
        Ok(())
    }

    /// Record size as a typed value
    pub fn record_size_bits(&self) -> Result<RecordSize> {
        RecordSize::from_bits(self.record_size)
    }

    /// Size of one node in bytes (two records)
    pub fn node_byte_size(&self) -> u64 {
        self.record_size as u64 / 4
    }

    /// Size of the search tree in bytes
    pub fn search_tree_size(&self) -> u64 {
        self.node_count as u64 * self.node_byte_size()
    }

    /// Absolute offset of the data section
    pub fn data_section_start(&self) -> u64 {
        self.search_tree_size() + DATA_SECTION_SEPARATOR_SIZE
    }

    /// Build time as a `SystemTime`, `None` if the epoch is out of range
    pub fn build_time(&self) -> Option<SystemTime> {
        UNIX_EPOCH.checked_add(Duration::from_secs(self.build_epoch))
    }

    /// Description in the given locale
    pub fn description_for(&self, locale: &str) -> Option<&str> {
        self.description.get(locale).map(String::as_str)
    }
}

/// Offset of the first byte after the last metadata marker
pub fn find_metadata_start(data: &[u8]) -> Result<u64> {
    memchr::memmem::rfind(data, METADATA_MARKER)
        .map(|pos| (pos + METADATA_MARKER.len()) as u64)
        .ok_or_else(|| {
            MmdbError::invalid_database(
                "Could not find a MaxMind DB metadata marker in this file. \
                 Is this a valid MaxMind DB file?",
            )
        })
}
