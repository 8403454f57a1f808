//! Search tree traversal
//!
//! The tree is a flat array of `node_count` nodes at the start of the file. Each
//! node holds two records, one per address bit value. A record is one of:
//! - another node index (`< node_count`), continue walking
//! - exactly `node_count`, no network covers the address
//! - a data pointer (`> node_count`), the matched network's value
//!
//! Record layouts:
//! - 24 bits: `[left 3 bytes][right 3 bytes]`
//! - 28 bits: `[left 3 bytes][middle][right 3 bytes]`, high nibble of the middle
//!   byte extends the left record, low nibble the right record
//! - 32 bits: `[left 4 bytes][right 4 bytes]`, read unsigned

use crate::buffer::Buffer;
use crate::error::{MmdbError, Result};
use zerocopy::byteorder::{BigEndian, U32};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Size of the all-zero separator between the tree and the data section
pub const DATA_SECTION_SEPARATOR_SIZE: u64 = 16;

/// Depth of the IPv4 subtree inside an IPv6 tree (`::0.0.0.0/96`)
const IPV4_IN_IPV6_DEPTH: usize = 96;

/// Record size in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSize {
    /// 24-bit records (3 bytes per record, 6 bytes per node)
    Bits24 = 24,
    /// 28-bit records (3.5 bytes per record, 7 bytes per node)
    Bits28 = 28,
    /// 32-bit records (4 bytes per record, 8 bytes per node)
    Bits32 = 32,
}

impl RecordSize {
    /// Get the size of a node (2 records) in bytes
    pub fn node_bytes(self) -> u64 {
        match self {
            RecordSize::Bits24 => 6,
            RecordSize::Bits28 => 7,
            RecordSize::Bits32 => 8,
        }
    }

    /// Create from bit size
    pub fn from_bits(bits: u16) -> Result<Self> {
        match bits {
            24 => Ok(RecordSize::Bits24),
            28 => Ok(RecordSize::Bits28),
            32 => Ok(RecordSize::Bits32),
            _ => Err(MmdbError::invalid_database(format!(
                "Unknown record size: {} bits",
                bits
            ))),
        }
    }
}

/// On-disk layout of a node with 32-bit records
#[derive(FromBytes, Immutable, KnownLayout)]
#[repr(C)]
struct Node32 {
    left: U32<BigEndian>,
    right: U32<BigEndian>,
}

/// A successful walk: where the value lives and how many bits matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeMatch {
    /// Absolute offset of the value in the file
    pub offset: u64,
    /// Number of address bits consumed before reaching the data pointer
    pub depth: usize,
}

/// Shape of the search tree, read from the metadata
#[derive(Debug, Clone, Copy)]
pub struct SearchTree {
    node_count: u64,
    record_size: RecordSize,
}

impl SearchTree {
    /// Create a tree description
    pub fn new(node_count: u32, record_size: RecordSize) -> Self {
        Self {
            node_count: node_count as u64,
            record_size,
        }
    }

    /// Number of nodes
    pub fn node_count(&self) -> u64 {
        self.node_count
    }

    /// Record width
    pub fn record_size(&self) -> RecordSize {
        self.record_size
    }

    /// Size of the node array in bytes
    pub fn size(&self) -> u64 {
        self.node_count * self.record_size.node_bytes()
    }

    /// Read the record of `node` selected by `bit` (0 = left, 1 = right)
    pub fn read_node(&self, buffer: &Buffer, node: u64, bit: u8) -> Result<u64> {
        let node_bytes = self.record_size.node_bytes();
        let bytes = buffer.read(node * node_bytes, node_bytes)?;

        let record = match self.record_size {
            RecordSize::Bits24 => {
                let r = if bit == 0 { &bytes[0..3] } else { &bytes[3..6] };
                u32::from_be_bytes([0, r[0], r[1], r[2]])
            }
            RecordSize::Bits28 => {
                let (high, r) = if bit == 0 {
                    (bytes[3] >> 4, &bytes[0..3])
                } else {
                    (bytes[3] & 0x0F, &bytes[4..7])
                };
                u32::from_be_bytes([high, r[0], r[1], r[2]])
            }
            RecordSize::Bits32 => {
                let (pair, _) = Node32::read_from_prefix(bytes).map_err(|_| {
                    MmdbError::corrupt_tree(format!("node {} is truncated", node))
                })?;
                if bit == 0 {
                    pair.left.get()
                } else {
                    pair.right.get()
                }
            }
        };

        Ok(record as u64)
    }

    /// Node reached by following 96 zero bits from the root.
    ///
    /// Stops early if the path leaves the node array; the returned value is then
    /// a record rather than a node index and the caller's walk ends immediately.
    pub fn ipv4_start(&self, buffer: &Buffer) -> Result<u64> {
        let mut node = 0u64;
        let mut depth = 0;
        while depth < IPV4_IN_IPV6_DEPTH && node < self.node_count {
            node = self.read_node(buffer, node, 0)?;
            depth += 1;
        }
        tracing::trace!(node, depth, "computed IPv4 start node");
        Ok(node)
    }

    /// Walk the address bits (most significant first) starting at `start`.
    ///
    /// Returns `None` when no network covers the address.
    pub fn walk(&self, buffer: &Buffer, address: &[u8], start: u64) -> Result<Option<TreeMatch>> {
        let bit_count = address.len() * 8;
        let mut node = start;
        let mut depth = 0;

        while depth < bit_count && node < self.node_count {
            let bit = (address[depth / 8] >> (7 - depth % 8)) & 1;
            node = self.read_node(buffer, node, bit)?;
            depth += 1;
        }

        if node == self.node_count {
            Ok(None)
        } else if node > self.node_count {
            let offset = self.resolve_data_pointer(buffer, node)?;
            Ok(Some(TreeMatch { offset, depth }))
        } else {
            Err(MmdbError::corrupt_tree(format!(
                "walk ended on node {} after {} bits",
                node, depth
            )))
        }
    }

    /// Absolute file offset of the value a data record points to
    pub fn resolve_data_pointer(&self, buffer: &Buffer, record: u64) -> Result<u64> {
        let Some(relative) = record.checked_sub(self.node_count).filter(|&r| r > 0) else {
            return Err(MmdbError::corrupt_tree(format!(
                "record {} is not a data pointer",
                record
            )));
        };
        let offset = relative + self.size();
        if offset >= buffer.len() {
            return Err(MmdbError::corrupt_tree(format!(
                "pointer {} exceeds database ({} bytes)",
                offset,
                buffer.len()
            )));
        }
        Ok(offset)
    }
}
