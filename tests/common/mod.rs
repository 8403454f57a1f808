//! Test database writer
//!
//! Builds small MaxMind DB files in memory: an arena-allocated search tree,
//! a data section of encoded values and a metadata map.

#![allow(dead_code)]

use mmdb_lookup::{DataValue, Map};
use std::net::IpAddr;

pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Node pointer - can point to another node, data, or be empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodePointer {
    Node(u32),
    /// Index into the payload list
    Data(usize),
    Empty,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    left: NodePointer,
    right: NodePointer,
}

impl Node {
    fn empty() -> Self {
        Self {
            left: NodePointer::Empty,
            right: NodePointer::Empty,
        }
    }
}

/// Encoded form of a network's value
#[derive(Debug, Clone)]
pub enum Payload {
    Value(DataValue),
    /// Pre-encoded bytes, written verbatim
    Raw(Vec<u8>),
}

/// In-memory database builder
pub struct TestDb {
    ip_version: u16,
    record_size: u16,
    database_type: String,
    languages: Vec<String>,
    description: Vec<(String, String)>,
    networks: Vec<(u128, u8, usize)>,
    payloads: Vec<Payload>,
}

impl TestDb {
    pub fn new(ip_version: u16, record_size: u16) -> Self {
        Self {
            ip_version,
            record_size,
            database_type: "Test-Fixture".to_string(),
            languages: vec!["en".to_string()],
            description: vec![("en".to_string(), "Test fixture".to_string())],
            networks: Vec::new(),
            payloads: Vec::new(),
        }
    }

    pub fn database_type(mut self, name: &str) -> Self {
        self.database_type = name.to_string();
        self
    }

    /// Add a network such as `"1.2.3.0/24"` or `"2001:db8::/32"`.
    ///
    /// IPv4 networks in an IPv6 database are placed under `::/96`.
    pub fn insert(&mut self, cidr: &str, value: DataValue) -> &mut Self {
        self.insert_payload(cidr, Payload::Value(value))
    }

    pub fn insert_raw(&mut self, cidr: &str, bytes: Vec<u8>) -> &mut Self {
        self.insert_payload(cidr, Payload::Raw(bytes))
    }

    fn insert_payload(&mut self, cidr: &str, payload: Payload) -> &mut Self {
        let (addr, prefix) = cidr.split_once('/').unwrap_or((cidr, ""));
        let addr: IpAddr = addr.parse().expect("valid network address");
        let (bits, prefix) = match addr {
            IpAddr::V4(v4) => {
                let prefix: u8 = prefix.parse().unwrap_or(32);
                if self.ip_version == 6 {
                    (u32::from(v4) as u128, 96 + prefix)
                } else {
                    ((u32::from(v4) as u128) << 96, prefix)
                }
            }
            IpAddr::V6(v6) => {
                assert_eq!(self.ip_version, 6, "IPv6 network in an IPv4 database");
                (u128::from(v6), prefix.parse().unwrap_or(128))
            }
        };
        self.payloads.push(payload);
        self.networks.push((bits, prefix, self.payloads.len() - 1));
        self
    }

    fn build_nodes(&self) -> Vec<Node> {
        let mut nodes = vec![Node::empty()];
        let mut order: Vec<_> = self.networks.clone();
        // Less specific first, so more specific networks split them
        order.sort_by_key(|&(_, prefix, _)| prefix);

        for (bits, prefix, payload) in order {
            let mut node = 0usize;
            for depth in 0..prefix as usize {
                let bit = (bits >> (127 - depth)) & 1 == 1;
                let current = if bit { nodes[node].right } else { nodes[node].left };
                let last = depth + 1 == prefix as usize;

                if last {
                    let target = NodePointer::Data(payload);
                    if bit {
                        nodes[node].right = target;
                    } else {
                        nodes[node].left = target;
                    }
                    break;
                }

                node = match current {
                    NodePointer::Node(id) => id as usize,
                    inherited => {
                        let id = nodes.len();
                        nodes.push(Node {
                            left: inherited,
                            right: inherited,
                        });
                        let child = NodePointer::Node(id as u32);
                        if bit {
                            nodes[node].right = child;
                        } else {
                            nodes[node].left = child;
                        }
                        id
                    }
                };
            }
        }
        nodes
    }

    /// Serialize the whole file
    pub fn build(&self) -> Vec<u8> {
        let nodes = self.build_nodes();
        let node_count = nodes.len() as u64;

        let mut data = Vec::new();
        let mut offsets = Vec::with_capacity(self.payloads.len());
        for payload in &self.payloads {
            offsets.push(data.len() as u64);
            match payload {
                Payload::Value(v) => encode(v, &mut data),
                Payload::Raw(bytes) => data.extend_from_slice(bytes),
            }
        }

        let record = |p: NodePointer| -> u64 {
            match p {
                NodePointer::Node(id) => id as u64,
                NodePointer::Empty => node_count,
                NodePointer::Data(i) => node_count + 16 + offsets[i],
            }
        };

        let node_bytes = self.record_size as usize / 4;
        let mut out = vec![0u8; nodes.len() * node_bytes];
        for (i, node) in nodes.iter().enumerate() {
            write_record(&mut out, self.record_size, i as u64, 0, record(node.left));
            write_record(&mut out, self.record_size, i as u64, 1, record(node.right));
        }

        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&data);
        out.extend_from_slice(METADATA_MARKER);
        encode(&self.metadata(node_count as u32), &mut out);
        out
    }

    fn metadata(&self, node_count: u32) -> DataValue {
        metadata_value(
            node_count,
            self.record_size,
            self.ip_version,
            &self.database_type,
            &self.languages,
            &self.description,
        )
    }
}

pub fn metadata_value(
    node_count: u32,
    record_size: u16,
    ip_version: u16,
    database_type: &str,
    languages: &[String],
    description: &[(String, String)],
) -> DataValue {
    let mut m = Map::new();
    m.insert("binary_format_major_version".into(), DataValue::Uint16(2));
    m.insert("binary_format_minor_version".into(), DataValue::Uint16(0));
    m.insert("build_epoch".into(), DataValue::Uint64(1_700_000_000));
    m.insert("database_type".into(), DataValue::String(database_type.into()));
    let desc = description
        .iter()
        .map(|(k, v)| (k.clone(), DataValue::String(v.clone())))
        .collect();
    m.insert("description".into(), DataValue::Map(desc));
    m.insert("ip_version".into(), DataValue::Uint16(ip_version));
    m.insert(
        "languages".into(),
        DataValue::Array(languages.iter().cloned().map(DataValue::String).collect()),
    );
    m.insert("node_count".into(), DataValue::Uint32(node_count));
    m.insert("record_size".into(), DataValue::Uint16(record_size));
    DataValue::Map(m)
}

/// Overwrite one record of a serialized tree
pub fn write_record(tree: &mut [u8], record_size: u16, node: u64, bit: u8, value: u64) {
    let node_bytes = record_size as usize / 4;
    let off = node as usize * node_bytes;
    let v = value as u32;
    match (record_size, bit) {
        (24, 0) => tree[off..off + 3].copy_from_slice(&v.to_be_bytes()[1..]),
        (24, _) => tree[off + 3..off + 6].copy_from_slice(&v.to_be_bytes()[1..]),
        (28, 0) => {
            tree[off..off + 3].copy_from_slice(&v.to_be_bytes()[1..]);
            tree[off + 3] = (tree[off + 3] & 0x0F) | (((v >> 24) as u8 & 0x0F) << 4);
        }
        (28, _) => {
            tree[off + 4..off + 7].copy_from_slice(&v.to_be_bytes()[1..]);
            tree[off + 3] = (tree[off + 3] & 0xF0) | ((v >> 24) as u8 & 0x0F);
        }
        (32, 0) => tree[off..off + 4].copy_from_slice(&v.to_be_bytes()),
        (32, _) => tree[off + 4..off + 8].copy_from_slice(&v.to_be_bytes()),
        _ => panic!("unsupported record size {}", record_size),
    }
}

fn read_record(tree: &[u8], record_size: u16, node: u64, bit: u8) -> u64 {
    let node_bytes = record_size as usize / 4;
    let b = &tree[node as usize * node_bytes..];
    let v = match (record_size, bit) {
        (24, 0) => u32::from_be_bytes([0, b[0], b[1], b[2]]),
        (24, _) => u32::from_be_bytes([0, b[3], b[4], b[5]]),
        (28, 0) => u32::from_be_bytes([b[3] >> 4, b[0], b[1], b[2]]),
        (28, _) => u32::from_be_bytes([b[3] & 0x0F, b[4], b[5], b[6]]),
        (32, 0) => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        _ => u32::from_be_bytes([b[4], b[5], b[6], b[7]]),
    };
    v as u64
}

/// Node and bit whose record is the data pointer reached for `address`
pub fn data_record_slot(
    file: &[u8],
    node_count: u64,
    record_size: u16,
    start: u64,
    address: &[u8],
) -> (u64, u8) {
    let mut node = start;
    for i in 0..address.len() * 8 {
        let bit = (address[i / 8] >> (7 - i % 8)) & 1;
        let record = read_record(file, record_size, node, bit);
        if record > node_count {
            return (node, bit);
        }
        assert!(record < node_count, "address has no data");
        node = record;
    }
    panic!("walk did not reach data");
}

/// Encode a value with the standard MaxMind DB encoding
pub fn encode(value: &DataValue, out: &mut Vec<u8>) {
    match value {
        DataValue::String(s) => {
            control(out, 2, s.len());
            out.extend_from_slice(s.as_bytes());
        }
        DataValue::Double(v) => {
            control(out, 3, 8);
            out.extend_from_slice(&v.to_be_bytes());
        }
        DataValue::Bytes(b) => {
            control(out, 4, b.len());
            out.extend_from_slice(b);
        }
        DataValue::Uint16(v) => uint(out, 5, *v as u128),
        DataValue::Uint32(v) => uint(out, 6, *v as u128),
        DataValue::Map(m) => {
            control(out, 7, m.len());
            for (k, v) in m {
                encode(&DataValue::String(k.clone()), out);
                encode(v, out);
            }
        }
        DataValue::Int32(v) => {
            control(out, 8, 4);
            out.extend_from_slice(&v.to_be_bytes());
        }
        DataValue::Uint64(v) => uint(out, 9, *v as u128),
        DataValue::Uint128(v) => uint(out, 10, *v),
        DataValue::Array(a) => {
            control(out, 11, a.len());
            for v in a {
                encode(v, out);
            }
        }
        DataValue::Bool(b) => control(out, 14, *b as usize),
        DataValue::Float(v) => {
            control(out, 15, 4);
            out.extend_from_slice(&v.to_be_bytes());
        }
    }
}

fn uint(out: &mut Vec<u8>, type_num: u8, v: u128) {
    let bytes = v.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    control(out, type_num, 16 - skip);
    out.extend_from_slice(&bytes[skip..]);
}

/// Control byte (plus extended type byte and size bytes)
pub fn control(out: &mut Vec<u8>, type_num: u8, size: usize) {
    let (size_bits, extra): (u8, Vec<u8>) = if size < 29 {
        (size as u8, vec![])
    } else if size < 285 {
        (29, vec![(size - 29) as u8])
    } else if size < 65_821 {
        (30, ((size - 285) as u16).to_be_bytes().to_vec())
    } else {
        (31, ((size - 65_821) as u32).to_be_bytes()[1..].to_vec())
    };

    if type_num < 8 {
        out.push((type_num << 5) | size_bits);
    } else {
        out.push(size_bits);
        out.push(type_num - 7);
    }
    out.extend_from_slice(&extra);
}

/// Pointer record with the smallest width that can hold `value`
pub fn pointer(value: u64) -> Vec<u8> {
    if value < 1 << 11 {
        vec![0x20 | ((value >> 8) as u8 & 0x07), value as u8]
    } else if value < (1 << 19) + (1 << 11) {
        let v = value - (1 << 11);
        vec![0x28 | ((v >> 16) as u8 & 0x07), (v >> 8) as u8, v as u8]
    } else if value < (1 << 27) + (1 << 19) + (1 << 11) {
        let v = value - ((1 << 19) + (1 << 11));
        vec![
            0x30 | ((v >> 24) as u8 & 0x07),
            (v >> 16) as u8,
            (v >> 8) as u8,
            v as u8,
        ]
    } else {
        let mut out = vec![0x38];
        out.extend_from_slice(&(value as u32).to_be_bytes());
        out
    }
}

pub fn string(s: &str) -> DataValue {
    DataValue::String(s.to_string())
}

/// A `{"name": <name>}` record
pub fn named(name: &str) -> DataValue {
    let mut m = Map::new();
    m.insert("name".to_string(), string(name));
    DataValue::Map(m)
}
