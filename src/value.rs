//! Decoded data values
//!
//! [`DataValue`] is the generic structured value produced by the decoder: one
//! variant per MaxMind DB data type. Pointers never appear here because the
//! decoder always follows them.

use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};

/// Insertion-ordered map of string keys to values
///
/// Keys keep the order in which they were encoded. A repeated key overwrites the
/// earlier value but keeps the earlier position.
pub type Map = IndexMap<String, DataValue>;

/// Data value decoded from the data section
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Key-value map (string keys only)
    Map(Map),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Array of values
    Array(Vec<DataValue>),
    /// Boolean value
    Bool(bool),
    /// IEEE 754 single precision float
    Float(f32),
}

/// One step of a path into nested maps and arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathElement<'a> {
    /// Key of a map
    Key(&'a str),
    /// Index of an array; negative values count from the end (`-1` is the last)
    Index(isize),
}

impl<'a> From<&'a str> for PathElement<'a> {
    fn from(key: &'a str) -> Self {
        PathElement::Key(key)
    }
}

impl From<isize> for PathElement<'_> {
    fn from(index: isize) -> Self {
        PathElement::Index(index)
    }
}

impl DataValue {
    /// Name of the MaxMind DB type this value was decoded from
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::String(_) => "utf8_string",
            DataValue::Double(_) => "double",
            DataValue::Bytes(_) => "bytes",
            DataValue::Uint16(_) => "uint16",
            DataValue::Uint32(_) => "uint32",
            DataValue::Map(_) => "map",
            DataValue::Int32(_) => "int32",
            DataValue::Uint64(_) => "uint64",
            DataValue::Uint128(_) => "uint128",
            DataValue::Array(_) => "array",
            DataValue::Bool(_) => "boolean",
            DataValue::Float(_) => "float",
        }
    }

    /// Look up a key if this is a map
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.as_map()?.get(key)
    }

    /// Follow a path of map keys and array indexes
    ///
    /// ```
    /// use mmdb_lookup::{DataValue, PathElement};
    ///
    /// let mut names = mmdb_lookup::Map::new();
    /// names.insert("en".to_string(), DataValue::String("Germany".to_string()));
    /// let mut country = mmdb_lookup::Map::new();
    /// country.insert("names".to_string(), DataValue::Map(names));
    /// let value = DataValue::Map(country);
    ///
    /// let name = value.get_path(&[PathElement::Key("names"), PathElement::Key("en")]);
    /// assert_eq!(name.and_then(DataValue::as_str), Some("Germany"));
    /// ```
    pub fn get_path(&self, path: &[PathElement<'_>]) -> Option<&DataValue> {
        path.iter().try_fold(self, |current, element| match (current, element) {
            (DataValue::Map(m), PathElement::Key(k)) => m.get(*k),
            (DataValue::Array(a), PathElement::Index(i)) => {
                let index = if *i < 0 {
                    a.len().checked_sub(i.unsigned_abs())?
                } else {
                    *i as usize
                };
                a.get(index)
            }
            _ => None,
        })
    }

    /// Borrow as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any non-negative integer that fits in a `u64`
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            DataValue::Uint16(v) => Some(*v as u64),
            DataValue::Uint32(v) => Some(*v as u64),
            DataValue::Uint64(v) => Some(*v),
            DataValue::Uint128(v) => u64::try_from(*v).ok(),
            DataValue::Int32(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Either floating point type, widened to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Double(v) => Some(*v),
            DataValue::Float(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow the map
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            DataValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow the array
    pub fn as_array(&self) -> Option<&[DataValue]> {
        match self {
            DataValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Borrow raw bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DataValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Convert to a JSON value.
    ///
    /// `uint128` values beyond `u64::MAX` become decimal strings; non-finite
    /// floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DataValue::String(s) => serializer.serialize_str(s),
            DataValue::Double(v) => serializer.serialize_f64(*v),
            DataValue::Bytes(b) => serializer.collect_seq(b.iter()),
            DataValue::Uint16(v) => serializer.serialize_u16(*v),
            DataValue::Uint32(v) => serializer.serialize_u32(*v),
            DataValue::Map(m) => serializer.collect_map(m.iter()),
            DataValue::Int32(v) => serializer.serialize_i32(*v),
            DataValue::Uint64(v) => serializer.serialize_u64(*v),
            DataValue::Uint128(v) => match u64::try_from(*v) {
                Ok(small) => serializer.serialize_u64(small),
                Err(_) => serializer.collect_str(v),
            },
            DataValue::Array(a) => serializer.collect_seq(a.iter()),
            DataValue::Bool(b) => serializer.serialize_bool(*b),
            DataValue::Float(v) => serializer.serialize_f32(*v),
        }
    }
}
