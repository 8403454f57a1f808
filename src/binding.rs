//! Statically declared binding of decoded maps into typed records.
//!
//! A record type lists its fields once, as a table of [`FieldSpec`]s, and builds
//! itself from the resolved [`FieldValues`]. Nothing is discovered at runtime:
//! the table is a `const` on the [`Record`] impl.
//!
//! Each field descriptor carries:
//! - `key`: the map key the value is read from
//! - `always_materialize`: produce an empty value (empty string, map, list)
//!   instead of "absent" when the key is missing
//! - `injected`: the name of a caller-supplied value that replaces whatever the
//!   database holds for this field
//!
//! ```
//! use mmdb_lookup::binding::{bind, FieldSpec, FieldValues, Record};
//! use mmdb_lookup::{DataValue, Map, Result};
//!
//! struct City {
//!     name: Option<String>,
//!     postal_codes: Vec<String>,
//! }
//!
//! impl Record for City {
//!     const FIELDS: &'static [FieldSpec] = &[
//!         FieldSpec::new("name"),
//!         FieldSpec::new("postal_codes").always_materialize(),
//!     ];
//!
//!     fn from_fields(mut fields: FieldValues) -> Result<Self> {
//!         Ok(City {
//!             name: fields.get("name")?,
//!             postal_codes: fields.get("postal_codes")?.unwrap_or_default(),
//!         })
//!     }
//! }
//!
//! let mut map = Map::new();
//! map.insert("name".to_string(), DataValue::String("Oslo".to_string()));
//! let city: City = bind(&DataValue::Map(map), None)?;
//! assert_eq!(city.name.as_deref(), Some("Oslo"));
//! assert!(city.postal_codes.is_empty());
//! # Ok::<(), mmdb_lookup::MmdbError>(())
//! ```

use crate::error::{MmdbError, Result};
use crate::value::{DataValue, Map};
use std::collections::{BTreeMap, HashMap};

/// Values supplied by the caller for fields declared with [`FieldSpec::injected`]
pub type Injectables = HashMap<String, DataValue>;

/// Declaration of one record field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Map key the field is read from
    pub key: &'static str,
    /// Produce an empty value when the key is absent
    pub always_materialize: bool,
    /// Name of an injectable value that overrides the database content
    pub injected: Option<&'static str>,
}

impl FieldSpec {
    /// Plain field read from `key`
    pub const fn new(key: &'static str) -> Self {
        Self {
            key,
            always_materialize: false,
            injected: None,
        }
    }

    /// Mark the field as always materialized
    pub const fn always_materialize(mut self) -> Self {
        self.always_materialize = true;
        self
    }

    /// Take the field from the injectable named `name` when one is supplied
    pub const fn injected(mut self, name: &'static str) -> Self {
        self.injected = Some(name);
        self
    }
}

/// A type that can be built from a decoded map
pub trait Record: Sized {
    /// Field table, resolved in order
    const FIELDS: &'static [FieldSpec];

    /// Build the record from the resolved field values
    fn from_fields(fields: FieldValues) -> Result<Self>;
}

/// Conversion from a decoded value into a field type
pub trait FromValue: Sized {
    /// Convert, failing on a type mismatch
    fn from_value(value: DataValue) -> Result<Self>;

    /// Value used for an absent, always-materialized field
    fn empty() -> Option<Self> {
        None
    }
}

/// Field values resolved against one map, consumed by [`Record::from_fields`]
#[derive(Debug)]
pub struct FieldValues {
    specs: &'static [FieldSpec],
    values: Vec<Option<DataValue>>,
}

impl FieldValues {
    fn position(&self, key: &str) -> Result<usize> {
        self.specs
            .iter()
            .position(|spec| spec.key == key)
            .ok_or_else(|| MmdbError::UndeclaredField(key.to_string()))
    }

    /// Take the raw value of a declared field
    pub fn take(&mut self, key: &str) -> Result<Option<DataValue>> {
        let index = self.position(key)?;
        Ok(self.values[index].take())
    }

    /// Take and convert a declared field.
    ///
    /// Absent fields give `None`, unless the field is always materialized and
    /// the target type has an empty value.
    pub fn get<T: FromValue>(&mut self, key: &str) -> Result<Option<T>> {
        let index = self.position(key)?;
        match self.values[index].take() {
            Some(value) => T::from_value(value)
                .map(Some)
                .map_err(|e| MmdbError::invalid_database(format!("field '{}': {}", key, e))),
            None if self.specs[index].always_materialize => Ok(T::empty()),
            None => Ok(None),
        }
    }

    /// Take and convert a field that must be present
    pub fn required<T: FromValue>(&mut self, key: &str) -> Result<T> {
        self.get(key)?.ok_or_else(|| {
            MmdbError::invalid_database(format!("required field '{}' not found", key))
        })
    }
}

/// Bind a decoded map into a record
///
/// # Errors
///
/// Fails when `value` is not a map or when a field has an unexpected type.
pub fn bind<T: Record>(value: &DataValue, injectables: Option<&Injectables>) -> Result<T> {
    let map = value.as_map().ok_or_else(|| {
        MmdbError::invalid_database(format!(
            "cannot bind a {} to a record, expected a map",
            value.type_name()
        ))
    })?;

    let values = T::FIELDS
        .iter()
        .map(|spec| {
            let injected = spec
                .injected
                .and_then(|name| injectables.and_then(|i| i.get(name)));
            injected.or_else(|| map.get(spec.key)).cloned()
        })
        .collect();

    T::from_fields(FieldValues {
        specs: T::FIELDS,
        values,
    })
}

fn mismatch(expected: &str, value: &DataValue) -> MmdbError {
    MmdbError::invalid_database(format!(
        "expected {}, found {}",
        expected,
        value.type_name()
    ))
}

impl FromValue for DataValue {
    fn from_value(value: DataValue) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: DataValue) -> Result<Self> {
        match value {
            DataValue::String(s) => Ok(s),
            other => Err(mismatch("a string", &other)),
        }
    }

    fn empty() -> Option<Self> {
        Some(String::new())
    }
}

impl FromValue for bool {
    fn from_value(value: DataValue) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("a boolean", &value))
    }
}

impl FromValue for f64 {
    fn from_value(value: DataValue) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch("a floating point number", &value))
    }
}

impl FromValue for u64 {
    fn from_value(value: DataValue) -> Result<Self> {
        value.as_u64().ok_or_else(|| mismatch("an unsigned integer", &value))
    }
}

impl FromValue for u32 {
    fn from_value(value: DataValue) -> Result<Self> {
        let n = u64::from_value(value)?;
        u32::try_from(n)
            .map_err(|_| MmdbError::invalid_database(format!("{} does not fit in 32 bits", n)))
    }
}

impl FromValue for u16 {
    fn from_value(value: DataValue) -> Result<Self> {
        let n = u64::from_value(value)?;
        u16::try_from(n)
            .map_err(|_| MmdbError::invalid_database(format!("{} does not fit in 16 bits", n)))
    }
}

impl FromValue for i64 {
    fn from_value(value: DataValue) -> Result<Self> {
        match value {
            DataValue::Int32(v) => Ok(v as i64),
            other => {
                let n = u64::from_value(other)?;
                i64::try_from(n)
                    .map_err(|_| MmdbError::invalid_database(format!("{} does not fit in i64", n)))
            }
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: DataValue) -> Result<Self> {
        match value {
            DataValue::Array(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(mismatch("an array", &other)),
        }
    }

    fn empty() -> Option<Self> {
        Some(Vec::new())
    }
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
    fn from_value(value: DataValue) -> Result<Self> {
        match value {
            DataValue::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k, v)))
                .collect(),
            other => Err(mismatch("a map", &other)),
        }
    }

    fn empty() -> Option<Self> {
        Some(BTreeMap::new())
    }
}

impl FromValue for Map {
    fn from_value(value: DataValue) -> Result<Self> {
        match value {
            DataValue::Map(entries) => Ok(entries),
            other => Err(mismatch("a map", &other)),
        }
    }

    fn empty() -> Option<Self> {
        Some(Map::new())
    }
}

impl<T: Record> FromValue for Nested<T> {
    fn from_value(value: DataValue) -> Result<Self> {
        bind(&value, None).map(Nested)
    }
}

/// Wrapper that binds a nested map into another [`Record`]
#[derive(Debug, Clone, PartialEq)]
pub struct Nested<T>(pub T);
