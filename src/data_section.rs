//! Data section decoding
//!
//! Implements the MaxMind DB data type specification on top of [`Buffer`].
//!
//! # Format
//!
//! Every value starts with a control byte. The top 3 bits hold the type, the
//! bottom 5 bits hold the payload size (or select how many extra bytes encode
//! it). Type 0 means "extended": the real type is the next byte plus 7.
//!
//! ```text
//! ┌─────────┬──────────────┬────────────────┬──────────────┐
//! │ control │ [ext. type]  │ [size bytes]   │ payload      │
//! │ TTTSSSSS│ 1 byte       │ 0..3 bytes     │ size bytes   │
//! └─────────┴──────────────┴────────────────┴──────────────┘
//! ```
//!
//! Pointers deduplicate repeated values: a pointer record refers to another
//! offset in the data section, and the decoder follows it transparently.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use crate::buffer::Buffer;
use crate::error::{MmdbError, Result};
use crate::value::{DataValue, Map};

/// Nesting limit for maps, arrays and pointer chains.
///
/// Pointer cycles and absurdly deep structures hit this limit and fail with an
/// invalid-database error. Each level costs one `decode_at`/container frame
/// pair, so the limit must stay well inside a default 2 MiB thread stack in an
/// unoptimized build.
pub const MAX_DECODE_DEPTH: usize = 128;

/// Bias added to pointer values, indexed by pointer width in bytes
const POINTER_VALUE_OFFSETS: [u64; 5] = [0, 0, 1 << 11, (1 << 19) + (1 << 11), 0];

/// Type tags of the data section encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataType {
    /// Marker for a type number stored in the following byte
    Extended = 0,
    /// Reference to another value
    Pointer = 1,
    /// UTF-8 string
    String = 2,
    /// IEEE 754 double
    Double = 3,
    /// Raw bytes
    Bytes = 4,
    /// Unsigned 16-bit integer
    Uint16 = 5,
    /// Unsigned 32-bit integer
    Uint32 = 6,
    /// Map with string keys
    Map = 7,
    /// Signed 32-bit integer
    Int32 = 8,
    /// Unsigned 64-bit integer
    Uint64 = 9,
    /// Unsigned 128-bit integer
    Uint128 = 10,
    /// Array
    Array = 11,
    /// Reserved, never valid as a value
    Container = 12,
    /// Reserved, never valid as a value
    EndMarker = 13,
    /// Boolean stored in the size field
    Boolean = 14,
    /// IEEE 754 float
    Float = 15,
}

impl DataType {
    /// Map a resolved type number to its tag
    pub fn from_number(n: u16) -> Option<Self> {
        let t = match n {
            0 => DataType::Extended,
            1 => DataType::Pointer,
            2 => DataType::String,
            3 => DataType::Double,
            4 => DataType::Bytes,
            5 => DataType::Uint16,
            6 => DataType::Uint32,
            7 => DataType::Map,
            8 => DataType::Int32,
            9 => DataType::Uint64,
            10 => DataType::Uint128,
            11 => DataType::Array,
            12 => DataType::Container,
            13 => DataType::EndMarker,
            14 => DataType::Boolean,
            15 => DataType::Float,
            _ => return None,
        };
        Some(t)
    }
}

/// Data section decoder
///
/// Decoders are cheap: a buffer reference plus the base that pointer values are
/// relative to. Build one per lookup or keep one around; they hold no state
/// between calls.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    buffer: &'a Buffer,
    pointer_base: u64,
}

impl<'a> Decoder<'a> {
    /// Create a decoder
    ///
    /// # Arguments
    /// * `buffer` - The whole database file
    /// * `pointer_base` - Absolute offset that pointer values are relative to
    ///   (start of the data section, or start of the metadata payload)
    pub fn new(buffer: &'a Buffer, pointer_base: u64) -> Self {
        Self {
            buffer,
            pointer_base,
        }
    }

    /// Absolute offset that pointer values are relative to
    pub fn pointer_base(&self) -> u64 {
        self.pointer_base
    }

    /// Decode the value at an absolute offset
    ///
    /// Returns the value and the offset just past its encoding. When the value
    /// at `offset` is a pointer, the returned offset is the one after the
    /// pointer record, not after the value it points to.
    pub fn decode(&self, offset: u64) -> Result<(DataValue, u64)> {
        self.decode_at(offset, 0)
    }

    /// Resolve the pointer record at `offset` without following it
    ///
    /// Returns the absolute target offset and the offset after the pointer.
    pub fn decode_pointer(&self, offset: u64) -> Result<(u64, u64)> {
        let ctrl = self.buffer.read_one(offset)?;
        if ctrl >> 5 != DataType::Pointer as u8 {
            return Err(MmdbError::bad_data(format!(
                "expected a pointer at offset {}, found control byte {:#04x}",
                offset, ctrl
            )));
        }
        self.pointer_from_control(ctrl, offset + 1)
    }

    // Recursive cycle: decode_at -> decode_map/decode_array -> decode_at.
    // Everything else (scalar payloads, error formatting) lives in
    // out-of-line functions so these frames stay small.
    fn decode_at(&self, offset: u64, depth: usize) -> Result<(DataValue, u64)> {
        if depth > MAX_DECODE_DEPTH {
            return Err(too_deep(offset));
        }
        let len = self.buffer.len();
        if offset >= len {
            return Err(offset_out_of_range(offset, len));
        }

        let ctrl = self.buffer.read_one(offset)?;
        if ctrl >> 5 == DataType::Pointer as u8 {
            let (target, after) = self.pointer_from_control(ctrl, offset + 1)?;
            if target >= len {
                return Err(pointer_out_of_range(offset, target));
            }
            let (value, _) = self.decode_at(target, depth + 1)?;
            return Ok((value, after));
        }

        let (data_type, cursor) = self.resolve_type(ctrl, offset)?;
        let (size, cursor) = self.size_from_control(ctrl, cursor)?;
        match data_type {
            DataType::Map => self.decode_map(size, cursor, depth),
            DataType::Array => self.decode_array(size, cursor, depth),
            _ => self.decode_scalar(data_type, size, cursor),
        }
    }

    /// Type and size field of the value at `offset`, read from its control
    /// header only.
    ///
    /// The size is the payload length for scalars, the entry count for maps
    /// and arrays, and the pointer width for pointers. Nothing past the header
    /// is read, so the cost does not depend on how large the value is.
    pub fn header(&self, offset: u64) -> Result<(DataType, u64)> {
        let ctrl = self.buffer.read_one(offset)?;
        if ctrl >> 5 == DataType::Pointer as u8 {
            return Ok((DataType::Pointer, (((ctrl >> 3) & 0x3) + 1) as u64));
        }
        let (data_type, cursor) = self.resolve_type(ctrl, offset)?;
        let (size, _) = self.size_from_control(ctrl, cursor)?;
        Ok((data_type, size))
    }

    /// Offset just past the value at `offset`, without building it.
    ///
    /// Pointers are not followed: the encoding of a pointer is the pointer record.
    pub fn skip(&self, offset: u64) -> Result<u64> {
        self.skip_at(offset, 0)
    }

    fn skip_at(&self, offset: u64, depth: usize) -> Result<u64> {
        if depth > MAX_DECODE_DEPTH {
            return Err(too_deep(offset));
        }

        let ctrl = self.buffer.read_one(offset)?;
        if ctrl >> 5 == DataType::Pointer as u8 {
            let (_, after) = self.pointer_from_control(ctrl, offset + 1)?;
            return Ok(after);
        }

        let (data_type, cursor) = self.resolve_type(ctrl, offset)?;
        let (size, mut cursor) = self.size_from_control(ctrl, cursor)?;
        match data_type {
            DataType::Map | DataType::Array => {
                let items = if data_type == DataType::Map { size * 2 } else { size };
                for _ in 0..items {
                    cursor = self.skip_at(cursor, depth + 1)?;
                }
                Ok(cursor)
            }
            DataType::Boolean => Ok(cursor),
            _ => {
                let end = cursor + size;
                if end > self.buffer.len() {
                    return Err(MmdbError::bad_data(format!(
                        "value at offset {} runs past the end of the file",
                        offset
                    )));
                }
                Ok(end)
            }
        }
    }

    /// Resolve the type of a non-pointer control byte at `offset`, reading the
    /// extended type byte when present. Returns the type and the next offset.
    fn resolve_type(&self, ctrl: u8, offset: u64) -> Result<(DataType, u64)> {
        let primary = ctrl >> 5;
        let mut cursor = offset + 1;
        let type_num = if primary == DataType::Extended as u8 {
            let ext = self.buffer.read_one(cursor)?;
            cursor += 1;
            let type_num = ext as u16 + 7;
            if type_num < 8 {
                return Err(MmdbError::bad_data(format!(
                    "extended type byte {} at offset {} resolves to type {}, which is not an extended type",
                    ext, offset, type_num
                )));
            }
            type_num
        } else {
            primary as u16
        };

        let data_type = DataType::from_number(type_num).ok_or_else(|| {
            MmdbError::bad_data(format!("unknown type {} at offset {}", type_num, offset))
        })?;
        Ok((data_type, cursor))
    }

    fn pointer_from_control(&self, ctrl: u8, offset: u64) -> Result<(u64, u64)> {
        let width = (((ctrl >> 3) & 0x3) + 1) as u64;
        let raw = self.buffer.read_var_uint(offset, width)? as u64;
        let seed = if width == 4 { 0 } else { (ctrl & 0x7) as u64 };
        let value = (seed << (8 * width)) | raw;
        let target = value + POINTER_VALUE_OFFSETS[width as usize] + self.pointer_base;
        Ok((target, offset + width))
    }

    fn size_from_control(&self, ctrl: u8, offset: u64) -> Result<(u64, u64)> {
        let size = (ctrl & 0x1F) as u64;
        match size {
            0..=28 => Ok((size, offset)),
            29 => Ok((29 + self.buffer.read_var_uint(offset, 1)? as u64, offset + 1)),
            30 => Ok((285 + self.buffer.read_var_uint(offset, 2)? as u64, offset + 2)),
            _ => {
                let extra = size - 28;
                let value = self.buffer.read_var_uint(offset, extra)? as u64;
                Ok((65821 + value, offset + extra))
            }
        }
    }

    #[inline(never)]
    fn decode_scalar(&self, data_type: DataType, size: u64, offset: u64) -> Result<(DataValue, u64)> {
        let end = offset + size;
        let value = match data_type {
            DataType::Boolean => {
                return match size {
                    0 => Ok((DataValue::Bool(false), offset)),
                    1 => Ok((DataValue::Bool(true), offset)),
                    _ => Err(MmdbError::bad_data(format!(
                        "invalid size of boolean: {}",
                        size
                    ))),
                }
            }
            DataType::String => DataValue::String(self.buffer.read_string(offset, size)?.to_owned()),
            DataType::Bytes => DataValue::Bytes(self.buffer.read(offset, size)?.to_vec()),
            DataType::Double => {
                if size != 8 {
                    return Err(MmdbError::bad_data(format!(
                        "invalid size of double: {}",
                        size
                    )));
                }
                DataValue::Double(self.buffer.read_f64(offset)?)
            }
            DataType::Float => {
                if size != 4 {
                    return Err(MmdbError::bad_data(format!(
                        "invalid size of float: {}",
                        size
                    )));
                }
                DataValue::Float(self.buffer.read_f32(offset)?)
            }
            DataType::Uint16 => {
                check_int_size("uint16", size, 2)?;
                DataValue::Uint16(self.buffer.read_var_uint(offset, size)? as u16)
            }
            DataType::Uint32 => {
                check_int_size("uint32", size, 4)?;
                DataValue::Uint32(self.buffer.read_var_uint(offset, size)?)
            }
            DataType::Int32 => {
                check_int_size("int32", size, 4)?;
                DataValue::Int32(self.buffer.read_var_uint(offset, size)? as i32)
            }
            DataType::Uint64 => DataValue::Uint64(self.buffer.read_u64(offset, size)?),
            DataType::Uint128 => DataValue::Uint128(self.buffer.read_big_uint(offset, size)?),
            DataType::Map
            | DataType::Array
            | DataType::Extended
            | DataType::Pointer
            | DataType::Container
            | DataType::EndMarker => {
                return Err(MmdbError::bad_data(format!(
                    "unexpected {:?} type at offset {}",
                    data_type, offset
                )));
            }
        };
        Ok((value, end))
    }

    fn decode_map(&self, size: u64, offset: u64, depth: usize) -> Result<(DataValue, u64)> {
        // Each entry occupies at least two bytes, which bounds a corrupt size.
        let capacity = size.min(self.buffer.len().saturating_sub(offset) / 2) as usize;
        let mut map = Map::with_capacity(capacity);
        let mut cursor = offset;

        for _ in 0..size {
            let (key, next) = self.decode_at(cursor, depth + 1)?;
            let key = match key {
                DataValue::String(s) => s,
                other => return Err(non_string_key(cursor, &other)),
            };
            let (value, next) = self.decode_at(next, depth + 1)?;
            map.insert(key, value);
            cursor = next;
        }

        Ok((DataValue::Map(map), cursor))
    }

    fn decode_array(&self, size: u64, offset: u64, depth: usize) -> Result<(DataValue, u64)> {
        let capacity = size.min(self.buffer.len().saturating_sub(offset)) as usize;
        let mut array = Vec::with_capacity(capacity);
        let mut cursor = offset;

        for _ in 0..size {
            let (value, next) = self.decode_at(cursor, depth + 1)?;
            array.push(value);
            cursor = next;
        }

        Ok((DataValue::Array(array), cursor))
    }
}

#[cold]
#[inline(never)]
fn too_deep(offset: u64) -> MmdbError {
    MmdbError::bad_data(format!(
        "exceeded maximum data structure depth of {} at offset {}",
        MAX_DECODE_DEPTH, offset
    ))
}

#[cold]
#[inline(never)]
fn offset_out_of_range(offset: u64, len: u64) -> MmdbError {
    MmdbError::bad_data(format!(
        "offset {} is beyond the end of the file ({} bytes)",
        offset, len
    ))
}

#[cold]
#[inline(never)]
fn pointer_out_of_range(offset: u64, target: u64) -> MmdbError {
    MmdbError::bad_data(format!(
        "pointer at offset {} resolves to {}, beyond the end of the file",
        offset, target
    ))
}

#[cold]
#[inline(never)]
fn non_string_key(offset: u64, key: &DataValue) -> MmdbError {
    MmdbError::bad_data(format!(
        "map key at offset {} is a {}, not a string",
        offset,
        key.type_name()
    ))
}

fn check_int_size(name: &str, size: u64, max: u64) -> Result<()> {
    if size > max {
        return Err(MmdbError::bad_data(format!(
            "invalid size of {}: {} bytes",
            name, size
        )));
    }
    Ok(())
}
