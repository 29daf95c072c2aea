//! Property type tags and the block header layout
//!
//! ```text
//! bit  0..23  property key id
//! bit 24..27  type tag
//! bit 28..63  payload (type specific)
//! ```

use crate::{Error, Result};

/// Bits of the key id field
pub const KEY_BITS: u32 = 24;
/// Largest encodable property key id
pub const MAX_KEY_ID: u32 = (1 << KEY_BITS) - 1;
/// First payload bit of a header block
pub const PAYLOAD_SHIFT: u32 = 28;
/// Width of dynamic store references held in the header payload
pub const REFERENCE_BITS: u32 = 36;

const TYPE_SHIFT: u32 = 24;
const TYPE_MASK: u64 = 0xF;

/// Closed set of property type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PropertyType {
    /// Inline boolean
    Bool = 1,
    /// Inline i8
    Byte = 2,
    /// Inline i16
    Short = 3,
    /// Inline char
    Char = 4,
    /// Inline i32
    Int = 5,
    /// i64, inline when it fits 35 bits
    Long = 6,
    /// Inline f32
    Float = 7,
    /// f64 in a second block
    Double = 8,
    /// Reference into the string store
    String = 9,
    /// Reference into the array store
    Array = 10,
    /// Inline string of up to four blocks
    ShortString = 11,
    /// Inline bit-packed array of up to four blocks
    ShortArray = 12,
    /// Spatial point
    Geometry = 13,
    /// Date, time, datetime or duration
    Temporal = 14,
}

impl PropertyType {
    /// Resolve a tag, failing on anything outside the closed set
    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            1 => Self::Bool,
            2 => Self::Byte,
            3 => Self::Short,
            4 => Self::Char,
            5 => Self::Int,
            6 => Self::Long,
            7 => Self::Float,
            8 => Self::Double,
            9 => Self::String,
            10 => Self::Array,
            11 => Self::ShortString,
            12 => Self::ShortArray,
            13 => Self::Geometry,
            14 => Self::Temporal,
            other => {
                tracing::warn!(tag = other, "unknown property type tag");
                return Err(Error::codec(format!("Unknown property type tag {}", other)));
            }
        })
    }

    /// Numeric tag
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Type stored in a header block
    pub fn of_header(header: u64) -> Result<Self> {
        Self::from_tag(((header >> TYPE_SHIFT) & TYPE_MASK) as u8)
    }
}

/// Key id stored in a header block
pub fn key_of_header(header: u64) -> u32 {
    (header & MAX_KEY_ID as u64) as u32
}

/// Build the key and type portion of a header block
pub fn header(key: u32, property_type: PropertyType) -> Result<u64> {
    if key > MAX_KEY_ID {
        return Err(Error::codec(format!(
            "Property key id {} exceeds {}",
            key, MAX_KEY_ID
        )));
    }
    Ok(key as u64 | ((property_type.tag() as u64) << TYPE_SHIFT))
}

/// Header payload starting at bit 28
pub fn payload_of_header(header: u64) -> u64 {
    header >> PAYLOAD_SHIFT
}
