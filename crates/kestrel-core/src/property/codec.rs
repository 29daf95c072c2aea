//! Property block codec
//!
//! Maps a [`Value`] to the block words stored in a property record, spilling
//! to the string or array store when the value does not fit inline.

use super::dynamic::{
    DynamicAllocator, DynamicChainReader, DynamicStoreKind, decode_array_buffer,
    decode_string_buffer, encode_array_buffer,
};
use super::types::{self, PAYLOAD_SHIFT, PropertyType, REFERENCE_BITS};
use super::value::Value;
use super::{geometry, short_array, short_string, temporal};
use crate::{Error, Result};

/// Longs in 0..2^35 are stored inline
const INLINE_LONG_BITS: u32 = 35;
const INLINE_LONG_FLAG: u64 = 1 << PAYLOAD_SHIFT;
const INLINE_LONG_SHIFT: u32 = PAYLOAD_SHIFT + 1;

fn with_payload(key: u32, property_type: PropertyType, payload: u64) -> Result<u64> {
    Ok(types::header(key, property_type)? | (payload << PAYLOAD_SHIFT))
}

fn reference(key: u32, property_type: PropertyType, id: u64) -> Result<u64> {
    if id >> REFERENCE_BITS != 0 {
        return Err(Error::codec(format!(
            "dynamic record id {} does not fit a property block reference",
            id
        )));
    }
    with_payload(key, property_type, id)
}

/// Encode `value` under property key `key`
///
/// Returns the blocks to place contiguously in one property record. Values
/// that overflow are written to `dynamic` first; the returned block then
/// only references the chain head.
pub fn encode(key: u32, value: &Value, dynamic: &dyn DynamicAllocator) -> Result<Vec<u64>> {
    Ok(match value {
        Value::Bool(v) => vec![with_payload(key, PropertyType::Bool, *v as u64)?],
        Value::Byte(v) => vec![with_payload(key, PropertyType::Byte, *v as u8 as u64)?],
        Value::Short(v) => vec![with_payload(key, PropertyType::Short, *v as u16 as u64)?],
        Value::Char(v) => vec![with_payload(key, PropertyType::Char, *v as u32 as u64)?],
        Value::Int(v) => vec![with_payload(key, PropertyType::Int, *v as u32 as u64)?],
        Value::Float(v) => vec![with_payload(key, PropertyType::Float, v.to_bits() as u64)?],
        Value::Long(v) => {
            let header = types::header(key, PropertyType::Long)?;
            if *v >= 0 && (*v as u64) >> INLINE_LONG_BITS == 0 {
                vec![header | INLINE_LONG_FLAG | ((*v as u64) << INLINE_LONG_SHIFT)]
            } else {
                vec![header, *v as u64]
            }
        }
        Value::Double(v) => vec![types::header(key, PropertyType::Double)?, v.to_bits()],
        Value::String(s) => match short_string::encode(key, s)? {
            Some(blocks) => blocks,
            None => {
                let head = dynamic.allocate_chain(DynamicStoreKind::Strings, s.as_bytes())?;
                vec![reference(key, PropertyType::String, head)?]
            }
        },
        Value::Array(array) => match short_array::encode(key, array)? {
            Some(blocks) => blocks,
            None => {
                let buffer = encode_array_buffer(array)?;
                let head = dynamic.allocate_chain(DynamicStoreKind::Arrays, &buffer)?;
                vec![reference(key, PropertyType::Array, head)?]
            }
        },
        Value::Point(point) => geometry::encode(key, point)?,
        Value::Temporal(t) => temporal::encode(key, t)?,
    })
}

/// Property key of the property starting at `header`
pub fn key_of(header: u64) -> u32 {
    types::key_of_header(header)
}

/// Number of blocks used by the property whose header block is `header`
pub fn block_count(header: u64) -> Result<usize> {
    Ok(match PropertyType::of_header(header)? {
        PropertyType::Bool
        | PropertyType::Byte
        | PropertyType::Short
        | PropertyType::Char
        | PropertyType::Int
        | PropertyType::Float
        | PropertyType::String
        | PropertyType::Array => 1,
        PropertyType::Long if header & INLINE_LONG_FLAG != 0 => 1,
        PropertyType::Long | PropertyType::Double => 2,
        PropertyType::ShortString => short_string::block_count(header)?,
        PropertyType::ShortArray => short_array::block_count(header)?,
        PropertyType::Geometry => geometry::block_count(header)?,
        PropertyType::Temporal => temporal::block_count(header)?,
    })
}

/// Decode the property at the start of `blocks`
///
/// `scratch` is the reusable buffer that overflow chains are read into; it
/// is cleared before use and keeps its capacity between calls.
pub fn decode(
    blocks: &[u64],
    dynamic: &dyn DynamicChainReader,
    scratch: &mut Vec<u8>,
) -> Result<Value> {
    let header = *blocks
        .first()
        .ok_or_else(|| Error::codec("decode of an empty block slice"))?;
    let property_type = PropertyType::of_header(header)?;
    let needed = block_count(header)?;
    let blocks = blocks.get(..needed).ok_or_else(|| {
        Error::codec(format!(
            "{:?} property needs {} blocks, {} available",
            property_type,
            needed,
            blocks.len()
        ))
    })?;
    let payload = types::payload_of_header(header);

    Ok(match property_type {
        PropertyType::Bool => Value::Bool(payload & 1 != 0),
        PropertyType::Byte => Value::Byte(payload as u8 as i8),
        PropertyType::Short => Value::Short(payload as u16 as i16),
        PropertyType::Char => {
            let code = payload as u32;
            Value::Char(
                char::from_u32(code)
                    .ok_or_else(|| Error::codec(format!("invalid char {:#x}", code)))?,
            )
        }
        PropertyType::Int => Value::Int(payload as u32 as i32),
        PropertyType::Float => Value::Float(f32::from_bits(payload as u32)),
        PropertyType::Long if header & INLINE_LONG_FLAG != 0 => {
            Value::Long((header >> INLINE_LONG_SHIFT) as i64)
        }
        PropertyType::Long => Value::Long(blocks[1] as i64),
        PropertyType::Double => Value::Double(f64::from_bits(blocks[1])),
        PropertyType::ShortString => Value::String(short_string::decode(blocks)?),
        PropertyType::ShortArray => Value::Array(short_array::decode(blocks)?),
        PropertyType::String => {
            scratch.clear();
            dynamic.read_chain(DynamicStoreKind::Strings, payload, scratch)?;
            Value::String(decode_string_buffer(scratch)?)
        }
        PropertyType::Array => {
            scratch.clear();
            dynamic.read_chain(DynamicStoreKind::Arrays, payload, scratch)?;
            Value::Array(decode_array_buffer(scratch)?)
        }
        PropertyType::Geometry => Value::Point(geometry::decode(blocks)?),
        PropertyType::Temporal => Value::Temporal(temporal::decode(blocks)?),
    })
}
