//! Inline bit-packed arrays of primitive elements
//!
//! ```text
//! bit  0..27  key + type (ShortArray)
//! bit 28..31  element type tag
//! bit 32..37  length
//! bit 38..43  bits per element (0 means 64)
//! bit 44..    packed elements across up to four blocks
//! ```
//!
//! Non-negative integral elements are packed at the width of the largest
//! element; any negative element forces the type's full width so the sign
//! survives.

use super::bits::{WordReader, WordWriter, required_bits};
use super::types::{self, PAYLOAD_SHIFT, PropertyType};
use super::value::ArrayValue;
use crate::storage::records::PROPERTY_BLOCKS;
use crate::{Error, Result};

const HEADER_BITS: usize = 44;
const TYPE_BITS: u32 = 4;
const LENGTH_BITS: u32 = 6;
const WIDTH_BITS: u32 = 6;
const MAX_LENGTH: usize = (1 << LENGTH_BITS) - 1;

/// Primitive elements as raw words plus their element type and packing width
pub(crate) struct RawArray {
    pub(crate) element_type: PropertyType,
    pub(crate) values: Vec<u64>,
    pub(crate) bits: u32,
}

fn integral_width<I>(values: I, full_width: u32) -> u32
where
    I: IntoIterator<Item = i64>,
{
    let mut width = 1;
    for value in values {
        if value < 0 {
            return full_width;
        }
        width = width.max(required_bits(value as u64));
    }
    width
}

/// Flatten a primitive array; `None` for string, point and temporal arrays
pub(crate) fn to_raw(array: &ArrayValue) -> Option<RawArray> {
    let (element_type, values, bits) = match array {
        ArrayValue::Bool(v) => (
            PropertyType::Bool,
            v.iter().map(|&b| b as u64).collect(),
            1,
        ),
        ArrayValue::Byte(v) => (
            PropertyType::Byte,
            v.iter().map(|&x| x as u8 as u64).collect(),
            integral_width(v.iter().map(|&x| x as i64), 8),
        ),
        ArrayValue::Short(v) => (
            PropertyType::Short,
            v.iter().map(|&x| x as u16 as u64).collect(),
            integral_width(v.iter().map(|&x| x as i64), 16),
        ),
        ArrayValue::Char(v) => (
            PropertyType::Char,
            v.iter().map(|&c| c as u64).collect(),
            integral_width(v.iter().map(|&c| c as i64), 32),
        ),
        ArrayValue::Int(v) => (
            PropertyType::Int,
            v.iter().map(|&x| x as u32 as u64).collect(),
            integral_width(v.iter().map(|&x| x as i64), 32),
        ),
        ArrayValue::Long(v) => (
            PropertyType::Long,
            v.iter().map(|&x| x as u64).collect(),
            integral_width(v.iter().copied(), 64),
        ),
        ArrayValue::Float(v) => (
            PropertyType::Float,
            v.iter().map(|&x| x.to_bits() as u64).collect(),
            32,
        ),
        ArrayValue::Double(v) => (
            PropertyType::Double,
            v.iter().map(|&x| x.to_bits()).collect(),
            64,
        ),
        ArrayValue::String(_) | ArrayValue::Point(_) | ArrayValue::Temporal(_) => return None,
    };
    Some(RawArray {
        element_type,
        values,
        bits,
    })
}

/// Rebuild a primitive array from raw words
pub(crate) fn from_raw(element_type: PropertyType, values: &[u64]) -> Result<ArrayValue> {
    Ok(match element_type {
        PropertyType::Bool => ArrayValue::Bool(values.iter().map(|&v| v != 0).collect()),
        PropertyType::Byte => ArrayValue::Byte(values.iter().map(|&v| v as u8 as i8).collect()),
        PropertyType::Short => {
            ArrayValue::Short(values.iter().map(|&v| v as u16 as i16).collect())
        }
        PropertyType::Char => ArrayValue::Char(
            values
                .iter()
                .map(|&v| {
                    u32::try_from(v)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| Error::codec(format!("invalid char element {:#x}", v)))
                })
                .collect::<Result<_>>()?,
        ),
        PropertyType::Int => ArrayValue::Int(values.iter().map(|&v| v as u32 as i32).collect()),
        PropertyType::Long => ArrayValue::Long(values.iter().map(|&v| v as i64).collect()),
        PropertyType::Float => {
            ArrayValue::Float(values.iter().map(|&v| f32::from_bits(v as u32)).collect())
        }
        PropertyType::Double => {
            ArrayValue::Double(values.iter().map(|&v| f64::from_bits(v)).collect())
        }
        other => {
            return Err(Error::codec(format!(
                "{:?} is not a primitive array element type",
                other
            )));
        }
    })
}

fn blocks_for(length: usize, bits: u32) -> usize {
    (HEADER_BITS + length * bits as usize).div_ceil(64)
}

/// Encode `array` inline, or `None` when it must go to the array store
pub fn encode(key: u32, array: &ArrayValue) -> Result<Option<Vec<u64>>> {
    let Some(raw) = to_raw(array) else {
        return Ok(None);
    };
    let length = raw.values.len();
    if length > MAX_LENGTH || blocks_for(length, raw.bits) > PROPERTY_BLOCKS {
        return Ok(None);
    }

    let mut blocks = vec![0u64; blocks_for(length, raw.bits)];
    blocks[0] = types::header(key, PropertyType::ShortArray)?;
    let mut writer = WordWriter::new(&mut blocks, PAYLOAD_SHIFT as usize);
    writer.put(raw.element_type.tag() as u64, TYPE_BITS)?;
    writer.put(length as u64, LENGTH_BITS)?;
    writer.put((raw.bits % 64) as u64, WIDTH_BITS)?;
    for &value in &raw.values {
        writer.put(value, raw.bits)?;
    }
    Ok(Some(blocks))
}

fn read_header(header: u64) -> Result<(PropertyType, usize, u32)> {
    let mut reader = WordReader::new(std::slice::from_ref(&header), PAYLOAD_SHIFT as usize);
    let element_type = PropertyType::from_tag(reader.get(TYPE_BITS)? as u8)?;
    let length = reader.get(LENGTH_BITS)? as usize;
    let bits = match reader.get(WIDTH_BITS)? as u32 {
        0 => 64,
        bits => bits,
    };
    Ok((element_type, length, bits))
}

/// Blocks occupied by the short array whose header is `header`
pub fn block_count(header: u64) -> Result<usize> {
    let (_, length, bits) = read_header(header)?;
    Ok(blocks_for(length, bits))
}

/// Decode a short array from its blocks
pub fn decode(blocks: &[u64]) -> Result<ArrayValue> {
    let header = *blocks
        .first()
        .ok_or_else(|| Error::codec("short array without header block"))?;
    let (element_type, length, bits) = read_header(header)?;

    let mut reader = WordReader::new(blocks, HEADER_BITS);
    let mut values = Vec::with_capacity(length);
    for _ in 0..length {
        values.push(reader.get(bits)?);
    }
    from_raw(element_type, &values)
}
