//! Dynamic record chains and the payloads stored in them
//!
//! Long strings, arrays that do not fit inline and overflowed label sets live
//! in chains of [`DynamicRecord`] fragments. Readers concatenate fragments into
//! a caller-owned buffer that is reused between reads.
//!
//! Array payloads are self-describing:
//!
//! ```text
//! primitive: [tag][bits used in last byte][bits per element][packed data...]
//! string:    [tag][count: i32 LE]([len: i32 LE][utf-8 bytes])*
//! point:     [tag][subtype][dimension][crs table][crs code: u16 LE][f64 LE...]
//! temporal:  [tag][subtype][i64 LE fields...]
//! ```

use super::bits::{pack_bytes, unpack_bytes};
use super::short_array::{from_raw, to_raw};
use super::types::PropertyType;
use super::value::ArrayValue;
use super::{geometry, temporal};
use crate::storage::records::{DYNAMIC_DATA_SIZE, DynamicRecord, NO_ID, StoreRecord};
use crate::storage::{RecordStore, RecordStores};
use crate::{Error, Result};
use parking_lot::Mutex;

/// Chains longer than this are treated as cyclic
pub const CYCLE_DETECTION_THRESHOLD: usize = 100_000;

/// Which dynamic store a chain lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicStoreKind {
    /// strings.store
    Strings,
    /// arrays.store
    Arrays,
    /// labels.store
    Labels,
}

/// Read access to dynamic chains
pub trait DynamicChainReader {
    /// Append the payload of the chain starting at `head` to `buffer`
    fn read_chain(&self, kind: DynamicStoreKind, head: u64, buffer: &mut Vec<u8>) -> Result<()>;
}

/// Write access to dynamic chains
pub trait DynamicAllocator {
    /// Store `bytes` as a new chain and return its head id
    fn allocate_chain(&self, kind: DynamicStoreKind, bytes: &[u8]) -> Result<u64>;
}

/// Grow `buffer` by doubling until `additional` more bytes fit
fn reserve_doubling(buffer: &mut Vec<u8>, additional: usize) {
    let needed = buffer.len() + additional;
    if needed <= buffer.capacity() {
        return;
    }
    let mut capacity = buffer.capacity().max(DYNAMIC_DATA_SIZE);
    while capacity < needed {
        capacity *= 2;
    }
    buffer.reserve_exact(capacity - buffer.len());
}

/// Walk a chain through `read`, which fills the record for an id
fn collect_chain<F>(kind: DynamicStoreKind, head: u64, buffer: &mut Vec<u8>, mut read: F) -> Result<()>
where
    F: FnMut(u64, &mut DynamicRecord) -> Result<bool>,
{
    let mut record = DynamicRecord::empty();
    let mut id = head;
    let mut hops = 0usize;
    while id != NO_ID {
        hops += 1;
        if hops > CYCLE_DETECTION_THRESHOLD {
            tracing::warn!(?kind, head, "dynamic chain exceeds cycle detection threshold");
            return Err(Error::invalid_record(format!(
                "Cycle detected in {:?} chain starting at {}",
                kind, head
            )));
        }
        if !read(id, &mut record)? {
            tracing::warn!(?kind, head, id, "dynamic chain reaches an unused record");
            return Err(Error::invalid_record(format!(
                "Dynamic record {} in {:?} chain starting at {} is not in use",
                id, kind, head
            )));
        }
        let payload = record.payload();
        reserve_doubling(buffer, payload.len());
        buffer.extend_from_slice(payload);
        tracing::trace!(?kind, id, next = record.next, "dynamic chain hop");
        id = record.next;
    }
    Ok(())
}

/// Split `bytes` into fragments linked in id order
fn fragments(bytes: &[u8], ids: &[u64]) -> Result<Vec<DynamicRecord>> {
    let chunks: Vec<&[u8]> = if bytes.is_empty() {
        vec![&[][..]]
    } else {
        bytes.chunks(DYNAMIC_DATA_SIZE).collect()
    };
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let next = ids.get(i + 1).copied().unwrap_or(NO_ID);
            DynamicRecord::fragment(chunk, next, i == 0)
        })
        .collect()
}

fn fragment_count(bytes: &[u8]) -> usize {
    bytes.len().div_ceil(DYNAMIC_DATA_SIZE).max(1)
}

impl RecordStores {
    fn dynamic_store(&self, kind: DynamicStoreKind) -> &RecordStore<DynamicRecord> {
        match kind {
            DynamicStoreKind::Strings => &self.strings,
            DynamicStoreKind::Arrays => &self.arrays,
            DynamicStoreKind::Labels => &self.labels,
        }
    }
}

impl DynamicChainReader for RecordStores {
    fn read_chain(&self, kind: DynamicStoreKind, head: u64, buffer: &mut Vec<u8>) -> Result<()> {
        let store = self.dynamic_store(kind);
        collect_chain(kind, head, buffer, |id, record| store.read_into(id, record))
    }
}

impl DynamicAllocator for RecordStores {
    fn allocate_chain(&self, kind: DynamicStoreKind, bytes: &[u8]) -> Result<u64> {
        let store = self.dynamic_store(kind);
        let ids: Vec<u64> = (0..fragment_count(bytes)).map(|_| store.next_id()).collect();
        for (id, record) in ids.iter().zip(fragments(bytes, &ids)?) {
            store.write(*id, &record)?;
        }
        Ok(ids[0])
    }
}

/// Dynamic chains held in memory, for using the codec without store files
#[derive(Debug, Default)]
pub struct InMemoryDynamicStore {
    chains: Mutex<[Vec<DynamicRecord>; 3]>,
}

impl InMemoryDynamicStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(kind: DynamicStoreKind) -> usize {
        match kind {
            DynamicStoreKind::Strings => 0,
            DynamicStoreKind::Arrays => 1,
            DynamicStoreKind::Labels => 2,
        }
    }

    /// Number of fragments stored for `kind`
    pub fn fragment_count(&self, kind: DynamicStoreKind) -> usize {
        self.chains.lock()[Self::slot(kind)].len()
    }

    /// Overwrite a fragment, for corrupting chains in tests
    pub fn set_fragment(&self, kind: DynamicStoreKind, id: u64, record: DynamicRecord) {
        let mut chains = self.chains.lock();
        let records = &mut chains[Self::slot(kind)];
        let index = id as usize;
        if index >= records.len() {
            records.resize(index + 1, DynamicRecord::empty());
        }
        records[index] = record;
    }
}

impl DynamicChainReader for InMemoryDynamicStore {
    fn read_chain(&self, kind: DynamicStoreKind, head: u64, buffer: &mut Vec<u8>) -> Result<()> {
        let chains = self.chains.lock();
        let records = &chains[Self::slot(kind)];
        collect_chain(kind, head, buffer, |id, record| {
            *record = records
                .get(id as usize)
                .copied()
                .unwrap_or_else(DynamicRecord::empty);
            Ok(record.in_use())
        })
    }
}

impl DynamicAllocator for InMemoryDynamicStore {
    fn allocate_chain(&self, kind: DynamicStoreKind, bytes: &[u8]) -> Result<u64> {
        let mut chains = self.chains.lock();
        let records = &mut chains[Self::slot(kind)];
        let first = records.len() as u64;
        let ids: Vec<u64> = (first..first + fragment_count(bytes) as u64).collect();
        records.extend(fragments(bytes, &ids)?);
        Ok(first)
    }
}

/// Decode a string chain payload
pub(crate) fn decode_string_buffer(buffer: &[u8]) -> Result<String> {
    if buffer.is_empty() {
        return Err(Error::codec("empty dynamic string buffer"));
    }
    String::from_utf8(buffer.to_vec())
        .map_err(|e| Error::codec(format!("dynamic string is not UTF-8: {}", e)))
}

/// Serialize an array for the array store
pub(crate) fn encode_array_buffer(array: &ArrayValue) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match array {
        ArrayValue::String(values) => {
            out.push(PropertyType::String.tag());
            let count = i32::try_from(values.len())
                .map_err(|_| Error::codec("string array too long"))?;
            out.extend_from_slice(&count.to_le_bytes());
            for value in values {
                let len = i32::try_from(value.len())
                    .map_err(|_| Error::codec("string array element too long"))?;
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(value.as_bytes());
            }
        }
        ArrayValue::Point(points) => {
            out.push(PropertyType::Geometry.tag());
            geometry::encode_array(points, &mut out)?;
        }
        ArrayValue::Temporal(values) => {
            out.push(PropertyType::Temporal.tag());
            temporal::encode_array(values, &mut out)?;
        }
        primitive => {
            let raw = to_raw(primitive)
                .ok_or_else(|| Error::codec("array has no primitive representation"))?;
            // Byte arrays are stored whole so readers can copy them directly
            let bits = if raw.element_type == PropertyType::Byte { 8 } else { raw.bits };
            let (data, used_in_last) = pack_bytes(raw.values.iter().copied(), bits);
            out.push(raw.element_type.tag());
            out.push(used_in_last);
            out.push(bits as u8);
            out.extend_from_slice(&data);
        }
    }
    Ok(out)
}

fn read_i32(data: &[u8], offset: &mut usize) -> Result<i32> {
    let bytes = data
        .get(*offset..*offset + 4)
        .ok_or_else(|| Error::codec("string array truncated"))?;
    *offset += 4;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    Ok(i32::from_le_bytes(raw))
}

fn decode_string_array(data: &[u8]) -> Result<Vec<String>> {
    let mut offset = 0;
    let count = read_i32(data, &mut offset)?;
    let count = usize::try_from(count)
        .map_err(|_| Error::codec(format!("negative string array length {}", count)))?;
    let mut values = Vec::with_capacity(count.min(data.len()));
    for _ in 0..count {
        let len = read_i32(data, &mut offset)?;
        let len = usize::try_from(len)
            .map_err(|_| Error::codec(format!("negative string length {}", len)))?;
        let bytes = data
            .get(offset..offset + len)
            .ok_or_else(|| Error::codec("string array element truncated"))?;
        offset += len;
        values.push(
            String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::codec(format!("string array element is not UTF-8: {}", e)))?,
        );
    }
    Ok(values)
}

/// Parse an array store payload
pub(crate) fn decode_array_buffer(buffer: &[u8]) -> Result<ArrayValue> {
    let (&tag, rest) = buffer.split_first().ok_or_else(|| {
        tracing::warn!("empty dynamic array buffer");
        Error::codec("empty dynamic array buffer")
    })?;
    let element_type = PropertyType::from_tag(tag)
        .map_err(|_| Error::codec(format!("Unknown array buffer type {}", tag)))?;

    match element_type {
        PropertyType::String => Ok(ArrayValue::String(decode_string_array(rest)?)),
        PropertyType::Geometry => Ok(ArrayValue::Point(geometry::decode_array(rest)?)),
        PropertyType::Temporal => Ok(ArrayValue::Temporal(temporal::decode_array(rest)?)),
        PropertyType::Bool
        | PropertyType::Byte
        | PropertyType::Short
        | PropertyType::Char
        | PropertyType::Int
        | PropertyType::Long
        | PropertyType::Float
        | PropertyType::Double => {
            let [used_in_last, bits, data @ ..] = rest else {
                return Err(Error::codec("array buffer header truncated"));
            };
            if element_type == PropertyType::Byte && *bits == 8 {
                return Ok(ArrayValue::Byte(data.iter().map(|&b| b as i8).collect()));
            }
            let values = unpack_bytes(data, *bits as u32, *used_in_last)?;
            from_raw(element_type, &values)
        }
        other => Err(Error::codec(format!(
            "{:?} is not a valid array buffer type",
            other
        ))),
    }
}

/// Serialize a label set for the label store
pub(crate) fn encode_label_buffer(labels: &[u32]) -> Vec<u8> {
    labels.iter().flat_map(|l| l.to_le_bytes()).collect()
}

/// Parse a label store payload
pub(crate) fn decode_label_buffer(buffer: &[u8]) -> Result<Vec<u32>> {
    if buffer.len() % 4 != 0 {
        return Err(Error::invalid_record(format!(
            "label chain payload of {} bytes is not a whole number of labels",
            buffer.len()
        )));
    }
    Ok(buffer
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::value::{CoordinateSystem, Point};

    #[test]
    fn test_multi_fragment_chain() {
        let store = InMemoryDynamicStore::new();
        let payload: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
        let head = store.allocate_chain(DynamicStoreKind::Strings, &payload).unwrap();
        assert_eq!(store.fragment_count(DynamicStoreKind::Strings), 3);

        let mut buffer = Vec::new();
        store.read_chain(DynamicStoreKind::Strings, head, &mut buffer).unwrap();
        assert_eq!(buffer, payload);
    }

    #[test]
    fn test_cycle_detected() {
        let store = InMemoryDynamicStore::new();
        store.set_fragment(
            DynamicStoreKind::Arrays,
            0,
            DynamicRecord::fragment(b"x", 1, true).unwrap(),
        );
        store.set_fragment(
            DynamicStoreKind::Arrays,
            1,
            DynamicRecord::fragment(b"y", 0, false).unwrap(),
        );
        let mut buffer = Vec::new();
        let err = store
            .read_chain(DynamicStoreKind::Arrays, 0, &mut buffer)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));
    }

    #[test]
    fn test_unused_fragment_is_corruption() {
        let store = InMemoryDynamicStore::new();
        store.set_fragment(
            DynamicStoreKind::Strings,
            0,
            DynamicRecord::fragment(b"ab", 5, true).unwrap(),
        );
        let mut buffer = Vec::new();
        assert!(
            store
                .read_chain(DynamicStoreKind::Strings, 0, &mut buffer)
                .unwrap_err()
                .is_corruption()
        );
    }

    #[test]
    fn test_byte_array_fast_path() {
        let array = ArrayValue::Byte(vec![0, 1, -1, 127, -128]);
        let buffer = encode_array_buffer(&array).unwrap();
        assert_eq!(buffer[0], PropertyType::Byte.tag());
        assert_eq!(buffer[2], 8);
        assert_eq!(&buffer[3..], &[0u8, 1, 0xFF, 0x7F, 0x80]);
        assert_eq!(decode_array_buffer(&buffer).unwrap(), array);
    }

    #[test]
    fn test_packed_numeric_buffer() {
        let array = ArrayValue::Int((0..100).collect());
        let buffer = encode_array_buffer(&array).unwrap();
        assert_eq!(buffer[2], 7);
        assert_eq!(decode_array_buffer(&buffer).unwrap(), array);
    }

    #[test]
    fn test_string_array_buffer() {
        let array = ArrayValue::String(vec!["alpha".into(), String::new(), "ωmega".into()]);
        let buffer = encode_array_buffer(&array).unwrap();
        assert_eq!(decode_array_buffer(&buffer).unwrap(), array);
    }

    #[test]
    fn test_point_array_buffer() {
        let array = ArrayValue::Point(vec![Point::new_3d(1.0, 2.0, 3.0, CoordinateSystem::Cartesian)]);
        let buffer = encode_array_buffer(&array).unwrap();
        assert_eq!(decode_array_buffer(&buffer).unwrap(), array);
    }

    #[test]
    fn test_malformed_buffers_rejected() {
        assert!(decode_array_buffer(&[]).unwrap_err().is_corruption());
        assert!(decode_array_buffer(&[0, 1, 2]).unwrap_err().is_corruption());
        assert!(decode_array_buffer(&[11, 0, 0]).unwrap_err().is_corruption());
        assert!(decode_string_buffer(&[]).unwrap_err().is_corruption());
    }

    #[test]
    fn test_label_buffer() {
        let labels = vec![3, 70, 1000];
        assert_eq!(decode_label_buffer(&encode_label_buffer(&labels)).unwrap(), labels);
        assert!(decode_label_buffer(&[1, 2, 3]).is_err());
    }
}
