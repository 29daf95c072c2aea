//! On-disk record layouts
//!
//! Every store holds fixed-size slots addressed by a 0-based id. Records are
//! plain `#[repr(C)]` structs read and written with `bytemuck`, so the byte
//! layout below *is* the file format:
//!
//! - NodeRecord: 32 bytes (flags: 4, padding: 4, next_rel: 8, next_prop: 8, labels: 8)
//! - RelationshipRecord: 64 bytes (flags: 4, type: 4, first/second node, 4 chain pointers, next_prop)
//! - RelationshipGroupRecord: 48 bytes (flags: 4, type: 4, next, first_out, first_in, first_loop, owner)
//! - PropertyRecord: 56 bytes (flags: 4, padding: 4, next_prop: 8, prev_prop: 8, 4 blocks of 8)
//! - DynamicRecord: 144 bytes (flags: 4, length: 4, next: 8, data: 128)
//!
//! Unused slots keep their last pointers. A reader that lands on a deleted
//! record can still follow it to the rest of the chain.

use crate::{Error, Result};
use bytemuck::{Pod, Zeroable};
use std::fmt::Debug;

/// Null pointer sentinel for every record reference
pub const NO_ID: u64 = u64::MAX;

/// Number of 8-byte blocks in a property record
pub const PROPERTY_BLOCKS: usize = 4;

/// Payload bytes per dynamic record
pub const DYNAMIC_DATA_SIZE: usize = 128;

const IN_USE: u32 = 1 << 0;

/// Node flag: relationships are partitioned by relationship group
const NODE_DENSE: u32 = 1 << 1;
/// Node flag: `labels` holds the head of a dynamic label chain
const NODE_LABELS_OVERFLOW: u32 = 1 << 2;

/// Relationship flag: first in the first node's chain (first_prev holds the count)
const REL_FIRST_IN_FIRST_CHAIN: u32 = 1 << 1;
/// Relationship flag: first in the second node's chain (second_prev holds the count)
const REL_FIRST_IN_SECOND_CHAIN: u32 = 1 << 2;

/// Dynamic record flag: first fragment of a chain
const DYNAMIC_START: u32 = 1 << 1;

/// Highest label id that fits the inline label bitmap
pub const MAX_INLINE_LABEL_ID: u32 = 62;

/// Common behaviour of all fixed-size store records
pub trait StoreRecord: Pod + Debug + Send + Sync + 'static {
    /// Name used in logs and errors
    const STORE_NAME: &'static str;

    /// Size of one slot in bytes
    const RECORD_SIZE: usize = std::mem::size_of::<Self>();

    /// A record with every pointer set to [`NO_ID`] and not in use
    fn empty() -> Self;

    /// Check the in-use flag
    fn in_use(&self) -> bool;

    /// Set or clear the in-use flag, keeping every other field
    fn set_in_use(&mut self, in_use: bool);
}

/// Node record in nodes.store (32 bytes, fixed-size)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct NodeRecord {
    /// Flags (bit 0: in use, bit 1: dense, bit 2: labels overflow)
    pub flags: u32,
    _padding: u32,
    /// First relationship (sparse) or first relationship group (dense)
    pub next_rel: u64,
    /// Head of the property chain
    pub next_prop: u64,
    /// Inline label bitmap, or head of the dynamic label chain when overflowed
    pub labels: u64,
}

impl Default for NodeRecord {
    fn default() -> Self {
        Self::empty()
    }
}

impl StoreRecord for NodeRecord {
    const STORE_NAME: &'static str = "nodes.store";

    fn empty() -> Self {
        Self {
            flags: 0,
            _padding: 0,
            next_rel: NO_ID,
            next_prop: NO_ID,
            labels: 0,
        }
    }

    fn in_use(&self) -> bool {
        self.flags & IN_USE != 0
    }

    fn set_in_use(&mut self, in_use: bool) {
        set_flag(&mut self.flags, IN_USE, in_use);
    }
}

impl NodeRecord {
    /// Whether relationships live in group chains
    pub fn is_dense(&self) -> bool {
        self.flags & NODE_DENSE != 0
    }

    /// Mark the node dense or sparse
    pub fn set_dense(&mut self, dense: bool) {
        set_flag(&mut self.flags, NODE_DENSE, dense);
    }

    /// Whether `labels` points into the dynamic label store
    pub fn has_label_overflow(&self) -> bool {
        self.flags & NODE_LABELS_OVERFLOW != 0
    }

    /// Point the label field at a dynamic label chain
    pub fn set_label_overflow(&mut self, head: u64) {
        self.flags |= NODE_LABELS_OVERFLOW;
        self.labels = head;
    }

    /// Replace the inline bitmap with the given label ids
    pub fn set_inline_labels(&mut self, label_ids: &[u32]) -> Result<()> {
        let mut bits = 0u64;
        for &label in label_ids {
            if label > MAX_INLINE_LABEL_ID {
                return Err(Error::storage(format!(
                    "label {} does not fit the inline label field",
                    label
                )));
            }
            bits |= 1u64 << label;
        }
        self.flags &= !NODE_LABELS_OVERFLOW;
        self.labels = bits;
        Ok(())
    }

    /// Inline label ids in ascending order (empty when overflowed)
    pub fn inline_labels(&self) -> Vec<u32> {
        if self.has_label_overflow() {
            return Vec::new();
        }
        (0..=MAX_INLINE_LABEL_ID)
            .filter(|label| self.labels & (1u64 << label) != 0)
            .collect()
    }

    /// Dense nodes point at a group chain, sparse nodes at a relationship chain
    pub fn first_group(&self) -> u64 {
        if self.is_dense() { self.next_rel } else { NO_ID }
    }
}

/// Direction of a relationship as seen from one of its endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipDirection {
    /// The node is the first (start) node
    Outgoing,
    /// The node is the second (end) node
    Incoming,
    /// The node is both endpoints
    Loop,
}

/// Relationship record in rels.store (64 bytes, fixed-size)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct RelationshipRecord {
    /// Flags (bit 0: in use, bit 1: first in first chain, bit 2: first in second chain)
    pub flags: u32,
    /// Relationship type id
    pub type_id: u32,
    /// Start node
    pub first_node: u64,
    /// End node
    pub second_node: u64,
    /// Previous relationship in the first node's chain, or its length when first in chain
    pub first_prev: u64,
    /// Next relationship in the first node's chain
    pub first_next: u64,
    /// Previous relationship in the second node's chain, or its length when first in chain
    pub second_prev: u64,
    /// Next relationship in the second node's chain
    pub second_next: u64,
    /// Head of the property chain
    pub next_prop: u64,
}

impl Default for RelationshipRecord {
    fn default() -> Self {
        Self::empty()
    }
}

impl StoreRecord for RelationshipRecord {
    const STORE_NAME: &'static str = "rels.store";

    fn empty() -> Self {
        Self {
            flags: 0,
            type_id: 0,
            first_node: NO_ID,
            second_node: NO_ID,
            first_prev: NO_ID,
            first_next: NO_ID,
            second_prev: NO_ID,
            second_next: NO_ID,
            next_prop: NO_ID,
        }
    }

    fn in_use(&self) -> bool {
        self.flags & IN_USE != 0
    }

    fn set_in_use(&mut self, in_use: bool) {
        set_flag(&mut self.flags, IN_USE, in_use);
    }
}

impl RelationshipRecord {
    /// Whether this record heads the first node's chain
    pub fn is_first_in_first_chain(&self) -> bool {
        self.flags & REL_FIRST_IN_FIRST_CHAIN != 0
    }

    /// Mark this record as head of the first node's chain
    pub fn set_first_in_first_chain(&mut self, first: bool) {
        set_flag(&mut self.flags, REL_FIRST_IN_FIRST_CHAIN, first);
    }

    /// Whether this record heads the second node's chain
    pub fn is_first_in_second_chain(&self) -> bool {
        self.flags & REL_FIRST_IN_SECOND_CHAIN != 0
    }

    /// Mark this record as head of the second node's chain
    pub fn set_first_in_second_chain(&mut self, first: bool) {
        set_flag(&mut self.flags, REL_FIRST_IN_SECOND_CHAIN, first);
    }

    /// Direction relative to `node`; fails when `node` is neither endpoint
    pub fn direction_from(&self, rel_id: u64, node: u64) -> Result<RelationshipDirection> {
        if self.first_node == node {
            return Ok(if self.second_node == node {
                RelationshipDirection::Loop
            } else {
                RelationshipDirection::Outgoing
            });
        }
        if self.second_node == node {
            return Ok(RelationshipDirection::Incoming);
        }
        Err(self.not_attached(rel_id, node))
    }

    /// The pointer that continues `node`'s chain
    ///
    /// For a self-loop both sides belong to the node; the first-node side is
    /// used, which the writer keeps identical to the second-node side.
    pub fn next_for(&self, rel_id: u64, node: u64) -> Result<u64> {
        if self.first_node == node {
            Ok(self.first_next)
        } else if self.second_node == node {
            Ok(self.second_next)
        } else {
            Err(self.not_attached(rel_id, node))
        }
    }

    /// Chain length stored in the head record for `node`
    ///
    /// Returns `None` when this record is not the head of `node`'s chain.
    pub fn chain_count_for(&self, rel_id: u64, node: u64) -> Result<Option<u64>> {
        if self.first_node == node {
            Ok(self.is_first_in_first_chain().then_some(self.first_prev))
        } else if self.second_node == node {
            Ok(self.is_first_in_second_chain().then_some(self.second_prev))
        } else {
            Err(self.not_attached(rel_id, node))
        }
    }

    fn not_attached(&self, rel_id: u64, node: u64) -> Error {
        tracing::warn!(
            rel_id,
            node,
            first_node = self.first_node,
            second_node = self.second_node,
            "relationship chain points at a relationship not attached to the node"
        );
        Error::invalid_record(format!(
            "Node {} is neither start nor end node of relationship {} (start: {}, end: {})",
            node, rel_id, self.first_node, self.second_node
        ))
    }
}

/// Relationship group record in groups.store (48 bytes, fixed-size)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct RelationshipGroupRecord {
    /// Flags (bit 0: in use)
    pub flags: u32,
    /// Relationship type of every chain in this group
    pub type_id: u32,
    /// Next group of the owning node
    pub next: u64,
    /// Head of the outgoing chain
    pub first_out: u64,
    /// Head of the incoming chain
    pub first_in: u64,
    /// Head of the self-loop chain
    pub first_loop: u64,
    /// Node that owns this group
    pub owning_node: u64,
}

impl Default for RelationshipGroupRecord {
    fn default() -> Self {
        Self::empty()
    }
}

impl StoreRecord for RelationshipGroupRecord {
    const STORE_NAME: &'static str = "groups.store";

    fn empty() -> Self {
        Self {
            flags: 0,
            type_id: 0,
            next: NO_ID,
            first_out: NO_ID,
            first_in: NO_ID,
            first_loop: NO_ID,
            owning_node: NO_ID,
        }
    }

    fn in_use(&self) -> bool {
        self.flags & IN_USE != 0
    }

    fn set_in_use(&mut self, in_use: bool) {
        set_flag(&mut self.flags, IN_USE, in_use);
    }
}

impl RelationshipGroupRecord {
    /// Chain head for a direction
    pub fn head(&self, direction: RelationshipDirection) -> u64 {
        match direction {
            RelationshipDirection::Outgoing => self.first_out,
            RelationshipDirection::Incoming => self.first_in,
            RelationshipDirection::Loop => self.first_loop,
        }
    }

    /// Mutable chain head for a direction
    pub fn head_mut(&mut self, direction: RelationshipDirection) -> &mut u64 {
        match direction {
            RelationshipDirection::Outgoing => &mut self.first_out,
            RelationshipDirection::Incoming => &mut self.first_in,
            RelationshipDirection::Loop => &mut self.first_loop,
        }
    }
}

/// Property record in props.store (56 bytes, fixed-size)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PropertyRecord {
    /// Flags (bit 0: in use)
    pub flags: u32,
    _padding: u32,
    /// Next property record of the owning entity
    pub next_prop: u64,
    /// Previous property record of the owning entity
    pub prev_prop: u64,
    /// Property blocks; a zero word where a header is expected ends the used region
    pub blocks: [u64; PROPERTY_BLOCKS],
}

impl Default for PropertyRecord {
    fn default() -> Self {
        Self::empty()
    }
}

impl StoreRecord for PropertyRecord {
    const STORE_NAME: &'static str = "props.store";

    fn empty() -> Self {
        Self {
            flags: 0,
            _padding: 0,
            next_prop: NO_ID,
            prev_prop: NO_ID,
            blocks: [0; PROPERTY_BLOCKS],
        }
    }

    fn in_use(&self) -> bool {
        self.flags & IN_USE != 0
    }

    fn set_in_use(&mut self, in_use: bool) {
        set_flag(&mut self.flags, IN_USE, in_use);
    }
}

impl PropertyRecord {
    /// Number of block words in use
    ///
    /// Walks property headers, so value words that happen to be zero are
    /// counted. A header that cannot be decoded marks the record full.
    pub fn used_blocks(&self) -> usize {
        let mut pos = 0;
        while pos < PROPERTY_BLOCKS && self.blocks[pos] != 0 {
            match crate::property::codec::block_count(self.blocks[pos]) {
                Ok(count) => pos += count,
                Err(_) => return PROPERTY_BLOCKS,
            }
        }
        pos.min(PROPERTY_BLOCKS)
    }

    /// Free block words at the end of the record
    pub fn free_blocks(&self) -> usize {
        PROPERTY_BLOCKS - self.used_blocks()
    }
}

/// Dynamic record in strings.store / arrays.store / labels.store (144 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DynamicRecord {
    /// Flags (bit 0: in use, bit 1: chain start)
    pub flags: u32,
    /// Bytes of `data` in use
    pub length: u32,
    /// Next fragment, or [`NO_ID`] for the terminal fragment
    pub next: u64,
    /// Fragment payload
    pub data: [u8; DYNAMIC_DATA_SIZE],
}

impl Default for DynamicRecord {
    fn default() -> Self {
        Self::empty()
    }
}

impl StoreRecord for DynamicRecord {
    const STORE_NAME: &'static str = "dynamic.store";

    fn empty() -> Self {
        Self {
            flags: 0,
            length: 0,
            next: NO_ID,
            data: [0; DYNAMIC_DATA_SIZE],
        }
    }

    fn in_use(&self) -> bool {
        self.flags & IN_USE != 0
    }

    fn set_in_use(&mut self, in_use: bool) {
        set_flag(&mut self.flags, IN_USE, in_use);
    }
}

impl DynamicRecord {
    /// Build an in-use fragment holding `bytes`
    pub fn fragment(bytes: &[u8], next: u64, start: bool) -> Result<Self> {
        if bytes.len() > DYNAMIC_DATA_SIZE {
            return Err(Error::storage(format!(
                "dynamic fragment of {} bytes exceeds {}",
                bytes.len(),
                DYNAMIC_DATA_SIZE
            )));
        }
        let mut record = Self::empty();
        record.set_in_use(true);
        set_flag(&mut record.flags, DYNAMIC_START, start);
        record.length = bytes.len() as u32;
        record.next = next;
        record.data[..bytes.len()].copy_from_slice(bytes);
        Ok(record)
    }

    /// Whether this is the first fragment of a chain
    pub fn is_start(&self) -> bool {
        self.flags & DYNAMIC_START != 0
    }

    /// Payload bytes in use
    pub fn payload(&self) -> &[u8] {
        let len = (self.length as usize).min(DYNAMIC_DATA_SIZE);
        &self.data[..len]
    }
}

fn set_flag(flags: &mut u32, bit: u32, on: bool) {
    if on {
        *flags |= bit;
    } else {
        *flags &= !bit;
    }
}
