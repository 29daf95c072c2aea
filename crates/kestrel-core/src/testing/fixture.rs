//! GraphFixture - lays out records the way a committing writer would
//!
//! Tests and benches need chains with exact shapes: sparse chains with
//! head counters, dense nodes with per-type groups, property chains spanning
//! several records, deleted records that still sit in a chain. The fixture
//! writes those records directly; it is single-threaded and does no locking.
//!
//! New relationships are linked at the head of each chain, so a chain lists
//! relationships newest first.

use crate::config::EngineConfig;
use crate::property::dynamic::encode_label_buffer;
use crate::property::{DynamicAllocator, DynamicStoreKind, Value, codec};
use crate::storage::records::{
    MAX_INLINE_LABEL_ID, NO_ID, NodeRecord, PROPERTY_BLOCKS, PropertyRecord,
    RelationshipGroupRecord, RelationshipRecord, StoreRecord,
};
use crate::storage::RecordStores;
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;

/// Record writer for tests and benches
#[derive(Debug)]
pub struct GraphFixture {
    stores: Arc<RecordStores>,
    dense_threshold: usize,
}

impl GraphFixture {
    /// Open stores under `dir` with the default configuration
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open_with_config(dir, &EngineConfig::default())
    }

    /// Open stores converting nodes to dense at `threshold` relationships
    pub fn open_with_threshold<P: AsRef<Path>>(dir: P, threshold: usize) -> Result<Self> {
        let config = EngineConfig {
            dense_node_threshold: threshold,
            ..EngineConfig::default()
        };
        Self::open_with_config(dir, &config)
    }

    /// Open stores with an explicit configuration
    pub fn open_with_config<P: AsRef<Path>>(dir: P, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let stores = RecordStores::open(dir, &config.store)?;
        Ok(Self {
            stores: Arc::new(stores),
            dense_threshold: config.dense_node_threshold,
        })
    }

    /// Shared handle to the stores
    pub fn stores(&self) -> Arc<RecordStores> {
        Arc::clone(&self.stores)
    }

    /// Create a node carrying `labels`
    ///
    /// Label ids above the inline range move the whole set to the label store.
    pub fn create_node(&self, labels: &[u32]) -> Result<u64> {
        let id = self.stores.nodes.next_id();
        let mut record = NodeRecord::empty();
        record.set_in_use(true);
        self.write_labels(&mut record, labels)?;
        self.stores.nodes.write(id, &record)?;
        Ok(id)
    }

    /// Replace the labels of `node`
    pub fn set_labels(&self, node: u64, labels: &[u32]) -> Result<()> {
        let mut record = self.read_node(node)?;
        self.write_labels(&mut record, labels)?;
        self.stores.nodes.write(node, &record)
    }

    fn write_labels(&self, record: &mut NodeRecord, labels: &[u32]) -> Result<()> {
        if labels.iter().all(|&l| l <= MAX_INLINE_LABEL_ID) {
            return record.set_inline_labels(labels);
        }
        let mut sorted = labels.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let head = self
            .stores
            .allocate_chain(DynamicStoreKind::Labels, &encode_label_buffer(&sorted))?;
        record.set_label_overflow(head);
        Ok(())
    }

    /// Mark `node` unused, keeping every pointer it holds
    pub fn delete_node(&self, node: u64) -> Result<()> {
        let mut record = self.stores.nodes.read_raw(node)?;
        record.set_in_use(false);
        self.stores.nodes.write(node, &record)
    }

    /// Create a relationship and link it into both endpoints' chains
    ///
    /// An endpoint whose chain reaches the dense threshold is converted to
    /// dense storage.
    pub fn create_relationship(&self, start: u64, end: u64, type_id: u32) -> Result<u64> {
        let id = self.stores.relationships.next_id();
        let mut record = RelationshipRecord::empty();
        record.set_in_use(true);
        record.type_id = type_id;
        record.first_node = start;
        record.second_node = end;

        let mut to_convert = Vec::new();
        let start_count = self.link(id, &mut record, start)?;
        if start_count >= self.dense_threshold as u64 {
            to_convert.push(start);
        }
        if end != start {
            let end_count = self.link(id, &mut record, end)?;
            if end_count >= self.dense_threshold as u64 {
                to_convert.push(end);
            }
        }
        self.stores.relationships.write(id, &record)?;

        for node in to_convert {
            self.convert_to_dense(node)?;
        }
        Ok(id)
    }

    /// Mark relationship `rel` unused, leaving it linked in its chains
    pub fn mark_relationship_unused(&self, rel: u64) -> Result<()> {
        let mut record = self.stores.relationships.read_raw(rel)?;
        record.set_in_use(false);
        self.stores.relationships.write(rel, &record)
    }

    /// Link `record` (id `id`) at the head of `node`'s chain for it
    ///
    /// Returns the length of the sparse chain after linking, or 0 when the
    /// node is dense. The caller writes `record`.
    fn link(&self, id: u64, record: &mut RelationshipRecord, node: u64) -> Result<u64> {
        let mut node_record = self.read_node(node)?;
        if node_record.is_dense() {
            let direction = record.direction_from(id, node)?;
            let group_id = self.group_for(node, &mut node_record, record.type_id)?;
            let mut group = self.stores.groups.read_raw(group_id)?;
            let head = group.head(direction);
            self.push_front(id, record, node, head)?;
            *group.head_mut(direction) = id;
            self.stores.groups.write(group_id, &group)?;
            return Ok(0);
        }

        let head = node_record.next_rel;
        let count = self.push_front(id, record, node, head)?;
        node_record.next_rel = id;
        self.stores.nodes.write(node, &node_record)?;
        Ok(count)
    }

    /// Make `record` the new head in front of `head`, returning the new length
    fn push_front(
        &self,
        id: u64,
        record: &mut RelationshipRecord,
        node: u64,
        head: u64,
    ) -> Result<u64> {
        let mut count = 1;
        if head != NO_ID {
            let mut old = self.stores.relationships.read_raw(head)?;
            let old_count = old.chain_count_for(head, node)?.ok_or_else(|| {
                Error::invalid_record(format!("relationship {} is not a chain head", head))
            })?;
            count += old_count;
            set_side(&mut old, node, Side::Prev(id));
            set_side(&mut old, node, Side::First(false));
            self.stores.relationships.write(head, &old)?;
        }
        set_side(record, node, Side::Prev(count));
        set_side(record, node, Side::Next(head));
        set_side(record, node, Side::First(true));
        Ok(count)
    }

    /// Group of `type_id` for dense `node`, created at the head of the group chain when missing
    fn group_for(&self, node: u64, node_record: &mut NodeRecord, type_id: u32) -> Result<u64> {
        let mut group_id = node_record.next_rel;
        while group_id != NO_ID {
            let group = self.stores.groups.read_raw(group_id)?;
            if group.in_use() && group.type_id == type_id {
                return Ok(group_id);
            }
            group_id = group.next;
        }

        let id = self.stores.groups.next_id();
        let mut group = RelationshipGroupRecord::empty();
        group.set_in_use(true);
        group.type_id = type_id;
        group.owning_node = node;
        group.next = node_record.next_rel;
        self.stores.groups.write(id, &group)?;
        node_record.next_rel = id;
        self.stores.nodes.write(node, node_record)?;
        Ok(id)
    }

    /// Move the sparse chain of `node` into per-type groups
    pub fn convert_to_dense(&self, node: u64) -> Result<()> {
        let mut node_record = self.read_node(node)?;
        if node_record.is_dense() {
            return Ok(());
        }
        let mut chain = Vec::new();
        let mut next = node_record.next_rel;
        while next != NO_ID {
            let record = self.stores.relationships.read_raw(next)?;
            chain.push(next);
            next = record.next_for(next, node)?;
        }

        node_record.set_dense(true);
        node_record.next_rel = NO_ID;
        self.stores.nodes.write(node, &node_record)?;

        // oldest first, so each group chain keeps newest-first order
        for &rel in chain.iter().rev() {
            let mut record = self.stores.relationships.read_raw(rel)?;
            self.link(rel, &mut record, node)?;
            self.stores.relationships.write(rel, &record)?;
        }
        tracing::debug!(node, relationships = chain.len(), "node converted to dense");
        Ok(())
    }

    /// Add property `key` to `node`
    pub fn set_node_property(&self, node: u64, key: u32, value: Value) -> Result<()> {
        let head = self.read_node(node)?.next_prop;
        let new_head = self.add_property(head, key, &value)?;
        if new_head != head {
            let mut record = self.read_node(node)?;
            record.next_prop = new_head;
            self.stores.nodes.write(node, &record)?;
        }
        Ok(())
    }

    /// Add property `key` to relationship `rel`
    pub fn set_relationship_property(&self, rel: u64, key: u32, value: Value) -> Result<()> {
        let head = self.stores.relationships.read_raw(rel)?.next_prop;
        let new_head = self.add_property(head, key, &value)?;
        if new_head != head {
            let mut record = self.stores.relationships.read_raw(rel)?;
            record.next_prop = new_head;
            self.stores.relationships.write(rel, &record)?;
        }
        Ok(())
    }

    /// Place the encoded property in the first record with room, or a new
    /// head record; returns the chain head afterwards
    fn add_property(&self, head: u64, key: u32, value: &Value) -> Result<u64> {
        let blocks = codec::encode(key, value, self.stores.as_ref())?;
        if blocks.len() > PROPERTY_BLOCKS {
            return Err(Error::codec(format!(
                "property {} needs {} blocks",
                key,
                blocks.len()
            )));
        }

        let mut id = head;
        while id != NO_ID {
            let mut record = self.stores.properties.read_raw(id)?;
            if record.in_use() && record.free_blocks() >= blocks.len() {
                let used = record.used_blocks();
                record.blocks[used..used + blocks.len()].copy_from_slice(&blocks);
                self.stores.properties.write(id, &record)?;
                return Ok(head);
            }
            id = record.next_prop;
        }

        let id = self.stores.properties.next_id();
        let mut record = PropertyRecord::empty();
        record.set_in_use(true);
        record.next_prop = head;
        record.blocks[..blocks.len()].copy_from_slice(&blocks);
        self.stores.properties.write(id, &record)?;
        if head != NO_ID {
            let mut old = self.stores.properties.read_raw(head)?;
            old.prev_prop = id;
            self.stores.properties.write(head, &old)?;
        }
        Ok(id)
    }

    fn read_node(&self, node: u64) -> Result<NodeRecord> {
        self.stores
            .nodes
            .read_slot(node)?
            .ok_or_else(|| Error::not_found(format!("node {}", node)))
    }
}

enum Side {
    Prev(u64),
    Next(u64),
    First(bool),
}

/// Set one chain field on every side of `record` that belongs to `node`
fn set_side(record: &mut RelationshipRecord, node: u64, side: Side) {
    let first = record.first_node == node;
    let second = record.second_node == node;
    match side {
        Side::Prev(value) => {
            if first {
                record.first_prev = value;
            }
            if second {
                record.second_prev = value;
            }
        }
        Side::Next(value) => {
            if first {
                record.first_next = value;
            }
            if second {
                record.second_next = value;
            }
        }
        Side::First(flag) => {
            if first {
                record.set_first_in_first_chain(flag);
            }
            if second {
                record.set_first_in_second_chain(flag);
            }
        }
    }
}
