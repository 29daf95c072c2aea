//! Transaction state overlay
//!
//! Pending, transaction-local changes that cursors merge over the committed
//! store. Cursors query the provider on every call instead of caching, since
//! the owning transaction may keep writing between reads of one statement.

use crate::property::Value;
use parking_lot::RwLock;
use roaring::RoaringTreemap;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Debug;

/// A node or relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityId {
    /// Node id
    Node(u64),
    /// Relationship id
    Relationship(u64),
}

/// Endpoints and type of a relationship created in the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipData {
    /// Relationship type id
    pub type_id: u32,
    /// Start node
    pub start_node: u64,
    /// End node
    pub end_node: u64,
}

/// What the transaction did to one stored property
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyChange {
    /// Not touched; the stored value stands
    Unchanged,
    /// Removed in the transaction
    Removed,
    /// Replaced in the transaction
    Changed(Value),
}

/// Labels added and removed on one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelDiff {
    /// Labels added in the transaction
    pub added: BTreeSet<u32>,
    /// Labels removed in the transaction
    pub removed: BTreeSet<u32>,
}

impl LabelDiff {
    /// Apply this diff to a stored label set, returning sorted labels
    pub fn apply(&self, stored: &[u32]) -> Vec<u32> {
        let mut labels: BTreeSet<u32> = stored
            .iter()
            .copied()
            .filter(|l| !self.removed.contains(l))
            .collect();
        labels.extend(self.added.iter().copied());
        labels.into_iter().collect()
    }
}

/// Read view of a transaction's pending changes
pub trait TransactionState: Send + Sync + Debug {
    /// Whether `entity` was created in the transaction
    fn is_added(&self, entity: EntityId) -> bool;

    /// Whether `entity` was deleted in the transaction
    fn is_deleted(&self, entity: EntityId) -> bool;

    /// Nodes created in the transaction, ascending
    fn added_nodes(&self) -> Vec<u64>;

    /// Relationships created in the transaction, ascending
    fn added_relationships(&self) -> Vec<u64>;

    /// Relationships deleted in the transaction, ascending
    fn deleted_relationships(&self) -> Vec<u64>;

    /// Data of a relationship created in the transaction
    fn added_relationship(&self, id: u64) -> Option<RelationshipData>;

    /// Created relationships with `node` as an endpoint, ascending by id
    fn added_relationships_of(&self, node: u64) -> Vec<(u64, RelationshipData)>;

    /// Change to a property that may exist in the store
    fn property_change(&self, entity: EntityId, key: u32) -> PropertyChange;

    /// Properties that exist only in the transaction, ascending by key
    fn added_properties(&self, entity: EntityId) -> Vec<(u32, Value)>;

    /// Label changes on `node`
    fn label_diff(&self, node: u64) -> LabelDiff;
}

#[derive(Debug, Clone, Default)]
struct PropertyDiff {
    added: BTreeMap<u32, Value>,
    changed: BTreeMap<u32, Value>,
    removed: BTreeSet<u32>,
}

#[derive(Debug, Default)]
struct TxStateInner {
    added_nodes: RoaringTreemap,
    deleted_nodes: RoaringTreemap,
    added_relationships: RoaringTreemap,
    deleted_relationships: RoaringTreemap,
    relationship_data: HashMap<u64, RelationshipData>,
    properties: HashMap<EntityId, PropertyDiff>,
    labels: HashMap<u64, LabelDiff>,
}

impl TxStateInner {
    fn ids(&self, entity: EntityId) -> (&RoaringTreemap, &RoaringTreemap, u64) {
        match entity {
            EntityId::Node(id) => (&self.added_nodes, &self.deleted_nodes, id),
            EntityId::Relationship(id) => {
                (&self.added_relationships, &self.deleted_relationships, id)
            }
        }
    }
}

/// In-memory transaction state
///
/// Writes go through `&self` so the state can be shared with open cursors
/// while the transaction keeps changing it.
#[derive(Debug, Default)]
pub struct TxState {
    inner: RwLock<TxStateInner>,
}

impl TxState {
    /// Empty transaction state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node created in the transaction
    pub fn create_node(&self, id: u64) {
        let mut inner = self.inner.write();
        inner.added_nodes.insert(id);
        inner.deleted_nodes.remove(id);
    }

    /// Record a node deletion; a node created in the same transaction vanishes
    pub fn delete_node(&self, id: u64) {
        let mut inner = self.inner.write();
        if !inner.added_nodes.remove(id) {
            inner.deleted_nodes.insert(id);
        }
        inner.properties.remove(&EntityId::Node(id));
        inner.labels.remove(&id);
    }

    /// Record a relationship created in the transaction
    pub fn create_relationship(&self, id: u64, data: RelationshipData) {
        let mut inner = self.inner.write();
        inner.added_relationships.insert(id);
        inner.deleted_relationships.remove(id);
        inner.relationship_data.insert(id, data);
    }

    /// Record a relationship deletion
    pub fn delete_relationship(&self, id: u64) {
        let mut inner = self.inner.write();
        if inner.added_relationships.remove(id) {
            inner.relationship_data.remove(&id);
        } else {
            inner.deleted_relationships.insert(id);
        }
        inner.properties.remove(&EntityId::Relationship(id));
    }

    /// Add a property the store does not have
    pub fn add_property(&self, entity: EntityId, key: u32, value: Value) {
        let mut inner = self.inner.write();
        let diff = inner.properties.entry(entity).or_default();
        if diff.removed.remove(&key) {
            diff.changed.insert(key, value);
        } else {
            diff.added.insert(key, value);
        }
    }

    /// Replace a property the store has
    pub fn change_property(&self, entity: EntityId, key: u32, value: Value) {
        let mut inner = self.inner.write();
        let diff = inner.properties.entry(entity).or_default();
        if let Some(added) = diff.added.get_mut(&key) {
            *added = value;
            return;
        }
        diff.removed.remove(&key);
        diff.changed.insert(key, value);
    }

    /// Remove a property
    pub fn remove_property(&self, entity: EntityId, key: u32) {
        let mut inner = self.inner.write();
        let diff = inner.properties.entry(entity).or_default();
        if diff.added.remove(&key).is_some() {
            return;
        }
        diff.changed.remove(&key);
        diff.removed.insert(key);
    }

    /// Add a label to a node
    pub fn add_label(&self, node: u64, label: u32) {
        let mut inner = self.inner.write();
        let diff = inner.labels.entry(node).or_default();
        if !diff.removed.remove(&label) {
            diff.added.insert(label);
        }
    }

    /// Remove a label from a node
    pub fn remove_label(&self, node: u64, label: u32) {
        let mut inner = self.inner.write();
        let diff = inner.labels.entry(node).or_default();
        if !diff.added.remove(&label) {
            diff.removed.insert(label);
        }
    }

    /// Whether the transaction has changed anything
    pub fn has_changes(&self) -> bool {
        let inner = self.inner.read();
        !(inner.added_nodes.is_empty()
            && inner.deleted_nodes.is_empty()
            && inner.added_relationships.is_empty()
            && inner.deleted_relationships.is_empty()
            && inner.properties.values().all(|d| {
                d.added.is_empty() && d.changed.is_empty() && d.removed.is_empty()
            })
            && inner
                .labels
                .values()
                .all(|d| d.added.is_empty() && d.removed.is_empty()))
    }
}

impl TransactionState for TxState {
    fn is_added(&self, entity: EntityId) -> bool {
        let inner = self.inner.read();
        let (added, _, id) = inner.ids(entity);
        added.contains(id)
    }

    fn is_deleted(&self, entity: EntityId) -> bool {
        let inner = self.inner.read();
        let (_, deleted, id) = inner.ids(entity);
        deleted.contains(id)
    }

    fn added_nodes(&self) -> Vec<u64> {
        self.inner.read().added_nodes.iter().collect()
    }

    fn added_relationships(&self) -> Vec<u64> {
        self.inner.read().added_relationships.iter().collect()
    }

    fn deleted_relationships(&self) -> Vec<u64> {
        self.inner.read().deleted_relationships.iter().collect()
    }

    fn added_relationship(&self, id: u64) -> Option<RelationshipData> {
        self.inner.read().relationship_data.get(&id).copied()
    }

    fn added_relationships_of(&self, node: u64) -> Vec<(u64, RelationshipData)> {
        let inner = self.inner.read();
        inner
            .added_relationships
            .iter()
            .filter_map(|id| {
                let data = inner.relationship_data.get(&id)?;
                (data.start_node == node || data.end_node == node).then_some((id, *data))
            })
            .collect()
    }

    fn property_change(&self, entity: EntityId, key: u32) -> PropertyChange {
        let inner = self.inner.read();
        match inner.properties.get(&entity) {
            Some(diff) if diff.removed.contains(&key) => PropertyChange::Removed,
            Some(diff) => match diff.changed.get(&key) {
                Some(value) => PropertyChange::Changed(value.clone()),
                None => PropertyChange::Unchanged,
            },
            None => PropertyChange::Unchanged,
        }
    }

    fn added_properties(&self, entity: EntityId) -> Vec<(u32, Value)> {
        self.inner
            .read()
            .properties
            .get(&entity)
            .map(|diff| diff.added.iter().map(|(k, v)| (*k, v.clone())).collect())
            .unwrap_or_default()
    }

    fn label_diff(&self, node: u64) -> LabelDiff {
        self.inner.read().labels.get(&node).cloned().unwrap_or_default()
    }
}
