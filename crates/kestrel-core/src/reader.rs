//! Store reader facade
//!
//! Entry point for higher layers: hands out pooled cursors, applies the
//! short-lived entity lock around property reads, and answers degree and
//! existence questions with an optional transaction overlay.

use crate::config::EngineConfig;
use crate::cursor::{
    CursorPool, Direction, NodeCursor, PoolStats, Pooled, PropertyCursor, RelationshipCursor,
    RelationshipGroupCursor,
};
use crate::degree::DegreeCounter;
use crate::property::Value;
use crate::storage::records::{NO_ID, NodeRecord, RelationshipRecord, StoreRecord};
use crate::storage::{LockService, NoOpLockService, RecordStores, ResourceId, RowLockService};
use crate::txstate::{EntityId, TransactionState};
use crate::Result;
use std::path::Path;
use std::sync::Arc;

/// Transaction view passed to reader calls
pub type TxView = Option<Arc<dyn TransactionState>>;

/// Statistics of every cursor pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderPoolStats {
    /// Node cursor pool
    pub nodes: PoolStats,
    /// Relationship cursor pool
    pub relationships: PoolStats,
    /// Group cursor pool
    pub groups: PoolStats,
    /// Property cursor pool
    pub properties: PoolStats,
}

/// Read access to one set of record stores
#[derive(Debug)]
pub struct StoreReader {
    stores: Arc<RecordStores>,
    locks: Arc<dyn LockService>,
    degrees: DegreeCounter,
    node_cursors: Arc<CursorPool<NodeCursor>>,
    relationship_cursors: Arc<CursorPool<RelationshipCursor>>,
    group_cursors: Arc<CursorPool<RelationshipGroupCursor>>,
    property_cursors: Arc<CursorPool<PropertyCursor>>,
}

impl StoreReader {
    /// Open the stores under `data_dir` and build a reader over them
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use kestrel_core::{Direction, EngineConfig, StoreReader};
    ///
    /// let reader = StoreReader::open("./data", &EngineConfig::default()).unwrap();
    /// let degree = reader.degree(0, Direction::Both, None, None).unwrap();
    /// println!("node 0 has {} relationships", degree);
    /// ```
    pub fn open<P: AsRef<Path>>(data_dir: P, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let stores = Arc::new(RecordStores::open(data_dir, &config.store)?);
        Ok(Self::new(stores, config))
    }

    /// Reader over already opened stores, with the lock service the config selects
    pub fn new(stores: Arc<RecordStores>, config: &EngineConfig) -> Self {
        let locks: Arc<dyn LockService> = if config.locks.enabled {
            Arc::new(RowLockService::new(config.locks.read_timeout()))
        } else {
            Arc::new(NoOpLockService)
        };
        Self::with_lock_service(stores, config, locks)
    }

    /// Reader sharing an existing lock service with the writer side
    pub fn with_lock_service(
        stores: Arc<RecordStores>,
        config: &EngineConfig,
        locks: Arc<dyn LockService>,
    ) -> Self {
        tracing::debug!(
            min_shared_size = config.pool.min_shared_size,
            thread_local = config.pool.enable_thread_local,
            locks = ?locks,
            "store reader created"
        );
        Self {
            degrees: DegreeCounter::new(Arc::clone(&stores)),
            node_cursors: CursorPool::new(&config.pool, NodeCursor::new),
            relationship_cursors: CursorPool::new(&config.pool, RelationshipCursor::new),
            group_cursors: CursorPool::new(&config.pool, RelationshipGroupCursor::new),
            property_cursors: CursorPool::new(&config.pool, PropertyCursor::new),
            stores,
            locks,
        }
    }

    /// Underlying stores
    pub fn stores(&self) -> &Arc<RecordStores> {
        &self.stores
    }

    /// Lock service used for property reads
    pub fn lock_service(&self) -> &Arc<dyn LockService> {
        &self.locks
    }

    /// Unbound node cursor from the pool
    pub fn node_cursor(&self) -> Pooled<NodeCursor> {
        self.node_cursors.acquire()
    }

    /// Unbound relationship cursor from the pool
    pub fn relationship_cursor(&self) -> Pooled<RelationshipCursor> {
        self.relationship_cursors.acquire()
    }

    /// Unbound group cursor from the pool
    pub fn group_cursor(&self) -> Pooled<RelationshipGroupCursor> {
        self.group_cursors.acquire()
    }

    /// Unbound property cursor from the pool
    pub fn property_cursor(&self) -> Pooled<PropertyCursor> {
        self.property_cursors.acquire()
    }

    /// Cursor bound to node `id`
    pub fn single_node(&self, id: u64, tx: TxView) -> Pooled<NodeCursor> {
        let mut cursor = self.node_cursor();
        cursor.init_single(Arc::clone(&self.stores), id, tx);
        cursor
    }

    /// Cursor over every node
    pub fn all_nodes(&self, tx: TxView) -> Pooled<NodeCursor> {
        let mut cursor = self.node_cursor();
        cursor.init_scan(Arc::clone(&self.stores), tx);
        cursor
    }

    /// Cursor bound to relationship `id`
    pub fn single_relationship(&self, id: u64, tx: TxView) -> Pooled<RelationshipCursor> {
        let mut cursor = self.relationship_cursor();
        cursor.init_single(Arc::clone(&self.stores), id, tx);
        cursor
    }

    /// Cursor over every relationship
    pub fn all_relationships(&self, tx: TxView) -> Pooled<RelationshipCursor> {
        let mut cursor = self.relationship_cursor();
        cursor.init_scan(Arc::clone(&self.stores), tx);
        cursor
    }

    /// Cursor over the relationships of `node`
    pub fn relationships(
        &self,
        node: u64,
        direction: Direction,
        type_filter: Option<u32>,
        tx: TxView,
    ) -> Result<Pooled<RelationshipCursor>> {
        let mut cursor = self.relationship_cursor();
        cursor.init_node(Arc::clone(&self.stores), node, direction, type_filter, tx)?;
        Ok(cursor)
    }

    /// Cursor over the groups of `node`
    pub fn groups(&self, node: u64) -> Result<Pooled<RelationshipGroupCursor>> {
        let mut cursor = self.group_cursor();
        cursor.init(Arc::clone(&self.stores), node)?;
        Ok(cursor)
    }

    /// Properties of `node`, read under a short-lived read lock
    ///
    /// The node record is re-read once the lock is held. A node that is no
    /// longer in use, or that the transaction deleted, has no properties.
    /// The lock is released when the returned cursor is closed.
    pub fn node_properties(&self, node: u64, tx: TxView) -> Result<Pooled<PropertyCursor>> {
        self.locked_properties(EntityId::Node(node), None, tx)
    }

    /// Properties of relationship `rel`, under the same locking as nodes
    pub fn relationship_properties(&self, rel: u64, tx: TxView) -> Result<Pooled<PropertyCursor>> {
        self.locked_properties(EntityId::Relationship(rel), None, tx)
    }

    /// One property of `node`, or `None` when it has no such property
    pub fn node_property(&self, node: u64, key: u32, tx: TxView) -> Result<Option<Value>> {
        let mut cursor = self.locked_properties(EntityId::Node(node), Some(key), tx)?;
        if cursor.next()? {
            return Ok(Some(cursor.value()?));
        }
        Ok(None)
    }

    /// One property of relationship `rel`
    pub fn relationship_property(&self, rel: u64, key: u32, tx: TxView) -> Result<Option<Value>> {
        let mut cursor = self.locked_properties(EntityId::Relationship(rel), Some(key), tx)?;
        if cursor.next()? {
            return Ok(Some(cursor.value()?));
        }
        Ok(None)
    }

    fn locked_properties(
        &self,
        entity: EntityId,
        key: Option<u32>,
        tx: TxView,
    ) -> Result<Pooled<PropertyCursor>> {
        let (resource, id) = match entity {
            EntityId::Node(id) => (ResourceId::node(id), id),
            EntityId::Relationship(id) => (ResourceId::relationship(id), id),
        };
        let guard = self.locks.acquire_read(resource)?;

        let reference = if id == NO_ID {
            NO_ID
        } else {
            match entity {
                EntityId::Node(_) => {
                    let mut record = NodeRecord::empty();
                    if self.stores.nodes.read_into(id, &mut record)? {
                        record.next_prop
                    } else {
                        NO_ID
                    }
                }
                EntityId::Relationship(_) => {
                    let mut record = RelationshipRecord::empty();
                    if self.stores.relationships.read_into(id, &mut record)? {
                        record.next_prop
                    } else {
                        NO_ID
                    }
                }
            }
        };

        let mut cursor = self.property_cursor();
        let stores = Arc::clone(&self.stores);
        match key {
            Some(key) => cursor.init_single(stores, reference, entity, key, tx, Some(guard)),
            None => cursor.init(stores, reference, entity, tx, Some(guard)),
        }
        Ok(cursor)
    }

    /// Whether node `id` exists, as seen by the transaction when one is given
    pub fn node_exists(&self, id: u64, tx: TxView) -> Result<bool> {
        self.exists(EntityId::Node(id), tx)
    }

    /// Whether relationship `id` exists, as seen by the transaction when one is given
    pub fn relationship_exists(&self, id: u64, tx: TxView) -> Result<bool> {
        self.exists(EntityId::Relationship(id), tx)
    }

    fn exists(&self, entity: EntityId, tx: TxView) -> Result<bool> {
        if let Some(tx) = &tx {
            if tx.is_added(entity) {
                return Ok(true);
            }
            if tx.is_deleted(entity) {
                return Ok(false);
            }
        }
        match entity {
            EntityId::Node(id) if id != NO_ID => self.stores.nodes.is_in_use(id),
            EntityId::Relationship(id) if id != NO_ID => self.stores.relationships.is_in_use(id),
            _ => Ok(false),
        }
    }

    /// Degree of `node`, including the transaction's changes when one is given
    ///
    /// Relationships the transaction deleted are subtracted and relationships
    /// it created are added, each only when it matches the filters.
    pub fn degree(
        &self,
        node: u64,
        direction: Direction,
        type_filter: Option<u32>,
        tx: TxView,
    ) -> Result<u64> {
        let Some(tx) = tx else {
            return self.degrees.degree(node, direction, type_filter);
        };
        if tx.is_deleted(EntityId::Node(node)) {
            return Ok(0);
        }
        let stored = self.degrees.degree(node, direction, type_filter)?;

        let mut record = RelationshipRecord::empty();
        let mut removed = 0u64;
        for rel in tx.deleted_relationships() {
            if !self.stores.relationships.read_into(rel, &mut record)? {
                continue;
            }
            if record.first_node != node && record.second_node != node {
                continue;
            }
            if type_filter.is_some_and(|t| t != record.type_id) {
                continue;
            }
            if direction.matches(record.direction_from(rel, node)?) {
                removed += 1;
            }
        }

        let added = tx
            .added_relationships_of(node)
            .into_iter()
            .filter(|(_, data)| {
                type_filter.is_none_or(|t| t == data.type_id)
                    && direction.matches(data.direction_from(node))
            })
            .count() as u64;

        Ok(stored.saturating_sub(removed) + added)
    }

    /// Degree counter over committed state
    pub fn degree_counter(&self) -> &DegreeCounter {
        &self.degrees
    }

    /// Activity counters of every cursor pool
    pub fn pool_stats(&self) -> ReaderPoolStats {
        ReaderPoolStats {
            nodes: self.node_cursors.stats(),
            relationships: self.relationship_cursors.stats(),
            groups: self.group_cursors.stats(),
            properties: self.property_cursors.stats(),
        }
    }

    /// Drop every pooled cursor
    pub fn dispose(&self) {
        self.node_cursors.dispose_all();
        self.relationship_cursors.dispose_all();
        self.group_cursors.dispose_all();
        self.property_cursors.dispose_all();
    }
}
