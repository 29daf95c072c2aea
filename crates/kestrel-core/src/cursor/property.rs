//! Property cursor
//!
//! Walks the property chain of one node or relationship. Values are decoded
//! on demand from the current record; overflow payloads are read into a
//! buffer owned by the cursor, so a pooled cursor stops allocating once its
//! buffer has grown to the largest value it has seen.

use super::CursorState;
use super::pool::PoolableCursor;
use crate::property::{PropertyType, Value, codec};
use crate::storage::records::{NO_ID, PROPERTY_BLOCKS, PropertyRecord, StoreRecord};
use crate::storage::{EntityLockGuard, RecordStores};
use crate::txstate::{EntityId, PropertyChange, TransactionState};
use crate::{Error, Result};
use std::collections::VecDeque;
use std::sync::Arc;

const NAME: &str = "PropertyCursor";

#[derive(Debug, Clone, Default)]
enum Current {
    #[default]
    None,
    /// Property stored at this block offset of the current record
    Stored { key: u32, offset: usize },
    /// Stored property whose value the transaction replaced
    Changed { key: u32, value: Value },
    /// Property that only exists in the transaction
    Added { key: u32, value: Value },
}

/// Cursor over the properties of one entity
///
/// A cursor bound through the store reader may hold a short-lived read lock
/// on its entity; the lock is released when the cursor is closed.
#[derive(Debug, Default)]
pub struct PropertyCursor {
    stores: Option<Arc<RecordStores>>,
    tx: Option<Arc<dyn TransactionState>>,
    entity: Option<EntityId>,
    state: CursorState,
    record: PropertyRecord,
    loaded: bool,
    next_block: usize,
    next_record: u64,
    hops: u64,
    key_filter: Option<u32>,
    current: Current,
    added: VecDeque<(u32, Value)>,
    /// Whether transaction-added properties were fetched for this binding
    added_fetched: bool,
    lock: Option<EntityLockGuard>,
    scratch: Vec<u8>,
}

impl PropertyCursor {
    /// Unbound cursor
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to the property chain starting at `reference`, owned by `entity`
    ///
    /// `lock` is kept until the cursor is closed.
    pub fn init(
        &mut self,
        stores: Arc<RecordStores>,
        reference: u64,
        entity: EntityId,
        tx: Option<Arc<dyn TransactionState>>,
        lock: Option<EntityLockGuard>,
    ) {
        self.bind(stores, reference, entity, None, tx, lock);
    }

    /// Bind to the single property `key` in the chain starting at `reference`
    pub fn init_single(
        &mut self,
        stores: Arc<RecordStores>,
        reference: u64,
        entity: EntityId,
        key: u32,
        tx: Option<Arc<dyn TransactionState>>,
        lock: Option<EntityLockGuard>,
    ) {
        self.bind(stores, reference, entity, Some(key), tx, lock);
    }

    fn bind(
        &mut self,
        stores: Arc<RecordStores>,
        reference: u64,
        entity: EntityId,
        key_filter: Option<u32>,
        tx: Option<Arc<dyn TransactionState>>,
        lock: Option<EntityLockGuard>,
    ) {
        self.reset();
        self.stores = Some(stores);
        self.entity = Some(entity);
        self.key_filter = key_filter;
        self.lock = lock;
        self.next_record = reference;
        self.state = CursorState::Initialized;

        if tx.as_ref().is_some_and(|tx| tx.is_deleted(entity)) {
            self.next_record = NO_ID;
        }
        self.tx = tx;
    }

    /// Queue the transaction's added properties once the stored chain is done
    ///
    /// Read at this point rather than at bind time, so additions made after
    /// `init` are still seen.
    fn fetch_added(&mut self) {
        if self.added_fetched {
            return;
        }
        self.added_fetched = true;
        let (Some(tx), Some(entity)) = (&self.tx, self.entity) else {
            return;
        };
        if tx.is_deleted(entity) {
            return;
        }
        let key_filter = self.key_filter;
        self.added.extend(
            tx.added_properties(entity)
                .into_iter()
                .filter(|(key, _)| key_filter.is_none_or(|k| k == *key)),
        );
    }

    /// Advance to the next property
    pub fn next(&mut self) -> Result<bool> {
        self.state.check_bound(NAME)?;
        if self.state == CursorState::Exhausted {
            return Ok(false);
        }
        if let Some(current) = self.next_stored()? {
            self.current = current;
            self.state = CursorState::Positioned;
            return Ok(true);
        }
        self.fetch_added();
        if let Some((key, value)) = self.added.pop_front() {
            self.current = Current::Added { key, value };
            self.state = CursorState::Positioned;
            return Ok(true);
        }
        self.current = Current::None;
        self.state = CursorState::Exhausted;
        Ok(false)
    }

    fn next_stored(&mut self) -> Result<Option<Current>> {
        let Some(stores) = self.stores.clone() else {
            return Ok(None);
        };
        loop {
            if self.loaded {
                while self.next_block < PROPERTY_BLOCKS && self.record.blocks[self.next_block] != 0 {
                    let offset = self.next_block;
                    let header = self.record.blocks[offset];
                    self.next_block += codec::block_count(header)?;
                    if self.next_block > PROPERTY_BLOCKS {
                        return Err(Error::invalid_record(format!(
                            "Property at block {} overruns its record ({} blocks)",
                            offset, PROPERTY_BLOCKS
                        )));
                    }
                    let key = codec::key_of(header);
                    if self.key_filter.is_some_and(|k| k != key) {
                        continue;
                    }
                    match self.change(key) {
                        PropertyChange::Removed => continue,
                        PropertyChange::Changed(value) => {
                            return Ok(Some(Current::Changed { key, value }));
                        }
                        PropertyChange::Unchanged => {
                            return Ok(Some(Current::Stored { key, offset }));
                        }
                    }
                }
                self.loaded = false;
            }

            if self.next_record == NO_ID {
                return Ok(None);
            }
            self.hops += 1;
            if self.hops > stores.properties.high_id() {
                tracing::warn!(entity = ?self.entity, "property chain longer than the store");
                return Err(Error::invalid_record(format!(
                    "Cycle detected in property chain of {:?}",
                    self.entity
                )));
            }
            let id = self.next_record;
            let in_use = stores.properties.read_into(id, &mut self.record)?;
            self.next_record = self.record.next_prop;
            if !in_use {
                tracing::trace!(prop_id = id, "skipping unused property record");
                continue;
            }
            self.loaded = true;
            self.next_block = 0;
        }
    }

    fn change(&self, key: u32) -> PropertyChange {
        match (&self.tx, self.entity) {
            (Some(tx), Some(entity)) => tx.property_change(entity, key),
            _ => PropertyChange::Unchanged,
        }
    }

    /// Key of the current property
    pub fn property_key(&self) -> Result<u32> {
        self.state.check_positioned(NAME)?;
        match &self.current {
            Current::Stored { key, .. }
            | Current::Changed { key, .. }
            | Current::Added { key, .. } => Ok(*key),
            Current::None => Err(Error::invalid_state("PropertyCursor has no current property")),
        }
    }

    /// Stored type tag of the current property; `None` for transaction values
    pub fn stored_type(&self) -> Result<Option<PropertyType>> {
        self.state.check_positioned(NAME)?;
        match &self.current {
            Current::Stored { offset, .. } => {
                Ok(Some(PropertyType::of_header(self.record.blocks[*offset])?))
            }
            _ => Ok(None),
        }
    }

    /// Value of the current property
    pub fn value(&mut self) -> Result<Value> {
        self.state.check_positioned(NAME)?;
        match &self.current {
            Current::Stored { offset, .. } => {
                let stores = self
                    .stores
                    .as_ref()
                    .ok_or_else(|| Error::invalid_state("PropertyCursor has no store binding"))?;
                codec::decode(
                    &self.record.blocks[*offset..],
                    stores.as_ref(),
                    &mut self.scratch,
                )
            }
            Current::Changed { value, .. } | Current::Added { value, .. } => Ok(value.clone()),
            Current::None => Err(Error::invalid_state("PropertyCursor has no current property")),
        }
    }

    /// Whether this cursor still holds an entity lock
    pub fn holds_lock(&self) -> bool {
        self.lock.as_ref().is_some_and(|lock| lock.is_held())
    }

    /// Capacity of the overflow buffer
    pub fn scratch_capacity(&self) -> usize {
        self.scratch.capacity()
    }

    /// Release the lock and the store binding; safe to call in any state
    pub fn close(&mut self) {
        self.reset();
    }
}

impl PoolableCursor for PropertyCursor {
    fn reset(&mut self) {
        if let Some(mut lock) = self.lock.take() {
            lock.release();
        }
        self.stores = None;
        self.tx = None;
        self.entity = None;
        self.state = CursorState::Closed;
        self.record = PropertyRecord::empty();
        self.loaded = false;
        self.next_block = 0;
        self.next_record = NO_ID;
        self.hops = 0;
        self.key_filter = None;
        self.current = Current::None;
        self.added.clear();
        self.added_fetched = false;
        self.scratch.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{GraphFixture, TestContext};
    use crate::txstate::TxState;

    fn all_properties(cursor: &mut PropertyCursor) -> Vec<(u32, Value)> {
        let mut props = Vec::new();
        while cursor.next().unwrap() {
            props.push((cursor.property_key().unwrap(), cursor.value().unwrap()));
        }
        props.sort_by_key(|(k, _)| *k);
        props
    }

    #[test]
    fn test_chain_across_records() {
        let ctx = TestContext::new();
        let fixture = GraphFixture::open(ctx.path()).unwrap();
        let node = fixture.create_node(&[]).unwrap();
        let expected: Vec<(u32, Value)> = (0..10)
            .map(|k| (k, Value::Double(k as f64 * 1.5)))
            .collect();
        for (key, value) in &expected {
            fixture.set_node_property(node, *key, value.clone()).unwrap();
        }

        let reference = fixture.stores().nodes.read_raw(node).unwrap().next_prop;
        let mut cursor = PropertyCursor::new();
        cursor.init(fixture.stores(), reference, EntityId::Node(node), None, None);
        assert_eq!(all_properties(&mut cursor), expected);
    }

    #[test]
    fn test_single_key_lookup() {
        let ctx = TestContext::new();
        let fixture = GraphFixture::open(ctx.path()).unwrap();
        let node = fixture.create_node(&[]).unwrap();
        fixture.set_node_property(node, 1, Value::from("one")).unwrap();
        fixture.set_node_property(node, 2, Value::from(2i64)).unwrap();

        let reference = fixture.stores().nodes.read_raw(node).unwrap().next_prop;
        let mut cursor = PropertyCursor::new();
        cursor.init_single(fixture.stores(), reference, EntityId::Node(node), 2, None, None);
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.value().unwrap(), Value::Long(2));
        assert_eq!(cursor.stored_type().unwrap(), Some(PropertyType::Long));
        assert!(!cursor.next().unwrap());
    }

    #[test]
    fn test_transaction_overlay() {
        let ctx = TestContext::new();
        let fixture = GraphFixture::open(ctx.path()).unwrap();
        let node = fixture.create_node(&[]).unwrap();
        fixture.set_node_property(node, 1, Value::from(1i64)).unwrap();
        fixture.set_node_property(node, 2, Value::from(2i64)).unwrap();
        fixture.set_node_property(node, 3, Value::from(3i64)).unwrap();

        let tx = Arc::new(TxState::new());
        let entity = EntityId::Node(node);
        tx.remove_property(entity, 1);
        tx.change_property(entity, 2, Value::from("two"));
        tx.add_property(entity, 9, Value::Bool(true));

        let reference = fixture.stores().nodes.read_raw(node).unwrap().next_prop;
        let mut cursor = PropertyCursor::new();
        cursor.init(fixture.stores(), reference, entity, Some(tx), None);
        assert_eq!(
            all_properties(&mut cursor),
            vec![
                (2, Value::from("two")),
                (3, Value::Long(3)),
                (9, Value::Bool(true)),
            ]
        );
    }

    #[test]
    fn test_overflow_value_and_scratch_reuse() {
        let ctx = TestContext::new();
        let fixture = GraphFixture::open(ctx.path()).unwrap();
        let node = fixture.create_node(&[]).unwrap();
        let long = "kestrel ".repeat(100);
        fixture.set_node_property(node, 4, Value::from(long.as_str())).unwrap();

        let reference = fixture.stores().nodes.read_raw(node).unwrap().next_prop;
        let mut cursor = PropertyCursor::new();
        cursor.init(fixture.stores(), reference, EntityId::Node(node), None, None);
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.value().unwrap().as_str(), Some(long.as_str()));
        let capacity = cursor.scratch_capacity();
        assert!(capacity >= long.len());

        cursor.close();
        assert!(cursor.value().is_err());
        cursor.init(fixture.stores(), reference, EntityId::Node(node), None, None);
        assert!(cursor.next().unwrap());
        cursor.value().unwrap();
        assert_eq!(cursor.scratch_capacity(), capacity);
    }

    #[test]
    fn test_no_properties() {
        let ctx = TestContext::new();
        let fixture = GraphFixture::open(ctx.path()).unwrap();
        let mut cursor = PropertyCursor::new();
        cursor.init(fixture.stores(), NO_ID, EntityId::Node(0), None, None);
        assert!(!cursor.next().unwrap());
        assert!(cursor.property_key().is_err());
    }
}
