//! Relationship cursor
//!
//! Walks relationships by id, by full scan, or along the chains of one node.
//! A sparse node has a single chain threaded through its relationships; a
//! dense node has a chain of groups, one per relationship type, each holding
//! separate outgoing, incoming and loop chains.

use super::progression::{DenseGroupWalk, Progression, cycle};
use super::pool::PoolableCursor;
use super::{CursorState, Direction};
use crate::storage::records::{
    NO_ID, NodeRecord, RelationshipDirection, RelationshipGroupRecord, RelationshipRecord,
    StoreRecord,
};
use crate::storage::RecordStores;
use crate::txstate::{EntityId, RelationshipData, TransactionState};
use crate::{Error, Result};
use std::collections::VecDeque;
use std::sync::Arc;

const NAME: &str = "RelationshipCursor";

/// Cursor over relationship records
///
/// With a transaction attached, relationships deleted in it are skipped and
/// relationships created in it are yielded after the committed ones.
#[derive(Debug, Default)]
pub struct RelationshipCursor {
    stores: Option<Arc<RecordStores>>,
    tx: Option<Arc<dyn TransactionState>>,
    progression: Progression,
    state: CursorState,
    record: RelationshipRecord,
    group: RelationshipGroupRecord,
    id: u64,
    origin: Option<u64>,
    direction: Option<Direction>,
    type_filter: Option<u32>,
    added: VecDeque<(u64, RelationshipData)>,
    transient: bool,
}

impl RelationshipCursor {
    /// Unbound cursor
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to relationship `id`
    pub fn init_single(
        &mut self,
        stores: Arc<RecordStores>,
        id: u64,
        tx: Option<Arc<dyn TransactionState>>,
    ) {
        self.bind(stores, tx);
        if id == NO_ID {
            return;
        }
        if let Some(data) = self.tx.as_ref().and_then(|tx| tx.added_relationship(id)) {
            self.added.push_back((id, data));
            return;
        }
        self.progression = Progression::SingleId { id };
    }

    /// Bind to every relationship in the store
    pub fn init_scan(&mut self, stores: Arc<RecordStores>, tx: Option<Arc<dyn TransactionState>>) {
        let high_id = stores.relationships.high_id();
        self.bind(stores, tx);
        self.progression = Progression::all_ids(high_id);
        if let Some(tx) = &self.tx {
            let added: Vec<(u64, RelationshipData)> = tx
                .added_relationships()
                .into_iter()
                .filter_map(|id| tx.added_relationship(id).map(|data| (id, data)))
                .collect();
            self.added.extend(added);
        }
    }

    /// Bind to the relationships of `node` that match `direction` and `type_filter`
    ///
    /// A node with no in-use record yields nothing from the store; a node
    /// created in the attached transaction yields its transaction
    /// relationships only.
    pub fn init_node(
        &mut self,
        stores: Arc<RecordStores>,
        node: u64,
        direction: Direction,
        type_filter: Option<u32>,
        tx: Option<Arc<dyn TransactionState>>,
    ) -> Result<()> {
        let mut node_record = NodeRecord::empty();
        let in_use = node != NO_ID && stores.nodes.read_into(node, &mut node_record)?;
        self.bind(stores, tx);
        self.origin = Some(node);
        self.direction = Some(direction);
        self.type_filter = type_filter;

        if in_use {
            self.progression = if node_record.is_dense() {
                Progression::DenseGroupChain(DenseGroupWalk::new(
                    node,
                    node_record.next_rel,
                    direction,
                    type_filter,
                ))
            } else {
                Progression::SparseChain {
                    origin: node,
                    next: node_record.next_rel,
                    hops: 0,
                }
            };
        }

        if let Some(tx) = &self.tx {
            let added: Vec<(u64, RelationshipData)> = tx
                .added_relationships_of(node)
                .into_iter()
                .filter(|(_, data)| {
                    type_filter.is_none_or(|t| t == data.type_id)
                        && direction.matches(data.direction_from(node))
                })
                .collect();
            self.added.extend(added);
        }
        Ok(())
    }

    fn bind(&mut self, stores: Arc<RecordStores>, tx: Option<Arc<dyn TransactionState>>) {
        self.reset();
        self.stores = Some(stores);
        self.tx = tx;
        self.state = CursorState::Initialized;
    }

    /// Advance to the next relationship; false when the selection is exhausted
    ///
    /// Fails with [`Error::InvalidRecord`] when a chain reaches a
    /// relationship that is not attached to the node being traversed.
    pub fn next(&mut self) -> Result<bool> {
        self.state.check_bound(NAME)?;
        if self.state == CursorState::Exhausted {
            return Ok(false);
        }
        let Some(stores) = self.stores.clone() else {
            return Ok(false);
        };

        let found = match self.progression {
            Progression::Done => None,
            Progression::SingleId { .. } | Progression::AllIds { .. } => self.next_scanned(&stores)?,
            Progression::SparseChain { .. } => self.next_in_sparse_chain(&stores)?,
            Progression::DenseGroupChain(_) => self.next_in_dense_chain(&stores)?,
        };
        if let Some(id) = found {
            self.id = id;
            self.transient = false;
            self.state = CursorState::Positioned;
            return Ok(true);
        }

        if let Some((id, data)) = self.added.pop_front() {
            self.record = data.to_record();
            self.id = id;
            self.transient = true;
            self.state = CursorState::Positioned;
            return Ok(true);
        }

        self.state = CursorState::Exhausted;
        Ok(false)
    }

    fn deleted_in_tx(&self, id: u64) -> bool {
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.is_deleted(EntityId::Relationship(id)))
    }

    fn next_scanned(&mut self, stores: &RecordStores) -> Result<Option<u64>> {
        while let Some(id) = self
            .progression
            .next_scan_id(|| stores.relationships.high_id())
        {
            if stores.relationships.read_into(id, &mut self.record)? && !self.deleted_in_tx(id) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    fn next_in_sparse_chain(&mut self, stores: &RecordStores) -> Result<Option<u64>> {
        let rel_high_id = stores.relationships.high_id();
        loop {
            let Progression::SparseChain { origin, next, hops } = &mut self.progression else {
                return Ok(None);
            };
            let (origin, id) = (*origin, *next);
            if id == NO_ID {
                self.progression = Progression::Done;
                return Ok(None);
            }
            *hops += 1;
            if *hops > rel_high_id {
                return Err(cycle(origin));
            }

            let in_use = stores.relationships.read_into(id, &mut self.record)?;
            *next = self.record.next_for(id, origin)?;
            if !in_use {
                tracing::trace!(rel_id = id, node = origin, "skipping unused relationship in chain");
                continue;
            }
            if self.matches(id, origin)? {
                return Ok(Some(id));
            }
        }
    }

    fn next_in_dense_chain(&mut self, stores: &RecordStores) -> Result<Option<u64>> {
        let rel_high_id = stores.relationships.high_id();
        loop {
            let Progression::DenseGroupChain(walk) = &mut self.progression else {
                return Ok(None);
            };
            let origin = walk.origin();
            let Some(id) = walk.next_relationship(&stores.groups, &mut self.group, rel_high_id)?
            else {
                self.progression = Progression::Done;
                return Ok(None);
            };

            let in_use = stores.relationships.read_into(id, &mut self.record)?;
            walk.follow(self.record.next_for(id, origin)?);
            if !in_use {
                tracing::trace!(rel_id = id, node = origin, "skipping unused relationship in group chain");
                continue;
            }
            if self.matches(id, origin)? {
                return Ok(Some(id));
            }
        }
    }

    fn matches(&self, id: u64, origin: u64) -> Result<bool> {
        if self.deleted_in_tx(id) {
            return Ok(false);
        }
        if self.type_filter.is_some_and(|t| t != self.record.type_id) {
            return Ok(false);
        }
        let direction = self.record.direction_from(id, origin)?;
        Ok(self.direction.is_none_or(|d| d.matches(direction)))
    }

    /// Id of the current relationship
    pub fn id(&self) -> Result<u64> {
        self.state.check_positioned(NAME)?;
        Ok(self.id)
    }

    /// Relationship type id
    pub fn type_id(&self) -> Result<u32> {
        self.state.check_positioned(NAME)?;
        Ok(self.record.type_id)
    }

    /// Start node
    pub fn source_node(&self) -> Result<u64> {
        self.state.check_positioned(NAME)?;
        Ok(self.record.first_node)
    }

    /// End node
    pub fn target_node(&self) -> Result<u64> {
        self.state.check_positioned(NAME)?;
        Ok(self.record.second_node)
    }

    /// Node traversed from, for cursors bound with [`init_node`](Self::init_node)
    pub fn origin_node(&self) -> Result<u64> {
        self.state.check_positioned(NAME)?;
        self.origin
            .ok_or_else(|| Error::invalid_state("RelationshipCursor is not bound to a node"))
    }

    /// The endpoint that is not the origin node (the origin itself for loops)
    pub fn other_node(&self) -> Result<u64> {
        let origin = self.origin_node()?;
        Ok(if self.record.first_node == origin {
            self.record.second_node
        } else {
            self.record.first_node
        })
    }

    /// Direction of the current relationship relative to the origin node
    pub fn direction(&self) -> Result<RelationshipDirection> {
        let origin = self.origin_node()?;
        self.record.direction_from(self.id, origin)
    }

    /// Head of the property chain
    pub fn properties_reference(&self) -> Result<u64> {
        self.state.check_positioned(NAME)?;
        Ok(self.record.next_prop)
    }

    /// Whether the current relationship exists only in the attached transaction
    pub fn is_transient(&self) -> Result<bool> {
        self.state.check_positioned(NAME)?;
        Ok(self.transient)
    }

    /// Release the store binding; safe to call in any state
    pub fn close(&mut self) {
        self.reset();
    }
}

impl PoolableCursor for RelationshipCursor {
    fn reset(&mut self) {
        self.stores = None;
        self.tx = None;
        self.progression = Progression::Done;
        self.state = CursorState::Closed;
        self.record = RelationshipRecord::empty();
        self.group = RelationshipGroupRecord::empty();
        self.id = NO_ID;
        self.origin = None;
        self.direction = None;
        self.type_filter = None;
        self.added.clear();
        self.transient = false;
    }
}

impl RelationshipData {
    /// Direction as seen from `node`, which must be an endpoint
    pub fn direction_from(&self, node: u64) -> RelationshipDirection {
        match (self.start_node == node, self.end_node == node) {
            (true, true) => RelationshipDirection::Loop,
            (true, false) => RelationshipDirection::Outgoing,
            _ => RelationshipDirection::Incoming,
        }
    }

    fn to_record(self) -> RelationshipRecord {
        let mut record = RelationshipRecord::empty();
        record.set_in_use(true);
        record.type_id = self.type_id;
        record.first_node = self.start_node;
        record.second_node = self.end_node;
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{GraphFixture, TestContext};
    use crate::txstate::TxState;

    fn collect(cursor: &mut RelationshipCursor) -> Vec<u64> {
        let mut ids = Vec::new();
        while cursor.next().unwrap() {
            ids.push(cursor.id().unwrap());
        }
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_sparse_chain_with_filters() {
        let ctx = TestContext::new();
        let fixture = GraphFixture::open(ctx.path()).unwrap();
        let a = fixture.create_node(&[]).unwrap();
        let b = fixture.create_node(&[]).unwrap();
        let out1 = fixture.create_relationship(a, b, 1).unwrap();
        let out2 = fixture.create_relationship(a, b, 2).unwrap();
        let inc = fixture.create_relationship(b, a, 1).unwrap();
        let own_loop = fixture.create_relationship(a, a, 1).unwrap();

        let mut cursor = RelationshipCursor::new();
        cursor
            .init_node(fixture.stores(), a, Direction::Outgoing, None, None)
            .unwrap();
        assert_eq!(collect(&mut cursor), vec![out1, out2, own_loop]);

        cursor
            .init_node(fixture.stores(), a, Direction::Incoming, Some(1), None)
            .unwrap();
        assert_eq!(collect(&mut cursor), vec![inc, own_loop]);

        cursor
            .init_node(fixture.stores(), a, Direction::Both, None, None)
            .unwrap();
        assert_eq!(collect(&mut cursor), vec![out1, out2, inc, own_loop]);
    }

    #[test]
    fn test_other_node_and_direction() {
        let ctx = TestContext::new();
        let fixture = GraphFixture::open(ctx.path()).unwrap();
        let a = fixture.create_node(&[]).unwrap();
        let b = fixture.create_node(&[]).unwrap();
        fixture.create_relationship(b, a, 4).unwrap();

        let mut cursor = RelationshipCursor::new();
        cursor
            .init_node(fixture.stores(), a, Direction::Both, None, None)
            .unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.other_node().unwrap(), b);
        assert_eq!(cursor.direction().unwrap(), RelationshipDirection::Incoming);
        assert_eq!(cursor.type_id().unwrap(), 4);
    }

    #[test]
    fn test_deleted_relationship_skipped_but_chain_continues() {
        let ctx = TestContext::new();
        let fixture = GraphFixture::open(ctx.path()).unwrap();
        let a = fixture.create_node(&[]).unwrap();
        let b = fixture.create_node(&[]).unwrap();
        let r1 = fixture.create_relationship(a, b, 1).unwrap();
        let r2 = fixture.create_relationship(a, b, 1).unwrap();
        let r3 = fixture.create_relationship(a, b, 1).unwrap();
        fixture.mark_relationship_unused(r2).unwrap();

        let mut cursor = RelationshipCursor::new();
        cursor
            .init_node(fixture.stores(), a, Direction::Both, None, None)
            .unwrap();
        assert_eq!(collect(&mut cursor), vec![r1, r3]);
    }

    #[test]
    fn test_foreign_relationship_in_chain_is_corruption() {
        let ctx = TestContext::new();
        let fixture = GraphFixture::open(ctx.path()).unwrap();
        let a = fixture.create_node(&[]).unwrap();
        let b = fixture.create_node(&[]).unwrap();
        let c = fixture.create_node(&[]).unwrap();
        fixture.create_relationship(a, b, 1).unwrap();
        let foreign = fixture.create_relationship(b, c, 1).unwrap();

        let mut node = fixture.stores().nodes.read_raw(a).unwrap();
        node.next_rel = foreign;
        fixture.stores().nodes.write(a, &node).unwrap();

        let mut cursor = RelationshipCursor::new();
        cursor
            .init_node(fixture.stores(), a, Direction::Both, None, None)
            .unwrap();
        let err = cursor.next().unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));
    }

    #[test]
    fn test_dense_node_traversal() {
        let ctx = TestContext::new();
        let fixture = GraphFixture::open_with_threshold(ctx.path(), 4).unwrap();
        let hub = fixture.create_node(&[]).unwrap();
        let other = fixture.create_node(&[]).unwrap();
        let mut outgoing = Vec::new();
        for i in 0..6 {
            outgoing.push(fixture.create_relationship(hub, other, i % 2).unwrap());
        }
        let incoming = fixture.create_relationship(other, hub, 1).unwrap();
        let own_loop = fixture.create_relationship(hub, hub, 0).unwrap();
        assert!(fixture.stores().nodes.read_raw(hub).unwrap().is_dense());

        let mut cursor = RelationshipCursor::new();
        cursor
            .init_node(fixture.stores(), hub, Direction::Outgoing, None, None)
            .unwrap();
        let mut expected = outgoing.clone();
        expected.push(own_loop);
        expected.sort_unstable();
        assert_eq!(collect(&mut cursor), expected);

        cursor
            .init_node(fixture.stores(), hub, Direction::Incoming, Some(1), None)
            .unwrap();
        assert_eq!(collect(&mut cursor), vec![incoming]);
    }

    #[test]
    fn test_transaction_overlay() {
        let ctx = TestContext::new();
        let fixture = GraphFixture::open(ctx.path()).unwrap();
        let a = fixture.create_node(&[]).unwrap();
        let b = fixture.create_node(&[]).unwrap();
        let r1 = fixture.create_relationship(a, b, 1).unwrap();
        let r2 = fixture.create_relationship(a, b, 1).unwrap();

        let tx = Arc::new(TxState::new());
        tx.delete_relationship(r1);
        tx.create_relationship(
            500,
            RelationshipData {
                type_id: 1,
                start_node: b,
                end_node: a,
            },
        );

        let mut cursor = RelationshipCursor::new();
        cursor
            .init_node(fixture.stores(), a, Direction::Both, None, Some(tx.clone()))
            .unwrap();
        let mut seen = Vec::new();
        while cursor.next().unwrap() {
            seen.push((cursor.id().unwrap(), cursor.is_transient().unwrap()));
        }
        assert_eq!(seen, vec![(r2, false), (500, true)]);

        cursor
            .init_node(fixture.stores(), a, Direction::Outgoing, None, Some(tx))
            .unwrap();
        assert_eq!(collect(&mut cursor), vec![r2]);
    }

    #[test]
    fn test_scan_skips_unused() {
        let ctx = TestContext::new();
        let fixture = GraphFixture::open(ctx.path()).unwrap();
        let a = fixture.create_node(&[]).unwrap();
        let r1 = fixture.create_relationship(a, a, 1).unwrap();
        let r2 = fixture.create_relationship(a, a, 1).unwrap();
        fixture.mark_relationship_unused(r1).unwrap();

        let mut cursor = RelationshipCursor::new();
        cursor.init_scan(fixture.stores(), None);
        assert_eq!(collect(&mut cursor), vec![r2]);

        cursor.init_single(fixture.stores(), r1, None);
        assert!(!cursor.next().unwrap());
    }
}
