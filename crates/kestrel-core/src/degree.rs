//! Degree counting
//!
//! Sparse nodes are counted by walking their relationship chain. Dense nodes
//! are counted from the chain-length counters kept in the head record of
//! every group chain, one read per chain whatever its length.

use crate::cursor::group::chain_count;
use crate::cursor::{Direction, RelationshipCursor, RelationshipGroupCursor};
use crate::storage::records::{NO_ID, RelationshipDirection, RelationshipRecord, StoreRecord};
use crate::storage::RecordStores;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Degree queries over committed store state
#[derive(Debug, Clone)]
pub struct DegreeCounter {
    stores: Arc<RecordStores>,
}

#[derive(Debug, Default, Clone, Copy)]
struct TypeCounts {
    outgoing: u64,
    incoming: u64,
    loops: u64,
}

impl TypeCounts {
    fn for_direction(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Outgoing => self.outgoing + self.loops,
            Direction::Incoming => self.incoming + self.loops,
            Direction::Both => self.outgoing + self.incoming + self.loops,
        }
    }
}

impl DegreeCounter {
    /// Counter over `stores`
    pub fn new(stores: Arc<RecordStores>) -> Self {
        Self { stores }
    }

    /// Relationships of `node` matching `direction` and `type_filter`
    ///
    /// Self-loops count once under every direction. A node without an
    /// in-use record has degree 0.
    pub fn degree(&self, node: u64, direction: Direction, type_filter: Option<u32>) -> Result<u64> {
        let Some(record) = self.read_node(node)? else {
            return Ok(0);
        };
        if !record.is_dense() {
            let mut cursor = RelationshipCursor::new();
            cursor.init_node(Arc::clone(&self.stores), node, direction, type_filter, None)?;
            let mut count = 0;
            while cursor.next()? {
                count += 1;
            }
            return Ok(count);
        }

        let mut total = 0;
        self.visit_dense(node, |type_id, counts| {
            if type_filter.is_none_or(|t| t == type_id) {
                total += counts.for_direction(direction);
            }
        })?;
        Ok(total)
    }

    /// Visit `(type, outgoing, incoming)` for every relationship type of `node`
    ///
    /// Self-loops are included in both the outgoing and the incoming count.
    /// Types are visited in ascending order.
    pub fn degrees(&self, node: u64, mut visitor: impl FnMut(u32, u64, u64)) -> Result<()> {
        for (type_id, counts) in self.counts_by_type(node)? {
            visitor(
                type_id,
                counts.outgoing + counts.loops,
                counts.incoming + counts.loops,
            );
        }
        Ok(())
    }

    /// Distinct relationship types of `node`, ascending
    pub fn relationship_types(&self, node: u64) -> Result<Vec<u32>> {
        Ok(self.counts_by_type(node)?.into_keys().collect())
    }

    /// Relationships in one group of a dense node, by direction
    pub fn degree_in_group(&self, node: u64, group_id: u64, direction: Direction) -> Result<u64> {
        let group = self
            .stores
            .groups
            .read_slot(group_id)?
            .ok_or_else(|| Error::not_found(format!("relationship group {}", group_id)))?;
        if group.owning_node != node {
            return Err(Error::invalid_record(format!(
                "Relationship group {} belongs to node {}, not {}",
                group_id, group.owning_node, node
            )));
        }
        let mut scratch = RelationshipRecord::empty();
        let mut count = |dir| chain_count(&self.stores.relationships, group.head(dir), node, &mut scratch);
        let counts = TypeCounts {
            outgoing: count(RelationshipDirection::Outgoing)?,
            incoming: count(RelationshipDirection::Incoming)?,
            loops: count(RelationshipDirection::Loop)?,
        };
        Ok(counts.for_direction(direction))
    }

    fn read_node(&self, node: u64) -> Result<Option<crate::storage::NodeRecord>> {
        if node == NO_ID {
            return Ok(None);
        }
        self.stores.nodes.read_slot(node)
    }

    fn counts_by_type(&self, node: u64) -> Result<BTreeMap<u32, TypeCounts>> {
        let mut by_type: BTreeMap<u32, TypeCounts> = BTreeMap::new();
        let Some(record) = self.read_node(node)? else {
            return Ok(by_type);
        };
        if record.is_dense() {
            self.visit_dense(node, |type_id, counts| {
                let entry = by_type.entry(type_id).or_default();
                entry.outgoing += counts.outgoing;
                entry.incoming += counts.incoming;
                entry.loops += counts.loops;
            })?;
            return Ok(by_type);
        }

        let mut cursor = RelationshipCursor::new();
        cursor.init_node(Arc::clone(&self.stores), node, Direction::Both, None, None)?;
        while cursor.next()? {
            let entry = by_type.entry(cursor.type_id()?).or_default();
            match cursor.direction()? {
                RelationshipDirection::Outgoing => entry.outgoing += 1,
                RelationshipDirection::Incoming => entry.incoming += 1,
                RelationshipDirection::Loop => entry.loops += 1,
            }
        }
        Ok(by_type)
    }

    fn visit_dense(&self, node: u64, mut f: impl FnMut(u32, TypeCounts)) -> Result<()> {
        let mut groups = RelationshipGroupCursor::new();
        groups.init(Arc::clone(&self.stores), node)?;
        while groups.next()? {
            let counts = TypeCounts {
                outgoing: groups.outgoing_count()?,
                incoming: groups.incoming_count()?,
                loops: groups.loop_count()?,
            };
            f(groups.type_id()?, counts);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{GraphFixture, TestContext};

    fn build(threshold: usize) -> (TestContext, GraphFixture, u64) {
        let ctx = TestContext::new();
        let fixture = GraphFixture::open_with_threshold(ctx.path(), threshold).unwrap();
        let hub = fixture.create_node(&[]).unwrap();
        let other = fixture.create_node(&[]).unwrap();
        for i in 0..5 {
            fixture.create_relationship(hub, other, i % 2).unwrap();
        }
        fixture.create_relationship(other, hub, 1).unwrap();
        fixture.create_relationship(hub, hub, 0).unwrap();
        (ctx, fixture, hub)
    }

    #[test]
    fn test_sparse_and_dense_agree() {
        let (_a, sparse, sparse_hub) = build(1000);
        let (_b, dense, dense_hub) = build(3);
        assert!(!sparse.stores().nodes.read_raw(sparse_hub).unwrap().is_dense());
        assert!(dense.stores().nodes.read_raw(dense_hub).unwrap().is_dense());

        let sparse_counter = DegreeCounter::new(sparse.stores());
        let dense_counter = DegreeCounter::new(dense.stores());
        for direction in [Direction::Outgoing, Direction::Incoming, Direction::Both] {
            for type_filter in [None, Some(0), Some(1), Some(9)] {
                assert_eq!(
                    sparse_counter.degree(sparse_hub, direction, type_filter).unwrap(),
                    dense_counter.degree(dense_hub, direction, type_filter).unwrap(),
                    "{:?} {:?}",
                    direction,
                    type_filter
                );
            }
        }
        assert_eq!(dense_counter.degree(dense_hub, Direction::Both, None).unwrap(), 7);
        assert_eq!(dense_counter.degree(dense_hub, Direction::Outgoing, None).unwrap(), 6);
        assert_eq!(dense_counter.degree(dense_hub, Direction::Incoming, None).unwrap(), 2);
    }

    #[test]
    fn test_degrees_visitor_counts_loops_both_ways() {
        let (_ctx, fixture, hub) = build(3);
        let counter = DegreeCounter::new(fixture.stores());
        let mut visited = Vec::new();
        counter
            .degrees(hub, |t, out, inc| visited.push((t, out, inc)))
            .unwrap();
        assert_eq!(visited, vec![(0, 4, 1), (1, 2, 1)]);
        assert_eq!(counter.relationship_types(hub).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_missing_node_has_no_degree() {
        let (_ctx, fixture, _) = build(3);
        let counter = DegreeCounter::new(fixture.stores());
        assert_eq!(counter.degree(1000, Direction::Both, None).unwrap(), 0);
        assert!(counter.relationship_types(NO_ID).unwrap().is_empty());
    }

    #[test]
    fn test_degree_in_group() {
        let (_ctx, fixture, hub) = build(3);
        let counter = DegreeCounter::new(fixture.stores());
        let mut groups = RelationshipGroupCursor::new();
        groups.init(fixture.stores(), hub).unwrap();
        let mut total = 0;
        while groups.next().unwrap() {
            total += counter
                .degree_in_group(hub, groups.id().unwrap(), Direction::Both)
                .unwrap();
        }
        assert_eq!(total, 7);
    }
}
