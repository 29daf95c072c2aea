//! Relationship chain traversal over sparse and dense nodes
//!
//! The same graph is built twice, once with a threshold high enough to keep
//! every node sparse and once with a threshold that turns the hub dense, and
//! every traversal must yield the same relationships in both.

mod common;

use kestrel_core::cursor::{Direction, RelationshipCursor};
use kestrel_core::testing::{GraphFixture, TestContext, setup_test_reader};
use kestrel_core::{Error, NO_ID};
use std::collections::BTreeMap;

const DIRECTIONS: [Direction; 3] = [Direction::Outgoing, Direction::Incoming, Direction::Both];

struct Star {
    _ctx: TestContext,
    fixture: GraphFixture,
    hub: u64,
    /// relationship id -> (type, start, end)
    rels: BTreeMap<u64, (u32, u64, u64)>,
}

fn build_star(threshold: usize) -> Star {
    let ctx = TestContext::new();
    let fixture = GraphFixture::open_with_threshold(ctx.path(), threshold).unwrap();
    let hub = fixture.create_node(&[1]).unwrap();
    let leaves: Vec<u64> = (0..6).map(|_| fixture.create_node(&[2]).unwrap()).collect();

    let mut rels = BTreeMap::new();
    for (i, &leaf) in leaves.iter().enumerate() {
        let type_id = (i % 3) as u32;
        let (start, end) = if i % 2 == 0 { (hub, leaf) } else { (leaf, hub) };
        let id = fixture.create_relationship(start, end, type_id).unwrap();
        rels.insert(id, (type_id, start, end));
    }
    let id = fixture.create_relationship(hub, hub, 1).unwrap();
    rels.insert(id, (1, hub, hub));
    let id = fixture.create_relationship(leaves[0], leaves[1], 0).unwrap();
    rels.insert(id, (0, leaves[0], leaves[1]));

    Star {
        _ctx: ctx,
        fixture,
        hub,
        rels,
    }
}

fn expected(star: &Star, direction: Direction, type_filter: Option<u32>) -> Vec<u64> {
    star.rels
        .iter()
        .filter(|(_, (t, start, end))| {
            if type_filter.is_some_and(|f| f != *t) {
                return false;
            }
            let hub = star.hub;
            match direction {
                Direction::Outgoing => *start == hub,
                Direction::Incoming => *end == hub,
                Direction::Both => *start == hub || *end == hub,
            }
        })
        .map(|(id, _)| *id)
        .collect()
}

#[test]
fn test_sparse_traversal_matches_model() {
    common::init_tracing();
    let star = build_star(1000);
    let stores = star.fixture.stores();
    assert!(!stores.nodes.read_raw(star.hub).unwrap().is_dense());

    for direction in DIRECTIONS {
        for type_filter in [None, Some(0), Some(1), Some(2), Some(7)] {
            assert_eq!(
                common::traverse(&stores, star.hub, direction, type_filter, None),
                expected(&star, direction, type_filter),
                "{:?} {:?}",
                direction,
                type_filter
            );
        }
    }
}

#[test]
fn test_dense_traversal_matches_model() {
    common::init_tracing();
    let star = build_star(4);
    let stores = star.fixture.stores();
    assert!(stores.nodes.read_raw(star.hub).unwrap().is_dense());

    for direction in DIRECTIONS {
        for type_filter in [None, Some(0), Some(1), Some(2), Some(7)] {
            assert_eq!(
                common::traverse(&stores, star.hub, direction, type_filter, None),
                expected(&star, direction, type_filter),
                "{:?} {:?}",
                direction,
                type_filter
            );
        }
    }
}

#[test]
fn test_loop_is_yielded_once_for_both() {
    let star = build_star(1000);
    let stores = star.fixture.stores();
    let loops: Vec<u64> = common::traverse(&stores, star.hub, Direction::Both, Some(1), None)
        .into_iter()
        .filter(|id| {
            let (_, start, end) = star.rels[id];
            start == end
        })
        .collect();
    assert_eq!(loops.len(), 1);
}

#[test]
fn test_endpoint_accessors_follow_origin() {
    let star = build_star(4);
    let mut cursor = RelationshipCursor::new();
    cursor
        .init_node(star.fixture.stores(), star.hub, Direction::Both, None, None)
        .unwrap();
    let mut seen = 0;
    while cursor.next().unwrap() {
        let (type_id, start, end) = star.rels[&cursor.id().unwrap()];
        assert_eq!(cursor.type_id().unwrap(), type_id);
        assert_eq!(cursor.source_node().unwrap(), start);
        assert_eq!(cursor.target_node().unwrap(), end);
        assert_eq!(cursor.origin_node().unwrap(), star.hub);
        let other = if start == star.hub { end } else { start };
        assert_eq!(cursor.other_node().unwrap(), other);
        seen += 1;
    }
    assert_eq!(seen, 7);
}

#[test]
fn test_unused_relationships_are_skipped_mid_chain() {
    let star = build_star(1000);
    let victim = *star.rels.keys().nth(2).unwrap();
    star.fixture.mark_relationship_unused(victim).unwrap();

    let ids = common::traverse(&star.fixture.stores(), star.hub, Direction::Both, None, None);
    let mut want = expected(&star, Direction::Both, None);
    want.retain(|id| *id != victim);
    assert_eq!(ids, want);
}

#[test]
fn test_node_without_relationships_yields_nothing() {
    let (reader, fixture, _ctx) = setup_test_reader().unwrap();
    let lonely = fixture.create_node(&[]).unwrap();
    let mut cursor = reader.relationships(lonely, Direction::Both, None, None).unwrap();
    assert!(!cursor.next().unwrap());
    assert!(!cursor.next().unwrap());
}

#[test]
fn test_missing_node_yields_nothing() {
    let (reader, _fixture, _ctx) = setup_test_reader().unwrap();
    let mut cursor = reader.relationships(NO_ID, Direction::Both, None, None).unwrap();
    assert!(!cursor.next().unwrap());
}

#[test]
fn test_accessors_require_position() {
    let star = build_star(1000);
    let mut cursor = RelationshipCursor::new();
    assert!(matches!(cursor.id(), Err(Error::InvalidState(_))));
    assert!(matches!(cursor.next(), Err(Error::InvalidState(_))));

    cursor
        .init_node(star.fixture.stores(), star.hub, Direction::Outgoing, Some(7), None)
        .unwrap();
    assert!(!cursor.next().unwrap());
    assert!(cursor.id().is_err());
    cursor.close();
    cursor.close();
}

#[test]
fn test_random_graph_traversals_match_model() -> anyhow::Result<()> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(0x6b65_7374);
    let ctx = TestContext::try_new()?;
    let fixture = GraphFixture::open_with_threshold(ctx.path(), 8)?;
    let nodes: Vec<u64> = (0..12)
        .map(|_| fixture.create_node(&[]))
        .collect::<kestrel_core::Result<_>>()?;

    let mut rels: BTreeMap<u64, (u32, u64, u64)> = BTreeMap::new();
    for _ in 0..150 {
        let start = nodes[rng.gen_range(0..nodes.len())];
        let end = nodes[rng.gen_range(0..nodes.len())];
        let type_id = rng.gen_range(0..4);
        let id = fixture.create_relationship(start, end, type_id)?;
        rels.insert(id, (type_id, start, end));
    }

    let stores = fixture.stores();
    for &node in &nodes {
        for direction in DIRECTIONS {
            for type_filter in [None, Some(rng.gen_range(0..4))] {
                let want: Vec<u64> = rels
                    .iter()
                    .filter(|(_, (t, start, end))| {
                        type_filter.is_none_or(|f| f == *t)
                            && match direction {
                                Direction::Outgoing => *start == node,
                                Direction::Incoming => *end == node,
                                Direction::Both => *start == node || *end == node,
                            }
                    })
                    .map(|(id, _)| *id)
                    .collect();
                assert_eq!(
                    common::traverse(&stores, node, direction, type_filter, None),
                    want,
                    "node {} {:?} {:?}",
                    node,
                    direction,
                    type_filter
                );
            }
        }
    }
    Ok(())
}
