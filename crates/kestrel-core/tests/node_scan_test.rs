//! Node scans and single-node lookups

mod common;

use kestrel_core::testing::setup_test_reader;
use kestrel_core::{Error, NO_ID};

#[test]
fn test_scan_covers_every_live_node_once() {
    common::init_tracing();
    let (reader, fixture, _ctx) = setup_test_reader().unwrap();
    let ids: Vec<u64> = (0..40).map(|i| fixture.create_node(&[i % 4]).unwrap()).collect();
    for id in ids.iter().filter(|id| *id % 7 == 3) {
        fixture.delete_node(*id).unwrap();
    }

    let mut cursor = reader.all_nodes(None);
    let mut seen = Vec::new();
    while cursor.next().unwrap() {
        seen.push(cursor.id().unwrap());
    }
    let want: Vec<u64> = ids.into_iter().filter(|id| id % 7 != 3).collect();
    assert_eq!(seen, want);
    assert!(!cursor.next().unwrap());
}

#[test]
fn test_scan_picks_up_nodes_created_while_scanning() {
    let (reader, fixture, _ctx) = setup_test_reader().unwrap();
    for _ in 0..5 {
        fixture.create_node(&[]).unwrap();
    }

    let mut cursor = reader.all_nodes(None);
    let mut count = 0;
    for _ in 0..3 {
        assert!(cursor.next().unwrap());
        count += 1;
    }
    let late = fixture.create_node(&[9]).unwrap();
    let mut last = NO_ID;
    while cursor.next().unwrap() {
        last = cursor.id().unwrap();
        count += 1;
    }
    assert_eq!(count, 6);
    assert_eq!(last, late);
}

#[test]
fn test_overflowing_label_sets() {
    let (reader, fixture, _ctx) = setup_test_reader().unwrap();
    let many: Vec<u32> = (0..20).map(|i| i * 1000 + 7).collect();
    let node = fixture.create_node(&many).unwrap();
    let few = fixture.create_node(&[2, 1]).unwrap();

    let mut cursor = reader.single_node(node, None);
    assert!(cursor.next().unwrap());
    assert_eq!(cursor.labels().unwrap(), many);
    assert!(cursor.has_label(19_007).unwrap());

    let mut cursor = reader.single_node(few, None);
    assert!(cursor.next().unwrap());
    assert_eq!(cursor.labels().unwrap(), vec![1, 2]);
}

#[test]
fn test_single_node_misses() {
    let (reader, fixture, _ctx) = setup_test_reader().unwrap();
    let node = fixture.create_node(&[]).unwrap();
    fixture.delete_node(node).unwrap();

    for id in [node, 1_000, NO_ID] {
        let mut cursor = reader.single_node(id, None);
        assert!(!cursor.next().unwrap(), "node {}", id);
        assert!(matches!(cursor.id(), Err(Error::NotFound(_))));
    }
}

#[test]
fn test_dense_flag_and_references() {
    let (reader, fixture, _ctx) = setup_test_reader().unwrap();
    let node = fixture.create_node(&[]).unwrap();
    let other = fixture.create_node(&[]).unwrap();

    let mut cursor = reader.single_node(node, None);
    assert!(cursor.next().unwrap());
    assert!(!cursor.is_dense().unwrap());
    assert_eq!(cursor.relationships_reference().unwrap(), NO_ID);
    assert_eq!(cursor.properties_reference().unwrap(), NO_ID);
    drop(cursor);

    fixture.create_relationship(node, other, 0).unwrap();
    fixture.convert_to_dense(node).unwrap();
    let mut cursor = reader.single_node(node, None);
    assert!(cursor.next().unwrap());
    assert!(cursor.is_dense().unwrap());

    let mut groups = reader.groups(node).unwrap();
    assert!(groups.next().unwrap());
    assert_eq!(groups.id().unwrap(), cursor.relationships_reference().unwrap());
    assert_eq!(groups.outgoing_count().unwrap(), 1);
    assert!(!groups.next().unwrap());
}
