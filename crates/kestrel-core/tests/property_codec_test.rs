//! Property values survive the trip through property records and the
//! dynamic string and array stores

mod common;

use chrono::NaiveDate;
use kestrel_core::property::{ArrayValue, CoordinateSystem, Point, PropertyType, TemporalValue};
use kestrel_core::testing::setup_test_reader;
use kestrel_core::Value;
use proptest::prelude::*;

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i8>().prop_map(Value::Byte),
        any::<i16>().prop_map(Value::Short),
        any::<char>().prop_map(Value::Char),
        any::<i32>().prop_map(Value::Int),
        any::<i64>().prop_map(Value::Long),
        (-1.0e6f32..1.0e6f32).prop_map(Value::Float),
        (-1.0e12f64..1.0e12f64).prop_map(Value::Double),
        "\\PC{0,120}".prop_map(Value::String),
        proptest::collection::vec(any::<i64>(), 0..40).prop_map(|v| Value::Array(ArrayValue::Long(v))),
        proptest::collection::vec(any::<bool>(), 0..70).prop_map(|v| Value::Array(ArrayValue::Bool(v))),
        proptest::collection::vec("[a-z]{0,12}", 0..6).prop_map(|v| Value::Array(ArrayValue::String(v))),
        (-180.0f64..180.0, -90.0f64..90.0)
            .prop_map(|(x, y)| Value::Point(Point::new_2d(x, y, CoordinateSystem::WGS84))),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_node_properties_round_trip(
        values in proptest::collection::vec(value_strategy(), 1..8)
    ) {
        let (reader, fixture, _ctx) = setup_test_reader().unwrap();
        let node = fixture.create_node(&[]).unwrap();
        for (key, value) in values.iter().enumerate() {
            fixture.set_node_property(node, key as u32, value.clone()).unwrap();
        }

        let mut cursor = reader.node_properties(node, None).unwrap();
        let mut read = Vec::new();
        while cursor.next().unwrap() {
            read.push((cursor.property_key().unwrap(), cursor.value().unwrap()));
        }
        read.sort_by_key(|(key, _)| *key);
        let want: Vec<(u32, Value)> = values
            .into_iter()
            .enumerate()
            .map(|(key, value)| (key as u32, value))
            .collect();
        prop_assert_eq!(read, want);
    }
}

#[test]
fn test_single_property_lookup() {
    common::init_tracing();
    let (reader, fixture, _ctx) = setup_test_reader().unwrap();
    let node = fixture.create_node(&[]).unwrap();
    fixture.set_node_property(node, 1, Value::from("short")).unwrap();
    fixture
        .set_node_property(node, 2, Value::String("long ".repeat(40)))
        .unwrap();
    fixture.set_node_property(node, 3, Value::Long(i64::MIN)).unwrap();

    assert_eq!(reader.node_property(node, 1, None).unwrap(), Some(Value::from("short")));
    assert_eq!(
        reader.node_property(node, 2, None).unwrap(),
        Some(Value::String("long ".repeat(40)))
    );
    assert_eq!(reader.node_property(node, 3, None).unwrap(), Some(Value::Long(i64::MIN)));
    assert_eq!(reader.node_property(node, 4, None).unwrap(), None);
}

#[test]
fn test_stored_type_distinguishes_inline_and_dynamic_strings() {
    let (reader, fixture, _ctx) = setup_test_reader().unwrap();
    let node = fixture.create_node(&[]).unwrap();
    fixture.set_node_property(node, 1, Value::from("abc")).unwrap();
    fixture
        .set_node_property(node, 2, Value::String("z".repeat(300)))
        .unwrap();

    let mut cursor = reader.node_properties(node, None).unwrap();
    let mut types = Vec::new();
    while cursor.next().unwrap() {
        types.push((cursor.property_key().unwrap(), cursor.stored_type().unwrap()));
    }
    types.sort_by_key(|(key, _)| *key);
    assert_eq!(
        types,
        vec![
            (1, Some(PropertyType::ShortString)),
            (2, Some(PropertyType::String))
        ]
    );
}

#[test]
fn test_temporal_and_spatial_values() {
    let (reader, fixture, _ctx) = setup_test_reader().unwrap();
    let rel_start = fixture.create_node(&[]).unwrap();
    let rel_end = fixture.create_node(&[]).unwrap();
    let rel = fixture.create_relationship(rel_start, rel_end, 0).unwrap();

    let date = Value::Temporal(TemporalValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
    let duration = Value::Temporal(TemporalValue::Duration {
        months: 14,
        days: -3,
        seconds: 3600,
        nanos: 500,
    });
    let point = Value::Point(Point::new_3d(1.5, -2.25, 8.0, CoordinateSystem::Cartesian));
    fixture.set_relationship_property(rel, 10, date.clone()).unwrap();
    fixture.set_relationship_property(rel, 11, duration.clone()).unwrap();
    fixture.set_relationship_property(rel, 12, point.clone()).unwrap();

    assert_eq!(reader.relationship_property(rel, 10, None).unwrap(), Some(date));
    assert_eq!(reader.relationship_property(rel, 11, None).unwrap(), Some(duration));
    assert_eq!(reader.relationship_property(rel, 12, None).unwrap(), Some(point));
}

#[test]
fn test_many_properties_span_several_records() {
    let (reader, fixture, _ctx) = setup_test_reader().unwrap();
    let node = fixture.create_node(&[]).unwrap();
    for key in 0..25u32 {
        fixture.set_node_property(node, key, Value::Long(key as i64 * 1_000_003)).unwrap();
    }
    let mut cursor = reader.node_properties(node, None).unwrap();
    let mut keys = Vec::new();
    while cursor.next().unwrap() {
        assert_eq!(cursor.value().unwrap(), Value::Long(cursor.property_key().unwrap() as i64 * 1_000_003));
        keys.push(cursor.property_key().unwrap());
    }
    keys.sort_unstable();
    assert_eq!(keys, (0..25).collect::<Vec<_>>());
}
