//! Schema cache readers racing a writer

mod common;

use kestrel_core::schema::{
    ConstraintRule, ConstraintType, EntityChange, EntityType, IndexRule, IndexType, SchemaCache,
    SchemaDescriptor, SchemaRule,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

const RULES: u64 = 300;

fn index(id: u64) -> SchemaRule {
    SchemaRule::Index(IndexRule {
        id,
        name: format!("index_{}", id),
        schema: SchemaDescriptor::for_label((id % 17) as u32, [(id % 5) as u32]),
        index_type: IndexType::Range,
        owning_constraint: None,
    })
}

fn constraint(id: u64) -> SchemaRule {
    SchemaRule::Constraint(ConstraintRule {
        id,
        name: format!("constraint_{}", id),
        schema: SchemaDescriptor::for_relationship_type(id as u32, [1]),
        constraint_type: ConstraintType::Existence,
        owned_index: None,
    })
}

#[test]
fn test_readers_never_see_partial_snapshots() {
    common::init_tracing();
    let cache = SchemaCache::new();
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        scope.spawn(|| {
            for id in 0..RULES {
                let rule = if id % 3 == 0 { constraint(id) } else { index(id) };
                cache.add_rule(rule).unwrap();
            }
            done.store(true, Ordering::Release);
        });

        for _ in 0..4 {
            scope.spawn(|| {
                let mut last_len = 0;
                loop {
                    let finished = done.load(Ordering::Acquire);
                    let snapshot = cache.snapshot();
                    assert!(snapshot.len() >= last_len, "snapshots went backwards");
                    last_len = snapshot.len();

                    let indexes = snapshot.index_rules();
                    let constraints = snapshot.constraint_rules();
                    assert_eq!(indexes.len() + constraints.len(), snapshot.len());
                    for rule in &indexes {
                        let by_name = snapshot.index_by_name(&rule.name).unwrap();
                        assert_eq!(by_name.id, rule.id);
                        assert!(snapshot.has_index(rule.id));
                        assert!(
                            snapshot
                                .indexes_for_label(rule.schema.entity_token)
                                .iter()
                                .any(|r| r.id == rule.id)
                        );
                        assert!(
                            snapshot
                                .indexes_for_schema(&rule.schema)
                                .iter()
                                .any(|r| r.id == rule.id)
                        );
                        let typed = snapshot
                            .index_for_schema_and_type(&rule.schema, rule.index_type)
                            .unwrap();
                        assert_eq!(typed.schema, rule.schema);
                    }
                    for rule in &constraints {
                        assert!(snapshot.constraint_exists(&rule.descriptor()));
                        let by_name = snapshot.constraint_for_name(&rule.name).unwrap();
                        assert_eq!(by_name.id, rule.id);
                    }
                    if finished {
                        break;
                    }
                }
                assert_eq!(last_len as u64, RULES);
            });
        }
    });
}

#[test]
fn test_removal_is_atomic_for_readers() {
    let cache = SchemaCache::new();
    cache.load((0..50).map(index)).unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            for id in 0..50 {
                cache.remove_rule(id).unwrap();
            }
        });
        scope.spawn(|| {
            for _ in 0..2000 {
                let snapshot = cache.snapshot();
                let by_label: usize = (0..17).map(|l| snapshot.indexes_for_label(l).len()).sum();
                assert_eq!(by_label, snapshot.len());
                let by_property: usize = (0..5).map(|p| snapshot.indexes_for_property(p).len()).sum();
                assert_eq!(by_property, snapshot.len());
            }
        });
    });
    assert!(cache.snapshot().is_empty());
}

#[test]
fn test_failed_add_leaves_cache_unchanged() {
    let cache = SchemaCache::new();
    cache.add_rule(index(1)).unwrap();
    let before = cache.snapshot();

    let mut clash = index(2);
    if let SchemaRule::Index(rule) = &mut clash {
        rule.name = "index_1".to_string();
    }
    assert!(cache.add_rule(clash).is_err());
    assert!(cache.add_rule(index(1)).is_err());
    assert!(cache.remove_rule(99).is_err());

    let after = cache.snapshot();
    assert_eq!(after.len(), before.len());
    assert!(!after.has_index(2));
}

fn named_index(id: u64, name: &str, schema: SchemaDescriptor, index_type: IndexType) -> SchemaRule {
    SchemaRule::Index(IndexRule {
        id,
        name: name.to_string(),
        schema,
        index_type,
        owning_constraint: None,
    })
}

fn named_constraint(
    id: u64,
    name: &str,
    schema: SchemaDescriptor,
    constraint_type: ConstraintType,
) -> SchemaRule {
    SchemaRule::Constraint(ConstraintRule {
        id,
        name: name.to_string(),
        schema,
        constraint_type,
        owned_index: None,
    })
}

fn people_and_companies() -> SchemaCache {
    let cache = SchemaCache::new();
    cache
        .load(vec![
            named_index(1, "person_name", SchemaDescriptor::for_label(1, [10]), IndexType::Range),
            named_index(2, "person_name_text", SchemaDescriptor::for_label(1, [10]), IndexType::Text),
            named_index(3, "person_name_email", SchemaDescriptor::for_label(1, [10, 11]), IndexType::Range),
            named_index(4, "company_name", SchemaDescriptor::for_label(2, [12]), IndexType::Range),
            named_index(5, "knows_since", SchemaDescriptor::for_relationship_type(7, [10]), IndexType::Range),
            named_constraint(6, "person_email_unique", SchemaDescriptor::for_label(1, [11]), ConstraintType::Uniqueness),
            named_constraint(7, "company_name_exists", SchemaDescriptor::for_label(2, [12]), ConstraintType::Existence),
            named_constraint(8, "knows_id_unique", SchemaDescriptor::for_relationship_type(7, [13]), ConstraintType::Uniqueness),
            named_constraint(9, "city_key", SchemaDescriptor::for_label(3, [10]), ConstraintType::NodeKey),
        ])
        .unwrap();
    cache
}

fn ids<T>(rules: &[std::sync::Arc<T>], id: impl Fn(&T) -> u64) -> Vec<u64> {
    rules.iter().map(|rule| id(rule)).collect()
}

#[test]
fn test_lookups_by_name_type_and_id() {
    let cache = people_and_companies();
    let person_name = SchemaDescriptor::for_label(1, [10]);

    assert_eq!(ids(&cache.indexes_for_schema(&person_name), |r| r.id), vec![1, 2]);
    let typed = |t| cache.index_for_schema_and_type(&person_name, t).map(|r| r.id);
    assert_eq!(typed(IndexType::Range), Some(1));
    assert_eq!(typed(IndexType::Text), Some(2));
    assert_eq!(typed(IndexType::Point), None);

    assert_eq!(cache.constraint_for_name("person_email_unique").map(|r| r.id), Some(6));
    assert!(cache.constraint_for_name("person_name").is_none());
    assert_eq!(cache.index(3).map(|r| r.schema.property_keys.clone()), Some(vec![10, 11]));
    assert!(cache.index(6).is_none());
    assert_eq!(
        cache.constraint(7).map(|r| r.constraint_type),
        Some(ConstraintType::Existence)
    );
    assert!(cache.constraint(1).is_none());
    assert_eq!(ids(&cache.constraints_for_relationship_type(7), |r| r.id), vec![8]);

    cache.remove_rule(6).unwrap();
    assert!(cache.constraint_for_name("person_email_unique").is_none());
    let clash = named_constraint(
        20,
        "city_key",
        SchemaDescriptor::for_label(4, [1]),
        ConstraintType::Uniqueness,
    );
    assert!(cache.add_rule(clash).unwrap_err().is_logic_error());
}

#[test]
fn test_rules_related_to_entity_changes() {
    let cache = people_and_companies();
    let node = |changed: &'static [u32], unchanged: &'static [u32], properties: &'static [u32]| {
        EntityChange {
            entity_type: EntityType::Node,
            changed_tokens: changed,
            unchanged_tokens: unchanged,
            properties,
            properties_complete: false,
        }
    };

    // only a label changed: everything on that label
    let change = node(&[1], &[], &[]);
    assert_eq!(ids(&cache.indexes_related_to(&change), |r| r.id), vec![1, 2, 3]);
    assert_eq!(ids(&cache.uniqueness_constraints_related_to(&change), |r| r.id), vec![6]);

    // only properties changed: rules on kept labels that cover a changed key
    let change = node(&[], &[1, 2], &[11]);
    assert_eq!(ids(&cache.indexes_related_to(&change), |r| r.id), vec![3]);
    assert_eq!(ids(&cache.uniqueness_constraints_related_to(&change), |r| r.id), vec![6]);

    // both changed
    let change = node(&[3], &[1], &[12]);
    assert!(cache.indexes_related_to(&change).is_empty());
    assert_eq!(ids(&cache.uniqueness_constraints_related_to(&change), |r| r.id), vec![9]);

    // the full key set: a rule matches when every one of its keys is present
    let change = EntityChange {
        properties_complete: true,
        ..node(&[1, 2], &[], &[10, 12])
    };
    assert_eq!(ids(&cache.indexes_related_to(&change), |r| r.id), vec![1, 2, 4]);
    assert!(cache.uniqueness_constraints_related_to(&change).is_empty());

    let change = EntityChange {
        entity_type: EntityType::Relationship,
        ..node(&[7], &[], &[])
    };
    assert_eq!(ids(&cache.indexes_related_to(&change), |r| r.id), vec![5]);
    assert_eq!(ids(&cache.uniqueness_constraints_related_to(&change), |r| r.id), vec![8]);
}

#[test]
fn test_has_related_schema() {
    let cache = people_and_companies();
    assert!(cache.has_related_schema(&[1], 11, EntityType::Node));
    assert!(!cache.has_related_schema(&[2], 10, EntityType::Node));
    // node key constraints count
    assert!(cache.has_related_schema(&[3], 10, EntityType::Node));
    assert!(!cache.has_related_schema(&[5], 12, EntityType::Node));
    assert!(cache.has_related_schema(&[7], 13, EntityType::Relationship));
    assert!(!cache.has_related_schema(&[7], 13, EntityType::Node));

    assert!(cache.has_related_schema_for_token(2, EntityType::Node));
    assert!(cache.has_related_schema_for_token(3, EntityType::Node));
    assert!(!cache.has_related_schema_for_token(4, EntityType::Node));
    assert!(cache.has_related_schema_for_token(7, EntityType::Relationship));
    assert!(!cache.has_related_schema_for_token(1, EntityType::Relationship));
}
