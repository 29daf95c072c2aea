//! Schema rule cache
//!
//! Index and constraint rules are held in an immutable [`SchemaSnapshot`]
//! published through an [`ArcSwap`]. Readers load the current snapshot with
//! one atomic operation and never block. Writers serialize on a mutex, build
//! the next snapshot from a shallow copy of the current one plus the change,
//! and swap it in.
//!
//! ```text
//!   readers ──► load() ──► Arc<SchemaSnapshot> (v1)
//!                                  │
//!   writer ──► lock ──► clone v1 ──► apply delta ──► store v2 ──► unlock
//! ```

use crate::{Error, Result};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Kind of entity a schema applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    /// Nodes, keyed by label
    Node,
    /// Relationships, keyed by relationship type
    Relationship,
}

/// Entity token plus the property keys an index or constraint covers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Node or relationship schema
    pub entity_type: EntityType,
    /// Label id or relationship type id
    pub entity_token: u32,
    /// Property key ids, in index order
    pub property_keys: Vec<u32>,
}

impl SchemaDescriptor {
    /// Schema on nodes with `label`
    pub fn for_label(label: u32, property_keys: impl Into<Vec<u32>>) -> Self {
        Self {
            entity_type: EntityType::Node,
            entity_token: label,
            property_keys: property_keys.into(),
        }
    }

    /// Schema on relationships of `type_id`
    pub fn for_relationship_type(type_id: u32, property_keys: impl Into<Vec<u32>>) -> Self {
        Self {
            entity_type: EntityType::Relationship,
            entity_token: type_id,
            property_keys: property_keys.into(),
        }
    }
}

/// Index implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    /// Ordered range index
    Range,
    /// String index
    Text,
    /// Spatial index
    Point,
    /// Full-text index
    Fulltext,
}

/// Constraint kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintType {
    /// Property values are unique
    Uniqueness,
    /// Property must exist
    Existence,
    /// Unique and existing
    NodeKey,
}

impl ConstraintType {
    /// Whether constraints of this kind are enforced through an index
    pub fn is_index_backed(self) -> bool {
        matches!(self, ConstraintType::Uniqueness | ConstraintType::NodeKey)
    }
}

/// Index rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRule {
    /// Rule id, unique across indexes and constraints
    pub id: u64,
    /// Unique name
    pub name: String,
    /// Indexed schema
    pub schema: SchemaDescriptor,
    /// Implementation
    pub index_type: IndexType,
    /// Constraint that owns this index, if any
    pub owning_constraint: Option<u64>,
}

/// Constraint rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintRule {
    /// Rule id, unique across indexes and constraints
    pub id: u64,
    /// Unique name
    pub name: String,
    /// Constrained schema
    pub schema: SchemaDescriptor,
    /// Constraint kind
    pub constraint_type: ConstraintType,
    /// Backing index, for uniqueness and node key constraints
    pub owned_index: Option<u64>,
}

impl ConstraintRule {
    /// Schema and kind, which identify a constraint independently of its id
    pub fn descriptor(&self) -> ConstraintDescriptor {
        ConstraintDescriptor {
            schema: self.schema.clone(),
            constraint_type: self.constraint_type,
        }
    }
}

/// Identity of a constraint independent of its id and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstraintDescriptor {
    /// Constrained schema
    pub schema: SchemaDescriptor,
    /// Constraint kind
    pub constraint_type: ConstraintType,
}

/// Any schema rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaRule {
    /// Index rule
    Index(IndexRule),
    /// Constraint rule
    Constraint(ConstraintRule),
}

/// What changed on one entity, for finding the rules a write may affect
///
/// With `properties_complete` set, `properties` lists every property the
/// entity has and a rule matches when the entity carries all of its keys.
/// Otherwise `properties` lists only the changed keys and matching is
/// approximate: every rule on a changed token is included, plus the rules on
/// unchanged tokens that cover a changed key.
#[derive(Debug, Clone, Copy)]
pub struct EntityChange<'a> {
    /// Node or relationship
    pub entity_type: EntityType,
    /// Labels or relationship types added or removed
    pub changed_tokens: &'a [u32],
    /// Labels or relationship types the entity keeps
    pub unchanged_tokens: &'a [u32],
    /// Property keys, changed or complete per `properties_complete`
    pub properties: &'a [u32],
    /// Whether `properties` is the entity's full key set
    pub properties_complete: bool,
}

/// Rules carrying a schema descriptor
trait SchemaBound {
    fn rule_id(&self) -> u64;
    fn schema(&self) -> &SchemaDescriptor;
}

impl SchemaBound for IndexRule {
    fn rule_id(&self) -> u64 {
        self.id
    }

    fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }
}

impl SchemaBound for ConstraintRule {
    fn rule_id(&self) -> u64 {
        self.id
    }

    fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }
}

/// Rules from `candidates` on `tokens` whose keys pass `keys_match`, by id
fn collect_matching<T: SchemaBound>(
    found: &mut BTreeMap<u64, Arc<T>>,
    candidates: &[Arc<T>],
    tokens: &[u32],
    keys_match: impl Fn(&[u32]) -> bool,
) {
    for rule in candidates {
        let schema = rule.schema();
        if tokens.contains(&schema.entity_token) && keys_match(&schema.property_keys) {
            found.insert(rule.rule_id(), Arc::clone(rule));
        }
    }
}

fn related_to<T: SchemaBound>(candidates: &[Arc<T>], change: &EntityChange<'_>) -> Vec<Arc<T>> {
    let mut found = BTreeMap::new();
    let changed_key = |keys: &[u32]| keys.iter().any(|k| change.properties.contains(k));
    if change.properties_complete {
        collect_matching(&mut found, candidates, change.changed_tokens, |keys| {
            keys.iter().all(|k| change.properties.contains(k))
        });
    } else if change.properties.is_empty() {
        collect_matching(&mut found, candidates, change.changed_tokens, |_| true);
    } else if change.changed_tokens.is_empty() {
        collect_matching(&mut found, candidates, change.unchanged_tokens, changed_key);
    } else {
        collect_matching(&mut found, candidates, change.changed_tokens, |_| true);
        collect_matching(&mut found, candidates, change.unchanged_tokens, changed_key);
    }
    found.into_values().collect()
}

impl SchemaRule {
    /// Rule id
    pub fn id(&self) -> u64 {
        match self {
            SchemaRule::Index(rule) => rule.id,
            SchemaRule::Constraint(rule) => rule.id,
        }
    }
}

/// Immutable view of every cached rule
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    indexes_by_id: HashMap<u64, Arc<IndexRule>>,
    indexes_by_schema: HashMap<SchemaDescriptor, Vec<Arc<IndexRule>>>,
    indexes_by_label: HashMap<u32, Vec<Arc<IndexRule>>>,
    indexes_by_relationship_type: HashMap<u32, Vec<Arc<IndexRule>>>,
    indexes_by_property: HashMap<u32, Vec<Arc<IndexRule>>>,
    indexes_by_name: HashMap<String, Arc<IndexRule>>,
    constraints_by_id: HashMap<u64, Arc<ConstraintRule>>,
    constraints_by_descriptor: HashMap<ConstraintDescriptor, Arc<ConstraintRule>>,
    constraints_by_name: HashMap<String, Arc<ConstraintRule>>,
}

fn push_sorted(list: &mut Vec<Arc<IndexRule>>, rule: &Arc<IndexRule>) {
    let at = list.partition_point(|r| r.id < rule.id);
    list.insert(at, Arc::clone(rule));
}

fn remove_from<K: std::hash::Hash + Eq>(
    map: &mut HashMap<K, Vec<Arc<IndexRule>>>,
    key: &K,
    id: u64,
) {
    if let Some(list) = map.get_mut(key) {
        list.retain(|r| r.id != id);
        if list.is_empty() {
            map.remove(key);
        }
    }
}

impl SchemaSnapshot {
    fn contains(&self, id: u64) -> bool {
        self.indexes_by_id.contains_key(&id) || self.constraints_by_id.contains_key(&id)
    }

    fn insert(&mut self, rule: SchemaRule) -> Result<()> {
        if self.contains(rule.id()) {
            return Err(Error::schema_rule(format!(
                "Schema rule {} is already cached",
                rule.id()
            )));
        }
        match rule {
            SchemaRule::Index(rule) => self.insert_index(rule),
            SchemaRule::Constraint(rule) => self.insert_constraint(rule),
        }
    }

    fn insert_index(&mut self, rule: IndexRule) -> Result<()> {
        if self.indexes_by_name.contains_key(&rule.name) {
            return Err(Error::schema_rule(format!(
                "An index named '{}' is already cached",
                rule.name
            )));
        }
        let rule = Arc::new(rule);
        self.indexes_by_id.insert(rule.id, Arc::clone(&rule));
        self.indexes_by_name.insert(rule.name.clone(), Arc::clone(&rule));
        push_sorted(
            self.indexes_by_schema.entry(rule.schema.clone()).or_default(),
            &rule,
        );
        let by_token = match rule.schema.entity_type {
            EntityType::Node => &mut self.indexes_by_label,
            EntityType::Relationship => &mut self.indexes_by_relationship_type,
        };
        push_sorted(by_token.entry(rule.schema.entity_token).or_default(), &rule);
        for key in &rule.schema.property_keys {
            push_sorted(self.indexes_by_property.entry(*key).or_default(), &rule);
        }
        Ok(())
    }

    fn insert_constraint(&mut self, rule: ConstraintRule) -> Result<()> {
        let descriptor = rule.descriptor();
        if self.constraints_by_descriptor.contains_key(&descriptor) {
            return Err(Error::schema_rule(format!(
                "A {:?} constraint on {:?} is already cached",
                descriptor.constraint_type, descriptor.schema
            )));
        }
        if self.constraints_by_name.contains_key(&rule.name) {
            return Err(Error::schema_rule(format!(
                "A constraint named '{}' is already cached",
                rule.name
            )));
        }
        let rule = Arc::new(rule);
        self.constraints_by_id.insert(rule.id, Arc::clone(&rule));
        self.constraints_by_name.insert(rule.name.clone(), Arc::clone(&rule));
        self.constraints_by_descriptor.insert(descriptor, rule);
        Ok(())
    }

    fn remove(&mut self, id: u64) -> Result<()> {
        if let Some(rule) = self.indexes_by_id.remove(&id) {
            self.indexes_by_name.remove(&rule.name);
            remove_from(&mut self.indexes_by_schema, &rule.schema, id);
            let by_token = match rule.schema.entity_type {
                EntityType::Node => &mut self.indexes_by_label,
                EntityType::Relationship => &mut self.indexes_by_relationship_type,
            };
            remove_from(by_token, &rule.schema.entity_token, id);
            for key in &rule.schema.property_keys {
                remove_from(&mut self.indexes_by_property, key, id);
            }
            return Ok(());
        }
        if let Some(rule) = self.constraints_by_id.remove(&id) {
            self.constraints_by_descriptor.remove(&rule.descriptor());
            self.constraints_by_name.remove(&rule.name);
            return Ok(());
        }
        Err(Error::schema_rule(format!("Schema rule {} is not cached", id)))
    }

    /// Node indexes on `label`, ascending by id
    pub fn indexes_for_label(&self, label: u32) -> Vec<Arc<IndexRule>> {
        self.indexes_by_label.get(&label).cloned().unwrap_or_default()
    }

    /// Relationship indexes on `type_id`, ascending by id
    pub fn indexes_for_relationship_type(&self, type_id: u32) -> Vec<Arc<IndexRule>> {
        self.indexes_by_relationship_type
            .get(&type_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Indexes covering property `key`, ascending by id
    pub fn indexes_for_property(&self, key: u32) -> Vec<Arc<IndexRule>> {
        self.indexes_by_property.get(&key).cloned().unwrap_or_default()
    }

    /// Lowest-id index on exactly `schema`
    pub fn index_for_schema(&self, schema: &SchemaDescriptor) -> Option<Arc<IndexRule>> {
        self.indexes_by_schema
            .get(schema)
            .and_then(|list| list.first().cloned())
    }

    /// Every index on exactly `schema`, ascending by id
    pub fn indexes_for_schema(&self, schema: &SchemaDescriptor) -> Vec<Arc<IndexRule>> {
        self.indexes_by_schema.get(schema).cloned().unwrap_or_default()
    }

    /// Index of `index_type` on exactly `schema`
    pub fn index_for_schema_and_type(
        &self,
        schema: &SchemaDescriptor,
        index_type: IndexType,
    ) -> Option<Arc<IndexRule>> {
        self.indexes_by_schema
            .get(schema)?
            .iter()
            .find(|rule| rule.index_type == index_type)
            .cloned()
    }

    /// Index by name
    pub fn index_by_name(&self, name: &str) -> Option<Arc<IndexRule>> {
        self.indexes_by_name.get(name).cloned()
    }

    /// Constraint by name
    pub fn constraint_for_name(&self, name: &str) -> Option<Arc<ConstraintRule>> {
        self.constraints_by_name.get(name).cloned()
    }

    fn indexes_for_tokens(&self, entity_type: EntityType, tokens: &[u32]) -> Vec<Arc<IndexRule>> {
        let by_token = match entity_type {
            EntityType::Node => &self.indexes_by_label,
            EntityType::Relationship => &self.indexes_by_relationship_type,
        };
        tokens
            .iter()
            .filter_map(|token| by_token.get(token))
            .flatten()
            .cloned()
            .collect()
    }

    fn index_backed_constraints(&self, entity_type: EntityType) -> Vec<Arc<ConstraintRule>> {
        self.constraints_where(|rule| {
            rule.schema.entity_type == entity_type && rule.constraint_type.is_index_backed()
        })
    }

    /// Indexes a change to one entity may need to update, ascending by id
    pub fn indexes_related_to(&self, change: &EntityChange<'_>) -> Vec<Arc<IndexRule>> {
        let mut tokens = change.changed_tokens.to_vec();
        tokens.extend_from_slice(change.unchanged_tokens);
        let candidates = self.indexes_for_tokens(change.entity_type, &tokens);
        related_to(&candidates, change)
    }

    /// Uniqueness and node key constraints a change to one entity may
    /// violate, ascending by id
    pub fn uniqueness_constraints_related_to(
        &self,
        change: &EntityChange<'_>,
    ) -> Vec<Arc<ConstraintRule>> {
        related_to(&self.index_backed_constraints(change.entity_type), change)
    }

    /// Whether an index or index-backed constraint covers `property_key` on
    /// any of `tokens`
    pub fn has_related_schema(
        &self,
        tokens: &[u32],
        property_key: u32,
        entity_type: EntityType,
    ) -> bool {
        let covers = |schema: &SchemaDescriptor| {
            tokens.contains(&schema.entity_token) && schema.property_keys.contains(&property_key)
        };
        self.indexes_for_tokens(entity_type, tokens)
            .iter()
            .any(|rule| covers(&rule.schema))
            || self
                .index_backed_constraints(entity_type)
                .iter()
                .any(|rule| covers(&rule.schema))
    }

    /// Whether any index or index-backed constraint is on `token`
    pub fn has_related_schema_for_token(&self, token: u32, entity_type: EntityType) -> bool {
        !self.indexes_for_tokens(entity_type, &[token]).is_empty()
            || self
                .index_backed_constraints(entity_type)
                .iter()
                .any(|rule| rule.schema.entity_token == token)
    }

    /// Index by rule id
    pub fn index(&self, id: u64) -> Option<Arc<IndexRule>> {
        self.indexes_by_id.get(&id).cloned()
    }

    /// Whether an index with rule id `id` is cached
    pub fn has_index(&self, id: u64) -> bool {
        self.indexes_by_id.contains_key(&id)
    }

    /// Constraints on nodes with `label`, ascending by id
    pub fn constraints_for_label(&self, label: u32) -> Vec<Arc<ConstraintRule>> {
        self.constraints_where(|rule| {
            rule.schema.entity_type == EntityType::Node && rule.schema.entity_token == label
        })
    }

    /// Constraints on relationships of `type_id`, ascending by id
    pub fn constraints_for_relationship_type(&self, type_id: u32) -> Vec<Arc<ConstraintRule>> {
        self.constraints_where(|rule| {
            rule.schema.entity_type == EntityType::Relationship
                && rule.schema.entity_token == type_id
        })
    }

    /// Constraints on exactly `schema`, ascending by id
    pub fn constraints_for_schema(&self, schema: &SchemaDescriptor) -> Vec<Arc<ConstraintRule>> {
        self.constraints_where(|rule| &rule.schema == schema)
    }

    fn constraints_where(&self, f: impl Fn(&ConstraintRule) -> bool) -> Vec<Arc<ConstraintRule>> {
        let mut rules: Vec<Arc<ConstraintRule>> = self
            .constraints_by_id
            .values()
            .filter(|rule| {
                let rule: &ConstraintRule = rule;
                f(rule)
            })
            .cloned()
            .collect();
        rules.sort_by_key(|rule| rule.id);
        rules
    }

    /// Whether a constraint matching `descriptor` is cached
    pub fn constraint_exists(&self, descriptor: &ConstraintDescriptor) -> bool {
        self.constraints_by_descriptor.contains_key(descriptor)
    }

    /// Constraint by rule id
    pub fn constraint(&self, id: u64) -> Option<Arc<ConstraintRule>> {
        self.constraints_by_id.get(&id).cloned()
    }

    /// Every index, ascending by id
    pub fn index_rules(&self) -> Vec<Arc<IndexRule>> {
        let mut rules: Vec<Arc<IndexRule>> = self.indexes_by_id.values().cloned().collect();
        rules.sort_by_key(|rule| rule.id);
        rules
    }

    /// Every constraint, ascending by id
    pub fn constraint_rules(&self) -> Vec<Arc<ConstraintRule>> {
        self.constraints_where(|_| true)
    }

    /// Number of cached rules
    pub fn len(&self) -> usize {
        self.indexes_by_id.len() + self.constraints_by_id.len()
    }

    /// Whether no rule is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Copy-on-write cache of schema rules
#[derive(Debug)]
pub struct SchemaCache {
    current: ArcSwap<SchemaSnapshot>,
    write_lock: Mutex<()>,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaCache {
    /// Empty cache
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(SchemaSnapshot::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// Replace the whole cache with `rules`
    ///
    /// Fails without changing the cache when two rules share an id, an index
    /// name or a constraint descriptor.
    pub fn load(&self, rules: impl IntoIterator<Item = SchemaRule>) -> Result<()> {
        let mut snapshot = SchemaSnapshot::default();
        for rule in rules {
            snapshot.insert(rule)?;
        }
        let _guard = self.write_lock.lock();
        tracing::info!(
            indexes = snapshot.indexes_by_id.len(),
            constraints = snapshot.constraints_by_id.len(),
            "schema cache loaded"
        );
        self.current.store(Arc::new(snapshot));
        Ok(())
    }

    /// Add one rule; fails when its id is already cached
    pub fn add_rule(&self, rule: SchemaRule) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut next = SchemaSnapshot::clone(&self.current.load());
        let id = rule.id();
        next.insert(rule)?;
        self.current.store(Arc::new(next));
        tracing::debug!(rule_id = id, "schema rule added");
        Ok(())
    }

    /// Remove one rule; fails when it is not cached
    pub fn remove_rule(&self, id: u64) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut next = SchemaSnapshot::clone(&self.current.load());
        next.remove(id)?;
        self.current.store(Arc::new(next));
        tracing::debug!(rule_id = id, "schema rule removed");
        Ok(())
    }

    /// Current snapshot, for several reads that must agree with each other
    pub fn snapshot(&self) -> Arc<SchemaSnapshot> {
        self.current.load_full()
    }

    /// Node indexes on `label`
    pub fn indexes_for_label(&self, label: u32) -> Vec<Arc<IndexRule>> {
        self.current.load().indexes_for_label(label)
    }

    /// Relationship indexes on `type_id`
    pub fn indexes_for_relationship_type(&self, type_id: u32) -> Vec<Arc<IndexRule>> {
        self.current.load().indexes_for_relationship_type(type_id)
    }

    /// Indexes covering property `key`
    pub fn indexes_for_property(&self, key: u32) -> Vec<Arc<IndexRule>> {
        self.current.load().indexes_for_property(key)
    }

    /// Lowest-id index on exactly `schema`
    pub fn index_for_schema(&self, schema: &SchemaDescriptor) -> Option<Arc<IndexRule>> {
        self.current.load().index_for_schema(schema)
    }

    /// Every index on exactly `schema`
    pub fn indexes_for_schema(&self, schema: &SchemaDescriptor) -> Vec<Arc<IndexRule>> {
        self.current.load().indexes_for_schema(schema)
    }

    /// Index of `index_type` on exactly `schema`
    pub fn index_for_schema_and_type(
        &self,
        schema: &SchemaDescriptor,
        index_type: IndexType,
    ) -> Option<Arc<IndexRule>> {
        self.current.load().index_for_schema_and_type(schema, index_type)
    }

    /// Index by name
    pub fn index_by_name(&self, name: &str) -> Option<Arc<IndexRule>> {
        self.current.load().index_by_name(name)
    }

    /// Index by rule id
    pub fn index(&self, id: u64) -> Option<Arc<IndexRule>> {
        self.current.load().index(id)
    }

    /// Whether an index with rule id `id` is cached
    pub fn has_index(&self, id: u64) -> bool {
        self.current.load().has_index(id)
    }

    /// Constraints on nodes with `label`
    pub fn constraints_for_label(&self, label: u32) -> Vec<Arc<ConstraintRule>> {
        self.current.load().constraints_for_label(label)
    }

    /// Constraints on relationships of `type_id`
    pub fn constraints_for_relationship_type(&self, type_id: u32) -> Vec<Arc<ConstraintRule>> {
        self.current.load().constraints_for_relationship_type(type_id)
    }

    /// Constraint by rule id
    pub fn constraint(&self, id: u64) -> Option<Arc<ConstraintRule>> {
        self.current.load().constraint(id)
    }

    /// Constraint by name
    pub fn constraint_for_name(&self, name: &str) -> Option<Arc<ConstraintRule>> {
        self.current.load().constraint_for_name(name)
    }

    /// Indexes a change to one entity may need to update
    pub fn indexes_related_to(&self, change: &EntityChange<'_>) -> Vec<Arc<IndexRule>> {
        self.current.load().indexes_related_to(change)
    }

    /// Index-backed constraints a change to one entity may violate
    pub fn uniqueness_constraints_related_to(
        &self,
        change: &EntityChange<'_>,
    ) -> Vec<Arc<ConstraintRule>> {
        self.current.load().uniqueness_constraints_related_to(change)
    }

    /// Whether an index or index-backed constraint covers `property_key` on
    /// any of `tokens`
    pub fn has_related_schema(
        &self,
        tokens: &[u32],
        property_key: u32,
        entity_type: EntityType,
    ) -> bool {
        self.current
            .load()
            .has_related_schema(tokens, property_key, entity_type)
    }

    /// Whether any index or index-backed constraint is on `token`
    pub fn has_related_schema_for_token(&self, token: u32, entity_type: EntityType) -> bool {
        self.current
            .load()
            .has_related_schema_for_token(token, entity_type)
    }

    /// Constraints on exactly `schema`
    pub fn constraints_for_schema(&self, schema: &SchemaDescriptor) -> Vec<Arc<ConstraintRule>> {
        self.current.load().constraints_for_schema(schema)
    }

    /// Whether a constraint matching `descriptor` is cached
    pub fn constraint_exists(&self, descriptor: &ConstraintDescriptor) -> bool {
        self.current.load().constraint_exists(descriptor)
    }

    /// Every index, ascending by id
    pub fn index_rules(&self) -> Vec<Arc<IndexRule>> {
        self.current.load().index_rules()
    }

    /// Every constraint, ascending by id
    pub fn constraint_rules(&self) -> Vec<Arc<ConstraintRule>> {
        self.current.load().constraint_rules()
    }
}
