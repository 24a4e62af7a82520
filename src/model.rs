//! In-memory entity graph. Instances live in an arena and reference each other by
//! [`EntityKey`], so cyclic domain graphs need no reference counting and identity is
//! the key itself rather than value equality.

use std::{
    collections::BTreeMap,
    ops::{Index, IndexMut},
};

use serde_json::Value;

use crate::result::PropertyMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(usize);

impl EntityKey {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Contents of one relationship field.
#[derive(Clone, Debug, PartialEq)]
pub enum Related {
    Single(Option<EntityKey>),
    Collection(Vec<EntityKey>),
    Grouped(BTreeMap<String, Vec<EntityKey>>),
}

impl Related {
    /// Every referenced key, paired with the dynamic relationship type for grouped fields.
    pub fn entries(&self) -> Vec<(Option<&str>, EntityKey)> {
        match self {
            Related::Single(Some(key)) => vec![(None, *key)],
            Related::Single(None) => Vec::new(),
            Related::Collection(keys) => keys.iter().map(|key| (None, *key)).collect(),
            Related::Grouped(groups) => groups
                .iter()
                .flat_map(|(rel_type, keys)| keys.iter().map(move |key| (Some(rel_type.as_str()), *key)))
                .collect(),
        }
    }

    pub fn keys(&self) -> Vec<EntityKey> {
        self.entries().into_iter().map(|(_, key)| key).collect()
    }

    pub fn len(&self) -> usize {
        match self {
            Related::Single(key) => usize::from(key.is_some()),
            Related::Collection(keys) => keys.len(),
            Related::Grouped(groups) => groups.values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&mut self, target: EntityKey) -> bool {
        match self {
            Related::Single(slot) if *slot == Some(target) => {
                *slot = None;
                true
            }
            Related::Single(_) => false,
            Related::Collection(keys) => {
                let before = keys.len();
                keys.retain(|key| *key != target);
                keys.len() != before
            }
            Related::Grouped(groups) => {
                let mut removed = false;
                for keys in groups.values_mut() {
                    let before = keys.len();
                    keys.retain(|key| *key != target);
                    removed |= keys.len() != before;
                }
                removed
            }
        }
    }

    /// Whether `target` is held, under `rel_type` for grouped fields.
    pub fn holds(&self, rel_type: &str, target: EntityKey) -> bool {
        match self {
            Related::Grouped(groups) => groups
                .get(rel_type)
                .is_some_and(|keys| keys.contains(&target)),
            other => other.keys().contains(&target),
        }
    }
}

/// A stored relationship a field held when its owner was read or last saved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedRelationship {
    pub field: String,
    pub rel_type: String,
    pub target: EntityKey,
    pub id: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    type_name: String,
    internal_id: Option<i64>,
    properties: PropertyMap,
    relationships: BTreeMap<String, Related>,
    endpoints: Option<(EntityKey, EntityKey)>,
    loaded: Vec<LoadedRelationship>,
    loaded_labels: Option<Vec<String>>,
}

impl Entity {
    pub fn new<T: Into<String>>(type_name: T) -> Self {
        Self {
            type_name: type_name.into(),
            internal_id: None,
            properties: PropertyMap::new(),
            relationships: BTreeMap::new(),
            endpoints: None,
            loaded: Vec::new(),
            loaded_labels: None,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn internal_id(&self) -> Option<i64> {
        self.internal_id
    }

    pub fn set_internal_id(&mut self, id: i64) {
        self.internal_id = Some(id);
    }

    pub fn property(&self, field: &str) -> Option<&Value> {
        self.properties.get(field)
    }

    pub fn set_property<F: Into<String>>(&mut self, field: F, value: Value) {
        self.properties.insert(field.into(), value);
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn related(&self, field: &str) -> Option<&Related> {
        self.relationships.get(field)
    }

    pub fn relationships(&self) -> &BTreeMap<String, Related> {
        &self.relationships
    }

    /// Start and end node of a relationship entity.
    pub fn endpoints(&self) -> Option<(EntityKey, EntityKey)> {
        self.endpoints
    }

    pub fn is_relationship(&self) -> bool {
        self.endpoints.is_some()
    }

    pub(crate) fn set_endpoints(&mut self, start: EntityKey, end: EntityKey) {
        self.endpoints = Some((start, end));
    }

    /// Relationships read into this entity's fields and not since deleted.
    pub fn loaded_relationships(&self) -> &[LoadedRelationship] {
        &self.loaded
    }

    /// Every label the node carried when read or last saved; `None` for new entities.
    pub fn loaded_labels(&self) -> Option<&[String]> {
        self.loaded_labels.as_deref()
    }

    pub(crate) fn record_loaded(&mut self, field: &str, rel_type: &str, target: EntityKey, id: i64) {
        let known = self
            .loaded
            .iter()
            .any(|loaded| loaded.id == id && loaded.field == field && loaded.target == target);
        if !known {
            self.loaded.push(LoadedRelationship {
                field: field.to_string(),
                rel_type: rel_type.to_string(),
                target,
                id,
            });
        }
    }

    pub(crate) fn set_loaded_labels(&mut self, labels: Vec<String>) {
        self.loaded_labels = Some(labels);
    }

    /// Drops `target` from a relationship field. Returns whether it was held.
    pub fn remove_related(&mut self, field: &str, target: EntityKey) -> bool {
        self.relationships
            .get_mut(field)
            .is_some_and(|related| related.remove(target))
    }

    pub(crate) fn set_single(&mut self, field: &str, target: EntityKey) {
        self.relationships
            .insert(field.to_string(), Related::Single(Some(target)));
    }

    pub(crate) fn push_collection(&mut self, field: &str, target: EntityKey) {
        let slot = self
            .relationships
            .entry(field.to_string())
            .or_insert_with(|| Related::Collection(Vec::new()));
        match slot {
            Related::Collection(keys) => {
                if !keys.contains(&target) {
                    keys.push(target);
                }
            }
            other => *other = Related::Collection(vec![target]),
        }
    }

    pub(crate) fn push_grouped(&mut self, field: &str, rel_type: &str, target: EntityKey) {
        let slot = self
            .relationships
            .entry(field.to_string())
            .or_insert_with(|| Related::Grouped(BTreeMap::new()));
        if !matches!(slot, Related::Grouped(_)) {
            *slot = Related::Grouped(BTreeMap::new());
        }
        if let Related::Grouped(groups) = slot {
            let keys = groups.entry(rel_type.to_string()).or_default();
            if !keys.contains(&target) {
                keys.push(target);
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EntityGraph {
    entities: Vec<Entity>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Entity) -> EntityKey {
        self.entities.push(entity);
        EntityKey(self.entities.len() - 1)
    }

    /// Adds a node entity with the given scalar fields.
    pub fn add_node<T, I, F>(&mut self, type_name: T, properties: I) -> EntityKey
    where
        T: Into<String>,
        I: IntoIterator<Item = (F, Value)>,
        F: Into<String>,
    {
        let mut entity = Entity::new(type_name);
        for (field, value) in properties {
            entity.set_property(field, value);
        }
        self.insert(entity)
    }

    /// Adds a relationship entity between two existing nodes.
    pub fn add_relationship<T, I, F>(
        &mut self,
        type_name: T,
        start: EntityKey,
        end: EntityKey,
        properties: I,
    ) -> EntityKey
    where
        T: Into<String>,
        I: IntoIterator<Item = (F, Value)>,
        F: Into<String>,
    {
        let key = self.add_node(type_name, properties);
        self.entities[key.0].set_endpoints(start, end);
        key
    }

    /// Appends `target` to a collection field of `owner`.
    pub fn relate(&mut self, owner: EntityKey, field: &str, target: EntityKey) {
        self.entities[owner.0].push_collection(field, target);
    }

    /// Sets a single-valued relationship field of `owner`.
    pub fn relate_one(&mut self, owner: EntityKey, field: &str, target: EntityKey) {
        self.entities[owner.0].set_single(field, target);
    }

    /// Appends `target` under a dynamically typed group of `owner`.
    pub fn relate_grouped(&mut self, owner: EntityKey, field: &str, rel_type: &str, target: EntityKey) {
        self.entities[owner.0].push_grouped(field, rel_type, target);
    }

    /// Removes `target` from a relationship field of `owner`. Saving `owner`
    /// afterwards deletes the stored relationship.
    pub fn unrelate(&mut self, owner: EntityKey, field: &str, target: EntityKey) -> bool {
        self.entities[owner.0].remove_related(field, target)
    }

    pub(crate) fn forget_relationships(&mut self, ids: &[i64]) {
        for entity in &mut self.entities {
            entity.loaded.retain(|loaded| !ids.contains(&loaded.id));
        }
    }

    pub fn get(&self, key: EntityKey) -> Option<&Entity> {
        self.entities.get(key.0)
    }

    pub fn get_mut(&mut self, key: EntityKey) -> Option<&mut Entity> {
        self.entities.get_mut(key.0)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = EntityKey> + '_ {
        (0..self.entities.len()).map(EntityKey)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &Entity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(index, entity)| (EntityKey(index), entity))
    }

    pub fn of_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = EntityKey> + 'a {
        self.iter()
            .filter(move |(_, entity)| entity.type_name() == type_name)
            .map(|(key, _)| key)
    }

    /// Nodes reachable from `key` through one relationship field.
    pub fn related_keys(&self, key: EntityKey, field: &str) -> Vec<EntityKey> {
        self.get(key)
            .and_then(|entity| entity.related(field))
            .map(Related::keys)
            .unwrap_or_default()
    }
}

impl Index<EntityKey> for EntityGraph {
    type Output = Entity;

    fn index(&self, key: EntityKey) -> &Entity {
        &self.entities[key.0]
    }
}

impl IndexMut<EntityKey> for EntityGraph {
    fn index_mut(&mut self, key: EntityKey) -> &mut Entity {
        &mut self.entities[key.0]
    }
}
