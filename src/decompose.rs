//! Write path: flattens an entity graph into node and relationship upserts.

use ahash::AHashMap;
use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    errors::MappingError,
    materialize::convert::{Conversions, write_property},
    model::{Entity, EntityGraph, EntityKey},
    result::PropertyMap,
    schema::{Direction, EntityDescriptor, IdStrategy, PropertyDescriptor, SchemaRegistry},
};

/// How a node upsert finds its node.
#[derive(Clone, Debug, PartialEq)]
pub enum UpsertMode {
    /// Assigned id: merge on the id property.
    Merge { property: String, value: Value },
    /// Already persisted under this internal id.
    Match { id: i64 },
    Create,
}

/// Version guard of a node upsert: the write applies only while the store still
/// holds `expected`, and stores `next`.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionCheck {
    pub field: String,
    pub property: String,
    pub expected: Option<i64>,
    pub next: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeUpsert {
    pub reference: String,
    pub entity: EntityKey,
    /// Mapped labels followed by the dynamic ones.
    pub labels: Vec<String>,
    pub dynamic_labels: Vec<String>,
    /// Dynamic labels the node carried when read and no longer holds.
    pub removed_labels: Vec<String>,
    pub mode: UpsertMode,
    pub properties: PropertyMap,
    pub version: Option<VersionCheck>,
}

impl NodeUpsert {
    /// Labels the entity type maps, without the dynamic ones.
    pub fn mapped_labels(&self) -> Vec<String> {
        self.labels
            .iter()
            .filter(|label| !self.dynamic_labels.contains(*label))
            .cloned()
            .collect()
    }
}

/// Relationship field of `owner` holding `target`.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldRef {
    pub owner: EntityKey,
    pub field: String,
    pub target: EntityKey,
}

/// Relationship between two node upserts, by reference. `entity` is set for
/// relationship entities, `id` once the relationship is persisted. `holders` are
/// the fields the relationship was reached through.
#[derive(Clone, Debug, PartialEq)]
pub struct RelationshipUpsert {
    pub reference: String,
    pub entity: Option<EntityKey>,
    pub rel_type: String,
    pub start: String,
    pub end: String,
    pub id: Option<i64>,
    pub properties: PropertyMap,
    pub holders: Vec<FieldRef>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WritePlan {
    pub nodes: Vec<NodeUpsert>,
    pub relationships: Vec<RelationshipUpsert>,
    /// Stored relationships that a persisted entity's fields no longer hold.
    pub deleted_relationships: Vec<i64>,
}

impl WritePlan {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty() && self.deleted_relationships.is_empty()
    }

    pub fn is_versioned(&self) -> bool {
        self.nodes.iter().any(|node| node.version.is_some())
    }

    pub fn node(&self, reference: &str) -> Option<&NodeUpsert> {
        self.nodes.iter().find(|node| node.reference == reference)
    }

    pub fn node_for(&self, entity: EntityKey) -> Option<&NodeUpsert> {
        self.nodes.iter().find(|node| node.entity == entity)
    }
}

pub struct Decomposer<'r> {
    registry: &'r SchemaRegistry,
    conversions: Option<&'r Conversions>,
    horizon: i32,
}

impl<'r> Decomposer<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self {
            registry,
            conversions: None,
            horizon: -1,
        }
    }

    pub fn with_conversions(mut self, conversions: &'r Conversions) -> Self {
        self.conversions = Some(conversions);
        self
    }

    /// Hops to follow from each root; negative follows everything reachable.
    pub fn horizon(mut self, horizon: i32) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn decompose(&self, graph: &mut EntityGraph, root: EntityKey) -> Result<WritePlan, MappingError> {
        self.decompose_all(graph, &[root])
    }

    /// Decomposes several roots into one plan; entities reachable from more than
    /// one root are written once. Generated ids are written back into `graph` only
    /// when the whole plan succeeds.
    pub fn decompose_all(
        &self,
        graph: &mut EntityGraph,
        roots: &[EntityKey],
    ) -> Result<WritePlan, MappingError> {
        let empty = Conversions::new();
        let mut walk = Walk {
            registry: self.registry,
            conversions: self.conversions.unwrap_or(&empty),
            horizon: self.horizon,
            graph: &*graph,
            plan: WritePlan::default(),
            visited: AHashMap::new(),
            edges: AHashMap::new(),
            relationship_entities: AHashMap::new(),
            dropped: Vec::new(),
            generated: Vec::new(),
        };
        for &root in roots {
            walk.root(root)?;
        }
        walk.resolve_dropped();
        let Walk { plan, generated, .. } = walk;
        for (key, field, value) in generated {
            graph[key].set_property(field, value);
        }
        debug!(
            nodes = plan.nodes.len(),
            relationships = plan.relationships.len(),
            deleted = plan.deleted_relationships.len(),
            "decomposed entity graph"
        );
        Ok(plan)
    }
}

/// Loaded relationship whose field no longer holds its target.
struct Dropped {
    id: i64,
    owner: EntityKey,
    target: EntityKey,
    rel_type: String,
    direction: Direction,
}

struct Walk<'a> {
    registry: &'a SchemaRegistry,
    conversions: &'a Conversions,
    horizon: i32,
    graph: &'a EntityGraph,
    plan: WritePlan,
    visited: AHashMap<EntityKey, String>,
    edges: AHashMap<(String, String, String), usize>,
    relationship_entities: AHashMap<EntityKey, usize>,
    dropped: Vec<Dropped>,
    generated: Vec<(EntityKey, String, Value)>,
}

impl<'a> Walk<'a> {
    fn entity(&self, key: EntityKey) -> Result<&'a Entity, MappingError> {
        self.graph
            .get(key)
            .ok_or_else(|| MappingError::invalid_mapping("entity graph", format!("no entity {key:?}")))
    }

    fn descriptor(&self, key: EntityKey) -> Result<&'a EntityDescriptor, MappingError> {
        let entity = self.entity(key)?;
        self.registry.describe(entity.type_name())
    }

    fn within_horizon(&self, taken: u32) -> bool {
        self.horizon < 0 || i64::from(taken) < i64::from(self.horizon)
    }

    fn root(&mut self, key: EntityKey) -> Result<(), MappingError> {
        if self.descriptor(key)?.is_relationship_entity() {
            return self.relationship_entity(key, 0, None);
        }
        let (_, fresh) = self.reference(key)?;
        if fresh {
            self.follow(key, 0)?;
        }
        Ok(())
    }

    /// Reference of the node upsert for `key`, emitting it on first sight.
    fn reference(&mut self, key: EntityKey) -> Result<(String, bool), MappingError> {
        if let Some(reference) = self.visited.get(&key) {
            return Ok((reference.clone(), false));
        }
        let entity = self.entity(key)?;
        let descriptor = self.descriptor(key)?;
        if descriptor.is_relationship_entity() {
            return Err(MappingError::invalid_mapping(
                descriptor.name(),
                "relationship entity used where a node was expected",
            ));
        }
        let mode = self.mode(key, descriptor)?;
        let mut properties = PropertyMap::new();
        for property in descriptor.properties() {
            let value = write_property(
                self.conversions,
                descriptor,
                property,
                entity.property(&property.field),
            )?;
            properties.insert(property.stored_name.clone(), value);
        }
        let version = descriptor
            .version_property()
            .map(|property| version_check(descriptor, property, entity, &mode))
            .transpose()?;
        if let Some(check) = &version {
            properties.insert(check.property.clone(), Value::from(check.next));
        }
        let (labels, dynamic_labels, removed_labels) = node_labels(descriptor, entity)?;
        let reference = format!("_{}", self.plan.nodes.len());
        self.plan.nodes.push(NodeUpsert {
            reference: reference.clone(),
            entity: key,
            labels,
            dynamic_labels,
            removed_labels,
            mode,
            properties,
            version,
        });
        self.visited.insert(key, reference.clone());
        Ok((reference, true))
    }

    fn mode(&mut self, key: EntityKey, descriptor: &EntityDescriptor) -> Result<UpsertMode, MappingError> {
        if let Some((property, value)) = self.assigned_id(key, descriptor)? {
            return Ok(UpsertMode::Merge { property, value });
        }
        Ok(match self.entity(key)?.internal_id() {
            Some(id) => UpsertMode::Match { id },
            None => UpsertMode::Create,
        })
    }

    /// Assigned id property and value, generating the value when the field is null.
    /// `None` for internal ids.
    fn assigned_id(
        &mut self,
        key: EntityKey,
        descriptor: &EntityDescriptor,
    ) -> Result<Option<(String, Value)>, MappingError> {
        let entity = self.entity(key)?;
        let id = descriptor.id().ok_or_else(|| {
            MappingError::invalid_mapping(descriptor.name(), "expected exactly one id field")
        })?;
        let IdStrategy::Assigned { property, generator } = &id.strategy else {
            return Ok(None);
        };
        if let Some(value) = entity.property(&id.field).filter(|v| !v.is_null()) {
            return Ok(Some((property.clone(), value.clone())));
        }
        let generator = generator
            .as_ref()
            .ok_or_else(|| MappingError::unresolved_id(descriptor.name(), &id.field))?;
        let label = descriptor.primary_label().unwrap_or(descriptor.name());
        let value = generator.generate(entity, label);
        trace!(entity = descriptor.name(), generator = generator.name(), "generated id");
        self.generated.push((key, id.field.clone(), value.clone()));
        Ok(Some((property.clone(), value)))
    }

    /// Emits every relationship of a node `taken` hops from its root, then
    /// recurses into targets seen for the first time. Loaded relationships the
    /// node's fields no longer hold are noted for deletion.
    fn follow(&mut self, key: EntityKey, taken: u32) -> Result<(), MappingError> {
        if !self.within_horizon(taken) {
            return Ok(());
        }
        let entity = self.entity(key)?;
        let descriptor = self.descriptor(key)?;
        let owner = self.visited.get(&key).cloned().ok_or_else(|| {
            MappingError::invalid_mapping(descriptor.name(), "relationships followed before the node was written")
        })?;
        for relationship in descriptor.relationships() {
            let related = entity.related(&relationship.field);
            for loaded in entity.loaded_relationships() {
                if loaded.field != relationship.field
                    || related.is_some_and(|related| related.holds(&loaded.rel_type, loaded.target))
                {
                    continue;
                }
                self.dropped.push(Dropped {
                    id: loaded.id,
                    owner: key,
                    target: loaded.target,
                    rel_type: loaded.rel_type.clone(),
                    direction: relationship.direction,
                });
            }
            let Some(related) = related else {
                continue;
            };
            let target_descriptor = self.registry.target(descriptor, relationship)?;
            for (group, target) in related.entries() {
                let holder = FieldRef {
                    owner: key,
                    field: relationship.field.clone(),
                    target,
                };
                if target_descriptor.is_relationship_entity() {
                    self.relationship_entity(target, taken + 1, Some(holder))?;
                    continue;
                }
                let Some(rel_type) = group.or(relationship.rel_type.as_deref()) else {
                    continue;
                };
                let (target_reference, fresh) = self.reference(target)?;
                let (start, end) = match relationship.direction {
                    Direction::Incoming => (target_reference, owner.clone()),
                    Direction::Outgoing | Direction::Undirected => (owner.clone(), target_reference),
                };
                let undirected = relationship.direction == Direction::Undirected;
                self.edge(rel_type, start, end, undirected, holder);
                if fresh {
                    self.follow(target, taken + 1)?;
                }
            }
        }
        Ok(())
    }

    fn edge(&mut self, rel_type: &str, start: String, end: String, undirected: bool, holder: FieldRef) {
        let forward = (start, rel_type.to_string(), end);
        let existing = match self.edges.get(&forward) {
            Some(index) => Some(*index),
            None if undirected => {
                let reversed = (forward.2.clone(), forward.1.clone(), forward.0.clone());
                self.edges.get(&reversed).copied()
            }
            None => None,
        };
        if let Some(index) = existing {
            self.plan.relationships[index].holders.push(holder);
            return;
        }
        let index = self.plan.relationships.len();
        self.plan.relationships.push(RelationshipUpsert {
            reference: format!("_r{index}"),
            entity: None,
            rel_type: rel_type.to_string(),
            start: forward.0.clone(),
            end: forward.2.clone(),
            id: None,
            properties: PropertyMap::new(),
            holders: vec![holder],
        });
        self.edges.insert(forward, index);
    }

    /// Writes a relationship entity once with both endpoints, then walks each
    /// endpoint seen for the first time as `taken` hops from its root.
    fn relationship_entity(
        &mut self,
        key: EntityKey,
        taken: u32,
        holder: Option<FieldRef>,
    ) -> Result<(), MappingError> {
        if let Some(&index) = self.relationship_entities.get(&key) {
            self.plan.relationships[index].holders.extend(holder);
            return Ok(());
        }
        let entity = self.entity(key)?;
        let descriptor = self.descriptor(key)?;
        let (start_key, end_key) = entity.endpoints().ok_or_else(|| {
            MappingError::invalid_mapping(descriptor.name(), "relationship entity without endpoints")
        })?;
        let rel_type = descriptor
            .rel_type()
            .ok_or_else(|| MappingError::invalid_mapping(descriptor.name(), "not a relationship entity"))?;

        let mut properties = PropertyMap::new();
        if let Some((property, value)) = self.assigned_id(key, descriptor)? {
            properties.insert(property, value);
        }
        for property in descriptor.properties() {
            let value = write_property(
                self.conversions,
                descriptor,
                property,
                entity.property(&property.field),
            )?;
            properties.insert(property.stored_name.clone(), value);
        }

        let (start, start_fresh) = self.reference(start_key)?;
        let (end, end_fresh) = self.reference(end_key)?;
        let index = self.plan.relationships.len();
        self.plan.relationships.push(RelationshipUpsert {
            reference: format!("_r{index}"),
            entity: Some(key),
            rel_type: rel_type.to_string(),
            start,
            end,
            id: entity.internal_id(),
            properties,
            holders: holder.into_iter().collect(),
        });
        self.relationship_entities.insert(key, index);
        if start_fresh {
            self.follow(start_key, taken)?;
        }
        if end_fresh {
            self.follow(end_key, taken)?;
        }
        Ok(())
    }

    /// Turns dropped relationships into deletions, except those the plan still
    /// writes through another field.
    fn resolve_dropped(&mut self) {
        for dropped in std::mem::take(&mut self.dropped) {
            if self.still_written(&dropped) || self.plan.deleted_relationships.contains(&dropped.id) {
                continue;
            }
            trace!(relationship = dropped.id, rel_type = %dropped.rel_type, "relationship dropped from its field");
            self.plan.deleted_relationships.push(dropped.id);
        }
    }

    fn still_written(&self, dropped: &Dropped) -> bool {
        if self.graph.get(dropped.target).is_some_and(Entity::is_relationship) {
            return self.relationship_entities.contains_key(&dropped.target);
        }
        let (Some(owner), Some(target)) = (self.visited.get(&dropped.owner), self.visited.get(&dropped.target)) else {
            return false;
        };
        let (start, end) = match dropped.direction {
            Direction::Incoming => (target, owner),
            Direction::Outgoing | Direction::Undirected => (owner, target),
        };
        let rel_type = &dropped.rel_type;
        self.edges.contains_key(&(start.clone(), rel_type.clone(), end.clone()))
            || (dropped.direction == Direction::Undirected
                && self.edges.contains_key(&(end.clone(), rel_type.clone(), start.clone())))
    }
}

fn version_check(
    descriptor: &EntityDescriptor,
    property: &PropertyDescriptor,
    entity: &Entity,
    mode: &UpsertMode,
) -> Result<VersionCheck, MappingError> {
    let expected = match (mode, entity.property(&property.field)) {
        (UpsertMode::Create, _) | (_, None | Some(Value::Null)) => None,
        (_, Some(value)) => Some(value.as_i64().ok_or_else(|| {
            MappingError::property(descriptor.name(), &property.field, format!("version {value} is not an integer"))
        })?),
    };
    Ok(VersionCheck {
        field: property.field.clone(),
        property: property.stored_name.clone(),
        expected,
        next: expected.map_or(0, |version| version + 1),
    })
}

/// Mapped plus dynamic labels, the dynamic ones alone, and the dynamic labels
/// dropped since the node was read.
fn node_labels(
    descriptor: &EntityDescriptor,
    entity: &Entity,
) -> Result<(Vec<String>, Vec<String>, Vec<String>), MappingError> {
    let mut labels = descriptor.node_labels().to_vec();
    let Some(field) = descriptor.dynamic_labels_field() else {
        return Ok((labels, Vec::new(), Vec::new()));
    };
    let fail = |reason: &str| MappingError::property(descriptor.name(), field, reason);
    let values = match entity.property(field) {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(values)) => values.as_slice(),
        Some(_) => return Err(fail("dynamic labels must be a list")),
    };
    let mut dynamic: Vec<String> = Vec::new();
    for value in values {
        let label = value
            .as_str()
            .filter(|label| !label.trim().is_empty())
            .ok_or_else(|| fail("dynamic labels must be non-empty strings"))?;
        if !labels.iter().any(|own| own == label) && !dynamic.iter().any(|seen| seen == label) {
            dynamic.push(label.to_string());
        }
    }
    let removed = entity
        .loaded_labels()
        .unwrap_or_default()
        .iter()
        .filter(|label| !labels.contains(*label) && !dynamic.contains(*label))
        .cloned()
        .collect();
    labels.extend(dynamic.iter().cloned());
    Ok((labels, dynamic, removed))
}
