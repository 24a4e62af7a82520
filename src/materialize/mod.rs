//! Turns driver rows into a linked entity graph.
//!
//! Every node is materialized before any relationship is wired, and each node is
//! registered in the identity map before its properties are read. A relationship
//! therefore always finds both of its ends, and a cycle in the result resolves to
//! the instance already built instead of a new one.

pub mod convert;
pub(crate) mod flatten;
pub(crate) mod identity;

use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    errors::MappingError,
    materialize::{
        convert::{Conversions, read_property},
        flatten::GraphModel,
        identity::IdentityMap,
    },
    model::{Entity, EntityGraph, EntityKey},
    result::{PropertyMap, RawRelationship, Row},
    schema::{
        Cardinality, Direction, EntityDescriptor, IdStrategy, RelationshipDescriptor,
        SchemaRegistry,
    },
};

/// Entity graph built from one result, plus the instances of the requested type.
#[derive(Debug, Default)]
pub struct Materialized {
    pub graph: EntityGraph,
    pub roots: Vec<EntityKey>,
}

impl Materialized {
    pub fn roots(&self) -> &[EntityKey] {
        &self.roots
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn into_parts(self) -> (EntityGraph, Vec<EntityKey>) {
        (self.graph, self.roots)
    }
}

pub struct Materializer<'r> {
    registry: &'r SchemaRegistry,
    conversions: Option<&'r Conversions>,
}

impl<'r> Materializer<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self {
            registry,
            conversions: None,
        }
    }

    pub fn with_conversions(mut self, conversions: &'r Conversions) -> Self {
        self.conversions = Some(conversions);
        self
    }

    /// Materializes every node and relationship in `rows`. Roots are the
    /// instances assignable to `requested`; when the result columns identify the
    /// matched anchors, only those.
    pub fn materialize(&self, requested: &str, rows: &[Row]) -> Result<Materialized, MappingError> {
        let requested = self.registry.describe(requested)?;
        let empty = Conversions::new();
        let conversions = self.conversions.unwrap_or(&empty);
        let model = GraphModel::from_rows(rows);

        let mut graph = EntityGraph::new();
        let mut identity = IdentityMap::default();

        for node in &model.nodes {
            let descriptor = self.registry.resolve_labels(node.id, &node.labels)?;
            let key = graph.insert(Entity::new(descriptor.name()));
            identity.insert_node(node.id, key);
            let entity = &mut graph[key];
            entity.set_internal_id(node.id);
            populate(conversions, descriptor, entity, node.id, &node.properties)?;
            if let Some(field) = descriptor.dynamic_labels_field() {
                let unclaimed: Vec<Value> = node
                    .labels
                    .iter()
                    .filter(|label| !descriptor.node_labels().contains(*label))
                    .map(|label| Value::String(label.clone()))
                    .collect();
                entity.set_property(field, Value::Array(unclaimed));
                entity.set_loaded_labels(node.labels.clone());
            }
            for stored in node.properties.keys() {
                if !is_mapped(descriptor, stored) {
                    trace!(entity = descriptor.name(), property = %stored, "skipped unmapped property");
                }
            }
        }

        for relationship in &model.relationships {
            let start = identity
                .node(relationship.start)
                .ok_or_else(|| MappingError::missing_linked_node(relationship.id, relationship.start))?;
            let end = identity
                .node(relationship.end)
                .ok_or_else(|| MappingError::missing_linked_node(relationship.id, relationship.end))?;
            match self.registry.relationship_entity(&relationship.rel_type) {
                Some(descriptor) => {
                    let key = match identity.relationship(relationship.id) {
                        Some(key) => key,
                        None => {
                            let key = self.relationship_entity(
                                &mut graph,
                                conversions,
                                descriptor,
                                relationship,
                                start,
                                end,
                            )?;
                            identity.insert_relationship(relationship.id, key);
                            key
                        }
                    };
                    let name = descriptor.name().to_string();
                    self.attach(
                        &mut graph,
                        relationship,
                        [
                            Side::new(start, name.clone(), key, Direction::Outgoing),
                            Side::new(end, name, key, Direction::Incoming),
                        ],
                    )?;
                }
                None => {
                    let sides = [
                        Side::new(start, graph[end].type_name().to_string(), end, Direction::Outgoing),
                        Side::new(end, graph[start].type_name().to_string(), start, Direction::Incoming),
                    ];
                    if !self.attach(&mut graph, relationship, sides)? {
                        trace!(
                            relationship = relationship.id,
                            rel_type = %relationship.rel_type,
                            "no field takes this relationship"
                        );
                    }
                }
            }
        }

        let roots = roots(self.registry, requested, &graph, &identity, &model)?;
        debug!(
            entity = requested.name(),
            nodes = model.nodes.len(),
            relationships = model.relationships.len(),
            roots = roots.len(),
            "materialized result"
        );
        Ok(Materialized { graph, roots })
    }

    fn relationship_entity(
        &self,
        graph: &mut EntityGraph,
        conversions: &Conversions,
        descriptor: &EntityDescriptor,
        relationship: &RawRelationship,
        start: EntityKey,
        end: EntityKey,
    ) -> Result<EntityKey, MappingError> {
        let key = graph.insert(Entity::new(descriptor.name()));
        let entity = &mut graph[key];
        entity.set_internal_id(relationship.id);
        entity.set_endpoints(start, end);
        populate(conversions, descriptor, entity, relationship.id, &relationship.properties)?;
        Ok(key)
    }

    /// Wires one relationship into the fields that take it: the start node through
    /// an outgoing or undirected field, the end node through an incoming or
    /// undirected one. Returns whether any field took it.
    fn attach(
        &self,
        graph: &mut EntityGraph,
        relationship: &RawRelationship,
        sides: [Side; 2],
    ) -> Result<bool, MappingError> {
        let rel_type = relationship.rel_type.as_str();
        let mut attached = false;
        for side in sides {
            let owner = self.registry.describe(graph[side.owner].type_name())?;
            let target = self.registry.describe(&side.target)?;
            let Some(field) = self.field_for(owner, target, rel_type, side.direction)? else {
                continue;
            };
            let entity = &mut graph[side.owner];
            match field.cardinality {
                Cardinality::Single => entity.set_single(&field.field, side.value),
                Cardinality::Collection => entity.push_collection(&field.field, side.value),
                Cardinality::Grouped => entity.push_grouped(&field.field, rel_type, side.value),
            }
            entity.record_loaded(&field.field, rel_type, side.value, relationship.id);
            attached = true;
        }
        Ok(attached)
    }

    /// First field of `owner` taking relationships of `rel_type` seen from
    /// `direction` whose target accepts `target`.
    fn field_for<'d>(
        &self,
        owner: &'d EntityDescriptor,
        target: &EntityDescriptor,
        rel_type: &str,
        direction: Direction,
    ) -> Result<Option<&'d RelationshipDescriptor>, MappingError> {
        for field in owner.relationships() {
            if field.direction != direction && field.direction != Direction::Undirected {
                continue;
            }
            let declared = self.registry.target(owner, field)?;
            let type_matches = if declared.is_relationship_entity() {
                declared.rel_type() == Some(rel_type)
            } else {
                field.matches_type(rel_type)
            };
            if type_matches && self.registry.is_assignable(target, declared) {
                return Ok(Some(field));
            }
        }
        Ok(None)
    }
}

/// One end of a relationship: `owner` takes `value`, an instance of `target`.
struct Side {
    owner: EntityKey,
    target: String,
    value: EntityKey,
    direction: Direction,
}

impl Side {
    fn new(owner: EntityKey, target: String, value: EntityKey, direction: Direction) -> Self {
        Self {
            owner,
            target,
            value,
            direction,
        }
    }
}

fn populate(
    conversions: &Conversions,
    descriptor: &EntityDescriptor,
    entity: &mut Entity,
    internal_id: i64,
    stored: &PropertyMap,
) -> Result<(), MappingError> {
    if let Some(id) = descriptor.id() {
        let value = match &id.strategy {
            IdStrategy::Internal => Value::from(internal_id),
            IdStrategy::Assigned { property, .. } => stored.get(property).cloned().unwrap_or(Value::Null),
        };
        entity.set_property(id.field.clone(), value);
    }
    for property in descriptor.properties() {
        let value = read_property(
            conversions,
            descriptor,
            property,
            stored.get(&property.stored_name).cloned(),
        )?;
        entity.set_property(property.field.clone(), value);
    }
    Ok(())
}

fn is_mapped(descriptor: &EntityDescriptor, stored: &str) -> bool {
    descriptor.assigned_id_property() == Some(stored) || descriptor.property_by_stored_name(stored).is_some()
}

fn roots(
    registry: &SchemaRegistry,
    requested: &EntityDescriptor,
    graph: &EntityGraph,
    identity: &IdentityMap,
    model: &GraphModel,
) -> Result<Vec<EntityKey>, MappingError> {
    let assignable = |key: &EntityKey| -> Result<bool, MappingError> {
        let descriptor = registry.describe(graph[*key].type_name())?;
        Ok(registry.is_assignable(descriptor, requested))
    };
    let candidates: Vec<EntityKey> = if requested.is_relationship_entity() {
        if model.anchor_relationships.is_empty() {
            model
                .relationships
                .iter()
                .filter_map(|rel| identity.relationship(rel.id))
                .collect()
        } else {
            model
                .anchor_relationships
                .iter()
                .filter_map(|id| identity.relationship(*id))
                .collect()
        }
    } else if model.anchor_nodes.is_empty() {
        model.nodes.iter().filter_map(|node| identity.node(node.id)).collect()
    } else {
        model
            .anchor_nodes
            .iter()
            .filter_map(|id| identity.node(*id))
            .collect()
    };
    let mut roots = Vec::with_capacity(candidates.len());
    for key in candidates {
        if assignable(&key)? && !roots.contains(&key) {
            roots.push(key);
        }
    }
    Ok(roots)
}
