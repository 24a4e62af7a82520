use ahash::{AHashMap, AHashSet};
use tracing::debug;

use crate::{
    errors::MappingError,
    schema::descriptor::{
        Cardinality, EntityDescriptor, EntityKind, IdStrategy, RelationshipDescriptor,
    },
    statement::quote,
};

/// Store-side value expression on a node or relationship variable. Id predicates go
/// through [`SchemaRegistry::resolve_id_expression`] so statements stay agnostic of
/// the id strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expression {
    /// The store's surrogate identity, `id(var)`.
    InternalId,
    /// A stored property, `var.`name``.
    Property(String),
}

impl Expression {
    pub fn render(&self, variable: &str) -> String {
        match self {
            Expression::InternalId => format!("id({variable})"),
            Expression::Property(property) => format!("{variable}.{}", quote(property)),
        }
    }
}

/// Mutable registration phase. Nothing can be generated or materialized until
/// [`RegistryBuilder::build`] has frozen it into a [`SchemaRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entities: Vec<EntityDescriptor>,
    index: AHashMap<String, usize>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores a descriptor. Registering an identical descriptor twice is a no-op.
    pub fn register(&mut self, descriptor: EntityDescriptor) -> Result<&mut Self, MappingError> {
        if let Some(&position) = self.index.get(descriptor.name()) {
            if self.entities[position] == descriptor {
                return Ok(self);
            }
            return Err(MappingError::invalid_mapping(
                descriptor.name(),
                "registered twice with different mappings",
            ));
        }
        validate_descriptor(&descriptor)?;
        self.check_conflicts(&descriptor)?;
        debug!(entity = descriptor.name(), "registered entity type");
        self.index
            .insert(descriptor.name().to_string(), self.entities.len());
        self.entities.push(descriptor);
        Ok(self)
    }

    /// Chaining form of [`RegistryBuilder::register`].
    pub fn with(mut self, descriptor: EntityDescriptor) -> Result<Self, MappingError> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Resolves every relationship target by name and freezes the registry.
    pub fn build(self) -> Result<SchemaRegistry, MappingError> {
        for descriptor in &self.entities {
            for relationship in descriptor.relationships() {
                if !self.index.contains_key(&relationship.target) {
                    return Err(MappingError::invalid_mapping(
                        descriptor.name(),
                        format!(
                            "relationship field `{}` targets unregistered type {}",
                            relationship.field, relationship.target
                        ),
                    ));
                }
            }
            if let EntityKind::Relationship { start, end, .. } = descriptor.kind() {
                for endpoint in [start, end] {
                    let resolved = self
                        .index
                        .get(endpoint)
                        .map(|&position| &self.entities[position]);
                    match resolved {
                        Some(target) if !target.is_relationship_entity() => {}
                        Some(_) => {
                            return Err(MappingError::invalid_mapping(
                                descriptor.name(),
                                format!("endpoint {endpoint} is a relationship entity"),
                            ));
                        }
                        None => {
                            return Err(MappingError::invalid_mapping(
                                descriptor.name(),
                                format!("endpoint {endpoint} is not registered"),
                            ));
                        }
                    }
                }
            }
        }
        debug!(entities = self.entities.len(), "schema registry built");
        Ok(SchemaRegistry {
            entities: self.entities,
            index: self.index,
        })
    }

    fn check_conflicts(&self, descriptor: &EntityDescriptor) -> Result<(), MappingError> {
        for existing in &self.entities {
            match (existing.kind(), descriptor.kind()) {
                (EntityKind::Node { labels: a }, EntityKind::Node { labels: b })
                    if label_set(a) == label_set(b) =>
                {
                    return Err(MappingError::invalid_mapping(
                        descriptor.name(),
                        format!("label set {b:?} already mapped by {}", existing.name()),
                    ));
                }
                (
                    EntityKind::Relationship { rel_type: a, .. },
                    EntityKind::Relationship { rel_type: b, .. },
                ) if a == b => {
                    return Err(MappingError::invalid_mapping(
                        descriptor.name(),
                        format!("relationship type {b} already mapped by {}", existing.name()),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn label_set(labels: &[String]) -> AHashSet<&str> {
    labels.iter().map(String::as_str).collect()
}

fn validate_descriptor(descriptor: &EntityDescriptor) -> Result<(), MappingError> {
    let name = descriptor.name();
    if name.trim().is_empty() {
        return Err(MappingError::invalid_mapping(name, "type name must be set"));
    }
    match descriptor.declared_ids().len() {
        1 => {}
        0 => return Err(MappingError::invalid_mapping(name, "no id field declared")),
        n => {
            return Err(MappingError::invalid_mapping(
                name,
                format!("{n} id fields declared, expected exactly one"),
            ));
        }
    }
    match descriptor.kind() {
        EntityKind::Node { labels } => {
            if labels.is_empty() || labels.iter().any(|l| l.trim().is_empty()) {
                return Err(MappingError::invalid_mapping(name, "node labels must be set"));
            }
        }
        EntityKind::Relationship { rel_type, .. } => {
            if rel_type.trim().is_empty() {
                return Err(MappingError::invalid_mapping(name, "relationship type must be set"));
            }
            if !descriptor.relationships().is_empty() {
                return Err(MappingError::invalid_mapping(
                    name,
                    "relationship entities cannot declare relationship fields",
                ));
            }
        }
    }

    let mut fields = AHashSet::new();
    let mut stored = AHashSet::new();
    let id = &descriptor.declared_ids()[0];
    fields.insert(id.field.as_str());
    if let IdStrategy::Assigned { property, .. } = &id.strategy {
        stored.insert(property.as_str());
    }
    for property in descriptor.properties() {
        if !fields.insert(property.field.as_str()) {
            return Err(MappingError::invalid_mapping(
                name,
                format!("duplicate field `{}`", property.field),
            ));
        }
        if !stored.insert(property.stored_name.as_str()) {
            return Err(MappingError::invalid_mapping(
                name,
                format!("stored name `{}` used by more than one field", property.stored_name),
            ));
        }
    }
    for relationship in descriptor.relationships() {
        validate_relationship(name, relationship)?;
        if !fields.insert(relationship.field.as_str()) {
            return Err(MappingError::invalid_mapping(
                name,
                format!("duplicate field `{}`", relationship.field),
            ));
        }
    }
    if let Some(field) = descriptor.dynamic_labels_field() {
        if descriptor.is_relationship_entity() {
            return Err(MappingError::invalid_mapping(
                name,
                "relationship entities carry no labels",
            ));
        }
        if !fields.insert(field) {
            return Err(MappingError::invalid_mapping(
                name,
                format!("duplicate field `{field}`"),
            ));
        }
    }
    if descriptor.version_property().is_some() && descriptor.is_relationship_entity() {
        return Err(MappingError::invalid_mapping(
            name,
            "only node entities can be versioned",
        ));
    }
    Ok(())
}

fn validate_relationship(
    entity: &str,
    relationship: &RelationshipDescriptor,
) -> Result<(), MappingError> {
    match (&relationship.rel_type, relationship.cardinality) {
        (None, Cardinality::Grouped) => Ok(()),
        (Some(_), Cardinality::Grouped) => Err(MappingError::invalid_mapping(
            entity,
            format!(
                "grouped field `{}` takes its relationship types from the graph",
                relationship.field
            ),
        )),
        (None, _) => Err(MappingError::invalid_mapping(
            entity,
            format!("field `{}` needs a relationship type", relationship.field),
        )),
        (Some(rel_type), _) if rel_type.trim().is_empty() => Err(MappingError::invalid_mapping(
            entity,
            format!("field `{}` has an empty relationship type", relationship.field),
        )),
        _ => Ok(()),
    }
}

/// Frozen set of entity descriptors. Read-only, so it can be shared across
/// threads behind an `Arc` without locking.
#[derive(Debug)]
pub struct SchemaRegistry {
    entities: Vec<EntityDescriptor>,
    index: AHashMap<String, usize>,
}

impl SchemaRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn describe(&self, name: &str) -> Result<&EntityDescriptor, MappingError> {
        self.index
            .get(name)
            .map(|&position| &self.entities[position])
            .ok_or_else(|| MappingError::unknown_entity(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn resolve_id_expression(
        &self,
        descriptor: &EntityDescriptor,
    ) -> Result<Expression, MappingError> {
        let id = descriptor.id().ok_or_else(|| {
            MappingError::invalid_mapping(descriptor.name(), "expected exactly one id field")
        })?;
        Ok(match &id.strategy {
            IdStrategy::Internal => Expression::InternalId,
            IdStrategy::Assigned { property, .. } => Expression::Property(property.clone()),
        })
    }

    /// Target descriptor of a relationship field, looked up by name so that
    /// mutually referential types never need to exist in any particular order.
    pub fn target(
        &self,
        owner: &EntityDescriptor,
        relationship: &RelationshipDescriptor,
    ) -> Result<&EntityDescriptor, MappingError> {
        self.describe(&relationship.target).map_err(|_| {
            MappingError::invalid_mapping(
                owner.name(),
                format!(
                    "relationship field `{}` targets unregistered type {}",
                    relationship.field, relationship.target
                ),
            )
        })
    }

    /// Relationship entity mapped to a relationship type.
    pub fn relationship_entity(&self, rel_type: &str) -> Option<&EntityDescriptor> {
        self.entities
            .iter()
            .find(|descriptor| descriptor.rel_type() == Some(rel_type))
    }

    /// Picks the most specific node type whose labels are all present on the node.
    pub fn resolve_labels(
        &self,
        node_id: i64,
        labels: &[String],
    ) -> Result<&EntityDescriptor, MappingError> {
        let present = label_set(labels);
        let candidates: Vec<&EntityDescriptor> = self
            .entities
            .iter()
            .filter(|descriptor| !descriptor.is_relationship_entity())
            .filter(|descriptor| {
                descriptor
                    .node_labels()
                    .iter()
                    .all(|label| present.contains(label.as_str()))
            })
            .collect();
        let maximal: Vec<&EntityDescriptor> = candidates
            .iter()
            .filter(|candidate| {
                let own = label_set(candidate.node_labels());
                !candidates.iter().any(|other| {
                    let theirs = label_set(other.node_labels());
                    own.len() < theirs.len() && own.is_subset(&theirs)
                })
            })
            .copied()
            .collect();
        match maximal.as_slice() {
            [only] => Ok(*only),
            [] => Err(MappingError::materialization(
                node_id,
                labels,
                "no registered entity type matches these labels",
            )),
            many => Err(MappingError::materialization(
                node_id,
                labels,
                format!(
                    "ambiguous mapping between {}",
                    many.iter()
                        .map(|descriptor| descriptor.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )),
        }
    }

    /// Whether instances of `descriptor` can stand in for `requested`: the same
    /// type, or a node type carrying every label of the requested one.
    pub fn is_assignable(&self, descriptor: &EntityDescriptor, requested: &EntityDescriptor) -> bool {
        if descriptor.name() == requested.name() {
            return true;
        }
        if descriptor.is_relationship_entity() || requested.is_relationship_entity() {
            return false;
        }
        let own = label_set(descriptor.node_labels());
        requested
            .node_labels()
            .iter()
            .all(|label| own.contains(label.as_str()))
    }
}
