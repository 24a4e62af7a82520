use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Entity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Boolean,
    Integer,
    Float,
    String,
    List,
    Map,
    Any,
}

impl ScalarKind {
    /// Coerces a non-null value into this kind. Integers widen to floats and whole
    /// floats narrow to integers; everything else must already match.
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (ScalarKind::Any, value) => Ok(value),
            (ScalarKind::Boolean, value @ Value::Bool(_)) => Ok(value),
            (ScalarKind::String, value @ Value::String(_)) => Ok(value),
            (ScalarKind::List, value @ Value::Array(_)) => Ok(value),
            (ScalarKind::Map, value @ Value::Object(_)) => Ok(value),
            (ScalarKind::Integer, Value::Number(number)) => {
                if let Some(int) = number.as_i64() {
                    Ok(Value::from(int))
                } else {
                    match number.as_f64() {
                        Some(float) if float.fract() == 0.0 && float.abs() < 9.0e15 => {
                            Ok(Value::from(float as i64))
                        }
                        _ => Err(format!("{number} is not an integer")),
                    }
                }
            }
            (ScalarKind::Float, Value::Number(number)) => number
                .as_f64()
                .map(Value::from)
                .ok_or_else(|| format!("{number} is not a float")),
            (kind, other) => Err(format!("expected {kind:?}, found {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub field: String,
    pub stored_name: String,
    pub kind: ScalarKind,
    pub nullable: bool,
}

impl PropertyDescriptor {
    pub fn new<F: Into<String>>(field: F, kind: ScalarKind) -> Self {
        let field = field.into();
        Self {
            stored_name: field.clone(),
            field,
            kind,
            nullable: true,
        }
    }

    /// Stores the field under a different graph property name.
    pub fn stored_as<S: Into<String>>(mut self, stored_name: S) -> Self {
        self.stored_name = stored_name.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Outgoing,
    Incoming,
    Undirected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    Single,
    Collection,
    /// Map of collections keyed by a relationship type only known at runtime.
    Grouped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    pub field: String,
    pub rel_type: Option<String>,
    pub direction: Direction,
    pub target: String,
    pub cardinality: Cardinality,
}

impl RelationshipDescriptor {
    pub fn single<F, R, T>(field: F, rel_type: R, direction: Direction, target: T) -> Self
    where
        F: Into<String>,
        R: Into<String>,
        T: Into<String>,
    {
        Self {
            field: field.into(),
            rel_type: Some(rel_type.into()),
            direction,
            target: target.into(),
            cardinality: Cardinality::Single,
        }
    }

    pub fn collection<F, R, T>(field: F, rel_type: R, direction: Direction, target: T) -> Self
    where
        F: Into<String>,
        R: Into<String>,
        T: Into<String>,
    {
        Self {
            cardinality: Cardinality::Collection,
            ..Self::single(field, rel_type, direction, target)
        }
    }

    pub fn grouped<F, T>(field: F, direction: Direction, target: T) -> Self
    where
        F: Into<String>,
        T: Into<String>,
    {
        Self {
            field: field.into(),
            rel_type: None,
            direction,
            target: target.into(),
            cardinality: Cardinality::Grouped,
        }
    }

    pub fn matches_type(&self, rel_type: &str) -> bool {
        match &self.rel_type {
            Some(declared) => declared == rel_type,
            None => self.cardinality == Cardinality::Grouped,
        }
    }
}

type GenerateFn = dyn Fn(&Entity, &str) -> Value + Send + Sync;

/// Produces an assigned id from the entity and its primary label.
#[derive(Clone)]
pub struct IdGenerator {
    name: String,
    generate: Arc<GenerateFn>,
}

impl IdGenerator {
    pub fn new<N, F>(name: N, generate: F) -> Self
    where
        N: Into<String>,
        F: Fn(&Entity, &str) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            generate: Arc::new(generate),
        }
    }

    /// Random UUID v4 rendered as a hyphenated string.
    pub fn uuid() -> Self {
        Self::new("uuid", |_, _| Value::String(uuid::Uuid::new_v4().to_string()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generate(&self, entity: &Entity, label: &str) -> Value {
        (self.generate)(entity, label)
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator").field("name", &self.name).finish()
    }
}

/// Generators are identified by name.
impl PartialEq for IdGenerator {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum IdStrategy {
    /// Store-assigned surrogate identity.
    Internal,
    /// Application-owned id kept in the graph property `property`.
    Assigned {
        property: String,
        generator: Option<IdGenerator>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct IdDescriptor {
    pub field: String,
    pub strategy: IdStrategy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Node {
        labels: Vec<String>,
    },
    Relationship {
        rel_type: String,
        start: String,
        end: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntityDescriptor {
    name: String,
    kind: EntityKind,
    ids: Vec<IdDescriptor>,
    properties: Vec<PropertyDescriptor>,
    relationships: Vec<RelationshipDescriptor>,
    version: Option<String>,
    dynamic_labels: Option<String>,
}

impl EntityDescriptor {
    /// Node entity labelled with its own name until [`EntityDescriptor::labels`] says otherwise.
    pub fn node<N: Into<String>>(name: N) -> Self {
        let name = name.into();
        Self {
            kind: EntityKind::Node {
                labels: vec![name.clone()],
            },
            name,
            ids: Vec::new(),
            properties: Vec::new(),
            relationships: Vec::new(),
            version: None,
            dynamic_labels: None,
        }
    }

    /// Relationship entity of type `rel_type` running from a `start` node type to an `end` node type.
    pub fn relationship_entity<N, R, S, E>(name: N, rel_type: R, start: S, end: E) -> Self
    where
        N: Into<String>,
        R: Into<String>,
        S: Into<String>,
        E: Into<String>,
    {
        Self {
            name: name.into(),
            kind: EntityKind::Relationship {
                rel_type: rel_type.into(),
                start: start.into(),
                end: end.into(),
            },
            ids: Vec::new(),
            properties: Vec::new(),
            relationships: Vec::new(),
            version: None,
            dynamic_labels: None,
        }
    }

    /// Replaces the label set; the first label is the primary one.
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let EntityKind::Node { labels: current } = &mut self.kind {
            *current = labels.into_iter().map(Into::into).collect();
        }
        self
    }

    pub fn internal_id<F: Into<String>>(mut self, field: F) -> Self {
        self.ids.push(IdDescriptor {
            field: field.into(),
            strategy: IdStrategy::Internal,
        });
        self
    }

    pub fn assigned_id<F: Into<String>>(mut self, field: F) -> Self {
        let field = field.into();
        self.ids.push(IdDescriptor {
            strategy: IdStrategy::Assigned {
                property: field.clone(),
                generator: None,
            },
            field,
        });
        self
    }

    pub fn generated_id<F: Into<String>>(mut self, field: F, generator: IdGenerator) -> Self {
        let field = field.into();
        self.ids.push(IdDescriptor {
            strategy: IdStrategy::Assigned {
                property: field.clone(),
                generator: Some(generator),
            },
            field,
        });
        self
    }

    pub fn id_descriptor(mut self, id: IdDescriptor) -> Self {
        self.ids.push(id);
        self
    }

    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    pub fn relationship(mut self, relationship: RelationshipDescriptor) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Integer property guarding writes: a save only applies when the stored
    /// value still equals the one last read, and bumps it by one.
    pub fn version<F: Into<String>>(mut self, field: F) -> Self {
        let field = field.into();
        self.properties
            .push(PropertyDescriptor::new(field.clone(), ScalarKind::Integer));
        self.version = Some(field);
        self
    }

    /// List field holding the node labels no mapped type claims.
    pub fn dynamic_labels<F: Into<String>>(mut self, field: F) -> Self {
        self.dynamic_labels = Some(field.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn is_relationship_entity(&self) -> bool {
        matches!(self.kind, EntityKind::Relationship { .. })
    }

    /// Node labels, empty for relationship entities.
    pub fn node_labels(&self) -> &[String] {
        match &self.kind {
            EntityKind::Node { labels } => labels,
            EntityKind::Relationship { .. } => &[],
        }
    }

    pub fn primary_label(&self) -> Option<&str> {
        self.node_labels().first().map(String::as_str)
    }

    pub fn rel_type(&self) -> Option<&str> {
        match &self.kind {
            EntityKind::Relationship { rel_type, .. } => Some(rel_type),
            EntityKind::Node { .. } => None,
        }
    }

    /// The id field; `None` unless exactly one was declared.
    pub fn id(&self) -> Option<&IdDescriptor> {
        match self.ids.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    pub fn declared_ids(&self) -> &[IdDescriptor] {
        &self.ids
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn relationships(&self) -> &[RelationshipDescriptor] {
        &self.relationships
    }

    pub fn property_by_field(&self, field: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.field == field)
    }

    pub fn property_by_stored_name(&self, stored_name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.stored_name == stored_name)
    }

    pub fn version_property(&self) -> Option<&PropertyDescriptor> {
        self.version
            .as_deref()
            .and_then(|field| self.property_by_field(field))
    }

    pub fn dynamic_labels_field(&self) -> Option<&str> {
        self.dynamic_labels.as_deref()
    }

    pub fn relationship_field(&self, field: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.iter().find(|r| r.field == field)
    }

    /// Graph property holding the assigned id, if the type uses one.
    pub fn assigned_id_property(&self) -> Option<&str> {
        match self.id().map(|id| &id.strategy) {
            Some(IdStrategy::Assigned { property, .. }) => Some(property),
            _ => None,
        }
    }
}
