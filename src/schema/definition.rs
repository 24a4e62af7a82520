//! Declarative, serde-readable form of the entity table, for mappings kept in
//! configuration files instead of code.

use serde::{Deserialize, Serialize};

use crate::{
    errors::MappingError,
    schema::{
        descriptor::{
            Cardinality, Direction, EntityDescriptor, IdDescriptor, IdGenerator, IdStrategy,
            PropertyDescriptor, RelationshipDescriptor, ScalarKind,
        },
        registry::SchemaRegistry,
    },
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub entities: Vec<EntityDefinition>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub relationship: Option<RelationshipEntityDefinition>,
    pub id: IdDefinition,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDefinition>,
    /// Integer version field guarding concurrent saves.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub dynamic_labels: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEntityDefinition {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub start: String,
    pub end: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategyDefinition {
    #[default]
    Internal,
    Assigned,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdDefinition {
    pub field: String,
    #[serde(default)]
    pub strategy: IdStrategyDefinition,
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub generator: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub field: String,
    #[serde(default)]
    pub stored_name: Option<String>,
    #[serde(default = "default_kind")]
    pub kind: ScalarKind,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    pub field: String,
    #[serde(rename = "type", default)]
    pub rel_type: Option<String>,
    #[serde(default = "default_direction")]
    pub direction: Direction,
    pub target: String,
    #[serde(default = "default_cardinality")]
    pub cardinality: Cardinality,
}

fn default_kind() -> ScalarKind {
    ScalarKind::Any
}

fn default_nullable() -> bool {
    true
}

fn default_direction() -> Direction {
    Direction::Outgoing
}

fn default_cardinality() -> Cardinality {
    Cardinality::Collection
}

impl SchemaDefinition {
    pub fn from_json(text: &str) -> Result<Self, MappingError> {
        serde_json::from_str(text).map_err(|e| MappingError::config(e.to_string()))
    }

    pub fn descriptors(&self) -> Result<Vec<EntityDescriptor>, MappingError> {
        self.entities.iter().map(EntityDefinition::descriptor).collect()
    }

    pub fn build_registry(&self) -> Result<SchemaRegistry, MappingError> {
        let mut builder = SchemaRegistry::builder();
        for descriptor in self.descriptors()? {
            builder.register(descriptor)?;
        }
        builder.build()
    }
}

impl EntityDefinition {
    pub fn descriptor(&self) -> Result<EntityDescriptor, MappingError> {
        let mut descriptor = match &self.relationship {
            Some(rel) => EntityDescriptor::relationship_entity(
                &self.name,
                &rel.rel_type,
                &rel.start,
                &rel.end,
            ),
            None if self.labels.is_empty() => EntityDescriptor::node(&self.name),
            None => EntityDescriptor::node(&self.name).labels(&self.labels),
        };
        descriptor = descriptor.id_descriptor(self.id.descriptor()?);
        for property in &self.properties {
            let mut mapped = PropertyDescriptor::new(&property.field, property.kind);
            if let Some(stored) = &property.stored_name {
                mapped = mapped.stored_as(stored);
            }
            if !property.nullable {
                mapped = mapped.required();
            }
            descriptor = descriptor.property(mapped);
        }
        for relationship in &self.relationships {
            descriptor = descriptor.relationship(RelationshipDescriptor {
                field: relationship.field.clone(),
                rel_type: relationship.rel_type.clone(),
                direction: relationship.direction,
                target: relationship.target.clone(),
                cardinality: relationship.cardinality,
            });
        }
        if let Some(field) = &self.version {
            descriptor = descriptor.version(field);
        }
        if let Some(field) = &self.dynamic_labels {
            descriptor = descriptor.dynamic_labels(field);
        }
        Ok(descriptor)
    }
}

impl IdDefinition {
    fn descriptor(&self) -> Result<IdDescriptor, MappingError> {
        let strategy = match self.strategy {
            IdStrategyDefinition::Internal => IdStrategy::Internal,
            IdStrategyDefinition::Assigned => IdStrategy::Assigned {
                property: self.property.clone().unwrap_or_else(|| self.field.clone()),
                generator: self.generator.as_deref().map(named_generator).transpose()?,
            },
        };
        Ok(IdDescriptor {
            field: self.field.clone(),
            strategy,
        })
    }
}

fn named_generator(name: &str) -> Result<IdGenerator, MappingError> {
    match name {
        "uuid" => Ok(IdGenerator::uuid()),
        other => Err(MappingError::config(format!("unknown id generator `{other}`"))),
    }
}
