//! Deletes. Adjacent relationships are matched optionally so that isolated nodes
//! delete cleanly.

use serde_json::Value;

use crate::{
    errors::MappingError,
    schema::{EntityDescriptor, SchemaRegistry},
    statement::{
        Anchor, ComparisonOperator, Operation, Parameters, Predicate, Statement, id_predicate,
        label_fragment, quote, require_node_entity, where_clause,
    },
};

const DETACH: &str = "OPTIONAL MATCH (n)-[r0]-() DELETE r0, n";

pub fn delete_one(
    registry: &SchemaRegistry,
    descriptor: &EntityDescriptor,
    id: Value,
) -> Result<Statement, MappingError> {
    require_node_entity(descriptor)?;
    let predicate = id_predicate(registry, descriptor, ComparisonOperator::Equals, "id")?;
    let mut parameters = Parameters::new();
    parameters.insert("id".to_string(), id);
    Ok(detach(descriptor.node_labels(), vec![predicate], parameters))
}

pub fn delete_all_by_id(
    registry: &SchemaRegistry,
    descriptor: &EntityDescriptor,
    ids: Vec<Value>,
) -> Result<Option<Statement>, MappingError> {
    require_node_entity(descriptor)?;
    if ids.is_empty() {
        return Ok(None);
    }
    let predicate = id_predicate(registry, descriptor, ComparisonOperator::In, "ids")?;
    let mut parameters = Parameters::new();
    parameters.insert("ids".to_string(), Value::Array(ids));
    Ok(Some(detach(descriptor.node_labels(), vec![predicate], parameters)))
}

pub fn delete_by_label(descriptor: &EntityDescriptor) -> Result<Statement, MappingError> {
    require_node_entity(descriptor)?;
    Ok(detach(descriptor.node_labels(), Vec::new(), Parameters::new()))
}

pub fn purge_all() -> Statement {
    detach(&[], Vec::new(), Parameters::new())
}

/// Removes one relationship entity; its endpoints stay.
pub fn delete_relationship(
    registry: &SchemaRegistry,
    descriptor: &EntityDescriptor,
    id: Value,
) -> Result<Statement, MappingError> {
    let predicate = id_predicate(registry, descriptor, ComparisonOperator::Equals, "id")?;
    let mut parameters = Parameters::new();
    parameters.insert("id".to_string(), id);
    remove_relationships(descriptor, predicate, parameters)
}

/// Removes every relationship entity whose id is listed. `None` for an empty list.
pub fn delete_relationships_by_id(
    registry: &SchemaRegistry,
    descriptor: &EntityDescriptor,
    ids: Vec<Value>,
) -> Result<Option<Statement>, MappingError> {
    relationship_type(descriptor)?;
    let predicate = id_predicate(registry, descriptor, ComparisonOperator::In, "ids")?;
    if ids.is_empty() {
        return Ok(None);
    }
    let mut parameters = Parameters::new();
    parameters.insert("ids".to_string(), Value::Array(ids));
    remove_relationships(descriptor, predicate, parameters).map(Some)
}

pub fn delete_all_relationships(descriptor: &EntityDescriptor) -> Result<Statement, MappingError> {
    let rel_type = relationship_type(descriptor)?;
    Ok(Statement::new(
        format!("MATCH ()-[r0:{}]->() DELETE r0", quote(rel_type)),
        Parameters::new(),
        Operation::Delete {
            anchor: Anchor::Relationships {
                rel_type: rel_type.to_string(),
                predicates: Vec::new(),
            },
        },
    ))
}

fn detach(labels: &[String], predicates: Vec<Predicate>, parameters: Parameters) -> Statement {
    let text = format!(
        "MATCH (n{}){} {DETACH}",
        label_fragment(labels),
        where_clause(&predicates, "n")
    );
    Statement::new(
        text,
        parameters,
        Operation::Delete {
            anchor: Anchor::Nodes {
                labels: labels.to_vec(),
                predicates,
            },
        },
    )
}

fn remove_relationships(
    descriptor: &EntityDescriptor,
    predicate: Predicate,
    parameters: Parameters,
) -> Result<Statement, MappingError> {
    let rel_type = relationship_type(descriptor)?;
    let text = format!(
        "MATCH ()-[r0:{}]->(){} DELETE r0",
        quote(rel_type),
        where_clause(std::slice::from_ref(&predicate), "r0")
    );
    Ok(Statement::new(
        text,
        parameters,
        Operation::Delete {
            anchor: Anchor::Relationships {
                rel_type: rel_type.to_string(),
                predicates: vec![predicate],
            },
        },
    ))
}

fn relationship_type(descriptor: &EntityDescriptor) -> Result<&str, MappingError> {
    descriptor
        .rel_type()
        .ok_or_else(|| MappingError::invalid_mapping(descriptor.name(), "not a relationship entity"))
}
