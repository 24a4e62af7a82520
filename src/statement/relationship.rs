//! Reads anchored at relationship entities. The anchor relationship is returned
//! next to the paths collected from both of its endpoints, one hop shorter than
//! the bound since reaching an endpoint already costs one.

use serde_json::Value;

use crate::{
    depth::DepthBound,
    errors::MappingError,
    schema::{EntityDescriptor, SchemaRegistry},
    statement::{
        Anchor, ComparisonOperator, Filter, Operation, Parameters, Predicate, ResultShape,
        Statement, filter_predicates, id_predicate, quote, where_clause,
    },
};

pub fn find_one(
    registry: &SchemaRegistry,
    descriptor: &EntityDescriptor,
    id: Value,
    bound: DepthBound,
) -> Result<Statement, MappingError> {
    let rel_type = check(descriptor, bound)?;
    let predicate = id_predicate(registry, descriptor, ComparisonOperator::Equals, "id")?;
    let mut parameters = Parameters::new();
    parameters.insert("id".to_string(), id);
    Ok(build(rel_type, vec![predicate], parameters, bound))
}

pub fn find_all_by_id(
    registry: &SchemaRegistry,
    descriptor: &EntityDescriptor,
    ids: Vec<Value>,
    bound: DepthBound,
) -> Result<Option<Statement>, MappingError> {
    let rel_type = check(descriptor, bound)?;
    if ids.is_empty() {
        return Ok(None);
    }
    let predicate = id_predicate(registry, descriptor, ComparisonOperator::In, "ids")?;
    let mut parameters = Parameters::new();
    parameters.insert("ids".to_string(), Value::Array(ids));
    Ok(Some(build(rel_type, vec![predicate], parameters, bound)))
}

pub fn find_all_by_type(
    descriptor: &EntityDescriptor,
    bound: DepthBound,
) -> Result<Statement, MappingError> {
    let rel_type = check(descriptor, bound)?;
    Ok(build(rel_type, Vec::new(), Parameters::new(), bound))
}

pub fn find_by_property(
    descriptor: &EntityDescriptor,
    filters: &[Filter],
    bound: DepthBound,
) -> Result<Statement, MappingError> {
    let rel_type = check(descriptor, bound)?;
    let (predicates, parameters) = filter_predicates(descriptor, filters)?;
    Ok(build(rel_type, predicates, parameters, bound))
}

/// Rejects zero bounds before any text exists: a relationship entity loaded
/// without traversal has neither of its endpoints.
fn check(descriptor: &EntityDescriptor, bound: DepthBound) -> Result<&str, MappingError> {
    let rel_type = descriptor.rel_type().ok_or_else(|| {
        MappingError::invalid_mapping(descriptor.name(), "not a relationship entity")
    })?;
    if bound.is_zero() {
        return Err(MappingError::invalid_depth(
            descriptor.name(),
            format!("relationship entities need a depth of at least 1, got {bound}"),
        ));
    }
    Ok(rel_type)
}

fn build(
    rel_type: &str,
    predicates: Vec<Predicate>,
    parameters: Parameters,
    bound: DepthBound,
) -> Statement {
    let hops = bound.after(1).pattern();
    let text = format!(
        "MATCH ()-[r0:{}]->(){} WITH r0, startNode(r0) AS n, endNode(r0) AS m \
         MATCH p1=(n)-[{hops}]-() WITH r0, collect(distinct p1) AS startPaths, m \
         MATCH p2=(m)-[{hops}]-() WITH r0, startPaths, collect(distinct p2) AS endPaths \
         WITH r0, startPaths + endPaths AS paths UNWIND paths AS p RETURN DISTINCT p, r0",
        quote(rel_type),
        where_clause(&predicates, "r0"),
    );
    Statement::new(
        text,
        parameters,
        Operation::Load {
            anchor: Anchor::Relationships {
                rel_type: rel_type.to_string(),
                predicates,
            },
            bound,
            shape: ResultShape::RelationshipPaths,
        },
    )
}
