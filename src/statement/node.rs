//! Node-anchored reads. Zero bounds return bare nodes; positive or unbounded
//! bounds return the distinct paths around each anchor.

use serde_json::Value;

use crate::{
    depth::DepthBound,
    errors::MappingError,
    schema::{EntityDescriptor, SchemaRegistry},
    statement::{
        Anchor, ComparisonOperator, Filter, Operation, Parameters, Predicate, ResultShape,
        Statement, filter_predicates, id_predicate, label_fragment, require_node_entity,
        where_clause,
    },
};

pub fn find_one(
    registry: &SchemaRegistry,
    descriptor: &EntityDescriptor,
    id: Value,
    bound: DepthBound,
) -> Result<Statement, MappingError> {
    require_node_entity(descriptor)?;
    let predicate = id_predicate(registry, descriptor, ComparisonOperator::Equals, "id")?;
    let matched = format!(
        "MATCH (n{}){}",
        label_fragment(descriptor.node_labels()),
        where_clause(std::slice::from_ref(&predicate), "n")
    );
    let (text, shape) = if bound.is_zero() {
        (format!("{matched} RETURN n"), ResultShape::Node)
    } else {
        (
            format!(
                "{matched} WITH n MATCH p=(n)-[{}]-(m) RETURN collect(distinct p)",
                bound.pattern()
            ),
            ResultShape::Paths,
        )
    };
    let mut parameters = Parameters::new();
    parameters.insert("id".to_string(), id);
    Ok(Statement::new(
        text,
        parameters,
        Operation::Load {
            anchor: node_anchor(descriptor, vec![predicate]),
            bound,
            shape,
        },
    ))
}

pub fn find_all_by_id(
    registry: &SchemaRegistry,
    descriptor: &EntityDescriptor,
    ids: Vec<Value>,
    bound: DepthBound,
) -> Result<Option<Statement>, MappingError> {
    require_node_entity(descriptor)?;
    if ids.is_empty() {
        return Ok(None);
    }
    let predicate = id_predicate(registry, descriptor, ComparisonOperator::In, "ids")?;
    let matched = format!(
        "MATCH (n{}){}",
        label_fragment(descriptor.node_labels()),
        where_clause(std::slice::from_ref(&predicate), "n")
    );
    let (text, shape) = collected(matched, bound);
    let mut parameters = Parameters::new();
    parameters.insert("ids".to_string(), Value::Array(ids));
    Ok(Some(Statement::new(
        text,
        parameters,
        Operation::Load {
            anchor: node_anchor(descriptor, vec![predicate]),
            bound,
            shape,
        },
    )))
}

pub fn find_by_label(
    descriptor: &EntityDescriptor,
    bound: DepthBound,
) -> Result<Statement, MappingError> {
    require_node_entity(descriptor)?;
    let matched = format!("MATCH (n{})", label_fragment(descriptor.node_labels()));
    let (text, shape) = collected(matched, bound);
    Ok(Statement::new(
        text,
        Parameters::new(),
        Operation::Load {
            anchor: node_anchor(descriptor, Vec::new()),
            bound,
            shape,
        },
    ))
}

/// One row per anchor node: its paths plus its internal id, so that callers can
/// tell which paths belong to which match. Depth zero still returns the anchor as
/// a zero-length path.
pub fn find_by_property(
    descriptor: &EntityDescriptor,
    filters: &[Filter],
    bound: DepthBound,
) -> Result<Statement, MappingError> {
    require_node_entity(descriptor)?;
    let (predicates, parameters) = filter_predicates(descriptor, filters)?;
    let text = format!(
        "MATCH (n{}){} WITH n MATCH p=(n)-[{}]-(m) RETURN collect(distinct p), ID(n)",
        label_fragment(descriptor.node_labels()),
        where_clause(&predicates, "n"),
        bound.pattern()
    );
    Ok(Statement::new(
        text,
        parameters,
        Operation::Load {
            anchor: node_anchor(descriptor, predicates),
            bound,
            shape: ResultShape::PathsPerAnchor,
        },
    ))
}

fn collected(matched: String, bound: DepthBound) -> (String, ResultShape) {
    if bound.is_zero() {
        (format!("{matched} RETURN collect(n)"), ResultShape::Nodes)
    } else {
        (
            format!(
                "{matched} WITH n MATCH p=(n)-[{}]-(m) RETURN collect(distinct p)",
                bound.pattern()
            ),
            ResultShape::Paths,
        )
    }
}

fn node_anchor(descriptor: &EntityDescriptor, predicates: Vec<Predicate>) -> Anchor {
    Anchor::Nodes {
        labels: descriptor.node_labels().to_vec(),
        predicates,
    }
}
