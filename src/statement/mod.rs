//! Cypher statement generation. Every statement carries its text, its named
//! parameters, and a structured [`Operation`] that embedded executors interpret
//! instead of parsing the text.

pub mod count;
pub mod delete;
pub mod filter;
pub mod node;
pub mod relationship;
pub mod write;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::{
    decompose::WritePlan,
    depth::DepthBound,
    errors::MappingError,
    schema::{EntityDescriptor, SchemaRegistry},
};

pub use filter::{ComparisonOperator, Filter, Predicate};

pub type Parameters = BTreeMap<String, Value>;

/// Column holding the distinct paths collected around each anchor.
pub const PATHS_COLUMN: &str = "collect(distinct p)";
/// Column of a single node returned at depth zero.
pub const NODE_COLUMN: &str = "n";
/// Column of the collected anchor nodes returned at depth zero.
pub const NODES_COLUMN: &str = "collect(n)";
/// Internal id of the anchor node, returned next to its paths by property searches.
pub const ANCHOR_ID_COLUMN: &str = "ID(n)";
pub const COUNT_COLUMN: &str = "COUNT(n)";
pub const RELATIONSHIP_COUNT_COLUMN: &str = "COUNT(r0)";
/// Per-row path column of relationship-anchored reads.
pub const PATH_COLUMN: &str = "p";
/// Anchor relationship column of relationship-anchored reads.
pub const RELATIONSHIP_COLUMN: &str = "r0";

/// Backtick-quotes a label, relationship type or property name.
pub fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub(crate) fn label_fragment(labels: &[String]) -> String {
    labels.iter().map(|label| format!(":{}", quote(label))).collect()
}

/// What a read returns, column for column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultShape {
    /// One row, [`NODE_COLUMN`].
    Node,
    /// One row, [`NODES_COLUMN`].
    Nodes,
    /// One row, [`PATHS_COLUMN`].
    Paths,
    /// One row per anchor, [`PATHS_COLUMN`] and [`ANCHOR_ID_COLUMN`].
    PathsPerAnchor,
    /// One row per distinct path, [`PATH_COLUMN`] and [`RELATIONSHIP_COLUMN`].
    RelationshipPaths,
}

/// Where a statement starts matching.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Anchor {
    /// Nodes carrying every label (any node when empty) and satisfying every predicate.
    Nodes {
        labels: Vec<String>,
        predicates: Vec<Predicate>,
    },
    /// Relationships of one type satisfying every predicate.
    Relationships {
        rel_type: String,
        predicates: Vec<Predicate>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Load {
        anchor: Anchor,
        bound: DepthBound,
        shape: ResultShape,
    },
    Delete {
        anchor: Anchor,
    },
    Count {
        labels: Vec<String>,
    },
    CountRelationships {
        rel_type: String,
    },
    Write(WritePlan),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    text: String,
    parameters: Parameters,
    operation: Operation,
}

impl Statement {
    pub(crate) fn new(text: String, parameters: Parameters, operation: Operation) -> Self {
        debug!(statement = %text, parameters = parameters.len(), "generated statement");
        Self {
            text,
            parameters,
            operation,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }
}

/// Statement factory bound to one registry.
#[derive(Clone, Copy)]
pub struct StatementGenerator<'r> {
    registry: &'r SchemaRegistry,
}

impl<'r> StatementGenerator<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r SchemaRegistry {
        self.registry
    }

    pub fn find_one(
        &self,
        descriptor: &EntityDescriptor,
        id: Value,
        bound: DepthBound,
    ) -> Result<Statement, MappingError> {
        node::find_one(self.registry, descriptor, id, bound)
    }

    /// `None` when `ids` is empty: there is nothing to query.
    pub fn find_all_by_id(
        &self,
        descriptor: &EntityDescriptor,
        ids: Vec<Value>,
        bound: DepthBound,
    ) -> Result<Option<Statement>, MappingError> {
        node::find_all_by_id(self.registry, descriptor, ids, bound)
    }

    pub fn find_by_label(
        &self,
        descriptor: &EntityDescriptor,
        bound: DepthBound,
    ) -> Result<Statement, MappingError> {
        node::find_by_label(descriptor, bound)
    }

    pub fn find_by_property(
        &self,
        descriptor: &EntityDescriptor,
        filters: &[Filter],
        bound: DepthBound,
    ) -> Result<Statement, MappingError> {
        node::find_by_property(descriptor, filters, bound)
    }

    pub fn find_one_relationship(
        &self,
        descriptor: &EntityDescriptor,
        id: Value,
        bound: DepthBound,
    ) -> Result<Statement, MappingError> {
        relationship::find_one(self.registry, descriptor, id, bound)
    }

    pub fn find_all_relationships_by_id(
        &self,
        descriptor: &EntityDescriptor,
        ids: Vec<Value>,
        bound: DepthBound,
    ) -> Result<Option<Statement>, MappingError> {
        relationship::find_all_by_id(self.registry, descriptor, ids, bound)
    }

    pub fn find_all_relationships_by_type(
        &self,
        descriptor: &EntityDescriptor,
        bound: DepthBound,
    ) -> Result<Statement, MappingError> {
        relationship::find_all_by_type(descriptor, bound)
    }

    pub fn find_by_relationship_property(
        &self,
        descriptor: &EntityDescriptor,
        filters: &[Filter],
        bound: DepthBound,
    ) -> Result<Statement, MappingError> {
        relationship::find_by_property(descriptor, filters, bound)
    }

    pub fn delete_one(
        &self,
        descriptor: &EntityDescriptor,
        id: Value,
    ) -> Result<Statement, MappingError> {
        delete::delete_one(self.registry, descriptor, id)
    }

    pub fn delete_all_by_id(
        &self,
        descriptor: &EntityDescriptor,
        ids: Vec<Value>,
    ) -> Result<Option<Statement>, MappingError> {
        delete::delete_all_by_id(self.registry, descriptor, ids)
    }

    pub fn delete_by_label(&self, descriptor: &EntityDescriptor) -> Result<Statement, MappingError> {
        delete::delete_by_label(descriptor)
    }

    pub fn delete_relationship(
        &self,
        descriptor: &EntityDescriptor,
        id: Value,
    ) -> Result<Statement, MappingError> {
        delete::delete_relationship(self.registry, descriptor, id)
    }

    pub fn delete_relationships_by_id(
        &self,
        descriptor: &EntityDescriptor,
        ids: Vec<Value>,
    ) -> Result<Option<Statement>, MappingError> {
        delete::delete_relationships_by_id(self.registry, descriptor, ids)
    }

    pub fn delete_all_relationships(
        &self,
        descriptor: &EntityDescriptor,
    ) -> Result<Statement, MappingError> {
        delete::delete_all_relationships(descriptor)
    }

    pub fn purge_all(&self) -> Statement {
        delete::purge_all()
    }

    pub fn count_by_labels(&self, labels: &[String]) -> Statement {
        count::count_by_labels(labels)
    }

    pub fn count_relationships(&self, rel_type: &str) -> Statement {
        count::count_relationships(rel_type)
    }

    pub fn compile_write(&self, plan: &WritePlan) -> Statement {
        write::compile(plan)
    }
}

pub(crate) fn id_predicate(
    registry: &SchemaRegistry,
    descriptor: &EntityDescriptor,
    operator: ComparisonOperator,
    parameter: &str,
) -> Result<Predicate, MappingError> {
    Ok(Predicate {
        expression: registry.resolve_id_expression(descriptor)?,
        operator,
        parameter: Some(parameter.to_string()),
    })
}

/// Resolves filters into predicates and parameters, naming each parameter after its
/// field and position.
pub(crate) fn filter_predicates(
    descriptor: &EntityDescriptor,
    filters: &[Filter],
) -> Result<(Vec<Predicate>, Parameters), MappingError> {
    let mut predicates = Vec::with_capacity(filters.len());
    let mut parameters = Parameters::new();
    for (index, filter) in filters.iter().enumerate() {
        let expression = filter::field_expression(descriptor, &filter.field)?;
        let parameter = if filter.operator.takes_value() {
            let name = filter::parameter_name(&filter.field, index);
            parameters.insert(name.clone(), filter.value.clone());
            Some(name)
        } else {
            None
        };
        predicates.push(Predicate {
            expression,
            operator: filter.operator,
            parameter,
        });
    }
    Ok((predicates, parameters))
}

pub(crate) fn where_clause(predicates: &[Predicate], variable: &str) -> String {
    if predicates.is_empty() {
        return String::new();
    }
    let rendered: Vec<String> = predicates.iter().map(|p| p.render(variable)).collect();
    format!(" WHERE {}", rendered.join(" AND "))
}

pub(crate) fn require_node_entity(descriptor: &EntityDescriptor) -> Result<(), MappingError> {
    if descriptor.is_relationship_entity() {
        return Err(MappingError::invalid_mapping(
            descriptor.name(),
            "relationship entities are loaded with the relationship queries",
        ));
    }
    Ok(())
}
