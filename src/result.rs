//! Value alphabet returned by a graph driver: scalars, nodes, relationships, paths,
//! and lists or maps nesting any of those.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type PropertyMap = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: PropertyMap,
}

impl RawNode {
    pub fn new<I, S>(id: i64, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            labels: labels.into_iter().map(Into::into).collect(),
            properties: PropertyMap::new(),
        }
    }

    pub fn with_property<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRelationship {
    pub id: i64,
    pub rel_type: String,
    pub start: i64,
    pub end: i64,
    pub properties: PropertyMap,
}

impl RawRelationship {
    pub fn new<T: Into<String>>(id: i64, rel_type: T, start: i64, end: i64) -> Self {
        Self {
            id,
            rel_type: rel_type.into(),
            start,
            end,
            properties: PropertyMap::new(),
        }
    }

    pub fn with_property<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// Alternating node/relationship sequence; `nodes.len() == relationships.len() + 1`
/// for every non-empty path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPath {
    pub nodes: Vec<RawNode>,
    pub relationships: Vec<RawRelationship>,
}

impl RawPath {
    pub fn single(node: RawNode) -> Self {
        Self {
            nodes: vec![node],
            relationships: Vec::new(),
        }
    }

    /// Extends the path by one hop.
    pub fn then(mut self, relationship: RawRelationship, node: RawNode) -> Self {
        self.relationships.push(relationship);
        self.nodes.push(node);
        self
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn start(&self) -> Option<&RawNode> {
        self.nodes.first()
    }

    pub fn end(&self) -> Option<&RawNode> {
        self.nodes.last()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RawValue {
    Scalar(Value),
    Node(RawNode),
    Relationship(RawRelationship),
    Path(RawPath),
    List(Vec<RawValue>),
    Map(BTreeMap<String, RawValue>),
}

impl RawValue {
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            RawValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar().and_then(Value::as_i64)
    }
}

impl From<RawNode> for RawValue {
    fn from(node: RawNode) -> Self {
        RawValue::Node(node)
    }
}

impl From<RawRelationship> for RawValue {
    fn from(relationship: RawRelationship) -> Self {
        RawValue::Relationship(relationship)
    }
}

impl From<RawPath> for RawValue {
    fn from(path: RawPath) -> Self {
        RawValue::Path(path)
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        RawValue::Scalar(value)
    }
}

/// One result row: named columns in driver order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, RawValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single<C: Into<String>, V: Into<RawValue>>(column: C, value: V) -> Self {
        Self::new().with(column, value)
    }

    pub fn with<C: Into<String>, V: Into<RawValue>>(mut self, column: C, value: V) -> Self {
        self.push(column, value);
        self
    }

    pub fn push<C: Into<String>, V: Into<RawValue>>(&mut self, column: C, value: V) {
        self.columns.push((column.into(), value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &RawValue> {
        self.columns.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
