use ahash::AHashSet;

use crate::{
    result::{RawNode, RawRelationship, RawValue, Row},
    statement::{ANCHOR_ID_COLUMN, NODE_COLUMN, NODES_COLUMN, PATHS_COLUMN, RELATIONSHIP_COLUMN},
};

/// Distinct nodes and relationships of a result in order of first appearance,
/// plus the anchors the statement matched when its columns say which those are.
#[derive(Debug, Default)]
pub(crate) struct GraphModel {
    pub nodes: Vec<RawNode>,
    pub relationships: Vec<RawRelationship>,
    pub anchor_nodes: Vec<i64>,
    pub anchor_relationships: Vec<i64>,
    seen_nodes: AHashSet<i64>,
    seen_relationships: AHashSet<i64>,
    seen_anchors: AHashSet<i64>,
}

impl GraphModel {
    pub fn from_rows(rows: &[Row]) -> Self {
        let mut model = Self::default();
        for row in rows {
            for (column, value) in row.columns().zip(row.values()) {
                model.anchors(column, value);
                model.add(value);
            }
        }
        model
    }

    fn add(&mut self, value: &RawValue) {
        match value {
            RawValue::Scalar(_) => {}
            RawValue::Node(node) => self.node(node),
            RawValue::Relationship(relationship) => self.relationship(relationship),
            RawValue::Path(path) => {
                for node in &path.nodes {
                    self.node(node);
                }
                for relationship in &path.relationships {
                    self.relationship(relationship);
                }
            }
            RawValue::List(items) => items.iter().for_each(|item| self.add(item)),
            RawValue::Map(entries) => entries.values().for_each(|item| self.add(item)),
        }
    }

    fn node(&mut self, node: &RawNode) {
        if self.seen_nodes.insert(node.id) {
            self.nodes.push(node.clone());
        }
    }

    fn relationship(&mut self, relationship: &RawRelationship) {
        if self.seen_relationships.insert(relationship.id) {
            self.relationships.push(relationship.clone());
        }
    }

    fn anchor_node(&mut self, id: i64) {
        if self.seen_anchors.insert(id) {
            self.anchor_nodes.push(id);
        }
    }

    fn anchors(&mut self, column: &str, value: &RawValue) {
        match (column, value) {
            (ANCHOR_ID_COLUMN, RawValue::Scalar(id)) => {
                if let Some(id) = id.as_i64() {
                    self.anchor_node(id);
                }
            }
            (NODE_COLUMN, RawValue::Node(node)) => self.anchor_node(node.id),
            (NODES_COLUMN, RawValue::List(items)) => {
                for item in items {
                    if let RawValue::Node(node) = item {
                        self.anchor_node(node.id);
                    }
                }
            }
            // Collected paths all start at their anchor.
            (PATHS_COLUMN, RawValue::List(items)) => {
                for item in items {
                    if let RawValue::Path(path) = item {
                        if let Some(start) = path.start() {
                            self.anchor_node(start.id);
                        }
                    }
                }
            }
            (RELATIONSHIP_COLUMN, RawValue::Relationship(relationship)) => {
                if !self.anchor_relationships.contains(&relationship.id) {
                    self.anchor_relationships.push(relationship.id);
                }
            }
            _ => {}
        }
    }
}
