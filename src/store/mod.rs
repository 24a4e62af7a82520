//! Embedded SQLite property graph that executes generated statements by
//! interpreting their [`Operation`]. Meant for tests, the CLI and benches.

pub mod cache;
pub mod schema;
pub mod traverse;

use std::path::Path;

use ahash::AHashMap;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    decompose::{NodeUpsert, UpsertMode, WritePlan},
    depth::DepthBound,
    errors::MappingError,
    result::{PropertyMap, RawNode, RawRelationship, RawValue, Row},
    schema::Expression,
    session::Driver,
    statement::{
        ANCHOR_ID_COLUMN, Anchor, COUNT_COLUMN, NODE_COLUMN, NODES_COLUMN, Operation, PATH_COLUMN,
        PATHS_COLUMN, Predicate, RELATIONSHIP_COLUMN, RELATIONSHIP_COUNT_COLUMN, ResultShape,
        Statement, filter::values_equal,
    },
};

use self::{cache::AdjacencyCache, schema::ensure_schema};

pub struct SqliteStore {
    conn: Connection,
    adjacency: AdjacencyCache,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MappingError> {
        let conn = Connection::open(path).map_err(|e| MappingError::driver(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, MappingError> {
        let conn = Connection::open_in_memory().map_err(|e| MappingError::driver(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        conn.set_prepared_statement_cache_capacity(64);
        Self {
            conn,
            adjacency: AdjacencyCache::new(),
        }
    }

    pub fn create_node<S: AsRef<str>>(
        &self,
        labels: &[S],
        properties: &PropertyMap,
    ) -> Result<i64, MappingError> {
        let data = encode(&without_nulls(properties))?;
        self.conn
            .execute("INSERT INTO graph_nodes(data) VALUES(?1)", params![data])
            .map_err(query_error)?;
        let id = self.conn.last_insert_rowid();
        for label in labels {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO graph_node_labels(node_id, label) VALUES(?1, ?2)",
                    params![id, label.as_ref()],
                )
                .map_err(query_error)?;
        }
        self.adjacency.clear();
        Ok(id)
    }

    pub fn node(&self, id: i64) -> Result<RawNode, MappingError> {
        self.find_node(id)?
            .ok_or_else(|| MappingError::driver(format!("node {id} not found")))
    }

    pub fn find_node(&self, id: i64) -> Result<Option<RawNode>, MappingError> {
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM graph_nodes WHERE id=?1", params![id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(query_error)?;
        let Some(data) = data else {
            return Ok(None);
        };
        let mut stmt = self
            .conn
            .prepare_cached("SELECT label FROM graph_node_labels WHERE node_id=?1 ORDER BY rowid")
            .map_err(query_error)?;
        let labels = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))
            .map_err(query_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;
        Ok(Some(RawNode {
            id,
            labels,
            properties: decode(&data)?,
        }))
    }

    /// Merges `properties` into a node; null values remove the property.
    pub fn update_node(&self, id: i64, properties: &PropertyMap) -> Result<(), MappingError> {
        let mut current = self.node(id)?.properties;
        merge(&mut current, properties);
        self.conn
            .execute(
                "UPDATE graph_nodes SET data=?1 WHERE id=?2",
                params![encode(&current)?, id],
            )
            .map_err(query_error)?;
        self.adjacency.clear();
        Ok(())
    }

    /// Removes a node and every relationship touching it.
    pub fn delete_node(&self, id: i64) -> Result<(), MappingError> {
        self.conn
            .execute(
                "DELETE FROM graph_relationships WHERE start_id=?1 OR end_id=?1",
                params![id],
            )
            .map_err(query_error)?;
        self.conn
            .execute("DELETE FROM graph_nodes WHERE id=?1", params![id])
            .map_err(query_error)?;
        self.adjacency.clear();
        Ok(())
    }

    pub fn create_relationship(
        &self,
        start: i64,
        rel_type: &str,
        end: i64,
        properties: &PropertyMap,
    ) -> Result<i64, MappingError> {
        if rel_type.trim().is_empty() {
            return Err(MappingError::driver("relationship type must be set"));
        }
        self.conn
            .execute(
                "INSERT INTO graph_relationships(start_id, end_id, rel_type, data) VALUES(?1, ?2, ?3, ?4)",
                params![start, end, rel_type, encode(&without_nulls(properties))?],
            )
            .map_err(query_error)?;
        self.adjacency.clear();
        Ok(self.conn.last_insert_rowid())
    }

    pub fn relationship(&self, id: i64) -> Result<RawRelationship, MappingError> {
        self.conn
            .query_row(
                "SELECT id, start_id, end_id, rel_type, data FROM graph_relationships WHERE id=?1",
                params![id],
                row_to_relationship,
            )
            .optional()
            .map_err(query_error)?
            .ok_or_else(|| MappingError::driver(format!("relationship {id} not found")))
    }

    pub fn update_relationship(&self, id: i64, properties: &PropertyMap) -> Result<(), MappingError> {
        let mut current = self.relationship(id)?.properties;
        merge(&mut current, properties);
        self.conn
            .execute(
                "UPDATE graph_relationships SET data=?1 WHERE id=?2",
                params![encode(&current)?, id],
            )
            .map_err(query_error)?;
        self.adjacency.clear();
        Ok(())
    }

    pub fn delete_relationship(&self, id: i64) -> Result<(), MappingError> {
        self.conn
            .execute("DELETE FROM graph_relationships WHERE id=?1", params![id])
            .map_err(query_error)?;
        self.adjacency.clear();
        Ok(())
    }

    /// Ids of nodes carrying every label; all nodes when `labels` is empty.
    pub fn node_ids(&self, labels: &[String]) -> Result<Vec<i64>, MappingError> {
        if labels.is_empty() {
            return self.collect_ids("SELECT id FROM graph_nodes ORDER BY id", params![]);
        }
        let placeholders: Vec<String> = (1..=labels.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT node_id FROM graph_node_labels WHERE label IN ({}) \
             GROUP BY node_id HAVING COUNT(DISTINCT label) = {} ORDER BY node_id",
            placeholders.join(", "),
            labels.len()
        );
        self.collect_ids(&sql, rusqlite::params_from_iter(labels.iter()))
    }

    pub fn relationship_ids(&self, rel_type: &str) -> Result<Vec<i64>, MappingError> {
        self.collect_ids(
            "SELECT id FROM graph_relationships WHERE rel_type=?1 ORDER BY id",
            params![rel_type],
        )
    }

    /// Relationships touching `node` in either direction, ordered by id.
    pub fn incident(&self, node: i64) -> Result<Vec<RawRelationship>, MappingError> {
        if let Some(cached) = self.adjacency.get(node) {
            return Ok(cached);
        }
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT id, start_id, end_id, rel_type, data FROM graph_relationships \
                 WHERE start_id=?1 OR end_id=?1 ORDER BY id",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![node], row_to_relationship)
            .map_err(query_error)?;
        let mut relationships = Vec::new();
        for row in rows {
            relationships.push(row.map_err(query_error)?);
        }
        self.adjacency.insert(node, relationships.clone());
        Ok(relationships)
    }

    pub fn cached_nodes(&self) -> usize {
        self.adjacency.len()
    }

    fn collect_ids<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<i64>, MappingError> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(query_error)?;
        let rows = stmt.query_map(params, |row| row.get(0)).map_err(query_error)?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(id.map_err(query_error)?);
        }
        Ok(ids)
    }

    fn matching_nodes(
        &self,
        labels: &[String],
        predicates: &[Predicate],
        statement: &Statement,
    ) -> Result<Vec<RawNode>, MappingError> {
        let mut matched = Vec::new();
        for id in self.node_ids(labels)? {
            let node = self.node(id)?;
            if satisfies(predicates, statement, node.id, &node.properties) {
                matched.push(node);
            }
        }
        Ok(matched)
    }

    fn matching_relationships(
        &self,
        rel_type: &str,
        predicates: &[Predicate],
        statement: &Statement,
    ) -> Result<Vec<RawRelationship>, MappingError> {
        let mut matched = Vec::new();
        for id in self.relationship_ids(rel_type)? {
            let relationship = self.relationship(id)?;
            if satisfies(predicates, statement, relationship.id, &relationship.properties) {
                matched.push(relationship);
            }
        }
        Ok(matched)
    }

    fn load(
        &self,
        statement: &Statement,
        anchor: &Anchor,
        bound: DepthBound,
        shape: ResultShape,
    ) -> Result<Vec<Row>, MappingError> {
        match (anchor, shape) {
            (Anchor::Nodes { labels, predicates }, ResultShape::Node) => Ok(self
                .matching_nodes(labels, predicates, statement)?
                .into_iter()
                .take(1)
                .map(|node| Row::single(NODE_COLUMN, node))
                .collect()),
            (Anchor::Nodes { labels, predicates }, ResultShape::Nodes) => {
                let nodes = self.matching_nodes(labels, predicates, statement)?;
                Ok(vec![Row::single(
                    NODES_COLUMN,
                    RawValue::List(nodes.into_iter().map(RawValue::Node).collect()),
                )])
            }
            (Anchor::Nodes { labels, predicates }, ResultShape::Paths) => {
                let mut paths = Vec::new();
                for node in self.matching_nodes(labels, predicates, statement)? {
                    for path in traverse::paths_from(self, node.id, bound)? {
                        if !paths.contains(&path) {
                            paths.push(path);
                        }
                    }
                }
                Ok(vec![Row::single(
                    PATHS_COLUMN,
                    RawValue::List(paths.into_iter().map(RawValue::Path).collect()),
                )])
            }
            (Anchor::Nodes { labels, predicates }, ResultShape::PathsPerAnchor) => {
                let mut rows = Vec::new();
                for node in self.matching_nodes(labels, predicates, statement)? {
                    let paths = traverse::paths_from(self, node.id, bound)?;
                    rows.push(
                        Row::new()
                            .with(
                                PATHS_COLUMN,
                                RawValue::List(paths.into_iter().map(RawValue::Path).collect()),
                            )
                            .with(ANCHOR_ID_COLUMN, Value::from(node.id)),
                    );
                }
                Ok(rows)
            }
            (Anchor::Relationships { rel_type, predicates }, ResultShape::RelationshipPaths) => {
                let endpoint_bound = bound.after(1);
                let mut rows = Vec::new();
                for relationship in self.matching_relationships(rel_type, predicates, statement)? {
                    let mut paths = traverse::paths_from(self, relationship.start, endpoint_bound)?;
                    for path in traverse::paths_from(self, relationship.end, endpoint_bound)? {
                        if !paths.contains(&path) {
                            paths.push(path);
                        }
                    }
                    for path in paths {
                        rows.push(
                            Row::new()
                                .with(PATH_COLUMN, path)
                                .with(RELATIONSHIP_COLUMN, relationship.clone()),
                        );
                    }
                }
                Ok(rows)
            }
            (anchor, shape) => Err(MappingError::driver(format!(
                "cannot return {shape:?} from {anchor:?}"
            ))),
        }
    }

    fn delete(&self, statement: &Statement, anchor: &Anchor) -> Result<Vec<Row>, MappingError> {
        match anchor {
            Anchor::Nodes { labels, predicates } => {
                for node in self.matching_nodes(labels, predicates, statement)? {
                    self.delete_node(node.id)?;
                }
            }
            Anchor::Relationships { rel_type, predicates } => {
                for relationship in self.matching_relationships(rel_type, predicates, statement)? {
                    self.delete_relationship(relationship.id)?;
                }
            }
        }
        Ok(Vec::new())
    }

    /// Applies a write plan in one transaction. A stale version anywhere rolls
    /// back everything, including the relationship deletions.
    fn write(&self, plan: &WritePlan) -> Result<Vec<Row>, MappingError> {
        let tx = self.conn.unchecked_transaction().map_err(query_error)?;
        for id in &plan.deleted_relationships {
            self.delete_relationship(*id)?;
        }
        let mut row = Row::new();
        let mut ids = AHashMap::new();
        for node in &plan.nodes {
            let id = match &node.mode {
                UpsertMode::Match { id } => {
                    self.check_version(node, Some(*id))?;
                    self.update_node(*id, &node.properties)?;
                    self.relabel_node(*id, &node.dynamic_labels, &node.removed_labels)?;
                    *id
                }
                UpsertMode::Merge { property, value } => {
                    let target = self.merge_target(&node.mapped_labels(), property, value)?;
                    self.check_version(node, target)?;
                    match target {
                        Some(id) => {
                            self.update_node(id, &node.properties)?;
                            self.relabel_node(id, &node.dynamic_labels, &node.removed_labels)?;
                            id
                        }
                        None => {
                            let mut properties = node.properties.clone();
                            properties.insert(property.clone(), value.clone());
                            self.create_node(&node.labels, &properties)?
                        }
                    }
                }
                UpsertMode::Create => self.create_node(&node.labels, &node.properties)?,
            };
            trace!(reference = %node.reference, id, "wrote node");
            ids.insert(node.reference.as_str(), id);
            row.push(node.reference.clone(), Value::from(id));
        }
        for relationship in &plan.relationships {
            let endpoint = |reference: &str| {
                ids.get(reference).copied().ok_or_else(|| {
                    MappingError::driver(format!("unknown node reference {reference}"))
                })
            };
            let start = endpoint(&relationship.start)?;
            let end = endpoint(&relationship.end)?;
            let id = match (relationship.id, relationship.entity) {
                (Some(id), _) => {
                    self.update_relationship(id, &relationship.properties)?;
                    id
                }
                (None, Some(_)) => self.create_relationship(
                    start,
                    &relationship.rel_type,
                    end,
                    &relationship.properties,
                )?,
                (None, None) => match self.existing_relationship(start, &relationship.rel_type, end)? {
                    Some(id) => {
                        self.update_relationship(id, &relationship.properties)?;
                        id
                    }
                    None => self.create_relationship(
                        start,
                        &relationship.rel_type,
                        end,
                        &relationship.properties,
                    )?,
                },
            };
            row.push(relationship.reference.clone(), Value::from(id));
        }
        tx.commit().map_err(query_error)?;
        Ok(vec![row])
    }

    /// Fails with `OptimisticLocking` unless the stored version equals the expected
    /// one. A missing node only satisfies a check expecting no version.
    fn check_version(&self, node: &NodeUpsert, id: Option<i64>) -> Result<(), MappingError> {
        let Some(check) = &node.version else {
            return Ok(());
        };
        let stored = match id {
            Some(id) => self.find_node(id)?,
            None => None,
        };
        let found = stored.and_then(|node| node.properties.get(&check.property).and_then(Value::as_i64));
        if found != check.expected {
            return Err(MappingError::optimistic_locking(
                node.labels.first().cloned().unwrap_or_default(),
                check.expected,
                found,
            ));
        }
        Ok(())
    }

    fn relabel_node(&self, id: i64, added: &[String], removed: &[String]) -> Result<(), MappingError> {
        for label in added {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO graph_node_labels(node_id, label) VALUES(?1, ?2)",
                    params![id, label],
                )
                .map_err(query_error)?;
        }
        for label in removed {
            self.conn
                .execute(
                    "DELETE FROM graph_node_labels WHERE node_id=?1 AND label=?2",
                    params![id, label],
                )
                .map_err(query_error)?;
        }
        Ok(())
    }

    fn merge_target(
        &self,
        labels: &[String],
        property: &str,
        value: &Value,
    ) -> Result<Option<i64>, MappingError> {
        for id in self.node_ids(labels)? {
            let node = self.node(id)?;
            if node.properties.get(property).is_some_and(|found| values_equal(found, value)) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    fn existing_relationship(
        &self,
        start: i64,
        rel_type: &str,
        end: i64,
    ) -> Result<Option<i64>, MappingError> {
        self.conn
            .query_row(
                "SELECT id FROM graph_relationships WHERE start_id=?1 AND rel_type=?2 AND end_id=?3 ORDER BY id LIMIT 1",
                params![start, rel_type, end],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_error)
    }
}

impl Driver for SqliteStore {
    fn run(&self, statement: &Statement) -> Result<Vec<Row>, MappingError> {
        debug!(statement = statement.text(), "executing");
        match statement.operation() {
            Operation::Load {
                anchor,
                bound,
                shape,
            } => self.load(statement, anchor, *bound, *shape),
            Operation::Delete { anchor } => self.delete(statement, anchor),
            Operation::Count { labels } => {
                Ok(count_row(COUNT_COLUMN, self.node_ids(labels)?.len()))
            }
            Operation::CountRelationships { rel_type } => Ok(count_row(
                RELATIONSHIP_COUNT_COLUMN,
                self.relationship_ids(rel_type)?.len(),
            )),
            Operation::Write(plan) => self.write(plan),
        }
    }
}

static NULL: Value = Value::Null;

fn count_row(column: &str, count: usize) -> Vec<Row> {
    vec![Row::single(column, Value::from(count as i64))]
}

fn satisfies(
    predicates: &[Predicate],
    statement: &Statement,
    internal_id: i64,
    properties: &PropertyMap,
) -> bool {
    predicates.iter().all(|predicate| {
        let internal = Value::from(internal_id);
        let actual = match &predicate.expression {
            Expression::InternalId => Some(&internal),
            Expression::Property(name) => properties.get(name),
        };
        let expected = predicate
            .parameter
            .as_deref()
            .and_then(|name| statement.parameter(name))
            .unwrap_or(&NULL);
        predicate.operator.evaluate(actual, expected)
    })
}

fn merge(current: &mut PropertyMap, update: &PropertyMap) {
    for (key, value) in update {
        if value.is_null() {
            current.remove(key);
        } else {
            current.insert(key.clone(), value.clone());
        }
    }
}

fn without_nulls(properties: &PropertyMap) -> PropertyMap {
    properties
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn encode(properties: &PropertyMap) -> Result<String, MappingError> {
    serde_json::to_string(properties).map_err(|e| MappingError::driver(e.to_string()))
}

fn decode(data: &str) -> Result<PropertyMap, MappingError> {
    serde_json::from_str(data).map_err(|e| MappingError::driver(e.to_string()))
}

fn query_error(err: rusqlite::Error) -> MappingError {
    MappingError::driver(err.to_string())
}

fn row_to_relationship(row: &rusqlite::Row<'_>) -> Result<RawRelationship, rusqlite::Error> {
    let data: String = row.get(4)?;
    let properties: PropertyMap = serde_json::from_str(&data).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            data.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })?;
    Ok(RawRelationship {
        id: row.get(0)?,
        start: row.get(1)?,
        end: row.get(2)?,
        rel_type: row.get(3)?,
        properties,
    })
}
