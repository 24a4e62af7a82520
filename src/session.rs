//! Typed entry point tying the registry, the statement generator, a driver, the
//! materializer and the decomposer together.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    config::{DEFAULT_LOAD_DEPTH, DEFAULT_SAVE_DEPTH, MappingConfig},
    decompose::{Decomposer, WritePlan},
    depth::DepthBound,
    errors::MappingError,
    materialize::{Materialized, Materializer, convert::Conversions},
    model::{EntityGraph, EntityKey},
    result::{RawValue, Row},
    schema::{EntityDescriptor, IdStrategy, SchemaRegistry},
    statement::{COUNT_COLUMN, Filter, RELATIONSHIP_COUNT_COLUMN, Statement, StatementGenerator},
};

/// Executes one statement against a graph store. Retries, pooling and transport
/// all belong to the implementation.
pub trait Driver {
    fn run(&self, statement: &Statement) -> Result<Vec<Row>, MappingError>;
}

impl<D: Driver + ?Sized> Driver for &D {
    fn run(&self, statement: &Statement) -> Result<Vec<Row>, MappingError> {
        (**self).run(statement)
    }
}

impl<D: Driver + ?Sized> Driver for Box<D> {
    fn run(&self, statement: &Statement) -> Result<Vec<Row>, MappingError> {
        (**self).run(statement)
    }
}

pub struct Session<D> {
    registry: Arc<SchemaRegistry>,
    driver: D,
    conversions: Conversions,
    load_depth: i32,
    save_depth: i32,
}

impl<D: Driver> Session<D> {
    pub fn new(registry: Arc<SchemaRegistry>, driver: D) -> Self {
        Self {
            registry,
            driver,
            conversions: Conversions::new(),
            load_depth: DEFAULT_LOAD_DEPTH,
            save_depth: DEFAULT_SAVE_DEPTH,
        }
    }

    pub fn from_config(config: &MappingConfig, driver: D) -> Result<Self, MappingError> {
        Ok(Self::new(Arc::new(config.registry()?), driver)
            .with_load_depth(config.load_depth)
            .with_save_depth(config.save_depth))
    }

    pub fn with_conversions(mut self, conversions: Conversions) -> Self {
        self.conversions = conversions;
        self
    }

    pub fn with_load_depth(mut self, depth: i32) -> Self {
        self.load_depth = depth;
        self
    }

    pub fn with_save_depth(mut self, depth: i32) -> Self {
        self.save_depth = depth;
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn generator(&self) -> StatementGenerator<'_> {
        StatementGenerator::new(&self.registry)
    }

    fn materializer(&self) -> Materializer<'_> {
        Materializer::new(&self.registry).with_conversions(&self.conversions)
    }

    fn read(&self, type_name: &str, statement: Option<Statement>) -> Result<Materialized, MappingError> {
        let Some(statement) = statement else {
            return Ok(Materialized::default());
        };
        let rows = self.driver.run(&statement)?;
        self.materializer().materialize(type_name, &rows)
    }

    /// Loads one entity by id with the configured load depth.
    pub fn find(&self, type_name: &str, id: Value) -> Result<Materialized, MappingError> {
        self.load(type_name, id, self.load_depth)
    }

    pub fn load<B: Into<DepthBound>>(
        &self,
        type_name: &str,
        id: Value,
        depth: B,
    ) -> Result<Materialized, MappingError> {
        let descriptor = self.registry.describe(type_name)?;
        let generator = self.generator();
        let statement = if descriptor.is_relationship_entity() {
            generator.find_one_relationship(descriptor, id, depth.into())?
        } else {
            generator.find_one(descriptor, id, depth.into())?
        };
        self.read(type_name, Some(statement))
    }

    /// An empty `ids` returns an empty result without touching the driver.
    pub fn load_all<B: Into<DepthBound>>(
        &self,
        type_name: &str,
        ids: Vec<Value>,
        depth: B,
    ) -> Result<Materialized, MappingError> {
        let descriptor = self.registry.describe(type_name)?;
        let generator = self.generator();
        let statement = if descriptor.is_relationship_entity() {
            generator.find_all_relationships_by_id(descriptor, ids, depth.into())?
        } else {
            generator.find_all_by_id(descriptor, ids, depth.into())?
        };
        self.read(type_name, statement)
    }

    pub fn load_all_by_type<B: Into<DepthBound>>(
        &self,
        type_name: &str,
        depth: B,
    ) -> Result<Materialized, MappingError> {
        let descriptor = self.registry.describe(type_name)?;
        let generator = self.generator();
        let statement = if descriptor.is_relationship_entity() {
            generator.find_all_relationships_by_type(descriptor, depth.into())?
        } else {
            generator.find_by_label(descriptor, depth.into())?
        };
        self.read(type_name, Some(statement))
    }

    pub fn load_by_property<B: Into<DepthBound>>(
        &self,
        type_name: &str,
        filters: &[Filter],
        depth: B,
    ) -> Result<Materialized, MappingError> {
        let descriptor = self.registry.describe(type_name)?;
        let generator = self.generator();
        let statement = if descriptor.is_relationship_entity() {
            generator.find_by_relationship_property(descriptor, filters, depth.into())?
        } else {
            generator.find_by_property(descriptor, filters, depth.into())?
        };
        self.read(type_name, Some(statement))
    }

    pub fn delete_by_id(&self, type_name: &str, id: Value) -> Result<(), MappingError> {
        let descriptor = self.registry.describe(type_name)?;
        let generator = self.generator();
        let statement = if descriptor.is_relationship_entity() {
            generator.delete_relationship(descriptor, id)?
        } else {
            generator.delete_one(descriptor, id)?
        };
        self.driver.run(&statement)?;
        Ok(())
    }

    pub fn delete_all_by_id(&self, type_name: &str, ids: Vec<Value>) -> Result<(), MappingError> {
        let descriptor = self.registry.describe(type_name)?;
        let generator = self.generator();
        let statement = if descriptor.is_relationship_entity() {
            generator.delete_relationships_by_id(descriptor, ids)?
        } else {
            generator.delete_all_by_id(descriptor, ids)?
        };
        if let Some(statement) = statement {
            self.driver.run(&statement)?;
        }
        Ok(())
    }

    /// Deletes every node of a node type, or every relationship of a relationship entity type.
    pub fn delete_all(&self, type_name: &str) -> Result<(), MappingError> {
        let descriptor = self.registry.describe(type_name)?;
        let generator = self.generator();
        let statement = if descriptor.is_relationship_entity() {
            generator.delete_all_relationships(descriptor)?
        } else {
            generator.delete_by_label(descriptor)?
        };
        self.driver.run(&statement)?;
        Ok(())
    }

    pub fn purge_database(&self) -> Result<(), MappingError> {
        self.driver.run(&self.generator().purge_all())?;
        Ok(())
    }

    pub fn count_entities_of_type(&self, type_name: &str) -> Result<u64, MappingError> {
        let descriptor = self.registry.describe(type_name)?;
        let generator = self.generator();
        match descriptor.rel_type() {
            Some(rel_type) => self.run_count(
                &generator.count_relationships(rel_type),
                RELATIONSHIP_COUNT_COLUMN,
            ),
            None => self.run_count(
                &generator.count_by_labels(descriptor.node_labels()),
                COUNT_COLUMN,
            ),
        }
    }

    /// Counts nodes carrying every one of `labels`.
    pub fn count(&self, labels: &[String]) -> Result<u64, MappingError> {
        self.run_count(&self.generator().count_by_labels(labels), COUNT_COLUMN)
    }

    fn run_count(&self, statement: &Statement, column: &str) -> Result<u64, MappingError> {
        let rows = self.driver.run(statement)?;
        let count = rows
            .first()
            .and_then(|row| row.get(column))
            .and_then(RawValue::as_i64)
            .ok_or_else(|| MappingError::driver(format!("count result has no {column} column")))?;
        u64::try_from(count).map_err(|e| MappingError::driver(e.to_string()))
    }

    /// Persists everything reachable from `root` within the save depth and writes
    /// the internal ids the store assigned back into `graph`.
    pub fn save(&self, graph: &mut EntityGraph, root: EntityKey) -> Result<WritePlan, MappingError> {
        self.save_all(graph, &[root])
    }

    pub fn save_all(&self, graph: &mut EntityGraph, roots: &[EntityKey]) -> Result<WritePlan, MappingError> {
        let plan = Decomposer::new(&self.registry)
            .with_conversions(&self.conversions)
            .horizon(self.save_depth)
            .decompose_all(graph, roots)?;
        if plan.is_empty() {
            return Ok(plan);
        }
        let statement = self.generator().compile_write(&plan);
        let rows = self.driver.run(&statement)?;
        match rows.first() {
            Some(row) => self.write_back(graph, &plan, row)?,
            None => {
                // A version guard that matched nothing leaves the write without rows.
                let stale = plan
                    .nodes
                    .iter()
                    .find_map(|node| node.version.as_ref().map(|check| (node.entity, check.expected)));
                if let Some((entity, expected)) = stale {
                    return Err(MappingError::optimistic_locking(
                        graph[entity].type_name(),
                        expected,
                        None,
                    ));
                }
                warn!(
                    nodes = plan.nodes.len(),
                    "driver returned no ids for the write; internal ids left unassigned"
                );
            }
        }
        self.settle(graph, &plan)?;
        debug!(
            nodes = plan.nodes.len(),
            relationships = plan.relationships.len(),
            deleted = plan.deleted_relationships.len(),
            "saved entity graph"
        );
        Ok(plan)
    }

    fn write_back(&self, graph: &mut EntityGraph, plan: &WritePlan, row: &Row) -> Result<(), MappingError> {
        let assigned = plan
            .nodes
            .iter()
            .map(|node| (node.reference.as_str(), Some(node.entity)))
            .chain(
                plan.relationships
                    .iter()
                    .map(|rel| (rel.reference.as_str(), rel.entity)),
            );
        for (reference, entity) in assigned {
            let (Some(key), Some(id)) = (entity, row.get(reference).and_then(RawValue::as_i64)) else {
                continue;
            };
            let descriptor = self.registry.describe(graph[key].type_name())?;
            assign_internal_id(descriptor, graph, key, id);
        }
        for relationship in &plan.relationships {
            let Some(id) = row.get(&relationship.reference).and_then(RawValue::as_i64) else {
                continue;
            };
            for holder in &relationship.holders {
                graph[holder.owner].record_loaded(&holder.field, &relationship.rel_type, holder.target, id);
            }
        }
        Ok(())
    }

    /// Brings the saved entities in line with the store: bumped versions, the
    /// labels now stored, and no memory of deleted relationships.
    fn settle(&self, graph: &mut EntityGraph, plan: &WritePlan) -> Result<(), MappingError> {
        graph.forget_relationships(&plan.deleted_relationships);
        for node in &plan.nodes {
            let descriptor = self.registry.describe(graph[node.entity].type_name())?;
            let entity = &mut graph[node.entity];
            if let Some(check) = &node.version {
                entity.set_property(check.field.clone(), Value::from(check.next));
            }
            if descriptor.dynamic_labels_field().is_some() {
                entity.set_loaded_labels(node.labels.clone());
            }
        }
        Ok(())
    }
}

fn assign_internal_id(descriptor: &EntityDescriptor, graph: &mut EntityGraph, key: EntityKey, id: i64) {
    let entity = &mut graph[key];
    entity.set_internal_id(id);
    if let Some(field) = descriptor.id().filter(|declared| declared.strategy == IdStrategy::Internal) {
        entity.set_property(field.field.clone(), Value::from(id));
    }
}
