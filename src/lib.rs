//! Object-graph mapping over labeled property graphs.
//! Entity types are registered once, statements are generated against a bounded
//! traversal depth, and driver rows come back as a linked entity graph.
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod cli;
pub mod config;
pub mod decompose;
pub mod depth;
pub mod errors;
pub mod materialize;
pub mod model;
pub mod result;
pub mod schema;
pub mod session;
pub mod statement;
pub mod store;

pub use crate::config::MappingConfig;
pub use crate::decompose::{Decomposer, WritePlan};
pub use crate::depth::DepthBound;
pub use crate::errors::MappingError;
pub use crate::materialize::{Materialized, Materializer, convert::Conversions};
pub use crate::model::{Entity, EntityGraph, EntityKey, Related};
pub use crate::result::{RawNode, RawPath, RawRelationship, RawValue, Row};
pub use crate::schema::{EntityDescriptor, SchemaRegistry};
pub use crate::session::{Driver, Session};
pub use crate::statement::{Filter, Statement, StatementGenerator};
pub use crate::store::SqliteStore;
