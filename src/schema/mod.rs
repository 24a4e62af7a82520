//! Entity type descriptors and the registry that resolves them.

pub mod definition;
pub mod descriptor;
pub mod registry;

pub use definition::SchemaDefinition;
pub use descriptor::{
    Cardinality, Direction, EntityDescriptor, EntityKind, IdDescriptor, IdGenerator, IdStrategy,
    PropertyDescriptor, RelationshipDescriptor, ScalarKind,
};
pub use registry::{Expression, RegistryBuilder, SchemaRegistry};
