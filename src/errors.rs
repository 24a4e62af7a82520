use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),
    #[error("invalid mapping for {entity}: {reason}")]
    InvalidMapping { entity: String, reason: String },
    #[error("invalid depth for {entity}: {reason}")]
    InvalidDepth { entity: String, reason: String },
    #[error("cannot materialize node {node_id} with labels {labels:?}: {reason}")]
    Materialization {
        node_id: i64,
        labels: Vec<String>,
        reason: String,
    },
    #[error("relationship {relationship_id} references node {node_id} absent from the result")]
    MissingLinkedNode { relationship_id: i64, node_id: i64 },
    #[error("unresolved id for {entity}: assigned id field `{field}` is null and no generator is configured")]
    UnresolvedId { entity: String, field: String },
    #[error("property `{property}` of {entity}: {reason}")]
    PropertyConversion {
        entity: String,
        property: String,
        reason: String,
    },
    #[error("stale {entity}: expected version {expected:?}, store holds {found:?}")]
    OptimisticLocking {
        entity: String,
        expected: Option<i64>,
        found: Option<i64>,
    },
    #[error("driver error: {0}")]
    Driver(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl MappingError {
    pub fn unknown_entity<T: Into<String>>(name: T) -> Self {
        MappingError::UnknownEntity(name.into())
    }

    pub fn invalid_mapping<E: Into<String>, R: Into<String>>(entity: E, reason: R) -> Self {
        MappingError::InvalidMapping {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_depth<E: Into<String>, R: Into<String>>(entity: E, reason: R) -> Self {
        MappingError::InvalidDepth {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    pub fn materialization<R: Into<String>>(node_id: i64, labels: &[String], reason: R) -> Self {
        MappingError::Materialization {
            node_id,
            labels: labels.to_vec(),
            reason: reason.into(),
        }
    }

    pub fn missing_linked_node(relationship_id: i64, node_id: i64) -> Self {
        MappingError::MissingLinkedNode {
            relationship_id,
            node_id,
        }
    }

    pub fn unresolved_id<E: Into<String>, F: Into<String>>(entity: E, field: F) -> Self {
        MappingError::UnresolvedId {
            entity: entity.into(),
            field: field.into(),
        }
    }

    pub fn property<E: Into<String>, P: Into<String>, R: Into<String>>(
        entity: E,
        property: P,
        reason: R,
    ) -> Self {
        MappingError::PropertyConversion {
            entity: entity.into(),
            property: property.into(),
            reason: reason.into(),
        }
    }

    pub fn optimistic_locking<E: Into<String>>(
        entity: E,
        expected: Option<i64>,
        found: Option<i64>,
    ) -> Self {
        MappingError::OptimisticLocking {
            entity: entity.into(),
            expected,
            found,
        }
    }

    pub fn driver<T: Into<String>>(msg: T) -> Self {
        MappingError::Driver(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        MappingError::Config(msg.into())
    }

    /// Schema and query-construction faults originate in caller input and are never retried.
    /// Store failures and concurrent modifications are not.
    pub fn is_caller_fault(&self) -> bool {
        !matches!(
            self,
            MappingError::Driver(_) | MappingError::OptimisticLocking { .. }
        )
    }
}
