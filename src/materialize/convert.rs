//! Per-field value conversions between graph properties and entity fields.

use std::sync::Arc;

use ahash::AHashMap;
use serde_json::Value;

use crate::{
    errors::MappingError,
    schema::{EntityDescriptor, PropertyDescriptor},
};

type ConvertFn = dyn Fn(Value) -> Result<Value, String> + Send + Sync;

#[derive(Clone)]
struct Converter {
    to_entity: Arc<ConvertFn>,
    to_graph: Arc<ConvertFn>,
}

/// Converter pairs keyed by `(entity type, field)`. Fields without a pair pass
/// their values through unchanged.
#[derive(Clone, Default)]
pub struct Conversions {
    converters: AHashMap<(String, String), Converter>,
}

impl Conversions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the converter pair for one field, replacing any earlier pair.
    pub fn register<T, F, A, B>(mut self, type_name: T, field: F, to_entity: A, to_graph: B) -> Self
    where
        T: Into<String>,
        F: Into<String>,
        A: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
        B: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.converters.insert(
            (type_name.into(), field.into()),
            Converter {
                to_entity: Arc::new(to_entity),
                to_graph: Arc::new(to_graph),
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    fn lookup(&self, type_name: &str, field: &str) -> Option<&Converter> {
        if self.converters.is_empty() {
            return None;
        }
        self.converters
            .get(&(type_name.to_string(), field.to_string()))
    }

    pub fn to_entity(&self, type_name: &str, field: &str, value: Value) -> Result<Value, String> {
        match self.lookup(type_name, field) {
            Some(converter) => (converter.to_entity)(value),
            None => Ok(value),
        }
    }

    pub fn to_graph(&self, type_name: &str, field: &str, value: Value) -> Result<Value, String> {
        match self.lookup(type_name, field) {
            Some(converter) => (converter.to_graph)(value),
            None => Ok(value),
        }
    }
}

impl std::fmt::Debug for Conversions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.converters.keys().collect();
        keys.sort();
        f.debug_struct("Conversions").field("fields", &keys).finish()
    }
}

/// Converts a stored value into its field value, then checks it against the
/// field's kind and nullability.
pub(crate) fn read_property(
    conversions: &Conversions,
    descriptor: &EntityDescriptor,
    property: &PropertyDescriptor,
    stored: Option<Value>,
) -> Result<Value, MappingError> {
    let fail = |reason: String| MappingError::property(descriptor.name(), &property.field, reason);
    let value = conversions
        .to_entity(descriptor.name(), &property.field, stored.unwrap_or(Value::Null))
        .map_err(fail)?;
    check(property, value).map_err(fail)
}

/// Checks a field value against its kind and nullability, then converts it into
/// the value to store.
pub(crate) fn write_property(
    conversions: &Conversions,
    descriptor: &EntityDescriptor,
    property: &PropertyDescriptor,
    value: Option<&Value>,
) -> Result<Value, MappingError> {
    let fail = |reason: String| MappingError::property(descriptor.name(), &property.field, reason);
    let checked = check(property, value.cloned().unwrap_or(Value::Null)).map_err(fail)?;
    conversions
        .to_graph(descriptor.name(), &property.field, checked)
        .map_err(fail)
}

fn check(property: &PropertyDescriptor, value: Value) -> Result<Value, String> {
    if value.is_null() {
        if property.nullable {
            return Ok(Value::Null);
        }
        return Err("required property is null".to_string());
    }
    property.kind.coerce(value)
}
