use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    errors::MappingError,
    schema::{SchemaDefinition, SchemaRegistry},
};

pub const DEFAULT_LOAD_DEPTH: i32 = 1;
pub const DEFAULT_SAVE_DEPTH: i32 = -1;

/// Mapping configuration as kept in a JSON file: default depths plus the entity table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default = "default_load_depth")]
    pub load_depth: i32,
    /// Negative saves everything reachable.
    #[serde(default = "default_save_depth")]
    pub save_depth: i32,
    #[serde(default)]
    pub schema: SchemaDefinition,
}

fn default_load_depth() -> i32 {
    DEFAULT_LOAD_DEPTH
}

fn default_save_depth() -> i32 {
    DEFAULT_SAVE_DEPTH
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            load_depth: DEFAULT_LOAD_DEPTH,
            save_depth: DEFAULT_SAVE_DEPTH,
            schema: SchemaDefinition::default(),
        }
    }
}

impl MappingConfig {
    pub fn from_json(text: &str) -> Result<Self, MappingError> {
        serde_json::from_str(text).map_err(|e| MappingError::config(e.to_string()))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, MappingError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| MappingError::config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn registry(&self) -> Result<SchemaRegistry, MappingError> {
        self.schema.build_registry()
    }
}
