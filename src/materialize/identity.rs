use ahash::AHashMap;

use crate::model::EntityKey;

/// Store internal id to entity, one table for nodes and one for relationship
/// entities. Lives for exactly one materialization.
#[derive(Debug, Default)]
pub(crate) struct IdentityMap {
    nodes: AHashMap<i64, EntityKey>,
    relationships: AHashMap<i64, EntityKey>,
}

impl IdentityMap {
    pub fn node(&self, id: i64) -> Option<EntityKey> {
        self.nodes.get(&id).copied()
    }

    pub fn insert_node(&mut self, id: i64, key: EntityKey) {
        self.nodes.insert(id, key);
    }

    pub fn relationship(&self, id: i64) -> Option<EntityKey> {
        self.relationships.get(&id).copied()
    }

    pub fn insert_relationship(&mut self, id: i64, key: EntityKey) {
        self.relationships.insert(id, key);
    }
}
