use ahash::AHashMap;
use parking_lot::RwLock;

use crate::result::RawRelationship;

/// Relationships incident to a node, in either direction. Cleared on every write.
#[derive(Default)]
pub struct AdjacencyCache {
    inner: RwLock<AHashMap<i64, Vec<RawRelationship>>>,
}

impl AdjacencyCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(AHashMap::new()),
        }
    }

    pub fn get(&self, node: i64) -> Option<Vec<RawRelationship>> {
        self.inner.read().get(&node).cloned()
    }

    pub fn insert(&self, node: i64, relationships: Vec<RawRelationship>) {
        self.inner.write().insert(node, relationships);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}
