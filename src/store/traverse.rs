//! Variable-length path enumeration with Cypher's matching rules: relationships
//! are followed in either direction and never repeated within one path.

use ahash::{AHashMap, AHashSet};

use crate::{
    depth::DepthBound,
    errors::MappingError,
    result::{RawNode, RawPath, RawRelationship},
    store::SqliteStore,
};

/// Every path from `anchor` whose length lies inside `bound`, shortest first in
/// discovery order. The zero-length path is included since every bound starts at 0.
pub fn paths_from(
    store: &SqliteStore,
    anchor: i64,
    bound: DepthBound,
) -> Result<Vec<RawPath>, MappingError> {
    let mut nodes = NodeCache::default();
    let start = nodes.fetch(store, anchor)?;
    let mut out = Vec::new();
    let mut used = AHashSet::new();
    let mut path = RawPath::single(start);
    walk(store, &mut nodes, bound, &mut path, &mut used, &mut out)?;
    Ok(out)
}

fn walk(
    store: &SqliteStore,
    nodes: &mut NodeCache,
    bound: DepthBound,
    path: &mut RawPath,
    used: &mut AHashSet<i64>,
    out: &mut Vec<RawPath>,
) -> Result<(), MappingError> {
    let taken = path.relationships.len() as u32;
    if i64::from(taken) >= i64::from(bound.min()) {
        out.push(path.clone());
    }
    if !bound.allows(taken) {
        return Ok(());
    }
    let Some(current) = path.end().map(|node| node.id) else {
        return Ok(());
    };
    for relationship in store.incident(current)? {
        if used.contains(&relationship.id) {
            continue;
        }
        let next = other_end(&relationship, current);
        let node = nodes.fetch(store, next)?;
        used.insert(relationship.id);
        path.relationships.push(relationship);
        path.nodes.push(node);
        walk(store, nodes, bound, path, used, out)?;
        path.nodes.pop();
        if let Some(relationship) = path.relationships.pop() {
            used.remove(&relationship.id);
        }
    }
    Ok(())
}

fn other_end(relationship: &RawRelationship, from: i64) -> i64 {
    if relationship.start == from {
        relationship.end
    } else {
        relationship.start
    }
}

#[derive(Default)]
struct NodeCache {
    nodes: AHashMap<i64, RawNode>,
}

impl NodeCache {
    fn fetch(&mut self, store: &SqliteStore, id: i64) -> Result<RawNode, MappingError> {
        if let Some(node) = self.nodes.get(&id) {
            return Ok(node.clone());
        }
        let node = store.node(id)?;
        self.nodes.insert(id, node.clone());
        Ok(node)
    }
}
