#![allow(dead_code)]

use graphmap::{
    result::{RawNode, RawRelationship},
    schema::{
        Direction, EntityDescriptor, PropertyDescriptor, RelationshipDescriptor, ScalarKind,
        SchemaRegistry,
    },
};
use serde_json::json;

pub const MAPPING_JSON: &str = r#"{
    "load_depth": 1,
    "schema": {
        "entities": [
            {
                "name": "Person",
                "id": { "field": "id" },
                "properties": [
                    { "field": "name", "kind": "string" },
                    { "field": "born", "kind": "integer" }
                ],
                "relationships": [
                    { "field": "movies", "type": "ACTED_IN", "direction": "OUTGOING", "target": "Movie" }
                ]
            },
            {
                "name": "Movie",
                "id": { "field": "id" },
                "properties": [
                    { "field": "title", "kind": "string", "nullable": false }
                ],
                "relationships": [
                    { "field": "actors", "type": "ACTED_IN", "direction": "INCOMING", "target": "Person" }
                ]
            }
        ]
    }
}"#;

pub fn person_descriptor() -> EntityDescriptor {
    EntityDescriptor::node("Person")
        .internal_id("id")
        .property(PropertyDescriptor::new("name", ScalarKind::String))
        .property(PropertyDescriptor::new("born", ScalarKind::Integer))
        .relationship(RelationshipDescriptor::collection(
            "movies",
            "ACTED_IN",
            Direction::Outgoing,
            "Movie",
        ))
        .relationship(RelationshipDescriptor::collection(
            "roles",
            "PLAYED",
            Direction::Outgoing,
            "Role",
        ))
        .relationship(RelationshipDescriptor::collection(
            "knows",
            "KNOWS",
            Direction::Undirected,
            "Person",
        ))
}

pub fn movie_descriptor() -> EntityDescriptor {
    EntityDescriptor::node("Movie")
        .internal_id("id")
        .property(PropertyDescriptor::new("title", ScalarKind::String).required())
        .relationship(RelationshipDescriptor::collection(
            "actors",
            "ACTED_IN",
            Direction::Incoming,
            "Person",
        ))
}

pub fn role_descriptor() -> EntityDescriptor {
    EntityDescriptor::relationship_entity("Role", "PLAYED", "Person", "Movie")
        .internal_id("id")
        .property(PropertyDescriptor::new("role", ScalarKind::String))
}

pub fn tag_descriptor() -> EntityDescriptor {
    EntityDescriptor::node("Tag").assigned_id("name")
}

/// Person, Movie, the Role relationship entity and the assigned-id Tag.
pub fn movie_registry() -> SchemaRegistry {
    let mut builder = SchemaRegistry::builder();
    builder.register(person_descriptor()).expect("person");
    builder.register(movie_descriptor()).expect("movie");
    builder.register(role_descriptor()).expect("role");
    builder.register(tag_descriptor()).expect("tag");
    builder.build().expect("registry")
}

/// Versioned node whose unmapped labels land in `tags`.
pub fn document_descriptor() -> EntityDescriptor {
    EntityDescriptor::node("Document")
        .internal_id("id")
        .property(PropertyDescriptor::new("title", ScalarKind::String))
        .version("version")
        .dynamic_labels("tags")
}

pub fn document_registry() -> SchemaRegistry {
    let mut builder = SchemaRegistry::builder();
    builder.register(document_descriptor()).expect("document");
    builder.build().expect("registry")
}

pub fn person(id: i64, name: &str) -> RawNode {
    RawNode::new(id, ["Person"]).with_property("name", json!(name))
}

pub fn movie(id: i64, title: &str) -> RawNode {
    RawNode::new(id, ["Movie"]).with_property("title", json!(title))
}

pub fn acted_in(id: i64, person: i64, movie: i64) -> RawRelationship {
    RawRelationship::new(id, "ACTED_IN", person, movie)
}
