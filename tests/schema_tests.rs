mod common;

use graphmap::{
    MappingError,
    schema::{
        Direction, EntityDescriptor, PropertyDescriptor, RelationshipDescriptor, ScalarKind,
        SchemaDefinition, SchemaRegistry,
    },
    store::schema::ensure_schema,
};
use rusqlite::Connection;

use common::{movie_descriptor, movie_registry, person_descriptor};

fn invalid_mapping(result: Result<SchemaRegistry, MappingError>) -> String {
    match result {
        Err(MappingError::InvalidMapping { reason, .. }) => reason,
        other => panic!("expected InvalidMapping, got {other:?}"),
    }
}

fn register_all(descriptors: Vec<EntityDescriptor>) -> Result<SchemaRegistry, MappingError> {
    let mut builder = SchemaRegistry::builder();
    for descriptor in descriptors {
        builder.register(descriptor)?;
    }
    builder.build()
}

#[test]
fn test_schema_creates_node_label_and_relationship_tables() {
    let conn = Connection::open_in_memory().expect("in-memory db");
    ensure_schema(&conn).expect("schema");
    ensure_schema(&conn).expect("schema is idempotent");
    for table in ["graph_nodes", "graph_node_labels", "graph_relationships"] {
        let exists = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")
            .expect("prepare")
            .exists([table])
            .expect("exists");
        assert!(exists, "missing table {table}");
    }
}

#[test]
fn test_registry_describes_registered_types() {
    let registry = movie_registry();
    assert_eq!(registry.len(), 4);
    assert!(registry.contains("Movie"));
    let role = registry.describe("Role").expect("role");
    assert!(role.is_relationship_entity());
    assert_eq!(role.rel_type(), Some("PLAYED"));
    assert!(registry.relationship_entity("PLAYED").is_some());
    assert!(registry.relationship_entity("ACTED_IN").is_none());
    assert!(matches!(
        registry.describe("Studio"),
        Err(MappingError::UnknownEntity(name)) if name == "Studio"
    ));
}

#[test]
fn test_missing_id_is_rejected() {
    let reason = invalid_mapping(register_all(vec![EntityDescriptor::node("Ghost")]));
    assert!(reason.contains("no id field"));
}

#[test]
fn test_two_ids_are_rejected() {
    let descriptor = EntityDescriptor::node("Twin")
        .internal_id("id")
        .assigned_id("code");
    let reason = invalid_mapping(register_all(vec![descriptor]));
    assert!(reason.contains("2 id fields"));
}

#[test]
fn test_duplicate_label_sets_are_rejected() {
    let first = EntityDescriptor::node("Left").labels(["Shared"]).internal_id("id");
    let second = EntityDescriptor::node("Right").labels(["Shared"]).internal_id("id");
    let reason = invalid_mapping(register_all(vec![first, second]));
    assert!(reason.contains("already mapped by Left"));
}

#[test]
fn test_identical_registration_is_a_no_op() {
    let mut builder = SchemaRegistry::builder();
    builder.register(movie_descriptor()).expect("first");
    builder.register(movie_descriptor()).expect("second");
    builder.register(person_descriptor()).expect("person");
    let changed = movie_descriptor().property(PropertyDescriptor::new("tagline", ScalarKind::String));
    assert!(builder.register(changed).is_err());
}

#[test]
fn test_unregistered_target_fails_at_build() {
    let reason = invalid_mapping(register_all(vec![movie_descriptor()]));
    assert!(reason.contains("unregistered type Person"));
}

#[test]
fn test_relationship_entity_endpoints_must_be_nodes() {
    let role = EntityDescriptor::relationship_entity("Role", "PLAYED", "Person", "Movie").internal_id("id");
    let reason = invalid_mapping(register_all(vec![role]));
    assert!(reason.contains("endpoint Person is not registered"));
}

#[test]
fn test_grouped_fields_take_no_declared_type() {
    let mut field = RelationshipDescriptor::grouped("links", Direction::Outgoing, "Doc");
    field.rel_type = Some("CITES".to_string());
    let doc = EntityDescriptor::node("Doc").internal_id("id").relationship(field);
    let reason = invalid_mapping(register_all(vec![doc]));
    assert!(reason.contains("grouped field `links`"));
}

#[test]
fn test_duplicate_stored_names_are_rejected() {
    let doc = EntityDescriptor::node("Doc")
        .internal_id("id")
        .property(PropertyDescriptor::new("title", ScalarKind::String))
        .property(PropertyDescriptor::new("heading", ScalarKind::String).stored_as("title"));
    let reason = invalid_mapping(register_all(vec![doc]));
    assert!(reason.contains("stored name `title`"));
}

#[test]
fn test_relationship_entities_take_no_version_or_dynamic_labels() {
    let versioned = EntityDescriptor::relationship_entity("Role", "PLAYED", "Person", "Movie")
        .internal_id("id")
        .version("version");
    let reason = invalid_mapping(register_all(vec![person_descriptor(), movie_descriptor(), versioned]));
    assert!(reason.contains("only node entities can be versioned"));

    let labelled = EntityDescriptor::relationship_entity("Role", "PLAYED", "Person", "Movie")
        .internal_id("id")
        .dynamic_labels("tags");
    let reason = invalid_mapping(register_all(vec![person_descriptor(), movie_descriptor(), labelled]));
    assert!(reason.contains("carry no labels"));
}

#[test]
fn test_dynamic_labels_field_must_be_unique() {
    let doc = EntityDescriptor::node("Doc")
        .internal_id("id")
        .property(PropertyDescriptor::new("tags", ScalarKind::List))
        .dynamic_labels("tags");
    let reason = invalid_mapping(register_all(vec![doc]));
    assert!(reason.contains("duplicate field `tags`"));
}

#[test]
fn test_most_specific_label_match_wins() {
    let person = EntityDescriptor::node("Person").internal_id("id");
    let actor = EntityDescriptor::node("Actor")
        .labels(["Person", "Actor"])
        .internal_id("id");
    let registry = register_all(vec![person, actor]).expect("registry");

    let labels = vec!["Actor".to_string(), "Person".to_string()];
    assert_eq!(registry.resolve_labels(1, &labels).expect("resolve").name(), "Actor");
    let labels = vec!["Person".to_string()];
    assert_eq!(registry.resolve_labels(2, &labels).expect("resolve").name(), "Person");

    let actor = registry.describe("Actor").expect("actor");
    let person = registry.describe("Person").expect("person");
    assert!(registry.is_assignable(actor, person));
    assert!(!registry.is_assignable(person, actor));
}

#[test]
fn test_unmatched_and_ambiguous_labels_fail() {
    let a = EntityDescriptor::node("A").internal_id("id");
    let b = EntityDescriptor::node("B").internal_id("id");
    let registry = register_all(vec![a, b]).expect("registry");

    let both = vec!["A".to_string(), "B".to_string()];
    match registry.resolve_labels(7, &both) {
        Err(MappingError::Materialization { node_id, reason, .. }) => {
            assert_eq!(node_id, 7);
            assert!(reason.contains("ambiguous"));
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
    let none = vec!["C".to_string()];
    assert!(matches!(
        registry.resolve_labels(8, &none),
        Err(MappingError::Materialization { .. })
    ));
}

#[test]
fn test_schema_definition_builds_a_registry() {
    let definition = SchemaDefinition::from_json(
        r#"{
            "entities": [
                {
                    "name": "Doc",
                    "labels": ["Doc", "Versioned"],
                    "id": { "field": "key", "strategy": "assigned", "property": "doc_key", "generator": "uuid" },
                    "properties": [{ "field": "title", "stored_name": "heading", "kind": "string", "nullable": false }],
                    "relationships": [{ "field": "links", "direction": "OUTGOING", "target": "Doc", "cardinality": "grouped" }],
                    "version": "revision",
                    "dynamic_labels": "tags"
                }
            ]
        }"#,
    )
    .expect("definition");
    let registry = definition.build_registry().expect("registry");
    let doc = registry.describe("Doc").expect("doc");
    assert_eq!(doc.node_labels(), ["Doc".to_string(), "Versioned".to_string()]);
    assert_eq!(doc.assigned_id_property(), Some("doc_key"));
    let title = doc.property_by_field("title").expect("title");
    assert_eq!(title.stored_name, "heading");
    assert!(!title.nullable);
    assert!(doc.relationship_field("links").is_some());
    assert_eq!(doc.version_property().map(|p| p.kind), Some(ScalarKind::Integer));
    assert_eq!(doc.dynamic_labels_field(), Some("tags"));
}

#[test]
fn test_unknown_generator_is_a_config_error() {
    let definition = SchemaDefinition::from_json(
        r#"{ "entities": [{ "name": "Doc", "id": { "field": "key", "strategy": "assigned", "generator": "sequence" } }] }"#,
    )
    .expect("definition");
    assert!(matches!(
        definition.build_registry(),
        Err(MappingError::Config(reason)) if reason.contains("sequence")
    ));
}
