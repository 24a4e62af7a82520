mod common;

use std::{cell::RefCell, sync::Arc};

use graphmap::{
    DepthBound, Driver, EntityGraph, EntityKey, MappingConfig, MappingError, Session, SqliteStore,
    Statement,
    result::{PropertyMap, Row},
    statement::{ComparisonOperator, Filter},
};
use serde_json::{Value, json};

use common::{MAPPING_JSON, document_registry, movie_registry};

fn session() -> Session<SqliteStore> {
    Session::new(
        Arc::new(movie_registry()),
        SqliteStore::open_in_memory().expect("store"),
    )
}

fn document_session() -> Session<SqliteStore> {
    Session::new(
        Arc::new(document_registry()),
        SqliteStore::open_in_memory().expect("store"),
    )
}

fn props(pairs: &[(&str, Value)]) -> PropertyMap {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

/// Saves The Matrix with two actors and returns the movie's key.
fn save_matrix(session: &Session<SqliteStore>, graph: &mut EntityGraph) -> EntityKey {
    let matrix = graph.add_node("Movie", [("title", json!("The Matrix"))]);
    let keanu = graph.add_node("Person", [("name", json!("Keanu Reeves")), ("born", json!(1964))]);
    let carrie = graph.add_node(
        "Person",
        [("name", json!("Carrie-Anne Moss")), ("born", json!(1967))],
    );
    graph.relate(matrix, "actors", keanu);
    graph.relate(matrix, "actors", carrie);
    graph.relate(keanu, "movies", matrix);
    graph.relate(carrie, "movies", matrix);
    session.save(graph, matrix).expect("save");
    matrix
}

fn actor_named(graph: &EntityGraph, movie: EntityKey, name: &str) -> EntityKey {
    graph
        .related_keys(movie, "actors")
        .into_iter()
        .find(|key| graph[*key].property("name") == Some(&json!(name)))
        .expect("actor")
}

fn stored_labels(session: &Session<SqliteStore>, id: i64) -> Vec<String> {
    let mut labels = session.driver().node(id).expect("node").labels;
    labels.sort();
    labels
}

#[test]
fn test_save_then_load_round_trip() {
    let session = session();
    let mut graph = EntityGraph::new();
    let matrix = save_matrix(&session, &mut graph);

    let movie_id = graph[matrix].internal_id().expect("internal id written back");
    assert_eq!(graph[matrix].property("id"), Some(&json!(movie_id)));
    for actor in graph.related_keys(matrix, "actors") {
        assert!(graph[actor].internal_id().is_some());
    }

    let loaded = session.load("Movie", json!(movie_id), 1).expect("load");
    assert_eq!(loaded.roots().len(), 1);
    let root = loaded.roots()[0];
    assert_eq!(loaded.graph[root].property("title"), Some(&json!("The Matrix")));
    let actors = loaded.graph.related_keys(root, "actors");
    let mut names: Vec<&str> = actors
        .iter()
        .filter_map(|key| loaded.graph[*key].property("name").and_then(Value::as_str))
        .collect();
    names.sort();
    assert_eq!(names, ["Carrie-Anne Moss", "Keanu Reeves"]);
    for actor in actors {
        assert_eq!(loaded.graph.related_keys(actor, "movies"), vec![root]);
    }
}

#[test]
fn test_depth_zero_load_has_no_relationships() {
    let session = session();
    let mut graph = EntityGraph::new();
    let matrix = save_matrix(&session, &mut graph);
    let movie_id = graph[matrix].internal_id().expect("id");
    let loaded = session.load("Movie", json!(movie_id), -4).expect("load");
    assert_eq!(loaded.graph.len(), 1);
    assert!(loaded.graph[loaded.roots()[0]].relationships().is_empty());
}

#[test]
fn test_saving_a_loaded_graph_updates_in_place() {
    let session = session();
    let mut graph = EntityGraph::new();
    let matrix = save_matrix(&session, &mut graph);
    let movie_id = graph[matrix].internal_id().expect("id");

    let (mut loaded, roots) = session
        .load("Movie", json!(movie_id), 1)
        .expect("load")
        .into_parts();
    loaded[roots[0]].set_property("title", json!("The Matrix Reloaded"));
    session.save(&mut loaded, roots[0]).expect("resave");

    assert_eq!(session.count_entities_of_type("Movie").expect("count"), 1);
    assert_eq!(session.count_entities_of_type("Person").expect("count"), 2);
    assert_eq!(session.driver().relationship_ids("ACTED_IN").expect("ids").len(), 2);
    let stored = session.driver().node(movie_id).expect("node");
    assert_eq!(stored.properties.get("title"), Some(&json!("The Matrix Reloaded")));
}

#[test]
fn test_actors_removed_from_a_saved_movie_are_unlinked() {
    let session = session();
    let mut graph = EntityGraph::new();
    let matrix = save_matrix(&session, &mut graph);
    let carrie = actor_named(&graph, matrix, "Carrie-Anne Moss");
    assert!(graph.unrelate(matrix, "actors", carrie));

    let plan = session.save(&mut graph, matrix).expect("resave");
    assert_eq!(plan.deleted_relationships.len(), 1);
    assert!(
        graph[matrix]
            .loaded_relationships()
            .iter()
            .all(|loaded| loaded.target != carrie)
    );

    let movie_id = graph[matrix].internal_id().expect("id");
    let loaded = session.load("Movie", json!(movie_id), 1).expect("load");
    let actors = loaded.graph.related_keys(loaded.roots()[0], "actors");
    assert_eq!(actors.len(), 1);
    assert_eq!(loaded.graph[actors[0]].property("name"), Some(&json!("Keanu Reeves")));
    assert_eq!(session.count_entities_of_type("Person").expect("count"), 2);

    let again = session.save(&mut graph, matrix).expect("save unchanged");
    assert!(again.deleted_relationships.is_empty());
}

#[test]
fn test_actors_removed_from_a_loaded_movie_are_unlinked() {
    let session = session();
    let mut graph = EntityGraph::new();
    let matrix = save_matrix(&session, &mut graph);
    let movie_id = graph[matrix].internal_id().expect("id");

    let (mut loaded, roots) = session
        .load("Movie", json!(movie_id), 1)
        .expect("load")
        .into_parts();
    let carrie = actor_named(&loaded, roots[0], "Carrie-Anne Moss");
    assert!(loaded.unrelate(roots[0], "actors", carrie));
    session.save(&mut loaded, roots[0]).expect("resave");

    assert_eq!(session.driver().relationship_ids("ACTED_IN").expect("ids").len(), 1);
    let reloaded = session.load("Movie", json!(movie_id), 1).expect("reload");
    let actors = reloaded.graph.related_keys(reloaded.roots()[0], "actors");
    assert_eq!(actors.len(), 1);
    assert_eq!(reloaded.graph[actors[0]].property("name"), Some(&json!("Keanu Reeves")));
}

#[test]
fn test_relationships_outside_the_loaded_depth_survive_a_save() {
    let session = session();
    let mut graph = EntityGraph::new();
    let matrix = save_matrix(&session, &mut graph);
    let movie_id = graph[matrix].internal_id().expect("id");

    let (mut loaded, roots) = session
        .load("Movie", json!(movie_id), 0)
        .expect("load")
        .into_parts();
    loaded[roots[0]].set_property("title", json!("The Matrix Revisited"));
    let plan = session.save(&mut loaded, roots[0]).expect("resave");

    assert!(plan.deleted_relationships.is_empty());
    assert_eq!(session.driver().relationship_ids("ACTED_IN").expect("ids").len(), 2);
}

#[test]
fn test_versions_start_at_zero_and_advance_on_each_save() {
    let session = document_session();
    let mut graph = EntityGraph::new();
    let doc = graph.add_node("Document", [("title", json!("Notes"))]);
    session.save(&mut graph, doc).expect("save");
    assert_eq!(graph[doc].property("version"), Some(&json!(0)));

    graph[doc].set_property("title", json!("More notes"));
    session.save(&mut graph, doc).expect("resave");
    assert_eq!(graph[doc].property("version"), Some(&json!(1)));

    let id = graph[doc].internal_id().expect("id");
    let stored = session.driver().node(id).expect("node");
    assert_eq!(stored.properties.get("version"), Some(&json!(1)));
    assert_eq!(stored.properties.get("title"), Some(&json!("More notes")));
}

#[test]
fn test_saving_a_stale_copy_fails_and_leaves_the_store_alone() {
    let session = document_session();
    let mut graph = EntityGraph::new();
    let doc = graph.add_node("Document", [("title", json!("Notes"))]);
    session.save(&mut graph, doc).expect("save");
    let id = graph[doc].internal_id().expect("id");

    let (mut first, first_roots) = session.load("Document", json!(id), 0).expect("load").into_parts();
    let (mut second, second_roots) = session.load("Document", json!(id), 0).expect("load").into_parts();

    first[first_roots[0]].set_property("title", json!("First edit"));
    session.save(&mut first, first_roots[0]).expect("fresh save");
    assert_eq!(first[first_roots[0]].property("version"), Some(&json!(1)));

    second[second_roots[0]].set_property("title", json!("Second edit"));
    let err = session
        .save(&mut second, second_roots[0])
        .expect_err("stale save");
    assert!(matches!(
        err,
        MappingError::OptimisticLocking {
            expected: Some(0),
            found: Some(1),
            ..
        }
    ));
    assert!(!err.is_caller_fault());
    assert_eq!(second[second_roots[0]].property("version"), Some(&json!(0)));

    let stored = session.driver().node(id).expect("node");
    assert_eq!(stored.properties.get("title"), Some(&json!("First edit")));
    assert_eq!(stored.properties.get("version"), Some(&json!(1)));
}

#[test]
fn test_dynamic_labels_are_written_read_and_removed() {
    let session = document_session();
    let mut graph = EntityGraph::new();
    let doc = graph.add_node(
        "Document",
        [("title", json!("Notes")), ("tags", json!(["Draft", "Urgent"]))],
    );
    session.save(&mut graph, doc).expect("save");
    let id = graph[doc].internal_id().expect("id");
    assert_eq!(stored_labels(&session, id), ["Document", "Draft", "Urgent"]);

    let (mut loaded, roots) = session.load("Document", json!(id), 0).expect("load").into_parts();
    assert_eq!(loaded[roots[0]].property("tags"), Some(&json!(["Draft", "Urgent"])));

    loaded[roots[0]].set_property("tags", json!(["Urgent", "Published"]));
    session.save(&mut loaded, roots[0]).expect("relabel");
    assert_eq!(stored_labels(&session, id), ["Document", "Published", "Urgent"]);

    loaded[roots[0]].set_property("tags", json!([]));
    session.save(&mut loaded, roots[0]).expect("clear");
    assert_eq!(stored_labels(&session, id), ["Document"]);
    assert_eq!(session.count_entities_of_type("Document").expect("count"), 1);
}

#[test]
fn test_null_properties_are_removed_on_update() {
    let session = session();
    let mut graph = EntityGraph::new();
    let alice = graph.add_node("Person", [("name", json!("Alice")), ("born", json!(1990))]);
    session.save(&mut graph, alice).expect("save");
    graph[alice].set_property("born", Value::Null);
    session.save(&mut graph, alice).expect("resave");
    let id = graph[alice].internal_id().expect("id");
    let stored = session.driver().node(id).expect("node");
    assert!(!stored.properties.contains_key("born"));
    assert_eq!(session.count_entities_of_type("Person").expect("count"), 1);
}

#[test]
fn test_delete_one_removes_an_isolated_node() {
    let session = session();
    let id = session
        .driver()
        .create_node(&["Movie"], &props(&[("title", json!("Alone"))]))
        .expect("node");
    assert_eq!(session.count_entities_of_type("Movie").expect("count"), 1);
    session.delete_by_id("Movie", json!(id)).expect("delete");
    assert_eq!(session.count_entities_of_type("Movie").expect("count"), 0);
}

#[test]
fn test_delete_detaches_relationships() {
    let session = session();
    let mut graph = EntityGraph::new();
    let matrix = save_matrix(&session, &mut graph);
    let movie_id = graph[matrix].internal_id().expect("id");
    session.delete_by_id("Movie", json!(movie_id)).expect("delete");
    assert_eq!(session.count_entities_of_type("Movie").expect("count"), 0);
    assert_eq!(session.count_entities_of_type("Person").expect("count"), 2);
    assert!(session.driver().relationship_ids("ACTED_IN").expect("ids").is_empty());
}

#[test]
fn test_delete_all_and_purge() {
    let session = session();
    let mut graph = EntityGraph::new();
    save_matrix(&session, &mut graph);
    session.delete_all("Person").expect("delete all");
    assert_eq!(session.count_entities_of_type("Person").expect("count"), 0);
    assert_eq!(session.count_entities_of_type("Movie").expect("count"), 1);
    session.purge_database().expect("purge");
    assert_eq!(session.count(&[]).expect("count"), 0);
}

#[test]
fn test_load_all_by_id_with_no_ids_is_empty() {
    let session = session();
    let result = session
        .load_all("Movie", Vec::new(), DepthBound::new(1))
        .expect("load");
    assert!(result.is_empty());
    session.delete_all_by_id("Movie", Vec::new()).expect("delete");
}

#[test]
fn test_load_all_by_id_returns_each_match() {
    let session = session();
    let store = session.driver();
    let heat = store.create_node(&["Movie"], &props(&[("title", json!("Heat"))])).expect("heat");
    let speed = store.create_node(&["Movie"], &props(&[("title", json!("Speed"))])).expect("speed");
    store.create_node(&["Movie"], &props(&[("title", json!("Ronin"))])).expect("ronin");
    let result = session
        .load_all("Movie", vec![json!(heat), json!(speed)], 0)
        .expect("load");
    assert_eq!(result.roots().len(), 2);
    let all = session.load_all_by_type("Movie", 0).expect("load");
    assert_eq!(all.roots().len(), 3);
}

#[test]
fn test_load_by_property_filters_anchors() {
    let session = session();
    let mut graph = EntityGraph::new();
    save_matrix(&session, &mut graph);

    let keanu = session
        .load_by_property("Person", &[Filter::eq("name", json!("Keanu Reeves"))], 1)
        .expect("load");
    assert_eq!(keanu.roots().len(), 1);
    let root = keanu.roots()[0];
    assert_eq!(keanu.graph[root].property("born"), Some(&json!(1964)));
    assert_eq!(keanu.graph.related_keys(root, "movies").len(), 1);

    let older = session
        .load_by_property(
            "Person",
            &[Filter::new("born", ComparisonOperator::LessThan, json!(1966))],
            0,
        )
        .expect("load");
    assert_eq!(older.roots().len(), 1);

    let named = session
        .load_by_property(
            "Person",
            &[Filter::new("name", ComparisonOperator::Contains, json!("-Anne"))],
            0,
        )
        .expect("load");
    assert_eq!(named.roots().len(), 1);
    assert_eq!(
        named.graph[named.roots()[0]].property("name"),
        Some(&json!("Carrie-Anne Moss"))
    );
}

#[test]
fn test_assigned_ids_merge_instead_of_duplicating() {
    let session = session();
    for _ in 0..2 {
        let mut graph = EntityGraph::new();
        let tag = graph.add_node("Tag", [("name", json!("rust"))]);
        session.save(&mut graph, tag).expect("save");
    }
    assert_eq!(session.count_entities_of_type("Tag").expect("count"), 1);
    let loaded = session.load("Tag", json!("rust"), 0).expect("load");
    assert_eq!(loaded.roots().len(), 1);
    assert_eq!(loaded.graph[loaded.roots()[0]].property("name"), Some(&json!("rust")));
}

#[test]
fn test_relationship_entity_round_trip() {
    let session = session();
    let mut graph = EntityGraph::new();
    let keanu = graph.add_node("Person", [("name", json!("Keanu Reeves"))]);
    let matrix = graph.add_node("Movie", [("title", json!("The Matrix"))]);
    let role = graph.add_relationship("Role", keanu, matrix, [("role", json!("Neo"))]);
    graph.relate(keanu, "roles", role);
    session.save(&mut graph, keanu).expect("save");

    let role_id = graph[role].internal_id().expect("relationship id written back");
    assert_eq!(session.count_entities_of_type("Role").expect("count"), 1);

    let loaded = session.load("Role", json!(role_id), 1).expect("load");
    assert_eq!(loaded.roots().len(), 1);
    let root = loaded.roots()[0];
    assert_eq!(loaded.graph[root].property("role"), Some(&json!("Neo")));
    let (start, end) = loaded.graph[root].endpoints().expect("endpoints");
    assert_eq!(loaded.graph[start].property("name"), Some(&json!("Keanu Reeves")));
    assert_eq!(loaded.graph[end].property("title"), Some(&json!("The Matrix")));
    assert_eq!(loaded.graph.related_keys(start, "roles"), vec![root]);

    assert!(matches!(
        session.load("Role", json!(role_id), 0),
        Err(MappingError::InvalidDepth { .. })
    ));

    session.delete_by_id("Role", json!(role_id)).expect("delete");
    assert_eq!(session.count_entities_of_type("Role").expect("count"), 0);
    assert_eq!(session.count_entities_of_type("Person").expect("count"), 1);
}

#[test]
fn test_delete_all_by_id_removes_relationship_entities() {
    let session = session();
    let mut graph = EntityGraph::new();
    let keanu = graph.add_node("Person", [("name", json!("Keanu Reeves"))]);
    let matrix = graph.add_node("Movie", [("title", json!("The Matrix"))]);
    let speed = graph.add_node("Movie", [("title", json!("Speed"))]);
    let neo = graph.add_relationship("Role", keanu, matrix, [("role", json!("Neo"))]);
    let jack = graph.add_relationship("Role", keanu, speed, [("role", json!("Jack Traven"))]);
    graph.relate(keanu, "roles", neo);
    graph.relate(keanu, "roles", jack);
    session.save(&mut graph, keanu).expect("save");
    assert_eq!(session.count_entities_of_type("Role").expect("count"), 2);

    let ids = [neo, jack]
        .iter()
        .map(|role| json!(graph[*role].internal_id().expect("role id")))
        .collect();
    session.delete_all_by_id("Role", ids).expect("delete");
    assert_eq!(session.count_entities_of_type("Role").expect("count"), 0);
    assert_eq!(session.count_entities_of_type("Movie").expect("count"), 2);
    session.delete_all_by_id("Role", Vec::new()).expect("nothing to delete");
}

#[test]
fn test_save_depth_limits_the_write() {
    let session = session().with_save_depth(0);
    let mut graph = EntityGraph::new();
    let matrix = graph.add_node("Movie", [("title", json!("The Matrix"))]);
    let keanu = graph.add_node("Person", [("name", json!("Keanu Reeves"))]);
    graph.relate(matrix, "actors", keanu);
    let plan = session.save(&mut graph, matrix).expect("save");
    assert_eq!(plan.nodes.len(), 1);
    assert_eq!(session.count_entities_of_type("Person").expect("count"), 0);
}

#[test]
fn test_unknown_types_are_rejected() {
    let session = session();
    assert!(matches!(
        session.load("Studio", json!(1), 1),
        Err(MappingError::UnknownEntity(_))
    ));
}

/// Records statements and replays canned rows.
struct Recording {
    statements: RefCell<Vec<String>>,
    rows: Vec<Row>,
}

impl Driver for Recording {
    fn run(&self, statement: &Statement) -> Result<Vec<Row>, MappingError> {
        self.statements.borrow_mut().push(statement.text().to_string());
        Ok(self.rows.clone())
    }
}

#[test]
fn test_session_runs_through_any_driver() {
    let driver = Recording {
        statements: RefCell::new(Vec::new()),
        rows: vec![Row::single("COUNT(n)", json!(4))],
    };
    let config = MappingConfig::from_json(MAPPING_JSON).expect("config");
    let session = Session::from_config(&config, &driver).expect("session");
    assert_eq!(session.count_entities_of_type("Movie").expect("count"), 4);
    assert!(session.load_all("Movie", Vec::new(), 1).expect("load").is_empty());
    assert_eq!(
        driver.statements.borrow().as_slice(),
        ["MATCH (n:`Movie`) RETURN COUNT(n)".to_string()]
    );
}

#[test]
fn test_driver_failures_are_not_caller_faults() {
    struct Failing;
    impl Driver for Failing {
        fn run(&self, _statement: &Statement) -> Result<Vec<Row>, MappingError> {
            Err(MappingError::driver("connection refused"))
        }
    }
    let session = Session::new(Arc::new(movie_registry()), Failing);
    let err = session.find("Movie", json!(1)).expect_err("driver error");
    assert!(!err.is_caller_fault());
    let err = session.find("Studio", json!(1)).expect_err("unknown type");
    assert!(err.is_caller_fault());
}

#[test]
fn test_a_guarded_write_that_returns_nothing_is_stale() {
    let driver = Recording {
        statements: RefCell::new(Vec::new()),
        rows: Vec::new(),
    };
    let session = Session::new(Arc::new(document_registry()), &driver);
    let mut graph = EntityGraph::new();
    let doc = graph.add_node("Document", [("title", json!("Notes")), ("version", json!(3))]);
    graph[doc].set_internal_id(5);

    let err = session.save(&mut graph, doc).expect_err("stale");
    assert!(matches!(
        err,
        MappingError::OptimisticLocking {
            expected: Some(3),
            found: None,
            ..
        }
    ));
    assert_eq!(graph[doc].property("version"), Some(&json!(3)));
    assert!(driver.statements.borrow()[0].contains("AND _0.`version` = $_0_version"));
}
