use std::{sync::Arc, time::Duration};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use graphmap::{
    EntityGraph, Materializer, Session, SqliteStore,
    result::{RawNode, RawPath, RawRelationship, RawValue, Row},
    schema::{
        Direction, EntityDescriptor, PropertyDescriptor, RelationshipDescriptor, ScalarKind,
        SchemaRegistry,
    },
    statement::PATHS_COLUMN,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::json;

const CAST_SEED: u64 = 0xCA57;
const ACTORS_PER_MOVIE: usize = 4;
const SAMPLE_SIZE: usize = 20;
const WARM_UP: Duration = Duration::from_millis(300);
const MEASURE: Duration = Duration::from_millis(500);

fn bench_scale() -> usize {
    #[cfg(feature = "bench-ci")]
    {
        200
    }
    #[cfg(not(feature = "bench-ci"))]
    {
        1_000
    }
}

fn registry() -> Arc<SchemaRegistry> {
    let person = EntityDescriptor::node("Person")
        .internal_id("id")
        .property(PropertyDescriptor::new("name", ScalarKind::String))
        .relationship(RelationshipDescriptor::collection(
            "movies",
            "ACTED_IN",
            Direction::Outgoing,
            "Movie",
        ));
    let movie = EntityDescriptor::node("Movie")
        .internal_id("id")
        .property(PropertyDescriptor::new("title", ScalarKind::String).required())
        .relationship(RelationshipDescriptor::collection(
            "actors",
            "ACTED_IN",
            Direction::Incoming,
            "Person",
        ));
    let mut builder = SchemaRegistry::builder();
    builder.register(person).expect("person");
    builder.register(movie).expect("movie");
    Arc::new(builder.build().expect("registry"))
}

/// Casts `movies` movies from a pool of `movies` people; movie ids start after the people.
fn cast(movies: usize, seed: u64) -> Vec<(usize, Vec<usize>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..movies)
        .map(|movie| {
            let actors = (0..ACTORS_PER_MOVIE)
                .map(|_| rng.gen_range(0..movies))
                .collect();
            (movie, actors)
        })
        .collect()
}

/// One `collect(distinct p)` row holding every movie's cast paths.
fn cast_rows(movies: usize) -> Vec<Row> {
    let offset = movies as i64;
    let mut paths = Vec::new();
    let mut rel_id = 0;
    for (movie, actors) in cast(movies, CAST_SEED) {
        let movie_node = RawNode::new(offset + movie as i64, ["Movie"])
            .with_property("title", json!(format!("movie-{movie}")));
        paths.push(RawValue::Path(RawPath::single(movie_node.clone())));
        for actor in actors {
            rel_id += 1;
            let person = RawNode::new(actor as i64, ["Person"])
                .with_property("name", json!(format!("person-{actor}")));
            let acted = RawRelationship::new(rel_id, "ACTED_IN", actor as i64, offset + movie as i64);
            paths.push(RawValue::Path(
                RawPath::single(movie_node.clone()).then(acted, person),
            ));
        }
    }
    vec![Row::single(PATHS_COLUMN, RawValue::List(paths))]
}

fn bench_materialize_rows(c: &mut Criterion) {
    let registry = registry();
    let mut group = c.benchmark_group("materialize_rows");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for movies in [bench_scale() / 10, bench_scale()] {
        let rows = cast_rows(movies);
        group.bench_with_input(BenchmarkId::from_parameter(movies), &rows, |b, rows| {
            b.iter(|| {
                Materializer::new(&registry)
                    .materialize("Movie", rows)
                    .expect("materialize")
            });
        });
    }
    group.finish();
}

fn bench_session_load(c: &mut Criterion) {
    let registry = registry();
    let session = Session::new(registry, SqliteStore::open_in_memory().expect("store"));
    let movies = bench_scale() / 10;
    let mut graph = EntityGraph::new();
    let people: Vec<_> = (0..movies)
        .map(|i| graph.add_node("Person", [("name", json!(format!("person-{i}")))]))
        .collect();
    let mut roots = Vec::with_capacity(movies);
    for (movie, actors) in cast(movies, CAST_SEED) {
        let key = graph.add_node("Movie", [("title", json!(format!("movie-{movie}")))]);
        for actor in actors {
            graph.relate(key, "actors", people[actor]);
        }
        roots.push(key);
    }
    session.save_all(&mut graph, &roots).expect("save");
    let anchor = graph[roots[0]].internal_id().expect("saved movie");

    let mut group = c.benchmark_group("session_load");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for depth in [0, 1, 2] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter(|| session.load("Movie", json!(anchor), depth).expect("load"));
        });
    }
    group.finish();
}

criterion_group!(
    name = materialize_benches;
    config = Criterion::default();
    targets = bench_materialize_rows, bench_session_load
);
criterion_main!(materialize_benches);
