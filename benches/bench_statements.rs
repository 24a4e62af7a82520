use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use graphmap::{
    DepthBound, EntityGraph, EntityKey, StatementGenerator,
    decompose::Decomposer,
    schema::{
        Direction, EntityDescriptor, PropertyDescriptor, RelationshipDescriptor, ScalarKind,
        SchemaRegistry,
    },
    statement::{ComparisonOperator, Filter},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::json;

const GRAPH_SEED: u64 = 0x57A7;
const EDGES_PER_NODE: usize = 3;
const SAMPLE_SIZE: usize = 20;
const WARM_UP: Duration = Duration::from_millis(300);
const MEASURE: Duration = Duration::from_millis(500);

fn bench_scale() -> usize {
    #[cfg(feature = "bench-ci")]
    {
        500
    }
    #[cfg(not(feature = "bench-ci"))]
    {
        2_000
    }
}

fn registry() -> SchemaRegistry {
    let person = EntityDescriptor::node("Person")
        .internal_id("id")
        .property(PropertyDescriptor::new("name", ScalarKind::String))
        .property(PropertyDescriptor::new("born", ScalarKind::Integer))
        .relationship(RelationshipDescriptor::collection(
            "follows",
            "FOLLOWS",
            Direction::Outgoing,
            "Person",
        ));
    let mut builder = SchemaRegistry::builder();
    builder.register(person).expect("person");
    builder.build().expect("registry")
}

/// Random follower graph; every node follows a few others, cycles included.
fn follower_graph(nodes: usize, seed: u64) -> (EntityGraph, EntityKey) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut graph = EntityGraph::new();
    let keys: Vec<EntityKey> = (0..nodes)
        .map(|i| {
            graph.add_node(
                "Person",
                [
                    ("name", json!(format!("person-{i}"))),
                    ("born", json!(1950 + rng.gen_range(0..60))),
                ],
            )
        })
        .collect();
    for &key in &keys {
        for _ in 0..EDGES_PER_NODE {
            let target = keys[rng.gen_range(0..nodes)];
            graph.relate(key, "follows", target);
        }
    }
    (graph, keys[0])
}

fn bench_read_statements(c: &mut Criterion) {
    let registry = registry();
    let generator = StatementGenerator::new(&registry);
    let person = registry.describe("Person").expect("person");
    let filters = [
        Filter::eq("name", json!("person-1")),
        Filter::new("born", ComparisonOperator::GreaterThanOrEqual, json!(1970)),
    ];
    let mut group = c.benchmark_group("read_statements");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    group.bench_function("find_one", |b| {
        b.iter(|| {
            generator
                .find_one(person, json!(1), DepthBound::new(2))
                .expect("statement")
        });
    });
    group.bench_function("find_by_property", |b| {
        b.iter(|| {
            generator
                .find_by_property(person, &filters, DepthBound::unbounded())
                .expect("statement")
        });
    });
    group.finish();
}

fn bench_write_plans(c: &mut Criterion) {
    let registry = registry();
    let mut group = c.benchmark_group("write_plans");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for nodes in [bench_scale() / 10, bench_scale()] {
        let (graph, root) = follower_graph(nodes, GRAPH_SEED);
        group.bench_with_input(BenchmarkId::new("decompose", nodes), &graph, |b, graph| {
            b.iter(|| {
                let mut graph = graph.clone();
                Decomposer::new(&registry)
                    .decompose(&mut graph, root)
                    .expect("plan")
            });
        });
        let mut prepared = graph.clone();
        let plan = Decomposer::new(&registry)
            .decompose(&mut prepared, root)
            .expect("plan");
        group.bench_with_input(BenchmarkId::new("compile", nodes), &plan, |b, plan| {
            b.iter(|| StatementGenerator::new(&registry).compile_write(plan));
        });
    }
    group.finish();
}

criterion_group!(
    name = statement_benches;
    config = Criterion::default();
    targets = bench_read_statements, bench_write_plans
);
criterion_main!(statement_benches);
