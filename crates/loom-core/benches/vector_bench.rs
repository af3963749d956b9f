//! # Store Benchmarks
//!
//! Vector index and converged query performance.
//!
//! Run with: `cargo bench -p loom-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use loom_core::{
    ConvergedQuery, Direction, Edge, Embedding, EmbeddingId, Message, Node, NodeId, QueryEngine,
    Store, StructuralFilter,
};
use std::hint::black_box;
use tempfile::TempDir;

const DIMENSION: usize = 64;

/// Deterministic pseudo-random unit vector.
fn vector(seed: usize) -> Vec<f32> {
    let mut state = (seed as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    let mut v: Vec<f32> = (0..DIMENSION)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 2000) as f32 / 1000.0 - 1.0
        })
        .collect();
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(f32::EPSILON);
    v.iter_mut().for_each(|x| *x /= norm);
    v
}

/// A store with `size` embedded messages spread over ten chats, chained by edges.
fn populated_store(size: usize) -> (TempDir, Store) {
    let temp = tempfile::tempdir().expect("temp dir");
    let store = Store::open(temp.path().join("bench.redb")).expect("open");
    for chunk in (0..size).collect::<Vec<_>>().chunks(256) {
        store
            .write(|batch| {
                for &i in chunk {
                    let embedding_id = EmbeddingId::new(format!("emb:m{i:06}"));
                    batch.put_embedding(Embedding::new(embedding_id.clone(), vector(i), "bench"))?;
                    let mut node = Node::from(
                        Message::new(format!("m{i:06}"), format!("c{}", i % 10), "bench", "text")
                            .with_timestamp(i as i64),
                    );
                    node.set_embedding_id(Some(embedding_id));
                    batch.put_node(node)?;
                    if i > 0 {
                        batch.put_edge(Edge::new(
                            format!("e{i:06}"),
                            format!("m{:06}", i - 1).as_str(),
                            format!("m{i:06}").as_str(),
                            "NEXT",
                        ))?;
                    }
                }
                Ok(())
            })
            .expect("populate");
    }
    (temp, store)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_embedding_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("embedding_insertion");
    group.sample_size(10);

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(populated_store(size)));
        });
    }

    group.finish();
}

fn bench_nearest(c: &mut Criterion) {
    let mut group = c.benchmark_group("nearest_embeddings");

    for size in [1000, 5000].iter() {
        let (_temp, store) = populated_store(*size);
        let query = vector(usize::MAX / 3);

        group.bench_with_input(BenchmarkId::new("k_10", size), &query, |b, query| {
            b.iter(|| black_box(store.nearest_embeddings(query, 10, &|_| true)));
        });
    }

    group.finish();
}

fn bench_converged_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("converged_query");
    let (_temp, store) = populated_store(5000);
    let engine = QueryEngine::new(&store);
    let query_vector = vector(42);

    let structural = ConvergedQuery::new()
        .filter(StructuralFilter::equals("chat_id", "c3"))
        .semantic(query_vector.clone(), None)
        .limit(10);
    group.bench_function("structural_exact", |b| {
        b.iter(|| black_box(engine.query(&structural)));
    });

    let semantic = ConvergedQuery::new().semantic(query_vector, None).limit(10);
    group.bench_function("semantic_only", |b| {
        b.iter(|| black_box(engine.query(&semantic)));
    });

    group.bench_function("shortest_path_100_hops", |b| {
        let (start, end) = (NodeId::from("m001000"), NodeId::from("m001100"));
        b.iter(|| black_box(engine.shortest_path(&start, &end, Direction::Outbound)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_embedding_insertion,
    bench_nearest,
    bench_converged_query,
);

criterion_main!(benches);
