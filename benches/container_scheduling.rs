//! Scheduling-throughput benchmarks comparing the per-model and pool
//! parallelism schemas under an increasing model count.

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use signalmesh::config::ProviderConfig;
use signalmesh::identity::Identifier;
use signalmesh::provider::Provider;
use signalmesh::router::RouterBuilder;
use signalmesh::schema::{ParallelismSchema, PerModelSchema, PoolSchema};
use signalmesh::signal::Signal;
use tokio::runtime::Runtime;

async fn spawn_and_ping(schema: Arc<dyn ParallelismSchema>, model_count: usize) {
    let provider = Provider::start(RouterBuilder::new(), schema, ProviderConfig::default()).await.unwrap();

    let mut ids = Vec::with_capacity(model_count);
    for i in 0..model_count {
        let id = Identifier::from_name(&format!("bench{i}"));
        provider
            .registry()
            .spawn_model(id, Provider::noop_behavior(), provider.schema(), Arc::downgrade(provider.router()))
            .await
            .unwrap();
        ids.push(id);
    }

    for id in ids {
        let _ = provider
            .registry()
            .deliver(Signal::new(0, Some("_null".to_string()), None, id, None, None, None))
            .await;
    }

    provider.shutdown().await;
    let _ = provider.await_close(Duration::from_secs(5)).await;
}

fn bench_per_model_schema(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("container_scheduling_per_model");
    group.sample_size(10);
    for model_count in [1usize, 10, 50] {
        group.bench_with_input(
            BenchmarkId::new("spawn_and_ping", model_count),
            &model_count,
            |b, &model_count| {
                b.to_async(&rt).iter(|| async move {
                    let schema: Arc<dyn ParallelismSchema> = Arc::new(PerModelSchema);
                    black_box(spawn_and_ping(schema, model_count).await);
                });
            },
        );
    }
    group.finish();
}

fn bench_pool_schema(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("container_scheduling_pool");
    group.sample_size(10);
    for model_count in [1usize, 10, 50] {
        group.bench_with_input(
            BenchmarkId::new("spawn_and_ping", model_count),
            &model_count,
            |b, &model_count| {
                b.to_async(&rt).iter(|| async move {
                    let schema: Arc<dyn ParallelismSchema> = PoolSchema::new(4, 8);
                    black_box(spawn_and_ping(schema, model_count).await);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_per_model_schema, bench_pool_schema);
criterion_main!(benches);
