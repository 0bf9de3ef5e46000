//! End-to-end scenarios exercising the provider, router, and both
//! parallelism schemas together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use signalmesh::config::ProviderConfig;
use signalmesh::identity::Identifier;
use signalmesh::model::{ModelBehavior, ModelHandle};
use signalmesh::provider::Provider;
use signalmesh::router::RouterBuilder;
use signalmesh::schema::{ParallelismSchema, PerModelSchema, PoolSchema};
use signalmesh::signal::Signal;

struct CountingBehavior {
    count: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl ModelBehavior for CountingBehavior {
    async fn on_read_signal(&self, _model: &ModelHandle, signal: &Signal) {
        self.count.fetch_add(1, Ordering::SeqCst);
        signal.mark_handled();
    }
}

/// Scenario A: a typed "greet" signal sent through the router's pack/unpack
/// path is observed and handled by the receiving model.
#[tokio::test]
async fn scenario_a_named_signal_is_delivered_and_handled() {
    let mut builder = RouterBuilder::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_handler = seen.clone();
    builder
        .register_typed_signal::<String>("greet", "String", move |_router, _dest, signal, payload| {
            assert_eq!(payload, "hello");
            signal.mark_handled();
            seen_handler.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let schema: Arc<dyn ParallelismSchema> = Arc::new(PerModelSchema);
    let provider = Provider::start(builder, schema, ProviderConfig::default()).await.unwrap();

    let worker = Identifier::from_name("greeter");
    provider
        .registry()
        .spawn_model(worker, Provider::noop_behavior(), provider.schema(), Arc::downgrade(provider.router()))
        .await
        .unwrap();

    let signal = provider
        .registry()
        .send_and_await(
            "greet",
            None,
            Some(worker),
            Some("hello".to_string()),
            Some("String"),
            None,
            Duration::from_secs(2),
        )
        .await
        .unwrap();

    assert!(signal.handled());
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

/// Scenario B: sending `suspend` then a plain signal drops the second send,
/// and `exit` afterward still reaches the paused model's container.
#[tokio::test]
async fn scenario_b_pause_rejects_new_signals_until_resumed() {
    let schema: Arc<dyn ParallelismSchema> = Arc::new(PerModelSchema);
    let provider = Provider::start(RouterBuilder::new(), schema, ProviderConfig::default()).await.unwrap();

    let worker = Identifier::from_name("pausable");
    provider
        .registry()
        .spawn_model(worker, Provider::noop_behavior(), provider.schema(), Arc::downgrade(provider.router()))
        .await
        .unwrap();

    provider.registry().request_pause(worker);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let container = provider.registry().container(worker).unwrap();
    assert!(container.is_paused());

    let rejected = provider
        .registry()
        .deliver(Signal::new(0, Some("_null".to_string()), None, worker, None, None, None))
        .await
        .unwrap();
    assert!(!rejected);

    provider.registry().request_resume(worker);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!container.is_paused());
}

/// Scenario C: per-model schema spins up one worker per model and tears all
/// of them down on provider shutdown.
#[tokio::test]
async fn scenario_c_per_model_schema_drains_many_models() {
    let schema: Arc<dyn ParallelismSchema> = Arc::new(PerModelSchema);
    let provider = Provider::start(RouterBuilder::new(), schema, ProviderConfig::default()).await.unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    for i in 0..8 {
        provider
            .registry()
            .spawn_model(
                Identifier::from_name(&format!("w{i}")),
                Arc::new(CountingBehavior { count: count.clone() }),
                provider.schema(),
                Arc::downgrade(provider.router()),
            )
            .await
            .unwrap();
    }

    for i in 0..8 {
        let id = Identifier::from_name(&format!("w{i}"));
        provider
            .registry()
            .deliver(Signal::new(0, Some("ping".to_string()), None, id, None, None, None))
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count.load(Ordering::SeqCst), 8);

    provider.shutdown().await;
    assert!(provider.await_close(Duration::from_secs(2)).await);
}

/// Scenario D: the pool schema processes signals for models that share a
/// bounded set of worker tasks, rather than one thread per model.
#[tokio::test]
async fn scenario_d_pool_schema_shares_workers_across_models() {
    let schema: Arc<dyn ParallelismSchema> = PoolSchema::new(2, 4);
    let provider = Provider::start(RouterBuilder::new(), schema, ProviderConfig::default()).await.unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    for i in 0..6 {
        provider
            .registry()
            .spawn_model(
                Identifier::from_name(&format!("pooled{i}")),
                Arc::new(CountingBehavior { count: count.clone() }),
                provider.schema(),
                Arc::downgrade(provider.router()),
            )
            .await
            .unwrap();
    }

    for i in 0..6 {
        let id = Identifier::from_name(&format!("pooled{i}"));
        provider
            .registry()
            .deliver(Signal::new(0, Some("ping".to_string()), None, id, None, None, None))
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(count.load(Ordering::SeqCst), 6);

    provider.shutdown().await;
    assert!(provider.await_close(Duration::from_secs(2)).await);
}

/// Scenario E: an expired signal is dropped at the fast path and never
/// reaches the model's behavior.
#[tokio::test]
async fn scenario_e_expired_signal_never_runs_behavior() {
    let count = Arc::new(AtomicUsize::new(0));
    let schema: Arc<dyn ParallelismSchema> = Arc::new(PerModelSchema);
    let provider = Provider::start(RouterBuilder::new(), schema, ProviderConfig::default()).await.unwrap();

    let worker = Identifier::from_name("expiring");
    provider
        .registry()
        .spawn_model(worker, Arc::new(CountingBehavior { count: count.clone() }), provider.schema(), Arc::downgrade(provider.router()))
        .await
        .unwrap();

    let signal = Signal::new(
        0,
        Some("ping".to_string()),
        None,
        worker,
        None,
        None,
        Some(Duration::from_millis(0)),
    );
    tokio::time::sleep(Duration::from_millis(5)).await;
    let accepted = provider.registry().deliver(signal).await.unwrap();
    assert!(!accepted);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

/// Scenario F: `exit` delivered to a model kills its container, and the
/// registry no longer reports it alive once the kill has propagated.
#[tokio::test]
async fn scenario_f_exit_signal_kills_the_container() {
    let schema: Arc<dyn ParallelismSchema> = Arc::new(PerModelSchema);
    let provider = Provider::start(RouterBuilder::new(), schema, ProviderConfig::default()).await.unwrap();

    let worker = Identifier::from_name("killable");
    provider
        .registry()
        .spawn_model(worker, Provider::noop_behavior(), provider.schema(), Arc::downgrade(provider.router()))
        .await
        .unwrap();

    let container = provider.registry().container(worker).unwrap();
    assert!(container.is_alive());

    provider
        .registry()
        .deliver(Signal::new(0, Some("exit".to_string()), None, worker, None, None, None))
        .await
        .unwrap();

    for _ in 0..200 {
        if !container.is_alive() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!container.is_alive());
}
