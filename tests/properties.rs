//! Cross-cutting properties that must hold regardless of which model or
//! signal is involved.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use signalmesh::config::ProviderConfig;
use signalmesh::identity::Identifier;
use signalmesh::provider::Provider;
use signalmesh::router::RouterBuilder;
use signalmesh::schema::{ParallelismSchema, PerModelSchema};

proptest! {
    /// Property 1: `Identifier::from_name` round-trips through its 8-byte
    /// representation for any UTF-8 name, no matter its length.
    #[test]
    fn prop_named_identifiers_round_trip_through_bytes(name in ".{0,64}") {
        let id = Identifier::from_name(&name);
        prop_assert_eq!(id, Identifier::from_bytes(id.to_bytes()));
    }

    /// Property 3 (codec half): any i128 packed through the router's default
    /// codec decodes back to the same value.
    #[test]
    fn prop_i128_codec_round_trips(value: i128) {
        let mut builder = RouterBuilder::new().with_default_signals(false);
        builder.register_signal("noop", |_, _, _| {}).unwrap();
        let router = builder.build();
        let packed = router.pack("noop", &value).unwrap();
        let back: i128 = router.unpack(packed.data().unwrap()).unwrap();
        prop_assert_eq!(back, value);
    }

    /// Property 3 (codec half): any UTF-8 string packed through the
    /// router's default codec decodes back to the same value.
    #[test]
    fn prop_string_codec_round_trips(value in ".{0,256}") {
        let mut builder = RouterBuilder::new().with_default_signals(false);
        builder.register_signal("noop", |_, _, _| {}).unwrap();
        let router = builder.build();
        let packed = router.pack("noop", &value).unwrap();
        let back: String = router.unpack(packed.data().unwrap()).unwrap();
        prop_assert_eq!(back, value);
    }
}

/// Property 1 (auto-generated half): identifiers round-trip through their
/// 8-byte representation regardless of how they were constructed.
#[test]
fn identifiers_round_trip_through_bytes() {
    for name in ["a", "core", "a-very-long-model-address", ""] {
        let id = Identifier::from_name(name);
        assert_eq!(id, Identifier::from_bytes(id.to_bytes()));
    }
    for _ in 0..256 {
        let id = Identifier::generate();
        assert_eq!(id, Identifier::from_bytes(id.to_bytes()));
    }
}

/// Property 2: auto-generated identifiers are (practically) unique.
#[test]
fn auto_generated_identifiers_are_unique() {
    let ids: HashSet<Identifier> = (0..5000).map(|_| Identifier::generate()).collect();
    assert_eq!(ids.len(), 5000);
}

/// Property 3: encoder/decoder round-trips preserve the packed value for
/// every default-codec type.
#[test]
fn default_codec_round_trips() {
    let mut builder = RouterBuilder::new().with_default_signals(false);
    builder.register_signal("noop", |_, _, _| {}).unwrap();
    let router = builder.build();

    let packed = router.pack("noop", &"round trip".to_string()).unwrap();
    let back: String = router.unpack(packed.data().unwrap()).unwrap();
    assert_eq!(back, "round trip");

    let packed = router.pack("noop", &123_456_789_i128).unwrap();
    let back: i128 = router.unpack(packed.data().unwrap()).unwrap();
    assert_eq!(back, 123_456_789);
}

/// Property 4: a router, once built, rejects no further configuration calls
/// because there is no API to make any — `Router` exposes only read methods.
#[test]
fn sealed_router_is_read_only() {
    let router = RouterBuilder::new().build();
    assert!(router.is_sealed());
    assert!(router.signal_names().any(|name| name == "exit"));
}

/// Property 5: signal names resolve case-insensitively to the same index
/// regardless of casing used at registration or lookup time.
#[test]
fn signal_name_lookup_is_case_insensitive() {
    let mut builder = RouterBuilder::new().with_default_signals(false);
    let idx = builder.register_signal("Greet", |_, _, _| {}).unwrap();
    let router = builder.build();
    assert_eq!(router.index_of("greet").unwrap(), idx);
    assert_eq!(router.index_of("GREET").unwrap(), idx);
}

/// Property 6: a model that never receives any signal reports zero live
/// threads after the provider shuts down.
#[tokio::test]
async fn shutdown_drains_every_container() {
    let provider = Provider::start(
        RouterBuilder::new(),
        Arc::new(PerModelSchema) as Arc<dyn ParallelismSchema>,
        ProviderConfig::default(),
    )
    .await
    .unwrap();

    for i in 0..5 {
        provider
            .registry()
            .spawn_model(
                Identifier::from_name(&format!("m{i}")),
                Provider::noop_behavior(),
                provider.schema(),
                std::sync::Arc::downgrade(provider.router()),
            )
            .await
            .unwrap();
    }

    provider.shutdown().await;
    let closed = provider.await_close(Duration::from_secs(2)).await;
    assert!(closed);
    assert_eq!(provider.stats().live_threads, 0);
}

/// Property 7: the registry reports `RegistryFull` rather than silently
/// overwriting an existing model once at capacity.
#[tokio::test]
async fn registry_enforces_its_capacity() {
    let provider = Provider::start(
        RouterBuilder::new(),
        Arc::new(PerModelSchema) as Arc<dyn ParallelismSchema>,
        ProviderConfig { max_models: 1, ..ProviderConfig::default() },
    )
    .await
    .unwrap();

    let err = provider
        .registry()
        .spawn_model(
            Identifier::from_name("overflow"),
            Provider::noop_behavior(),
            provider.schema(),
            std::sync::Arc::downgrade(provider.router()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, signalmesh::error::SignalMeshError::RegistryFull { .. }));
}
