//! # signalmesh
//!
//! An in-process, actor-style messaging framework: addressable models
//! exchange typed signals through a sealed router, scheduled onto one of two
//! pluggable parallelism schemas (a dedicated worker per model, or a shared,
//! dynamically-sized worker pool).
//!
//! ```no_run
//! use std::sync::Arc;
//! use signalmesh::config::ProviderConfig;
//! use signalmesh::identity::Identifier;
//! use signalmesh::provider::Provider;
//! use signalmesh::router::RouterBuilder;
//! use signalmesh::schema::{ParallelismSchema, PerModelSchema};
//!
//! # async fn run() -> Result<(), signalmesh::error::SignalMeshError> {
//! let mut router = RouterBuilder::new();
//! router.register_signal("greet", |_router, _destination, signal| {
//!     signal.mark_handled();
//! })?;
//!
//! let schema: Arc<dyn ParallelismSchema> = Arc::new(PerModelSchema);
//! let provider = Provider::start(router, schema, ProviderConfig::default()).await?;
//!
//! let worker = provider
//!     .registry()
//!     .spawn_model(
//!         Identifier::from_name("worker1"),
//!         Provider::noop_behavior(),
//!         provider.schema(),
//!         Arc::downgrade(provider.router()),
//!     )
//!     .await?;
//! # let _ = worker;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod container;
pub mod content;
pub mod error;
pub mod identity;
pub mod model;
pub mod observability;
pub mod provider;
pub mod registry;
pub mod router;
pub mod schema;
pub mod signal;
pub mod wire;

pub use config::ProviderConfig;
pub use content::{Content, ContentFlags, PackedData};
pub use error::SignalMeshError;
pub use identity::Identifier;
pub use model::{ModelBehavior, ModelHandle};
pub use provider::{Provider, ProviderStats};
pub use registry::ModelRegistry;
pub use router::{Router, RouterBuilder};
pub use signal::Signal;
