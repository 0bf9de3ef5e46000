//! Parallelism schemas: pluggable strategies for how a model's ticks are
//! scheduled onto tasks.

pub mod per_model;
pub mod pool;

use std::sync::{Arc, Weak};

use crate::container::Container;
use crate::model::ModelHandle;
use crate::provider::Provider;
use crate::registry::ModelRegistry;
use crate::router::Router;

pub use per_model::PerModelSchema;
pub use pool::PoolSchema;

/// A strategy for scheduling a model's ticks: a dedicated worker per model,
/// or a shared, dynamically-sized pool of workers.
#[async_trait::async_trait]
pub trait ParallelismSchema: Send + Sync {
    /// Builds (and, for schemas that need a dedicated task, starts) a
    /// container for `model`.
    async fn create_container(
        &self,
        model: Arc<ModelHandle>,
        provider: Weak<Provider>,
        registry: Weak<ModelRegistry>,
        router: Weak<Router>,
    ) -> Arc<dyn Container>;
}
