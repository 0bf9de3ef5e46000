//! Validated configuration for the provider and its parallelism schema.

use nutype::nutype;
use serde::{Deserialize, Serialize};

use crate::error::SignalMeshError;

/// Number of worker slots a pool schema targets, validated to be at least 1.
#[nutype(
    validate(greater_or_equal = 1),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, AsRef)
)]
pub struct TargetPools(usize);

/// Containers-per-worker a pool schema targets, validated to be at least 1.
#[nutype(
    validate(greater_or_equal = 1),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, AsRef)
)]
pub struct TargetDensity(usize);

/// Top-level provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Maximum number of models the registry will hold at once.
    pub max_models: usize,
    /// Capacity of the `Shutdown`/`PostInitialization`/`PostShutdown`
    /// broadcast channels.
    pub event_channel_capacity: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self { max_models: 1_000_000, event_channel_capacity: 16 }
    }
}

impl ProviderConfig {
    /// Checks that the configuration's invariants hold.
    ///
    /// # Errors
    /// Returns [`SignalMeshError::Argument`] if `max_models` or
    /// `event_channel_capacity` is zero.
    pub fn validate(&self) -> Result<(), SignalMeshError> {
        if self.max_models == 0 {
            return Err(SignalMeshError::Argument { reason: "max_models must be at least 1".to_string() });
        }
        if self.event_channel_capacity == 0 {
            return Err(SignalMeshError::Argument {
                reason: "event_channel_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration for [`crate::schema::PoolSchema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSchemaConfig {
    /// Upper bound on concurrent worker tasks. Defaults to the host's CPU
    /// count.
    pub target_pools: TargetPools,
    /// Containers each worker is sized to carry.
    pub target_density: TargetDensity,
}

impl Default for PoolSchemaConfig {
    fn default() -> Self {
        Self {
            target_pools: TargetPools::try_new(num_cpus::get()).unwrap_or_else(|_| {
                TargetPools::try_new(1).expect("1 satisfies greater_or_equal(1)")
            }),
            target_density: TargetDensity::try_new(4).expect("4 satisfies greater_or_equal(1)"),
        }
    }
}
