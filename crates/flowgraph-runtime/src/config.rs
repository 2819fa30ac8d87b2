//! Instance configuration.

use serde::{Deserialize, Serialize};

/// What to do when a graph-native target (variable, function, property,
/// parameter) cannot be found at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Raise a resolution fault naming the missing element.
    #[default]
    Strict,
    /// Read `null`, ignore writes, and log the miss at debug level.
    BestEffort,
}

/// Configuration for a [`GraphInstance`](crate::GraphInstance).
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Whether to record execution traces.
    pub trace_enabled: bool,
    /// Maximum nesting of synchronous function calls. Default: 256.
    pub max_call_depth: usize,
    /// Maximum iterations of a single loop activation. Default: 1_000_000.
    pub max_loop_iterations: usize,
    pub resolution: ResolutionPolicy,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        InstanceConfig {
            trace_enabled: false,
            max_call_depth: 256,
            max_loop_iterations: 1_000_000,
            resolution: ResolutionPolicy::Strict,
        }
    }
}
