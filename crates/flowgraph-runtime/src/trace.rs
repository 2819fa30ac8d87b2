//! Execution trace recording.
//!
//! When tracing is enabled via [`InstanceConfig::trace_enabled`](crate::InstanceConfig),
//! the instance records a [`TraceEntry`] for every node it executes,
//! capturing the node, a description of its kind, the input values it read
//! and the value it produced.

use serde::Serialize;

use flowgraph_core::{ElementId, PortId, Value};

use crate::scheduler::RoutineId;

#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub routine: RoutineId,
    pub node: ElementId,
    /// Human-readable description of the node kind.
    pub description: String,
    pub inputs: Vec<(PortId, Value)>,
    pub output: Option<Value>,
}
