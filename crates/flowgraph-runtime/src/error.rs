//! Runtime error types for graph execution.
//!
//! Every execution fault names the element that raised it and the graph it
//! belongs to, so a host can point at the offending node. Faults are never
//! swallowed inside the runtime; whether to log and continue or to abort is
//! up to the caller of the [`GraphInstance`](crate::GraphInstance).

use flowgraph_core::{CoreError, ElementId, MemberError, TypeName};
use flowgraph_storage::StorageError;

use crate::scheduler::RoutineId;

/// Errors produced while running a graph instance.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A member access failed while executing a node.
    #[error("graph '{graph}', node {node}: {source}")]
    Member {
        graph: String,
        node: ElementId,
        #[source]
        source: MemberError,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("graph '{graph}': no function named '{name}'")]
    FunctionNotFound { graph: String, name: String },

    #[error("graph '{graph}': no variable named '{name}'")]
    VariableNotFound { graph: String, name: String },

    /// Function element exists but its body has no entry node.
    #[error("graph '{graph}': function {function} has no entry node")]
    MissingEntry { graph: String, function: ElementId },

    #[error("graph '{graph}', node {node}: call depth limit ({limit}) exceeded")]
    RecursionLimitExceeded {
        graph: String,
        node: ElementId,
        limit: usize,
    },

    #[error("graph '{graph}', node {node}: loop iteration limit ({limit}) exceeded")]
    LoopLimitExceeded {
        graph: String,
        node: ElementId,
        limit: usize,
    },

    #[error("graph '{graph}', node {node}: expected {expected}, got {got}")]
    TypeMismatch {
        graph: String,
        node: ElementId,
        expected: TypeName,
        got: TypeName,
    },

    #[error("graph '{graph}', node {node}: divide by zero")]
    DivideByZero { graph: String, node: ElementId },

    #[error("graph '{graph}', node {node}: integer overflow")]
    IntegerOverflow { graph: String, node: ElementId },

    /// A `Wait` node was reached inside a synchronous function call.
    #[error("graph '{graph}', node {node}: cannot suspend inside a function call")]
    SuspendInCall { graph: String, node: ElementId },

    #[error("routine {routine} not found")]
    RoutineNotFound { routine: RoutineId },

    /// A snapshot was published out of order.
    #[error("graph '{graph}': published version {published}, expected {expected}")]
    VersionSkew {
        graph: String,
        expected: u64,
        published: u64,
    },

    /// The snapshot has a different container identity than the handle.
    #[error("graph '{graph}': snapshot belongs to a different container")]
    ForeignSnapshot { graph: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl RuntimeError {
    /// Wraps a member fault with the node and graph it occurred in.
    pub fn member(graph: &str, node: ElementId, source: MemberError) -> Self {
        RuntimeError::Member {
            graph: graph.to_string(),
            node,
            source,
        }
    }

    /// The element that raised this fault, if one is known.
    pub fn element(&self) -> Option<ElementId> {
        match self {
            RuntimeError::Member { node, .. }
            | RuntimeError::RecursionLimitExceeded { node, .. }
            | RuntimeError::LoopLimitExceeded { node, .. }
            | RuntimeError::TypeMismatch { node, .. }
            | RuntimeError::DivideByZero { node, .. }
            | RuntimeError::IntegerOverflow { node, .. }
            | RuntimeError::SuspendInCall { node, .. } => Some(*node),
            RuntimeError::MissingEntry { function, .. } => Some(*function),
            _ => None,
        }
    }
}

/// Carries a runtime fault through the [`MemberContext`](flowgraph_core::MemberContext)
/// boundary, which only speaks [`MemberError`]. The message keeps the inner
/// node and graph.
impl From<RuntimeError> for MemberError {
    fn from(err: RuntimeError) -> Self {
        MemberError::Context {
            message: err.to_string(),
        }
    }
}
