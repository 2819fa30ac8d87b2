//! Carried control-flow signals.
//!
//! `break`, `continue` and `return` travel out of nested flow scopes as a
//! plain [`JumpSignal`] value. Scope owners check for a pending signal after
//! a child scope finishes and either consume it or let it continue
//! outward: loops consume `Break` and `Continue`, a function call boundary
//! consumes `Return`.

use flowgraph_core::{ElementId, JumpKind, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct JumpSignal {
    /// The node that raised the jump.
    pub origin: ElementId,
    pub kind: JumpKind,
    /// Return value, if any.
    pub payload: Option<Value>,
}

impl JumpSignal {
    pub fn new(origin: ElementId, kind: JumpKind) -> Self {
        JumpSignal {
            origin,
            kind,
            payload: None,
        }
    }

    pub fn returning(origin: ElementId, value: Option<Value>) -> Self {
        JumpSignal {
            origin,
            kind: JumpKind::Return,
            payload: value,
        }
    }

    /// Returns `true` if a loop scope consumes this signal.
    pub fn is_loop_control(&self) -> bool {
        matches!(self.kind, JumpKind::Break | JumpKind::Continue)
    }
}
