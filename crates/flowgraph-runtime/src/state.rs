//! State records for flow inputs driven as independent routines.
//!
//! Every flow input started through
//! [`GraphInstance::run_state`](crate::GraphInstance::run_state) gets a
//! [`StateRecord`] moving `Idle -> Running -> Finished`. Stopping is
//! advisory: [`StateGraphRunner::stop`] marks the record finished and the
//! executor notices at its next continuation point.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use flowgraph_core::{PortId, RuntimeId};

use crate::scheduler::RoutineId;

/// Lifecycle of one state-driven flow input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlowState {
    #[default]
    Idle,
    Running,
    Finished,
}

/// Address of a flow input within one instance: owning node plus port key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub node: RuntimeId,
    pub port: PortId,
}

impl StateKey {
    pub fn new(node: RuntimeId, port: impl Into<PortId>) -> Self {
        StateKey {
            node,
            port: port.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateRecord {
    pub state: FlowState,
    /// Routine currently driving this input, while running.
    pub routine: Option<RoutineId>,
    /// How many times the input has been started.
    pub runs: u32,
}

/// Map from flow inputs to their state records.
#[derive(Debug, Default)]
pub struct StateGraphRunner {
    records: HashMap<StateKey, StateRecord>,
}

impl StateGraphRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `key`; inputs never started are `Idle`.
    pub fn state_of(&self, key: &StateKey) -> FlowState {
        self.records.get(key).map_or(FlowState::Idle, |r| r.state)
    }

    pub fn record(&self, key: &StateKey) -> Option<&StateRecord> {
        self.records.get(key)
    }

    /// Returns `true` if a new run may start (the input is not running).
    pub fn can_start(&self, key: &StateKey) -> bool {
        self.state_of(key) != FlowState::Running
    }

    /// Marks `key` as running under `routine`.
    pub fn start(&mut self, key: StateKey, routine: RoutineId) {
        let record = self.records.entry(key).or_default();
        record.state = FlowState::Running;
        record.routine = Some(routine);
        record.runs += 1;
    }

    /// Marks the run of `routine` at `key` as finished. A stale routine (one
    /// that was stopped and replaced) does not touch the record.
    pub fn finish(&mut self, key: &StateKey, routine: RoutineId) {
        if let Some(record) = self.records.get_mut(key) {
            if record.routine == Some(routine) {
                record.state = FlowState::Finished;
                record.routine = None;
            }
        }
    }

    /// Forces `key` to `Finished` regardless of its state and returns the
    /// routine that was driving it.
    pub fn stop(&mut self, key: &StateKey) -> Option<RoutineId> {
        let record = self.records.entry(key.clone()).or_default();
        record.state = FlowState::Finished;
        record.routine.take()
    }

    /// Returns `true` while `routine` is the live driver of `key`.
    pub fn is_current(&self, key: &StateKey, routine: RoutineId) -> bool {
        self.records
            .get(key)
            .is_some_and(|r| r.state == FlowState::Running && r.routine == Some(routine))
    }

    /// Keys currently running.
    pub fn running(&self) -> impl Iterator<Item = &StateKey> {
        self.records
            .iter()
            .filter(|(_, r)| r.state == FlowState::Running)
            .map(|(k, _)| k)
    }
}
