//! Coroutine scheduling seam.
//!
//! A routine that reaches a `Wait` node is parked inside its
//! [`GraphInstance`](crate::GraphInstance) and handed to a
//! [`CoroutineScheduler`] together with its wait condition. The scheduler
//! decides when the wait is over; the host then resumes the routine through
//! [`GraphInstance::tick`](crate::GraphInstance::tick) or
//! [`GraphInstance::resume_routine`](crate::GraphInstance::resume_routine).
//! Nothing in the runtime blocks a thread while a routine is parked.

use std::fmt;

use serde::{Deserialize, Serialize};

use flowgraph_core::WaitSpec;

/// Identity of a parked or running routine within one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoutineId(pub u64);

impl fmt::Display for RoutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "routine#{}", self.0)
    }
}

/// Host-side scheduler that decides when parked routines may resume.
pub trait CoroutineScheduler {
    /// Parks `routine` until `wait` has elapsed.
    fn schedule(&mut self, routine: RoutineId, wait: WaitSpec);

    /// Forgets `routine`; it will not be reported as due.
    fn cancel(&mut self, routine: RoutineId);

    /// Advances one frame of `delta` seconds and returns the routines that
    /// became due, in the order they were scheduled.
    fn advance(&mut self, delta: f64) -> Vec<RoutineId>;

    /// Number of routines still waiting.
    fn pending(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
enum Remaining {
    Frames(u32),
    Seconds(f64),
}

/// Frame- and time-based scheduler for hosts without their own.
#[derive(Debug, Default)]
pub struct QueueScheduler {
    waiting: Vec<(RoutineId, Remaining)>,
}

impl QueueScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CoroutineScheduler for QueueScheduler {
    fn schedule(&mut self, routine: RoutineId, wait: WaitSpec) {
        let remaining = match wait {
            WaitSpec::Frames(n) => Remaining::Frames(n),
            WaitSpec::Seconds(s) => Remaining::Seconds(s),
        };
        self.waiting.retain(|(id, _)| *id != routine);
        self.waiting.push((routine, remaining));
    }

    fn cancel(&mut self, routine: RoutineId) {
        self.waiting.retain(|(id, _)| *id != routine);
    }

    fn advance(&mut self, delta: f64) -> Vec<RoutineId> {
        let mut due = Vec::new();
        self.waiting.retain_mut(|(id, remaining)| {
            let done = match remaining {
                Remaining::Frames(n) => {
                    *n = n.saturating_sub(1);
                    *n == 0
                }
                Remaining::Seconds(s) => {
                    *s -= delta;
                    *s <= 0.0
                }
            };
            if done {
                due.push(*id);
            }
            !done
        });
        due
    }

    fn pending(&self) -> usize {
        self.waiting.len()
    }
}
