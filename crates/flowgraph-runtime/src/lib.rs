//! Execution runtime for flow graphs.
//!
//! A [`GraphInstance`] runs one host target against a [`GraphHandle`]: it
//! initializes instance storage, dispatches host events to entry nodes,
//! executes flow chains on an explicit frame stack, evaluates value ports on
//! demand, and rebinds to newly published snapshots while it runs.
//!
//! # Modules
//!
//! - [`config`] -- Instance configuration and resolution policy
//! - [`error`] -- Runtime error types carrying the failing node
//! - [`handle`] -- Graph handles: snapshot publication and base chains
//! - [`instance`] -- The per-target execution context
//! - [`jump`] -- Carried break/continue/return signals
//! - [`ops`] -- Operator evaluation
//! - [`rebind`] -- Element and port references across snapshot swaps
//! - [`scheduler`] -- Coroutine scheduling seam and a frame/time queue
//! - [`state`] -- Tri-state records for state-driven flow inputs
//! - [`trace`] -- Execution trace entries

pub mod config;
pub mod error;
pub mod handle;
pub mod instance;
pub mod jump;
pub mod ops;
pub mod rebind;
pub mod scheduler;
pub mod state;
pub mod trace;

// Re-export commonly used types
pub use config::{InstanceConfig, ResolutionPolicy};
pub use error::RuntimeError;
pub use handle::GraphHandle;
pub use instance::GraphInstance;
pub use jump::JumpSignal;
pub use rebind::{ElementRef, PortHandle, RebindMap};
pub use scheduler::{CoroutineScheduler, QueueScheduler, RoutineId};
pub use state::{FlowState, StateGraphRunner, StateKey, StateRecord};
pub use trace::TraceEntry;
