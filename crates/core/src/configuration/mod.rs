//! Configuration step domain types
//!
//! Per-parameter state of the active step, structural change tracking,
//! the reset policy and the workflow state machine. The engine that
//! drives these against a flight controller lives in the host crate.

pub mod changes;
pub mod parameter;
pub mod reset;
pub mod state;

pub use changes::ChangeTracker;
pub use parameter::{
    ArduPilotParameter, OverrideKind, ParameterEditError, ParameterOverride, ValueWarning,
};
pub use reset::{reset_wait_seconds, ResetPolicy, ResetRequirement, DEFAULT_RESET_SUFFIXES};
pub use state::WorkflowState;
