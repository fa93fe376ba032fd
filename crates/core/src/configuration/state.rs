//! Configuration workflow state machine
//!
//! `Idle -> StepLoaded -> Editing -> Uploading -> (ResetPending) ->
//! Verifying -> StepLoaded`, ending in `Completed` after the last step.
//! A vehicle directory without steps goes from `Idle` straight to
//! `Completed`.

use core::fmt;

/// Workflow state of the configuration engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WorkflowState {
    /// No step loaded
    #[default]
    Idle,
    /// A step file is loaded and matches what is on disk
    StepLoaded,
    /// The operator changed something in the active step
    Editing,
    /// Parameters are being written to the flight controller
    Uploading,
    /// Waiting for a flight controller reset to finish
    ResetPending,
    /// Re-downloading and comparing uploaded values
    Verifying,
    /// The last step has been processed
    Completed,
}

impl WorkflowState {
    /// True if `self -> next` is a legal transition
    pub fn can_transition_to(self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (self, next),
            (Idle, StepLoaded)
                | (Idle, Completed)
                | (StepLoaded, StepLoaded)
                | (StepLoaded, Editing)
                | (StepLoaded, Uploading)
                | (StepLoaded, Completed)
                | (Editing, Editing)
                | (Editing, StepLoaded)
                | (Editing, Uploading)
                | (Uploading, ResetPending)
                | (Uploading, Verifying)
                | (ResetPending, Verifying)
                | (Verifying, StepLoaded)
                | (Verifying, Editing)
                | (Completed, StepLoaded)
        )
    }

    /// True while an upload cycle is running
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            WorkflowState::Uploading | WorkflowState::ResetPending | WorkflowState::Verifying
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Idle => "idle",
            WorkflowState::StepLoaded => "step loaded",
            WorkflowState::Editing => "editing",
            WorkflowState::Uploading => "uploading",
            WorkflowState::ResetPending => "reset pending",
            WorkflowState::Verifying => "verifying",
            WorkflowState::Completed => "completed",
        };
        write!(f, "{}", name)
    }
}
