// src/state.rs

//! Run status state machine.
//!
//! A run's aggregate state is never stored separately: it is the type of the
//! last entry in its append-only condition history.
//!
//! ```text
//! Unseen -> Initializing -> InProgress -> { Succeeded | Failed }
//! ```
//!
//! Finalizing (deletion handling) is orthogonal and keyed off the object's
//! deletion mark, not off the phase.

use std::fmt;

use tracing::warn;

use crate::model::{Condition, ConditionStatus, ConditionType, RunStatus};

pub const REASON_INITIALIZING: &str = "Initializing";
pub const REASON_JOB_START: &str = "JobStart";
pub const REASON_JOB_FAILED: &str = "JobFailed";
pub const REASON_ALL_SUCCEEDED: &str = "AllJobsSucceeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    /// Empty condition history: never reconciled.
    Unseen,
    Initializing,
    InProgress,
    Succeeded,
    Failed,
}

impl RunPhase {
    /// Derive the phase from the last condition ("last element wins").
    pub fn of(status: &RunStatus) -> Self {
        match status.last_condition().map(|c| c.type_) {
            None => RunPhase::Unseen,
            Some(ConditionType::Initializing) => RunPhase::Initializing,
            Some(ConditionType::InProgress) => RunPhase::InProgress,
            Some(ConditionType::Succeeded) => RunPhase::Succeeded,
            Some(ConditionType::Failed) => RunPhase::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Succeeded | RunPhase::Failed)
    }

    /// Whether appending a condition that moves the run into `next` is legal.
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        match (self, next) {
            (Unseen, Initializing) => true,
            (Initializing | InProgress, InProgress) => true,
            (Initializing | InProgress, Succeeded | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Unseen => "Unseen",
            RunPhase::Initializing => "Initializing",
            RunPhase::InProgress => "InProgress",
            RunPhase::Succeeded => "Succeeded",
            RunPhase::Failed => "Failed",
        };
        f.write_str(s)
    }
}

impl From<ConditionType> for RunPhase {
    fn from(t: ConditionType) -> Self {
        match t {
            ConditionType::Initializing => RunPhase::Initializing,
            ConditionType::InProgress => RunPhase::InProgress,
            ConditionType::Succeeded => RunPhase::Succeeded,
            ConditionType::Failed => RunPhase::Failed,
        }
    }
}

impl Condition {
    pub fn initializing() -> Self {
        Condition::new(
            ConditionType::Initializing,
            ConditionStatus::Unknown,
            REASON_INITIALIZING,
            "Run accepted; waiting for first scheduling pass",
        )
    }

    pub fn job_started(unit: &str) -> Self {
        Condition::new(
            ConditionType::InProgress,
            ConditionStatus::True,
            REASON_JOB_START,
            format!("Created {unit}"),
        )
    }

    pub fn failed(step: &str, unit: &str, detail: &str) -> Self {
        Condition::new(
            ConditionType::Failed,
            ConditionStatus::True,
            REASON_JOB_FAILED,
            format!("Step {step} ({unit}) {detail}"),
        )
    }

    pub fn succeeded(steps: usize) -> Self {
        Condition::new(
            ConditionType::Succeeded,
            ConditionStatus::True,
            REASON_ALL_SUCCEEDED,
            format!("All {steps} steps succeeded"),
        )
    }
}

impl RunStatus {
    pub fn phase(&self) -> RunPhase {
        RunPhase::of(self)
    }

    /// Append a condition to the history.
    ///
    /// The history is append-only; an out-of-order transition is still
    /// recorded (the store is the source of truth) but logged loudly.
    pub fn push_condition(&mut self, condition: Condition) {
        let from = self.phase();
        let to = RunPhase::from(condition.type_);
        if !from.can_transition_to(to) {
            warn!(%from, %to, reason = %condition.reason, "unexpected run phase transition");
        }
        self.conditions.push(condition);
    }
}
