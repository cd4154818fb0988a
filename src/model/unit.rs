// src/model/unit.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ObjectMeta;

/// The platform's runnable representation of one step's work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionUnit {
    pub metadata: ObjectMeta,
    pub spec: UnitDescriptor,
    #[serde(default)]
    pub status: UnitStatus,
}

/// Everything needed to create an execution unit for one step.
///
/// Produced by [`crate::scheduler::descriptor::build_descriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDescriptor {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    /// Environment variables, sorted by name.
    pub envs: Vec<(String, String)>,
    /// Number of successful replicas required for the unit to succeed.
    pub completions: u32,
    /// Number of replicas allowed to run at the same time.
    pub parallelism: u32,
    pub completion_mode: CompletionMode,
    pub restart_policy: RestartPolicy,
    /// Failed replicas tolerated before the unit as a whole is failed.
    pub backoff_limit: u32,
    pub port: u16,
    pub security: SecurityContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionMode {
    /// Every replica receives a distinct completion index.
    Indexed,
    NonIndexed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    Never,
    OnFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    pub run_as_user: u32,
    pub run_as_non_root: bool,
    pub allow_privilege_escalation: bool,
    pub drop_capabilities: Vec<String>,
}

/// Replica counters reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub active: u32,
    pub succeeded: u32,
    pub failed: u32,
}

/// Terminal-state classification consumed by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// Not yet terminal: replicas pending or running.
    Active,
    Succeeded,
    Failed,
}

impl ExecutionUnit {
    /// Classify the unit from explicit success/failure counts.
    ///
    /// `active == 0` alone cannot tell "not started yet" from "finished", so
    /// the counts are compared against `completions` and `backoff_limit`
    /// instead. Failure wins over success.
    pub fn state(&self) -> UnitState {
        self.status
            .classify(self.spec.completions, self.spec.backoff_limit)
    }
}

impl UnitStatus {
    pub fn classify(&self, completions: u32, backoff_limit: u32) -> UnitState {
        if self.failed > backoff_limit {
            UnitState::Failed
        } else if self.succeeded >= completions.max(1) {
            UnitState::Succeeded
        } else {
            UnitState::Active
        }
    }
}
