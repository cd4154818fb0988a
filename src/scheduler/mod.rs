// src/scheduler/mod.rs

//! Run scheduling.
//!
//! - [`eligibility`] holds the pure decisions: which steps may start, and
//!   whether a run has failed or finished, given what was observed.
//! - [`descriptor`] turns a step into the execution-unit descriptor handed
//!   to the cluster.
//! - [`evaluate`] performs one scheduling pass against a [`ClusterClient`].
//!
//! [`ClusterClient`]: crate::cluster::ClusterClient

use std::collections::BTreeMap;

pub mod descriptor;
pub mod eligibility;
pub mod evaluate;

pub use descriptor::build_descriptor;
pub use eligibility::{RunVerdict, StepObservation};
pub use evaluate::{Evaluation, evaluate_run};

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_FINALIZER: &str = "graph.rundag.dev/finalizer";
pub const DEFAULT_UNIT_PORT: u16 = 8000;
pub const DEFAULT_RUN_AS_USER: u32 = 1000;

/// Controller-wide settings the scheduler needs on every pass.
///
/// Built once at startup from configuration and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingContext {
    /// Namespace graphs are resolved in and units are created in.
    pub namespace: String,
    /// Finalizer token placed on every run before its first unit exists.
    pub finalizer: String,
    pub unit_port: u16,
    pub run_as_user: u32,
    /// Labels applied to every execution unit.
    pub labels: BTreeMap<String, String>,
}

impl Default for SchedulingContext {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            finalizer: DEFAULT_FINALIZER.to_string(),
            unit_port: DEFAULT_UNIT_PORT,
            run_as_user: DEFAULT_RUN_AS_USER,
            labels: BTreeMap::new(),
        }
    }
}
