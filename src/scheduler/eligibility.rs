// src/scheduler/eligibility.rs

//! Pure per-pass decisions over a snapshot of step states.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::model::{DefinitionGraph, StepSpec, UnitState};

/// What a pass observed for one step of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepObservation {
    /// No registry entry: the step has not been started.
    NotStarted,
    /// Registered and its unit was fetched.
    Unit { unit: String, state: UnitState },
    /// Registered but the unit no longer exists.
    Lost { unit: String },
}

impl StepObservation {
    /// Terminal classification; a lost unit counts as failed.
    pub fn unit_state(&self) -> Option<UnitState> {
        match self {
            StepObservation::NotStarted => None,
            StepObservation::Unit { state, .. } => Some(*state),
            StepObservation::Lost { .. } => Some(UnitState::Failed),
        }
    }

    pub fn unit(&self) -> Option<&str> {
        match self {
            StepObservation::NotStarted => None,
            StepObservation::Unit { unit, .. } | StepObservation::Lost { unit } => Some(unit),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.unit_state() == Some(UnitState::Succeeded)
    }
}

/// Snapshot of every step of a run, keyed by step name.
pub type Observations = BTreeMap<String, StepObservation>;

/// Aggregate outcome of a pass, before any new unit is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunVerdict {
    /// A registered unit failed (or went missing).
    Failed {
        step: String,
        unit: String,
        detail: String,
    },
    /// Every step is registered and every unit succeeded.
    Finished,
    /// Work remains.
    Pending,
}

/// Decide whether the run has failed or finished.
///
/// Failure is checked first and wins; the first failed step in name order
/// is reported.
pub fn classify_run(graph: &DefinitionGraph, observations: &Observations) -> RunVerdict {
    for (step, observation) in observations {
        match observation {
            StepObservation::Unit {
                unit,
                state: UnitState::Failed,
            } => {
                return RunVerdict::Failed {
                    step: step.clone(),
                    unit: unit.clone(),
                    detail: "failed".to_string(),
                };
            }
            StepObservation::Lost { unit } => {
                return RunVerdict::Failed {
                    step: step.clone(),
                    unit: unit.clone(),
                    detail: "is missing from the cluster".to_string(),
                };
            }
            _ => {}
        }
    }

    let finished = graph.step_names().all(|name| {
        observations
            .get(name)
            .is_some_and(StepObservation::is_succeeded)
    });

    if finished {
        RunVerdict::Finished
    } else {
        RunVerdict::Pending
    }
}

/// Whether every dependency of `step` has a succeeded unit.
pub fn deps_satisfied(step: &StepSpec, observations: &Observations) -> bool {
    step.dependencies.iter().all(|dep| match observations.get(dep) {
        Some(observation) => observation.is_succeeded(),
        None => {
            warn!(step = %step.name, dep = %dep, "dependency missing from observations");
            false
        }
    })
}

/// Steps that may be started in this pass, sorted by name.
///
/// A step is eligible iff it has not been started and it has no
/// dependencies or all of them succeeded.
pub fn eligible_steps<'g>(
    graph: &'g DefinitionGraph,
    observations: &Observations,
) -> Vec<&'g StepSpec> {
    let mut ready: Vec<&StepSpec> = graph
        .spec
        .steps
        .iter()
        .filter(|step| {
            matches!(
                observations.get(&step.name),
                None | Some(StepObservation::NotStarted)
            )
        })
        .filter(|step| deps_satisfied(step, observations))
        .collect();

    ready.sort_by(|a, b| a.name.cmp(&b.name));

    for step in &ready {
        debug!(step = %step.name, "dependencies satisfied; step eligible");
    }
    ready
}
