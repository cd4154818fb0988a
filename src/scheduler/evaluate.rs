// src/scheduler/evaluate.rs

//! One scheduling pass over a run.

use tracing::{debug, info, warn};

use crate::cluster::ClusterClient;
use crate::errors::{Result, RundagError};
use crate::model::{
    Condition, DefinitionGraph, ExecutionUnit, ObjectKey, ObjectRef, ResourceKind, RunInstance,
};
use crate::scheduler::SchedulingContext;
use crate::scheduler::descriptor::{LABEL_RUN, LABEL_STEP, build_descriptor};
use crate::scheduler::eligibility::{
    Observations, RunVerdict, StepObservation, classify_run, eligible_steps,
};
use crate::state::RunPhase;

/// Result of one pass of [`evaluate_run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Whether the pass should be repeated without waiting for a trigger.
    pub requeue: bool,
    /// Steps whose units were created (or adopted) in this pass.
    pub created: Vec<String>,
    /// Phase of the run after the pass.
    pub phase: RunPhase,
}

impl Evaluation {
    fn idle(phase: RunPhase) -> Self {
        Self {
            requeue: false,
            created: Vec::new(),
            phase,
        }
    }
}

/// Evaluate a run once: observe its units, record failure or completion,
/// otherwise start every newly eligible step.
///
/// `run` is updated in place with whatever this pass persisted. Status is
/// written at most once per pass. A registered step is never handed to
/// `create_unit` again.
pub async fn evaluate_run<C>(
    client: &C,
    ctx: &SchedulingContext,
    graph: &DefinitionGraph,
    run: &mut RunInstance,
) -> Result<Evaluation>
where
    C: ClusterClient + ?Sized,
{
    let phase = run.status.phase();
    if phase.is_terminal() {
        debug!(run = %run.name(), %phase, "run is terminal; nothing to do");
        return Ok(Evaluation::idle(phase));
    }

    let observations = observe(client, ctx, graph, run).await?;

    match classify_run(graph, &observations) {
        RunVerdict::Failed { step, unit, detail } => {
            warn!(run = %run.name(), step = %step, unit = %unit, "step failed; failing run");
            run.status.push_condition(Condition::failed(&step, &unit, &detail));
            client.update_status(run).await?;
            return Ok(Evaluation::idle(RunPhase::Failed));
        }
        RunVerdict::Finished => {
            info!(run = %run.name(), steps = graph.spec.steps.len(), "all steps succeeded");
            run.status.push_condition(Condition::succeeded(graph.spec.steps.len()));
            client.update_status(run).await?;
            return Ok(Evaluation::idle(RunPhase::Succeeded));
        }
        RunVerdict::Pending => {}
    }

    let run_ref = ObjectRef::new(ResourceKind::RunInstance, run.metadata.key());
    let mut created = Vec::new();
    let mut failure = None;

    for step in eligible_steps(graph, &observations) {
        let descriptor = build_descriptor(ctx, graph, run, step);
        let unit_key = ObjectKey::new(descriptor.namespace.clone(), descriptor.name.clone());

        match client.create_unit(&descriptor).await {
            Ok(_) => {
                info!(
                    run = %run.name(),
                    step = %step.name,
                    unit = %unit_key,
                    "created execution unit"
                );
            }
            Err(RundagError::AlreadyExists { kind, key }) => {
                match client.fetch_unit(&unit_key).await {
                    Ok(Some(existing)) if started_for(&existing, run.name(), &step.name) => {
                        info!(
                            run = %run.name(),
                            step = %step.name,
                            unit = %unit_key,
                            "execution unit already exists; adopting it"
                        );
                    }
                    Ok(Some(_)) => {
                        warn!(
                            run = %run.name(),
                            step = %step.name,
                            unit = %unit_key,
                            "execution unit name is held by another run"
                        );
                        let err = RundagError::AlreadyExists { kind, key };
                        failure = Some((step.name.clone(), err));
                        break;
                    }
                    Ok(None) => {
                        let err = RundagError::TransientWrite(format!(
                            "{unit_key} vanished before it could be adopted"
                        ));
                        failure = Some((step.name.clone(), err));
                        break;
                    }
                    Err(err) => {
                        failure = Some((step.name.clone(), err));
                        break;
                    }
                }
            }
            Err(err) => {
                failure = Some((step.name.clone(), err));
                break;
            }
        }

        run.status.jobs.insert(step.name.clone(), descriptor.name.clone());
        run.status.push_condition(Condition::job_started(&descriptor.name));
        created.push(step.name.clone());

        let unit_ref = ObjectRef::new(ResourceKind::ExecutionUnit, unit_key);
        if let Err(err) = client.set_owner_link(&run_ref, &unit_ref).await {
            failure = Some((step.name.clone(), err));
            break;
        }
    }

    if !created.is_empty() {
        client.update_status(run).await?;
    }

    if let Some((step, source)) = failure {
        warn!(
            run = %run.name(),
            step = %step,
            error = %source,
            persisted = created.len(),
            "execution unit creation failed; aborting pass"
        );
        return Err(RundagError::StepCreation {
            step,
            source: Box::new(source),
        });
    }

    Ok(Evaluation {
        requeue: !created.is_empty(),
        created,
        phase: run.status.phase(),
    })
}

/// Whether an existing unit was started for `step` of `run`.
///
/// Unit names are not unique across runs (`a` + `b-c` and `a-b` + `c` share
/// one), so a name clash alone never proves the unit is ours. Units without
/// labels are only claimed when this run is their sole owner.
fn started_for(unit: &ExecutionUnit, run: &str, step: &str) -> bool {
    let labels = &unit.metadata.labels;
    match (labels.get(LABEL_RUN), labels.get(LABEL_STEP)) {
        (Some(r), Some(s)) => r == run && s == step,
        _ => {
            let mut owners = unit
                .metadata
                .owner_references
                .iter()
                .filter(|o| o.kind == ResourceKind::RunInstance);
            matches!((owners.next(), owners.next()), (Some(o), None) if o.name == run)
        }
    }
}

/// Fetch the unit of every registered step. Unregistered steps are not
/// fetched.
async fn observe<C>(
    client: &C,
    ctx: &SchedulingContext,
    graph: &DefinitionGraph,
    run: &RunInstance,
) -> Result<Observations>
where
    C: ClusterClient + ?Sized,
{
    let mut observations = Observations::new();

    for step in &graph.spec.steps {
        let observation = match run.status.unit_for(&step.name) {
            None => StepObservation::NotStarted,
            Some(unit) => {
                let key = ObjectKey::new(ctx.namespace.clone(), unit);
                match client.fetch_unit(&key).await? {
                    Some(found) => StepObservation::Unit {
                        unit: unit.to_string(),
                        state: found.state(),
                    },
                    None => {
                        warn!(
                            run = %run.name(),
                            step = %step.name,
                            unit = %unit,
                            "registered execution unit not found"
                        );
                        StepObservation::Lost {
                            unit: unit.to_string(),
                        }
                    }
                }
            }
        };
        observations.insert(step.name.clone(), observation);
    }

    for step in run.status.jobs.keys() {
        if graph.step(step).is_none() {
            warn!(run = %run.name(), step = %step, "registry entry for a step not in the graph");
        }
    }

    Ok(observations)
}
