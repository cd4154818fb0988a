// src/scheduler/descriptor.rs

use crate::model::{
    CompletionMode, DefinitionGraph, RestartPolicy, RunInstance, SecurityContext, StepSpec,
    UnitDescriptor,
};
use crate::scheduler::SchedulingContext;

pub const LABEL_APP: &str = "app";
pub const LABEL_GRAPH: &str = "graph";
pub const LABEL_RUN: &str = "run";
pub const LABEL_STEP: &str = "step";
pub const APP_NAME: &str = "rundag";

/// Name of the execution unit started for `step` within `run`.
///
/// Deterministic, so a unit created by a pass whose status write was lost
/// is found again under the same name.
pub fn unit_name(run: &str, step: &str) -> String {
    format!("{run}-{step}")
}

/// Build the descriptor for one step of a run.
///
/// Every replica must complete exactly once; a single failed replica fails
/// the unit. Units run unprivileged as `ctx.run_as_user`.
pub fn build_descriptor(
    ctx: &SchedulingContext,
    graph: &DefinitionGraph,
    run: &RunInstance,
    step: &StepSpec,
) -> UnitDescriptor {
    let mut labels = ctx.labels.clone();
    labels.insert(LABEL_APP.to_string(), APP_NAME.to_string());
    labels.insert(LABEL_GRAPH.to_string(), graph.name().to_string());
    labels.insert(LABEL_RUN.to_string(), run.name().to_string());
    labels.insert(LABEL_STEP.to_string(), step.name.clone());

    let replicas = step.replicas.max(1);

    UnitDescriptor {
        name: unit_name(run.name(), &step.name),
        namespace: ctx.namespace.clone(),
        labels,
        image: step.image.clone(),
        command: step.command.clone(),
        args: step.args.clone(),
        envs: step
            .envs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        completions: replicas,
        parallelism: replicas,
        completion_mode: CompletionMode::Indexed,
        restart_policy: RestartPolicy::Never,
        backoff_limit: 0,
        port: ctx.unit_port,
        security: SecurityContext {
            run_as_user: ctx.run_as_user,
            run_as_non_root: true,
            allow_privilege_escalation: false,
            drop_capabilities: vec!["ALL".to_string()],
        },
    }
}
