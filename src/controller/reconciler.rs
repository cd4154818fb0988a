// src/controller/reconciler.rs

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cluster::ClusterClient;
use crate::errors::Result;
use crate::model::{Condition, ObjectKey, ObjectRef, ResourceKind};
use crate::scheduler::{SchedulingContext, evaluate_run};
use crate::state::RunPhase;

/// What the caller should do after one reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Reconcile again right away instead of waiting for the next event.
    pub requeue: bool,
    /// Phase of the run afterwards. `None` when the run is gone, is being
    /// deleted, or cannot make progress because its graph is missing.
    pub phase: Option<RunPhase>,
}

impl ReconcileOutcome {
    fn done(phase: Option<RunPhase>) -> Self {
        Self {
            requeue: false,
            phase,
        }
    }
}

/// Drives one run from whatever state it is in towards a terminal phase.
///
/// Each call fetches fresh state; nothing is cached between calls. `Err`
/// means "retry later" when [`RundagError::is_retryable`] says so.
///
/// [`RundagError::is_retryable`]: crate::errors::RundagError::is_retryable
#[derive(Debug)]
pub struct Reconciler<C> {
    client: Arc<C>,
    ctx: SchedulingContext,
}

impl<C> Reconciler<C>
where
    C: ClusterClient,
{
    pub fn new(client: Arc<C>, ctx: SchedulingContext) -> Self {
        Self { client, ctx }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn context(&self) -> &SchedulingContext {
        &self.ctx
    }

    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        debug!(run = %key, "reconciling run");

        let Some(mut run) = self.client.fetch_run(key).await? else {
            info!(run = %key, "aborting reconcile, assuming run has been deleted");
            return Ok(ReconcileOutcome::done(None));
        };

        if run.metadata.is_being_deleted() {
            if self
                .client
                .remove_finalizer(&mut run, &self.ctx.finalizer)
                .await?
            {
                info!(run = %key, "run finalized");
            }
            return Ok(ReconcileOutcome::done(None));
        }

        let phase = run.status.phase();
        if phase.is_terminal() {
            debug!(run = %key, %phase, "run is terminal; nothing to do");
            return Ok(ReconcileOutcome::done(Some(phase)));
        }

        let graph_key = ObjectKey::new(self.ctx.namespace.clone(), run.spec.graph_name.clone());
        let Some(graph) = self.client.fetch_graph(&graph_key).await? else {
            warn!(run = %key, graph = %graph_key, "graph for run cannot be retrieved");
            return Ok(ReconcileOutcome::done(None));
        };

        if !run
            .metadata
            .is_owned_by(ResourceKind::DefinitionGraph, graph.name())
        {
            let owner = ObjectRef::new(ResourceKind::DefinitionGraph, graph_key.clone());
            let child = ObjectRef::new(ResourceKind::RunInstance, key.clone());
            run.metadata = self.client.set_owner_link(&owner, &child).await?;
            debug!(run = %key, graph = %graph_key, "linked run to its graph");
        }

        if phase == RunPhase::Unseen {
            self.client
                .add_finalizer(&mut run, &self.ctx.finalizer)
                .await?;
            run.status.jobs.clear();
            run.status.push_condition(Condition::initializing());
            self.client.update_status(&mut run).await?;
            info!(run = %key, graph = %graph_key, "run initialized");
            return Ok(ReconcileOutcome {
                requeue: true,
                phase: Some(RunPhase::Initializing),
            });
        }

        let evaluation = evaluate_run(self.client.as_ref(), &self.ctx, &graph, &mut run).await?;
        if !evaluation.created.is_empty() {
            debug!(run = %key, created = ?evaluation.created, "pass started steps");
        }

        Ok(ReconcileOutcome {
            requeue: evaluation.requeue,
            phase: Some(evaluation.phase),
        })
    }
}
