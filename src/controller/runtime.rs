// src/controller/runtime.rs

use std::collections::BTreeMap;
use std::fmt;

use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, warn};

use crate::cluster::ClusterClient;
use crate::errors::Result;
use crate::model::ObjectKey;
use crate::state::RunPhase;

use super::queue::WorkQueue;
use super::reconciler::Reconciler;
use super::{ControllerEvent, ControllerOptions};

/// Async shell around the [`Reconciler`].
///
/// Reads [`ControllerEvent`]s, keeps the work queue and the set of tracked
/// runs, and reconciles one key at a time. Failed reconciles are retried
/// after `requeue_delay` unless `RundagError::is_retryable` rules it out,
/// in which case the run is dropped.
pub struct ControllerRuntime<C> {
    reconciler: Reconciler<C>,
    queue: WorkQueue,
    /// Last known phase of every run the controller has seen.
    tracked: BTreeMap<ObjectKey, RunPhase>,
    event_tx: mpsc::Sender<ControllerEvent>,
    event_rx: mpsc::Receiver<ControllerEvent>,
    options: ControllerOptions,
}

impl<C> fmt::Debug for ControllerRuntime<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRuntime")
            .field("queue", &self.queue)
            .field("tracked", &self.tracked)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<C> ControllerRuntime<C>
where
    C: ClusterClient + 'static,
{
    /// `event_tx` must feed `event_rx`; it is used for delayed requeues.
    pub fn new(
        reconciler: Reconciler<C>,
        event_tx: mpsc::Sender<ControllerEvent>,
        event_rx: mpsc::Receiver<ControllerEvent>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            reconciler,
            queue: WorkQueue::new(),
            tracked: BTreeMap::new(),
            event_tx,
            event_rx,
            options,
        }
    }

    /// Start tracking a run and queue it for reconciliation.
    pub fn track(&mut self, key: ObjectKey) {
        self.tracked.entry(key.clone()).or_insert(RunPhase::Unseen);
        self.queue.push(key);
    }

    /// Last known phase of a tracked run.
    pub fn phase_of(&self, key: &ObjectKey) -> Option<RunPhase> {
        self.tracked.get(key).copied()
    }

    /// Whether every tracked run is terminal (runs that are gone are not
    /// tracked).
    pub fn all_done(&self) -> bool {
        self.queue.is_empty() && self.tracked.values().all(|phase| phase.is_terminal())
    }

    /// Main event loop.
    ///
    /// Returns the final phase of every run still tracked when it stops.
    pub async fn run(mut self) -> Result<BTreeMap<ObjectKey, RunPhase>> {
        info!(
            tracked = self.tracked.len(),
            exit_when_done = self.options.exit_when_done,
            "controller runtime started"
        );

        let period = self.options.resync_interval;
        let mut resync = interval_at(Instant::now() + period, period);

        loop {
            while let Some(key) = self.queue.pop() {
                self.process(key).await;
            }

            if self.options.exit_when_done && self.all_done() {
                info!("every tracked run is terminal or gone; stopping controller");
                break;
            }

            let event = tokio::select! {
                event = self.event_rx.recv() => event,
                _ = resync.tick() => Some(ControllerEvent::Resync),
            };

            let Some(event) = event else {
                info!("controller event channel closed; exiting");
                break;
            };

            debug!(?event, "controller received event");
            if !self.handle_event(event) {
                info!("shutdown requested; stopping controller");
                break;
            }
        }

        info!("controller runtime exiting");
        Ok(self.tracked)
    }

    /// Apply one event to the queue. Returns `false` to stop the loop.
    pub fn handle_event(&mut self, event: ControllerEvent) -> bool {
        match event {
            ControllerEvent::RunChanged(key) => self.track(key),
            ControllerEvent::UnitChanged { owner } => self.track(owner),
            ControllerEvent::Resync => {
                let keys: Vec<ObjectKey> = self.tracked.keys().cloned().collect();
                debug!(runs = keys.len(), "periodic resync");
                for key in keys {
                    self.queue.push(key);
                }
                debug!(queued = self.queue.len(), "resync queued runs");
            }
            ControllerEvent::ShutdownRequested => return false,
        }
        true
    }

    async fn process(&mut self, key: ObjectKey) {
        match self.reconciler.reconcile(&key).await {
            Ok(outcome) => {
                match outcome.phase {
                    Some(phase) => {
                        self.tracked.insert(key.clone(), phase);
                    }
                    None => {
                        self.tracked.remove(&key);
                    }
                }
                if outcome.requeue {
                    self.queue.push(key);
                }
            }
            Err(err) if err.is_retryable() => {
                warn!(
                    run = %key,
                    error = %err,
                    delay_ms = self.options.requeue_delay.as_millis() as u64,
                    "reconcile failed; will retry"
                );
                self.schedule_requeue(key);
            }
            Err(err) => {
                error!(
                    run = %key,
                    error = %err,
                    "reconcile cannot succeed by retrying; dropping run"
                );
                self.tracked.remove(&key);
            }
        }
    }

    fn schedule_requeue(&self, key: ObjectKey) {
        let tx = self.event_tx.clone();
        let delay = self.options.requeue_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(ControllerEvent::RunChanged(key)).await.is_err() {
                debug!("controller gone before delayed requeue fired");
            }
        });
    }
}
