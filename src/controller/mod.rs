// src/controller/mod.rs

//! Controller for runs.
//!
//! - [`reconciler`] holds the per-run `reconcile` driver: fetch, finalize,
//!   initialize, link to its graph, then evaluate.
//! - [`queue`] is the de-duplicating work queue of run keys.
//! - [`runtime`] is the async event loop that feeds the queue from watch
//!   events, periodic resyncs and delayed requeues, and reconciles one key
//!   at a time.

use std::time::Duration;

use crate::model::ObjectKey;

pub mod queue;
pub mod reconciler;
pub mod runtime;

pub use queue::WorkQueue;
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use runtime::ControllerRuntime;

/// Events flowing into the controller runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// A run was created, marked for deletion, or must be looked at again.
    RunChanged(ObjectKey),
    /// The counters of a unit owned by `owner` changed.
    UnitChanged { owner: ObjectKey },
    /// Re-enqueue every tracked run.
    Resync,
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Runtime options for the controller loop.
#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    /// Exit once every tracked run is terminal or gone (used for `--once`).
    pub exit_when_done: bool,
    pub resync_interval: Duration,
    /// Fixed delay before a run whose reconcile failed is retried.
    pub requeue_delay: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            exit_when_done: false,
            resync_interval: Duration::from_secs(30),
            requeue_delay: Duration::from_secs(5),
        }
    }
}
