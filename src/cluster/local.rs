// src/cluster/local.rs

//! In-process object store with the semantics the reconciler relies on:
//!
//! - every write bumps a store-wide resource version; status and finalizer
//!   writes carrying a stale version are rejected with `Conflict`;
//! - owner-link writes carry no version: they merge into whatever is stored
//!   and are idempotent;
//! - removing an object cascades to the objects whose owner references name
//!   it (graph -> runs, run -> units);
//! - deletion of an object with finalizers is deferred: the object is only
//!   marked, and removed once the last finalizer is gone.
//!
//! Execution units are run as local processes by [`super::launcher`]; each
//! replica exit updates the unit's counters and notifies the controller.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::cluster::ClusterClient;
use crate::cluster::launcher;
use crate::controller::ControllerEvent;
use crate::errors::{Result, RundagError};
use crate::graph::validate_definition;
use crate::model::{
    DefinitionGraph, ExecutionUnit, ObjectKey, ObjectMeta, ObjectRef, OwnerReference,
    ResourceKind, RunInstance, UnitDescriptor, UnitStatus,
};

#[derive(Debug, Default)]
struct Store {
    graphs: BTreeMap<ObjectKey, DefinitionGraph>,
    runs: BTreeMap<ObjectKey, RunInstance>,
    units: BTreeMap<ObjectKey, ExecutionUnit>,
    /// Abort handles of the replica tasks backing each unit.
    replicas: HashMap<ObjectKey, Vec<AbortHandle>>,
    version: u64,
}

impl Store {
    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    fn meta_mut(&mut self, target: &ObjectRef) -> Option<&mut ObjectMeta> {
        match target.kind {
            ResourceKind::DefinitionGraph => {
                self.graphs.get_mut(&target.key).map(|g| &mut g.metadata)
            }
            ResourceKind::RunInstance => self.runs.get_mut(&target.key).map(|r| &mut r.metadata),
            ResourceKind::ExecutionUnit => self.units.get_mut(&target.key).map(|u| &mut u.metadata),
        }
    }

    fn contains(&self, target: &ObjectRef) -> bool {
        match target.kind {
            ResourceKind::DefinitionGraph => self.graphs.contains_key(&target.key),
            ResourceKind::RunInstance => self.runs.contains_key(&target.key),
            ResourceKind::ExecutionUnit => self.units.contains_key(&target.key),
        }
    }

    /// Remove a run and every unit it owns, killing their replicas.
    fn remove_run_cascade(&mut self, key: &ObjectKey) {
        if self.runs.remove(key).is_none() {
            return;
        }
        info!(run = %key, "run removed from store");

        let owned: Vec<ObjectKey> = self
            .units
            .iter()
            .filter(|(unit_key, unit)| {
                unit_key.namespace == key.namespace
                    && unit.metadata.is_owned_by(ResourceKind::RunInstance, &key.name)
            })
            .map(|(unit_key, _)| unit_key.clone())
            .collect();

        for unit_key in owned {
            self.units.remove(&unit_key);
            if let Some(handles) = self.replicas.remove(&unit_key) {
                for handle in handles {
                    handle.abort();
                }
            }
            debug!(unit = %unit_key, run = %key, "cascading delete of owned execution unit");
        }
    }

    /// Request deletion of a run: remove now, or mark if finalizers remain.
    ///
    /// Returns `true` if the run was only marked.
    fn request_run_deletion(&mut self, key: &ObjectKey) -> bool {
        let version = self.next_version();
        let Some(run) = self.runs.get_mut(key) else {
            return false;
        };
        if run.metadata.finalizers.is_empty() {
            self.remove_run_cascade(key);
            return false;
        }
        if run.metadata.deletion_requested.is_none() {
            run.metadata.deletion_requested = Some(Utc::now());
            run.metadata.resource_version = version;
        }
        true
    }
}

struct Inner {
    store: Mutex<Store>,
    events: mpsc::Sender<ControllerEvent>,
    launch_processes: bool,
}

/// Production [`ClusterClient`] adapter backed by an in-memory store.
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct LocalCluster {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LocalCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCluster")
            .field("launch_processes", &self.inner.launch_processes)
            .finish_non_exhaustive()
    }
}

impl LocalCluster {
    /// Store whose execution units run as local processes.
    pub fn new(events: mpsc::Sender<ControllerEvent>) -> Self {
        Self::build(events, true)
    }

    /// Store that records execution units without launching anything.
    ///
    /// Unit counters only change through [`LocalCluster::set_unit_status`].
    pub fn detached(events: mpsc::Sender<ControllerEvent>) -> Self {
        Self::build(events, false)
    }

    fn build(events: mpsc::Sender<ControllerEvent>, launch_processes: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(Store::default()),
                events,
                launch_processes,
            }),
        }
    }

    async fn notify(&self, event: ControllerEvent) {
        if let Err(e) = self.inner.events.send(event).await {
            debug!(error = %e, "controller event channel closed; dropping watch event");
        }
    }

    /// Admit a graph into the store, creating or replacing it.
    ///
    /// The graph is validated here and only here; malformed graphs are
    /// rejected as a whole.
    pub async fn apply_graph(&self, mut graph: DefinitionGraph) -> Result<ObjectMeta> {
        validate_definition(&graph)?;

        let key = graph.metadata.key();
        let mut store = self.inner.store.lock().await;
        let version = store.next_version();

        if let Some(existing) = store.graphs.get_mut(&key) {
            existing.spec = graph.spec;
            existing.metadata.labels = graph.metadata.labels;
            existing.metadata.resource_version = version;
            info!(graph = %key, "graph updated");
            return Ok(existing.metadata.clone());
        }

        graph.metadata.resource_version = version;
        graph.metadata.deletion_requested = None;
        let meta = graph.metadata.clone();
        store.graphs.insert(key.clone(), graph);
        info!(graph = %key, "graph admitted");
        Ok(meta)
    }

    /// Create a new run and notify the controller.
    pub async fn create_run(&self, mut run: RunInstance) -> Result<ObjectMeta> {
        let key = run.metadata.key();
        let meta = {
            let mut store = self.inner.store.lock().await;
            if store.runs.contains_key(&key) {
                return Err(RundagError::AlreadyExists {
                    kind: ResourceKind::RunInstance,
                    key,
                });
            }
            run.metadata.resource_version = store.next_version();
            run.metadata.deletion_requested = None;
            let meta = run.metadata.clone();
            store.runs.insert(key.clone(), run);
            meta
        };

        info!(run = %key, "run created");
        self.notify(ControllerEvent::RunChanged(key)).await;
        Ok(meta)
    }

    /// Request deletion of a run.
    ///
    /// Without finalizers the run (and its units) is removed immediately;
    /// otherwise it is marked and the controller is notified so it can run
    /// its cleanup and drop the finalizer.
    pub async fn request_run_deletion(&self, key: &ObjectKey) -> Result<()> {
        let marked = {
            let mut store = self.inner.store.lock().await;
            if !store.runs.contains_key(key) {
                return Err(RundagError::NotFound {
                    kind: ResourceKind::RunInstance,
                    key: key.clone(),
                });
            }
            store.request_run_deletion(key)
        };

        if marked {
            info!(run = %key, "run marked for deletion; waiting for finalizer");
            self.notify(ControllerEvent::RunChanged(key.clone())).await;
        }
        Ok(())
    }

    /// Delete a graph and request deletion of every run it owns.
    pub async fn delete_graph(&self, key: &ObjectKey) -> Result<()> {
        let marked: Vec<ObjectKey> = {
            let mut store = self.inner.store.lock().await;
            if store.graphs.remove(key).is_none() {
                return Err(RundagError::NotFound {
                    kind: ResourceKind::DefinitionGraph,
                    key: key.clone(),
                });
            }
            info!(graph = %key, "graph deleted");

            let owned: Vec<ObjectKey> = store
                .runs
                .iter()
                .filter(|(run_key, run)| {
                    run_key.namespace == key.namespace
                        && run
                            .metadata
                            .is_owned_by(ResourceKind::DefinitionGraph, &key.name)
                })
                .map(|(run_key, _)| run_key.clone())
                .collect();

            owned
                .into_iter()
                .filter(|run_key| store.request_run_deletion(run_key))
                .collect()
        };

        for run_key in marked {
            self.notify(ControllerEvent::RunChanged(run_key)).await;
        }
        Ok(())
    }

    /// Keys of every run currently in the store.
    pub async fn run_keys(&self) -> Vec<ObjectKey> {
        self.inner.store.lock().await.runs.keys().cloned().collect()
    }

    pub async fn unit_status(&self, key: &ObjectKey) -> Option<UnitStatus> {
        self.inner
            .store
            .lock()
            .await
            .units
            .get(key)
            .map(|u| u.status)
    }

    /// Overwrite a unit's counters and notify the owning run.
    pub async fn set_unit_status(&self, key: &ObjectKey, status: UnitStatus) -> Result<()> {
        let owner = {
            let mut store = self.inner.store.lock().await;
            let version = store.next_version();
            let unit = store.units.get_mut(key).ok_or_else(|| RundagError::NotFound {
                kind: ResourceKind::ExecutionUnit,
                key: key.clone(),
            })?;
            unit.status = status;
            unit.metadata.resource_version = version;
            owning_run(unit)
        };

        if let Some(owner) = owner {
            self.notify(ControllerEvent::UnitChanged { owner }).await;
        }
        Ok(())
    }

    /// Record that one replica of a unit exited.
    pub(crate) async fn record_replica_exit(&self, key: &ObjectKey, success: bool) {
        let owner = {
            let mut store = self.inner.store.lock().await;
            let version = store.next_version();
            let Some(unit) = store.units.get_mut(key) else {
                debug!(unit = %key, "replica exited for a unit no longer in the store");
                return;
            };
            unit.status.active = unit.status.active.saturating_sub(1);
            if success {
                unit.status.succeeded += 1;
            } else {
                unit.status.failed += 1;
            }
            unit.metadata.resource_version = version;
            debug!(
                unit = %key,
                active = unit.status.active,
                succeeded = unit.status.succeeded,
                failed = unit.status.failed,
                "unit counters updated"
            );
            owning_run(unit)
        };

        if let Some(owner) = owner {
            self.notify(ControllerEvent::UnitChanged { owner }).await;
        }
    }
}

fn owning_run(unit: &ExecutionUnit) -> Option<ObjectKey> {
    unit.metadata
        .owner_references
        .iter()
        .find(|r| r.kind == ResourceKind::RunInstance)
        .map(|r| ObjectKey::new(unit.metadata.namespace.clone(), r.name.clone()))
}

fn check_version(key: &ObjectKey, held: u64, stored: u64) -> Result<()> {
    if held != stored {
        return Err(RundagError::Conflict {
            key: key.clone(),
            expected: held,
            found: stored,
        });
    }
    Ok(())
}

#[async_trait]
impl ClusterClient for LocalCluster {
    async fn fetch_graph(&self, key: &ObjectKey) -> Result<Option<DefinitionGraph>> {
        Ok(self.inner.store.lock().await.graphs.get(key).cloned())
    }

    async fn fetch_run(&self, key: &ObjectKey) -> Result<Option<RunInstance>> {
        Ok(self.inner.store.lock().await.runs.get(key).cloned())
    }

    async fn fetch_unit(&self, key: &ObjectKey) -> Result<Option<ExecutionUnit>> {
        Ok(self.inner.store.lock().await.units.get(key).cloned())
    }

    async fn create_unit(&self, descriptor: &UnitDescriptor) -> Result<ObjectMeta> {
        let key = ObjectKey::new(descriptor.namespace.clone(), descriptor.name.clone());
        let mut store = self.inner.store.lock().await;

        if store.units.contains_key(&key) {
            return Err(RundagError::AlreadyExists {
                kind: ResourceKind::ExecutionUnit,
                key,
            });
        }

        let mut metadata = ObjectMeta::new(key.namespace.clone(), key.name.clone());
        metadata.labels = descriptor.labels.clone();
        metadata.resource_version = store.next_version();

        let active = if self.inner.launch_processes {
            descriptor.parallelism
        } else {
            0
        };
        let unit = ExecutionUnit {
            metadata: metadata.clone(),
            spec: descriptor.clone(),
            status: UnitStatus {
                active,
                ..UnitStatus::default()
            },
        };
        store.units.insert(key.clone(), unit);

        if self.inner.launch_processes {
            let handles = launcher::spawn_unit(self.clone(), key.clone(), descriptor.clone());
            store.replicas.insert(key.clone(), handles);
        }

        info!(unit = %key, replicas = descriptor.parallelism, "execution unit created");
        Ok(metadata)
    }

    async fn update_status(&self, run: &mut RunInstance) -> Result<()> {
        let key = run.metadata.key();
        let mut store = self.inner.store.lock().await;
        let version = store.next_version();

        let stored = store.runs.get_mut(&key).ok_or_else(|| RundagError::NotFound {
            kind: ResourceKind::RunInstance,
            key: key.clone(),
        })?;
        check_version(&key, run.metadata.resource_version, stored.metadata.resource_version)?;

        stored.status = run.status.clone();
        stored.metadata.resource_version = version;
        run.metadata.resource_version = version;
        debug!(
            run = %key,
            version,
            jobs = run.status.jobs.len(),
            conditions = run.status.conditions.len(),
            "run status persisted"
        );
        Ok(())
    }

    async fn set_owner_link(&self, owner: &ObjectRef, child: &ObjectRef) -> Result<ObjectMeta> {
        if owner == child {
            return Err(RundagError::InvalidDefinition(format!(
                "{owner} cannot own itself"
            )));
        }
        if owner.key.namespace != child.key.namespace {
            return Err(RundagError::InvalidDefinition(format!(
                "{owner} and {child} live in different namespaces"
            )));
        }

        let mut store = self.inner.store.lock().await;
        if !store.contains(owner) {
            return Err(RundagError::NotFound {
                kind: owner.kind,
                key: owner.key.clone(),
            });
        }

        let version = store.next_version();
        let meta = store.meta_mut(child).ok_or_else(|| RundagError::NotFound {
            kind: child.kind,
            key: child.key.clone(),
        })?;

        if !meta.is_owned_by(owner.kind, &owner.key.name) {
            meta.owner_references.push(OwnerReference {
                kind: owner.kind,
                name: owner.key.name.clone(),
            });
            meta.resource_version = version;
            debug!(%owner, %child, "owner link recorded");
        }
        Ok(meta.clone())
    }

    async fn add_finalizer(&self, run: &mut RunInstance, token: &str) -> Result<bool> {
        let key = run.metadata.key();
        let mut store = self.inner.store.lock().await;
        let version = store.next_version();

        let stored = store.runs.get_mut(&key).ok_or_else(|| RundagError::NotFound {
            kind: ResourceKind::RunInstance,
            key: key.clone(),
        })?;
        check_version(&key, run.metadata.resource_version, stored.metadata.resource_version)?;

        if stored.metadata.has_finalizer(token) {
            run.metadata = stored.metadata.clone();
            return Ok(false);
        }

        stored.metadata.finalizers.push(token.to_string());
        stored.metadata.resource_version = version;
        run.metadata = stored.metadata.clone();
        debug!(run = %key, finalizer = token, "finalizer added");
        Ok(true)
    }

    async fn remove_finalizer(&self, run: &mut RunInstance, token: &str) -> Result<bool> {
        let key = run.metadata.key();
        let mut store = self.inner.store.lock().await;
        let version = store.next_version();

        let stored = store.runs.get_mut(&key).ok_or_else(|| RundagError::NotFound {
            kind: ResourceKind::RunInstance,
            key: key.clone(),
        })?;
        check_version(&key, run.metadata.resource_version, stored.metadata.resource_version)?;

        if !stored.metadata.has_finalizer(token) {
            run.metadata = stored.metadata.clone();
            return Ok(false);
        }

        stored.metadata.finalizers.retain(|f| f != token);
        stored.metadata.resource_version = version;
        run.metadata = stored.metadata.clone();
        debug!(run = %key, finalizer = token, "finalizer removed");

        if run.metadata.is_being_deleted() && run.metadata.finalizers.is_empty() {
            store.remove_run_cascade(&key);
        }
        Ok(true)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let store = self.store.get_mut();
        if !store.replicas.is_empty() {
            warn!(
                units = store.replicas.len(),
                "local cluster dropped; aborting remaining replicas"
            );
        }
        for (_, handles) in store.replicas.drain() {
            for handle in handles {
                handle.abort();
            }
        }
    }
}
