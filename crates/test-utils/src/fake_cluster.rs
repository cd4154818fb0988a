#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rundag::cluster::ClusterClient;
use rundag::errors::{Result, RundagError};
use rundag::model::{
    DefinitionGraph, ExecutionUnit, ObjectKey, ObjectMeta, ObjectRef, OwnerReference,
    ResourceKind, RunInstance, UnitDescriptor, UnitStatus,
};

#[derive(Debug, Default)]
struct FakeState {
    graphs: BTreeMap<ObjectKey, DefinitionGraph>,
    runs: BTreeMap<ObjectKey, RunInstance>,
    units: BTreeMap<ObjectKey, ExecutionUnit>,
    version: u64,

    /// Names of units successfully created, in call order.
    created: Vec<String>,
    /// Names passed to `create_unit`, including rejected calls.
    create_attempts: Vec<String>,
    status_updates: usize,

    /// Unit names whose creation fails with a transient write error.
    failing_creates: HashSet<String>,
    /// Number of upcoming status writes to reject with `Conflict`.
    pending_conflicts: usize,
    /// Make every fetch fail with a transient error.
    fetch_outage: bool,
}

impl FakeState {
    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

/// In-memory `ClusterClient` for tests.
///
/// - records every `create_unit` call
/// - unit counters are scripted with [`FakeCluster::succeed_unit`],
///   [`FakeCluster::fail_unit`] and friends
/// - failures (conflicts, creation errors, fetch outages) can be injected
#[derive(Debug, Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn insert_graph(&self, mut graph: DefinitionGraph) {
        let mut state = self.lock();
        graph.metadata.resource_version = state.next_version();
        state.graphs.insert(graph.metadata.key(), graph);
    }

    pub fn insert_run(&self, mut run: RunInstance) -> ObjectKey {
        let mut state = self.lock();
        run.metadata.resource_version = state.next_version();
        let key = run.metadata.key();
        state.runs.insert(key.clone(), run);
        key
    }

    pub fn remove_graph(&self, key: &ObjectKey) {
        self.lock().graphs.remove(key);
    }

    pub fn remove_unit(&self, name: &str) {
        self.lock().units.retain(|key, _| key.name != name);
    }

    /// Current stored copy of a run.
    pub fn run(&self, key: &ObjectKey) -> Option<RunInstance> {
        self.lock().runs.get(key).cloned()
    }

    pub fn unit(&self, name: &str) -> Option<ExecutionUnit> {
        self.lock()
            .units
            .iter()
            .find(|(key, _)| key.name == name)
            .map(|(_, unit)| unit.clone())
    }

    /// Mark the run as deletion-requested, as the store would.
    pub fn request_deletion(&self, key: &ObjectKey) {
        let mut state = self.lock();
        let version = state.next_version();
        if let Some(run) = state.runs.get_mut(key) {
            run.metadata.deletion_requested = Some(chrono::Utc::now());
            run.metadata.resource_version = version;
        }
    }

    pub fn set_unit_status(&self, name: &str, status: UnitStatus) {
        let mut state = self.lock();
        let version = state.next_version();
        for (key, unit) in state.units.iter_mut() {
            if key.name == name {
                unit.status = status;
                unit.metadata.resource_version = version;
            }
        }
    }

    /// Report every replica of the unit as succeeded.
    pub fn succeed_unit(&self, name: &str) {
        let completions = self.unit(name).map(|u| u.spec.completions).unwrap_or(1);
        self.set_unit_status(
            name,
            UnitStatus {
                active: 0,
                succeeded: completions,
                failed: 0,
            },
        );
    }

    /// Report one failed replica, which exceeds the default backoff limit.
    pub fn fail_unit(&self, name: &str) {
        self.set_unit_status(
            name,
            UnitStatus {
                active: 0,
                succeeded: 0,
                failed: 1,
            },
        );
    }

    /// Report every replica of every existing unit as succeeded.
    pub fn succeed_all_units(&self) {
        let names: Vec<String> = self.lock().units.keys().map(|k| k.name.clone()).collect();
        for name in names {
            self.succeed_unit(&name);
        }
    }

    pub fn fail_creation_of(&self, unit_name: &str) {
        self.lock().failing_creates.insert(unit_name.to_string());
    }

    /// Reject the next `n` status writes with `Conflict`.
    pub fn inject_conflicts(&self, n: usize) {
        self.lock().pending_conflicts = n;
    }

    pub fn set_fetch_outage(&self, down: bool) {
        self.lock().fetch_outage = down;
    }

    /// Bump the stored run's version, as a concurrent writer would.
    pub fn touch_run(&self, key: &ObjectKey) {
        let mut state = self.lock();
        let version = state.next_version();
        if let Some(run) = state.runs.get_mut(key) {
            run.metadata.resource_version = version;
        }
    }

    /// Pre-create a unit without touching any run, as a lost pass would.
    pub fn preexisting_unit(&self, descriptor: UnitDescriptor) {
        let mut state = self.lock();
        let mut metadata = ObjectMeta::new(descriptor.namespace.clone(), descriptor.name.clone());
        metadata.labels = descriptor.labels.clone();
        metadata.resource_version = state.next_version();
        let key = metadata.key();
        state.units.insert(
            key,
            ExecutionUnit {
                metadata,
                spec: descriptor,
                status: UnitStatus::default(),
            },
        );
    }

    pub fn created_units(&self) -> Vec<String> {
        self.lock().created.clone()
    }

    pub fn create_attempts(&self) -> Vec<String> {
        self.lock().create_attempts.clone()
    }

    pub fn status_updates(&self) -> usize {
        self.lock().status_updates
    }

    fn check_fetch(&self) -> Result<()> {
        if self.lock().fetch_outage {
            return Err(RundagError::TransientFetch("store unavailable".to_string()));
        }
        Ok(())
    }
}

fn not_found(kind: ResourceKind, key: &ObjectKey) -> RundagError {
    RundagError::NotFound {
        kind,
        key: key.clone(),
    }
}

fn conflict(key: &ObjectKey, expected: u64, found: u64) -> RundagError {
    RundagError::Conflict {
        key: key.clone(),
        expected,
        found,
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn fetch_graph(&self, key: &ObjectKey) -> Result<Option<DefinitionGraph>> {
        self.check_fetch()?;
        Ok(self.lock().graphs.get(key).cloned())
    }

    async fn fetch_run(&self, key: &ObjectKey) -> Result<Option<RunInstance>> {
        self.check_fetch()?;
        Ok(self.lock().runs.get(key).cloned())
    }

    async fn fetch_unit(&self, key: &ObjectKey) -> Result<Option<ExecutionUnit>> {
        self.check_fetch()?;
        Ok(self.lock().units.get(key).cloned())
    }

    async fn create_unit(&self, descriptor: &UnitDescriptor) -> Result<ObjectMeta> {
        let mut state = self.lock();
        state.create_attempts.push(descriptor.name.clone());

        if state.failing_creates.contains(&descriptor.name) {
            return Err(RundagError::TransientWrite(format!(
                "injected failure creating {}",
                descriptor.name
            )));
        }

        let key = ObjectKey::new(descriptor.namespace.clone(), descriptor.name.clone());
        if state.units.contains_key(&key) {
            return Err(RundagError::AlreadyExists {
                kind: ResourceKind::ExecutionUnit,
                key,
            });
        }

        let mut metadata = ObjectMeta::new(key.namespace.clone(), key.name.clone());
        metadata.labels = descriptor.labels.clone();
        metadata.resource_version = state.next_version();
        state.units.insert(
            key,
            ExecutionUnit {
                metadata: metadata.clone(),
                spec: descriptor.clone(),
                status: UnitStatus {
                    active: descriptor.parallelism,
                    ..UnitStatus::default()
                },
            },
        );
        state.created.push(descriptor.name.clone());
        Ok(metadata)
    }

    async fn update_status(&self, run: &mut RunInstance) -> Result<()> {
        let key = run.metadata.key();
        let mut state = self.lock();

        let stored_version = state
            .runs
            .get(&key)
            .map(|r| r.metadata.resource_version)
            .ok_or_else(|| not_found(ResourceKind::RunInstance, &key))?;

        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            return Err(conflict(&key, run.metadata.resource_version, stored_version + 1));
        }
        if stored_version != run.metadata.resource_version {
            return Err(conflict(&key, run.metadata.resource_version, stored_version));
        }

        let version = state.next_version();
        state.status_updates += 1;
        if let Some(stored) = state.runs.get_mut(&key) {
            stored.status = run.status.clone();
            stored.metadata.resource_version = version;
        }
        run.metadata.resource_version = version;
        Ok(())
    }

    async fn set_owner_link(&self, owner: &ObjectRef, child: &ObjectRef) -> Result<ObjectMeta> {
        let mut state = self.lock();
        let version = state.next_version();
        let meta = match child.kind {
            ResourceKind::DefinitionGraph => {
                state.graphs.get_mut(&child.key).map(|g| &mut g.metadata)
            }
            ResourceKind::RunInstance => state.runs.get_mut(&child.key).map(|r| &mut r.metadata),
            ResourceKind::ExecutionUnit => state.units.get_mut(&child.key).map(|u| &mut u.metadata),
        }
        .ok_or_else(|| not_found(child.kind, &child.key))?;

        if !meta.is_owned_by(owner.kind, &owner.key.name) {
            meta.owner_references.push(OwnerReference {
                kind: owner.kind,
                name: owner.key.name.clone(),
            });
            meta.resource_version = version;
        }
        Ok(meta.clone())
    }

    async fn add_finalizer(&self, run: &mut RunInstance, token: &str) -> Result<bool> {
        let key = run.metadata.key();
        let mut state = self.lock();
        let version = state.next_version();
        let stored = state
            .runs
            .get_mut(&key)
            .ok_or_else(|| not_found(ResourceKind::RunInstance, &key))?;
        if stored.metadata.resource_version != run.metadata.resource_version {
            return Err(conflict(
                &key,
                run.metadata.resource_version,
                stored.metadata.resource_version,
            ));
        }
        if stored.metadata.has_finalizer(token) {
            run.metadata = stored.metadata.clone();
            return Ok(false);
        }
        stored.metadata.finalizers.push(token.to_string());
        stored.metadata.resource_version = version;
        run.metadata = stored.metadata.clone();
        Ok(true)
    }

    async fn remove_finalizer(&self, run: &mut RunInstance, token: &str) -> Result<bool> {
        let key = run.metadata.key();
        let mut state = self.lock();
        let version = state.next_version();
        let stored = state
            .runs
            .get_mut(&key)
            .ok_or_else(|| not_found(ResourceKind::RunInstance, &key))?;
        if stored.metadata.resource_version != run.metadata.resource_version {
            return Err(conflict(
                &key,
                run.metadata.resource_version,
                stored.metadata.resource_version,
            ));
        }
        if !stored.metadata.has_finalizer(token) {
            run.metadata = stored.metadata.clone();
            return Ok(false);
        }
        stored.metadata.finalizers.retain(|f| f != token);
        stored.metadata.resource_version = version;
        run.metadata = stored.metadata.clone();

        if run.metadata.is_being_deleted() && run.metadata.finalizers.is_empty() {
            state.runs.remove(&key);
        }
        Ok(true)
    }
}
