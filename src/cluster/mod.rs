// src/cluster/mod.rs

//! Cluster capability interface.
//!
//! The scheduler and reconciler only talk to the object store through
//! [`ClusterClient`]. This keeps the core free of any particular platform:
//!
//! - [`LocalCluster`] is the production adapter used by the `rundag`
//!   binary. It keeps objects in memory and runs execution units as local
//!   processes.
//! - Tests provide their own implementation that scripts unit states and
//!   records calls.

use async_trait::async_trait;

use crate::errors::Result;
use crate::model::{
    DefinitionGraph, ExecutionUnit, ObjectKey, ObjectMeta, ObjectRef, RunInstance,
    UnitDescriptor,
};

pub mod launcher;
pub mod local;

pub use local::LocalCluster;

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Read one graph. `Ok(None)` means it legitimately does not exist.
    async fn fetch_graph(&self, key: &ObjectKey) -> Result<Option<DefinitionGraph>>;

    /// Read one run. `Ok(None)` means it legitimately does not exist.
    async fn fetch_run(&self, key: &ObjectKey) -> Result<Option<RunInstance>>;

    /// Read one execution unit. `Ok(None)` means it legitimately does not exist.
    async fn fetch_unit(&self, key: &ObjectKey) -> Result<Option<ExecutionUnit>>;

    /// Create one execution unit and return the stored metadata.
    ///
    /// Fails with `AlreadyExists` if a unit with the descriptor's name exists.
    async fn create_unit(&self, descriptor: &UnitDescriptor) -> Result<ObjectMeta>;

    /// Persist the run's job registry and condition history in one write.
    ///
    /// Rejected with `Conflict` if `run.metadata.resource_version` is stale.
    /// On success the run's resource version is updated in place.
    async fn update_status(&self, run: &mut RunInstance) -> Result<()>;

    /// Record `owner` as the owner of `child` for cascading deletion.
    ///
    /// Idempotent. Returns the child's metadata after the write.
    async fn set_owner_link(&self, owner: &ObjectRef, child: &ObjectRef) -> Result<ObjectMeta>;

    /// Add the finalizer token to the run. Returns `true` if it was added.
    async fn add_finalizer(&self, run: &mut RunInstance, token: &str) -> Result<bool>;

    /// Remove the finalizer token from the run. Returns `true` if it was removed.
    async fn remove_finalizer(&self, run: &mut RunInstance, token: &str) -> Result<bool>;
}
