// src/model/mod.rs

//! Resource model shared by the validator, the scheduler and the cluster
//! adapters.
//!
//! - [`definition`] holds the immutable `DefinitionGraph` template.
//! - [`run`] holds the mutable `RunInstance` with its job registry and
//!   condition history.
//! - [`unit`] holds the `ExecutionUnit` created for each started step.
//!
//! All resources carry an [`ObjectMeta`] with the bookkeeping the store
//! needs: a resource version for optimistic concurrency, finalizers, owner
//! references and a deletion mark.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod definition;
pub mod run;
pub mod unit;

pub use definition::{DefinitionGraph, GraphSpec, StepSpec};
pub use run::{Condition, ConditionStatus, ConditionType, RunInstance, RunSpec, RunStatus};
pub use unit::{
    CompletionMode, ExecutionUnit, RestartPolicy, SecurityContext, UnitDescriptor, UnitState,
    UnitStatus,
};

/// Kinds of objects held by the cluster store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    DefinitionGraph,
    RunInstance,
    ExecutionUnit,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::DefinitionGraph => "DefinitionGraph",
            ResourceKind::RunInstance => "RunInstance",
            ResourceKind::ExecutionUnit => "ExecutionUnit",
        };
        f.write_str(s)
    }
}

/// Namespaced name identifying one object of a known kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Fully qualified reference: kind plus namespaced name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ResourceKind,
    pub key: ObjectKey,
}

impl ObjectRef {
    pub fn new(kind: ResourceKind, key: ObjectKey) -> Self {
        Self { kind, key }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

/// Back-reference from a child object to the object that owns it.
///
/// Owners always live in the same namespace as the child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: ResourceKind,
    pub name: String,
}

/// Store bookkeeping common to every resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,

    /// Bumped by the store on every successful write. Writes carrying a
    /// different version are rejected.
    #[serde(default)]
    pub resource_version: u64,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub finalizers: Vec<String>,

    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,

    /// Set when deletion was requested while finalizers were still present.
    #[serde(default)]
    pub deletion_requested: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn has_finalizer(&self, token: &str) -> bool {
        self.finalizers.iter().any(|f| f == token)
    }

    pub fn is_owned_by(&self, kind: ResourceKind, name: &str) -> bool {
        self.owner_references
            .iter()
            .any(|r| r.kind == kind && r.name == name)
    }

    pub fn is_being_deleted(&self) -> bool {
        self.deletion_requested.is_some()
    }
}
