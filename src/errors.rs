// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::model::{ObjectKey, ResourceKind};

#[derive(Error, Debug)]
pub enum RundagError {
    /// A step lists a dependency that is not defined in the same graph.
    #[error("unknown reference: step '{from}' depends on undefined step '{to}'")]
    UnknownReference { from: String, to: String },

    /// The dependency relation contains a directed cycle.
    #[error("cycle detected in dependency graph: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    /// Schema-level problem with a graph definition (bounds, duplicates, ...).
    #[error("invalid graph definition: {0}")]
    InvalidDefinition(String),

    #[error("{kind} {key} not found")]
    NotFound { kind: ResourceKind, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: ResourceKind, key: ObjectKey },

    /// Communication failure while reading from the cluster store.
    #[error("transient fetch error: {0}")]
    TransientFetch(String),

    /// Communication failure while writing to the cluster store.
    #[error("transient write error: {0}")]
    TransientWrite(String),

    /// Optimistic-concurrency rejection: the caller held a stale version.
    #[error("conflict writing {key}: expected version {expected}, store has {found}")]
    Conflict {
        key: ObjectKey,
        expected: u64,
        found: u64,
    },

    /// Creating the execution unit for a step failed mid-pass.
    #[error("failed to create execution unit for step '{step}': {source}")]
    StepCreation {
        step: String,
        #[source]
        source: Box<RundagError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RundagError {
    /// Whether the outer driver should retry the reconciliation later.
    ///
    /// Validation and configuration errors are permanent, and so is a unit
    /// name already held by another run. Everything else concerns store
    /// state that may have moved on, and is retried against fresh state.
    pub fn is_retryable(&self) -> bool {
        match self {
            RundagError::UnknownReference { .. }
            | RundagError::CycleDetected { .. }
            | RundagError::InvalidDefinition(_)
            | RundagError::AlreadyExists { .. }
            | RundagError::Config(_)
            | RundagError::Toml(_) => false,
            RundagError::StepCreation { source, .. } => source.is_retryable(),
            _ => true,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RundagError::Conflict { .. })
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RundagError>;
