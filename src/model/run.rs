// src/model/run.rs

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ObjectMeta;

/// One mutable execution of a [`DefinitionGraph`](super::DefinitionGraph).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInstance {
    pub metadata: ObjectMeta,
    pub spec: RunSpec,
    #[serde(default)]
    pub status: RunStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    /// Name of the graph to execute, resolved in the run's namespace.
    #[serde(rename = "graph")]
    pub graph_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    /// Job registry: step name -> execution unit name.
    ///
    /// Grows monotonically while the run is active; entries are never removed
    /// or rewritten.
    #[serde(default)]
    pub jobs: BTreeMap<String, String>,

    /// Append-only status history. The last entry is authoritative.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl RunInstance {
    pub fn new(metadata: ObjectMeta, graph_name: impl Into<String>) -> Self {
        Self {
            metadata,
            spec: RunSpec {
                graph_name: graph_name.into(),
            },
            status: RunStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

impl RunStatus {
    pub fn last_condition(&self) -> Option<&Condition> {
        self.conditions.last()
    }

    pub fn unit_for(&self, step: &str) -> Option<&str> {
        self.jobs.get(step).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Initializing,
    InProgress,
    Succeeded,
    Failed,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionType::Initializing => "Initializing",
            ConditionType::InProgress => "InProgress",
            ConditionType::Succeeded => "Succeeded",
            ConditionType::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Tri-state condition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Timestamped status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        type_: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_,
            status,
            reason: reason.into(),
            message: message.into(),
            time: Utc::now(),
        }
    }
}
