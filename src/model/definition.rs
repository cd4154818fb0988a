// src/model/definition.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ObjectMeta;

/// Upper bound on step replicas accepted at admission.
pub const MAX_REPLICAS: u32 = 10;

/// Upper bound on step name length accepted at admission.
pub const MAX_STEP_NAME_LEN: usize = 40;

/// Immutable, named template of steps and their dependency edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionGraph {
    pub metadata: ObjectMeta,
    pub spec: GraphSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    #[serde(default, rename = "step")]
    pub steps: Vec<StepSpec>,
}

/// A named unit of work: what to run and what it waits for.
///
/// Mirrors a TOML table such as:
///
/// ```toml
/// [[graph.build.step]]
/// name = "compile"
/// image = "rust:1.80"
/// replicas = 2
/// dependencies = ["fetch"]
/// command = ["cargo", "build"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    pub image: String,

    #[serde(default = "default_replicas")]
    pub replicas: u32,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub envs: BTreeMap<String, String>,

    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default)]
    pub args: Vec<String>,
}

fn default_replicas() -> u32 {
    1
}

impl DefinitionGraph {
    pub fn new(metadata: ObjectMeta, steps: Vec<StepSpec>) -> Self {
        Self {
            metadata,
            spec: GraphSpec { steps },
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn step(&self, name: &str) -> Option<&StepSpec> {
        self.spec.steps.iter().find(|s| s.name == name)
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.spec.steps.iter().map(|s| s.name.as_str())
    }

    /// Name-keyed adjacency map (`step -> dependencies`) as consumed by the
    /// validator.
    pub fn adjacency(&self) -> BTreeMap<String, Vec<String>> {
        self.spec
            .steps
            .iter()
            .map(|s| (s.name.clone(), s.dependencies.clone()))
            .collect()
    }
}

impl StepSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            replicas: default_replicas(),
            dependencies: Vec::new(),
            envs: BTreeMap::new(),
            command: Vec::new(),
            args: Vec::new(),
        }
    }
}
