// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::controller::ControllerOptions;
use crate::model::{DefinitionGraph, GraphSpec, RunInstance, RunSpec};
use crate::scheduler::{
    DEFAULT_FINALIZER, DEFAULT_NAMESPACE, DEFAULT_RUN_AS_USER, DEFAULT_UNIT_PORT,
    SchedulingContext,
};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [controller]
/// namespace = "default"
/// resync_interval = "30s"
///
/// [controller.labels]
/// team = "data"
///
/// [[graph.etl.step]]
/// name = "extract"
/// image = "sh"
/// command = ["sh", "-c", "echo extracting"]
///
/// [[graph.etl.step]]
/// name = "load"
/// image = "sh"
/// dependencies = ["extract"]
///
/// [run.nightly]
/// graph = "etl"
/// ```
///
/// This type is **unvalidated**; see [`ConfigFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub controller: RawControllerSection,

    /// Graphs from `[graph.<name>]`, keyed by graph name.
    #[serde(default)]
    pub graph: BTreeMap<String, GraphSpec>,

    /// Runs from `[run.<name>]`, keyed by run name.
    #[serde(default)]
    pub run: BTreeMap<String, RunSpec>,
}

/// `[controller]` section, durations still in string form.
#[derive(Debug, Clone, Deserialize)]
pub struct RawControllerSection {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_finalizer")]
    pub finalizer: String,

    /// Port exposed to every unit replica.
    #[serde(default = "default_unit_port")]
    pub unit_port: u16,

    #[serde(default = "default_run_as_user")]
    pub run_as_user: u32,

    /// Duration string such as `"30s"`.
    #[serde(default = "default_resync_interval")]
    pub resync_interval: String,

    /// Duration string such as `"5s"`.
    #[serde(default = "default_requeue_delay")]
    pub requeue_delay: String,

    /// Extra labels put on every execution unit.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_finalizer() -> String {
    DEFAULT_FINALIZER.to_string()
}

fn default_unit_port() -> u16 {
    DEFAULT_UNIT_PORT
}

fn default_run_as_user() -> u32 {
    DEFAULT_RUN_AS_USER
}

fn default_resync_interval() -> String {
    "30s".to_string()
}

fn default_requeue_delay() -> String {
    "5s".to_string()
}

impl Default for RawControllerSection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            finalizer: default_finalizer(),
            unit_port: default_unit_port(),
            run_as_user: default_run_as_user(),
            resync_interval: default_resync_interval(),
            requeue_delay: default_requeue_delay(),
            labels: BTreeMap::new(),
        }
    }
}

/// Validated `[controller]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub namespace: String,
    pub finalizer: String,
    pub unit_port: u16,
    pub run_as_user: u32,
    pub resync_interval: Duration,
    pub requeue_delay: Duration,
    pub labels: BTreeMap<String, String>,
}

/// Validated configuration.
///
/// Can only be obtained through `TryFrom<RawConfigFile>`: every graph has
/// passed admission validation and every run names a configured graph.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub controller: ControllerConfig,
    /// Graphs keyed by name, placed in the controller namespace.
    pub graphs: BTreeMap<String, DefinitionGraph>,
    /// Runs keyed by name, placed in the controller namespace.
    pub runs: BTreeMap<String, RunInstance>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        controller: ControllerConfig,
        graphs: BTreeMap<String, DefinitionGraph>,
        runs: BTreeMap<String, RunInstance>,
    ) -> Self {
        Self {
            controller,
            graphs,
            runs,
        }
    }

    pub fn scheduling_context(&self) -> SchedulingContext {
        SchedulingContext {
            namespace: self.controller.namespace.clone(),
            finalizer: self.controller.finalizer.clone(),
            unit_port: self.controller.unit_port,
            run_as_user: self.controller.run_as_user,
            labels: self.controller.labels.clone(),
        }
    }

    pub fn controller_options(&self, exit_when_done: bool) -> ControllerOptions {
        ControllerOptions {
            exit_when_done,
            resync_interval: self.controller.resync_interval,
            requeue_delay: self.controller.requeue_delay,
        }
    }
}
