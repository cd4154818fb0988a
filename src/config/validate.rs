// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::model::{ConfigFile, ControllerConfig, RawConfigFile, RawControllerSection};
use crate::errors::{Result, RundagError};
use crate::graph::validate_definition;
use crate::model::{DefinitionGraph, ObjectMeta, RunInstance};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = RundagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let controller = validate_controller(&raw.controller)?;
        ensure_has_graphs(&raw)?;

        let mut graphs = BTreeMap::new();
        for (name, spec) in raw.graph {
            let graph = DefinitionGraph {
                metadata: ObjectMeta::new(controller.namespace.clone(), name.clone()),
                spec,
            };
            validate_definition(&graph)?;
            graphs.insert(name, graph);
        }

        let mut runs = BTreeMap::new();
        for (name, spec) in raw.run {
            if !graphs.contains_key(&spec.graph_name) {
                return Err(RundagError::Config(format!(
                    "run '{}' refers to unknown graph '{}'",
                    name, spec.graph_name
                )));
            }
            let run = RunInstance::new(
                ObjectMeta::new(controller.namespace.clone(), name.clone()),
                spec.graph_name,
            );
            runs.insert(name, run);
        }

        Ok(ConfigFile::new_unchecked(controller, graphs, runs))
    }
}

fn ensure_has_graphs(cfg: &RawConfigFile) -> Result<()> {
    if cfg.graph.is_empty() {
        return Err(RundagError::Config(
            "config must contain at least one [graph.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_controller(raw: &RawControllerSection) -> Result<ControllerConfig> {
    if raw.namespace.trim().is_empty() {
        return Err(RundagError::Config(
            "[controller].namespace must not be empty".to_string(),
        ));
    }
    if raw.finalizer.trim().is_empty() {
        return Err(RundagError::Config(
            "[controller].finalizer must not be empty".to_string(),
        ));
    }

    let resync_interval = parse_duration(&raw.resync_interval)
        .map_err(|e| RundagError::Config(format!("[controller].resync_interval: {e}")))?;
    if resync_interval.is_zero() {
        return Err(RundagError::Config(
            "[controller].resync_interval must be greater than zero".to_string(),
        ));
    }

    let requeue_delay = parse_duration(&raw.requeue_delay)
        .map_err(|e| RundagError::Config(format!("[controller].requeue_delay: {e}")))?;

    Ok(ControllerConfig {
        namespace: raw.namespace.clone(),
        finalizer: raw.finalizer.clone(),
        unit_port: raw.unit_port,
        run_as_user: raw.run_as_user,
        resync_interval,
        requeue_delay,
        labels: raw.labels.clone(),
    })
}

/// Parse a duration such as `"250ms"`, `"5s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        other => Err(format!(
            "unsupported duration unit '{other}'; expected ms, s, m, or h"
        )),
    }
}
