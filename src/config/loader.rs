// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a config file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(
        path = %path.display(),
        graphs = config.graph.len(),
        runs = config.run.len(),
        "config file parsed"
    );
    Ok(config)
}

/// Load a config file and validate it.
///
/// Every graph passes the same admission checks the cluster applies
/// (schema bounds, dangling dependencies, cycles) and every run must name a
/// configured graph.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    ConfigFile::try_from(raw_config)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("Rundag.toml")
}
