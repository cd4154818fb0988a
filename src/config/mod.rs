// src/config/mod.rs

//! Configuration loading and validation for rundag.
//!
//! - [`model`] holds the TOML-backed raw model and the validated
//!   [`ConfigFile`].
//! - [`loader`] reads a config file from disk.
//! - [`validate`] implements `TryFrom<RawConfigFile> for ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, ControllerConfig, RawConfigFile, RawControllerSection};
pub use validate::parse_duration;
