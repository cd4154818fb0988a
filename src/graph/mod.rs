// src/graph/mod.rs

//! Dependency graph validation and inspection.
//!
//! - [`validate`] is the admission gate: referential integrity plus a
//!   three-colour acyclicity check.
//! - [`dependency`] is a read-only adjacency view used for diagnostics.

pub mod dependency;
pub mod validate;

pub use dependency::DependencyGraph;
pub use validate::{validate_definition, validate_graph, validate_graph_map};
