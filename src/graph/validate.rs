// src/graph/validate.rs

//! Admission-time validation of dependency graphs.
//!
//! Validation is a gate, not a runtime check: graphs are validated once when
//! they are admitted into the store (or loaded from config) and the scheduler
//! trusts them afterwards.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::errors::{Result, RundagError};
use crate::model::DefinitionGraph;
use crate::model::definition::{MAX_REPLICAS, MAX_STEP_NAME_LEN};

/// DFS colour of a node, kept in a side table keyed by node name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colour {
    Unvisited,
    /// On the current DFS path.
    InProgress,
    /// Fully explored; reaching it again is a convergent edge, not a cycle.
    Done,
}

/// Validate a `node -> dependencies` mapping.
///
/// Fails with [`RundagError::UnknownReference`] if an edge points at a node
/// that is not a key of the mapping, and with [`RundagError::CycleDetected`]
/// if the edges form a directed cycle. Nodes are walked in sorted order, so
/// the reported error does not depend on the map's iteration order.
pub fn validate_graph(graph: &BTreeMap<String, Vec<String>>) -> Result<()> {
    let adjacency: BTreeMap<&str, &[String]> = graph
        .iter()
        .map(|(node, deps)| (node.as_str(), deps.as_slice()))
        .collect();
    validate_adjacency(&adjacency)
}

/// [`validate_graph`] for callers holding a `HashMap`.
pub fn validate_graph_map(graph: &HashMap<String, Vec<String>>) -> Result<()> {
    let adjacency: BTreeMap<&str, &[String]> = graph
        .iter()
        .map(|(node, deps)| (node.as_str(), deps.as_slice()))
        .collect();
    validate_adjacency(&adjacency)
}

fn validate_adjacency(adjacency: &BTreeMap<&str, &[String]>) -> Result<()> {
    ensure_edges_exist(adjacency)?;

    if let Some(path) = find_cycle(adjacency) {
        return Err(RundagError::CycleDetected { path });
    }

    debug!(nodes = adjacency.len(), "dependency graph is acyclic");
    Ok(())
}

fn ensure_edges_exist(adjacency: &BTreeMap<&str, &[String]>) -> Result<()> {
    for (node, deps) in adjacency {
        for dep in deps.iter() {
            if !adjacency.contains_key(dep.as_str()) {
                return Err(RundagError::UnknownReference {
                    from: node.to_string(),
                    to: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Iterative three-colour DFS over every component.
///
/// Returns the nodes of the first cycle found, starting and ending with the
/// node the back-edge points at.
fn find_cycle<'a>(adjacency: &BTreeMap<&'a str, &'a [String]>) -> Option<Vec<String>> {
    let mut colours: HashMap<&'a str, Colour> = adjacency
        .keys()
        .map(|node| (*node, Colour::Unvisited))
        .collect();

    for &root in adjacency.keys() {
        if colours.get(root) != Some(&Colour::Unvisited) {
            continue;
        }

        // (node, index of the next edge to follow)
        let mut stack: Vec<(&'a str, usize)> = vec![(root, 0)];
        colours.insert(root, Colour::InProgress);

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let edges: &'a [String] = adjacency.get(node).copied().unwrap_or(&[]);

            let Some(next) = edges.get(frame.1) else {
                colours.insert(node, Colour::Done);
                stack.pop();
                continue;
            };
            frame.1 += 1;
            let next = next.as_str();

            match colours.get(next).copied() {
                Some(Colour::Unvisited) => {
                    colours.insert(next, Colour::InProgress);
                    stack.push((next, 0));
                }
                Some(Colour::InProgress) => {
                    let start = stack
                        .iter()
                        .position(|(n, _)| *n == next)
                        .unwrap_or(0);
                    let mut path: Vec<String> =
                        stack[start..].iter().map(|(n, _)| n.to_string()).collect();
                    path.push(next.to_string());
                    return Some(path);
                }
                Some(Colour::Done) | None => {}
            }
        }
    }

    None
}

/// Full admission check for a [`DefinitionGraph`].
///
/// On top of referential integrity and acyclicity this enforces the schema
/// bounds: at least one step, unique step names of at most
/// [`MAX_STEP_NAME_LEN`] characters, a non-empty image and
/// `1 <= replicas <= MAX_REPLICAS`.
pub fn validate_definition(graph: &DefinitionGraph) -> Result<()> {
    if graph.spec.steps.is_empty() {
        return Err(RundagError::InvalidDefinition(format!(
            "graph '{}' must define at least one step",
            graph.name()
        )));
    }

    let mut seen = HashSet::new();
    for step in &graph.spec.steps {
        if step.name.is_empty() {
            return Err(RundagError::InvalidDefinition(format!(
                "graph '{}' has a step with an empty name",
                graph.name()
            )));
        }
        if step.name.chars().count() > MAX_STEP_NAME_LEN {
            return Err(RundagError::InvalidDefinition(format!(
                "step name '{}' exceeds {} characters",
                step.name, MAX_STEP_NAME_LEN
            )));
        }
        if !seen.insert(step.name.as_str()) {
            return Err(RundagError::InvalidDefinition(format!(
                "graph '{}' defines step '{}' more than once",
                graph.name(),
                step.name
            )));
        }
        if step.image.trim().is_empty() {
            return Err(RundagError::InvalidDefinition(format!(
                "step '{}' must set an image",
                step.name
            )));
        }
        if step.replicas == 0 || step.replicas > MAX_REPLICAS {
            return Err(RundagError::InvalidDefinition(format!(
                "step '{}' has replicas = {}; expected 1..={}",
                step.name, step.replicas, MAX_REPLICAS
            )));
        }
    }

    validate_graph(&graph.adjacency())
}
