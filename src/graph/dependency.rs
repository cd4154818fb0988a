// src/graph/dependency.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, RundagError};
use crate::model::DefinitionGraph;

/// Per-step edges, both directions.
#[derive(Debug, Clone, Default)]
struct StepNode {
    /// Steps that must succeed before this one may start.
    deps: Vec<String>,
    /// Steps that list this one in their `dependencies`.
    dependents: Vec<String>,
}

/// Read-only view of a graph's dependency relation keyed by step name.
///
/// Assumes the definition already passed admission validation; it is used
/// for diagnostics and dry-run output, never to re-validate at run time.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, StepNode>,
}

impl DependencyGraph {
    pub fn from_definition(graph: &DefinitionGraph) -> Self {
        let mut nodes: BTreeMap<String, StepNode> = graph
            .spec
            .steps
            .iter()
            .map(|step| {
                (
                    step.name.clone(),
                    StepNode {
                        deps: step.dependencies.clone(),
                        dependents: Vec::new(),
                    },
                )
            })
            .collect();

        for step in &graph.spec.steps {
            for dep in &step.dependencies {
                if let Some(node) = nodes.get_mut(dep) {
                    node.dependents.push(step.name.clone());
                }
            }
        }

        Self { nodes }
    }

    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Steps without dependencies; these start in the first pass of a run.
    pub fn roots(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.deps.is_empty())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Steps ordered so that every step comes after its dependencies.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        // Edge direction: dep -> step.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }
        for (name, node) in &self.nodes {
            for dep in &node.deps {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
            Err(cycle) => Err(RundagError::CycleDetected {
                path: vec![cycle.node_id().to_string()],
            }),
        }
    }
}
