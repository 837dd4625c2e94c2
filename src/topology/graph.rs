//! Adjacency, reverse adjacency and topological ordering over the
//! dependency edges derived from a topology's phases and hyperedges.
//!
//! Cycle detection is a three-colour DFS: white (unvisited), gray
//! (on the current recursion stack), black (finished). Re-entering a gray
//! node means the current path loops back on itself, i.e. a cycle.

use std::collections::{HashMap, HashSet};

use crate::error::OrchestratorError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// A directed graph over phase names, built from `requires` /
/// `consumes_from` / `sequential` dependency edges (and the hyperedges
/// that imply `consumes_from`).
pub struct DependencyGraph {
    nodes: Vec<String>,
    adjacency: HashMap<String, HashSet<String>>,
    reverse: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    pub fn new(nodes: impl IntoIterator<Item = String>) -> Self {
        let nodes: Vec<String> = nodes.into_iter().collect();
        let mut adjacency = HashMap::new();
        let mut reverse = HashMap::new();
        for node in &nodes {
            adjacency.insert(node.clone(), HashSet::new());
            reverse.insert(node.clone(), HashSet::new());
        }
        Self {
            nodes,
            adjacency,
            reverse,
        }
    }

    /// Add an edge `source -> target` (source must reach `ACTIVE` before
    /// target may start).
    pub fn add_edge(&mut self, source: &str, target: &str) {
        self.adjacency
            .get_mut(source)
            .expect("edge source must be a known node")
            .insert(target.to_string());
        self.reverse
            .get_mut(target)
            .expect("edge target must be a known node")
            .insert(source.to_string());
    }

    pub fn downstream(&self, phase: &str) -> HashSet<String> {
        self.adjacency.get(phase).cloned().unwrap_or_default()
    }

    pub fn upstream(&self, phase: &str) -> HashSet<String> {
        self.reverse.get(phase).cloned().unwrap_or_default()
    }

    /// Topological order of all nodes such that every edge's source
    /// precedes its target. Returns `CycleDetected` (as `ConfigInvalid`)
    /// if the graph has a cycle.
    pub fn topological_order(&self) -> Result<Vec<String>, OrchestratorError> {
        let mut color: HashMap<&str, Color> = self
            .nodes
            .iter()
            .map(|n| (n.as_str(), Color::White))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            if color[node.as_str()] == Color::White {
                self.visit(node, &mut color, &mut order)?;
            }
        }

        order.reverse();
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        color: &mut HashMap<&'a str, Color>,
        order: &mut Vec<String>,
    ) -> Result<(), OrchestratorError> {
        color.insert(node, Color::Gray);

        if let Some(targets) = self.adjacency.get(node) {
            for target in targets {
                match color.get(target.as_str()) {
                    Some(Color::Gray) => {
                        return Err(OrchestratorError::ConfigInvalid(format!(
                            "cycle detected: '{node}' -> '{target}'"
                        )));
                    }
                    Some(Color::Black) => continue,
                    _ => self.visit(target.as_str(), color, order)?,
                }
            }
        }

        color.insert(node, Color::Black);
        order.push(node.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_chain_orders_correctly() {
        let mut g = DependencyGraph::new(["a".into(), "b".into(), "c".into()]);
        g.add_edge("a", "b");
        g.add_edge("b", "c");
        let order = g.topological_order().unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn cycle_is_detected() {
        let mut g = DependencyGraph::new(["a".into(), "b".into()]);
        g.add_edge("a", "b");
        g.add_edge("b", "a");
        assert!(g.topological_order().is_err());
    }

    #[test]
    fn disjoint_components_both_appear() {
        let mut g = DependencyGraph::new(["a".into(), "b".into(), "c".into(), "d".into()]);
        g.add_edge("a", "b");
        g.add_edge("c", "d");
        let order = g.topological_order().unwrap();
        assert!(order.iter().position(|n| n == "a") < order.iter().position(|n| n == "b"));
        assert!(order.iter().position(|n| n == "c") < order.iter().position(|n| n == "d"));
    }
}
