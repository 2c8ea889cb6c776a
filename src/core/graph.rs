//! core::graph
//!
//! Dependency graph representation and operations.
//!
//! # Architecture
//!
//! The graph is a set of nodes with directed edges, where an edge
//! `source -> target` means "target must be deployed before source".
//! It backs three checks:
//! - Node-level dependency cycles during prepare
//! - Deployment-unit ordering in the manifest
//! - DAG validation of manifest `dependencies` on load
//!
//! # Invariants
//!
//! - All iteration is over ordered collections, so every result is
//!   deterministic for a given set of edges

use std::collections::{BTreeMap, BTreeSet};

/// A directed dependency graph.
#[derive(Debug, Clone)]
pub struct DependencyGraph<K: Ord + Clone> {
    /// Dependencies of each node (node -> nodes it waits for)
    edges: BTreeMap<K, BTreeSet<K>>,
}

impl<K: Ord + Clone> Default for DependencyGraph<K> {
    fn default() -> Self {
        Self {
            edges: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> DependencyGraph<K> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with no edges.
    pub fn add_node(&mut self, node: K) {
        self.edges.entry(node).or_default();
    }

    /// Record that `source` depends on `target`.
    ///
    /// Both endpoints become nodes of the graph.
    pub fn add_edge(&mut self, source: K, target: K) {
        self.edges.entry(target.clone()).or_default();
        self.edges.entry(source).or_default().insert(target);
    }

    /// Whether the node is part of the graph.
    pub fn contains(&self, node: &K) -> bool {
        self.edges.contains_key(node)
    }

    /// Direct dependencies of a node.
    pub fn dependencies(&self, node: &K) -> impl Iterator<Item = &K> {
        self.edges.get(node).into_iter().flatten()
    }

    /// All nodes, in key order.
    pub fn nodes(&self) -> impl Iterator<Item = &K> {
        self.edges.keys()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Check if the graph contains cycles.
    ///
    /// Returns the nodes of the first cycle found, in edge order, starting
    /// from the smallest node that reaches it.
    pub fn find_cycle(&self) -> Option<Vec<K>> {
        let mut visited = BTreeSet::new();
        let mut path = Vec::new();

        for node in self.edges.keys() {
            if let Some(cycle) = self.cycle_from(node, &mut visited, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    fn cycle_from(
        &self,
        node: &K,
        visited: &mut BTreeSet<K>,
        path: &mut Vec<K>,
    ) -> Option<Vec<K>> {
        if let Some(pos) = path.iter().position(|p| p == node) {
            return Some(path[pos..].to_vec());
        }
        if visited.contains(node) {
            return None;
        }

        visited.insert(node.clone());
        path.push(node.clone());

        for dep in self.dependencies(node) {
            if let Some(cycle) = self.cycle_from(dep, visited, path) {
                return Some(cycle);
            }
        }

        path.pop();
        None
    }

    /// Compute a dependency-first ordering.
    ///
    /// Every node appears after all of its dependencies. Among nodes that
    /// are ready at the same time, the smaller key comes first.
    ///
    /// # Errors
    ///
    /// Returns the offending cycle if the graph is not acyclic.
    ///
    /// # Example
    ///
    /// ```
    /// use cxsynth::core::graph::DependencyGraph;
    ///
    /// let mut graph = DependencyGraph::new();
    /// graph.add_edge("web", "db");
    /// graph.add_edge("db", "network");
    /// graph.add_node("audit");
    ///
    /// let order = graph.topological_order().unwrap();
    /// assert_eq!(order, vec!["audit", "network", "db", "web"]);
    /// ```
    pub fn topological_order(&self) -> Result<Vec<K>, Vec<K>> {
        if let Some(cycle) = self.find_cycle() {
            return Err(cycle);
        }

        let mut remaining: BTreeMap<&K, usize> = self
            .edges
            .iter()
            .map(|(node, deps)| (node, deps.len()))
            .collect();

        let mut dependents: BTreeMap<&K, Vec<&K>> = BTreeMap::new();
        for (node, deps) in &self.edges {
            for dep in deps {
                dependents.entry(dep).or_default().push(node);
            }
        }

        let mut ready: BTreeSet<&K> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(node, _)| *node)
            .collect();

        let mut order = Vec::with_capacity(self.edges.len());
        while let Some(node) = ready.pop_first() {
            order.push(node.clone());
            for dependent in dependents.get(&node).into_iter().flatten() {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_graph_has_no_cycles() {
        let graph: DependencyGraph<&str> = DependencyGraph::new();
        assert!(graph.find_cycle().is_none());
        assert!(graph.topological_order().unwrap().is_empty());
    }

    #[test]
    fn linear_chain_has_no_cycles() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("c", "b");
        graph.add_edge("b", "a");

        assert!(graph.find_cycle().is_none());
        assert_eq!(graph.topological_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "a");
        assert_eq!(graph.find_cycle(), Some(vec!["a"]));
    }

    #[test]
    fn cycle_is_reported_in_edge_order() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        graph.add_edge("c", "a");

        assert_eq!(graph.find_cycle(), Some(vec!["a", "b", "c"]));
        assert_eq!(graph.topological_order(), Err(vec!["a", "b", "c"]));
    }

    #[test]
    fn diamond_orders_dependencies_first() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("top", "left");
        graph.add_edge("top", "right");
        graph.add_edge("left", "base");
        graph.add_edge("right", "base");

        let order = graph.topological_order().unwrap();
        let pos = |n: &str| order.iter().position(|x| *x == n).unwrap();

        assert_eq!(order.len(), 4);
        assert!(pos("base") < pos("left"));
        assert!(pos("base") < pos("right"));
        assert!(pos("left") < pos("top"));
        assert!(pos("right") < pos("top"));
    }

    #[test]
    fn ties_break_by_key() {
        let mut graph = DependencyGraph::new();
        graph.add_node("zeta");
        graph.add_node("alpha");
        graph.add_node("mid");

        assert_eq!(
            graph.topological_order().unwrap(),
            vec!["alpha", "mid", "zeta"]
        );
    }

    #[test]
    fn duplicate_edges_are_ignored() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("a", "b");

        assert_eq!(graph.dependencies(&"a").count(), 1);
        assert_eq!(graph.len(), 2);
    }
}
