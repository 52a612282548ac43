//! Resource dependency graph.
//!
//! Nodes live in an arena indexed by [`NodeId`]; ordering constraints are an
//! explicit list of `(dependency, dependent)` edges. Nothing is inferred from
//! node contents.

use std::collections::VecDeque;
use std::fmt;

use crate::error::{PlanError, Result};

/// Index of a node in a [`ResourceGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Returns the arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arena of nodes plus an explicit dependency edge list.
#[derive(Debug, Clone)]
pub struct ResourceGraph<N> {
    nodes: Vec<N>,
    edges: Vec<(NodeId, NodeId)>,
}

impl<N> Default for ResourceGraph<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> ResourceGraph<N> {
    /// Creates an empty graph.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Adds a node and returns its id.
    pub fn add_node(&mut self, node: N) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Records that `dependent` must be processed after `dependency`.
    ///
    /// Duplicate edges are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if either id is not in the graph or both ids are the
    /// same node.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) -> Result<()> {
        self.check(dependency)?;
        self.check(dependent)?;

        if dependency == dependent {
            return Err(PlanError::DependencyCycle {
                nodes: dependency.to_string(),
            }
            .into());
        }

        if !self.edges.contains(&(dependency, dependent)) {
            self.edges.push((dependency, dependent));
        }
        Ok(())
    }

    /// Gets a node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&N> {
        self.nodes.get(id.0)
    }

    /// Iterates over all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &N)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Returns the edge list.
    #[must_use]
    pub fn edges(&self) -> &[(NodeId, NodeId)] {
        &self.edges
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct dependencies of a node, in edge insertion order.
    #[must_use]
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|(_, to)| *to == id)
            .map(|(from, _)| *from)
            .collect()
    }

    /// Direct dependents of a node, in edge insertion order.
    #[must_use]
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|(from, _)| *from == id)
            .map(|(_, to)| *to)
            .collect()
    }

    fn check(&self, id: NodeId) -> Result<()> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(PlanError::UnknownNode { id: id.0 }.into())
        }
    }
}

impl<N: fmt::Display> ResourceGraph<N> {
    /// Orders the nodes so every dependency precedes its dependents.
    ///
    /// Among nodes that are ready at the same time, the one added first comes
    /// first, so the order is stable for a given graph.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::DependencyCycle`] naming the nodes that could not
    /// be ordered.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        for (_, to) in &self.edges {
            in_degree[to.0] += 1;
        }

        let mut ready: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(current) = ready.pop_front() {
            order.push(NodeId(current));

            let mut released = Vec::new();
            for (from, to) in &self.edges {
                if from.0 == current {
                    in_degree[to.0] -= 1;
                    if in_degree[to.0] == 0 {
                        released.push(to.0);
                    }
                }
            }

            // Keep insertion order among everything that is ready
            ready.extend(released);
            ready.make_contiguous().sort_unstable();
        }

        if order.len() == self.nodes.len() {
            return Ok(order);
        }

        let stuck = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d > 0)
            .map(|(i, _)| self.nodes[i].to_string())
            .collect::<Vec<_>>()
            .join(", ");

        Err(PlanError::DependencyCycle { nodes: stuck }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;

    fn position(order: &[NodeId], id: NodeId) -> usize {
        order.iter().position(|n| *n == id).unwrap()
    }

    #[test]
    fn test_order_respects_edges() {
        let mut graph = ResourceGraph::new();
        let service = graph.add_node("service");
        let cluster = graph.add_node("cluster");
        let pool = graph.add_node("pool");
        graph.add_edge(cluster, pool).unwrap();
        graph.add_edge(pool, service).unwrap();

        let order = graph.topological_order().unwrap();

        assert_eq!(order.len(), 3);
        for (from, to) in graph.edges() {
            assert!(position(&order, *from) < position(&order, *to));
        }
    }

    #[test]
    fn test_ties_follow_insertion_order() {
        let mut graph = ResourceGraph::new();
        let root = graph.add_node("root");
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");
        graph.add_edge(root, c).unwrap();
        graph.add_edge(root, a).unwrap();
        graph.add_edge(root, b).unwrap();

        assert_eq!(graph.topological_order().unwrap(), vec![root, a, b, c]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut graph = ResourceGraph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");
        graph.add_edge(a, b).unwrap();
        graph.add_edge(b, c).unwrap();
        graph.add_edge(c, b).unwrap();

        let err = graph.topological_order().unwrap_err();
        match err {
            DeployError::Plan(PlanError::DependencyCycle { nodes }) => {
                assert_eq!(nodes, "b, c");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_bad_edges() {
        let mut graph = ResourceGraph::new();
        let a = graph.add_node("a");

        assert!(graph.add_edge(a, a).is_err());
        assert!(matches!(
            graph.add_edge(a, NodeId(7)),
            Err(DeployError::Plan(PlanError::UnknownNode { id: 7 }))
        ));
    }

    #[test]
    fn test_neighbours() {
        let mut graph = ResourceGraph::new();
        let provider = graph.add_node("provider");
        let ns = graph.add_node("ns");
        let app = graph.add_node("app");
        graph.add_edge(provider, ns).unwrap();
        graph.add_edge(provider, app).unwrap();
        graph.add_edge(ns, app).unwrap();
        graph.add_edge(ns, app).unwrap();

        assert_eq!(graph.edges().len(), 3);
        assert_eq!(graph.dependencies(app), vec![provider, ns]);
        assert_eq!(graph.dependents(provider), vec![ns, app]);
        assert!(graph.dependencies(provider).is_empty());
    }
}
