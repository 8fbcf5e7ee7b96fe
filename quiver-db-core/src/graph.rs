//! Graph lookup seam for traversals
//!
//! The pipeline never walks storage itself. A traversal asks an `EdgeIndex`
//! for the outbound neighbors of one vertex at a time; how those edges are
//! stored (index scan, remote lookup, in-memory map) is the collaborator's
//! concern.

use crate::error::Result;
use crate::value::Value;
use rustc_hash::FxHashMap;

/// Outbound edge lookup by vertex id
pub trait EdgeIndex: Send + Sync {
    /// Neighbors reachable over one outbound edge from `vertex`, in edge order.
    ///
    /// Unknown vertices have no neighbors; that is not an error.
    fn neighbors(&self, vertex: &Value) -> Result<Vec<Value>>;
}

/// In-memory adjacency list, mainly for tests and small fixed graphs
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    adjacency: FxHashMap<Value, Vec<Value>>,
    edge_count: usize,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(from, to)` pairs
    pub fn from_edges<I, V>(edges: I) -> Self
    where
        I: IntoIterator<Item = (V, V)>,
        V: Into<Value>,
    {
        let mut graph = Self::new();
        for (from, to) in edges {
            graph.add_edge(from, to);
        }
        graph
    }

    /// Add a directed edge
    pub fn add_edge(&mut self, from: impl Into<Value>, to: impl Into<Value>) {
        self.adjacency
            .entry(from.into())
            .or_default()
            .push(to.into());
        self.edge_count += 1;
    }

    /// Number of edges added
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }
}

impl EdgeIndex for MemoryGraph {
    fn neighbors(&self, vertex: &Value) -> Result<Vec<Value>> {
        Ok(self.adjacency.get(vertex).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_graph_neighbors_in_edge_order() {
        let graph = MemoryGraph::from_edges([("a", "b"), ("a", "c"), ("b", "c")]);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(
            graph.neighbors(&Value::from("a")).unwrap(),
            vec![Value::from("b"), Value::from("c")]
        );
        assert!(graph.neighbors(&Value::from("z")).unwrap().is_empty());
    }
}
