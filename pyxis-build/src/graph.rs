//! Module dependency graph
//!
//! Nodes are modules in first-discovered order, edges run from importer to
//! imported module. Tarjan's algorithm collapses import cycles into strongly
//! connected components and yields them dependencies first, which is the
//! order the build processes them in.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use std::collections::{BTreeSet, HashMap};

/// An import edge between two modules of the graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
    /// The edge closes a cycle: it points from a later to an earlier module
    /// of the same SCC in seed order
    pub is_deferred: bool,
}

#[derive(Debug, Default)]
pub struct ModuleGraph {
    graph: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module; the first call for a name fixes its seed position
    pub fn add_module(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.indices.get(name) {
            return index;
        }
        let index = self.graph.add_node(name.to_string());
        self.indices.insert(name.to_string(), index);
        index
    }

    pub fn add_dependency(&mut self, source: &str, target: &str) {
        let source = self.add_module(source);
        let target = self.add_module(target);
        self.graph.update_edge(source, target, ());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Modules in discovery order
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.graph.node_indices().map(move |i| self.graph[i].as_str())
    }

    /// Direct imports of a module in discovery order
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        let Some(&index) = self.indices.get(name) else {
            return Vec::new();
        };
        let mut targets: Vec<NodeIndex> = self.graph.neighbors(index).collect();
        targets.sort();
        targets.dedup();
        targets.into_iter().map(|i| self.graph[i].as_str()).collect()
    }

    /// Every module reachable through imports, excluding the module itself
    /// unless it imports itself through a cycle
    pub fn transitive_dependencies(&self, name: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let Some(&start) = self.indices.get(name) else {
            return found;
        };
        for next in self.graph.neighbors(start) {
            let mut dfs = Dfs::new(&self.graph, next);
            while let Some(node) = dfs.next(&self.graph) {
                found.insert(self.graph[node].clone());
            }
        }
        found
    }

    /// Strongly connected components, dependencies before dependents; each
    /// component lists its modules in seed (discovery) order
    pub fn sccs(&self) -> Vec<Vec<String>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .map(|mut component| {
                component.sort();
                component.into_iter().map(|i| self.graph[i].clone()).collect()
            })
            .collect()
    }

    pub fn edges(&self) -> Vec<DependencyEdge> {
        let mut component_of = HashMap::new();
        for (n, component) in tarjan_scc(&self.graph).into_iter().enumerate() {
            for index in component {
                component_of.insert(index, n);
            }
        }
        let mut edges: Vec<DependencyEdge> = self
            .graph
            .edge_references()
            .map(|edge| {
                let (source, target) = (edge.source(), edge.target());
                DependencyEdge {
                    source: self.graph[source].clone(),
                    target: self.graph[target].clone(),
                    is_deferred: component_of.get(&source) == component_of.get(&target) && target < source,
                }
            })
            .collect();
        edges.sort_by_key(|e| (self.indices[&e.source], self.indices[&e.target]));
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &str)]) -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        for (source, target) in edges {
            graph.add_dependency(source, target);
        }
        graph
    }

    fn position(order: &[Vec<String>], module: &str) -> usize {
        order.iter().position(|scc| scc.iter().any(|m| m == module)).unwrap()
    }

    #[test]
    fn test_acyclic_order() {
        // main -> a -> c, main -> b -> c
        let graph = graph(&[("main", "a"), ("main", "b"), ("a", "c"), ("b", "c")]);
        let order = graph.sccs();
        assert_eq!(order.len(), 4);
        assert!(order.iter().all(|scc| scc.len() == 1));
        assert!(position(&order, "c") < position(&order, "a"));
        assert!(position(&order, "c") < position(&order, "b"));
        assert_eq!(position(&order, "main"), 3);
        assert!(graph.edges().iter().all(|e| !e.is_deferred));
    }

    #[test]
    fn test_cycle_collapses_in_seed_order() {
        let graph = graph(&[("main", "a"), ("a", "b"), ("b", "a"), ("b", "util")]);
        let order = graph.sccs();
        assert_eq!(order.len(), 3);
        assert_eq!(order[position(&order, "a")], vec!["a".to_string(), "b".to_string()]);
        assert!(position(&order, "util") < position(&order, "a"));
        assert!(position(&order, "a") < position(&order, "main"));

        let deferred: Vec<_> = graph.edges().into_iter().filter(|e| e.is_deferred).collect();
        assert_eq!(deferred.len(), 1);
        assert_eq!((deferred[0].source.as_str(), deferred[0].target.as_str()), ("b", "a"));
    }

    #[test]
    fn test_self_import_and_isolated_modules() {
        let mut graph = graph(&[("a", "a")]);
        graph.add_module("lonely");
        assert_eq!(graph.sccs().len(), 2);
        assert_eq!(graph.dependencies("a"), vec!["a"]);
        assert!(graph.dependencies("lonely").is_empty());
        assert!(graph.transitive_dependencies("lonely").is_empty());
        assert!(graph.edges().iter().all(|e| !e.is_deferred));
    }

    #[test]
    fn test_transitive_dependencies() {
        let graph = graph(&[("c", "b"), ("b", "a"), ("a", "base"), ("other", "base")]);
        let deps = graph.transitive_dependencies("c");
        assert_eq!(
            deps.into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string(), "base".to_string()]
        );
        assert!(graph.transitive_dependencies("base").is_empty());
        assert!(!graph.transitive_dependencies("c").contains("other"));
    }

    #[test]
    fn test_every_scc_follows_its_dependencies() {
        // ring of five modules hanging off a chain
        let mut edges = vec![("root", "r0"), ("r4", "leaf"), ("leaf", "base")];
        let ring = ["r0", "r1", "r2", "r3", "r4"];
        for i in 0..ring.len() {
            edges.push((ring[i], ring[(i + 1) % ring.len()]));
        }
        let graph = graph(&edges);
        let order = graph.sccs();
        for edge in graph.edges() {
            assert!(position(&order, &edge.target) <= position(&order, &edge.source), "{:?}", edge);
        }
        assert_eq!(order[position(&order, "r0")].len(), 5);
    }
}
