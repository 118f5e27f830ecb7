//! Dependency graph building and topological sorting

use crate::error::{CoreError, CoreResult};
use crate::node::ModelNode;
use crate::node_name::NodeName;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// A directed acyclic graph of node dependencies
#[derive(Debug)]
pub struct DependencyGraph {
    /// The underlying graph
    graph: DiGraph<NodeName, ()>,

    /// Map from node name to graph index
    node_map: HashMap<NodeName, NodeIndex>,
}

impl DependencyGraph {
    fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Build the graph from a set of node definitions.
    ///
    /// Every `depends_on` reference must name another node in the set;
    /// an unknown reference is an error rather than a silently dangling edge.
    /// The built graph is validated to be acyclic.
    pub fn build(nodes: &[ModelNode]) -> CoreResult<Self> {
        let mut dag = Self::new();

        for node in nodes {
            if dag.node_map.contains_key(node.name.as_str()) {
                return Err(CoreError::DuplicateNode {
                    name: node.name.to_string(),
                });
            }
            let idx = dag.graph.add_node(node.name.clone());
            dag.node_map.insert(node.name.clone(), idx);
        }

        for node in nodes {
            let to_idx = dag.node_map[&node.name];
            for upstream in &node.depends_on {
                let Some(&from_idx) = dag.node_map.get(upstream.as_str()) else {
                    return Err(CoreError::UnknownUpstream {
                        node: node.name.to_string(),
                        upstream: upstream.to_string(),
                    });
                };
                // Edge goes from dependency to dependent so topological
                // sort yields dependencies first
                dag.graph.add_edge(from_idx, to_idx, ());
            }
        }

        dag.validate()?;

        Ok(dag)
    }

    /// Validate the graph has no cycles
    pub fn validate(&self) -> CoreResult<()> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(CoreError::Cycle {
                cycle: self.find_cycle_path(cycle.node_id()),
            }),
        }
    }

    /// Find a cycle path starting from a node for error reporting
    fn find_cycle_path(&self, start: NodeIndex) -> String {
        let mut path: Vec<String> = vec![self.graph[start].to_string()];
        let mut current = start;
        let mut visited = HashSet::new();
        visited.insert(current);

        while let Some(edge) = self.graph.edges(current).next() {
            let target = edge.target();
            path.push(self.graph[target].to_string());

            if target == start || visited.contains(&target) {
                break;
            }

            visited.insert(target);
            current = target;
        }

        path.join(" -> ")
    }

    /// Get nodes in topological order (dependencies first)
    pub fn topological_order(&self) -> CoreResult<Vec<NodeName>> {
        match toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .into_iter()
                .map(|idx| self.graph[idx].clone())
                .collect()),
            Err(cycle) => Err(CoreError::Cycle {
                cycle: self.find_cycle_path(cycle.node_id()),
            }),
        }
    }

    /// Get direct dependencies of a node
    pub fn dependencies(&self, node: &str) -> Vec<NodeName> {
        self.neighbors(node, petgraph::Direction::Incoming)
    }

    /// Get direct dependents of a node
    pub fn dependents(&self, node: &str) -> Vec<NodeName> {
        self.neighbors(node, petgraph::Direction::Outgoing)
    }

    fn neighbors(&self, node: &str, direction: petgraph::Direction) -> Vec<NodeName> {
        if let Some(&idx) = self.node_map.get(node) {
            self.graph
                .neighbors_directed(idx, direction)
                .map(|n| self.graph[n].clone())
                .collect()
        } else {
            Vec::new()
        }
    }

    /// Get all ancestors (transitive dependencies) of a node
    pub fn ancestors(&self, node: &str) -> Vec<NodeName> {
        self.collect_reachable(node, petgraph::Direction::Incoming)
    }

    /// Get all descendants (transitive dependents) of a node
    pub fn descendants(&self, node: &str) -> Vec<NodeName> {
        self.collect_reachable(node, petgraph::Direction::Outgoing)
    }

    /// Transitive dependents that must be skipped when `node` fails
    pub fn transitive_dependents(&self, node: &str) -> Vec<NodeName> {
        self.descendants(node)
    }

    /// Collect all nodes reachable from `start` by following edges in `direction` (DFS).
    fn collect_reachable(&self, node: &str, direction: petgraph::Direction) -> Vec<NodeName> {
        let Some(&start) = self.node_map.get(node) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        self.collect_reachable_dfs(start, direction, &mut result, &mut visited);
        result
    }

    fn collect_reachable_dfs(
        &self,
        idx: NodeIndex,
        direction: petgraph::Direction,
        result: &mut Vec<NodeName>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        for neighbor in self.graph.neighbors_directed(idx, direction) {
            if visited.insert(neighbor) {
                result.push(self.graph[neighbor].clone());
                self.collect_reachable_dfs(neighbor, direction, result, visited);
            }
        }
    }

    /// Group a selection into execution levels: every node's in-selection
    /// dependencies sit in an earlier level, so levels can run in sequence
    /// with free parallelism inside each level.
    pub fn execution_levels(&self, selection: &[NodeName]) -> CoreResult<Vec<Vec<NodeName>>> {
        let order = self.topological_order()?;
        let selected: HashSet<&NodeName> = selection.iter().collect();
        let mut remaining: Vec<NodeName> = order
            .into_iter()
            .filter(|n| selected.contains(n))
            .collect();

        let mut levels: Vec<Vec<NodeName>> = Vec::new();
        let mut completed: HashSet<NodeName> = HashSet::new();

        while !remaining.is_empty() {
            let current_level: Vec<NodeName> = remaining
                .iter()
                .filter(|name| {
                    self.dependencies(name)
                        .iter()
                        .all(|dep| completed.contains(dep) || !selected.contains(dep))
                })
                .cloned()
                .collect();

            // Acyclicity was validated above, so every pass frees at least one node
            if current_level.is_empty() {
                return Err(CoreError::Cycle {
                    cycle: remaining
                        .iter()
                        .map(|n| n.to_string())
                        .collect::<Vec<_>>()
                        .join(" -> "),
                });
            }

            let current_set: HashSet<&NodeName> = current_level.iter().collect();
            remaining.retain(|name| !current_set.contains(name));
            completed.extend(current_level.iter().cloned());
            levels.push(current_level);
        }

        Ok(levels)
    }

    /// Get nodes matching a selector pattern
    /// Supports: +node (ancestors + node), node+ (node + descendants)
    pub fn select(&self, selector: &str) -> CoreResult<Vec<NodeName>> {
        let (prefix, name, suffix) = Self::parse_selector(selector);

        if !self.node_map.contains_key(name) {
            return Err(CoreError::NodeNotFound {
                name: name.to_string(),
            });
        }

        let mut selected = vec![NodeName::new(name)];

        if prefix {
            selected.extend(self.ancestors(name));
        }

        if suffix {
            selected.extend(self.descendants(name));
        }

        let order = self.topological_order()?;
        let selected_set: HashSet<_> = selected.into_iter().collect();
        Ok(order
            .into_iter()
            .filter(|n| selected_set.contains(n))
            .collect())
    }

    /// Parse a selector string into (has_prefix, node_name, has_suffix)
    fn parse_selector(selector: &str) -> (bool, &str, bool) {
        let prefix = selector.starts_with('+');
        let suffix = selector.ends_with('+');

        let name = selector.trim_start_matches('+').trim_end_matches('+');

        (prefix, name, suffix)
    }

    /// Get all node names in the graph
    pub fn nodes(&self) -> Vec<NodeName> {
        self.node_map.keys().cloned().collect()
    }

    /// Check if a node exists in the graph
    pub fn contains(&self, node: &str) -> bool {
        self.node_map.contains_key(node)
    }
}

#[cfg(test)]
#[path = "dag_test.rs"]
mod tests;
