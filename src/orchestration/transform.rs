//! Structural transforms that derive new Systems from a validated one.
//!
//! Both transforms copy the tasks and rewrite only the dependency edges, so
//! the derived system computes the same final state with a different
//! amount of concurrency.

use petgraph::graph::NodeIndex;
use petgraph::Direction;
use std::collections::HashMap;

use crate::core::system::{ancestors, find_interference, DependencyKind, System, TaskGraph};
use crate::dlog;
use crate::error::Result;

/// Node indices sorted by task name.
fn by_name(graph: &TaskGraph) -> Vec<NodeIndex> {
    let mut nodes: Vec<NodeIndex> = graph.node_indices().collect();
    nodes.sort_by(|a, b| graph[*a].name().cmp(graph[*b].name()));
    nodes
}

/// Topological order, level by level; tasks of a level sorted by name.
fn topological_levels(graph: &TaskGraph) -> Vec<NodeIndex> {
    let mut pending: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|n| (n, graph.neighbors_directed(n, Direction::Incoming).count()))
        .collect();
    let mut level: Vec<NodeIndex> = by_name(graph)
        .into_iter()
        .filter(|n| pending[n] == 0)
        .collect();
    let mut order = Vec::with_capacity(graph.node_count());
    while !level.is_empty() {
        let mut next = Vec::new();
        for &node in &level {
            for dependent in graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(count) = pending.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        next.push(dependent);
                    }
                }
            }
        }
        order.append(&mut level);
        next.sort_by(|a, b| graph[*a].name().cmp(graph[*b].name()));
        level = next;
    }
    order
}

/// Derive a system that runs one task at a time.
///
/// Tasks are ordered topologically, ties broken by name, and every task
/// after the first depends on exactly its predecessor.
pub fn linearize(system: &System) -> Result<System> {
    let source = system.graph();
    let order = topological_levels(source);

    let mut graph = TaskGraph::with_capacity(order.len(), order.len().saturating_sub(1));
    let mut previous: Option<NodeIndex> = None;
    for node in order {
        let index = graph.add_node(source[node].clone());
        if let Some(previous) = previous {
            graph.add_edge(previous, index, DependencyKind::Sequenced);
        }
        previous = Some(index);
    }

    let derived = System::from_graph(format!("{} - Sequential", system.name()), graph)?;
    dlog!(
        "Linearized {}: {} -> {} dependencies",
        system.name(),
        system.dependency_count(),
        derived.dependency_count()
    );
    Ok(derived)
}

/// Every `(dependency, task)` pair of the transitive closure, in a fixed order.
fn closure_pairs(graph: &TaskGraph) -> Vec<(NodeIndex, NodeIndex)> {
    let nodes = by_name(graph);
    let mut pairs = Vec::new();
    for &task in &nodes {
        let reach = ancestors(graph, task);
        for &dependency in &nodes {
            if reach.contains(&dependency) {
                pairs.push((dependency, task));
            }
        }
    }
    pairs
}

/// Derive a system with as few edges as determinism allows.
///
/// The edge set is first saturated with the transitive closure, then each
/// closure edge is tentatively dropped and kept out only if the system
/// stays deterministic. The result depends on the enumeration order and
/// is one of possibly several valid minimal graphs.
pub fn maximize_parallelism(system: &System) -> Result<System> {
    let mut graph = system.graph().clone();
    let pairs = closure_pairs(&graph);

    for &(dependency, task) in &pairs {
        if graph.find_edge(dependency, task).is_none() {
            graph.add_edge(dependency, task, DependencyKind::Implied);
        }
    }
    let saturated = graph.edge_count();

    for &(dependency, task) in &pairs {
        let Some(edge) = graph.find_edge(dependency, task) else {
            continue;
        };
        let Some(kind) = graph.remove_edge(edge) else {
            continue;
        };
        if find_interference(&graph).is_some() {
            graph.add_edge(dependency, task, kind);
        }
    }

    let derived = System::from_graph(format!("{} - Parallelized", system.name()), graph)?;
    dlog!(
        "Parallelized {}: {} declared, {} saturated, {} kept",
        system.name(),
        system.dependency_count(),
        saturated,
        derived.dependency_count()
    );
    Ok(derived)
}
