//! Task systems: a validated DAG of tasks with its own memory.
//!
//! Edges point from a dependency to the task that depends on it, so a
//! task can start once every incoming edge's source has completed. The
//! graph is checked on construction and on every insertion: names are
//! unique, dependencies exist, there is no cycle and no two unordered
//! tasks interfere.

use crossbeam_channel::Sender;
use petgraph::algo::is_cyclic_directed;
use petgraph::dot::{Config as DotConfig, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::{Dfs, EdgeRef, Reversed};
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::memory::{Memory, Snapshot};
use crate::core::task::{Task, TaskName};
use crate::error::{Error, Result};
use crate::orchestration::scheduler::{Scheduler, SchedulerEvent};
use crate::random::XorShift64;
use crate::{dlog, dlog_debug, dlog_error};

/// Why an edge exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependencyKind {
    /// Written by the author of the task.
    #[default]
    Declared,
    /// Chains consecutive tasks of a linearized system.
    Sequenced,
    /// Materialized from the transitive closure of the declared edges.
    Implied,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKind::Declared => write!(f, "declared"),
            DependencyKind::Sequenced => write!(f, "sequenced"),
            DependencyKind::Implied => write!(f, "implied"),
        }
    }
}

pub(crate) type TaskGraph = DiGraph<Task, DependencyKind>;

/// Every node from which `node` can be reached, `node` excluded.
pub(crate) fn ancestors(graph: &TaskGraph, node: NodeIndex) -> HashSet<NodeIndex> {
    let reversed = Reversed(graph);
    let mut dfs = Dfs::new(reversed, node);
    let mut found = HashSet::new();
    while let Some(visited) = dfs.next(reversed) {
        if visited != node {
            found.insert(visited);
        }
    }
    found
}

/// First pair of unordered tasks whose domains overlap, in node order.
pub(crate) fn find_interference(graph: &TaskGraph) -> Option<(NodeIndex, NodeIndex)> {
    let nodes: Vec<NodeIndex> = graph.node_indices().collect();
    let reach: Vec<HashSet<NodeIndex>> = nodes.iter().map(|&n| ancestors(graph, n)).collect();
    for (i, &a) in nodes.iter().enumerate() {
        for (j, &b) in nodes.iter().enumerate().skip(i + 1) {
            if graph[a].domains_disjoint(&graph[b]) {
                continue;
            }
            if reach[i].contains(&b) || reach[j].contains(&a) {
                continue;
            }
            return Some((a, b));
        }
    }
    None
}

/// A deterministic system of tasks.
pub struct System {
    name: String,
    graph: TaskGraph,
    task_index: HashMap<TaskName, NodeIndex>,
    memory: Arc<Memory>,
    elapsed: Vec<Duration>,
    history: Vec<Snapshot>,
}

impl System {
    /// Build and validate a system.
    ///
    /// Tasks may be given in any order; dependencies are resolved by name.
    ///
    /// # Errors
    /// `DuplicateTaskName`, `UnknownDependency`, `CyclicGraph` or
    /// `NonDeterministic`.
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Result<Self> {
        let name = name.into();
        let mut graph = TaskGraph::new();
        let mut task_index = HashMap::new();
        for task in tasks {
            if task_index.contains_key(task.name()) {
                return Err(Error::DuplicateTaskName(task.name().clone()));
            }
            let key = task.name().clone();
            let index = graph.add_node(task);
            task_index.insert(key, index);
        }
        let mut edges = Vec::new();
        for index in graph.node_indices() {
            let task = &graph[index];
            for dependency in task.dependencies() {
                let from = task_index.get(dependency).ok_or_else(|| Error::UnknownDependency {
                    task: task.name().clone(),
                    dependency: dependency.clone(),
                })?;
                edges.push((*from, index));
            }
        }
        for (from, to) in edges {
            graph.add_edge(from, to, DependencyKind::Declared);
        }
        Self::from_graph(name, graph)
    }

    /// Build a system whose edges are the graph's edges.
    ///
    /// Each task's dependency set is rewritten to match its incoming edges.
    pub(crate) fn from_graph(name: impl Into<String>, mut graph: TaskGraph) -> Result<Self> {
        let name = name.into();
        let mut task_index = HashMap::with_capacity(graph.node_count());
        for index in graph.node_indices() {
            if task_index.insert(graph[index].name().clone(), index).is_some() {
                return Err(Error::DuplicateTaskName(graph[index].name().clone()));
            }
        }
        let indices: Vec<NodeIndex> = graph.node_indices().collect();
        for index in indices {
            let dependencies: BTreeSet<TaskName> = graph
                .neighbors_directed(index, Direction::Incoming)
                .map(|n| graph[n].name().clone())
                .collect();
            graph[index].set_dependencies(dependencies);
        }

        let system = Self {
            name,
            graph,
            task_index,
            memory: Arc::new(Memory::new()),
            elapsed: Vec::new(),
            history: Vec::new(),
        };
        system.validate()?;
        for cell in system.memory_cells() {
            system.memory.get_or_create(&cell);
        }
        dlog!(
            "System {} built: {} tasks, {} dependencies",
            system.name,
            system.graph.node_count(),
            system.graph.edge_count()
        );
        Ok(system)
    }

    fn validate(&self) -> Result<()> {
        if self.is_cyclic() {
            return Err(Error::CyclicGraph {
                system: self.name.clone(),
            });
        }
        if let Some((a, b)) = find_interference(&self.graph) {
            return Err(Error::NonDeterministic {
                first: self.graph[a].name().clone(),
                second: self.graph[b].name().clone(),
            });
        }
        Ok(())
    }

    /// Insert a task whose dependencies are already in the system.
    ///
    /// The system is left unchanged when the insertion is rejected.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.task_index.contains_key(task.name()) {
            return Err(Error::DuplicateTaskName(task.name().clone()));
        }
        let mut sources = Vec::with_capacity(task.dependencies().len());
        for dependency in task.dependencies() {
            match self.task_index.get(dependency) {
                Some(&index) => sources.push(index),
                None => {
                    return Err(Error::UnknownDependency {
                        task: task.name().clone(),
                        dependency: dependency.clone(),
                    })
                }
            }
        }

        let key = task.name().clone();
        let index = self.graph.add_node(task);
        for source in sources {
            self.graph.add_edge(source, index, DependencyKind::Declared);
        }
        self.task_index.insert(key.clone(), index);

        if let Err(err) = self.validate() {
            // Removing the most recently added node does not move any other index.
            self.graph.remove_node(index);
            self.task_index.remove(&key);
            dlog_error!("Rejected task {} in {}: {}", key, self.name, err);
            return Err(err);
        }
        for cell in self.graph[index].memory_cells() {
            self.memory.get_or_create(&cell);
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tasks in insertion order.
    pub fn tasks(&self) -> Vec<&Task> {
        self.graph.node_weights().collect()
    }

    pub fn get_task(&self, name: &TaskName) -> Option<&Task> {
        self.task_index.get(name).map(|&index| &self.graph[index])
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Kind of the edge `from -> to`, if `to` directly depends on `from`.
    pub fn get_dependency(&self, from: &TaskName, to: &TaskName) -> Option<DependencyKind> {
        let from = self.task_index.get(from)?;
        let to = self.task_index.get(to)?;
        let edge = self.graph.find_edge(*from, *to)?;
        self.graph.edge_weight(edge).copied()
    }

    /// Read-only view of the dependency graph.
    pub fn graph(&self) -> &DiGraph<Task, DependencyKind> {
        &self.graph
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Every cell used by any task.
    pub fn memory_cells(&self) -> BTreeSet<String> {
        self.graph
            .node_weights()
            .flat_map(|task| task.memory_cells())
            .collect()
    }

    // ========== Structure ==========

    /// Whether `other` must complete, directly or transitively, before `task`.
    pub fn is_connected(&self, task: &TaskName, other: &TaskName) -> bool {
        match (self.task_index.get(task), self.task_index.get(other)) {
            (Some(&task), Some(&other)) if task != other => {
                ancestors(&self.graph, task).contains(&other)
            }
            _ => false,
        }
    }

    /// Whether the two tasks may run concurrently and touch the same cells.
    pub fn is_interfering(&self, a: &TaskName, b: &TaskName) -> bool {
        let (Some(task_a), Some(task_b)) = (self.get_task(a), self.get_task(b)) else {
            return false;
        };
        !(task_a.domains_disjoint(task_b) || self.is_connected(a, b) || self.is_connected(b, a))
    }

    pub fn is_deterministic(&self) -> bool {
        find_interference(&self.graph).is_none()
    }

    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    fn sink_indices(&self) -> Vec<NodeIndex> {
        let mut sinks: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .collect();
        sinks.sort_by(|&a, &b| {
            let a = &self.graph[a];
            let b = &self.graph[b];
            (!a.dependencies().is_empty(), a.name()).cmp(&(!b.dependencies().is_empty(), b.name()))
        });
        sinks
    }

    /// Tasks no other task depends on; tasks without dependencies first.
    pub fn get_final_tasks(&self) -> Vec<&Task> {
        self.sink_indices()
            .into_iter()
            .map(|n| &self.graph[n])
            .collect()
    }

    /// Layers from the sources to the sinks.
    ///
    /// Walks backward from the sinks; each task lands in the layer of its
    /// shortest distance to a sink.
    pub fn get_layers(&self) -> Vec<Vec<&Task>> {
        let mut layers: Vec<Vec<NodeIndex>> = Vec::new();
        let mut explored: HashSet<NodeIndex> = HashSet::new();
        let mut level = self.sink_indices();
        while !level.is_empty() {
            let mut children: BTreeMap<&TaskName, NodeIndex> = BTreeMap::new();
            for &node in &level {
                for dependency in self.graph.neighbors_directed(node, Direction::Incoming) {
                    children.insert(self.graph[dependency].name(), dependency);
                }
            }
            layers.push(level);
            level = children
                .values()
                .copied()
                .filter(|n| !explored.contains(n))
                .collect();
            explored.extend(children.values().copied());
        }
        layers.reverse();
        layers
            .into_iter()
            .map(|layer| layer.into_iter().map(|n| &self.graph[n]).collect())
            .collect()
    }

    /// Node sets of the weakly connected components, ordered by their first sink.
    pub(crate) fn components(&self) -> Vec<Vec<NodeIndex>> {
        let mut sets = UnionFind::new(self.graph.node_count());
        for edge in self.graph.edge_references() {
            sets.union(edge.source().index(), edge.target().index());
        }
        let mut by_root: BTreeMap<usize, Vec<NodeIndex>> = BTreeMap::new();
        for node in self.graph.node_indices() {
            by_root.entry(sets.find(node.index())).or_default().push(node);
        }
        let sinks = self.sink_indices();
        let mut components: Vec<Vec<NodeIndex>> = by_root.into_values().collect();
        components.sort_by_key(|members| {
            sinks
                .iter()
                .position(|s| members.contains(s))
                .unwrap_or(usize::MAX)
        });
        components
    }

    /// Sinks grouped by the connected component they belong to.
    pub fn disconnected_final_tasks(&self) -> Vec<Vec<&Task>> {
        let sinks = self.sink_indices();
        self.components()
            .into_iter()
            .map(|members| {
                sinks
                    .iter()
                    .filter(|s| members.contains(s))
                    .map(|&s| &self.graph[s])
                    .collect()
            })
            .collect()
    }

    /// Graphviz rendering of the graph: one node per task, one edge per dependency.
    pub fn to_dot(&self) -> String {
        let dot = Dot::with_attr_getters(
            &self.graph,
            &[DotConfig::NodeNoLabel, DotConfig::EdgeNoLabel],
            &|_, edge| match edge.weight() {
                DependencyKind::Declared => String::new(),
                kind => format!("style=dashed label=\"{}\"", kind),
            },
            &|_, (_, task)| {
                let mut label = task.name().to_string();
                for instruction in task.instructions() {
                    label.push_str("\\n");
                    label.push_str(&instruction.to_string());
                }
                format!("label=\"{}\" shape=box", label.replace('"', "\\\""))
            },
        );
        format!("{}", dot)
    }

    // ========== Runs ==========

    /// Replace constant assignment sources with random values in `0..=max`.
    ///
    /// Returns the rewritten instructions, with their task and new value.
    pub fn randomize_constants(
        &mut self,
        rng: &mut XorShift64,
        max: i64,
    ) -> Vec<(TaskName, String, i64)> {
        let mut changes = Vec::new();
        let indices: Vec<NodeIndex> = self.graph.node_indices().collect();
        for index in indices {
            let task = &mut self.graph[index];
            let name = task.name().clone();
            for instruction in task.instructions_mut() {
                let before = instruction.to_string();
                let Some(value) = instruction.assigned_constant_mut() else {
                    continue;
                };
                let new_value = rng.next_in_range(0, max);
                *value = new_value;
                dlog_debug!("Changing {} with {}", before, new_value);
                changes.push((name.clone(), before, new_value));
            }
        }
        changes
    }

    /// Run the system `loops` times.
    pub fn run(&mut self, loops: usize) -> Result<()> {
        self.run_with_events(loops, None)
    }

    /// Run the system `loops` times, reporting progress on `events`.
    ///
    /// Each loop starts from cleared memory and, once every task has
    /// completed, appends a snapshot of all cells to the history. A loop
    /// that fails leaves the history and counters as they were.
    pub fn run_with_events(
        &mut self,
        loops: usize,
        events: Option<&Sender<SchedulerEvent>>,
    ) -> Result<()> {
        if loops == 0 {
            return Err(Error::InvalidArgument("loops must be > 0".to_string()));
        }
        let components = self.components();
        for _ in 0..loops {
            let run = self.history.len() + 1;
            self.memory.reset_all();
            let scheduler = Scheduler::new(&self.graph, &self.memory);
            let start = Instant::now();
            if let Err(err) = scheduler.run(&components, events) {
                dlog_error!("Run {} of {} failed: {}", run, self.name, err);
                return Err(err);
            }
            let elapsed = start.elapsed();
            self.elapsed.push(elapsed);
            self.history.push(self.memory.snapshot());
            dlog!("Run {} of {} took {:?}", run, self.name, elapsed);
            if let Some(events) = events {
                let _ = events.send(SchedulerEvent::RunCompleted { run, elapsed });
            }
        }
        Ok(())
    }

    pub fn run_count(&self) -> usize {
        self.history.len()
    }

    /// Wall time of every successful run.
    pub fn elapsed(&self) -> &[Duration] {
        &self.elapsed
    }

    /// One snapshot per successful run.
    pub fn histories(&self) -> &[Snapshot] {
        &self.history
    }

    /// Values taken by `cell` during the last run.
    pub fn history_of(&self, cell: &str) -> Option<&[i64]> {
        self.history
            .last()
            .and_then(|snapshot| snapshot.get(cell))
            .map(|record| record.history.as_slice())
    }

    /// Whether both systems left every cell in the same state, run by run.
    ///
    /// # Errors
    /// `NotYetExecuted` if either system has never completed a run.
    pub fn is_equivalent(&self, other: &System) -> Result<bool> {
        if !(self.is_deterministic() && other.is_deterministic()) {
            return Ok(false);
        }
        if self.memory_cells() != other.memory_cells() {
            return Ok(false);
        }
        for system in [self, other] {
            if system.run_count() == 0 {
                return Err(Error::NotYetExecuted(system.name.clone()));
            }
        }
        Ok(self
            .history
            .iter()
            .zip(other.history.iter())
            .all(|(mine, theirs)| mine == theirs))
    }

    /// Whether every recorded run left the cells in the same state.
    ///
    /// # Errors
    /// `InsufficientRuns` with fewer than two runs.
    pub fn are_histories_equal(&self) -> Result<bool> {
        if self.history.len() < 2 {
            return Err(Error::InsufficientRuns {
                required: 2,
                actual: self.history.len(),
            });
        }
        let first = &self.history[0];
        Ok(self.history.iter().all(|snapshot| snapshot == first))
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("name", &self.name)
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .field("runs", &self.run_count())
            .finish()
    }
}
