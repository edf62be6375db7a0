//! Scheduler for concurrent task execution.
//!
//! One run of a System is driven by one dispatcher thread per connected
//! component. A dispatcher keeps, for every task of its component, the
//! number of dependencies that have not completed yet. Tasks whose count
//! reaches zero are started on their own thread; when a task finishes it
//! reports back over a channel and the dispatcher releases its dependents.
//! A task therefore never starts before everything it transitively depends
//! on has completed within the same run. Once any task fails, no dispatcher
//! starts another task; the ones already running are drained.

use crossbeam_channel::Sender;
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::core::memory::Memory;
use crate::core::system::TaskGraph;
use crate::core::task::TaskName;
use crate::error::{Error, Result};
use crate::{dlog_debug, dlog_warn};

/// Events emitted while a System runs.
///
/// Task events are sent from the thread that executes the task; a task's
/// `TaskCompleted` is always sent before any dependent's `TaskStarted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A task began executing its instructions.
    TaskStarted { task: TaskName },
    /// A task executed all of its instructions.
    TaskCompleted { task: TaskName, elapsed: Duration },
    /// A task stopped on an error; the run will fail.
    TaskFailed { task: TaskName, error: String },
    /// Every task of the run completed and the snapshot was recorded.
    RunCompleted { run: usize, elapsed: Duration },
}

/// Executes one run of a task graph against a memory.
pub struct Scheduler<'a> {
    graph: &'a TaskGraph,
    memory: &'a Memory,
    executed: Vec<AtomicBool>,
    failed: AtomicBool,
}

impl<'a> Scheduler<'a> {
    pub fn new(graph: &'a TaskGraph, memory: &'a Memory) -> Self {
        let executed = (0..graph.node_count())
            .map(|_| AtomicBool::new(false))
            .collect();
        Self {
            graph,
            memory,
            executed,
            failed: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    fn executed_count(&self) -> usize {
        self.executed
            .iter()
            .filter(|flag| flag.load(Ordering::Acquire))
            .count()
    }

    /// Run every component concurrently and wait for all of them.
    ///
    /// # Errors
    /// The first error raised by a task of any component.
    pub fn run(
        &self,
        components: &[Vec<NodeIndex>],
        events: Option<&Sender<SchedulerEvent>>,
    ) -> Result<()> {
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(components.len());
            for (i, members) in components.iter().enumerate() {
                let handle = thread::Builder::new()
                    .name(format!("component-{}", i))
                    .spawn_scoped(scope, move || self.run_component(members, events))?;
                handles.push((i, handle));
            }

            let mut outcome = Ok(());
            for (i, handle) in handles {
                let result = handle.join().unwrap_or_else(|_| {
                    Err(Error::TaskPanicked(TaskName::from(format!("component-{}", i))))
                });
                if outcome.is_ok() {
                    outcome = result;
                }
            }
            outcome
        })
    }

    fn run_component(
        &self,
        members: &[NodeIndex],
        events: Option<&Sender<SchedulerEvent>>,
    ) -> Result<()> {
        let mut pending: HashMap<NodeIndex, usize> = members
            .iter()
            .map(|&node| {
                let count = self
                    .graph
                    .neighbors_directed(node, Direction::Incoming)
                    .count();
                (node, count)
            })
            .collect();

        let mut initial: Vec<NodeIndex> = members
            .iter()
            .copied()
            .filter(|node| pending[node] == 0)
            .collect();
        initial.sort_by(|a, b| self.graph[*a].name().cmp(self.graph[*b].name()));
        let mut ready: VecDeque<NodeIndex> = initial.into();

        let (done_tx, done_rx) = crossbeam_channel::unbounded::<(NodeIndex, Result<()>)>();

        thread::scope(|scope| {
            let mut in_flight = 0usize;
            let mut first_error: Option<Error> = None;

            loop {
                while first_error.is_none() && !self.failed.load(Ordering::Acquire) {
                    let Some(node) = ready.pop_front() else {
                        break;
                    };
                    if self.executed[node.index()].swap(true, Ordering::AcqRel) {
                        continue;
                    }
                    let done_tx = done_tx.clone();
                    let task = &self.graph[node];
                    let memory = self.memory;
                    let failed = &self.failed;
                    dlog_debug!("Dispatching {}", task.name());
                    let spawned = thread::Builder::new()
                        .name(format!("task-{}", task.name()))
                        .spawn_scoped(scope, move || {
                            if let Some(events) = events {
                                let _ = events.send(SchedulerEvent::TaskStarted {
                                    task: task.name().clone(),
                                });
                            }
                            let start = Instant::now();
                            let result = catch_unwind(AssertUnwindSafe(|| task.execute(memory)))
                                .unwrap_or_else(|_| Err(Error::TaskPanicked(task.name().clone())));
                            if result.is_err() {
                                failed.store(true, Ordering::Release);
                            }
                            if let Some(events) = events {
                                let event = match &result {
                                    Ok(()) => SchedulerEvent::TaskCompleted {
                                        task: task.name().clone(),
                                        elapsed: start.elapsed(),
                                    },
                                    Err(err) => SchedulerEvent::TaskFailed {
                                        task: task.name().clone(),
                                        error: err.to_string(),
                                    },
                                };
                                let _ = events.send(event);
                            }
                            let _ = done_tx.send((node, result));
                        });
                    match spawned {
                        Ok(_) => in_flight += 1,
                        Err(err) => {
                            self.failed.store(true, Ordering::Release);
                            first_error = Some(Error::Io(err));
                        }
                    }
                }

                if in_flight == 0 {
                    break;
                }
                // The dispatcher keeps a sender alive, so this cannot disconnect.
                let Ok((node, result)) = done_rx.recv() else {
                    break;
                };
                in_flight -= 1;

                match result {
                    Ok(()) => {
                        dlog_debug!("Completed {}", self.graph[node].name());
                        for dependent in self.graph.neighbors_directed(node, Direction::Outgoing) {
                            if let Some(count) = pending.get_mut(&dependent) {
                                *count = count.saturating_sub(1);
                                if *count == 0 {
                                    ready.push_back(dependent);
                                }
                            }
                        }
                    }
                    Err(err) => {
                        dlog_warn!("{} failed: {}", self.graph[node].name(), err);
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
            }

            match first_error {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }
}
