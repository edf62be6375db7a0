//! Task data model.
//!
//! A task is a named, ordered list of instructions plus the names of the
//! tasks it depends on. Its read and write domains are derived once, at
//! construction, from the instruction trees.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::core::instruction::Instruction;
use crate::core::memory::Memory;
use crate::dlog_trace;
use crate::error::Result;

/// Identity of a task within a System.
///
/// Integer ids sort before labels; ids sort numerically, labels lexically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskName {
    Id(u64),
    Label(String),
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskName::Id(id) => write!(f, "{}", id),
            TaskName::Label(label) => f.write_str(label),
        }
    }
}

impl From<u64> for TaskName {
    fn from(id: u64) -> Self {
        TaskName::Id(id)
    }
}

impl From<&str> for TaskName {
    fn from(label: &str) -> Self {
        TaskName::Label(label.to_string())
    }
}

impl From<String> for TaskName {
    fn from(label: String) -> Self {
        TaskName::Label(label)
    }
}

impl From<&TaskName> for TaskName {
    fn from(name: &TaskName) -> Self {
        name.clone()
    }
}

/// Allocator for default task names.
///
/// Hands out increasing integer ids. Claiming an explicit id moves the
/// counter past it, so later defaults never collide with it.
#[derive(Debug, Clone)]
pub struct TaskNames {
    next: u64,
}

impl Default for TaskNames {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl TaskNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next default name.
    pub fn next_name(&mut self) -> TaskName {
        let id = self.next;
        self.next = self.next.saturating_add(1);
        TaskName::Id(id)
    }

    /// Register an explicit name and return it.
    pub fn claim(&mut self, name: impl Into<TaskName>) -> TaskName {
        let name = name.into();
        if let TaskName::Id(id) = name {
            if id >= self.next {
                self.next = id.saturating_add(1);
            }
        }
        name
    }

    /// Build a task named by the allocator.
    pub fn task(&mut self, instructions: Vec<Instruction>) -> Result<Task> {
        Task::new(self.next_name(), instructions)
    }
}

/// A unit of work in a System.
///
/// Equality and ordering consider the name only.
#[derive(Debug, Clone)]
pub struct Task {
    name: TaskName,
    instructions: Vec<Instruction>,
    dependencies: BTreeSet<TaskName>,
    read_domain: BTreeSet<String>,
    write_domain: BTreeSet<String>,
}

impl Task {
    /// Create a task with no dependencies.
    ///
    /// # Errors
    /// `InvalidInstructionComposition` if an instruction tree nests a shape
    /// that produces no value where a value is needed.
    pub fn new(name: impl Into<TaskName>, instructions: Vec<Instruction>) -> Result<Self> {
        let mut read_domain = BTreeSet::new();
        let mut write_domain = BTreeSet::new();
        for instruction in &instructions {
            instruction.validate()?;
            instruction.collect_domains(&mut read_domain, &mut write_domain, false);
        }
        Ok(Self {
            name: name.into(),
            instructions,
            dependencies: BTreeSet::new(),
            read_domain,
            write_domain,
        })
    }

    /// Add a dependency: `dependency` must complete before this task starts.
    pub fn depends_on(mut self, dependency: impl Into<TaskName>) -> Self {
        self.dependencies.insert(dependency.into());
        self
    }

    pub fn with_dependencies<I, N>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<TaskName>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &TaskName {
        &self.name
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn dependencies(&self) -> &BTreeSet<TaskName> {
        &self.dependencies
    }

    pub fn read_domain(&self) -> &BTreeSet<String> {
        &self.read_domain
    }

    pub fn write_domain(&self) -> &BTreeSet<String> {
        &self.write_domain
    }

    /// Every cell the task touches.
    pub fn memory_cells(&self) -> BTreeSet<String> {
        self.read_domain
            .union(&self.write_domain)
            .cloned()
            .collect()
    }

    /// Whether the two tasks can run in any order without observing each other.
    pub fn domains_disjoint(&self, other: &Task) -> bool {
        self.read_domain.is_disjoint(&other.write_domain)
            && other.read_domain.is_disjoint(&self.write_domain)
            && self.write_domain.is_disjoint(&other.write_domain)
    }

    /// Run the instructions in order.
    pub fn execute(&self, memory: &Memory) -> Result<()> {
        for instruction in &self.instructions {
            dlog_trace!("{}: starting {}", self.name, instruction);
            instruction.evaluate(memory)?;
            dlog_trace!("{}: finished {}", self.name, instruction);
        }
        Ok(())
    }

    pub(crate) fn set_dependencies(&mut self, dependencies: BTreeSet<TaskName>) {
        self.dependencies = dependencies;
    }

    pub(crate) fn instructions_mut(&mut self) -> &mut [Instruction] {
        &mut self.instructions
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Task {}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Task {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

impl std::hash::Hash for Task {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.name)
    }
}
