//! Core domain models for detsched.
//!
//! Memory cells, instructions, tasks and the validated task system that
//! ties them together.

pub mod instruction;
pub mod memory;
pub mod system;
pub mod task;

pub use instruction::{Instruction, Operator};
pub use memory::{Cell, CellRecord, Memory, Snapshot};
pub use system::{DependencyKind, System};
pub use task::{Task, TaskName, TaskNames};
