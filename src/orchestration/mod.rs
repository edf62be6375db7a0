//! Execution and restructuring of task systems.
//!
//! The scheduler runs a System's graph concurrently; the transforms derive
//! sequential and maximally parallel Systems from a validated one.

pub mod scheduler;
mod transform;

pub use scheduler::{Scheduler, SchedulerEvent};
pub use transform::{linearize, maximize_parallelism};
