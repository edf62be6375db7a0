pub mod config;
pub mod core;
pub mod demo;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod random;

pub use crate::core::{Instruction, Memory, Operator, Snapshot, System, Task, TaskName, TaskNames};
pub use error::{Error, Result};
pub use orchestration::{linearize, maximize_parallelism, SchedulerEvent};
