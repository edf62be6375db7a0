//! The demonstration system driven by the command line.
//!
//! ```text
//!        A {x = 10 + 20; delay}
//!       / \
//!      B   C          B {y = 10; delay}   C {z = 10; delay}
//!      |   | \
//!      D --+  E       D {z = 10 + 40}     E {o = 100}
//!       \    /
//!         F           F {o = 1000}
//! ```
//!
//! Every schedule of this system ends with x=30, y=10, z=50, o=1000.

use std::time::Duration;

use crate::core::{Instruction, System, Task};
use crate::error::Result;

pub fn demo_tasks(delay: Duration) -> Result<Vec<Task>> {
    Ok(vec![
        Task::new(
            "A",
            vec![
                Instruction::assign("x", Instruction::add(10, 20)?)?,
                Instruction::delay(delay),
            ],
        )?,
        Task::new(
            "B",
            vec![Instruction::assign("y", 10)?, Instruction::delay(delay)],
        )?
        .depends_on("A"),
        Task::new(
            "C",
            vec![Instruction::assign("z", 10)?, Instruction::delay(delay)],
        )?
        .depends_on("A"),
        Task::new("D", vec![Instruction::assign("z", Instruction::add(10, 40)?)?])?
            .with_dependencies(["B", "C"]),
        Task::new("E", vec![Instruction::assign("o", 100)?])?.depends_on("C"),
        Task::new("F", vec![Instruction::assign("o", 1000)?])?.with_dependencies(["D", "E"]),
    ])
}

pub fn demo_system(delay: Duration) -> Result<System> {
    System::new("System", demo_tasks(delay)?)
}
