//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - The demonstration system without delays
//! - Randomly generated deterministic systems
//! - Rebuilding a system with one dependency removed

use std::collections::BTreeSet;
use std::time::Duration;

use detsched::random::XorShift64;
use detsched::{demo, Instruction, Result, System, Task, TaskName, TaskNames};

pub const CELLS: [&str; 4] = ["p", "q", "r", "s"];

/// The demonstration system with no delays.
pub fn scenario() -> System {
    demo::demo_system(Duration::ZERO).expect("scenario system is valid")
}

pub fn name(label: &str) -> TaskName {
    TaskName::from(label)
}

/// Names of a system's tasks in graph order.
pub fn task_names(system: &System) -> Vec<String> {
    system.tasks().iter().map(|t| t.name().to_string()).collect()
}

/// Every `(dependency, task)` pair of a system, sorted.
pub fn edges(system: &System) -> BTreeSet<(TaskName, TaskName)> {
    system
        .tasks()
        .iter()
        .flat_map(|task| {
            task.dependencies()
                .iter()
                .map(|dep| (dep.clone(), task.name().clone()))
                .collect::<Vec<_>>()
        })
        .collect()
}

fn random_instruction(rng: &mut XorShift64) -> Instruction {
    let target = CELLS[rng.next_in_range(0, 3) as usize];
    let source = CELLS[rng.next_in_range(0, 3) as usize];
    let constant = rng.next_in_range(-9, 9);
    let value = match rng.next_in_range(0, 2) {
        0 => Instruction::constant(constant),
        1 => Instruction::add(source, constant).expect("operands are values"),
        _ => Instruction::sub(constant, source).expect("operands are values"),
    };
    Instruction::assign(target, value).expect("source is a value")
}

/// A random deterministic system of `count` tasks plus an initializer.
///
/// The first task assigns every cell; each later task depends on every
/// earlier task it shares a cell with, and on a few others at random.
pub fn random_system(seed: u64, count: usize) -> Result<System> {
    let mut rng = XorShift64::new(seed);
    let mut names = TaskNames::new();

    let init = CELLS
        .iter()
        .map(|cell| Instruction::assign(*cell, rng.next_in_range(0, 20)))
        .collect::<Result<Vec<_>>>()?;
    let mut tasks = vec![names.task(init)?];

    for _ in 0..count {
        let len = rng.next_in_range(1, 3) as usize;
        let instructions: Vec<Instruction> = (0..len).map(|_| random_instruction(&mut rng)).collect();
        let mut task = names.task(instructions)?;
        let dependencies: Vec<TaskName> = tasks
            .iter()
            .filter(|earlier| !earlier.domains_disjoint(&task) || rng.next_in_range(0, 3) == 0)
            .map(|earlier| earlier.name().clone())
            .collect();
        task = task.with_dependencies(dependencies);
        tasks.push(task);
    }

    System::new(format!("random-{}", seed), tasks)
}

/// Rebuild `system`'s tasks with the `dependency -> task` edge removed.
pub fn without_edge(system: &System, dependency: &TaskName, task: &TaskName) -> Result<System> {
    let mut tasks = Vec::with_capacity(system.task_count());
    for original in system.tasks() {
        let kept: Vec<TaskName> = original
            .dependencies()
            .iter()
            .filter(|dep| !(original.name() == task && *dep == dependency))
            .cloned()
            .collect();
        tasks.push(
            Task::new(original.name().clone(), original.instructions().to_vec())?
                .with_dependencies(kept),
        );
    }
    System::new("without-edge", tasks)
}
