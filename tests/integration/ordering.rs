//! Engine event order and failure handling.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use detsched::{Error, Instruction, SchedulerEvent, System, Task, TaskName};

use crate::fixtures::scenario;

fn run_with_log(system: &mut System, loops: usize) -> (detsched::Result<()>, Vec<SchedulerEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let result = system.run_with_events(loops, Some(&tx));
    drop(tx);
    (result, rx.iter().collect())
}

/// Test: Dependencies complete before dependents start
/// Given the demonstration system
/// When it runs three times with an event observer
/// Then no task starts before all of its dependencies completed in that run
#[test]
fn test_dependencies_complete_before_start() {
    let mut system = scenario();
    let dependencies: HashMap<TaskName, Vec<TaskName>> = system
        .tasks()
        .iter()
        .map(|t| (t.name().clone(), t.dependencies().iter().cloned().collect()))
        .collect();

    let (result, events) = run_with_log(&mut system, 3);
    result.unwrap();

    let runs: Vec<&[SchedulerEvent]> = events
        .split_inclusive(|e| matches!(e, SchedulerEvent::RunCompleted { .. }))
        .collect();
    assert_eq!(runs.len(), 3);

    for run in runs {
        let mut completed: Vec<&TaskName> = Vec::new();
        let mut started = 0;
        for event in run {
            match event {
                SchedulerEvent::TaskStarted { task } => {
                    started += 1;
                    for dependency in &dependencies[task] {
                        assert!(
                            completed.contains(&dependency),
                            "{} started before {} completed",
                            task,
                            dependency
                        );
                    }
                }
                SchedulerEvent::TaskCompleted { task, .. } => completed.push(task),
                SchedulerEvent::TaskFailed { task, error } => panic!("{} failed: {}", task, error),
                SchedulerEvent::RunCompleted { .. } => {}
            }
        }
        assert_eq!(started, 6);
        assert_eq!(completed.len(), 6);
    }
}

/// Test: Run numbering
#[test]
fn test_run_completed_numbers_runs() {
    let mut system = scenario();
    system.run(1).unwrap();
    let (result, events) = run_with_log(&mut system, 2);
    result.unwrap();
    let runs: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            SchedulerEvent::RunCompleted { run, .. } => Some(*run),
            _ => None,
        })
        .collect();
    assert_eq!(runs, vec![2, 3]);
    assert_eq!(system.run_count(), 3);
}

/// Test: Failure stops dispatch
/// Given a chain whose first task fails
/// When the system runs
/// Then the error is returned, dependents never start and nothing is recorded
#[test]
fn test_failure_propagates() {
    let mut system = System::new(
        "failing",
        vec![
            Task::new("a", vec![Instruction::assign("x", Instruction::div(1, 0).unwrap()).unwrap()])
                .unwrap(),
            Task::new("b", vec![Instruction::assign("x", 2).unwrap()])
                .unwrap()
                .depends_on("a"),
        ],
    )
    .unwrap();

    let (result, events) = run_with_log(&mut system, 2);
    assert!(matches!(result, Err(Error::DivisionByZero(_))));
    assert_eq!(system.run_count(), 0);

    let started: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            SchedulerEvent::TaskStarted { task } => Some(task.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec!["a"]);
    assert!(events
        .iter()
        .any(|e| matches!(e, SchedulerEvent::TaskFailed { task, .. } if task.to_string() == "a")));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SchedulerEvent::RunCompleted { .. })));
}

/// Test: Zero loops are rejected without touching history
#[test]
fn test_zero_loops_rejected() {
    let mut system = System::new(
        "flaky",
        vec![Task::new("a", vec![Instruction::assign("x", 7).unwrap()]).unwrap()],
    )
    .unwrap();
    system.run(2).unwrap();
    assert!(matches!(system.run(0), Err(Error::InvalidArgument(_))));
    assert_eq!(system.run_count(), 2);
    assert!(system.are_histories_equal().unwrap());
}

/// Test: Independent delays overlap
/// Given four unrelated tasks that each sleep
/// When the system runs
/// Then the run takes well under the sum of the delays
#[test]
fn test_independent_delays_overlap() {
    let delay = Duration::from_millis(250);
    let tasks = ["a", "b", "c", "d"]
        .iter()
        .map(|name| {
            Task::new(
                *name,
                vec![
                    Instruction::delay(delay),
                    Instruction::assign(*name, 1).unwrap(),
                ],
            )
            .unwrap()
        })
        .collect();
    let mut system = System::new("sleepy", tasks).unwrap();

    let start = Instant::now();
    system.run(1).unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= delay);
    assert!(elapsed < delay * 3, "took {:?}", elapsed);
    assert_eq!(system.disconnected_final_tasks().len(), 4);
}

/// Test: Ordered delays do not overlap
#[test]
fn test_chained_delays_are_sequential() {
    let delay = Duration::from_millis(100);
    let mut system = System::new(
        "chain",
        vec![
            Task::new("a", vec![Instruction::delay(delay)]).unwrap(),
            Task::new("b", vec![Instruction::delay(delay)]).unwrap().depends_on("a"),
            Task::new("c", vec![Instruction::delay(delay)]).unwrap().depends_on("b"),
        ],
    )
    .unwrap();
    system.run(1).unwrap();
    assert!(system.elapsed()[0] >= delay * 3);
}

/// Test: A failure stops every component
/// Given two unrelated components, one failing at once and one with a slow first task
/// When the system runs
/// Then the slow component starts nothing once the failure is known
#[test]
fn test_failure_stops_other_components() {
    let mut system = System::new(
        "split",
        vec![
            Task::new("a", vec![Instruction::assign("x", "ghost").unwrap()]).unwrap(),
            Task::new(
                "b",
                vec![
                    Instruction::delay(Duration::from_millis(300)),
                    Instruction::assign("y", 1).unwrap(),
                ],
            )
            .unwrap(),
            Task::new("c", vec![Instruction::assign("z", 2).unwrap()])
                .unwrap()
                .depends_on("b"),
        ],
    )
    .unwrap();
    assert_eq!(system.disconnected_final_tasks().len(), 2);

    let (result, events) = run_with_log(&mut system, 1);
    assert!(matches!(result, Err(Error::UninitializedVariableRead(ref cell)) if cell == "ghost"));
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, SchedulerEvent::TaskStarted { task } if task.to_string() == "c")),
        "c was dispatched after a failed"
    );
    assert_eq!(system.run_count(), 0);
}
