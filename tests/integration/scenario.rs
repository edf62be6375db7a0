//! The six-task demonstration system under every schedule.

use detsched::{linearize, maximize_parallelism, System};

use crate::fixtures::{edges, name, scenario, task_names};

fn assert_final_state(system: &System) {
    let snapshot = system.histories().last().expect("system has run");
    assert_eq!(snapshot["x"].value, Some(30), "{}", system.name());
    assert_eq!(snapshot["y"].value, Some(10), "{}", system.name());
    assert_eq!(snapshot["z"].value, Some(50), "{}", system.name());
    assert_eq!(snapshot["o"].value, Some(1000), "{}", system.name());
    assert_eq!(system.history_of("z"), Some(&[10, 50][..]));
    assert_eq!(system.history_of("o"), Some(&[100, 1000][..]));
}

/// Test: Declared schedule
/// Given the demonstration system
/// When it runs once
/// Then x=30, y=10, z=50, o=1000
#[test]
fn test_scenario_declared_schedule() {
    let mut system = scenario();
    system.run(1).unwrap();
    assert_eq!(system.run_count(), 1);
    assert_eq!(system.elapsed().len(), 1);
    assert_final_state(&system);
}

/// Test: Sequential schedule
/// Given the linearized demonstration system
/// When it runs
/// Then the order is level by level and the final state is unchanged
#[test]
fn test_scenario_sequential_schedule() {
    let mut linear = linearize(&scenario()).unwrap();
    assert_eq!(linear.name(), "System - Sequential");
    assert_eq!(linear.dependency_count(), 5);
    let layers: Vec<Vec<String>> = linear
        .get_layers()
        .iter()
        .map(|layer| layer.iter().map(|t| t.name().to_string()).collect())
        .collect();
    let flat: Vec<String> = layers.into_iter().flatten().collect();
    assert_eq!(flat, vec!["A", "B", "C", "D", "E", "F"]);

    linear.run(2).unwrap();
    assert_final_state(&linear);
}

/// Test: Parallelized schedule
/// Given the demonstration system
/// When parallelism is maximized
/// Then only the orderings on z and o remain
#[test]
fn test_scenario_parallel_schedule() {
    let mut parallel = maximize_parallelism(&scenario()).unwrap();
    assert_eq!(parallel.name(), "System - Parallelized");
    let kept: Vec<(String, String)> = edges(&parallel)
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();
    assert_eq!(
        kept,
        vec![
            ("C".to_string(), "D".to_string()),
            ("E".to_string(), "F".to_string()),
        ]
    );
    assert!(parallel.is_deterministic());

    parallel.run(3).unwrap();
    assert!(parallel.are_histories_equal().unwrap());
    assert_final_state(&parallel);
}

/// Test: Cross-schedule equivalence
/// Given the declared, sequential and parallel systems after one run each
/// When they are compared pairwise
/// Then every pair is equivalent
#[test]
fn test_scenario_schedules_are_equivalent() {
    let mut original = scenario();
    let mut linear = linearize(&original).unwrap();
    let mut parallel = maximize_parallelism(&original).unwrap();
    for system in [&mut original, &mut linear, &mut parallel] {
        system.run(1).unwrap();
    }
    assert!(original.is_equivalent(&linear).unwrap());
    assert!(original.is_equivalent(&parallel).unwrap());
    assert!(linear.is_equivalent(&parallel).unwrap());
}

/// Test: Transforms leave the source untouched
#[test]
fn test_scenario_transforms_copy_tasks() {
    let original = scenario();
    let before = edges(&original);
    let _ = linearize(&original).unwrap();
    let _ = maximize_parallelism(&original).unwrap();
    assert_eq!(edges(&original), before);
    assert_eq!(original.run_count(), 0);
    assert_eq!(task_names(&original).len(), 6);
    assert!(original
        .get_task(&name("F"))
        .unwrap()
        .dependencies()
        .contains(&name("D")));
}

/// Test: Snapshot serialization
/// Given a run of the demonstration system
/// When the last snapshot is serialized
/// Then every cell carries its value and history
#[test]
fn test_scenario_snapshot_json() {
    let mut system = scenario();
    system.run(1).unwrap();
    let json = serde_json::to_value(system.histories().last().unwrap()).unwrap();
    assert_eq!(json["z"]["value"], 50);
    assert_eq!(json["z"]["history"], serde_json::json!([10, 50]));
    assert_eq!(json["x"]["history"], serde_json::json!([30]));
}

/// Test: Graphviz rendering lists every task
#[test]
fn test_scenario_dot_output() {
    let dot = scenario().to_dot();
    assert!(dot.starts_with("digraph"));
    for task in ["A", "B", "C", "D", "E", "F"] {
        assert!(dot.contains(&format!("label=\"{}", task)), "missing {}", task);
    }
}
