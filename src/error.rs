use thiserror::Error;

use crate::core::task::TaskName;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("The dependency graph of {system} contains a cycle")]
    CyclicGraph { system: String },

    #[error("The system is not deterministic: {first} and {second} interfere")]
    NonDeterministic { first: TaskName, second: TaskName },

    #[error("Task {0} already exists")]
    DuplicateTaskName(TaskName),

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskName, dependency: TaskName },

    #[error("The variable {0} has not been initialized")]
    UninitializedVariableRead(String),

    #[error("System {0} has not been executed yet")]
    NotYetExecuted(String),

    #[error("At least {required} runs are needed, got {actual}")]
    InsufficientRuns { required: usize, actual: usize },

    #[error("Invalid instruction composition: {0}")]
    InvalidInstructionComposition(String),

    #[error("Division by zero in {0}")]
    DivisionByZero(String),

    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(String),

    #[error("Task {0} panicked during execution")]
    TaskPanicked(TaskName),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
