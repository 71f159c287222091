use std::sync::Arc;

pub use anyhow::Error as RuntimeError;
use thiserror::Error;

use crate::core::ArcStr;

/// Structural errors raised while assembling repositories, trees and
/// pipelines. These indicate a malformed task library or misuse of the API.
#[derive(Debug, Error)]
pub enum PipeError {
    #[error("Task '{0}' already exists in repository")]
    DuplicateTask(ArcStr),

    #[error("No entry points: no task accepts the '{tag}' input type", tag = crate::core::SOURCE)]
    NoEntryPoints,

    #[error("Tree is empty: no chain of tasks reaches the '{tag}' output type", tag = crate::core::SINK)]
    EmptyTree,

    #[error("Tree has not been built yet")]
    TreeNotBuilt,

    #[error("Task '{task}' cannot be added to the pipeline, its input types do not match the output types of '{previous}'")]
    TypeMismatch { task: ArcStr, previous: ArcStr },

    #[error("Task '{child}' cannot follow '{parent}', no output type of the parent is accepted by the child")]
    IncompatibleLink { parent: ArcStr, child: ArcStr },

    #[error("Invalid run configuration:\n{0}")]
    InvalidConfig(#[source] serde_json::Error),
}

/// A failure raised by a single task while a pipeline was running.
///
/// Cheap to clone, so results carrying it can be shared freely.
#[derive(Debug, Error, Clone)]
#[error("Task '{task}' failed: {cause:#}")]
pub struct ExecutionError {
    task: ArcStr,
    cause: Arc<anyhow::Error>,
}

impl ExecutionError {
    pub fn new(task: impl Into<ArcStr>, err: impl Into<anyhow::Error>) -> Self {
        Self {
            task: task.into(),
            cause: Arc::new(err.into()),
        }
    }

    /// Name of the task that failed.
    pub fn task(&self) -> &str {
        &self.task
    }

    /// The underlying cause reported by the task.
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}
