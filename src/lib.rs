#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod core;
mod error;
pub mod executor;
mod pipeline;
mod repository;
mod task;
pub mod tree;
mod utils;

pub use crate::core::{
    ArcStr, Dynamic, Hash32, Payload, RunConfig, SINK, SOURCE, Tag, Tags, TaskContext, tags,
};
pub use crate::error::{ExecutionError, PipeError, RuntimeError};
pub use crate::executor::{CacheStats, CachedExecutor, Outcome, PipelineResult, Report};
pub use crate::pipeline::{Pipeline, PipelineId};
pub use crate::repository::Repository;
pub use crate::task::{FnTask, Root, Task, TaskRef, TaskResult, TypedTask, task_fn};
pub use crate::tree::Tree;

#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
