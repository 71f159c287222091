use std::fmt::{Display, Formatter};
use std::time::Duration;

use indexmap::IndexMap;

use crate::core::{ArcStr, Dynamic};
use crate::error::ExecutionError;
use crate::pipeline::PipelineId;

/// How a single pipeline run ended.
#[derive(Clone, Debug)]
pub enum Outcome {
    Success {
        output: Dynamic,
        /// Sum of task times, cached tasks counted at their original cost.
        elapsed: Duration,
    },
    Failure(ExecutionError),
}

/// Result record of one pipeline.
#[derive(Clone, Debug)]
pub struct PipelineResult {
    id: PipelineId,
    tasks: Vec<ArcStr>,
    outcome: Outcome,
}

impl PipelineResult {
    pub(crate) fn new(id: PipelineId, tasks: Vec<ArcStr>, outcome: Outcome) -> Self {
        Self { id, tasks, outcome }
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// Identities of the pipeline's tasks, in order.
    pub fn tasks(&self) -> &[ArcStr] {
        &self.tasks
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// Final output, `None` if the pipeline failed.
    pub fn output(&self) -> Option<&Dynamic> {
        match &self.outcome {
            Outcome::Success { output, .. } => Some(output),
            Outcome::Failure(_) => None,
        }
    }

    /// Final output downcast to `T`.
    pub fn output_as<T: 'static>(&self) -> Option<&T> {
        self.output().and_then(|output| output.downcast_ref::<T>())
    }

    /// Total elapsed time, `None` if the pipeline failed.
    pub fn elapsed(&self) -> Option<Duration> {
        match &self.outcome {
            Outcome::Success { elapsed, .. } => Some(*elapsed),
            Outcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match &self.outcome {
            Outcome::Failure(error) => Some(error),
            Outcome::Success { .. } => None,
        }
    }
}

/// Cache usage during one executor run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Tasks whose output was taken from the cache.
    pub hits: usize,
    /// Tasks which were actually executed.
    pub executed: usize,
}

/// Results of an executor run, keyed by pipeline id in execution order.
#[derive(Debug, Default)]
pub struct Report {
    results: IndexMap<PipelineId, PipelineResult>,
    pub stats: CacheStats,
}

impl Report {
    pub(crate) fn insert(&mut self, result: PipelineResult) {
        self.results.insert(result.id, result);
    }

    pub fn get(&self, id: &PipelineId) -> Option<&PipelineResult> {
        self.results.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipelineResult> {
        self.results.values()
    }

    pub fn successes(&self) -> impl Iterator<Item = &PipelineResult> {
        self.iter().filter(|result| result.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &PipelineResult> {
        self.iter().filter(|result| !result.is_success())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_results(self) -> IndexMap<PipelineId, PipelineResult> {
        self.results
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for result in self.results.values() {
            let chain = result
                .tasks
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<&str>>()
                .join(" > ");

            match &result.outcome {
                Outcome::Success { elapsed, .. } => {
                    writeln!(f, "{} [{}] ok in {:.2?}", result.id.short(), chain, elapsed)?
                }
                Outcome::Failure(error) => {
                    writeln!(f, "{} [{}] failed: {}", result.id.short(), chain, error)?
                }
            }
        }

        writeln!(
            f,
            "{} pipelines, {} tasks executed, {} cache hits",
            self.results.len(),
            self.stats.executed,
            self.stats.hits
        )
    }
}
