//! Sequential pipeline execution with prefix caching.

mod cache;
mod diagnostics;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::core::{Dynamic, Payload, RunConfig, TaskContext};
use crate::error::ExecutionError;
use crate::pipeline::Pipeline;

pub use cache::{Cache, CacheEntry, Signature};
pub use diagnostics::{CacheStats, Outcome, PipelineResult, Report};

/// Runs a batch of pipelines, reusing the output of every prefix already
/// computed for the same input and run configuration.
///
/// Pipelines run in the order they were given, tasks strictly one after
/// another. A failing or panicking task only fails its own pipeline; the
/// rest of the batch still runs. The cache lives as long as the executor and
/// can be handed to another one with [`CachedExecutor::into_cache`] and
/// [`CachedExecutor::with_cache`].
pub struct CachedExecutor {
    pipelines: Vec<Pipeline>,
    cache: Cache,
    verbose: bool,
}

impl CachedExecutor {
    pub fn new(pipelines: impl IntoIterator<Item = Pipeline>) -> Self {
        Self {
            pipelines: pipelines.into_iter().collect(),
            cache: Cache::new(),
            verbose: false,
        }
    }

    /// Seeds the executor with previously computed results.
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = cache;
        self
    }

    /// Logs every completed pipeline at `info` level.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn into_cache(self) -> Cache {
        self.cache
    }

    /// Runs every pipeline on `input`.
    ///
    /// An empty run configuration is treated the same as no configuration,
    /// so both share cache entries.
    pub fn run(&mut self, input: &Payload, run_config: Option<&RunConfig>) -> Report {
        let Self {
            pipelines,
            cache,
            verbose,
        } = self;

        let run_config = run_config.filter(|config| !config.is_empty());
        let seed = Signature::seed(input, run_config);
        let total = pipelines.len();

        let root_span = tracing::span!(Level::INFO, "run_pipelines", pipelines = total);
        root_span.pb_set_length(total as u64);
        match crate::utils::get_style_batch() {
            Ok(style) => root_span.pb_set_style(&style),
            Err(err) => tracing::warn!("Invalid progress style: {err}"),
        }
        root_span.pb_set_message("Running pipelines...");
        let _enter = root_span.enter();

        let mut report = Report::default();

        for (i, pipeline) in pipelines.iter().enumerate() {
            let span = tracing::span!(Level::INFO, "pipeline", id = %pipeline.id().short());
            span.pb_set_message(&pipeline.to_string());
            let _enter = span.enter();

            let outcome = match run_pipeline(
                pipeline,
                cache,
                seed,
                input.data(),
                run_config,
                &mut report.stats,
            ) {
                Ok((output, elapsed)) => {
                    if *verbose {
                        tracing::info!("Pipeline {}/{} completed in {:.2?}", i + 1, total, elapsed);
                    }
                    Outcome::Success { output, elapsed }
                }
                Err(err) => {
                    tracing::warn!("Pipeline {}/{} failed: {}", i + 1, total, err);
                    Outcome::Failure(err)
                }
            };

            report.insert(PipelineResult::new(pipeline.id(), pipeline.names(), outcome));
            root_span.pb_inc(1);
        }

        tracing::debug!(
            hits = report.stats.hits,
            executed = report.stats.executed,
            cached = cache.len(),
            "Batch finished"
        );

        report
    }
}

fn run_pipeline(
    pipeline: &Pipeline,
    cache: &mut Cache,
    seed: Signature,
    input: Option<&Dynamic>,
    run_config: Option<&RunConfig>,
    stats: &mut CacheStats,
) -> Result<(Dynamic, Duration), ExecutionError> {
    let mut signature = seed;
    let mut current = input.cloned();
    let mut total = Duration::ZERO;

    for task in pipeline {
        signature = signature.then(task.name());

        if let Some(entry) = cache.get(&signature) {
            tracing::debug!(task = task.name(), "Cache hit");
            current = Some(entry.output.clone());
            total += entry.elapsed;
            stats.hits += 1;
            continue;
        }

        let span = tracing::debug_span!("task", name = task.name());
        let _enter = span.enter();
        let context = TaskContext::with_span(run_config, span.clone());

        let start = Instant::now();
        let output = match catch_unwind(AssertUnwindSafe(|| task.run(&context, current.as_ref()))) {
            Ok(result) => result,
            Err(panic) => {
                let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    format!("Task panicked: {s}")
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    format!("Task panicked: {s}")
                } else {
                    String::from("Task panicked with unknown payload")
                };

                Err(anyhow::anyhow!(msg))
            }
        }
        .map_err(|err| ExecutionError::new(task.name_arc().clone(), err))?;
        let elapsed = start.elapsed();

        stats.executed += 1;
        total += elapsed;
        cache.insert(signature, CacheEntry::new(output.clone(), elapsed));
        current = Some(output);
    }

    let output = current.unwrap_or_else(|| Arc::new(()));
    Ok((output, total))
}
