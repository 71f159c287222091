use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use uuid::Uuid;

use crate::core::{ArcStr, Dynamic, RunConfig, TaskContext, Tags, overlaps};
use crate::error::PipeError;
use crate::task::{Task, TaskRef, TaskResult};

/// Unique identifier of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(Uuid);

impl PipelineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 characters of the id, for display.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for PipelineId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for PipelineId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for PipelineId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// An ordered, type-consistent sequence of tasks.
///
/// Each task must accept at least one of the types produced by the task
/// before it. A pipeline is itself a [`Task`]: it accepts what its first task
/// accepts and produces what its last task produces, so pipelines can be
/// registered into a repository and nested.
#[derive(Clone)]
pub struct Pipeline {
    id: PipelineId,
    tasks: Vec<TaskRef>,
}

impl Pipeline {
    pub fn new(tasks: impl IntoIterator<Item = TaskRef>) -> Result<Self, PipeError> {
        Self::with_id(PipelineId::new(), tasks)
    }

    pub fn with_id(
        id: PipelineId,
        tasks: impl IntoIterator<Item = TaskRef>,
    ) -> Result<Self, PipeError> {
        let mut pipeline = Self {
            id,
            tasks: Vec::new(),
        };
        pipeline.extend(tasks)?;
        Ok(pipeline)
    }

    /// Appends a task, checking it accepts what the current last task
    /// produces. The first task is always accepted.
    pub fn push(&mut self, task: TaskRef) -> Result<(), PipeError> {
        if let Some(last) = self.tasks.last()
            && !overlaps(&last.output_types(), &task.input_types())
        {
            return Err(PipeError::TypeMismatch {
                task: task.name_arc().clone(),
                previous: last.name_arc().clone(),
            });
        }

        self.tasks.push(task);
        Ok(())
    }

    pub fn extend(&mut self, tasks: impl IntoIterator<Item = TaskRef>) -> Result<(), PipeError> {
        for task in tasks {
            self.push(task)?;
        }
        Ok(())
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn tasks(&self) -> &[TaskRef] {
        &self.tasks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TaskRef> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Identities of the tasks, in order.
    pub fn names(&self) -> Vec<ArcStr> {
        self.tasks
            .iter()
            .map(|task| task.name_arc().clone())
            .collect()
    }

    /// Input types of the first task, empty for an empty pipeline.
    pub fn input_types(&self) -> Tags {
        self.tasks
            .first()
            .map(TaskRef::input_types)
            .unwrap_or_default()
    }

    /// Output types of the last task, empty for an empty pipeline.
    pub fn output_types(&self) -> Tags {
        self.tasks
            .last()
            .map(TaskRef::output_types)
            .unwrap_or_default()
    }

    /// Runs every task in order, without caching.
    ///
    /// The run configuration, when present, is visible to every task through
    /// its [`TaskContext`]. An empty configuration is passed on as `None`.
    /// An empty pipeline hands back its input.
    pub fn run(
        &self,
        input: Option<Dynamic>,
        run_config: Option<&RunConfig>,
    ) -> TaskResult<Option<Dynamic>> {
        let run_config = run_config.filter(|config| !config.is_empty());
        let mut current = input;

        for task in &self.tasks {
            let span = tracing::debug_span!("task", name = task.name());
            let _enter = span.enter();
            let context = TaskContext::with_span(run_config, span.clone());

            let output = task
                .run(&context, current.as_ref())
                .with_context(|| format!("Task '{}' failed", task.name()))?;

            current = Some(output);
        }

        Ok(current)
    }
}

impl Task for Pipeline {
    fn name(&self) -> Cow<'_, str> {
        let names: Vec<&str> = self.tasks.iter().map(TaskRef::name).collect();
        Cow::Owned(format!("Pipeline[{}]", names.join(">")))
    }

    fn input_types(&self) -> Tags {
        Pipeline::input_types(self)
    }

    fn output_types(&self) -> Tags {
        Pipeline::output_types(self)
    }

    fn output_type_name(&self) -> &'static str {
        self.tasks
            .last()
            .map(|task| task.task().output_type_name())
            .unwrap_or("()")
    }

    fn run(&self, context: &TaskContext<'_>, input: Option<&Dynamic>) -> TaskResult<Dynamic> {
        let output = Pipeline::run(self, input.cloned(), context.run_config())?;
        Ok(output.unwrap_or_else(|| Arc::new(())))
    }
}

impl<'a> IntoIterator for &'a Pipeline {
    type Item = &'a TaskRef;
    type IntoIter = std::slice::Iter<'a, TaskRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

impl Display for Pipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.tasks.iter().map(TaskRef::name).collect();
        write!(f, "Pipeline(tasks=[{}])", names.join(", "))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("tasks", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SINK, SOURCE, tags};
    use crate::task::task_fn;

    fn append(name: &'static str, inputs: &[&'static str], outputs: &[&'static str]) -> TaskRef {
        TaskRef::named(
            name,
            task_fn(name, inputs.to_vec(), outputs.to_vec(), move |_, input: Option<&String>| {
                Ok(format!("{}{}", input.cloned().unwrap_or_default(), name))
            }),
        )
    }

    #[test]
    fn test_type_mismatch() {
        let mut pipeline = Pipeline::new([append("A", &[SOURCE], &["x"])]).unwrap();
        let err = pipeline.push(append("B", &["y"], &[SINK])).unwrap_err();

        match err {
            PipeError::TypeMismatch { task, previous } => {
                assert_eq!(&*task, "B");
                assert_eq!(&*previous, "A");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_types_delegate_to_ends() {
        let pipeline = Pipeline::new([
            append("A", &[SOURCE], &["x"]),
            append("B", &["x"], &[SINK]),
        ])
        .unwrap();

        assert_eq!(pipeline.input_types(), tags([SOURCE]));
        assert_eq!(pipeline.output_types(), tags([SINK]));

        let empty = Pipeline::new(Vec::new()).unwrap();
        assert!(empty.input_types().is_empty());
        assert!(empty.output_types().is_empty());
    }

    #[test]
    fn test_run_feeds_tasks_in_order() {
        let pipeline = Pipeline::new([
            append("A", &[SOURCE], &["x"]),
            append("B", &["x"], &["y"]),
            append("C", &["y"], &[SINK]),
        ])
        .unwrap();

        let output = pipeline
            .run(Some(Arc::new(">".to_string())), None)
            .unwrap()
            .unwrap();
        assert_eq!(output.downcast_ref::<String>().unwrap(), ">ABC");
    }

    #[test]
    fn test_run_config_reaches_every_task() {
        let suffix = |name: &'static str, inputs: &[&'static str], outputs: &[&'static str]| {
            TaskRef::new(task_fn(
                name,
                inputs.to_vec(),
                outputs.to_vec(),
                |ctx, input: Option<&String>| {
                    let suffix: String = ctx.config("suffix")?.unwrap_or_default();
                    Ok(format!("{}{}", input.cloned().unwrap_or_default(), suffix))
                },
            ))
        };

        let pipeline = Pipeline::new([
            suffix("First", &[SOURCE], &["x"]),
            suffix("Second", &["x"], &[SINK]),
        ])
        .unwrap();
        let config = RunConfig::new().with("suffix", "!");

        let output = pipeline.run(None, Some(&config)).unwrap().unwrap();
        assert_eq!(output.downcast_ref::<String>().unwrap(), "!!");
    }

    #[test]
    fn test_empty_run_config_is_absent() {
        let has_config = TaskRef::new(task_fn(
            "HasConfig",
            [SOURCE],
            [SINK],
            |ctx, _: Option<&()>| Ok(ctx.run_config().is_some()),
        ));
        let pipeline = Pipeline::new([has_config]).unwrap();

        let output = pipeline.run(None, Some(&RunConfig::new())).unwrap().unwrap();
        assert_eq!(output.downcast_ref::<bool>(), Some(&false));

        let config = RunConfig::new().with("key", 1);
        let output = pipeline.run(None, Some(&config)).unwrap().unwrap();
        assert_eq!(output.downcast_ref::<bool>(), Some(&true));
    }

    #[test]
    fn test_run_error_names_task() {
        let failing = TaskRef::named(
            "Broken",
            task_fn("Broken", [SOURCE], [SINK], |_, _: Option<&()>| -> TaskResult<()> {
                anyhow::bail!("boom")
            }),
        );
        let pipeline = Pipeline::new([failing]).unwrap();
        let err = pipeline.run(None, None).unwrap_err();
        assert!(format!("{err:#}").contains("Task 'Broken' failed: boom"));
    }

    #[test]
    fn test_nested_pipeline() {
        let inner = Pipeline::new([
            append("A", &[SOURCE], &["x"]),
            append("B", &["x"], &["y"]),
        ])
        .unwrap();

        let outer = Pipeline::new([
            TaskRef::named("Inner", inner),
            append("C", &["y"], &[SINK]),
        ])
        .unwrap();

        let output = outer.run(None, None).unwrap().unwrap();
        assert_eq!(output.downcast_ref::<String>().unwrap(), "ABC");
    }

    #[test]
    fn test_display() {
        let pipeline = Pipeline::new([
            append("A", &[SOURCE], &["x"]),
            append("B", &["x"], &[SINK]),
        ])
        .unwrap();

        assert_eq!(pipeline.to_string(), "Pipeline(tasks=[A, B])");
        assert_eq!(Task::name(&pipeline), "Pipeline[A>B]");
        assert_eq!(pipeline.id().short().len(), 8);
        assert_eq!(
            pipeline.id(),
            pipeline.id().to_string().parse::<PipelineId>().unwrap()
        );
    }
}
