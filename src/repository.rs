use crate::error::PipeError;
use crate::pipeline::Pipeline;
use crate::task::{Task, TaskRef};
use crate::tree::Tree;

/// A library of registered tasks and the synthesis tree built from it.
///
/// Tasks are kept in registration order, which is also the order in which
/// candidate children are tried while expanding the tree. Because of that,
/// [`Repository::build_pipelines`] always enumerates pipelines in the same
/// order for the same library.
///
/// ```
/// use synthpipe::{Repository, SINK, SOURCE, task_fn};
///
/// let mut repo = Repository::new();
/// repo.register(task_fn("Parse", [SOURCE], ["ast"], |_, _: Option<&()>| Ok(())))?;
/// repo.register(task_fn("Print", ["ast"], [SINK], |_, _: Option<&()>| Ok(())))?;
///
/// repo.build_tree(8)?;
/// let pipelines = repo.build_pipelines()?;
/// assert_eq!(pipelines.len(), 1);
/// # Ok::<(), synthpipe::PipeError>(())
/// ```
#[derive(Debug, Default)]
pub struct Repository {
    tasks: Vec<TaskRef>,
    tree: Option<Tree>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository from existing task references.
    pub fn with_tasks(tasks: impl IntoIterator<Item = TaskRef>) -> Result<Self, PipeError> {
        let mut repo = Self::new();
        for task in tasks {
            repo.insert(task)?;
        }
        Ok(repo)
    }

    /// Registers a task under its own name.
    pub fn register<T>(&mut self, task: T) -> Result<&mut Self, PipeError>
    where
        T: Task + 'static,
    {
        self.insert(TaskRef::new(task))
    }

    /// Registers a task under an explicit name.
    pub fn register_as<T>(&mut self, name: &str, task: T) -> Result<&mut Self, PipeError>
    where
        T: Task + 'static,
    {
        self.insert(TaskRef::named(name, task))
    }

    /// Adds a task reference. Any previously built tree is discarded, since
    /// it no longer reflects the library.
    pub fn insert(&mut self, task: TaskRef) -> Result<&mut Self, PipeError> {
        if self.get(task.name()).is_some() {
            return Err(PipeError::DuplicateTask(task.name_arc().clone()));
        }

        tracing::debug!("Registered task '{}'", task.name());
        self.tasks.push(task);
        self.tree = None;
        Ok(self)
    }

    pub fn tasks(&self) -> &[TaskRef] {
        &self.tasks
    }

    pub fn get(&self, name: &str) -> Option<&TaskRef> {
        self.tasks.iter().find(|task| task.name() == name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Synthesizes the tree of every type-compatible chain from a source to
    /// a sink, replacing any previous one. Nodes deeper than `max_depth` are
    /// not expanded, so a pipeline holds at most `max_depth + 1` tasks.
    pub fn build_tree(&mut self, max_depth: usize) -> Result<&Tree, PipeError> {
        self.tree = None;
        let tree = Tree::build(&self.tasks, max_depth)?;
        Ok(&*self.tree.insert(tree))
    }

    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    /// One pipeline per leaf of the built tree, in depth-first order.
    pub fn build_pipelines(&self) -> Result<Vec<Pipeline>, PipeError> {
        let tree = self.tree.as_ref().ok_or(PipeError::TreeNotBuilt)?;

        tree.paths().into_iter().map(Pipeline::new).collect()
    }

    /// Box-drawing rendering of the built tree.
    pub fn render_tree(&self) -> Result<String, PipeError> {
        self.tree
            .as_ref()
            .map(ToString::to_string)
            .ok_or(PipeError::TreeNotBuilt)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::core::{Payload, SINK, SOURCE};
    use crate::executor::CachedExecutor;
    use crate::task::task_fn;

    fn stub(name: &'static str, inputs: &[&'static str], outputs: &[&'static str]) -> TaskRef {
        TaskRef::named(
            name,
            task_fn(
                name,
                inputs.to_vec(),
                outputs.to_vec(),
                move |_, input: Option<&String>| {
                    Ok(format!("{}{}", input.cloned().unwrap_or_default(), name))
                },
            ),
        )
    }

    fn chains(pipelines: &[Pipeline]) -> Vec<Vec<&str>> {
        pipelines
            .iter()
            .map(|pipeline| pipeline.iter().map(TaskRef::name).collect())
            .collect()
    }

    #[test]
    fn test_duplicate_task() {
        let mut repo = Repository::new();
        repo.insert(stub("A", &[SOURCE], &[SINK])).unwrap();

        let err = repo.insert(stub("A", &["x"], &[SINK])).unwrap_err();
        assert!(matches!(err, PipeError::DuplicateTask(name) if &*name == "A"));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_closure_tasks_keep_their_names() {
        let mut repo = Repository::new();
        repo.register(task_fn("Load", [SOURCE], ["x"], |_, _: Option<&()>| Ok(())))
            .unwrap()
            .register(task_fn("Save", ["x"], [SINK], |_, _: Option<&()>| Ok(())))
            .unwrap();

        assert_eq!(repo.len(), 2);
        assert!(repo.get("Load").is_some());
        assert!(repo.get("Save").is_some());

        repo.build_tree(4).unwrap();
        assert_eq!(
            repo.render_tree().unwrap(),
            "└── Root\n    └── Load\n        └── Save\n"
        );
    }

    #[test]
    fn test_pipelines_require_tree() {
        let mut repo = Repository::with_tasks([stub("A", &[SOURCE], &[SINK])]).unwrap();
        assert!(matches!(repo.build_pipelines(), Err(PipeError::TreeNotBuilt)));
        assert!(matches!(repo.render_tree(), Err(PipeError::TreeNotBuilt)));

        repo.build_tree(4).unwrap();
        assert_eq!(repo.build_pipelines().unwrap().len(), 1);

        // registering invalidates the tree
        repo.insert(stub("B", &[SOURCE], &[SINK])).unwrap();
        assert!(repo.tree().is_none());
        assert!(matches!(repo.build_pipelines(), Err(PipeError::TreeNotBuilt)));
    }

    #[test]
    fn test_no_entry_points() {
        let mut repo = Repository::with_tasks([stub("A", &["x"], &[SINK])]).unwrap();
        assert!(matches!(repo.build_tree(4), Err(PipeError::NoEntryPoints)));
        assert!(repo.tree().is_none());
    }

    #[test]
    fn test_unreachable_sink() {
        let mut repo = Repository::with_tasks([stub("A", &[SOURCE], &["x"])]).unwrap();
        assert!(matches!(repo.build_tree(4), Err(PipeError::EmptyTree)));
    }

    #[test]
    fn test_branching_library() {
        let mut repo = Repository::with_tasks([
            stub("A", &[SOURCE], &["x"]),
            stub("B", &["x"], &[SINK]),
            stub("C", &["x"], &[SINK]),
        ])
        .unwrap();

        repo.build_tree(8).unwrap();
        let pipelines = repo.build_pipelines().unwrap();

        assert_eq!(chains(&pipelines), vec![vec!["A", "B"], vec!["A", "C"]]);
        assert_eq!(
            repo.render_tree().unwrap(),
            "└── Root\n    └── A\n        ├── B\n        └── C\n"
        );
    }

    #[test]
    fn test_enumeration_is_deterministic() {
        let library = || {
            Repository::with_tasks([
                stub("A", &[SOURCE], &["x", "y"]),
                stub("B", &["x"], &["y", SINK]),
                stub("C", &["y"], &[SINK]),
                stub("D", &[SOURCE, "y"], &[SINK]),
            ])
            .unwrap()
        };

        let mut first = library();
        let mut second = library();
        first.build_tree(6).unwrap();
        second.build_tree(6).unwrap();

        assert_eq!(
            chains(&first.build_pipelines().unwrap()),
            chains(&second.build_pipelines().unwrap())
        );
    }

    #[test]
    fn test_end_to_end_shares_prefix() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let mut repo = Repository::new();
        repo.register_as(
            "A",
            task_fn("A", [SOURCE], ["x"], move |_, input: Option<&String>| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(format!("{}A", input.cloned().unwrap_or_default()))
            }),
        )
        .unwrap()
        .insert(stub("B", &["x"], &[SINK]))
        .unwrap()
        .insert(stub("C", &["x"], &[SINK]))
        .unwrap();

        repo.build_tree(8).unwrap();
        let mut executor = CachedExecutor::new(repo.build_pipelines().unwrap());
        let report = executor.run(&Payload::new(String::from("$")), None);

        let outputs: Vec<_> = report
            .iter()
            .map(|result| result.output_as::<String>().cloned().unwrap())
            .collect();

        assert_eq!(outputs, vec!["$AB", "$AC"]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
