//! The task contract and its building blocks.
//!
//! A task declares which tags it accepts and which it produces, and knows how
//! to turn one value into another. The synthesis tree and the executor only
//! ever see the object-safe [`Task`] trait. Most implementations are easier to
//! write against [`TypedTask`], which fixes concrete input and output types;
//! a blanket implementation erases them, downcasting inputs on the way in and
//! boxing outputs on the way out.

use std::any::type_name;
use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::core::{ArcStr, Dynamic, SOURCE, TaskContext, Tags, tags};

/// Result from a single executed task.
pub type TaskResult<T> = anyhow::Result<T, anyhow::Error>;

/// Last path segment of a type name, generic arguments dropped.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// The core trait for all tasks.
///
/// This is the type-erased foundation which lets a repository hold tasks
/// with different input and output types. Implement [`TypedTask`] instead
/// unless you need to work with [`Dynamic`] values directly.
pub trait Task: Send + Sync {
    /// Stable display name, defaults to the implementation's type name.
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(short_type_name::<Self>())
    }

    fn input_types(&self) -> Tags;

    fn output_types(&self) -> Tags;

    /// Name of the concrete output type, for diagnostics.
    fn output_type_name(&self) -> &'static str {
        "dyn Any"
    }

    fn run(&self, context: &TaskContext<'_>, input: Option<&Dynamic>) -> TaskResult<Dynamic>;
}

/// A task with statically known input and output types.
pub trait TypedTask: Send + Sync {
    /// The concrete input type of this task.
    type Input: Send + Sync + 'static;
    /// The concrete output type of this task.
    type Output: Send + Sync + 'static;

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(short_type_name::<Self>())
    }

    fn input_types(&self) -> Tags;

    fn output_types(&self) -> Tags;

    fn run(&self, context: &TaskContext<'_>, input: Option<&Self::Input>)
    -> TaskResult<Self::Output>;
}

// A blanket implementation to automatically bridge the two. This is where the
// type erasure actually happens.
impl<T> Task for T
where
    T: TypedTask + 'static,
{
    fn name(&self) -> Cow<'_, str> {
        T::name(self)
    }

    fn input_types(&self) -> Tags {
        T::input_types(self)
    }

    fn output_types(&self) -> Tags {
        T::output_types(self)
    }

    fn output_type_name(&self) -> &'static str {
        type_name::<T::Output>()
    }

    fn run(&self, context: &TaskContext<'_>, input: Option<&Dynamic>) -> TaskResult<Dynamic> {
        let input = match input {
            Some(value) => Some(value.downcast_ref::<T::Input>().ok_or_else(|| {
                anyhow::anyhow!(
                    "Expected input of type {} but got something else",
                    type_name::<T::Input>()
                )
            })?),
            None => None,
        };

        // Call the typed method, then erase the result.
        Ok(Arc::new(T::run(self, context, input)?))
    }
}

/// A registered task: an identity paired with a shared implementation.
///
/// The identity is what the repository uses to detect duplicates and what
/// the executor uses to build cache signatures, so two `TaskRef`s with the
/// same name are considered the same task definition.
#[derive(Clone)]
pub struct TaskRef {
    name: ArcStr,
    task: Arc<dyn Task>,
}

impl TaskRef {
    /// Wraps a task using its own [`Task::name`] as the identity.
    pub fn new<T>(task: T) -> Self
    where
        T: Task + 'static,
    {
        let name = ArcStr::from(task.name().as_ref());
        Self {
            name,
            task: Arc::new(task),
        }
    }

    /// Wraps a task under an explicitly assigned identity.
    pub fn named<T>(name: impl Into<ArcStr>, task: T) -> Self
    where
        T: Task + 'static,
    {
        Self {
            name: name.into(),
            task: Arc::new(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &ArcStr {
        &self.name
    }

    pub fn task(&self) -> &Arc<dyn Task> {
        &self.task
    }

    pub fn input_types(&self) -> Tags {
        self.task.input_types()
    }

    pub fn output_types(&self) -> Tags {
        self.task.output_types()
    }

    /// Whether this task accepts the reserved source tag.
    pub fn is_entry_point(&self) -> bool {
        self.task.input_types().contains(SOURCE)
    }

    pub fn run(&self, context: &TaskContext<'_>, input: Option<&Dynamic>) -> TaskResult<Dynamic> {
        self.task.run(context, input)
    }
}

impl std::fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRef")
            .field("name", &self.name)
            .field("input_types", &self.task.input_types())
            .field("output_types", &self.task.output_types())
            .finish()
    }
}

/// Sentinel task seeding the synthesis tree. Accepts nothing and produces
/// only the source tag; its run forwards the input untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Root;

impl Task for Root {
    fn input_types(&self) -> Tags {
        Tags::new()
    }

    fn output_types(&self) -> Tags {
        tags([SOURCE])
    }

    fn run(&self, _: &TaskContext<'_>, input: Option<&Dynamic>) -> TaskResult<Dynamic> {
        Ok(input.cloned().unwrap_or_else(|| Arc::new(())))
    }
}

/// Task built from a closure, see [`task_fn`].
pub struct FnTask<I, O, F>
where
    F: Fn(&TaskContext<'_>, Option<&I>) -> TaskResult<O> + Send + Sync,
{
    name: Cow<'static, str>,
    inputs: Tags,
    outputs: Tags,
    callback: F,
    _phantom: PhantomData<fn(&I) -> O>,
}

impl<I, O, F> TypedTask for FnTask<I, O, F>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
    F: Fn(&TaskContext<'_>, Option<&I>) -> TaskResult<O> + Send + Sync,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.name.as_ref())
    }

    fn input_types(&self) -> Tags {
        self.inputs.clone()
    }

    fn output_types(&self) -> Tags {
        self.outputs.clone()
    }

    fn run(&self, context: &TaskContext<'_>, input: Option<&I>) -> TaskResult<O> {
        (self.callback)(context, input)
    }
}

/// Defines a task from its name, tag sets and a closure.
///
/// Closures have no usable type name, so the name is required. It becomes
/// the task's identity when registered with [`crate::Repository::register`].
///
/// ```
/// use synthpipe::{task_fn, Task};
///
/// let upper = task_fn("Upper", ["source"], ["text"], |_, input: Option<&String>| {
///     Ok(input.map(|s| s.to_uppercase()).unwrap_or_default())
/// });
///
/// assert_eq!(Task::name(&upper), "Upper");
/// ```
pub fn task_fn<I, O, F, A, B>(
    name: impl Into<Cow<'static, str>>,
    inputs: A,
    outputs: B,
    callback: F,
) -> FnTask<I, O, F>
where
    A: IntoIterator,
    A::Item: Into<crate::core::Tag>,
    B: IntoIterator,
    B::Item: Into<crate::core::Tag>,
    F: Fn(&TaskContext<'_>, Option<&I>) -> TaskResult<O> + Send + Sync,
{
    FnTask {
        name: name.into(),
        inputs: tags(inputs),
        outputs: tags(outputs),
        callback,
        _phantom: PhantomData,
    }
}
