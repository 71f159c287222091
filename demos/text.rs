use std::borrow::Cow;

use synthpipe::{
    CachedExecutor, Payload, Repository, RunConfig, SINK, SOURCE, TaskContext, TaskResult, Tags,
    TypedTask, tags, task_fn,
};

// -----------------------------------------------------------------------------
// Text processing example
//
// A handful of small text tasks are registered once. The repository works out
// every way of chaining them from raw input to a finished result, and the
// executor runs all of those chains while computing each shared step once.
// -----------------------------------------------------------------------------

/// Splits text into lowercase words.
struct Tokenize;

impl TypedTask for Tokenize {
    type Input = String;
    type Output = Vec<String>;

    fn input_types(&self) -> Tags {
        tags([SOURCE])
    }

    fn output_types(&self) -> Tags {
        tags(["words"])
    }

    fn run(&self, _: &TaskContext<'_>, input: Option<&String>) -> TaskResult<Vec<String>> {
        let text = input.ok_or_else(|| anyhow::anyhow!("no text given"))?;

        Ok(text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase)
            .collect())
    }
}

/// Drops words shorter than the configured minimum.
struct Filter;

impl TypedTask for Filter {
    type Input = Vec<String>;
    type Output = Vec<String>;

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("FilterShort")
    }

    fn input_types(&self) -> Tags {
        tags(["words"])
    }

    fn output_types(&self) -> Tags {
        tags(["words"])
    }

    fn run(&self, ctx: &TaskContext<'_>, input: Option<&Vec<String>>) -> TaskResult<Vec<String>> {
        let min: usize = ctx.config("min_len")?.unwrap_or(3);

        Ok(input
            .into_iter()
            .flatten()
            .filter(|word| word.len() >= min)
            .cloned()
            .collect())
    }
}

fn main() -> anyhow::Result<()> {
    synthpipe::init_logging()?;

    let mut repo = Repository::new();
    repo.register(Tokenize)?
        .register(Filter)?
        .register(task_fn("Count", ["words"], [SINK], |_, words: Option<&Vec<String>>| {
            Ok(words.map(Vec::len).unwrap_or(0))
        }))?
        .register(task_fn("Join", ["words"], [SINK], |_, words: Option<&Vec<String>>| {
            Ok(words.map(|words| words.join(" ")).unwrap_or_default())
        }))?;

    repo.build_tree(4)?;
    println!("{}", repo.render_tree()?);

    let mut executor = CachedExecutor::new(repo.build_pipelines()?).verbose(true);
    let input = Payload::new(String::from("The quick brown fox jumps over a lazy dog"));
    let config = RunConfig::from_json(r#"{ "min_len": 4 }"#)?;

    let report = executor.run(&input, Some(&config));
    println!("{report}");

    for result in report.successes() {
        let names: Vec<&str> = result.tasks().iter().map(AsRef::as_ref).collect();
        let output = result
            .output_as::<String>()
            .cloned()
            .or_else(|| result.output_as::<usize>().map(ToString::to_string))
            .unwrap_or_default();

        println!("{} => {}", names.join(" > "), output);
    }

    // A second executor seeded with the first one's cache runs nothing.
    let mut warm = CachedExecutor::new(repo.build_pipelines()?)
        .with_cache(executor.into_cache());
    let report = warm.run(&input, Some(&config));
    println!(
        "warm start: {} executed, {} cache hits",
        report.stats.executed, report.stats.hits
    );

    Ok(())
}
