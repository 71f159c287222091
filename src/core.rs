use std::any::Any;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipeError;

/// A type-erased, thread-safe container.
pub type Dynamic = Arc<dyn Any + Send + Sync>;

/// Atomic reference-counted string type used for identifiers.
pub type ArcStr = Arc<str>;

/// An opaque label naming a category of data a task accepts or produces.
pub type Tag = Cow<'static, str>;

/// Ordered set of tags. Ordering keeps rendering and hashing stable.
pub type Tags = BTreeSet<Tag>;

/// Reserved tag marking valid pipeline entry types.
pub const SOURCE: &str = "source";

/// Reserved tag marking valid pipeline exit types.
pub const SINK: &str = "sink";

/// Collects anything string-like into a [`Tags`] set.
///
/// ```
/// let set = synthpipe::tags(["source", "text"]);
/// assert!(set.contains("text"));
/// ```
pub fn tags<I, T>(iter: I) -> Tags
where
    I: IntoIterator<Item = T>,
    T: Into<Tag>,
{
    iter.into_iter().map(Into::into).collect()
}

/// Two tag sets are linkable when they share at least one tag.
pub(crate) fn overlaps(outputs: &Tags, inputs: &Tags) -> bool {
    !outputs.is_disjoint(inputs)
}

/// A 32-byte BLAKE3 hash.
///
/// Used as the fingerprint of the initial input and run configuration, and
/// as the backing value of cache signatures.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for &byte in self.0.iter() {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl std::fmt::Display for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Adapter exposing BLAKE3 through [`std::hash::Hasher`], so any `Hash`
/// value can be fingerprinted into a [`Hash32`].
#[derive(Default)]
pub(crate) struct Blake3Hasher(blake3::Hasher);

impl From<Blake3Hasher> for Hash32 {
    fn from(value: Blake3Hasher) -> Self {
        let bytes: [u8; 32] = value.0.finalize().into();
        Hash32::from(bytes)
    }
}

impl Hasher for Blake3Hasher {
    fn finish(&self) -> u64 {
        let mut output = [0u8; 8];
        self.0.finalize_xof().fill(&mut output);
        u64::from_le_bytes(output)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }
}

/// Run-scoped configuration shared by every task of a run.
///
/// Keys are kept sorted, which makes the fingerprint independent of the
/// order in which values were set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunConfig {
    values: BTreeMap<String, Value>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object into a configuration.
    pub fn from_json(text: &str) -> Result<Self, PipeError> {
        serde_json::from_str(text).map_err(PipeError::InvalidConfig)
    }

    /// Inserts a value, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserializes the value under `key` into `T`.
    pub fn get_as<T>(&self, key: &str) -> Result<Option<T>, PipeError>
    where
        T: DeserializeOwned,
    {
        self.values
            .get(key)
            .map(|value| T::deserialize(value).map_err(PipeError::InvalidConfig))
            .transpose()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Deterministic BLAKE3 fingerprint of the configuration.
    pub fn fingerprint(&self) -> Hash32 {
        let mut hasher = Blake3Hasher::default();
        hasher.write_usize(self.values.len());
        for (key, value) in &self.values {
            key.hash(&mut hasher);
            hash_value(&mut hasher, value);
        }
        hasher.into()
    }
}

/// Walks a JSON value writing a tagged, unambiguous encoding.
fn hash_value(hasher: &mut Blake3Hasher, value: &Value) {
    match value {
        Value::Null => hasher.write_u8(0),
        Value::Bool(b) => {
            hasher.write_u8(1);
            b.hash(hasher);
        }
        Value::Number(n) => {
            hasher.write_u8(2);
            n.to_string().hash(hasher);
        }
        Value::String(s) => {
            hasher.write_u8(3);
            s.hash(hasher);
        }
        Value::Array(items) => {
            hasher.write_u8(4);
            hasher.write_usize(items.len());
            for item in items {
                hash_value(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.write_u8(5);
            hasher.write_usize(map.len());
            // serde_json's default map is ordered by key
            for (key, item) in map {
                key.hash(hasher);
                hash_value(hasher, item);
            }
        }
    }
}

/// Initial input handed to an executor, paired with its fingerprint.
///
/// The fingerprint is what makes cache signatures depend on the input, so
/// the value must be `Hash`.
#[derive(Clone)]
pub struct Payload {
    data: Option<Dynamic>,
    hash: Hash32,
}

impl Payload {
    pub fn new<T>(value: T) -> Self
    where
        T: Hash + Send + Sync + 'static,
    {
        let mut hasher = Blake3Hasher::default();
        std::any::type_name::<T>().hash(&mut hasher);
        value.hash(&mut hasher);

        Self {
            data: Some(Arc::new(value)),
            hash: hasher.into(),
        }
    }

    /// No input; the first task of every pipeline receives `None`.
    pub fn empty() -> Self {
        Self {
            data: None,
            hash: Hash32::default(),
        }
    }

    pub fn data(&self) -> Option<&Dynamic> {
        self.data.as_ref()
    }

    pub fn fingerprint(&self) -> Hash32 {
        self.hash
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("present", &self.data.is_some())
            .field("hash", &self.hash)
            .finish()
    }
}

/// Context available to a task while it runs.
pub struct TaskContext<'a> {
    run_config: Option<&'a RunConfig>,
    /// Span of the currently running task.
    pub span: tracing::Span,
}

impl<'a> TaskContext<'a> {
    pub fn new(run_config: Option<&'a RunConfig>) -> Self {
        Self {
            run_config,
            span: tracing::Span::current(),
        }
    }

    pub(crate) fn with_span(run_config: Option<&'a RunConfig>, span: tracing::Span) -> Self {
        Self { run_config, span }
    }

    pub fn run_config(&self) -> Option<&'a RunConfig> {
        self.run_config
    }

    /// Typed lookup into the run configuration, `None` when either the
    /// configuration or the key is absent.
    pub fn config<T>(&self, key: &str) -> Result<Option<T>, PipeError>
    where
        T: DeserializeOwned,
    {
        match self.run_config {
            Some(config) => config.get_as(key),
            None => Ok(None),
        }
    }
}
