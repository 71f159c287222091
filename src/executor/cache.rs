use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;

use crate::core::{Dynamic, Hash32, Payload, RunConfig};

/// Cache key for the output of a pipeline prefix.
///
/// A signature starts from the fingerprint of the initial input and run
/// configuration, and is extended by one task identity at a time. Extending
/// is order-sensitive, so two pipelines produce the same signature for a
/// prefix exactly when they share that prefix and were given the same input
/// and configuration.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(Hash32);

impl Signature {
    pub fn seed(payload: &Payload, run_config: Option<&RunConfig>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"input");
        hasher.update(payload.fingerprint().as_bytes());

        match run_config {
            Some(config) => {
                hasher.update(b"config");
                hasher.update(config.fingerprint().as_bytes());
            }
            None => {
                hasher.update(b"no-config");
            }
        }

        Self(hasher.finalize().into())
    }

    /// Signature of this prefix followed by `task`.
    pub fn then(&self, task: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.0.as_bytes());
        hasher.update(&(task.len() as u64).to_le_bytes());
        hasher.update(task.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Signature of a whole prefix, handy for seeding a cache by hand.
    pub fn of_prefix<'a>(
        payload: &Payload,
        run_config: Option<&RunConfig>,
        tasks: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        tasks
            .into_iter()
            .fold(Self::seed(payload, run_config), |signature, task| {
                signature.then(task)
            })
    }

    pub fn hash(&self) -> Hash32 {
        self.0
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", self.0)
    }
}

/// Output of a task together with the time it originally took to compute.
#[derive(Clone)]
pub struct CacheEntry {
    pub output: Dynamic,
    pub elapsed: Duration,
}

impl CacheEntry {
    pub fn new(output: Dynamic, elapsed: Duration) -> Self {
        Self { output, elapsed }
    }
}

impl Debug for CacheEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("elapsed", &self.elapsed)
            .finish_non_exhaustive()
    }
}

/// In-memory store of prefix outputs. Entries are never evicted.
///
/// A cache can be seeded by hand, so that matching prefixes are never run:
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use synthpipe::Payload;
/// use synthpipe::executor::{Cache, CacheEntry, Signature};
///
/// let input = Payload::new(String::from("text"));
/// let cache: Cache = [(
///     Signature::of_prefix(&input, None, ["Parse"]),
///     CacheEntry::new(Arc::new(42u32), Duration::from_millis(5)),
/// )]
/// .into_iter()
/// .collect();
///
/// assert!(cache.contains(&Signature::seed(&input, None).then("Parse")));
/// ```
#[derive(Clone, Default, Debug)]
pub struct Cache {
    entries: HashMap<Signature, CacheEntry>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, signature: &Signature) -> Option<&CacheEntry> {
        self.entries.get(signature)
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.entries.contains_key(signature)
    }

    pub fn insert(&mut self, signature: Signature, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(signature, entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Signature, &CacheEntry)> {
        self.entries.iter()
    }
}

impl FromIterator<(Signature, CacheEntry)> for Cache {
    fn from_iter<T: IntoIterator<Item = (Signature, CacheEntry)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_prefix_shares_signature() {
        let payload = Payload::new(1u8);
        let a = Signature::of_prefix(&payload, None, ["A", "B"]);
        let b = Signature::seed(&payload, None).then("A").then("B");
        assert_eq!(a, b);
    }

    #[test]
    fn test_signature_is_order_sensitive() {
        let payload = Payload::empty();
        assert_ne!(
            Signature::of_prefix(&payload, None, ["A", "B"]),
            Signature::of_prefix(&payload, None, ["B", "A"])
        );
        // name boundaries matter
        assert_ne!(
            Signature::of_prefix(&payload, None, ["AB", "C"]),
            Signature::of_prefix(&payload, None, ["A", "BC"])
        );
    }

    #[test]
    fn test_seeded_cache() {
        let payload = Payload::new(String::from("seed"));
        let signature = Signature::of_prefix(&payload, None, ["A"]);
        let cache: Cache = [(
            signature,
            CacheEntry::new(std::sync::Arc::new(1u8), Duration::from_millis(3)),
        )]
        .into_iter()
        .collect();

        assert!(cache.contains(&signature));
        assert!(!cache.contains(&signature.then("B")));

        let entries: Vec<_> = cache.iter().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0.hash(), signature.hash());
        assert_eq!(entries[0].1.elapsed, Duration::from_millis(3));
        assert_eq!(signature.to_string().len(), 64);
    }

    #[test]
    fn test_signature_depends_on_input_and_config() {
        let config = RunConfig::new().with("k", 1);
        let base = Signature::seed(&Payload::new(1u8), None);
        assert_ne!(base, Signature::seed(&Payload::new(2u8), None));
        assert_ne!(base, Signature::seed(&Payload::new(1u8), Some(&config)));
        assert_ne!(base, Signature::seed(&Payload::empty(), None));
    }
}
