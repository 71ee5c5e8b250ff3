/*!
 * Replication Cache
 * What a worker already holds, keyed by top-level binding name
 */

use ahash::{HashMap, HashMapExt, RandomState};

/// Fixed seeds so equal sources fingerprint equally for the life of a cache
const SEEDS: (u64, u64, u64, u64) = (0x5157_4f52, 0x4b45_5253, 0x5245_504c, 0x4943_4154);

/// Identity of what was shipped under a name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    /// A function definition, by hash of its exact source text
    Source(u64),
    /// A module import, by dotted module name
    Module(String),
    /// A binding to `module.member`
    Alias(String),
}

/// Per-worker record of replicated bindings
///
/// Cleared when the worker closes. Only successful replication is
/// recorded, so a failed import is retried on the next call.
#[derive(Debug)]
pub struct ReplicationCache {
    entries: HashMap<String, Fingerprint>,
    hasher: RandomState,
}

impl ReplicationCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            hasher: RandomState::with_seeds(SEEDS.0, SEEDS.1, SEEDS.2, SEEDS.3),
        }
    }

    pub fn source_hash(&self, source: &str) -> u64 {
        self.hasher.hash_one(source)
    }

    pub fn source_fingerprint(&self, source: &str) -> Fingerprint {
        Fingerprint::Source(self.source_hash(source))
    }

    /// Whether `name` is recorded with exactly `fingerprint`
    pub fn is_current(&self, name: &str, fingerprint: &Fingerprint) -> bool {
        self.entries.get(name) == Some(fingerprint)
    }

    pub fn record(&mut self, name: impl Into<String>, fingerprint: Fingerprint) {
        self.entries.insert(name.into(), fingerprint);
    }

    pub fn get(&self, name: &str) -> Option<&Fingerprint> {
        self.entries.get(name)
    }

    /// Recorded names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for ReplicationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_source_fingerprint_tracks_text() {
        let cache = ReplicationCache::new();
        let a = cache.source_fingerprint("def f():\n    return 1");
        let b = cache.source_fingerprint("def f():\n    return 1");
        let c = cache.source_fingerprint("def f():\n    return 2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        // Stable across caches
        assert_eq!(ReplicationCache::new().source_fingerprint("x"), cache.source_fingerprint("x"));
    }

    #[test]
    fn test_record_and_clear() {
        let mut cache = ReplicationCache::new();
        let fp = Fingerprint::Module("math".into());
        assert!(!cache.is_current("math", &fp));

        cache.record("math", fp.clone());
        assert!(cache.is_current("math", &fp));
        assert!(!cache.is_current("math", &Fingerprint::Module("text".into())));
        assert_eq!(cache.names(), vec!["math".to_string()]);

        cache.clear();
        assert!(cache.is_empty());
    }
}
