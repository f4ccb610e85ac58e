// Transform cache shared across the generations of a dev session

use crate::core::models::TransformedModule;
use dashmap::DashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct CacheEntry {
    source_digest: String,
    module: TransformedModule,
}

/// Successful transforms keyed by path and source digest
#[derive(Debug, Default)]
pub struct TransformCache {
    entries: DashMap<PathBuf, CacheEntry>,
}

impl TransformCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn digest(source: &[u8]) -> String {
        blake3::hash(source).to_hex().to_string()
    }

    /// Transform of exactly this source, if seen before
    pub fn get(&self, path: &Path, source_digest: &str) -> Option<TransformedModule> {
        self.entries
            .get(path)
            .filter(|entry| entry.source_digest == source_digest)
            .map(|entry| entry.module.clone())
    }

    /// Last successful transform of `path`, whatever its source was
    pub fn last_good(&self, path: &Path) -> Option<TransformedModule> {
        self.entries.get(path).map(|entry| entry.module.clone())
    }

    pub fn insert(&self, path: PathBuf, source_digest: String, module: TransformedModule) {
        self.entries.insert(
            path,
            CacheEntry {
                source_digest,
                module,
            },
        );
    }

    pub fn invalidate(&self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ModuleOutput;

    fn module(code: &str) -> TransformedModule {
        TransformedModule {
            output: ModuleOutput::Script(code.to_string()),
            imports: Vec::new(),
        }
    }

    #[test]
    fn test_hit_requires_matching_digest() {
        let cache = TransformCache::new();
        let path = PathBuf::from("/project/src/a.ts");
        let digest = TransformCache::digest(b"export const a = 1;");
        cache.insert(path.clone(), digest.clone(), module("var a = 1;"));

        assert!(cache.get(&path, &digest).is_some());
        assert!(cache.get(&path, &TransformCache::digest(b"changed")).is_none());
    }

    #[test]
    fn test_last_good_survives_source_change() {
        let cache = TransformCache::new();
        let path = PathBuf::from("/project/src/a.ts");
        cache.insert(path.clone(), TransformCache::digest(b"v1"), module("v1"));

        let stale = cache.last_good(&path).unwrap();
        assert_eq!(stale.output.text(), Some("v1"));

        cache.invalidate(&path);
        assert!(cache.last_good(&path).is_none());
        assert!(cache.is_empty());
    }
}
