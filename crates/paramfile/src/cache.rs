//! Memoization of loaded parameter files.
//!
//! Each (loader, absolute path) pair is loaded at most once per cache.
//! Failed loads are not cached, so a file that was broken can be fixed and
//! loaded again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{ConfigError, ConfigErrorKind, Result};
use crate::loaders::{Loader, SuiteParams};

static GLOBAL_CACHE: Lazy<SuiteCache> = Lazy::new(SuiteCache::new);

type CacheKey = (u64, PathBuf);

/// A thread-safe cache of loaded parameter files.
#[derive(Debug, Default)]
pub struct SuiteCache {
    entries: RwLock<HashMap<CacheKey, Arc<SuiteParams>>>,
}

impl SuiteCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide cache.
    pub fn global() -> &'static Self {
        &GLOBAL_CACHE
    }

    /// Loads `path` with `loader`, reusing an earlier result if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigErrorKind::MissingFile`] if `path` does not exist and
    /// [`ConfigErrorKind::LoadFailed`] if the loader fails.
    pub fn load(&self, loader: &Loader, path: &Path) -> Result<Arc<SuiteParams>> {
        let key = (loader.id(), absolute(path, loader)?);
        if let Some(suite) = self.entries.read().get(&key) {
            debug!(path = %key.1.display(), "Parameter file cache hit");
            return Ok(Arc::clone(suite));
        }

        debug!(path = %key.1.display(), loader = %loader.name(), "Loading parameter file");
        let suite = loader.load(&key.1).map_err(|err| {
            ConfigError::new(ConfigErrorKind::LoadFailed {
                path: key.1.clone(),
                loader: loader.name().to_string(),
            })
            .with_source(err)
        })?;
        let suite = Arc::new(suite);

        let mut entries = self.entries.write();
        Ok(Arc::clone(entries.entry(key).or_insert(suite)))
    }

    /// Returns true if `path` has been loaded with `loader`.
    #[must_use]
    pub fn contains(&self, loader: &Loader, path: &Path) -> bool {
        absolute(path, loader)
            .is_ok_and(|path| self.entries.read().contains_key(&(loader.id(), path)))
    }

    /// Returns the number of cached files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops every cached file.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        debug!(entries = entries.len(), "Clearing parameter file cache");
        entries.clear();
    }
}

fn absolute(path: &Path, loader: &Loader) -> Result<PathBuf> {
    if !path.exists() {
        return Err(ConfigError::new(ConfigErrorKind::MissingFile {
            path: path.to_path_buf(),
        }));
    }
    path.canonicalize().map_err(|err| {
        ConfigError::new(ConfigErrorKind::LoadFailed {
            path: path.to_path_buf(),
            loader: loader.name().to_string(),
        })
        .with_source(err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use paramfile_core::Value;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn counting_loader(calls: Arc<AtomicUsize>) -> Loader {
        Loader::new("counting", move |path: &Path| {
            calls.fetch_add(1, Ordering::SeqCst);
            crate::loaders::load_json(path)
        })
    }

    #[test]
    fn test_loads_once_per_loader_and_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cases.json");
        fs::write(&path, r#"{"test_a": []}"#).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(Arc::clone(&calls));
        let cache = SuiteCache::new();

        let first = cache.load(&loader, &path).unwrap();
        let second = cache.load(&loader, &path).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.contains(&loader, &path));

        // Relative spellings of the same file share the entry.
        let dotted = dir.path().join(".").join("cases.json");
        cache.load(&loader, &dotted).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A different loader has its own entry.
        let other = counting_loader(Arc::clone(&calls));
        cache.load(&other, &path).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cases.json");
        fs::write(&path, "{ not json").unwrap();

        let loader = Loader::new("strict-json", crate::loaders::load_json);
        let cache = SuiteCache::new();
        let err = cache.load(&loader, &path).unwrap_err();
        assert_eq!(
            err.kind(),
            &ConfigErrorKind::LoadFailed {
                path: path.canonicalize().unwrap(),
                loader: "strict-json".to_string(),
            }
        );
        assert!(err.to_string().contains("attempted to load file with: strict-json"));
        assert!(cache.is_empty());

        fs::write(&path, r#"{"test_a": [{"x": 1}]}"#).unwrap();
        let suite = cache.load(&loader, &path).unwrap();
        let case = suite["test_a"].as_list().unwrap()[0].as_map().unwrap().clone();
        assert_eq!(case["x"], Value::Int(1));
    }

    #[test]
    fn test_missing_file() {
        let loader = Loader::new("none", |_: &Path| Ok::<_, BoxError>(SuiteParams::new()));
        let err = SuiteCache::new()
            .load(&loader, Path::new("/definitely/not/here.json"))
            .unwrap_err();
        assert!(matches!(err.kind(), ConfigErrorKind::MissingFile { .. }));
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cases.json");
        fs::write(&path, "{}").unwrap();

        let loader = Loader::new("json", crate::loaders::load_json);
        let cache = SuiteCache::new();
        cache.load(&loader, &path).unwrap();
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
