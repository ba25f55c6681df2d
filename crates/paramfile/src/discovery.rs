//! Locating parameter files and pairing them with top-level keys.
//!
//! # Discovery Process
//!
//! 1. Explicit paths are taken relative to the directory of the calling test
//!    file, or as given when there is no caller.
//! 2. Without explicit paths, the caller's path is tried with every
//!    registered extension. Exactly one of those files must exist.
//! 3. Paths and keys are broadcast against each other into (path, key)
//!    pairs.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, ConfigErrorKind, Result};
use crate::loaders::Loaders;

/// A single value or a list of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneOrMany<T> {
    /// One value, broadcast against the other side.
    One(T),
    /// Several values, zipped against the other side.
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(items) => items.len(),
        }
    }

    /// Returns true if this is an empty list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Many(items) if items.is_empty())
    }

    /// Iterates over the values.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            Self::One(item) => std::slice::from_ref(item).iter(),
            Self::Many(items) => items.iter(),
        }
    }

    /// Applies `f` to every value, keeping the shape.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> OneOrMany<U> {
        match self {
            Self::One(item) => OneOrMany::One(f(item)),
            Self::Many(items) => OneOrMany::Many(items.into_iter().map(f).collect()),
        }
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(items: Vec<T>) -> Self {
        Self::Many(items)
    }
}

impl From<&str> for OneOrMany<String> {
    fn from(key: &str) -> Self {
        Self::One(key.to_string())
    }
}

impl From<String> for OneOrMany<String> {
    fn from(key: String) -> Self {
        Self::One(key)
    }
}

impl From<Vec<&str>> for OneOrMany<String> {
    fn from(keys: Vec<&str>) -> Self {
        Self::Many(keys.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for OneOrMany<String> {
    fn from(keys: [&str; N]) -> Self {
        Self::Many(keys.into_iter().map(str::to_string).collect())
    }
}

impl From<&str> for OneOrMany<PathBuf> {
    fn from(path: &str) -> Self {
        Self::One(PathBuf::from(path))
    }
}

impl From<&Path> for OneOrMany<PathBuf> {
    fn from(path: &Path) -> Self {
        Self::One(path.to_path_buf())
    }
}

impl From<PathBuf> for OneOrMany<PathBuf> {
    fn from(path: PathBuf) -> Self {
        Self::One(path)
    }
}

impl From<&PathBuf> for OneOrMany<PathBuf> {
    fn from(path: &PathBuf) -> Self {
        Self::One(path.clone())
    }
}

impl From<Vec<&str>> for OneOrMany<PathBuf> {
    fn from(paths: Vec<&str>) -> Self {
        Self::Many(paths.into_iter().map(PathBuf::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for OneOrMany<PathBuf> {
    fn from(paths: [&str; N]) -> Self {
        Self::Many(paths.into_iter().map(PathBuf::from).collect())
    }
}

impl<const N: usize> From<[PathBuf; N]> for OneOrMany<PathBuf> {
    fn from(paths: [PathBuf; N]) -> Self {
        Self::Many(paths.into())
    }
}

/// Pairs up two one-or-many values.
///
/// A single value is repeated to match a list. Two lists are zipped and must
/// have the same length.
///
/// # Errors
///
/// Returns [`ConfigErrorKind::MismatchedCounts`] if both sides are lists of
/// different lengths.
pub fn zip_broadcast<A: Clone, B: Clone>(
    left: &OneOrMany<A>,
    right: &OneOrMany<B>,
) -> Result<Vec<(A, B)>> {
    match (left, right) {
        (OneOrMany::One(a), OneOrMany::One(b)) => Ok(vec![(a.clone(), b.clone())]),
        (OneOrMany::One(a), OneOrMany::Many(rights)) => {
            Ok(rights.iter().map(|b| (a.clone(), b.clone())).collect())
        }
        (OneOrMany::Many(lefts), OneOrMany::One(b)) => {
            Ok(lefts.iter().map(|a| (a.clone(), b.clone())).collect())
        }
        (OneOrMany::Many(lefts), OneOrMany::Many(rights)) => {
            if lefts.len() != rights.len() {
                return Err(ConfigError::new(ConfigErrorKind::MismatchedCounts {
                    paths: lefts.len(),
                    keys: rights.len(),
                }));
            }
            Ok(lefts.iter().cloned().zip(rights.iter().cloned()).collect())
        }
    }
}

/// Returns the default parameter file candidates for `caller`: its path
/// with each registered extension in turn.
#[must_use]
pub fn default_candidates(caller: &Path, loaders: &Loaders) -> Vec<PathBuf> {
    loaders
        .keys()
        .map(|suffix| caller.with_extension(suffix.trim_start_matches('.')))
        .collect()
}

/// Finds the one default parameter file for `caller`.
///
/// # Errors
///
/// Returns [`ConfigErrorKind::NotFound`] if no candidate exists and
/// [`ConfigErrorKind::Ambiguous`] if several do.
pub fn find_default(caller: &Path, loaders: &Loaders) -> Result<PathBuf> {
    let candidates = default_candidates(caller, loaders);
    let mut found: Vec<PathBuf> = candidates.iter().filter(|p| p.exists()).cloned().collect();
    debug!(
        caller = %caller.display(),
        candidates = candidates.len(),
        found = found.len(),
        "Searched for default parameter file"
    );
    match found.len() {
        0 => Err(ConfigError::new(ConfigErrorKind::NotFound { candidates })
            .with_hint("no relative path specified")),
        1 => Ok(found.remove(0)),
        _ => Err(ConfigError::new(ConfigErrorKind::Ambiguous { candidates: found })
            .with_hint("pass an explicit path to choose one")),
    }
}

/// Resolves the parameter file paths for one request.
///
/// Explicit paths are joined onto the caller's directory. Without explicit
/// paths the caller's default file is used.
///
/// # Errors
///
/// Returns [`ConfigErrorKind::NoPath`] if there are neither paths nor a
/// caller, or the errors of [`find_default`].
pub fn resolve_paths(
    paths: Option<&OneOrMany<PathBuf>>,
    caller: Option<&Path>,
    loaders: &Loaders,
) -> Result<OneOrMany<PathBuf>> {
    match (paths, caller) {
        (Some(paths), caller) => {
            let base = caller.and_then(Path::parent);
            Ok(paths.clone().map(|path| match base {
                Some(base) => base.join(path),
                None => path,
            }))
        }
        (None, Some(caller)) => find_default(caller, loaders).map(OneOrMany::One),
        (None, None) => Err(ConfigError::new(ConfigErrorKind::NoPath)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::LoaderRegistry;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_zip_broadcast() {
        let one_path: OneOrMany<PathBuf> = "a.json".into();
        let keys: OneOrMany<String> = ["x", "y", "z"].into();
        let pairs = zip_broadcast(&one_path, &keys).unwrap();
        assert_eq!(pairs.len(), 3);
        assert!(pairs.iter().all(|(p, _)| p == Path::new("a.json")));
        assert_eq!(pairs[2].1, "z");

        let paths: OneOrMany<PathBuf> = ["a.json", "b.json"].into();
        let key: OneOrMany<String> = "k".into();
        let pairs = zip_broadcast(&paths, &key).unwrap();
        let expected: Vec<(PathBuf, String)> = vec![
            ("a.json".into(), "k".into()),
            ("b.json".into(), "k".into()),
        ];
        assert_eq!(pairs, expected);

        let pairs = zip_broadcast(&one_path, &key).unwrap();
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_zip_mismatched_counts() {
        let paths: OneOrMany<PathBuf> = ["a.json", "b.json"].into();
        let keys: OneOrMany<String> = ["x", "y", "z"].into();
        let err = zip_broadcast(&paths, &keys).unwrap_err();
        assert_eq!(
            err.kind(),
            &ConfigErrorKind::MismatchedCounts { paths: 2, keys: 3 }
        );
    }

    #[test]
    fn test_find_default() {
        let dir = TempDir::new().unwrap();
        let caller = dir.path().join("test_math.rs");
        let loaders = LoaderRegistry::with_builtins().snapshot(None);

        let err = find_default(&caller, &loaders).unwrap_err();
        match err.kind() {
            ConfigErrorKind::NotFound { candidates } => {
                assert_eq!(candidates.len(), 5);
                assert_eq!(candidates[0], dir.path().join("test_math.json"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        fs::write(dir.path().join("test_math.yml"), "{}").unwrap();
        assert_eq!(
            find_default(&caller, &loaders).unwrap(),
            dir.path().join("test_math.yml")
        );

        fs::write(dir.path().join("test_math.toml"), "").unwrap();
        let err = find_default(&caller, &loaders).unwrap_err();
        assert!(matches!(
            err.kind(),
            ConfigErrorKind::Ambiguous { candidates } if candidates.len() == 2
        ));
    }

    #[test]
    fn test_resolve_paths() {
        let loaders = LoaderRegistry::with_builtins().snapshot(None);
        let caller = Path::new("/suite/tests/test_math.rs");

        let explicit: OneOrMany<PathBuf> = ["a.json", "/abs/b.json"].into();
        let resolved = resolve_paths(Some(&explicit), Some(caller), &loaders).unwrap();
        let resolved: Vec<_> = resolved.iter().cloned().collect();
        assert_eq!(
            resolved,
            vec![
                PathBuf::from("/suite/tests/a.json"),
                PathBuf::from("/abs/b.json")
            ]
        );

        let bare: OneOrMany<PathBuf> = "rel.json".into();
        let resolved = resolve_paths(Some(&bare), None, &loaders).unwrap();
        assert_eq!(resolved, OneOrMany::One(PathBuf::from("rel.json")));

        let err = resolve_paths(None, None, &loaders).unwrap_err();
        assert_eq!(err.kind(), &ConfigErrorKind::NoPath);
    }
}
