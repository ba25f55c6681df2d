//! Parameter file loaders and the registry mapping extensions to them.
//!
//! Four formats are registered by default: JSON (`.json`), YAML (`.yaml`,
//! `.yml`), TOML (`.toml`) and NestedText (`.nt`). More can be added to the
//! global registry, or to a private registry handed to a
//! [`Resolver`](crate::Resolver).

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use paramfile_core::{Map, Value};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{BoxError, ConfigError, ConfigErrorKind, Result};
use crate::nestedtext;

/// The top level of a parameter file: test names mapped to their cases.
pub type SuiteParams = Map;

/// Loaders keyed by extension, including the leading dot.
pub type Loaders = IndexMap<String, Loader>;

type LoadFn = dyn Fn(&Path) -> std::result::Result<SuiteParams, BoxError> + Send + Sync;

static GLOBAL_REGISTRY: Lazy<LoaderRegistry> = Lazy::new(LoaderRegistry::with_builtins);

/// A named function reading a parameter file into a mapping.
///
/// Every loader gets a unique identity when it is created. The suite cache
/// is keyed on that identity, so two loaders never share cache entries even
/// if they carry the same name.
#[derive(Clone)]
pub struct Loader {
    id: u64,
    name: Arc<str>,
    load: Arc<LoadFn>,
}

impl Loader {
    /// Wraps a loading function.
    pub fn new<F, E>(name: impl Into<String>, load: F) -> Self
    where
        F: Fn(&Path) -> std::result::Result<SuiteParams, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name.into()),
            load: Arc::new(move |path: &Path| -> std::result::Result<SuiteParams, BoxError> {
                load(path).map_err(Into::into)
            }),
        }
    }

    /// Returns the identity used for caching.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the loader name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Loads the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns whatever the loading function fails with.
    pub fn load(&self, path: &Path) -> std::result::Result<SuiteParams, BoxError> {
        (self.load)(path)
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Loader {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Loader {}

/// A thread-safe mapping from extensions to loaders.
#[derive(Debug, Default)]
pub struct LoaderRegistry {
    loaders: RwLock<Loaders>,
}

impl LoaderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the JSON, YAML, TOML and NestedText loaders.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        let yaml = Loader::new("yaml", load_yaml);
        registry.register(".json", Loader::new("json", load_json));
        registry.register(".yaml", yaml.clone());
        registry.register(".yml", yaml);
        registry.register(".toml", Loader::new("toml", load_toml));
        registry.register(".nt", Loader::new("nestedtext", load_nestedtext));
        registry
    }

    /// Returns the process-wide registry.
    pub fn global() -> &'static Self {
        &GLOBAL_REGISTRY
    }

    /// Registers `loader` for `suffix`, replacing any existing loader.
    pub fn register(&self, suffix: impl Into<String>, loader: Loader) {
        let suffix = normalize_suffix(suffix.into());
        debug!(suffix = %suffix, loader = %loader.name(), "Registered parameter loader");
        self.loaders.write().insert(suffix, loader);
    }

    /// Removes the loader for `suffix` and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigErrorKind::UnknownLoader`] if nothing is registered
    /// for `suffix`.
    pub fn unregister(&self, suffix: &str) -> Result<Loader> {
        let suffix = normalize_suffix(suffix.to_string());
        let removed = self.loaders.write().shift_remove(&suffix);
        if let Some(loader) = &removed {
            info!(suffix = %suffix, loader = %loader.name(), "Unregistered parameter loader");
        }
        removed.ok_or_else(|| {
            ConfigError::new(ConfigErrorKind::UnknownLoader {
                suffix: suffix.clone(),
            })
        })
    }

    /// Returns the loader registered for `suffix`.
    #[must_use]
    pub fn get(&self, suffix: &str) -> Option<Loader> {
        self.loaders.read().get(&normalize_suffix(suffix.to_string())).cloned()
    }

    /// Returns every registered suffix, in registration order.
    #[must_use]
    pub fn suffixes(&self) -> Vec<String> {
        self.loaders.read().keys().cloned().collect()
    }

    /// Returns the registered loaders with `overrides` layered on top.
    #[must_use]
    pub fn snapshot(&self, overrides: Option<&Loaders>) -> Loaders {
        let mut loaders = self.loaders.read().clone();
        if let Some(overrides) = overrides {
            for (suffix, loader) in overrides {
                loaders.insert(normalize_suffix(suffix.clone()), loader.clone());
            }
        }
        loaders
    }
}

fn normalize_suffix(suffix: String) -> String {
    if suffix.starts_with('.') {
        suffix
    } else {
        format!(".{suffix}")
    }
}

/// Returns the extension of `path` with its leading dot, e.g. `.json`.
#[must_use]
pub fn suffix_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
}

fn read(path: &Path) -> std::result::Result<String, BoxError> {
    debug!(path = %path.display(), "Reading parameter file");
    Ok(fs::read_to_string(path)?)
}

fn into_suite(value: Value) -> std::result::Result<SuiteParams, BoxError> {
    match value {
        Value::Map(map) => Ok(map),
        other => Err(format!(
            "expected the top level to map test names to test cases, not {}",
            other.type_name()
        )
        .into()),
    }
}

/// Loads a JSON parameter file.
///
/// # Errors
///
/// Fails if the file cannot be read or parsed, or its top level is not an
/// object.
pub fn load_json(path: &Path) -> std::result::Result<SuiteParams, BoxError> {
    let json: serde_json::Value = serde_json::from_str(&read(path)?)?;
    into_suite(Value::from(json))
}

/// Loads a YAML parameter file.
///
/// # Errors
///
/// Fails if the file cannot be read or parsed, or its top level is not a
/// mapping.
pub fn load_yaml(path: &Path) -> std::result::Result<SuiteParams, BoxError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(&read(path)?)?;
    into_suite(from_yaml(yaml)?)
}

/// Loads a TOML parameter file.
///
/// # Errors
///
/// Fails if the file cannot be read or parsed.
pub fn load_toml(path: &Path) -> std::result::Result<SuiteParams, BoxError> {
    let table: toml::Table = toml::from_str(&read(path)?)?;
    into_suite(from_toml(toml::Value::Table(table)))
}

/// Loads a NestedText parameter file.
///
/// # Errors
///
/// Fails if the file cannot be read or parsed, or its top level is not a
/// dictionary.
pub fn load_nestedtext(path: &Path) -> std::result::Result<SuiteParams, BoxError> {
    into_suite(nestedtext::parse(&read(path)?)?)
}

fn yaml_key(key: serde_yaml::Value) -> std::result::Result<String, BoxError> {
    match from_yaml(key)? {
        Value::Str(s) => Ok(s),
        Value::List(_) | Value::Map(_) => Err("YAML mapping keys must be scalars".into()),
        scalar => Ok(scalar.to_string()),
    }
}

fn from_yaml(value: serde_yaml::Value) -> std::result::Result<Value, BoxError> {
    Ok(match value {
        serde_yaml::Value::Null => Value::None,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => n
            .as_i64()
            .map_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN)), Value::Int),
        serde_yaml::Value::String(s) => Value::Str(s),
        serde_yaml::Value::Sequence(items) => Value::List(
            items
                .into_iter()
                .map(from_yaml)
                .collect::<std::result::Result<Vec<_>, _>>()?,
        ),
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                map.insert(yaml_key(key)?, from_yaml(value)?);
            }
            Value::Map(map)
        }
        serde_yaml::Value::Tagged(tagged) => from_yaml(tagged.value)?,
    })
}

fn from_toml(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::Str(s),
        toml::Value::Integer(n) => Value::Int(n),
        toml::Value::Float(x) => Value::Float(x),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::Str(dt.to_string()),
        toml::Value::Array(items) => Value::List(items.into_iter().map(from_toml).collect()),
        toml::Value::Table(table) => {
            Value::Map(table.into_iter().map(|(k, v)| (k, from_toml(v))).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_builtin_suffixes() {
        let registry = LoaderRegistry::with_builtins();
        assert_eq!(
            registry.suffixes(),
            vec![".json", ".yaml", ".yml", ".toml", ".nt"]
        );
        assert_eq!(registry.get(".yaml"), registry.get("yml"));
    }

    #[test]
    fn test_load_each_format() {
        let dir = TempDir::new().unwrap();
        let json = write(&dir, "a.json", r#"{"test_x": [{"a": 1, "b": 2.5}]}"#);
        let yaml = write(&dir, "a.yaml", "test_x:\n  - a: 1\n    b: 2.5\n");
        let toml = write(&dir, "a.toml", "[[test_x]]\na = 1\nb = 2.5\n");
        let nt = write(&dir, "a.nt", "test_x:\n  -\n    a: 1\n    b: 2.5\n");

        type LoadFnPtr = fn(&Path) -> std::result::Result<SuiteParams, BoxError>;
        let formats: [(std::path::PathBuf, LoadFnPtr); 3] =
            [(json, load_json), (yaml, load_yaml), (toml, load_toml)];
        for (path, loader) in formats {
            let suite = loader(&path).unwrap();
            let case = suite["test_x"].as_list().unwrap()[0].as_map().unwrap().clone();
            assert_eq!(case["a"], Value::Int(1), "{}", path.display());
            assert_eq!(case["b"], Value::Float(2.5), "{}", path.display());
        }

        let suite = load_nestedtext(&nt).unwrap();
        let case = suite["test_x"].as_list().unwrap()[0].as_map().unwrap().clone();
        assert_eq!(case["a"], Value::from("1"));
    }

    #[test]
    fn test_loaders_keep_file_order() {
        let dir = TempDir::new().unwrap();
        let json = write(&dir, "o.json", r#"{"test_x": [{"z": 1, "a": 2, "m": 3}]}"#);
        let yaml = write(&dir, "o.yaml", "test_x:\n  - z: 1\n    a: 2\n    m: 3\n");
        let toml = write(&dir, "o.toml", "[[test_x]]\nz = 1\na = 2\nm = 3\n");

        for path in [json, yaml, toml] {
            let loader = LoaderRegistry::with_builtins()
                .get(&suffix_of(&path).unwrap())
                .unwrap();
            let suite = loader.load(&path).unwrap();
            let case = suite["test_x"].as_list().unwrap()[0].as_map().unwrap().clone();
            let keys: Vec<&str> = case.keys().map(String::as_str).collect();
            assert_eq!(keys, ["z", "a", "m"], "{}", path.display());
        }
    }

    #[test]
    fn test_yaml_non_string_keys() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "keys.yml", "1: one\ntrue: yes\n");
        let suite = load_yaml(&path).unwrap();
        assert_eq!(suite["1"], Value::from("one"));
        assert_eq!(suite["True"], Value::from("yes"));
    }

    #[test]
    fn test_top_level_must_be_mapping() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "list.json", "[1, 2]");
        let err = load_json(&path).unwrap_err();
        assert!(err.to_string().contains("top level"));
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = LoaderRegistry::new();
        let loader = Loader::new("custom", |_: &Path| Ok::<_, BoxError>(SuiteParams::new()));
        registry.register("xyz", loader.clone());
        assert_eq!(registry.get(".xyz"), Some(loader.clone()));

        assert_eq!(registry.unregister(".xyz").unwrap(), loader);
        let err = registry.unregister(".xyz").unwrap_err();
        assert!(matches!(err.kind(), ConfigErrorKind::UnknownLoader { suffix } if suffix == ".xyz"));
    }

    #[test]
    fn test_snapshot_layers_overrides() {
        let registry = LoaderRegistry::with_builtins();
        let custom = Loader::new("custom-json", |_: &Path| Ok::<_, BoxError>(SuiteParams::new()));
        let mut overrides = Loaders::new();
        overrides.insert(".json".to_string(), custom.clone());
        overrides.insert(".ini".to_string(), custom.clone());

        let merged = registry.snapshot(Some(&overrides));
        assert_eq!(merged[".json"], custom);
        assert_eq!(merged[".ini"], custom);
        assert!(merged.contains_key(".toml"));
        assert_ne!(registry.get(".json"), Some(custom));
    }

    #[test]
    fn test_loader_identity_is_unique() {
        let a = Loader::new("same", load_json);
        let b = Loader::new("same", load_json);
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
    }

    #[test]
    fn test_suffix_of() {
        assert_eq!(suffix_of(Path::new("a/b.json")), Some(".json".to_string()));
        assert_eq!(suffix_of(Path::new("a/b")), None);
    }
}
