//! Resolving parameter files into parametrized test cases.
//!
//! # Resolution Process
//!
//! 1. Merge the request's loader overrides over the registry.
//! 2. Locate the parameter file(s) and pair them with the key(s).
//! 3. For each pair: load the file (cached), look up the key, run the
//!    preprocess hook, check every case is a mapping and run the schema.
//! 4. Check every case names the same parameters and emit the cases with
//!    their ids and marks.
//!
//! # Example
//!
//! ```rust,no_run
//! use paramfile::{cast, ResolveRequest, Resolver};
//! use paramfile_core::Value;
//!
//! let request = ResolveRequest::new("test_add")
//!     .with_caller(file!())
//!     .with_schema(cast().fields(["a", "b", "c"], Value::into_int));
//! let params = Resolver::global().resolve(&request)?;
//! for case in params.iter() {
//!     let (a, b) = (case["a"].as_i64(), case["b"].as_i64());
//!     println!("{}: {a:?} + {b:?}", case.id());
//! }
//! # Ok::<(), paramfile::ConfigError>(())
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Index;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use paramfile_core::Value;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::SuiteCache;
use crate::discovery::{resolve_paths, zip_broadcast, OneOrMany};
use crate::error::{BoxError, ConfigError, ConfigErrorKind, Context as _, Result};
use crate::loaders::{suffix_of, Loader, LoaderRegistry, Loaders};
use crate::schema::{CaseParams, Schema, SchemaStage};

/// Case parameters with special meaning: the case id and its marks.
const RESERVED: [&str; 2] = ["id", "marks"];

const SHAPE_HINT: &str = "make sure the top-level data structure in the parameter file is a \
    dictionary where the keys are the names of test functions, and the values are lists of \
    test parameters";

type PreprocessFn =
    Arc<dyn Fn(Value, &Context) -> std::result::Result<Value, BoxError> + Send + Sync>;

/// Where a list of test cases was read from, as seen by preprocess hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    /// The parameter file.
    pub path: PathBuf,
    /// The top-level key.
    pub key: String,
}

/// What to resolve, and how.
#[derive(Clone)]
pub struct ResolveRequest {
    keys: OneOrMany<String>,
    paths: Option<OneOrMany<PathBuf>>,
    caller: Option<PathBuf>,
    loaders: Loaders,
    preprocess: Option<PreprocessFn>,
    schema: Option<Schema>,
}

impl ResolveRequest {
    /// Creates a request for one or more top-level keys.
    #[must_use]
    pub fn new(keys: impl Into<OneOrMany<String>>) -> Self {
        Self {
            keys: keys.into(),
            paths: None,
            caller: None,
            loaders: Loaders::new(),
            preprocess: None,
            schema: None,
        }
    }

    /// Sets the parameter file(s). Relative paths are taken relative to the
    /// caller's directory, if there is a caller.
    #[must_use]
    pub fn with_paths(mut self, paths: impl Into<OneOrMany<PathBuf>>) -> Self {
        self.paths = Some(paths.into());
        self
    }

    /// Sets the test file making the request. Without explicit paths, the
    /// parameter file is the caller's path with a registered extension.
    #[must_use]
    pub fn with_caller(mut self, caller: impl Into<PathBuf>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// Uses `loader` for `suffix` in this request only.
    #[must_use]
    pub fn with_loader(mut self, suffix: impl Into<String>, loader: Loader) -> Self {
        self.loaders.insert(suffix.into(), loader);
        self
    }

    /// Transforms the raw value under each key before it is checked.
    #[must_use]
    pub fn with_preprocess<F, E>(self, f: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.with_preprocess_in_context(move |value, _: &Context| f(value))
    }

    /// Like [`ResolveRequest::with_preprocess`], but the hook is also told
    /// where the value came from.
    #[must_use]
    pub fn with_preprocess_in_context<F, E>(mut self, f: F) -> Self
    where
        F: Fn(Value, &Context) -> std::result::Result<Value, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.preprocess = Some(Arc::new(
            move |value: Value, context: &Context| -> std::result::Result<Value, BoxError> {
                f(value, context).map_err(Into::into)
            },
        ));
        self
    }

    /// Appends a schema stage. Stages run in the order they were added.
    #[must_use]
    pub fn with_schema(mut self, stage: impl SchemaStage + 'static) -> Self {
        self.schema = Some(self.schema.take().unwrap_or_default().then(stage));
        self
    }

    /// Returns the requested keys.
    #[must_use]
    pub const fn keys(&self) -> &OneOrMany<String> {
        &self.keys
    }

    /// Returns the calling test file, if any.
    #[must_use]
    pub fn caller(&self) -> Option<&Path> {
        self.caller.as_deref()
    }
}

impl fmt::Debug for ResolveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveRequest")
            .field("keys", &self.keys)
            .field("paths", &self.paths)
            .field("caller", &self.caller)
            .field("loaders", &self.loaders.keys().collect::<Vec<_>>())
            .field("preprocess", &self.preprocess.is_some())
            .field("schema", &self.schema)
            .finish()
    }
}

/// A named mark on a test case, e.g. `skip` or `xfail`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Mark(String);

impl Mark {
    /// Creates a mark.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the mark's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Returns true for the `skip` mark.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        self.0 == "skip"
    }

    /// Returns true for the `xfail` mark.
    #[must_use]
    pub fn is_xfail(&self) -> bool {
        self.0 == "xfail"
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One emitted test case.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCase {
    /// Parameter values, in the order of [`Parametrization::names`].
    pub values: Vec<Value>,
    /// The case id.
    pub id: String,
    /// The case's marks.
    pub marks: Vec<Mark>,
}

/// The resolved parameter names and test cases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parametrization {
    names: Vec<String>,
    cases: Vec<ResolvedCase>,
}

impl Parametrization {
    /// Returns the parameter names, sorted.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns the cases, in file order.
    #[must_use]
    pub fn cases(&self) -> &[ResolvedCase] {
        &self.cases
    }

    /// Returns the number of cases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Returns true if there are no cases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Returns a by-name view of case `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<CaseView<'_>> {
        self.cases.get(index).map(|case| CaseView {
            names: &self.names,
            case,
        })
    }

    /// Iterates over by-name views of the cases.
    pub fn iter(&self) -> impl Iterator<Item = CaseView<'_>> + '_ {
        self.cases.iter().map(|case| CaseView {
            names: &self.names,
            case,
        })
    }
}

/// One case of a [`Parametrization`], with its values looked up by name.
#[derive(Debug, Clone, Copy)]
pub struct CaseView<'a> {
    names: &'a [String],
    case: &'a ResolvedCase,
}

impl<'a> CaseView<'a> {
    /// Returns the value of parameter `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        let index = self.names.iter().position(|n| n == name)?;
        self.case.values.get(index)
    }

    /// Returns the case id.
    #[must_use]
    pub fn id(&self) -> &'a str {
        &self.case.id
    }

    /// Returns the case's marks.
    #[must_use]
    pub fn marks(&self) -> &'a [Mark] {
        &self.case.marks
    }

    /// Returns true if the case carries a mark called `name`.
    #[must_use]
    pub fn has_mark(&self, name: &str) -> bool {
        self.case.marks.iter().any(|mark| mark.name() == name)
    }

    /// Returns the values, in the order of [`Parametrization::names`].
    #[must_use]
    pub fn values(&self) -> &'a [Value] {
        &self.case.values
    }

    /// Returns the parameters as a name-to-value mapping.
    #[must_use]
    pub fn to_params(&self) -> CaseParams {
        self.names
            .iter()
            .cloned()
            .zip(self.case.values.iter().cloned())
            .collect()
    }
}

impl Index<&str> for CaseView<'_> {
    type Output = Value;

    fn index(&self, name: &str) -> &Value {
        match self.get(name) {
            Some(value) => value,
            None => panic!("test case '{}' has no parameter '{name}'", self.case.id),
        }
    }
}

/// Resolves requests against a loader registry and a suite cache.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    registry: &'a LoaderRegistry,
    cache: &'a SuiteCache,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over the given registry and cache.
    #[must_use]
    pub const fn new(registry: &'a LoaderRegistry, cache: &'a SuiteCache) -> Self {
        Self { registry, cache }
    }

    /// Returns the cache this resolver loads through.
    #[must_use]
    pub const fn cache(&self) -> &'a SuiteCache {
        self.cache
    }

    /// Resolves `request` into parameter names and test cases.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first problem found, with
    /// breadcrumbs naming the file and key being processed.
    pub fn resolve(&self, request: &ResolveRequest) -> Result<Parametrization> {
        let result = self.resolve_inner(request);
        match &request.caller {
            Some(caller) => result.context("test file", caller.display()),
            None => result,
        }
    }

    fn resolve_inner(&self, request: &ResolveRequest) -> Result<Parametrization> {
        let loaders = self.registry.snapshot(Some(&request.loaders));
        let paths = resolve_paths(request.paths.as_ref(), request.caller.as_deref(), &loaders)?;
        let pairs = zip_broadcast(&paths, &request.keys)?;

        let mut cases = Vec::new();
        for (path, key) in pairs {
            let processed = self
                .load_key(&loaders, &path, &key)
                .and_then(|raw| {
                    let context = Context {
                        path: path.clone(),
                        key: key.clone(),
                    };
                    process(raw, request, &context).context("top-level key", &key)
                })
                .context("parameter file", path.display())?;
            cases.extend(processed);
        }

        let params = parametrize(&cases)?;
        info!(
            keys = ?request.keys,
            names = params.names.len(),
            cases = params.cases.len(),
            "Resolved test parameters"
        );
        Ok(params)
    }

    fn load_key(&self, loaders: &Loaders, path: &Path, key: &str) -> Result<Value> {
        let loader = suffix_of(path)
            .and_then(|suffix| loaders.get(&suffix))
            .ok_or_else(|| {
                ConfigError::new(ConfigErrorKind::UnrecognizedExtension {
                    path: path.to_path_buf(),
                    known: loaders.keys().cloned().collect(),
                })
            })?;
        let suite = self.cache.load(loader, path)?;
        suite.get(key).cloned().ok_or_else(|| {
            ConfigError::new(ConfigErrorKind::MissingKey {
                key: key.to_string(),
                available: suite.keys().cloned().collect(),
            })
            .with_hint(SHAPE_HINT)
        })
    }
}

impl Resolver<'static> {
    /// Returns a resolver over the process-wide registry and cache.
    #[must_use]
    pub fn global() -> Self {
        Self::new(LoaderRegistry::global(), SuiteCache::global())
    }
}

impl Default for Resolver<'static> {
    fn default() -> Self {
        Self::global()
    }
}

/// Resolves `request` with the process-wide registry and cache.
///
/// # Errors
///
/// See [`Resolver::resolve`].
pub fn resolve(request: &ResolveRequest) -> Result<Parametrization> {
    Resolver::global().resolve(request)
}

fn process(raw: Value, request: &ResolveRequest, context: &Context) -> Result<Vec<CaseParams>> {
    let raw = match &request.preprocess {
        Some(preprocess) => preprocess(raw, context)
            .map_err(|err| ConfigError::new(ConfigErrorKind::PreprocessFailed).with_source(err))?,
        None => raw,
    };

    let items = match raw {
        Value::List(items) => items,
        other => {
            let found = other.repr();
            return Err(ConfigError::new(if request.preprocess.is_some() {
                ConfigErrorKind::BadPreprocessResult { found }
            } else {
                ConfigErrorKind::NotAList { found }
            }));
        }
    };

    items
        .into_iter()
        .map(|item| {
            let case = match item {
                Value::Map(case) => case,
                other => {
                    return Err(ConfigError::new(ConfigErrorKind::NotAMapping {
                        found: other.repr(),
                    }))
                }
            };
            match &request.schema {
                Some(schema) => apply_schema(schema, case),
                None => Ok(case),
            }
        })
        .collect()
}

/// Runs `schema` over a case with `id` and `marks` held back. The held-back
/// values are restored afterwards and win over any the schema set.
fn apply_schema(schema: &Schema, case: CaseParams) -> Result<CaseParams> {
    let (stash, params): (CaseParams, CaseParams) = case
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .partition(|(k, _)| RESERVED.contains(&k.as_str()));

    let mut out = schema.apply(params).map_err(|err| {
        ConfigError::new(ConfigErrorKind::SchemaFailed {
            case: format_case(&case),
        })
        .with_source(err)
    })?;
    debug!(params = out.len(), stages = schema.len(), "Applied schema to test case");
    out.extend(stash);
    Ok(out)
}

fn parametrize(cases: &[CaseParams]) -> Result<Parametrization> {
    let names: BTreeSet<&str> = cases
        .iter()
        .flat_map(|case| case.keys().map(String::as_str))
        .filter(|name| !RESERVED.contains(name))
        .collect();

    for case in cases {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !case.contains_key(**name))
            .map(|name| (*name).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::new(ConfigErrorKind::InconsistentKeys {
                case: format_case(case),
                missing,
            }));
        }
    }

    let names: Vec<String> = names.into_iter().map(str::to_string).collect();
    let cases = cases
        .iter()
        .enumerate()
        .map(|(i, case)| {
            Ok(ResolvedCase {
                values: names.iter().map(|name| case[name.as_str()].clone()).collect(),
                id: case_id(case.get("id"), i + 1)?,
                marks: case_marks(case.get("marks"))?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Parametrization { names, cases })
}

pub(crate) fn case_id(id: Option<&Value>, position: usize) -> Result<String> {
    match id {
        None | Some(Value::None) => Ok(position.to_string()),
        Some(Value::Str(id)) => Ok(id.clone()),
        Some(id @ (Value::List(_) | Value::Map(_))) => {
            Err(ConfigError::new(ConfigErrorKind::InvalidId { found: id.repr() }))
        }
        Some(id) => Ok(id.to_string()),
    }
}

pub(crate) fn case_marks(marks: Option<&Value>) -> Result<Vec<Mark>> {
    let invalid = |marks: &Value| {
        ConfigError::new(ConfigErrorKind::InvalidMarks {
            found: marks.repr(),
        })
    };
    let names: Vec<&str> = match marks {
        None | Some(Value::None) => return Ok(Vec::new()),
        Some(Value::Str(marks)) => marks.split(',').collect(),
        Some(list @ Value::List(items)) => items
            .iter()
            .map(|item| item.as_str().ok_or_else(|| invalid(list)))
            .collect::<Result<_>>()?,
        Some(other) => return Err(invalid(other)),
    };
    Ok(names
        .into_iter()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(Mark::new)
        .collect())
}

fn format_case(case: &CaseParams) -> String {
    case.iter()
        .map(|(k, v)| format!("{}: {}", Value::from(k.as_str()).repr(), v.repr()))
        .collect::<Vec<_>>()
        .join("\n")
}
