//! Schema stages: per-case transformations applied during resolution.
//!
//! A stage takes the parameters of one test case (without `id` and `marks`)
//! and returns the parameters to use instead. Stages are chained with
//! [`Schema`]. Three stages cover most needs:
//!
//! - [`cast`] converts named parameters, e.g. by evaluating them,
//! - [`defaults`] fills in parameters a case leaves out,
//! - [`error_or`] turns an `error` parameter into an
//!   [`ExpectationGuard`] and mocks the expected values it replaces.
//!
//! Any closure `Fn(CaseParams) -> Result<CaseParams, BoxError>` is a stage
//! too.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use paramfile_core::{ExpectationGuard, Map, Mock, Namespace, SpecError, Value};

use crate::error::{BoxError, CastError, ConfigError, ConfigErrorKind};

/// The parameters of one test case, by name.
pub type CaseParams = Map;

/// Result type of schema stages. Failures are boxed so stages can fail with
/// any error type.
pub type StageResult = std::result::Result<CaseParams, BoxError>;

type CastFn = Arc<dyn Fn(Value) -> std::result::Result<Value, BoxError> + Send + Sync>;

type MockFactory = Arc<dyn Fn() -> Value + Send + Sync>;

/// One step of a schema.
pub trait SchemaStage: Send + Sync {
    /// Transforms the parameters of one test case.
    ///
    /// # Errors
    ///
    /// Returns an error if the case is invalid.
    fn apply(&self, params: CaseParams) -> StageResult;
}

impl<F> SchemaStage for F
where
    F: Fn(CaseParams) -> StageResult + Send + Sync,
{
    fn apply(&self, params: CaseParams) -> StageResult {
        self(params)
    }
}

/// A sequence of stages, each fed the output of the one before.
#[derive(Clone, Default)]
pub struct Schema {
    stages: Vec<Arc<dyn SchemaStage>>,
}

impl Schema {
    /// Creates an empty schema, which passes cases through unchanged.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn then(mut self, stage: impl SchemaStage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Appends a shared stage.
    #[must_use]
    pub fn then_shared(mut self, stage: Arc<dyn SchemaStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if there are no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl SchemaStage for Schema {
    fn apply(&self, params: CaseParams) -> StageResult {
        self.stages
            .iter()
            .try_fold(params, |params, stage| stage.apply(params))
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("stages", &self.stages.len())
            .finish()
    }
}

/// Converts named parameters. See [`cast`].
#[derive(Clone, Default)]
pub struct Cast {
    fields: IndexMap<String, Vec<CastFn>>,
}

/// Returns a stage converting named parameters.
///
/// Parameters the case does not have are left alone, so `cast` combines with
/// [`defaults`] in either order: defaults added first are converted like
/// values read from the file, defaults added after are used as given.
///
/// ```
/// use paramfile::{cast, CaseParams, SchemaStage};
/// use paramfile_core::Value;
///
/// let stage = cast().field("a", Value::into_int);
/// let mut case = CaseParams::new();
/// case.insert("a".into(), Value::from("1"));
/// assert_eq!(stage.apply(case).unwrap()["a"], Value::Int(1));
/// assert!(stage.apply(CaseParams::new()).unwrap().is_empty());
/// ```
#[must_use]
pub fn cast() -> Cast {
    Cast::default()
}

impl Cast {
    /// Converts parameter `name` with `f`. Calling this several times for
    /// the same name applies each function in turn.
    #[must_use]
    pub fn field<F, E>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let f: CastFn = Arc::new(move |value: Value| -> std::result::Result<Value, BoxError> {
            f(value).map_err(Into::into)
        });
        self.fields.entry(name.into()).or_default().push(f);
        self
    }

    /// Converts several parameters with the same function.
    #[must_use]
    pub fn fields<I, S, F, E>(self, names: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Value) -> std::result::Result<Value, E> + Clone + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        names
            .into_iter()
            .fold(self, |cast, name| cast.field(name, f.clone()))
    }
}

impl SchemaStage for Cast {
    fn apply(&self, mut params: CaseParams) -> StageResult {
        for (name, funcs) in &self.fields {
            let Some(slot) = params.get_mut(name) else {
                continue;
            };
            for f in funcs {
                let value = std::mem::take(slot);
                *slot = f(value).map_err(|source| CastError {
                    name: name.clone(),
                    source,
                })?;
            }
        }
        Ok(params)
    }
}

impl fmt::Debug for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cast")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Supplies fallback values. See [`defaults`].
#[derive(Debug, Clone, Default)]
pub struct Defaults {
    values: Map,
}

/// Returns a stage adding fallback values for parameters a case leaves out.
/// Values given by the case always win.
#[must_use]
pub fn defaults() -> Defaults {
    Defaults::default()
}

impl Defaults {
    /// Sets the fallback for parameter `name`.
    #[must_use]
    pub fn value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl SchemaStage for Defaults {
    fn apply(&self, params: CaseParams) -> StageResult {
        let mut out = self.values.clone();
        out.extend(params);
        Ok(out)
    }
}

/// Expects either an error or expected values. See [`error_or`].
#[derive(Clone)]
pub struct ErrorOr {
    expected: Vec<String>,
    globals: Namespace,
    param: String,
    mock_factory: MockFactory,
}

/// Returns a stage for cases that give either an error or expected values.
///
/// If the case has no `error` parameter, one is added holding a guard that
/// expects no error, and the `expected` parameters pass through. Otherwise
/// the `error` parameter is turned into a guard (evaluated in the stage's
/// globals) and each `expected` parameter is replaced by a fresh mock. A
/// case giving both is rejected.
#[must_use]
pub fn error_or<I, S>(expected: I) -> ErrorOr
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ErrorOr {
        expected: expected.into_iter().map(Into::into).collect(),
        globals: Namespace::new(),
        param: "error".to_string(),
        mock_factory: Arc::new(|| Value::Mock(Mock::new())),
    }
}

impl ErrorOr {
    /// Sets the namespace the error specification is evaluated in.
    #[must_use]
    pub fn globals(mut self, globals: Namespace) -> Self {
        self.globals = globals;
        self
    }

    /// Sets the name of the error parameter. Defaults to `error`.
    #[must_use]
    pub fn param(mut self, param: impl Into<String>) -> Self {
        self.param = param.into();
        self
    }

    /// Sets how stand-ins for expected values are made.
    #[must_use]
    pub fn mock_factory(mut self, factory: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.mock_factory = Arc::new(factory);
        self
    }
}

impl SchemaStage for ErrorOr {
    fn apply(&self, mut params: CaseParams) -> StageResult {
        let Some(spec) = params.get(&self.param) else {
            params.insert(self.param.clone(), ExpectationGuard::NoExpectation.into());
            return Ok(params);
        };

        let both: Vec<String> = self
            .expected
            .iter()
            .filter(|key| params.contains_key(key.as_str()))
            .cloned()
            .collect();
        if !both.is_empty() {
            return Err(ConfigError::new(ConfigErrorKind::ErrorAndExpected {
                expected: both,
                param: self.param.clone(),
            })
            .into());
        }

        let guard = match spec {
            Value::Guard(guard) => Value::Guard(Arc::clone(guard)),
            spec => error_in(spec, &self.globals).map(Value::from)?,
        };
        params.insert(self.param.clone(), guard);
        for key in &self.expected {
            params.insert(key.clone(), (self.mock_factory)());
        }
        Ok(params)
    }
}

impl fmt::Debug for ErrorOr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorOr")
            .field("expected", &self.expected)
            .field("param", &self.param)
            .field("globals", &self.globals)
            .finish_non_exhaustive()
    }
}

/// Builds a guard from an exception specification, with only the builtin
/// names available.
///
/// # Errors
///
/// Returns [`ConfigErrorKind::InvalidExpectation`] if the specification is
/// malformed.
pub fn error(spec: &Value) -> crate::error::Result<ExpectationGuard> {
    error_in(spec, &Namespace::new())
}

fn error_in(spec: &Value, globals: &Namespace) -> crate::error::Result<ExpectationGuard> {
    ExpectationGuard::from_spec(spec, globals).map_err(|err: SpecError| {
        ConfigError::new(ConfigErrorKind::InvalidExpectation)
            .with_info("specification", spec.repr())
            .with_source(err)
    })
}

/// Schema helpers on [`Namespace`].
pub trait NamespaceExt {
    /// Returns an [`error_or`] stage evaluating errors in this namespace.
    fn error_or<I, S>(&self, expected: I) -> ErrorOr
    where
        I: IntoIterator<Item = S>,
        S: Into<String>;

    /// Returns a cast evaluating every named parameter in this namespace.
    fn eval_all<I, S>(&self, names: I) -> Cast
    where
        I: IntoIterator<Item = S>,
        S: Into<String>;
}

impl NamespaceExt for Namespace {
    fn error_or<I, S>(&self, expected: I) -> ErrorOr
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        error_or(expected).globals(self.clone())
    }

    fn eval_all<I, S>(&self, names: I) -> Cast
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        cast().fields(names, self.evaluator(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paramfile_core::{Exception, Module};
    use serde_json::json;
    use std::error::Error as _;

    fn case(value: serde_json::Value) -> CaseParams {
        match Value::from(value) {
            Value::Map(map) => map,
            other => panic!("not a mapping: {other:?}"),
        }
    }

    #[test]
    fn test_cast_skips_absent_keys() {
        let stage = cast().field("a", Value::into_int);
        assert_eq!(stage.apply(case(json!({}))).unwrap(), CaseParams::new());
        assert_eq!(
            stage.apply(case(json!({"a": "3", "b": "x"}))).unwrap(),
            case(json!({"a": 3, "b": "x"}))
        );
    }

    #[test]
    fn test_cast_chains_functions() {
        let double = |v: Value| -> Result<Value, Exception> {
            Ok(Value::Int(v.as_i64().unwrap_or_default() * 2))
        };
        let stage = cast().field("a", Value::into_int).field("a", double);
        assert_eq!(stage.apply(case(json!({"a": "4"}))).unwrap()["a"], Value::Int(8));
    }

    #[test]
    fn test_cast_failure_names_parameter() {
        let stage = cast().field("a", Value::into_int);
        let err = stage.apply(case(json!({"a": "four"}))).unwrap_err();
        assert!(err.to_string().contains("failed to cast 'a'"));
    }

    #[test]
    fn test_cast_failure_keeps_cause() {
        let stage = cast().field("a", Value::into_int);
        let err = stage.apply(case(json!({"a": "one"}))).unwrap_err();
        let cast_err = err.downcast_ref::<CastError>().unwrap();
        assert_eq!(cast_err.name, "a");
        let cause = cast_err
            .source()
            .and_then(|source| source.downcast_ref::<Exception>())
            .unwrap();
        assert_eq!(cause.kind(), "ValueError");
    }

    #[test]
    fn test_defaults_overlay() {
        let stage = defaults().value("a", 0).value("b", 0);
        let out = stage.apply(case(json!({"b": 1}))).unwrap();
        assert_eq!(out, case(json!({"a": 0, "b": 1})));
    }

    #[test]
    fn test_schema_runs_stages_in_order() {
        let cast_first = Schema::new()
            .then(cast().field("a", Value::into_int))
            .then(defaults().value("a", "0"));
        assert_eq!(cast_first.apply(CaseParams::new()).unwrap()["a"], Value::from("0"));

        let defaults_first = Schema::new()
            .then(defaults().value("a", "0"))
            .then(cast().field("a", Value::into_int));
        assert_eq!(defaults_first.apply(CaseParams::new()).unwrap()["a"], Value::Int(0));
    }

    #[test]
    fn test_closure_stage() {
        let stage = |mut params: CaseParams| -> StageResult {
            params.insert("seen".into(), Value::Bool(true));
            Ok(params)
        };
        let schema = Schema::new().then(stage);
        assert_eq!(schema.apply(CaseParams::new()).unwrap()["seen"], Value::Bool(true));
    }

    #[test]
    fn test_error_or_without_error() {
        let out = error_or(["x"]).apply(case(json!({"x": 1}))).unwrap();
        assert_eq!(out["x"], Value::Int(1));
        let guard = out["error"].as_guard().unwrap();
        assert!(!guard.is_active());
        assert!(!out["error"].is_truthy());
    }

    #[test]
    fn test_error_or_with_error() {
        let out = error_or(["x", "y"])
            .apply(case(json!({"error": "ZeroDivisionError"})))
            .unwrap();
        assert!(out["error"].as_guard().unwrap().is_active());
        assert!(out["x"].is_mock());
        assert!(out["y"].is_mock());
        assert_ne!(out["x"], out["y"]);
    }

    #[test]
    fn test_error_or_none_is_falsy() {
        let out = error_or(["x"]).apply(case(json!({"error": "none"}))).unwrap();
        assert!(!out["error"].is_truthy());
    }

    #[test]
    fn test_error_or_rejects_both() {
        let err = error_or(["x"])
            .apply(case(json!({"x": 1, "error": "ValueError"})))
            .unwrap_err();
        let err = err.downcast_ref::<ConfigError>().unwrap();
        assert_eq!(
            err.kind(),
            &ConfigErrorKind::ErrorAndExpected {
                expected: vec!["x".to_string()],
                param: "error".to_string(),
            }
        );
        let rendered = err.to_string();
        assert!(rendered.contains("expected value parameter(s): x"));
        assert!(rendered.contains("error parameter: error"));
    }

    #[test]
    fn test_error_or_custom_param_and_factory() {
        let stage = error_or(["expected"])
            .param("raises")
            .mock_factory(|| Value::from("stand-in"));
        let out = stage.apply(case(json!({"raises": "KeyError"}))).unwrap();
        assert!(out["raises"].as_guard().unwrap().is_active());
        assert_eq!(out["expected"], Value::from("stand-in"));
    }

    #[test]
    fn test_error_or_is_idempotent() {
        let stage = error_or(["x"]);
        let once = stage.apply(case(json!({"error": "KeyError"}))).unwrap();
        let mut again = once.clone();
        again.shift_remove("x");
        let twice = stage.apply(again).unwrap();
        assert_eq!(once["error"], twice["error"]);
    }

    #[test]
    fn test_error_or_invalid_spec() {
        let err = error_or(["x"])
            .apply(case(json!({"error": {"message": "no type"}})))
            .unwrap_err();
        let err = err.downcast_ref::<ConfigError>().unwrap();
        assert_eq!(err.kind(), &ConfigErrorKind::InvalidExpectation);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_namespace_error_or_uses_globals() {
        let app = Module::new("app").with("LIMIT", 3);
        let ns = Namespace::builder().star(app).build().unwrap();
        let stage = ns.error_or(["expected"]);
        let out = stage
            .apply(case(json!({"error": {"type": "ValueError", "attrs": {"limit": "LIMIT"}}})))
            .unwrap();
        assert!(out["error"].as_guard().unwrap().is_active());
    }

    #[test]
    fn test_namespace_eval_all() {
        let ns = Namespace::from_bindings([("base", Value::Int(10))]);
        let stage = ns.eval_all(["a", "b"]);
        let out = stage.apply(case(json!({"a": "base + 1", "b": "[base]", "c": "base"}))).unwrap();
        assert_eq!(out["a"], Value::Int(11));
        assert_eq!(out["b"], Value::from(vec![10]));
        assert_eq!(out["c"], Value::from("base"));
    }

    #[test]
    fn test_error_helper() {
        assert!(!error(&Value::from("none")).unwrap().is_active());
        assert!(error(&Value::from("IndexError")).unwrap().is_active());
        assert!(error(&Value::Int(3)).is_err());
    }
}
