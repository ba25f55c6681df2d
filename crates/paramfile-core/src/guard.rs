//! Exception-expectation guards.
//!
//! A guard wraps the code under test. Leaving the guard either accepts what
//! happened (the expected error was raised, or no error was expected and
//! none was raised), lets an unrelated error through untouched, or reports
//! why the outcome does not match the expectation.
//!
//! Guards hold no state between uses, so one guard can check any number of
//! bodies.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::error::SpecError;
use crate::exception::{Exception, ExceptionType};
use crate::namespace::Namespace;
use crate::value::{Map, Value};

/// How leaving a guard resolved the outcome of its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Nothing was raised and nothing was expected.
    Completed,
    /// The expected error was raised and every check passed.
    Suppressed,
    /// The raised error is not one this guard handles.
    Propagate,
}

/// Why a guarded body did not meet its expectation.
#[derive(Debug, Error)]
pub enum ExpectationFailure {
    /// The body completed without raising.
    #[error("DID NOT RAISE {expected}")]
    DidNotRaise {
        /// The expected type expression(s).
        expected: String,
    },

    /// Walking the cause chain ran out of links.
    #[error("{error} has no direct cause")]
    MissingCause {
        /// The error at which the chain ended.
        error: String,
    },

    /// A required substring was absent from the error's text.
    #[error("'{expected}' not in '{actual}'")]
    MessageMismatch {
        /// The required substring.
        expected: String,
        /// The error's text.
        actual: String,
    },

    /// A required pattern did not match the error's text.
    #[error("pattern '{pattern}' not found in '{actual}'")]
    PatternMismatch {
        /// The pattern.
        pattern: String,
        /// The error's text.
        actual: String,
    },

    /// The error does not expose a required attribute.
    #[error("{error} has no attribute '{name}'")]
    MissingAttribute {
        /// The error.
        error: String,
        /// The attribute name.
        name: String,
    },

    /// An attribute had the wrong value.
    #[error("attribute '{name}': expected {expected}, got {actual}")]
    AttributeMismatch {
        /// The attribute name.
        name: String,
        /// The expected value.
        expected: String,
        /// The actual value.
        actual: String,
    },

    /// A type expression did not evaluate to an exception type.
    #[error("'{expr}' evaluated to {found}, not an exception type")]
    NotAnExceptionType {
        /// The type expression.
        expr: String,
        /// What it evaluated to.
        found: String,
    },

    /// The cause depth was not a non-negative integer.
    #[error("cause must be a non-negative integer, got {found}")]
    InvalidCause {
        /// What the cause evaluated to.
        found: String,
    },

    /// Evaluating one of the expectation's expressions raised.
    #[error(transparent)]
    Eval(Exception),

    /// The assertions snippet raised.
    #[error(transparent)]
    Assertions(Exception),
}

/// Error from [`ExpectationGuard::check`].
#[derive(Debug)]
pub enum GuardError<E> {
    /// The body raised an error the guard does not handle.
    Unhandled(E),
    /// The outcome did not meet the expectation.
    Failed(ExpectationFailure),
}

impl<E> GuardError<E> {
    /// Returns the expectation failure, if that is what happened.
    pub const fn failure(&self) -> Option<&ExpectationFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            Self::Unhandled(_) => None,
        }
    }
}

impl<E> From<ExpectationFailure> for GuardError<E> {
    fn from(failure: ExpectationFailure) -> Self {
        Self::Failed(failure)
    }
}

impl<E: fmt::Display> fmt::Display for GuardError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unhandled(err) => err.fmt(f),
            Self::Failed(failure) => failure.fmt(f),
        }
    }
}

impl<E: StdError + 'static> StdError for GuardError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Unhandled(err) => Some(err),
            Self::Failed(failure) => Some(failure),
        }
    }
}

/// The checks an [`ExpectationGuard::Expecting`] guard applies.
#[derive(Debug, Clone)]
pub struct Expectation {
    types: Vec<String>,
    messages: Vec<String>,
    patterns: Vec<Regex>,
    attrs: Map,
    assertions: Option<String>,
    cause: Option<Value>,
    globals: Namespace,
}

impl Expectation {
    /// Expects an error whose type is given by the expression `type_expr`.
    pub fn new(type_expr: impl Into<String>) -> Self {
        Self::any_of([type_expr])
    }

    /// Expects an error matching any of the type expressions.
    pub fn any_of<I, S>(type_exprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: type_exprs.into_iter().map(Into::into).collect(),
            messages: Vec::new(),
            patterns: Vec::new(),
            attrs: Map::new(),
            assertions: None,
            cause: None,
            globals: Namespace::new(),
        }
    }

    /// Sets the namespace expressions are evaluated in.
    #[must_use]
    pub fn globals(mut self, globals: Namespace) -> Self {
        self.globals = globals;
        self
    }

    /// Requires the error's text to contain `message`.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    /// Requires the error's text to match `pattern` somewhere.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::InvalidPattern`] if the pattern does not compile.
    pub fn pattern(mut self, pattern: &str) -> Result<Self, SpecError> {
        self.patterns.push(compile(pattern)?);
        Ok(self)
    }

    /// Requires the error to expose `name` with the value `expected`
    /// evaluates to. Non-string values are compared as they are.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, expected: impl Into<Value>) -> Self {
        self.attrs.insert(name.into(), expected.into());
        self
    }

    /// Runs `snippet` with the error bound as `exc`.
    #[must_use]
    pub fn assertions(mut self, snippet: impl Into<String>) -> Self {
        self.assertions = Some(snippet.into());
        self
    }

    /// Checks the error `depth` links down the cause chain instead of the
    /// raised error itself.
    #[must_use]
    pub fn cause(mut self, depth: u32) -> Self {
        self.cause = Some(Value::Int(i64::from(depth)));
        self
    }

    fn from_map(map: &Map, globals: &Namespace) -> Result<Self, SpecError> {
        let types = map
            .get("type")
            .ok_or(SpecError::MissingType)
            .and_then(|ty| strings("type", ty))?;
        let messages = optional_strings(map, "message")?;
        let patterns = optional_strings(map, "pattern")?
            .iter()
            .map(|pattern| compile(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        let attrs = match map.get("attrs") {
            None => Map::new(),
            Some(Value::Map(attrs)) => attrs.clone(),
            Some(other) => {
                return Err(SpecError::InvalidAttrs {
                    found: other.repr(),
                })
            }
        };
        let assertions = match map.get("assertions") {
            None => None,
            Some(Value::Str(snippet)) => Some(snippet.clone()),
            Some(other) => {
                return Err(SpecError::InvalidAssertions {
                    found: other.repr(),
                })
            }
        };
        let cause = match map.get("cause") {
            None => None,
            Some(Value::Int(depth)) if *depth >= 0 => Some(Value::Int(*depth)),
            Some(Value::Str(expr)) => Some(Value::Str(expr.clone())),
            Some(other) => {
                return Err(SpecError::InvalidCause {
                    found: other.repr(),
                })
            }
        };
        Ok(Self {
            types,
            messages,
            patterns,
            attrs,
            assertions,
            cause,
            globals: globals.clone(),
        })
    }

    fn resolve_types(&self) -> Result<Vec<ExceptionType>, ExpectationFailure> {
        let mut types = Vec::with_capacity(self.types.len());
        for expr in &self.types {
            let value = self.globals.eval(expr.as_str()).map_err(ExpectationFailure::Eval)?;
            let candidates = match value {
                Value::List(items) => items,
                single => vec![single],
            };
            for candidate in candidates {
                match candidate {
                    Value::ExceptionType(ty) => types.push(ty),
                    other => {
                        return Err(ExpectationFailure::NotAnExceptionType {
                            expr: expr.clone(),
                            found: other.repr(),
                        })
                    }
                }
            }
        }
        Ok(types)
    }

    fn cause_depth(&self) -> Result<usize, ExpectationFailure> {
        let value = match &self.cause {
            None => return Ok(0),
            Some(Value::Str(expr)) => self.globals.eval(expr.as_str()).map_err(ExpectationFailure::Eval)?,
            Some(value) => value.clone(),
        };
        value
            .as_i64()
            .and_then(|depth| usize::try_from(depth).ok())
            .ok_or_else(|| ExpectationFailure::InvalidCause {
                found: value.repr(),
            })
    }

    fn expected_label(&self) -> String {
        self.types.join(", ")
    }

    fn exit(&self, raised: Option<&(dyn StdError + 'static)>) -> Result<Exit, ExpectationFailure> {
        let types = self.resolve_types()?;
        let Some(mut err) = raised else {
            return Err(ExpectationFailure::DidNotRaise {
                expected: self.expected_label(),
            });
        };

        for _ in 0..self.cause_depth()? {
            err = err.source().ok_or_else(|| ExpectationFailure::MissingCause {
                error: err.to_string(),
            })?;
        }

        let Some(matched) = types.iter().find(|ty| ty.matches(err)) else {
            debug!(expected = %self.expected_label(), error = %err, "Raised error is not the expected type");
            return Ok(Exit::Propagate);
        };

        let text = error_text(err);
        for message in &self.messages {
            if !text.contains(message.as_str()) {
                return Err(ExpectationFailure::MessageMismatch {
                    expected: message.clone(),
                    actual: text,
                });
            }
        }
        for pattern in &self.patterns {
            if !pattern.is_match(&text) {
                return Err(ExpectationFailure::PatternMismatch {
                    pattern: pattern.as_str().to_string(),
                    actual: text,
                });
            }
        }

        if !self.attrs.is_empty() {
            let actual = matched.attributes(err).unwrap_or_default();
            for (name, expected) in &self.attrs {
                let Some(actual) = actual.get(name) else {
                    return Err(ExpectationFailure::MissingAttribute {
                        error: err.to_string(),
                        name: name.clone(),
                    });
                };
                let expected = match expected {
                    Value::Str(expr) => self
                        .globals
                        .eval(expr.as_str())
                        .map_err(ExpectationFailure::Eval)?,
                    literal => literal.clone(),
                };
                if *actual != expected {
                    return Err(ExpectationFailure::AttributeMismatch {
                        name: name.clone(),
                        expected: expected.repr(),
                        actual: actual.repr(),
                    });
                }
            }
        }

        if let Some(snippet) = &self.assertions {
            let exc = Exception::capture(err, Some(matched));
            self.globals
                .fork()
                .bind("exc", Value::Exception(Arc::new(exc)))
                .build()
                .and_then(|ns| ns.exec(snippet))
                .map_err(ExpectationFailure::Assertions)?;
        }

        debug!(expected = %self.expected_label(), "Expected error raised");
        Ok(Exit::Suppressed)
    }
}

fn compile(pattern: &str) -> Result<Regex, SpecError> {
    Regex::new(pattern).map_err(|err| SpecError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    })
}

fn strings(field: &'static str, value: &Value) -> Result<Vec<String>, SpecError> {
    let not_strings = || SpecError::NotStrings {
        field,
        found: value.repr(),
    };
    match value {
        Value::Str(s) => Ok(vec![s.clone()]),
        Value::List(items) => items
            .iter()
            .map(|item| item.as_str().map(ToString::to_string).ok_or_else(not_strings))
            .collect(),
        _ => Err(not_strings()),
    }
}

fn optional_strings(map: &Map, field: &'static str) -> Result<Vec<String>, SpecError> {
    map.get(field)
        .map_or_else(|| Ok(Vec::new()), |value| strings(field, value))
}

/// The text message and pattern checks run against.
fn error_text(err: &(dyn StdError + 'static)) -> String {
    err.downcast_ref::<Exception>()
        .map_or_else(|| err.to_string(), |exc| exc.message().to_string())
}

/// A reusable guard asserting that a body either raises a particular error
/// or raises nothing at all.
///
/// # Examples
///
/// ```rust
/// use paramfile_core::{Expectation, ExpectationGuard, Namespace};
///
/// let ns = Namespace::new();
/// let guard = ExpectationGuard::from(Expectation::new("ZeroDivisionError").message("by zero"));
///
/// let outcome = guard.check(|| ns.eval("1 / 0")).unwrap();
/// assert!(outcome.is_none());
///
/// let guard = ExpectationGuard::NoExpectation;
/// let outcome = guard.check(|| ns.eval("1 + 1")).unwrap();
/// assert!(outcome.is_some());
/// ```
#[derive(Debug, Clone)]
pub enum ExpectationGuard {
    /// Expects the body to complete; errors pass through unchanged.
    NoExpectation,
    /// Expects the body to raise a matching error.
    Expecting(Box<Expectation>),
}

impl ExpectationGuard {
    /// Builds a guard from an exception specification.
    ///
    /// - The string `none` expects no error.
    /// - Any other string, or a list of strings, gives the type expression(s).
    /// - A mapping requires `type` and may set `message`, `pattern`, `attrs`,
    ///   `assertions` and `cause`.
    ///
    /// Expressions are evaluated in `globals` when the guard is exited.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] if the specification is malformed.
    pub fn from_spec(spec: &Value, globals: &Namespace) -> Result<Self, SpecError> {
        match spec {
            Value::Str(s) if s == "none" => Ok(Self::NoExpectation),
            Value::Str(_) | Value::List(_) => {
                let types = strings("type", spec)?;
                Ok(Self::from(Expectation::any_of(types).globals(globals.clone())))
            }
            Value::Map(map) => Ok(Self::Expecting(Box::new(Expectation::from_map(map, globals)?))),
            other => Err(SpecError::InvalidShape {
                found: other.repr(),
            }),
        }
    }

    /// Returns true if this guard expects an error.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Expecting(_))
    }

    /// Enters the guard. Entering has no effect; it exists so callers can
    /// bracket a body explicitly with [`ExpectationGuard::exit`].
    #[must_use]
    pub const fn enter(&self) -> &Self {
        self
    }

    /// Leaves the guard, given the error the body raised (if any).
    ///
    /// # Errors
    ///
    /// Returns [`ExpectationFailure`] when the outcome does not meet the
    /// expectation, or when evaluating the expectation itself raises.
    pub fn exit(&self, raised: Option<&(dyn StdError + 'static)>) -> Result<Exit, ExpectationFailure> {
        match self {
            Self::NoExpectation => Ok(if raised.is_some() {
                Exit::Propagate
            } else {
                Exit::Completed
            }),
            Self::Expecting(expectation) => expectation.exit(raised),
        }
    }

    /// Runs `body` inside the guard.
    ///
    /// Returns `Some(value)` if the body completed as expected, `None` if it
    /// raised the expected error.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Unhandled`] with the body's own error if the
    /// guard does not handle it, or [`GuardError::Failed`] if the outcome
    /// does not meet the expectation.
    pub fn check<T, E>(&self, body: impl FnOnce() -> Result<T, E>) -> Result<Option<T>, GuardError<E>>
    where
        E: StdError + 'static,
    {
        match body() {
            Ok(value) => {
                self.exit(None)?;
                Ok(Some(value))
            }
            Err(err) => match self.exit(Some(&err as &(dyn StdError + 'static)))? {
                Exit::Suppressed => Ok(None),
                Exit::Completed | Exit::Propagate => Err(GuardError::Unhandled(err)),
            },
        }
    }

    /// Like [`ExpectationGuard::check`] for bodies returning boxed errors.
    ///
    /// # Errors
    ///
    /// As for [`ExpectationGuard::check`].
    pub fn check_boxed<T>(
        &self,
        body: impl FnOnce() -> Result<T, Box<dyn StdError + Send + Sync>>,
    ) -> Result<Option<T>, GuardError<Box<dyn StdError + Send + Sync>>> {
        match body() {
            Ok(value) => {
                self.exit(None)?;
                Ok(Some(value))
            }
            Err(err) => match self.exit(Some(&*err as &(dyn StdError + 'static)))? {
                Exit::Suppressed => Ok(None),
                Exit::Completed | Exit::Propagate => Err(GuardError::Unhandled(err)),
            },
        }
    }
}

impl From<Expectation> for ExpectationGuard {
    fn from(expectation: Expectation) -> Self {
        Self::Expecting(Box::new(expectation))
    }
}

impl fmt::Display for ExpectationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self::Expecting(exp) = self else {
            return f.write_str("<NoExpectation>");
        };
        let quoted = |items: &[String]| Value::from(items.to_vec()).repr();
        if let [single] = exp.types.as_slice() {
            write!(f, "<Expecting type={}", Value::from(single.as_str()).repr())?;
        } else {
            write!(f, "<Expecting type={}", quoted(&exp.types))?;
        }
        if !exp.messages.is_empty() {
            write!(f, " messages={}", quoted(&exp.messages))?;
        }
        if !exp.patterns.is_empty() {
            let patterns: Vec<String> = exp.patterns.iter().map(|p| p.as_str().to_string()).collect();
            write!(f, " patterns={}", quoted(&patterns))?;
        }
        if !exp.attrs.is_empty() {
            write!(f, " attrs={}", Value::Map(exp.attrs.clone()).repr())?;
        }
        if let Some(assertions) = &exp.assertions {
            write!(f, " assertions={}", Value::from(assertions.as_str()).repr())?;
        }
        if let Some(cause) = &exp.cause {
            write!(f, " cause={}", cause.repr())?;
        }
        f.write_str(">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec_guard(spec: serde_json::Value) -> ExpectationGuard {
        ExpectationGuard::from_spec(&Value::from(spec), &Namespace::new()).unwrap()
    }

    fn raising(kind: &str, message: &str) -> Result<(), Exception> {
        Err(Exception::new(kind, message))
    }

    #[test]
    fn test_none_expects_success() {
        let guard = spec_guard(json!("none"));
        assert!(!guard.is_active());
        assert_eq!(guard.check(|| Ok::<_, Exception>(1)).unwrap(), Some(1));

        let err = guard.check(|| raising("ValueError", "x")).unwrap_err();
        assert!(matches!(err, GuardError::Unhandled(_)));
    }

    #[test]
    fn test_type_string() {
        let guard = spec_guard(json!("ZeroDivisionError"));
        assert!(guard.is_active());
        assert!(guard.check(|| raising("ZeroDivisionError", "x")).unwrap().is_none());
    }

    #[test]
    fn test_base_type_matches_subtype() {
        let guard = spec_guard(json!("ArithmeticError"));
        assert!(guard.check(|| raising("ZeroDivisionError", "x")).unwrap().is_none());
    }

    #[test]
    fn test_type_list() {
        let guard = spec_guard(json!(["KeyError", "ValueError"]));
        assert!(guard.check(|| raising("ValueError", "x")).unwrap().is_none());
        assert!(matches!(
            guard.check(|| raising("TypeError", "x")),
            Err(GuardError::Unhandled(_))
        ));
    }

    #[test]
    fn test_did_not_raise() {
        let guard = spec_guard(json!("ValueError"));
        let err = guard.check(|| Ok::<_, Exception>(())).unwrap_err();
        assert!(matches!(
            err.failure(),
            Some(ExpectationFailure::DidNotRaise { expected }) if expected == "ValueError"
        ));
    }

    #[test]
    fn test_wrong_type_propagates() {
        let guard = spec_guard(json!("KeyError"));
        let err = guard.check(|| raising("ValueError", "x")).unwrap_err();
        let GuardError::Unhandled(exc) = err else {
            panic!("expected the original error back");
        };
        assert_eq!(exc.kind(), "ValueError");
    }

    #[test]
    fn test_messages_must_all_appear() {
        let guard = spec_guard(json!({"type": "ValueError", "message": ["alpha", "beta"]}));
        assert!(guard.check(|| raising("ValueError", "alpha and beta")).unwrap().is_none());

        let err = guard.check(|| raising("ValueError", "alpha")).unwrap_err();
        assert_eq!(err.to_string(), "'beta' not in 'alpha'");
    }

    #[test]
    fn test_pattern() {
        let guard = spec_guard(json!({"type": "ValueError", "pattern": r"\d+ items"}));
        assert!(guard.check(|| raising("ValueError", "got 12 items")).unwrap().is_none());
        assert!(matches!(
            guard.check(|| raising("ValueError", "got some items")).unwrap_err().failure(),
            Some(ExpectationFailure::PatternMismatch { .. })
        ));
    }

    #[test]
    fn test_attrs() {
        let guard = spec_guard(json!({"type": "KeyError", "attrs": {"key": "'a'"}}));
        assert!(guard.check(|| Err::<(), _>(Exception::key_error("a"))).unwrap().is_none());

        let err = guard.check(|| Err::<(), _>(Exception::key_error("b"))).unwrap_err();
        assert!(matches!(
            err.failure(),
            Some(ExpectationFailure::AttributeMismatch { name, .. }) if name == "key"
        ));

        let guard = spec_guard(json!({"type": "ValueError", "attrs": {"retry": "1"}}));
        let flagged = || Err::<(), _>(Exception::value_error("x").with_attr("retry", true));
        assert!(guard.check(flagged).unwrap().is_none());

        let guard = spec_guard(json!({"type": "KeyError", "attrs": {"missing": "1"}}));
        assert!(matches!(
            guard.check(|| Err::<(), _>(Exception::key_error("a"))).unwrap_err().failure(),
            Some(ExpectationFailure::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_assertions_see_exc() {
        let guard = spec_guard(json!({
            "type": "ValueError",
            "assertions": "assert exc.message == 'boom'\nassert exc.kind == 'ValueError'",
        }));
        assert!(guard.check(|| raising("ValueError", "boom")).unwrap().is_none());

        let err = guard.check(|| raising("ValueError", "bang")).unwrap_err();
        assert!(matches!(err.failure(), Some(ExpectationFailure::Assertions(_))));
    }

    #[test]
    fn test_cause_unwrapping() {
        let nested = || {
            Err::<(), _>(
                Exception::value_error("outer").with_cause(Exception::zero_division("inner")),
            )
        };
        let guard = spec_guard(json!({"type": "ZeroDivisionError", "cause": 1}));
        assert!(guard.check(nested).unwrap().is_none());

        let guard = spec_guard(json!({"type": "ZeroDivisionError", "cause": 2}));
        let err = guard.check(nested).unwrap_err();
        assert!(matches!(err.failure(), Some(ExpectationFailure::MissingCause { .. })));
    }

    #[test]
    fn test_eval_errors_surface() {
        let guard = spec_guard(json!("NoSuchError"));
        let err = guard.check(|| raising("ValueError", "x")).unwrap_err();
        let Some(ExpectationFailure::Eval(exc)) = err.failure() else {
            panic!("expected the evaluation error");
        };
        assert_eq!(exc.kind(), "NameError");
    }

    #[test]
    fn test_globals_resolve_custom_types() {
        let ns = Namespace::from_bindings([("ParseError", ExceptionType::named("ParseError"))]);
        let guard = ExpectationGuard::from_spec(&Value::from("ParseError"), &ns).unwrap();
        assert!(guard.check(|| raising("ParseError", "x")).unwrap().is_none());
    }

    #[test]
    fn test_guard_is_reusable() {
        let guard = spec_guard(json!("ValueError"));
        for _ in 0..3 {
            assert!(guard.check(|| raising("ValueError", "x")).unwrap().is_none());
        }
    }

    #[test]
    fn test_guard_alternates_between_match_and_propagate() {
        let guard = spec_guard(json!({"type": "ZeroDivisionError", "message": "by zero"}));
        let matching = Exception::zero_division("division by zero");
        let unrelated = Exception::key_error("a");
        let matching: &(dyn StdError + 'static) = &matching;
        let unrelated: &(dyn StdError + 'static) = &unrelated;

        for _ in 0..2 {
            assert_eq!(guard.enter().exit(Some(matching)).unwrap(), Exit::Suppressed);
            assert_eq!(guard.enter().exit(Some(unrelated)).unwrap(), Exit::Propagate);
        }
        for _ in 0..2 {
            assert!(guard
                .check(|| Err::<(), _>(Exception::zero_division("division by zero")))
                .unwrap()
                .is_none());
            let err = guard
                .check(|| Err::<(), _>(Exception::key_error("a")))
                .unwrap_err();
            assert!(matches!(err, GuardError::Unhandled(exc) if exc.kind() == "KeyError"));
        }
    }

    #[test]
    fn test_check_boxed() {
        let guard = spec_guard(json!("Exception"));
        let outcome = guard
            .check_boxed(|| Err::<(), _>("plain failure".into()))
            .unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn test_invalid_specs() {
        let ns = Namespace::new();
        let check = |spec: serde_json::Value| ExpectationGuard::from_spec(&Value::from(spec), &ns);
        assert_eq!(check(json!({"message": "x"})).unwrap_err(), SpecError::MissingType);
        assert!(matches!(check(json!(1)), Err(SpecError::InvalidShape { .. })));
        assert!(matches!(
            check(json!({"type": "E", "pattern": "("})),
            Err(SpecError::InvalidPattern { .. })
        ));
        assert!(matches!(
            check(json!({"type": "E", "cause": -1})),
            Err(SpecError::InvalidCause { .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(ExpectationGuard::NoExpectation.to_string(), "<NoExpectation>");
        let guard = spec_guard(json!({"type": "ValueError", "message": "x"}));
        assert_eq!(guard.to_string(), "<Expecting type='ValueError' messages=['x']>");
    }
}
