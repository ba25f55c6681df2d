//! Exceptions raised by snippets and the types guards match them against.

use std::any::TypeId;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::value::{Map, Value};

type SharedError = Arc<dyn StdError + Send + Sync + 'static>;
type AttrExtractor = Arc<dyn Fn(&(dyn StdError + 'static)) -> Option<Map> + Send + Sync>;

/// Builtin exception kinds and their bases, most specific first.
const BUILTIN_BASES: &[(&str, &[&str])] = &[
    ("ZeroDivisionError", &["ArithmeticError"]),
    ("OverflowError", &["ArithmeticError"]),
    ("KeyError", &["LookupError"]),
    ("IndexError", &["LookupError"]),
];

/// Names of every builtin exception type bound into the snippet environment.
pub const BUILTIN_EXCEPTIONS: &[&str] = &[
    "Exception",
    "ArithmeticError",
    "ZeroDivisionError",
    "OverflowError",
    "LookupError",
    "KeyError",
    "IndexError",
    "NameError",
    "TypeError",
    "ValueError",
    "AttributeError",
    "AssertionError",
    "SyntaxError",
];

fn bases_of(kind: &str) -> &'static [&'static str] {
    BUILTIN_BASES
        .iter()
        .find(|(name, _)| *name == kind)
        .map_or(&[], |(_, bases)| bases)
}

/// An error raised while evaluating or executing a snippet, or raised by
/// Rust code that wants to participate in kind-based matching.
///
/// Every exception has a kind (e.g. `ZeroDivisionError`), a lineage of base
/// kinds, a message, optional named attributes and an optional cause.
#[derive(Debug, Clone)]
pub struct Exception {
    lineage: Vec<String>,
    message: String,
    attrs: Map,
    cause: Option<SharedError>,
}

impl Exception {
    /// Creates an exception of the given kind.
    ///
    /// Builtin kinds pick up their builtin bases automatically, so a
    /// `ZeroDivisionError` also matches `ArithmeticError`.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let kind = kind.into();
        let mut lineage = vec![kind.clone()];
        lineage.extend(bases_of(&kind).iter().map(ToString::to_string));
        Self {
            lineage,
            message: message.into(),
            attrs: Map::new(),
            cause: None,
        }
    }

    /// Adds a base kind to the lineage, along with that base's own bases.
    #[must_use]
    pub fn extends(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        let inherited = bases_of(&base);
        self.lineage.push(base);
        self.lineage.extend(inherited.iter().map(ToString::to_string));
        self
    }

    /// Attaches a named attribute.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Records the error that directly caused this one.
    #[must_use]
    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// `NameError` for an unbound name.
    pub fn name_error(name: &str) -> Self {
        Self::new("NameError", format!("name '{name}' is not defined")).with_attr("name", name)
    }

    /// `TypeError` with the given message.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    /// `ValueError` with the given message.
    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new("ValueError", message)
    }

    /// `ZeroDivisionError` with the given message.
    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::new("ZeroDivisionError", message)
    }

    /// `OverflowError` for integer arithmetic that left the `i64` range.
    pub fn overflow() -> Self {
        Self::new("OverflowError", "integer overflow")
    }

    /// `KeyError` for a missing mapping key.
    pub fn key_error(key: &str) -> Self {
        Self::new("KeyError", Value::from(key).repr()).with_attr("key", key)
    }

    /// `IndexError` with the given message.
    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new("IndexError", message)
    }

    /// `AttributeError` for a missing attribute.
    pub fn attribute_error(owner: &str, attr: &str) -> Self {
        Self::new(
            "AttributeError",
            format!("'{owner}' object has no attribute '{attr}'"),
        )
        .with_attr("name", attr)
    }

    /// `AssertionError` with the given message.
    pub fn assertion_error(message: impl Into<String>) -> Self {
        Self::new("AssertionError", message)
    }

    /// `SyntaxError` with the given message.
    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::new("SyntaxError", message)
    }

    /// Captures an arbitrary error as an exception value.
    ///
    /// Exceptions are cloned as they are. Other errors take the name of the
    /// type they matched (or `Exception`), their `Display` text as message,
    /// the attributes exposed through `ty`, and their `source()` chain.
    pub fn capture(err: &(dyn StdError + 'static), ty: Option<&ExceptionType>) -> Self {
        if let Some(exc) = err.downcast_ref::<Self>() {
            return exc.clone();
        }
        let kind = ty.map_or("Exception", ExceptionType::name);
        let mut exc = Self::new(kind, err.to_string());
        if let Some(attrs) = ty.and_then(|ty| ty.attributes(err)) {
            exc.attrs = attrs;
        }
        if let Some(source) = err.source() {
            exc.cause = Some(Arc::new(Self::capture(source, None)));
        }
        exc
    }

    /// Returns the most specific kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.lineage[0]
    }

    /// Returns the kind followed by every base kind.
    #[must_use]
    pub fn lineage(&self) -> &[String] {
        &self.lineage
    }

    /// Returns true if this exception is of the given kind or inherits it.
    /// Every exception is an `Exception`.
    #[must_use]
    pub fn is_a(&self, kind: &str) -> bool {
        kind == "Exception" || self.lineage.iter().any(|k| k == kind)
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the named attributes.
    #[must_use]
    pub const fn attrs(&self) -> &Map {
        &self.attrs
    }

    /// Returns one named attribute.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Returns the direct cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.kind())
        } else {
            write!(f, "{}: {}", self.kind(), self.message)
        }
    }
}

impl StdError for Exception {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

#[derive(Clone)]
enum Matcher {
    /// Matches [`Exception`] values by lineage.
    Kind,
    /// Matches a concrete Rust error type by downcasting.
    Rust {
        type_id: TypeId,
        matches: fn(&(dyn StdError + 'static)) -> bool,
        attrs: Option<AttrExtractor>,
    },
}

fn is_type<E: StdError + 'static>(err: &(dyn StdError + 'static)) -> bool {
    err.is::<E>()
}

/// Something a guard can match a raised error against.
///
/// Named types match [`Exception`] values by kind and lineage; the type
/// named `Exception` matches any error at all. Types created with
/// [`ExceptionType::of`] match a concrete Rust error type instead, and can
/// expose that type's fields as attributes for guard checks.
#[derive(Clone)]
pub struct ExceptionType {
    name: Arc<str>,
    matcher: Matcher,
}

impl ExceptionType {
    /// A type matching exceptions of the given kind or any subkind.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            matcher: Matcher::Kind,
        }
    }

    /// A type matching the Rust error type `E`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use paramfile_core::ExceptionType;
    ///
    /// let ty = ExceptionType::of::<std::num::ParseIntError>("ParseIntError");
    /// let err = "x".parse::<i32>().unwrap_err();
    /// assert!(ty.matches(&err));
    /// ```
    pub fn of<E: StdError + 'static>(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            matcher: Matcher::Rust {
                type_id: TypeId::of::<E>(),
                matches: is_type::<E>,
                attrs: None,
            },
        }
    }

    /// A type matching the Rust error type `E`, exposing attributes through
    /// `extract` so guards can check them.
    pub fn with_attributes<E, F>(name: impl Into<String>, extract: F) -> Self
    where
        E: StdError + 'static,
        F: Fn(&E) -> Map + Send + Sync + 'static,
    {
        let extractor: AttrExtractor =
            Arc::new(move |err: &(dyn StdError + 'static)| err.downcast_ref::<E>().map(|e| extract(e)));
        Self {
            name: Arc::from(name.into()),
            matcher: Matcher::Rust {
                type_id: TypeId::of::<E>(),
                matches: is_type::<E>,
                attrs: Some(extractor),
            },
        }
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if `err` is an instance of this type.
    #[must_use]
    pub fn matches(&self, err: &(dyn StdError + 'static)) -> bool {
        match &self.matcher {
            Matcher::Kind if &*self.name == "Exception" => true,
            Matcher::Kind => err
                .downcast_ref::<Exception>()
                .is_some_and(|exc| exc.is_a(&self.name)),
            Matcher::Rust { matches, .. } => matches(err),
        }
    }

    /// Returns the attributes `err` exposes under this type.
    #[must_use]
    pub fn attributes(&self, err: &(dyn StdError + 'static)) -> Option<Map> {
        match &self.matcher {
            Matcher::Rust {
                attrs: Some(extract),
                ..
            } => extract(err),
            _ => err
                .downcast_ref::<Exception>()
                .map(|exc| exc.attrs().clone()),
        }
    }

    /// Instantiates a named type, as when a snippet calls `KeyError('x')`.
    ///
    /// # Errors
    ///
    /// Raises `TypeError` for types bound to Rust error types.
    pub fn instantiate(&self, message: String) -> Result<Exception, Exception> {
        match self.matcher {
            Matcher::Kind => Ok(Exception::new(self.name.to_string(), message)),
            Matcher::Rust { .. } => Err(Exception::type_error(format!(
                "cannot instantiate '{}' from a snippet",
                self.name
            ))),
        }
    }
}

impl PartialEq for ExceptionType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && match (&self.matcher, &other.matcher) {
                (Matcher::Kind, Matcher::Kind) => true,
                (Matcher::Rust { type_id: a, .. }, Matcher::Rust { type_id: b, .. }) => a == b,
                _ => false,
            }
    }
}

impl fmt::Debug for ExceptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class '{}'>", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("bad value {code}")]
    struct BadValue {
        code: i64,
    }

    #[test]
    fn test_builtin_lineage() {
        let exc = Exception::zero_division("division by zero");
        assert_eq!(exc.kind(), "ZeroDivisionError");
        assert!(exc.is_a("ArithmeticError"));
        assert!(exc.is_a("Exception"));
        assert!(!exc.is_a("LookupError"));
    }

    #[test]
    fn test_extends() {
        let exc = Exception::new("ParseError", "x").extends("ValueError");
        assert!(exc.is_a("ValueError"));
        assert!(ExceptionType::named("ValueError").matches(&exc));
    }

    #[test]
    fn test_named_type_matching() {
        let exc = Exception::key_error("a");
        assert!(ExceptionType::named("LookupError").matches(&exc));
        assert!(!ExceptionType::named("IndexError").matches(&exc));

        let foreign = BadValue { code: 1 };
        assert!(ExceptionType::named("Exception").matches(&foreign));
        assert!(!ExceptionType::named("ValueError").matches(&foreign));
    }

    #[test]
    fn test_rust_type_matching_and_attributes() {
        let ty = ExceptionType::with_attributes("BadValue", |err: &BadValue| {
            let mut attrs = Map::new();
            attrs.insert("code".into(), Value::Int(err.code));
            attrs
        });
        let err = BadValue { code: 7 };
        assert!(ty.matches(&err));
        assert_eq!(ty.attributes(&err).unwrap()["code"], Value::Int(7));
        assert!(!ty.matches(&Exception::value_error("x")));
    }

    #[test]
    fn test_source_chain() {
        let exc = Exception::value_error("outer").with_cause(Exception::key_error("inner"));
        let source = exc.source().unwrap();
        assert!(ExceptionType::named("KeyError").matches(source));
    }

    #[test]
    fn test_capture_foreign_error() {
        let err = BadValue { code: 3 };
        let exc = Exception::capture(&err, Some(&ExceptionType::of::<BadValue>("BadValue")));
        assert_eq!(exc.kind(), "BadValue");
        assert_eq!(exc.message(), "bad value 3");
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Exception::zero_division("division by zero").to_string(),
            "ZeroDivisionError: division by zero"
        );
        assert_eq!(Exception::new("ValueError", "").to_string(), "ValueError");
    }
}
