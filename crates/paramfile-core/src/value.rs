//! Dynamic values flowing through parameter files, namespaces and schemas.
//!
//! Parameter files only ever produce the plain data variants (`None`, `Bool`,
//! `Int`, `Float`, `Str`, `List`, `Map`). The remaining variants exist at
//! runtime: they are bound into namespaces by Rust code, produced by the
//! snippet interpreter, or inserted into test cases by schema stages.

use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::exception::{Exception, ExceptionType};
use crate::guard::ExpectationGuard;
use crate::namespace::{Module, Namespace};

/// Insertion-ordered mapping with string keys.
pub type Map = IndexMap<String, Value>;

type NativeFn = dyn Fn(&[Value]) -> Result<Value, Exception> + Send + Sync;
type Thunk = dyn Fn() -> Result<Value, Exception> + Send + Sync;

/// A named native function callable from snippets.
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    func: Arc<NativeFn>,
}

impl Function {
    /// Wraps a Rust closure so snippets can call it by name.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use paramfile_core::{Function, Value};
    ///
    /// let double = Function::new("double", |args| match args {
    ///     [Value::Int(n)] => Ok(Value::Int(n * 2)),
    ///     _ => Err(paramfile_core::Exception::type_error("double() takes one int")),
    /// });
    /// assert_eq!(double.call(&[Value::Int(2)]).unwrap(), Value::Int(4));
    /// ```
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Exception> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
        }
    }

    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls the function.
    ///
    /// # Errors
    ///
    /// Returns whatever exception the wrapped closure raises.
    pub fn call(&self, args: &[Value]) -> Result<Value, Exception> {
        (self.func)(args)
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name)
    }
}

/// A zero-argument evaluation postponed until the caller invokes it.
#[derive(Clone)]
pub struct Deferred {
    label: Arc<str>,
    thunk: Arc<Thunk>,
}

impl Deferred {
    /// Creates a deferred computation. The label only appears in `repr`.
    pub fn new<F>(label: impl Into<String>, thunk: F) -> Self
    where
        F: Fn() -> Result<Value, Exception> + Send + Sync + 'static,
    {
        Self {
            label: Arc::from(label.into()),
            thunk: Arc::new(thunk),
        }
    }

    /// Runs the deferred computation. Every call re-evaluates.
    ///
    /// # Errors
    ///
    /// Returns the exception raised by the underlying evaluation.
    pub fn call(&self) -> Result<Value, Exception> {
        (self.thunk)()
    }

    /// Returns the label describing what will be evaluated.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<deferred {}>", self.label)
    }
}

/// Inert stand-in for an expected value that will never be compared because
/// an exception is expected instead.
///
/// Attribute access, indexing, calls and arithmetic on a mock all yield new
/// mocks. A mock only equals itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mock {
    id: u64,
}

impl Mock {
    /// Creates a mock with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Returns the identity of this mock.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl Default for Mock {
    fn default() -> Self {
        Self::new()
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The absence of a value.
    #[default]
    None,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    Str(String),
    /// An ordered sequence. Tuples evaluate to lists as well.
    List(Vec<Value>),
    /// An insertion-ordered mapping.
    Map(Map),
    /// A native function.
    Function(Function),
    /// A module bound under its own name.
    Module(Arc<Module>),
    /// A namespace, e.g. the result of a deferred `exec`.
    Namespace(Namespace),
    /// An exception type that a guard can match against.
    ExceptionType(ExceptionType),
    /// A captured exception.
    Exception(Arc<Exception>),
    /// An exception-expectation guard.
    Guard(Arc<ExpectationGuard>),
    /// A placeholder standing in for an expected value.
    Mock(Mock),
    /// A postponed evaluation.
    Deferred(Deferred),
}

impl Value {
    /// Returns the interpreter-level type name, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "dict",
            Self::Function(_) => "function",
            Self::Module(_) => "module",
            Self::Namespace(_) => "Namespace",
            Self::ExceptionType(_) => "type",
            Self::Exception(_) => "exception",
            Self::Guard(_) => "guard",
            Self::Mock(_) => "Mock",
            Self::Deferred(_) => "deferred",
        }
    }

    /// Returns the truthiness of the value.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(x) => *x != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Map(map) => !map.is_empty(),
            Self::Guard(guard) => guard.is_active(),
            _ => true,
        }
    }

    /// Returns true for [`Value::None`].
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns the boolean, if this is a `Bool`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer, if this is an `Int`.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the number as a float, if this is an `Int` or a `Float`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the items, if this is a `List`.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the mapping, if this is a `Map`.
    #[must_use]
    pub const fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the guard, if this is a `Guard`.
    #[must_use]
    pub fn as_guard(&self) -> Option<&ExpectationGuard> {
        match self {
            Self::Guard(guard) => Some(guard),
            _ => None,
        }
    }

    /// Returns the deferred computation, if this is a `Deferred`.
    #[must_use]
    pub const fn as_deferred(&self) -> Option<&Deferred> {
        match self {
            Self::Deferred(deferred) => Some(deferred),
            _ => None,
        }
    }

    /// Returns the captured exception, if this is an `Exception`.
    #[must_use]
    pub fn as_exception(&self) -> Option<&Exception> {
        match self {
            Self::Exception(exc) => Some(exc),
            _ => None,
        }
    }

    /// Returns true if this is a mock placeholder.
    #[must_use]
    pub const fn is_mock(&self) -> bool {
        matches!(self, Self::Mock(_))
    }

    /// Converts the value to an integer the way the `int()` builtin does.
    ///
    /// Usable directly as a cast function: `cast().field("n", Value::into_int)`.
    ///
    /// # Errors
    ///
    /// Raises `ValueError` for strings that are not integer literals and
    /// `TypeError` for values that have no integer form.
    #[allow(clippy::cast_possible_truncation, clippy::needless_pass_by_value)]
    pub fn into_int(self) -> Result<Self, Exception> {
        match &self {
            Self::Int(_) => Ok(self),
            Self::Bool(b) => Ok(Self::Int(i64::from(*b))),
            Self::Float(x) if x.is_finite() => Ok(Self::Int(x.trunc() as i64)),
            Self::Float(x) => Err(Exception::value_error(format!(
                "cannot convert float {} to integer",
                format_float(*x)
            ))),
            Self::Str(s) => s.trim().replace('_', "").parse::<i64>().map(Self::Int).map_err(|_| {
                Exception::value_error(format!(
                    "invalid literal for int() with base 10: {}",
                    self.repr()
                ))
            }),
            other => Err(Exception::type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                other.type_name()
            ))),
        }
    }

    /// Converts the value to a float the way the `float()` builtin does.
    ///
    /// # Errors
    ///
    /// Raises `ValueError` for unparsable strings and `TypeError` for
    /// non-numeric values.
    #[allow(clippy::cast_precision_loss, clippy::needless_pass_by_value)]
    pub fn into_float(self) -> Result<Self, Exception> {
        match &self {
            Self::Float(_) => Ok(self),
            Self::Int(n) => Ok(Self::Float(*n as f64)),
            Self::Bool(b) => Ok(Self::Float(if *b { 1.0 } else { 0.0 })),
            Self::Str(s) => s.trim().parse::<f64>().map(Self::Float).map_err(|_| {
                Exception::value_error(format!(
                    "could not convert string to float: {}",
                    self.repr()
                ))
            }),
            other => Err(Exception::type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))),
        }
    }

    /// Renders the value the way the interpreter prints it with `repr()`.
    #[must_use]
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out);
        out
    }

    fn write_repr(&self, out: &mut String) {
        match self {
            Self::None => out.push_str("None"),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::Int(n) => {
                let _ = write!(out, "{n}");
            }
            Self::Float(x) => out.push_str(&format_float(*x)),
            Self::Str(s) => quote_into(s, out),
            Self::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out);
                }
                out.push(']');
            }
            Self::Map(map) => write_map_repr(map, out),
            Self::Function(func) => {
                let _ = write!(out, "<function {}>", func.name());
            }
            Self::Module(module) => {
                let _ = write!(out, "<module '{}'>", module.name());
            }
            Self::Namespace(ns) => {
                let _ = write!(out, "{ns:?}");
            }
            Self::ExceptionType(ty) => {
                let _ = write!(out, "<class '{}'>", ty.name());
            }
            Self::Exception(exc) => {
                let _ = write!(out, "{}(", exc.kind());
                quote_into(exc.message(), out);
                out.push(')');
            }
            Self::Guard(guard) => {
                let _ = write!(out, "{guard}");
            }
            Self::Mock(mock) => {
                let _ = write!(out, "<Mock id='{}'>", mock.id());
            }
            Self::Deferred(deferred) => {
                let _ = write!(out, "{deferred:?}");
            }
        }
    }
}

pub(crate) fn write_map_repr(map: &Map, out: &mut String) {
    out.push('{');
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        quote_into(key, out);
        out.push_str(": ");
        value.write_repr(out);
    }
    out.push('}');
}

fn quote_into(s: &str, out: &mut String) {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

pub(crate) fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        let inf = if x > 0.0 { "inf" } else { "-inf" };
        inf.to_string()
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

/// `str()` semantics: strings print bare, everything else prints its `repr`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Exception(exc) => f.write_str(exc.message()),
            other => f.write_str(&other.repr()),
        }
    }
}

impl PartialEq for Value {
    #[allow(clippy::cast_precision_loss)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Bool(a), Self::Int(b)) | (Self::Int(b), Self::Bool(a)) => i64::from(*a) == *b,
            (Self::Bool(a), Self::Float(b)) | (Self::Float(b), Self::Bool(a)) => {
                f64::from(u8::from(*a)) == *b
            }
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Module(a), Self::Module(b)) => Arc::ptr_eq(a, b),
            (Self::Namespace(a), Self::Namespace(b)) => a == b,
            (Self::ExceptionType(a), Self::ExceptionType(b)) => a == b,
            (Self::Exception(a), Self::Exception(b)) => Arc::ptr_eq(a, b),
            (Self::Guard(a), Self::Guard(b)) => Arc::ptr_eq(a, b),
            (Self::Mock(a), Self::Mock(b)) => a == b,
            (Self::Deferred(a), Self::Deferred(b)) => Arc::ptr_eq(&a.thunk, &b.thunk),
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::None,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int),
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Self::Map(map)
    }
}

impl From<Function> for Value {
    fn from(func: Function) -> Self {
        Self::Function(func)
    }
}

impl From<Module> for Value {
    fn from(module: Module) -> Self {
        Self::Module(Arc::new(module))
    }
}

impl From<Namespace> for Value {
    fn from(ns: Namespace) -> Self {
        Self::Namespace(ns)
    }
}

impl From<ExceptionType> for Value {
    fn from(ty: ExceptionType) -> Self {
        Self::ExceptionType(ty)
    }
}

impl From<Exception> for Value {
    fn from(exc: Exception) -> Self {
        Self::Exception(Arc::new(exc))
    }
}

impl From<ExpectationGuard> for Value {
    fn from(guard: ExpectationGuard) -> Self {
        Self::Guard(Arc::new(guard))
    }
}

impl From<Mock> for Value {
    fn from(mock: Mock) -> Self {
        Self::Mock(mock)
    }
}

impl From<Deferred> for Value {
    fn from(deferred: Deferred) -> Self {
        Self::Deferred(deferred)
    }
}
