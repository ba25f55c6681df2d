//! Immutable evaluation environments for snippets.
//!
//! A [`Namespace`] is built once from a list of [`Source`]s and keyword
//! bindings and never changes afterwards. Every derivation ([`Namespace::fork`],
//! [`Namespace::exec`]) produces a new namespace and leaves the original
//! untouched, so a namespace can be shared freely between test cases.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::error::SpecError;
use crate::exception::Exception;
use crate::expr;
use crate::guard::ExpectationGuard;
use crate::value::{write_map_repr, Deferred, Map, Value};

/// A named collection of values, bound into namespaces like an imported
/// module.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    attrs: Map,
    exports: Option<Vec<String>>,
}

impl Module {
    /// Creates an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Map::new(),
            exports: None,
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Declares the names a star import exposes.
    #[must_use]
    pub fn with_exports<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exports = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Returns the bindings a star import brings in: the declared exports if
    /// any, otherwise every attribute whose name does not start with `_`.
    #[must_use]
    pub fn public(&self) -> Map {
        match &self.exports {
            Some(exports) => exports
                .iter()
                .filter_map(|name| self.attrs.get(name).map(|v| (name.clone(), v.clone())))
                .collect(),
            None => self
                .attrs
                .iter()
                .filter(|(name, _)| !name.starts_with('_'))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }
}

/// Returns the bindings `from module import *` would bring in.
#[must_use]
pub fn star(module: &Module) -> Map {
    module.public()
}

/// One input to a namespace, applied in order.
#[derive(Debug, Clone)]
pub enum Source {
    /// Statements to execute; every name they bind is added.
    Code(String),
    /// Bindings to add directly.
    Bindings(Map),
    /// A module bound under its own name.
    Module(Arc<Module>),
    /// Every public binding of a module.
    Star(Arc<Module>),
    /// Every binding of another namespace.
    Namespace(Namespace),
}

impl From<&str> for Source {
    fn from(code: &str) -> Self {
        Self::Code(code.to_string())
    }
}

impl From<String> for Source {
    fn from(code: String) -> Self {
        Self::Code(code)
    }
}

impl From<Map> for Source {
    fn from(bindings: Map) -> Self {
        Self::Bindings(bindings)
    }
}

impl From<Module> for Source {
    fn from(module: Module) -> Self {
        Self::Module(Arc::new(module))
    }
}

impl From<Namespace> for Source {
    fn from(ns: Namespace) -> Self {
        Self::Namespace(ns)
    }
}

/// Builder for [`Namespace`]. Sources are applied in the order given and
/// keyword bindings are applied last.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct NamespaceBuilder {
    base: Map,
    sources: Vec<Source>,
    keywords: Map,
}

impl NamespaceBuilder {
    /// Adds a source.
    pub fn source(mut self, source: impl Into<Source>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Adds statements to execute.
    pub fn code(self, code: impl Into<String>) -> Self {
        self.source(Source::Code(code.into()))
    }

    /// Adds bindings from any iterator of name/value pairs.
    pub fn bindings<I, K, V>(self, bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let map = bindings
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.source(Source::Bindings(map))
    }

    /// Binds a module under its own name.
    pub fn module(self, module: Module) -> Self {
        self.source(Source::Module(Arc::new(module)))
    }

    /// Adds every public binding of a module.
    pub fn star(self, module: Module) -> Self {
        self.source(Source::Star(Arc::new(module)))
    }

    /// Adds a keyword binding. Keyword bindings win over every source.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.insert(name.into(), value.into());
        self
    }

    /// Applies every source and keyword binding.
    ///
    /// # Errors
    ///
    /// Returns the exception raised by a `Code` source.
    pub fn build(self) -> Result<Namespace, Exception> {
        let mut bindings = self.base;
        for source in self.sources {
            match source {
                Source::Code(code) => expr::execute(&code, &mut bindings)?,
                Source::Bindings(map) => bindings.extend(map),
                Source::Module(module) => {
                    bindings.insert(module.name().to_string(), Value::Module(module));
                }
                Source::Star(module) => bindings.extend(module.public()),
                Source::Namespace(ns) => {
                    bindings.extend(ns.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
        }
        bindings.extend(self.keywords);
        trace!(names = bindings.len(), "Built namespace");
        Ok(Namespace {
            bindings: Arc::new(bindings),
        })
    }
}

/// What [`Namespace::exec`] style calls hand back.
#[derive(Clone)]
pub enum Get {
    /// The whole derived namespace.
    All,
    /// One binding of the derived namespace.
    Name(String),
    /// Several bindings, returned as a list in the order given.
    Names(Vec<String>),
    /// The result of applying a function to the derived namespace.
    With(Arc<dyn Fn(&Namespace) -> Result<Value, Exception> + Send + Sync>),
}

impl Get {
    /// Wraps a function applied to the derived namespace.
    pub fn with<F>(f: F) -> Self
    where
        F: Fn(&Namespace) -> Result<Value, Exception> + Send + Sync + 'static,
    {
        Self::With(Arc::new(f))
    }
}

impl fmt::Debug for Get {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Name(name) => write!(f, "Name({name:?})"),
            Self::Names(names) => write!(f, "Names({names:?})"),
            Self::With(_) => f.write_str("With(..)"),
        }
    }
}

/// An immutable mapping from names to values, with helpers to evaluate and
/// execute snippets against it.
///
/// # Examples
///
/// ```rust
/// use paramfile_core::{Namespace, Value};
///
/// let ns = Namespace::builder().code("a = 1; b = a + 1").build().unwrap();
/// assert_eq!(ns.eval("a + b").unwrap(), Value::Int(3));
///
/// let derived = ns.exec("c = a * 10").unwrap();
/// assert_eq!(derived.get("c"), Some(&Value::Int(10)));
/// assert!(ns.get("c").is_none());
/// ```
#[derive(Clone, Default)]
pub struct Namespace {
    bindings: Arc<Map>,
}

impl Namespace {
    /// Creates an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts building a namespace from scratch.
    pub fn builder() -> NamespaceBuilder {
        NamespaceBuilder::default()
    }

    /// Creates a namespace holding exactly the given bindings.
    pub fn from_bindings<I, K, V>(bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            bindings: Arc::new(
                bindings
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Starts building a new namespace seeded with this one's bindings.
    pub fn fork(&self) -> NamespaceBuilder {
        NamespaceBuilder {
            base: (*self.bindings).clone(),
            ..NamespaceBuilder::default()
        }
    }

    /// Returns a shallow copy. Values are shared.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Looks up a binding.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Returns true if `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Returns the number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Iterates over the bindings in insertion order.
    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.bindings.iter()
    }

    /// Returns the bindings as a map.
    #[must_use]
    pub fn bindings(&self) -> &Map {
        &self.bindings
    }

    /// Evaluates `src` in this namespace.
    ///
    /// Strings are evaluated as expressions. Lists are evaluated item by
    /// item. Mappings have their values evaluated and their keys kept as
    /// they are. Mocks and guards pass through unchanged, so values already
    /// replaced by a schema survive a later evaluation.
    ///
    /// # Errors
    ///
    /// Returns the exception raised by the evaluation, or a `TypeError`
    /// for any other kind of value.
    pub fn eval(&self, src: impl Into<Value>) -> Result<Value, Exception> {
        self.eval_value(&src.into(), false)
    }

    /// Like [`Namespace::eval`], but mapping keys are evaluated too and
    /// converted to strings.
    ///
    /// # Errors
    ///
    /// As for [`Namespace::eval`]. Keys evaluating to a list or mapping
    /// raise `TypeError`.
    pub fn eval_with_keys(&self, src: impl Into<Value>) -> Result<Value, Exception> {
        self.eval_value(&src.into(), true)
    }

    /// Evaluates several sources, one result per source.
    ///
    /// # Errors
    ///
    /// Returns the first exception raised.
    pub fn eval_many<I, S>(&self, sources: I) -> Result<Vec<Value>, Exception>
    where
        I: IntoIterator<Item = S>,
        S: Into<Value>,
    {
        sources.into_iter().map(|src| self.eval(src)).collect()
    }

    /// Returns a deferred evaluation of `src`. Nothing is evaluated until the
    /// result is called.
    pub fn eval_deferred(&self, src: impl Into<Value>, keys: bool) -> Deferred {
        let src = src.into();
        let ns = self.clone();
        Deferred::new(format!("eval {}", src.repr()), move || {
            ns.eval_value(&src, keys)
        })
    }

    /// Returns a function evaluating its argument in this namespace, suitable
    /// for use as a cast.
    pub fn evaluator(
        &self,
        keys: bool,
    ) -> impl Fn(Value) -> Result<Value, Exception> + Send + Sync + Clone + 'static {
        let ns = self.clone();
        move |src| ns.eval_value(&src, keys)
    }

    /// Returns a function wrapping its argument in a deferred evaluation,
    /// suitable for use as a cast.
    pub fn deferred_evaluator(
        &self,
        keys: bool,
    ) -> impl Fn(Value) -> Result<Value, Exception> + Send + Sync + Clone + 'static {
        let ns = self.clone();
        move |src| Ok(Value::Deferred(ns.eval_deferred(src, keys)))
    }

    fn eval_value(&self, src: &Value, keys: bool) -> Result<Value, Exception> {
        match src {
            Value::Str(code) => expr::evaluate(code, &self.bindings),
            Value::List(items) => items
                .iter()
                .map(|item| self.eval_value(item, keys))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Value::Map(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, value) in map {
                    let key = if keys {
                        expr::key_string(&expr::evaluate(key, &self.bindings)?)?
                    } else {
                        key.clone()
                    };
                    out.insert(key, self.eval_value(value, keys)?);
                }
                Ok(Value::Map(out))
            }
            Value::Mock(_) | Value::Guard(_) => Ok(src.clone()),
            other => Err(Exception::type_error(format!(
                "eval() arg must be a string, list or dict, not {}",
                other.type_name()
            ))),
        }
    }

    /// Executes `snippet` in a fork of this namespace and returns the fork.
    ///
    /// # Errors
    ///
    /// Returns the exception raised by the snippet.
    pub fn exec(&self, snippet: &str) -> Result<Self, Exception> {
        let mut bindings = (*self.bindings).clone();
        expr::execute(snippet, &mut bindings)?;
        Ok(Self {
            bindings: Arc::new(bindings),
        })
    }

    /// Executes `snippet` and returns one binding from the result.
    ///
    /// # Errors
    ///
    /// Returns the exception raised by the snippet, or `KeyError` if the
    /// snippet does not bind `name`.
    pub fn exec_get(&self, snippet: &str, name: &str) -> Result<Value, Exception> {
        let derived = self.exec(snippet)?;
        derived
            .get(name)
            .cloned()
            .ok_or_else(|| Exception::key_error(name))
    }

    /// Executes `snippet` and hands the result to `f`.
    ///
    /// # Errors
    ///
    /// Returns the exception raised by the snippet.
    pub fn exec_with<R>(&self, snippet: &str, f: impl FnOnce(&Self) -> R) -> Result<R, Exception> {
        let derived = self.exec(snippet)?;
        Ok(f(&derived))
    }

    /// Executes a snippet value and returns what `get` selects.
    ///
    /// Mocks and guards pass through unchanged.
    ///
    /// # Errors
    ///
    /// Returns the exception raised by the snippet, `KeyError` for missing
    /// names, or `TypeError` if `snippet` is not a string.
    pub fn exec_value(&self, snippet: &Value, get: &Get) -> Result<Value, Exception> {
        let code = match snippet {
            Value::Mock(_) | Value::Guard(_) => return Ok(snippet.clone()),
            Value::Str(code) => code,
            other => {
                return Err(Exception::type_error(format!(
                    "exec() arg must be a string, not {}",
                    other.type_name()
                )))
            }
        };
        match get {
            Get::All => self.exec(code).map(Value::Namespace),
            Get::Name(name) => self.exec_get(code, name),
            Get::Names(names) => {
                let derived = self.exec(code)?;
                names
                    .iter()
                    .map(|name| {
                        derived
                            .get(name)
                            .cloned()
                            .ok_or_else(|| Exception::key_error(name))
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)
            }
            Get::With(f) => f(&self.exec(code)?),
        }
    }

    /// Returns a deferred execution of `snippet`.
    pub fn exec_deferred(&self, snippet: impl Into<Value>, get: Get) -> Deferred {
        let snippet = snippet.into();
        let ns = self.clone();
        Deferred::new(format!("exec {}", snippet.repr()), move || {
            ns.exec_value(&snippet, &get)
        })
    }

    /// Returns a function executing its argument in this namespace, suitable
    /// for use as a cast.
    pub fn executor(
        &self,
        get: Get,
    ) -> impl Fn(Value) -> Result<Value, Exception> + Send + Sync + Clone + 'static {
        let ns = self.clone();
        move |snippet| ns.exec_value(&snippet, &get)
    }

    /// Returns a function wrapping its argument in a deferred execution,
    /// suitable for use as a cast.
    pub fn deferred_executor(
        &self,
        get: Get,
    ) -> impl Fn(Value) -> Result<Value, Exception> + Send + Sync + Clone + 'static {
        let ns = self.clone();
        move |snippet| Ok(Value::Deferred(ns.exec_deferred(snippet, get.clone())))
    }

    /// Builds an exception-expectation guard whose expressions are evaluated
    /// in this namespace.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] if `spec` is not a valid exception
    /// specification.
    pub fn error(&self, spec: &Value) -> Result<ExpectationGuard, SpecError> {
        ExpectationGuard::from_spec(spec, self)
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bindings, &other.bindings) || self.bindings == other.bindings
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::from("Namespace(");
        write_map_repr(&self.bindings, &mut out);
        out.push(')');
        f.write_str(&out)
    }
}

impl<'a> IntoIterator for &'a Namespace {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
