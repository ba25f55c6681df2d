//! # Paramfile
//!
//! Parametrize tests with cases read from files.
//!
//! This crate provides:
//!
//! - Loading parameter files in JSON, YAML, TOML and NestedText, with a
//!   registry for more formats
//! - Resolving a test's cases: locating the file, caching it, running
//!   preprocess hooks and schemas, and checking the cases agree
//! - Schema stages for converting values, adding defaults and expecting
//!   errors
//! - A case runner and reporters for running a test body once per case
//!
//! ## Example
//!
//! A parameter file next to the test, `tests/test_math.yaml`:
//!
//! ```yaml
//! test_add:
//!   - a: 1
//!     b: 2
//!     expected: 3
//!   - a: 1
//!     b: x
//!     error: TypeError
//! ```
//!
//! ```rust,no_run
//! use paramfile::{CaseRunner, NamespaceExt, ResolveRequest};
//! use paramfile_core::{Exception, Namespace, Value};
//!
//! fn add(a: &Value, b: &Value) -> Result<i64, Exception> {
//!     match (a.as_i64(), b.as_i64()) {
//!         (Some(a), Some(b)) => Ok(a + b),
//!         _ => Err(Exception::type_error("operands must be integers")),
//!     }
//! }
//!
//! let request = ResolveRequest::new("test_add")
//!     .with_caller(file!())
//!     .with_schema(Namespace::new().error_or(["expected"]));
//! let params = paramfile::resolve(&request)?;
//!
//! CaseRunner::default()
//!     .run(&params, |case| -> Result<(), Box<dyn std::error::Error>> {
//!         let guard = case["error"].as_guard().ok_or("missing error guard")?;
//!         if let Some(sum) = guard.check(|| add(&case["a"], &case["b"]))? {
//!             if Value::Int(sum) != case["expected"] {
//!                 return Err(format!("{sum} != {}", case["expected"]).into());
//!             }
//!         }
//!         Ok(())
//!     })
//!     .assert_all_passed();
//! # Ok::<(), paramfile::ConfigError>(())
//! ```

pub mod cache;
pub mod discovery;
pub mod error;
pub mod loaders;
pub mod nestedtext;
pub mod reporter;
pub mod resolve;
pub mod runner;
pub mod schema;

#[cfg(test)]
mod proptest_tests;

pub use cache::SuiteCache;
pub use discovery::{zip_broadcast, OneOrMany};
pub use error::{BoxError, CastError, ConfigError, ConfigErrorKind, Context, Info, Result};
pub use loaders::{Loader, LoaderRegistry, Loaders, SuiteParams};
pub use reporter::{ConsoleReporter, JsonReporter, Reporter};
pub use resolve::{resolve, CaseView, Mark, Parametrization, ResolveRequest, ResolvedCase, Resolver};
pub use runner::{CaseOutcome, CaseResult, CaseRunner, RunSummary, RunnerConfig};
pub use schema::{
    cast, defaults, error, error_or, CaseParams, Cast, Defaults, ErrorOr, NamespaceExt, Schema,
    SchemaStage, StageResult,
};
