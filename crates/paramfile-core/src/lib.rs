//! # Paramfile Core
//!
//! Evaluation building blocks for file-driven test parametrization.
//!
//! This crate provides:
//!
//! - [`Value`]: the dynamic values parameter files and snippets produce
//! - [`Namespace`]: immutable environments for evaluating and executing
//!   snippets embedded in parameter files
//! - [`ExpectationGuard`]: reusable guards asserting that code either raises
//!   a particular error or raises nothing
//! - [`Exception`] and [`ExceptionType`]: the errors snippets raise and the
//!   types guards match against, including plain Rust error types
//!
//! ## Example
//!
//! ```rust
//! use paramfile_core::{ExpectationGuard, Namespace, Value};
//! use serde_json::json;
//!
//! let ns = Namespace::builder().code("import_base = 10").build().unwrap();
//! assert_eq!(ns.eval("import_base * 2").unwrap(), Value::Int(20));
//!
//! let spec = Value::from(json!({"type": "ZeroDivisionError", "message": "by zero"}));
//! let guard = ExpectationGuard::from_spec(&spec, &ns).unwrap();
//! assert!(guard.check(|| ns.eval("1 / 0")).unwrap().is_none());
//! ```

pub mod error;
pub mod exception;
pub mod expr;
pub mod guard;
pub mod namespace;
pub mod value;

#[cfg(test)]
mod proptest_tests;

pub use error::{Result, SpecError};
pub use exception::{Exception, ExceptionType};
pub use guard::{Exit, Expectation, ExpectationFailure, ExpectationGuard, GuardError};
pub use namespace::{star, Get, Module, Namespace, NamespaceBuilder, Source};
pub use value::{Deferred, Function, Map, Mock, Value};
