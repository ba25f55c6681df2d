//! A small expression and statement language for snippets embedded in
//! parameter files.
//!
//! Supported expressions: literals (`1`, `2.5`, `'s'`, `True`, `None`, lists,
//! tuples, dicts), names, attribute access, indexing, calls, arithmetic
//! (`+ - * / // % **`), comparisons (including `in` and chaining), `and`,
//! `or`, `not` and conditional expressions. Statements are assignments
//! (including tuple unpacking), `assert`, `pass` and bare expressions,
//! separated by newlines or `;`.

mod interp;
mod lexer;
mod parser;

use crate::exception::Exception;
use crate::value::{Map, Value};

/// Evaluates a single expression against `env`.
///
/// # Errors
///
/// Returns a `SyntaxError` for malformed input, or whatever exception the
/// evaluation raises.
pub fn evaluate(src: &str, env: &Map) -> Result<Value, Exception> {
    let expr = parser::parse_expression(src)?;
    interp::eval(&expr, env)
}

/// Executes statements, writing assignments into `env`.
///
/// # Errors
///
/// Returns a `SyntaxError` for malformed input, or the first exception
/// raised while executing. Assignments made before the failure remain in
/// `env`.
pub fn execute(src: &str, env: &mut Map) -> Result<(), Exception> {
    let program = parser::parse_program(src)?;
    interp::exec(&program, env)
}

/// Converts an evaluated mapping key into its string form.
pub(crate) fn key_string(key: &Value) -> Result<String, Exception> {
    interp::map_key(key)
}
