//! Error types for paramfile-core.

use thiserror::Error;

use crate::exception::Exception;

/// Result of evaluating or executing a snippet.
pub type Result<T> = std::result::Result<T, Exception>;

/// A malformed exception specification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    /// A mapping specification without a `type` entry.
    #[error("exception specification must define 'type'")]
    MissingType,

    /// A field that must hold a string or a list of strings.
    #[error("'{field}' must be a string or a list of strings, not {found}")]
    NotStrings {
        /// The offending field.
        field: &'static str,
        /// The value found.
        found: String,
    },

    /// `attrs` is not a mapping.
    #[error("'attrs' must be a mapping of attribute names to expected values, not {found}")]
    InvalidAttrs {
        /// The value found.
        found: String,
    },

    /// `assertions` is not a string.
    #[error("'assertions' must be a string, not {found}")]
    InvalidAssertions {
        /// The value found.
        found: String,
    },

    /// `cause` is neither a non-negative integer nor an expression.
    #[error("'cause' must be a non-negative integer or an expression, not {found}")]
    InvalidCause {
        /// The value found.
        found: String,
    },

    /// A `pattern` that does not compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern.
        pattern: String,
        /// Why it failed to compile.
        reason: String,
    },

    /// A specification that is not a string, list or mapping.
    #[error("expected 'none', an exception type, a list of types or a mapping, not {found}")]
    InvalidShape {
        /// The value found.
        found: String,
    },
}
