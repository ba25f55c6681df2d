//! Error types for parameter resolution.
//!
//! Every failure is a [`ConfigError`]: a one-line brief (the
//! [`ConfigErrorKind`]), breadcrumbs naming where resolution was when it
//! failed, optional hints, and an optional underlying cause.

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for parameter resolution.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Boxed error accepted from user-supplied loaders, hooks and casts.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// What went wrong. The `Display` form is the error's brief.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// No default parameter file exists next to the test.
    #[error("can't find parametrization file")]
    NotFound {
        /// Every path that was checked.
        candidates: Vec<PathBuf>,
    },

    /// More than one default parameter file exists next to the test.
    #[error("found multiple parametrization files")]
    Ambiguous {
        /// Every path that exists.
        candidates: Vec<PathBuf>,
    },

    /// An explicit parameter file does not exist.
    #[error("parametrization file not found")]
    MissingFile {
        /// The missing path.
        path: PathBuf,
    },

    /// Neither a path nor a calling test file was given.
    #[error("no parametrization file given")]
    NoPath,

    /// The file's extension has no loader.
    #[error("parametrization file must have a recognized extension")]
    UnrecognizedExtension {
        /// The file.
        path: PathBuf,
        /// Extensions that do have loaders.
        known: Vec<String>,
    },

    /// The loader failed.
    #[error("failed to load parametrization file")]
    LoadFailed {
        /// The file.
        path: PathBuf,
        /// Name of the loader that failed.
        loader: String,
    },

    /// The loaded file has no entry for the key.
    #[error("must specify parameters for '{key}'")]
    MissingKey {
        /// The missing key.
        key: String,
        /// Keys the file does define.
        available: Vec<String>,
    },

    /// Paths and keys were both lists, of different lengths.
    #[error("must specify matching numbers of paths and keys")]
    MismatchedCounts {
        /// Number of paths.
        paths: usize,
        /// Number of keys.
        keys: usize,
    },

    /// The preprocess hook failed.
    #[error("preprocess hook failed")]
    PreprocessFailed,

    /// The preprocess hook returned something other than a list.
    #[error("expected preprocess to return list of dicts, not {found}")]
    BadPreprocessResult {
        /// What the hook returned.
        found: String,
    },

    /// The key's value is not a list.
    #[error("expected list of dicts, not {found}")]
    NotAList {
        /// What the file holds under the key.
        found: String,
    },

    /// A test case is not a mapping.
    #[error("expected dict, not {found}")]
    NotAMapping {
        /// The offending test case.
        found: String,
    },

    /// A schema stage rejected a test case.
    #[error("test case failed schema validation")]
    SchemaFailed {
        /// The test case, one `'key': value` line per parameter.
        case: String,
    },

    /// A test case lacks parameters other test cases define.
    #[error("every test case must specify the same parameters")]
    InconsistentKeys {
        /// The test case, one `'key': value` line per parameter.
        case: String,
        /// The parameters it lacks, sorted.
        missing: Vec<String>,
    },

    /// An `id` field that is not a scalar.
    #[error("test case id must be a string, not {found}")]
    InvalidId {
        /// The offending id.
        found: String,
    },

    /// A `marks` field that is not a string or list of strings.
    #[error("marks must be a comma-separated string or a list of strings, not {found}")]
    InvalidMarks {
        /// The offending marks.
        found: String,
    },

    /// A test case gives both an error and expected values.
    #[error("must specify either an expected value or an error, not both")]
    ErrorAndExpected {
        /// Expected-value parameters that are present.
        expected: Vec<String>,
        /// The error parameter.
        param: String,
    },

    /// An error parameter is not a valid exception specification.
    #[error("invalid exception specification")]
    InvalidExpectation,

    /// No loader is registered for the extension.
    #[error("no loader registered for '{suffix}'")]
    UnknownLoader {
        /// The extension.
        suffix: String,
    },
}

impl ConfigErrorKind {
    /// Detail lines rendered under the brief.
    fn details(&self) -> Vec<String> {
        let paths = |paths: &[PathBuf]| {
            paths
                .iter()
                .map(|p| format!("  {}", p.display()))
                .collect::<Vec<_>>()
        };
        match self {
            Self::NotFound { candidates } => {
                let mut lines = vec!["tried:".to_string()];
                lines.extend(paths(candidates));
                lines
            }
            Self::Ambiguous { candidates } => {
                let mut lines = vec!["found:".to_string()];
                lines.extend(paths(candidates));
                lines
            }
            Self::MissingFile { path } => vec![format!("path: {}", path.display())],
            Self::LoadFailed { path, loader } => vec![
                format!("path: {}", path.display()),
                format!("attempted to load file with: {loader}"),
            ],
            Self::UnrecognizedExtension { path, known } => vec![
                format!("path: {}", path.display()),
                format!("recognized extensions: {}", known.join(", ")),
            ],
            Self::MissingKey { available, .. } if !available.is_empty() => {
                vec![format!("available keys: {}", available.join(", "))]
            }
            Self::MismatchedCounts { paths, keys } => vec![
                format!("number of paths: {paths}"),
                format!("number of keys: {keys}"),
            ],
            Self::SchemaFailed { case } => vec![format!("test case:\n{case}")],
            Self::InconsistentKeys { case, missing } => vec![
                format!("test case:\n{case}"),
                format!("the following parameters are missing: {}", missing.join(", ")),
            ],
            Self::ErrorAndExpected { expected, param } => vec![
                format!("expected value parameter(s): {}", expected.join(", ")),
                format!("error parameter: {param}"),
            ],
            _ => Vec::new(),
        }
    }
}

/// One breadcrumb: where resolution was when the error occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    /// What the value is, e.g. `parameter file`.
    pub label: String,
    /// The value, e.g. the path.
    pub value: String,
}

/// A parameter resolution failure.
#[derive(Debug)]
pub struct ConfigError {
    kind: ConfigErrorKind,
    info: Vec<Info>,
    hints: Vec<String>,
    source: Option<BoxError>,
}

impl ConfigError {
    /// Creates an error with the given kind and no context.
    #[must_use]
    pub const fn new(kind: ConfigErrorKind) -> Self {
        Self {
            kind,
            info: Vec::new(),
            hints: Vec::new(),
            source: None,
        }
    }

    /// Records the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Adds a breadcrumb. Breadcrumbs added later describe outer context and
    /// render first.
    #[must_use]
    pub fn with_info(mut self, label: impl Into<String>, value: impl fmt::Display) -> Self {
        self.info.insert(
            0,
            Info {
                label: label.into(),
                value: value.to_string(),
            },
        );
        self
    }

    /// Adds a hint on how to fix the problem.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    /// Returns what went wrong.
    #[must_use]
    pub const fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }

    /// Returns the one-line summary.
    #[must_use]
    pub fn brief(&self) -> String {
        self.kind.to_string()
    }

    /// Returns the breadcrumbs, outermost first.
    #[must_use]
    pub fn info(&self) -> &[Info] {
        &self.info
    }

    /// Returns the value of the first breadcrumb with the given label.
    #[must_use]
    pub fn info_value(&self, label: &str) -> Option<&str> {
        self.info
            .iter()
            .find(|info| info.label == label)
            .map(|info| info.value.as_str())
    }

    /// Returns the hints.
    #[must_use]
    pub fn hints(&self) -> &[String] {
        &self.hints
    }
}

impl From<ConfigErrorKind> for ConfigError {
    fn from(kind: ConfigErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for info in &self.info {
            write!(f, "\n• {}: {}", info.label, info.value)?;
        }
        for detail in self.kind.details() {
            write!(f, "\n✖ {detail}")?;
        }
        if let Some(source) = &self.source {
            write!(f, "\n✖ {source}")?;
        }
        for hint in &self.hints {
            write!(f, "\n• hint: {hint}")?;
        }
        Ok(())
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

/// Adds breadcrumbs to errors as they propagate.
pub trait Context<T> {
    /// Adds a breadcrumb to the error, if any.
    ///
    /// # Errors
    ///
    /// Returns the original error with the breadcrumb attached.
    fn context(self, label: &str, value: impl fmt::Display) -> Result<T>;
}

impl<T> Context<T> for Result<T> {
    fn context(self, label: &str, value: impl fmt::Display) -> Result<T> {
        self.map_err(|err| err.with_info(label, value))
    }
}

/// A [`Cast`](crate::schema::Cast) function rejected a parameter. The
/// function's own error is kept as the source.
#[derive(Error, Debug)]
#[error("failed to cast '{name}': {source}")]
pub struct CastError {
    /// The parameter being converted.
    pub name: String,
    /// What the cast function returned.
    #[source]
    pub source: BoxError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::new(ConfigErrorKind::MissingKey {
            key: "test_add".to_string(),
            available: vec!["test_sub".to_string()],
        })
        .with_info("top-level key", "test_add")
        .with_info("parameter file", "/tmp/test_math.json")
        .with_hint("the file should map test names to lists of test cases");

        let rendered = err.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "must specify parameters for 'test_add'");
        assert_eq!(lines[1], "• parameter file: /tmp/test_math.json");
        assert_eq!(lines[2], "• top-level key: test_add");
        assert_eq!(lines[3], "✖ available keys: test_sub");
        assert!(lines[4].starts_with("• hint:"));
    }

    #[test]
    fn test_context_trait() {
        let result: Result<()> = Err(ConfigError::new(ConfigErrorKind::NoPath));
        let err = result.context("test", "test_add").unwrap_err();
        assert_eq!(err.info_value("test"), Some("test_add"));
        assert_eq!(err.brief(), "no parametrization file given");
    }

    #[test]
    fn test_source_chain() {
        let io = std::io::Error::other("disk on fire");
        let err = ConfigError::new(ConfigErrorKind::LoadFailed {
            path: PathBuf::from("x.json"),
            loader: "json".to_string(),
        })
        .with_source(io);
        assert_eq!(err.source().unwrap().to_string(), "disk on fire");
        assert!(err.to_string().contains("✖ disk on fire"));
        assert!(err.to_string().contains("✖ attempted to load file with: json"));
    }

    #[test]
    fn test_inconsistent_keys_details() {
        let err = ConfigError::new(ConfigErrorKind::InconsistentKeys {
            case: "'a': 1".to_string(),
            missing: vec!["b".to_string(), "c".to_string()],
        });
        assert!(err
            .to_string()
            .contains("the following parameters are missing: b, c"));
    }
}
