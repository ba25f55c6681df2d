//! Running a test body once per resolved case.
//!
//! Rust's built-in harness cannot register test cases at run time, so a
//! parametrized test resolves its cases and hands them to a [`CaseRunner`]
//! from inside a single `#[test]` function.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::reporter::{ConsoleReporter, Reporter};
use crate::resolve::{CaseView, Mark, Parametrization};

/// Configuration for the case runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Whether to stop at the first failing case.
    pub fail_fast: bool,
    /// Whether a panicking case is recorded as a failure instead of
    /// unwinding through the runner.
    pub catch_panics: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            catch_panics: true,
        }
    }
}

impl RunnerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets fail-fast mode.
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Sets whether panics are caught.
    #[must_use]
    pub const fn with_catch_panics(mut self, catch_panics: bool) -> Self {
        self.catch_panics = catch_panics;
        self
    }
}

/// How a case ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseOutcome {
    /// The body succeeded.
    Passed,
    /// The body failed or panicked.
    Failed,
    /// The case is marked `skip` and was not run.
    Skipped,
    /// The case is marked `xfail` and failed.
    XFailed,
    /// The case is marked `xfail` but succeeded.
    XPassed,
}

impl CaseOutcome {
    /// Returns true if this outcome fails the run.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for CaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::XFailed => "xfailed",
            Self::XPassed => "xpassed",
        })
    }
}

/// Result of running one case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    /// The case id.
    pub id: String,
    /// How the case ended.
    pub outcome: CaseOutcome,
    /// Time spent in the body.
    pub duration: Duration,
    /// The case's marks.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<Mark>,
    /// The failure message, for failed and xfailed cases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaseResult {
    /// Creates a result with no marks and no error.
    #[must_use]
    pub fn new(id: impl Into<String>, outcome: CaseOutcome, duration: Duration) -> Self {
        Self {
            id: id.into(),
            outcome,
            duration,
            marks: Vec::new(),
            error: None,
        }
    }

    /// Creates a passing result.
    #[must_use]
    pub fn pass(id: impl Into<String>, duration: Duration) -> Self {
        Self::new(id, CaseOutcome::Passed, duration)
    }

    /// Creates a failing result.
    #[must_use]
    pub fn fail(id: impl Into<String>, duration: Duration, error: impl Into<String>) -> Self {
        Self::new(id, CaseOutcome::Failed, duration).with_error(error)
    }

    /// Records the failure message.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Records the case's marks.
    #[must_use]
    pub fn with_marks(mut self, marks: Vec<Mark>) -> Self {
        self.marks = marks;
        self
    }
}

/// Aggregated results of one run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    /// Individual case results, in run order.
    pub results: Vec<CaseResult>,
    /// Total duration of the run.
    pub total_duration: Duration,
    /// Whether the run stopped early.
    pub stopped_early: bool,
}

impl RunSummary {
    /// Creates an empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a case result.
    pub fn add(&mut self, result: CaseResult) {
        self.results.push(result);
    }

    fn count(&self, outcome: CaseOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Returns the number of passed cases.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(CaseOutcome::Passed)
    }

    /// Returns the number of failed cases.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(CaseOutcome::Failed)
    }

    /// Returns the number of skipped cases.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(CaseOutcome::Skipped)
    }

    /// Returns the number of expected failures.
    #[must_use]
    pub fn xfailed(&self) -> usize {
        self.count(CaseOutcome::XFailed)
    }

    /// Returns the number of unexpected passes.
    #[must_use]
    pub fn xpassed(&self) -> usize {
        self.count(CaseOutcome::XPassed)
    }

    /// Returns the number of recorded cases.
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Returns true if no case failed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        !self.results.iter().any(|r| r.outcome.is_failure())
    }

    /// Returns the failed cases.
    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.results.iter().filter(|r| r.outcome.is_failure())
    }

    /// Returns the result for case `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CaseResult> {
        self.results.iter().find(|r| r.id == id)
    }

    /// Panics with a rendered report if any case failed.
    ///
    /// # Panics
    ///
    /// Panics if [`RunSummary::all_passed`] is false.
    pub fn assert_all_passed(&self) {
        if !self.all_passed() {
            let report = ConsoleReporter::new().with_colors(false).render(self);
            panic!("{} of {} test cases failed:\n{report}", self.failed(), self.total());
        }
    }
}

/// Runs a test body once per case.
///
/// # Examples
///
/// ```rust
/// use paramfile::{CaseRunner, Parametrization, RunnerConfig};
///
/// let runner = CaseRunner::new(RunnerConfig::default());
/// let summary = runner.run(&Parametrization::default(), |_case| Ok::<(), String>(()));
/// assert!(summary.all_passed());
/// ```
#[derive(Debug, Default)]
pub struct CaseRunner {
    config: RunnerConfig,
}

impl CaseRunner {
    /// Creates a runner with the given configuration.
    #[must_use]
    pub const fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Returns the runner configuration.
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs `body` for every case of `params`, in order.
    ///
    /// Cases marked `skip` are not run. Cases marked `xfail` are expected to
    /// fail: a failure is recorded as `xfailed` and a success as `xpassed`.
    pub fn run<F, E>(&self, params: &Parametrization, mut body: F) -> RunSummary
    where
        F: FnMut(CaseView<'_>) -> Result<(), E>,
        E: fmt::Display,
    {
        let start = Instant::now();
        let mut summary = RunSummary::new();

        for case in params.iter() {
            let result = self.run_case(case, &mut body);
            let failed = result.outcome.is_failure();
            summary.add(result);

            if self.config.fail_fast && failed {
                warn!(case = %case.id(), "Stopping early due to fail-fast mode");
                summary.stopped_early = true;
                break;
            }
        }

        summary.total_duration = start.elapsed();
        info!(
            passed = summary.passed(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            total = summary.total(),
            "Test cases completed"
        );
        summary
    }

    fn run_case<F, E>(&self, case: CaseView<'_>, body: &mut F) -> CaseResult
    where
        F: FnMut(CaseView<'_>) -> Result<(), E>,
        E: fmt::Display,
    {
        let marks = case.marks().to_vec();
        if marks.iter().any(Mark::is_skip) {
            debug!(case = %case.id(), "Skipping test case");
            return CaseResult::new(case.id(), CaseOutcome::Skipped, Duration::ZERO)
                .with_marks(marks);
        }

        debug!(case = %case.id(), "Running test case");
        let start = Instant::now();
        let error = if self.config.catch_panics {
            match panic::catch_unwind(AssertUnwindSafe(|| body(case))) {
                Ok(result) => result.err().map(|err| err.to_string()),
                Err(payload) => Some(panic_message(payload.as_ref())),
            }
        } else {
            body(case).err().map(|err| err.to_string())
        };
        let duration = start.elapsed();

        let xfail = marks.iter().any(Mark::is_xfail);
        let outcome = match (&error, xfail) {
            (None, false) => CaseOutcome::Passed,
            (Some(_), false) => CaseOutcome::Failed,
            (Some(_), true) => CaseOutcome::XFailed,
            (None, true) => {
                warn!(case = %case.id(), "Test case marked xfail passed unexpectedly");
                CaseOutcome::XPassed
            }
        };
        let result = CaseResult::new(case.id(), outcome, duration).with_marks(marks);
        match error {
            Some(error) => result.with_error(error),
            None => result,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .map_or_else(|| "test case panicked".to_string(), |msg| format!("panicked: {msg}"))
}
