//! Case result reporting.
//!
//! This module provides formatters for run summaries.

use std::fmt::Write as FmtWrite;
use std::io::{self, Write};

use crate::runner::{CaseOutcome, CaseResult, RunSummary};

/// Trait for reporting run summaries.
pub trait Reporter {
    /// Renders a summary as text.
    fn render(&self, summary: &RunSummary) -> String;

    /// Writes a rendered summary to `out`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if writing fails.
    fn report_to(&self, summary: &RunSummary, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{}", self.render(summary))
    }

    /// Writes a rendered summary to stdout.
    ///
    /// # Errors
    ///
    /// Returns an IO error if writing fails.
    fn report(&self, summary: &RunSummary) -> io::Result<()> {
        self.report_to(summary, &mut io::stdout().lock())
    }
}

/// Console reporter printing one line per case and a summary line.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    /// Whether to use colors.
    use_colors: bool,
    /// Whether to list passing and skipped cases too.
    verbose: bool,
}

impl ConsoleReporter {
    /// Creates a console reporter with colors on.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            use_colors: true,
            verbose: false,
        }
    }

    /// Sets whether to use colors.
    #[must_use]
    pub const fn with_colors(mut self, colors: bool) -> Self {
        self.use_colors = colors;
        self
    }

    /// Sets verbose mode.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn paint(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("\x1b[{color}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn symbol(&self, outcome: CaseOutcome) -> String {
        match outcome {
            CaseOutcome::Passed => self.paint("✓", "32"),
            CaseOutcome::Failed => self.paint("✗", "31"),
            CaseOutcome::Skipped => self.paint("-", "33"),
            CaseOutcome::XFailed => self.paint("x", "33"),
            CaseOutcome::XPassed => self.paint("!", "33"),
        }
    }

    /// Formats one case line.
    fn format_case(&self, result: &CaseResult) -> String {
        let mut line = format!(
            "{} {} [{}] ({:.2}ms)",
            self.symbol(result.outcome),
            result.id,
            result.outcome,
            result.duration.as_secs_f64() * 1000.0
        );
        if !result.marks.is_empty() {
            let marks: Vec<&str> = result.marks.iter().map(|m| m.name()).collect();
            let _ = write!(line, " marks: {}", marks.join(", "));
        }
        if let Some(error) = &result.error {
            for (i, error_line) in error.lines().enumerate() {
                let label = if i == 0 { "Error: " } else { "       " };
                let _ = write!(line, "\n    {label}{error_line}");
            }
        }
        line
    }

    /// Formats the summary line.
    fn format_summary(&self, summary: &RunSummary) -> String {
        let status = if summary.all_passed() {
            self.paint("PASSED", "32")
        } else {
            self.paint("FAILED", "31")
        };

        let mut line = format!(
            "{status}: {} passed, {} failed",
            summary.passed(),
            summary.failed()
        );
        for (count, label) in [
            (summary.skipped(), "skipped"),
            (summary.xfailed(), "xfailed"),
            (summary.xpassed(), "xpassed"),
        ] {
            if count > 0 {
                let _ = write!(line, ", {count} {label}");
            }
        }
        let _ = write!(
            line,
            ", {} total ({:.2}s)",
            summary.total(),
            summary.total_duration.as_secs_f64()
        );
        if summary.stopped_early {
            line.push_str(" [stopped early]");
        }
        line
    }
}

impl Reporter for ConsoleReporter {
    fn render(&self, summary: &RunSummary) -> String {
        let rule = "─".repeat(50);
        let mut out = format!("Test Cases:\n{rule}\n");
        for result in &summary.results {
            let shown = self.verbose
                || !matches!(result.outcome, CaseOutcome::Passed | CaseOutcome::Skipped);
            if shown {
                out.push_str(&self.format_case(result));
                out.push('\n');
            }
        }
        let _ = write!(out, "{rule}\n{}", self.format_summary(summary));
        out
    }
}

/// JSON reporter that outputs the summary as JSON.
#[derive(Debug, Default)]
pub struct JsonReporter {
    /// Whether to pretty-print the JSON.
    pretty: bool,
}

impl JsonReporter {
    /// Creates a JSON reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to pretty-print.
    #[must_use]
    pub const fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Reporter for JsonReporter {
    fn render(&self, summary: &RunSummary) -> String {
        let json = if self.pretty {
            serde_json::to_string_pretty(summary)
        } else {
            serde_json::to_string(summary)
        };
        json.unwrap_or_else(|err| format!("{{\"error\": \"{err}\"}}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::Mark;
    use std::time::Duration;

    fn sample_summary() -> RunSummary {
        let mut summary = RunSummary::new();
        summary.add(CaseResult::pass("1", Duration::from_millis(5)));
        summary.add(CaseResult::pass("2", Duration::from_millis(3)));
        summary.add(CaseResult::fail(
            "negative",
            Duration::from_millis(4),
            "expected 3\ngot -3",
        ));
        summary.add(
            CaseResult::new("slow", CaseOutcome::Skipped, Duration::ZERO)
                .with_marks(vec![Mark::new("skip")]),
        );
        summary.total_duration = Duration::from_millis(12);
        summary
    }

    #[test]
    fn test_console_format_case() {
        let reporter = ConsoleReporter::new().with_colors(false);
        let result = CaseResult::fail("my_case", Duration::from_millis(10), "line one\nline two")
            .with_marks(vec![Mark::new("slow")]);

        let formatted = reporter.format_case(&result);
        assert!(formatted.starts_with("✗ my_case [failed]"));
        assert!(formatted.contains("marks: slow"));
        assert!(formatted.contains("\n    Error: line one"));
        assert!(formatted.contains("\n           line two"));
    }

    #[test]
    fn test_console_summary_passed() {
        let reporter = ConsoleReporter::new().with_colors(false);
        let mut summary = RunSummary::new();
        summary.add(CaseResult::pass("1", Duration::from_millis(5)));
        summary.total_duration = Duration::from_millis(5);

        let line = reporter.format_summary(&summary);
        assert!(line.starts_with("PASSED: 1 passed, 0 failed, 1 total"));
        assert!(!line.contains("skipped"));
    }

    #[test]
    fn test_console_summary_failed() {
        let reporter = ConsoleReporter::new().with_colors(false);
        let line = reporter.format_summary(&sample_summary());
        assert!(line.starts_with("FAILED: 2 passed, 1 failed, 1 skipped, 4 total"));
    }

    #[test]
    fn test_console_render_hides_passes_unless_verbose() {
        let quiet = ConsoleReporter::new().with_colors(false).render(&sample_summary());
        assert!(quiet.contains("negative"));
        assert!(!quiet.contains("✓ 1 "));
        assert!(!quiet.contains("slow"));

        let verbose = ConsoleReporter::new()
            .with_colors(false)
            .with_verbose(true)
            .render(&sample_summary());
        assert!(verbose.contains("✓ 1 [passed]"));
        assert!(verbose.contains("- slow [skipped]"));
    }

    #[test]
    fn test_colors() {
        let line = ConsoleReporter::new().format_summary(&sample_summary());
        assert!(line.starts_with("\x1b[31mFAILED\x1b[0m"));
    }

    #[test]
    fn test_json_reporter() {
        let mut out = Vec::new();
        JsonReporter::new()
            .report_to(&sample_summary(), &mut out)
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["results"].as_array().unwrap().len(), 4);
        assert_eq!(json["results"][2]["outcome"], "failed");
        assert_eq!(json["results"][3]["marks"][0], "skip");
        assert_eq!(json["stopped_early"], false);
    }
}
