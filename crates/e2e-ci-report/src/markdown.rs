//! CI job summary Markdown
//!
//! Renders the summary GitHub shows on a workflow run page. The layout is
//! fixed so that summaries from different runs diff cleanly:
//!
//! - a status line and a `Metric | Count` table
//! - a duration-sorted `All Tests` table (single provider) or a
//!   `Results by Provider` table (combined)
//! - one collapsible `<details>` block per selected test with its message,
//!   stack trace, captured output and correlated controller logs
//!
//! Summaries are always appended to the destination, never truncating it,
//! since several steps of one job write to the same file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use e2e_ci_ingest::{LogEntry, SuiteResult, TestRecord, TestStatus};
use serde_json::Value;

use crate::aggregate::{DetailMode, ProviderResult, Summary, Tally, Verdict, tests_by_duration};
use crate::correlate::{CORRELATION_BUFFER, CorrelationWindow, LevelPolicy, correlate};
use crate::error::{Error, Result};

/// Extra log fields never shown in a rendered log line
const HIDDEN_LOG_FIELDS: &[&str] = &["logger", "commit"];

/// Renders single-provider and combined summaries
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    detail: DetailMode,
    levels: LevelPolicy,
    buffer: Duration,
}

impl Default for ReportRenderer {
    fn default() -> Self {
        Self {
            detail: DetailMode::default(),
            levels: LevelPolicy::default(),
            buffer: CORRELATION_BUFFER,
        }
    }
}

impl ReportRenderer {
    /// Renderer with failed-only details and status-based log levels
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select which tests get a detail section
    #[must_use]
    pub fn with_detail_mode(mut self, detail: DetailMode) -> Self {
        self.detail = detail;
        self
    }

    /// Select which log levels are correlated
    #[must_use]
    pub fn with_level_policy(mut self, levels: LevelPolicy) -> Self {
        self.levels = levels;
        self
    }

    /// Widening applied to each test window
    #[must_use]
    pub fn with_buffer(mut self, buffer: Duration) -> Self {
        self.buffer = buffer;
        self
    }

    /// Summary for one provider
    ///
    /// A provider without parsed results renders the "no result files"
    /// section.
    #[must_use]
    pub fn render_provider(&self, provider: &ProviderResult) -> String {
        let Some(suite) = &provider.suite else {
            return no_results_section();
        };
        let tally = Tally::from_suite(suite);
        let mut md = String::with_capacity(4096);

        md.push_str(&format!("## E2E Test Results - {}\n\n", provider.name));
        md.push_str(&status_line(&tally, &format!("{:.1}s", tally.time)));
        if !tally.is_consistent() {
            md.push_str(&format!(
                "⚠️ Inconsistent counters: {} failed + {} errors + {} skipped exceeds {} total\n\n",
                tally.failures, tally.errors, tally.skipped, tally.total
            ));
        }
        md.push_str(&metric_table(&tally));

        if !suite.tests.is_empty() {
            md.push_str(&timing_table(suite));
        } else if tally.total > 0 {
            md.push_str("🎉 All tests passed!\n\n");
        }

        let tests = self.detail.select(suite);
        if !tests.is_empty() {
            md.push_str(match self.detail {
                DetailMode::All => "### Test Details (with Controller Logs)\n\n",
                _ => "### Failure Details\n\n",
            });
            let with_icon = self.detail == DetailMode::All;
            for (i, test) in tests.iter().enumerate() {
                md.push_str(&self.test_details(i + 1, test, provider, with_icon));
            }
        }

        md
    }

    /// Summary across every provider
    #[must_use]
    pub fn render_combined(&self, summary: &Summary) -> String {
        let overall = &summary.overall;
        let mut md = String::with_capacity(8192);

        md.push_str("# E2E Test Results Summary\n\n");
        md.push_str(&status_line(overall, &format_duration(overall.time)));

        md.push_str("## Overall Summary\n\n");
        md.push_str(&metric_table(overall));

        md.push_str("## Results by Provider\n\n");
        md.push_str("| Provider | Passed | Failed | Errors | Skipped | Total | Duration |\n");
        md.push_str("|----------|--------|--------|--------|---------|-------|----------|\n");
        for provider in &summary.providers {
            let Some(tally) = provider.tally() else {
                md.push_str(&format!(
                    "| {} | - | - | - | - | - | No results |\n",
                    provider.name
                ));
                continue;
            };
            let flag = if summary.is_flagged(&provider.name) {
                " (inconsistent)"
            } else {
                ""
            };
            md.push_str(&format!(
                "| {} {}{} | {} | {} | {} | {} | {} | {} |\n",
                verdict_icon(tally.verdict()),
                provider.name,
                flag,
                tally.passed(),
                tally.failures,
                tally.errors,
                tally.skipped,
                tally.total,
                format_duration(tally.time)
            ));
        }
        md.push('\n');

        if !summary.inconsistencies.is_empty() {
            md.push_str("⚠️ **Excluded from overall totals:**\n\n");
            for inconsistency in &summary.inconsistencies {
                md.push_str(&format!("- {inconsistency}\n"));
            }
            md.push('\n');
        }

        let sections: Vec<(&ProviderResult, Vec<&TestRecord>)> = summary
            .providers
            .iter()
            .filter_map(|p| p.suite.as_ref().map(|s| (p, self.detail.select(s))))
            .filter(|(_, tests)| !tests.is_empty())
            .collect();
        if sections.is_empty() {
            return md;
        }

        md.push_str(match self.detail {
            DetailMode::All => "## Test Details\n\n",
            _ => "## Failure Details\n\n",
        });
        for (provider, tests) in sections {
            md.push_str(&format!("### {}\n\n", provider.name));
            for (i, test) in tests.iter().enumerate() {
                md.push_str(&self.test_details(i + 1, test, provider, true));
            }
        }

        md
    }

    fn test_details(
        &self,
        index: usize,
        test: &TestRecord,
        provider: &ProviderResult,
        with_icon: bool,
    ) -> String {
        let mut md = String::new();
        let prefix = if with_icon {
            format!("{} {index}. ", status_icon(test.status))
        } else {
            format!("{index}. ")
        };
        md.push_str(&format!(
            "<details>\n<summary><strong>{prefix}{}</strong> ({})</summary>\n\n",
            escape_html(&test.name),
            format_duration(test.duration_secs())
        ));

        if !test.classname.is_empty() {
            md.push_str(&format!("**Package:** `{}`\n\n", escape_html(&test.classname)));
        }
        if let Some((start, end)) = test.window() {
            md.push_str(&format!(
                "**Time window:** {} - {}\n\n",
                start.format("%H:%M:%S"),
                end.format("%H:%M:%S")
            ));
        }
        if !test.message.is_empty() {
            md.push_str(&format!("**Message:** {}\n\n", escape_html(&test.message)));
        }
        if !test.details.is_empty() {
            md.push_str(&format!("**Stack trace / Details:**\n```\n{}\n```\n\n", test.details));
        }

        if let Some(output) = provider.test_outputs.lookup(&test.name) {
            md.push_str(&format!("**Test Output:**\n```\n{output}```\n\n"));
        } else {
            if !test.stdout.is_empty() {
                md.push_str(&format!("**Test Output (stdout):**\n```\n{}\n```\n\n", test.stdout));
            }
            if !test.stderr.is_empty() {
                md.push_str(&format!("**Test Output (stderr):**\n```\n{}\n```\n\n", test.stderr));
            }
        }

        if !provider.logs.is_empty() {
            md.push_str(&self.controller_logs(test, &provider.logs));
        }

        md.push_str("</details>\n\n");
        md
    }

    fn controller_logs(&self, test: &TestRecord, logs: &[LogEntry]) -> String {
        let levels = self.levels.levels_for(test.status);
        let matched = match CorrelationWindow::for_test(test, self.buffer, levels) {
            Some(window) => {
                tracing::debug!(
                    test = %test.name,
                    start = %window.start,
                    end = %window.end,
                    levels = %window.levels,
                    "filtering controller logs"
                );
                let matched = correlate(&window, logs);
                tracing::debug!(
                    test = %test.name,
                    found = matched.len(),
                    "controller logs matched"
                );
                matched
            }
            None => {
                tracing::debug!(test = %test.name, "no time window");
                Vec::new()
            }
        };

        if !matched.is_empty() {
            let mut md = format!("**Controller Logs** ({} entries):\n```\n", matched.len());
            for entry in matched {
                md.push_str(&format_log_entry(entry));
                md.push('\n');
            }
            md.push_str("```\n\n");
            return md;
        }

        if self.detail != DetailMode::All {
            return String::new();
        }
        let searched = test
            .window()
            .map(|(start, end)| {
                format!(
                    " (searched {} to {})",
                    start.format("%H:%M:%S"),
                    end.format("%H:%M:%S")
                )
            })
            .unwrap_or_default();
        format!("**Controller Logs:** No matching logs found{searched}\n\n")
    }
}

/// Section written when single-provider mode finds no result files
#[must_use]
pub fn no_results_section() -> String {
    "## Test Results\n\n⚠️ No test result files found.\n".to_string()
}

/// Section written when the combined-mode artifacts root does not exist
#[must_use]
pub fn missing_artifacts_section(dir: &Path) -> String {
    format!(
        "## E2E Test Results\n\n⚠️ Artifacts directory not found: {}\n",
        dir.display()
    )
}

/// Section written when the artifacts root holds no provider directories
#[must_use]
pub fn no_providers_section() -> String {
    "## E2E Test Results\n\n⚠️ No provider artifact directories found.\n".to_string()
}

/// Append a rendered report to `path`, creating it if needed
///
/// # Errors
///
/// Returns [`Error::WriteFailed`] if the destination cannot be opened or
/// written.
pub fn append_report(path: &Path, report: &str) -> Result<()> {
    let write_failed = |source| Error::WriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(write_failed)?;
    file.write_all(report.as_bytes()).map_err(write_failed)?;
    file.flush().map_err(write_failed)
}

/// Human-readable duration: `850ms`, `12.5s`, `2m 5s`
#[must_use]
pub fn format_duration(seconds: f64) -> String {
    if seconds < 1.0 {
        format!("{:.0}ms", seconds * 1000.0)
    } else if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds - minutes * 60.0;
        format!("{minutes:.0}m {secs:.0}s")
    }
}

/// Escape `& < > " '` for inline HTML
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// One controller log line for a summary code block
///
/// `[HH:MM:SS.mmm] [LEVEL] caller: msg | key=value ...`; empty, zero and
/// false fields are left out and nested values are JSON encoded.
#[must_use]
pub fn format_log_entry(entry: &LogEntry) -> String {
    let ts = entry
        .timestamp
        .map_or_else(|| "??:??:??".to_string(), |t| t.format("%H:%M:%S%.3f").to_string());
    let base = format!(
        "[{ts}] [{}] {}: {}",
        entry.level.to_uppercase(),
        entry.caller,
        entry.message
    );

    let extra: Vec<String> = entry
        .fields
        .iter()
        .filter(|(key, value)| !HIDDEN_LOG_FIELDS.contains(&key.as_str()) && !is_blank(value))
        .map(|(key, value)| format!("{key}={}", value_text(value)))
        .collect();
    if extra.is_empty() {
        base
    } else {
        format!("{base} | {}", extra.join(" "))
    }
}

/// Whether a field value counts as empty (null, false, 0, "", [] or {})
pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Strings verbatim, everything else as JSON
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn status_line(tally: &Tally, duration: &str) -> String {
    let mut line = format!(
        "{} **{}/{}** tests passed",
        verdict_icon(tally.verdict()),
        tally.passed(),
        tally.total
    );
    if tally.skipped > 0 {
        line.push_str(&format!(" ({} skipped)", tally.skipped));
    }
    line.push_str(&format!(" in **{duration}**\n\n"));
    line
}

fn metric_table(tally: &Tally) -> String {
    let mut md = String::new();
    md.push_str("| Metric | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| ✅ Passed | {} |\n", tally.passed()));
    md.push_str(&format!("| ❌ Failed | {} |\n", tally.failures));
    md.push_str(&format!("| 💥 Errors | {} |\n", tally.errors));
    md.push_str(&format!("| ⏭️ Skipped | {} |\n", tally.skipped));
    md.push_str(&format!("| **Total** | **{}** |\n\n", tally.total));
    md
}

fn timing_table(suite: &SuiteResult) -> String {
    let mut md = String::new();
    md.push_str("### All Tests\n\n");
    md.push_str("| Status | Test | Duration |\n");
    md.push_str("|--------|------|----------|\n");
    for test in tests_by_duration(suite) {
        let name = escape_html(&test.name).replace('|', "\\|").replace('\n', " ");
        md.push_str(&format!(
            "| {} | `{name}` | {} |\n",
            status_icon(test.status),
            format_duration(test.duration_secs())
        ));
    }
    md.push('\n');
    md
}

fn verdict_icon(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Failed => "❌",
        Verdict::Empty => "⚠️",
        Verdict::Passed => "✅",
    }
}

fn status_icon(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Passed => "✅",
        TestStatus::Failed => "❌",
        TestStatus::Error => "💥",
        TestStatus::Skipped => "⏭️",
    }
}
