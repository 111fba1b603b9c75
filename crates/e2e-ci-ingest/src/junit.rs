//! JUnit XML Report Parser
//!
//! Reads `testsuite` / `testsuites` documents produced by gotestsum and
//! similar runners into one merged [`SuiteResult`].
//!
//! # Time windows
//!
//! JUnit only records a suite start `timestamp` and a per-case `time`. The
//! start and end of each test case are reconstructed by walking the cases
//! in document order and accumulating their durations from the suite start.
//! This is a heuristic: it assumes cases ran one after another. Tests that
//! really ran in parallel get windows that are monotonic and internally
//! consistent but do not match wall-clock execution. The buffer applied
//! during log correlation absorbs most of that drift.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use roxmltree::{Document, Node};

use crate::error::{Error, Result};
use crate::timestamp::TimestampNormalizer;

/// Outcome of a single test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestStatus {
    /// No failure, error or skipped marker
    Passed,
    /// `<failure>` child present
    Failed,
    /// `<error>` child present
    Error,
    /// `<skipped>` child present
    Skipped,
}

impl TestStatus {
    /// Failed or errored
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// A single parsed test case
#[derive(Debug, Clone, PartialEq)]
pub struct TestRecord {
    /// Test name
    pub name: String,
    /// Class name (Go package for gotestsum reports)
    pub classname: String,
    /// Declared run time, never negative
    pub duration: Duration,
    /// Outcome
    pub status: TestStatus,
    /// `message` attribute of the outcome element
    pub message: String,
    /// Text of the failure/error element
    pub details: String,
    /// `<system-out>` text
    pub stdout: String,
    /// `<system-err>` text
    pub stderr: String,
    /// Reconstructed start, see the module docs
    pub start: Option<NaiveDateTime>,
    /// Reconstructed end, see the module docs
    pub end: Option<NaiveDateTime>,
}

impl TestRecord {
    /// Create a record with no captured output and no time window
    #[must_use]
    pub fn new(name: impl Into<String>, status: TestStatus, duration: Duration) -> Self {
        Self {
            name: name.into(),
            classname: String::new(),
            duration,
            status,
            message: String::new(),
            details: String::new(),
            stdout: String::new(),
            stderr: String::new(),
            start: None,
            end: None,
        }
    }

    /// Duration in fractional seconds
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    /// Reconstructed `(start, end)` when the suite declared a timestamp
    #[must_use]
    pub fn window(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        self.start.zip(self.end)
    }
}

/// Merged result of one or more JUnit documents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuiteResult {
    /// Test cases in encounter order
    pub tests: Vec<TestRecord>,
    /// Declared total test count
    pub total: u64,
    /// Declared failure count
    pub failures: u64,
    /// Declared error count
    pub errors: u64,
    /// Declared skipped count
    pub skipped: u64,
    /// Declared run time in seconds
    pub time: f64,
    /// First suite timestamp found across all documents
    pub suite_start: Option<NaiveDateTime>,
}

impl SuiteResult {
    /// Tests that failed or errored, in encounter order
    pub fn failed_tests(&self) -> impl Iterator<Item = &TestRecord> {
        self.tests.iter().filter(|t| t.status.is_failure())
    }

    /// Whether any test failed or errored according to the counters
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failures > 0 || self.errors > 0
    }
}

/// Incremental JUnit parser that merges every document it is fed
#[derive(Debug)]
pub struct JunitParser<'a> {
    normalizer: &'a TimestampNormalizer,
    result: SuiteResult,
}

impl<'a> JunitParser<'a> {
    /// Create an empty parser
    #[must_use]
    pub fn new(normalizer: &'a TimestampNormalizer) -> Self {
        Self {
            normalizer,
            result: SuiteResult::default(),
        }
    }

    /// Parse one XML document and merge it, returning the number of suites
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not well-formed XML or its root
    /// is neither `testsuite` nor `testsuites`. Nothing is merged then.
    pub fn parse_str(&mut self, xml: &str, source_name: &str) -> Result<usize> {
        let doc = Document::parse(xml).map_err(|e| Error::XmlParse {
            source_name: source_name.to_string(),
            reason: e.to_string(),
        })?;
        let root = doc.root_element();
        let suites: Vec<Node<'_, '_>> = match root.tag_name().name() {
            "testsuites" => child_elements(root, "testsuite").collect(),
            "testsuite" => vec![root],
            other => {
                return Err(Error::UnexpectedRoot {
                    source_name: source_name.to_string(),
                    root: other.to_string(),
                });
            }
        };

        for suite in &suites {
            self.merge_suite(*suite, source_name);
        }
        Ok(suites.len())
    }

    /// Read and parse one XML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn parse_file(&mut self, path: &Path) -> Result<usize> {
        let xml = std::fs::read_to_string(path).map_err(|source| Error::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_str(&xml, &path.display().to_string())
    }

    /// Finish parsing and return the merged result
    #[must_use]
    pub fn finish(self) -> SuiteResult {
        self.result
    }

    fn merge_suite(&mut self, suite: Node<'_, '_>, source_name: &str) {
        if self.result.suite_start.is_none() {
            if let Some(raw) = suite.attribute("timestamp") {
                self.result.suite_start = self.normalizer.normalize_str(raw);
                if self.result.suite_start.is_none() {
                    tracing::warn!(
                        source = source_name,
                        timestamp = raw,
                        "unparseable suite timestamp"
                    );
                }
            }
        }

        let start = self.result.suite_start;
        let mut cumulative = Duration::ZERO;
        let mut records = Vec::new();
        for case in child_elements(suite, "testcase") {
            let mut record = parse_case(case, source_name);
            if let Some(suite_start) = start {
                record.start = offset(suite_start, cumulative);
                record.end = record.start.and_then(|s| offset(s, record.duration));
            }
            cumulative += record.duration;
            records.push(record);
        }

        let count = |status: TestStatus| {
            records.iter().filter(|r| r.status == status).count() as u64
        };
        let total = counter(suite, "tests", source_name).unwrap_or(records.len() as u64);
        let failures =
            counter(suite, "failures", source_name).unwrap_or_else(|| count(TestStatus::Failed));
        let errors =
            counter(suite, "errors", source_name).unwrap_or_else(|| count(TestStatus::Error));
        let skipped =
            counter(suite, "skipped", source_name).unwrap_or_else(|| count(TestStatus::Skipped));

        // all four counters merge, or none do
        match (
            self.result.total.checked_add(total),
            self.result.failures.checked_add(failures),
            self.result.errors.checked_add(errors),
            self.result.skipped.checked_add(skipped),
        ) {
            (Some(total), Some(failures), Some(errors), Some(skipped)) => {
                self.result.total = total;
                self.result.failures = failures;
                self.result.errors = errors;
                self.result.skipped = skipped;
            }
            _ => tracing::warn!(
                source = source_name,
                tests = total,
                "suite counters overflow the merged totals, ignoring them"
            ),
        }
        self.result.time += suite
            .attribute("time")
            .and_then(|t| parse_seconds(t, source_name))
            .unwrap_or_else(|| cumulative.as_secs_f64());
        self.result.tests.extend(records);
    }
}

/// Parse a batch of JUnit files, skipping unreadable or malformed ones
#[must_use]
pub fn parse_files(normalizer: &TimestampNormalizer, paths: &[PathBuf]) -> SuiteResult {
    let mut parser = JunitParser::new(normalizer);
    for path in paths {
        if let Err(e) = parser.parse_file(path) {
            tracing::warn!("Skipping {}: {e}", path.display());
        }
    }
    parser.finish()
}

fn parse_case(case: Node<'_, '_>, source_name: &str) -> TestRecord {
    let name = case.attribute("name").unwrap_or("Unknown");
    let duration = case
        .attribute("time")
        .and_then(|t| parse_seconds(t, source_name))
        .map_or(Duration::ZERO, |secs| {
            duration_from_secs(secs).unwrap_or_else(|| {
                tracing::warn!(
                    source = source_name,
                    test = name,
                    time = secs,
                    "invalid test duration, using 0"
                );
                Duration::ZERO
            })
        });

    let failure = child_elements(case, "failure").next();
    let error = child_elements(case, "error").next();
    let skipped = child_elements(case, "skipped").next();

    let (status, marker) = if let Some(node) = failure {
        (TestStatus::Failed, Some(node))
    } else if let Some(node) = error {
        (TestStatus::Error, Some(node))
    } else if let Some(node) = skipped {
        (TestStatus::Skipped, Some(node))
    } else {
        (TestStatus::Passed, None)
    };

    let mut record = TestRecord::new(name, status, duration);
    record.classname = case.attribute("classname").unwrap_or_default().to_string();
    if let Some(node) = marker {
        record.message = node.attribute("message").unwrap_or_default().to_string();
        if status.is_failure() {
            record.details = node.text().unwrap_or_default().to_string();
        }
    }
    record.stdout = child_text(case, "system-out");
    record.stderr = child_text(case, "system-err");
    record
}

fn child_elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    tag: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == tag)
}

fn child_text(node: Node<'_, '_>, tag: &'static str) -> String {
    child_elements(node, tag)
        .next()
        .and_then(|n| n.text())
        .unwrap_or_default()
        .to_string()
}

fn counter(suite: Node<'_, '_>, attr: &str, source_name: &str) -> Option<u64> {
    let raw = suite.attribute(attr)?;
    match raw.trim().parse::<u64>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(
                source = source_name,
                attr,
                value = raw,
                "invalid suite counter, counting cases instead"
            );
            None
        }
    }
}

fn parse_seconds(raw: &str, source_name: &str) -> Option<f64> {
    match raw.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() => Some(secs),
        _ => {
            tracing::warn!(source = source_name, value = raw, "invalid time attribute");
            None
        }
    }
}

/// Rounded to the nearest nanosecond so `0.3` stays exactly 300ms
fn duration_from_secs(secs: f64) -> Option<Duration> {
    let nanos = (secs * 1e9).round();
    if nanos < 0.0 || nanos >= u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(nanos as u64))
}

fn offset(base: NaiveDateTime, by: Duration) -> Option<NaiveDateTime> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| base.checked_add_signed(delta))
}
