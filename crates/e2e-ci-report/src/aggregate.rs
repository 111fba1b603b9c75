//! Multi-provider aggregation
//!
//! Every test provider (GitHub, GitLab, Gitea, ...) runs its e2e suite in a
//! separate CI job. Each job's artifacts become one [`ProviderResult`];
//! [`Summary::aggregate`] merges them into overall counts with a stable,
//! alphabetical provider order regardless of how they were loaded.

use std::fmt;
use std::str::FromStr;

use e2e_ci_ingest::{LogEntry, SuiteResult, TestOutputIndex, TestRecord};

/// Everything parsed for one provider
#[derive(Debug, Clone, Default)]
pub struct ProviderResult {
    /// Provider name (`github`, `gitlab`, ...)
    pub name: String,
    /// `None` when no result files were found for the provider
    pub suite: Option<SuiteResult>,
    /// Controller log entries in file order
    pub logs: Vec<LogEntry>,
    /// Runner output per test name
    pub test_outputs: TestOutputIndex,
}

impl ProviderResult {
    /// Provider with parsed results
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        suite: SuiteResult,
        logs: Vec<LogEntry>,
        test_outputs: TestOutputIndex,
    ) -> Self {
        Self {
            name: name.into(),
            suite: Some(suite),
            logs,
            test_outputs,
        }
    }

    /// Provider whose job produced no result files
    #[must_use]
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Counters of the provider's suite
    #[must_use]
    pub fn tally(&self) -> Option<Tally> {
        self.suite.as_ref().map(Tally::from_suite)
    }
}

/// Overall verdict of a set of counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No failures or errors
    Passed,
    /// At least one failure or error
    Failed,
    /// No tests at all
    Empty,
}

/// Test counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tally {
    /// Total tests
    pub total: u64,
    /// Failed tests
    pub failures: u64,
    /// Errored tests
    pub errors: u64,
    /// Skipped tests
    pub skipped: u64,
    /// Run time in seconds
    pub time: f64,
}

impl Tally {
    /// Counters declared by a suite
    #[must_use]
    pub fn from_suite(suite: &SuiteResult) -> Self {
        Self {
            total: suite.total,
            failures: suite.failures,
            errors: suite.errors,
            skipped: suite.skipped,
            time: suite.time,
        }
    }

    /// `total - failures - errors - skipped`, negative for malformed input
    ///
    /// Saturates at the `i64` bounds.
    #[must_use]
    pub fn passed(&self) -> i64 {
        let exact = self.exact_passed();
        i64::try_from(exact).unwrap_or(if exact < 0 { i64::MIN } else { i64::MAX })
    }

    /// Whether `passed` is non-negative
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.exact_passed() >= 0
    }

    fn exact_passed(&self) -> i128 {
        i128::from(self.total)
            - i128::from(self.failures)
            - i128::from(self.errors)
            - i128::from(self.skipped)
    }

    /// Whether anything failed or errored
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failures > 0 || self.errors > 0
    }

    /// Failures win over an empty run
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        if self.has_failures() {
            Verdict::Failed
        } else if self.total == 0 {
            Verdict::Empty
        } else {
            Verdict::Passed
        }
    }

    /// Sum of two tallies, `None` if any counter overflows
    #[must_use]
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        Some(Self {
            total: self.total.checked_add(other.total)?,
            failures: self.failures.checked_add(other.failures)?,
            errors: self.errors.checked_add(other.errors)?,
            skipped: self.skipped.checked_add(other.skipped)?,
            time: self.time + other.time,
        })
    }
}

/// Why a provider was left out of the overall totals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InconsistencyKind {
    /// Failures, errors and skips exceed the declared total
    NegativePassed,
    /// Adding the provider would overflow the overall counters
    Overflow,
}

/// A provider whose counters do not add up
#[derive(Debug, Clone, PartialEq)]
pub struct Inconsistency {
    /// Provider name
    pub provider: String,
    /// The offending counters
    pub tally: Tally,
    /// What is wrong with them
    pub kind: InconsistencyKind,
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            InconsistencyKind::NegativePassed => write!(
                f,
                "{}: {} failed + {} errors + {} skipped exceeds {} total (passed = {})",
                self.provider,
                self.tally.failures,
                self.tally.errors,
                self.tally.skipped,
                self.tally.total,
                self.tally.passed()
            ),
            InconsistencyKind::Overflow => write!(
                f,
                "{}: {} total overflows the overall counters",
                self.provider, self.tally.total
            ),
        }
    }
}

/// Aggregated view over every provider
#[derive(Debug, Clone, Default)]
pub struct Summary {
    /// Providers sorted by name
    pub providers: Vec<ProviderResult>,
    /// Sum over providers with consistent counters
    pub overall: Tally,
    /// Providers excluded from `overall`
    pub inconsistencies: Vec<Inconsistency>,
}

impl Summary {
    /// Merge providers into one summary
    ///
    /// Inconsistent providers, and providers whose counters would overflow
    /// the running totals, are flagged and left out of the overall totals;
    /// aggregation of the others continues.
    #[must_use]
    pub fn aggregate(mut providers: Vec<ProviderResult>) -> Self {
        providers.sort_by(|a, b| a.name.cmp(&b.name));

        let mut overall = Tally::default();
        let mut inconsistencies = Vec::new();
        for provider in &providers {
            let Some(tally) = provider.tally() else {
                continue;
            };
            if !tally.is_consistent() {
                tracing::warn!(
                    provider = %provider.name,
                    passed = tally.passed(),
                    "inconsistent test counters, excluded from overall totals"
                );
                inconsistencies.push(Inconsistency {
                    provider: provider.name.clone(),
                    tally,
                    kind: InconsistencyKind::NegativePassed,
                });
                continue;
            }
            match overall.checked_add(&tally) {
                Some(sum) => overall = sum,
                None => {
                    tracing::warn!(
                        provider = %provider.name,
                        total = tally.total,
                        "test counters overflow, excluded from overall totals"
                    );
                    inconsistencies.push(Inconsistency {
                        provider: provider.name.clone(),
                        tally,
                        kind: InconsistencyKind::Overflow,
                    });
                }
            }
        }

        Self {
            providers,
            overall,
            inconsistencies,
        }
    }

    /// Whether a provider was flagged as inconsistent
    #[must_use]
    pub fn is_flagged(&self, provider: &str) -> bool {
        self.inconsistencies.iter().any(|i| i.provider == provider)
    }

    /// Whether any provider reported failures or errors
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.providers
            .iter()
            .filter_map(ProviderResult::tally)
            .any(|t| t.has_failures())
    }
}

/// Tests sorted by duration, longest first, ties in encounter order
#[must_use]
pub fn tests_by_duration(suite: &SuiteResult) -> Vec<&TestRecord> {
    let mut tests: Vec<&TestRecord> = suite.tests.iter().collect();
    tests.sort_by(|a, b| b.duration.cmp(&a.duration));
    tests
}

/// Which tests get a per-test detail section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetailMode {
    /// Failed and errored tests only
    #[default]
    Failed,
    /// Every test, each with a status icon
    All,
    /// No detail section; summary tables only
    None,
}

impl DetailMode {
    /// Configuration spelling
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::All => "all",
            Self::None => "none",
        }
    }

    /// Tests to detail, in encounter order
    #[must_use]
    pub fn select<'a>(&self, suite: &'a SuiteResult) -> Vec<&'a TestRecord> {
        match self {
            Self::Failed => suite.failed_tests().collect(),
            Self::All => suite.tests.iter().collect(),
            Self::None => Vec::new(),
        }
    }
}

impl FromStr for DetailMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "failed" => Ok(Self::Failed),
            "all" => Ok(Self::All),
            "none" => Ok(Self::None),
            other => Err(format!("Invalid SHOW_LOGS_FOR value '{other}'")),
        }
    }
}

impl fmt::Display for DetailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use e2e_ci_ingest::TestStatus;
    use std::time::Duration;

    fn suite(passed: u64, failed: u64, time: f64) -> SuiteResult {
        let mut suite = SuiteResult::default();
        for i in 0..passed {
            suite.tests.push(TestRecord::new(
                format!("Pass{i}"),
                TestStatus::Passed,
                Duration::from_secs(1),
            ));
        }
        for i in 0..failed {
            suite.tests.push(TestRecord::new(
                format!("Fail{i}"),
                TestStatus::Failed,
                Duration::from_secs(2),
            ));
        }
        suite.total = passed + failed;
        suite.failures = failed;
        suite.time = time;
        suite
    }

    fn provider(name: &str, suite: SuiteResult) -> ProviderResult {
        ProviderResult::new(name, suite, Vec::new(), TestOutputIndex::new())
    }

    #[test]
    fn test_tally_passed() {
        let tally = Tally {
            total: 10,
            failures: 2,
            errors: 1,
            skipped: 3,
            time: 1.0,
        };
        assert_eq!(tally.passed(), 4);
        assert!(tally.is_consistent());
        assert_eq!(tally.verdict(), Verdict::Failed);
    }

    #[test]
    fn test_tally_negative_passed_is_surfaced() {
        let tally = Tally {
            total: 1,
            failures: 2,
            ..Tally::default()
        };
        assert_eq!(tally.passed(), -1);
        assert!(!tally.is_consistent());
    }

    #[test]
    fn test_verdicts() {
        assert_eq!(Tally::default().verdict(), Verdict::Empty);
        let ok = Tally {
            total: 3,
            ..Tally::default()
        };
        assert_eq!(ok.verdict(), Verdict::Passed);
    }

    #[test]
    fn test_aggregate_sorts_and_sums() {
        let summary = Summary::aggregate(vec![
            provider("gitlab", suite(2, 0, 3.0)),
            ProviderResult::missing("bitbucket"),
            provider("github", suite(3, 1, 5.0)),
        ]);

        let names: Vec<_> = summary.providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["bitbucket", "github", "gitlab"]);
        assert_eq!(summary.overall.total, 6);
        assert_eq!(summary.overall.failures, 1);
        assert_eq!(summary.overall.passed(), 5);
        assert!((summary.overall.time - 8.0).abs() < f64::EPSILON);
        assert!(summary.inconsistencies.is_empty());
        assert!(summary.has_failures());
    }

    #[test]
    fn test_aggregate_counts_add_up() {
        let summary = Summary::aggregate(vec![
            provider("a", suite(4, 2, 1.0)),
            provider("b", suite(0, 3, 1.0)),
            provider("c", suite(7, 0, 1.0)),
        ]);
        let mut expected_total = 0;
        for p in &summary.providers {
            let t = p.tally().unwrap();
            assert_eq!(
                t.passed() + (t.failures + t.errors + t.skipped) as i64,
                t.total as i64
            );
            expected_total += t.total;
        }
        assert_eq!(summary.overall.total, expected_total);
    }

    #[test]
    fn test_aggregate_flags_inconsistent_provider() {
        let mut broken = suite(1, 0, 1.0);
        broken.failures = 5;
        let summary = Summary::aggregate(vec![
            provider("broken", broken),
            provider("fine", suite(2, 0, 1.0)),
        ]);
        assert_eq!(summary.inconsistencies.len(), 1);
        assert!(summary.is_flagged("broken"));
        assert!(!summary.is_flagged("fine"));
        assert_eq!(summary.overall.total, 2);
        assert_eq!(
            summary.inconsistencies[0].kind,
            InconsistencyKind::NegativePassed
        );
        assert!(summary.inconsistencies[0].to_string().contains("passed = -4"));
    }

    #[test]
    fn test_aggregate_flags_overflowing_provider() {
        let mut huge = suite(0, 0, 1.0);
        huge.total = u64::MAX;
        let summary = Summary::aggregate(vec![
            provider("a-huge", huge),
            provider("b-small", suite(2, 0, 1.0)),
        ]);

        assert_eq!(summary.overall.total, u64::MAX);
        assert_eq!(summary.overall.passed(), i64::MAX);
        assert!(!summary.is_flagged("a-huge"));
        assert!(summary.is_flagged("b-small"));
        assert_eq!(summary.inconsistencies[0].kind, InconsistencyKind::Overflow);
        assert_eq!(
            summary.inconsistencies[0].to_string(),
            "b-small: 2 total overflows the overall counters"
        );
    }

    #[test]
    fn test_tally_checked_add() {
        let a = Tally {
            total: 3,
            failures: 1,
            time: 1.5,
            ..Tally::default()
        };
        let sum = a.checked_add(&a).unwrap();
        assert_eq!(sum.total, 6);
        assert_eq!(sum.failures, 2);
        assert!((sum.time - 3.0).abs() < f64::EPSILON);

        let max = Tally {
            skipped: u64::MAX,
            total: u64::MAX,
            ..Tally::default()
        };
        let one = Tally {
            skipped: 1,
            ..Tally::default()
        };
        assert!(max.checked_add(&one).is_none());
    }

    #[test]
    fn test_missing_provider_contributes_nothing() {
        let summary = Summary::aggregate(vec![
            ProviderResult::missing("a"),
            provider("b", suite(3, 1, 2.0)),
        ]);
        assert!(summary.providers[0].suite.is_none());
        assert_eq!(summary.overall.passed(), 3);
        assert_eq!(summary.overall.failures, 1);
        assert_eq!(summary.overall.total, 4);
    }

    #[test]
    fn test_tests_by_duration_stable() {
        let mut s = SuiteResult::default();
        for (name, ms) in [("a", 100), ("b", 300), ("c", 100), ("d", 300), ("e", 50)] {
            s.tests
                .push(TestRecord::new(name, TestStatus::Passed, Duration::from_millis(ms)));
        }
        let order: Vec<_> = tests_by_duration(&s).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(order, vec!["b", "d", "a", "c", "e"]);
    }

    #[test]
    fn test_detail_mode_parse() {
        assert_eq!("failed".parse::<DetailMode>(), Ok(DetailMode::Failed));
        assert_eq!("ALL".parse::<DetailMode>(), Ok(DetailMode::All));
        assert_eq!("none".parse::<DetailMode>(), Ok(DetailMode::None));
        let err = "everything".parse::<DetailMode>().unwrap_err();
        assert!(err.contains("everything"));
        assert_eq!(DetailMode::default(), DetailMode::Failed);
    }

    #[test]
    fn test_detail_mode_select() {
        let s = suite(2, 1, 1.0);
        assert_eq!(DetailMode::Failed.select(&s).len(), 1);
        assert_eq!(DetailMode::All.select(&s).len(), 3);
        assert!(DetailMode::None.select(&s).is_empty());
    }
}
