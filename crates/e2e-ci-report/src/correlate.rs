//! Time-window log correlation
//!
//! Controller logs and test results share no correlation key, so logs are
//! attributed to a test purely by time: every entry whose timestamp falls
//! inside the test's reconstructed window (widened by a buffer) and whose
//! level is selected belongs to that test. Entries are never assumed to be
//! sorted.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use e2e_ci_ingest::{LogEntry, TestRecord, TestStatus};

/// Widening applied to both ends of a test window
pub const CORRELATION_BUFFER: Duration = Duration::from_secs(5);

/// Log field carrying the webhook event commit SHA
pub const EVENT_SHA_KEY: &str = "event-sha";
/// Log field carrying the webhook delivery ID
pub const EVENT_ID_KEY: &str = "event-id";

/// Set of accepted log levels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LevelSet {
    /// Every level is accepted
    #[default]
    Any,
    /// Only these lower-cased levels
    Only(BTreeSet<String>),
}

impl LevelSet {
    /// Accept only the given levels; an empty list accepts everything
    pub fn only<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = levels
            .into_iter()
            .map(|l| l.as_ref().trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        if set.is_empty() {
            Self::Any
        } else {
            Self::Only(set)
        }
    }

    /// Parse `all` or a comma-separated list such as `error,warn`
    #[must_use]
    pub fn parse(spec: &str) -> Self {
        if spec.trim().eq_ignore_ascii_case("all") {
            Self::Any
        } else {
            Self::only(spec.split(','))
        }
    }

    /// `{error, warn}`
    #[must_use]
    pub fn failure_default() -> Self {
        Self::only(["error", "warn"])
    }

    /// `{error, warn, info}`
    #[must_use]
    pub fn verbose_default() -> Self {
        Self::only(["error", "warn", "info"])
    }

    /// Whether a level is accepted (case-insensitive)
    #[must_use]
    pub fn contains(&self, level: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(set) => set.contains(&level.to_lowercase()),
        }
    }
}

impl fmt::Display for LevelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("all"),
            Self::Only(set) => {
                let joined: Vec<&str> = set.iter().map(String::as_str).collect();
                f.write_str(&joined.join(", "))
            }
        }
    }
}

/// How the level set for a test's logs is chosen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LevelPolicy {
    /// `{error, warn}` for failed/errored tests, `{error, warn, info}` otherwise
    #[default]
    StatusDefault,
    /// The same configured set for every test
    Fixed(LevelSet),
}

impl LevelPolicy {
    /// Level set to correlate with for a test of the given status
    #[must_use]
    pub fn levels_for(&self, status: TestStatus) -> LevelSet {
        match self {
            Self::Fixed(levels) => levels.clone(),
            Self::StatusDefault if status.is_failure() => LevelSet::failure_default(),
            Self::StatusDefault => LevelSet::verbose_default(),
        }
    }
}

/// Inclusive time range plus level filter for one test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationWindow {
    /// Earliest accepted timestamp
    pub start: NaiveDateTime,
    /// Latest accepted timestamp
    pub end: NaiveDateTime,
    /// Accepted levels
    pub levels: LevelSet,
}

impl CorrelationWindow {
    /// Create a window from explicit bounds
    #[must_use]
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, levels: LevelSet) -> Self {
        Self { start, end, levels }
    }

    /// Window of a test widened by `buffer` on both sides
    ///
    /// `None` when the test has no reconstructed start/end.
    #[must_use]
    pub fn for_test(record: &TestRecord, buffer: Duration, levels: LevelSet) -> Option<Self> {
        let (start, end) = record.window()?;
        let buffer = TimeDelta::from_std(buffer).ok()?;
        Some(Self::new(
            start.checked_sub_signed(buffer)?,
            end.checked_add_signed(buffer)?,
            levels,
        ))
    }

    /// Whether an entry falls inside the window
    #[must_use]
    pub fn contains(&self, entry: &LogEntry) -> bool {
        entry
            .timestamp
            .is_some_and(|ts| self.start <= ts && ts <= self.end)
            && self.levels.contains(&entry.level)
    }

    /// The same filter as a general [`LogQuery`]
    #[must_use]
    pub fn to_query(&self) -> LogQuery {
        LogQuery::new()
            .with_levels(self.levels.clone())
            .with_range(Some(self.start), Some(self.end))
    }
}

/// Entries inside the window, in their original order
#[must_use]
pub fn correlate<'a>(window: &CorrelationWindow, entries: &'a [LogEntry]) -> Vec<&'a LogEntry> {
    entries.iter().filter(|e| window.contains(e)).collect()
}

/// General log filter: levels, optional time bounds and event identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    /// Inclusive lower bound
    pub start: Option<NaiveDateTime>,
    /// Inclusive upper bound
    pub end: Option<NaiveDateTime>,
    /// Accepted levels
    pub levels: LevelSet,
    /// `event-sha` values; prefixes match in either direction
    pub event_shas: Vec<String>,
    /// `event-id` values; exact match
    pub event_ids: Vec<String>,
}

impl LogQuery {
    /// Query accepting every entry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict levels
    #[must_use]
    pub fn with_levels(mut self, levels: LevelSet) -> Self {
        self.levels = levels;
        self
    }

    /// Restrict to a time range; either bound may be open
    #[must_use]
    pub fn with_range(mut self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Match entries by commit SHA
    #[must_use]
    pub fn with_event_shas(mut self, shas: Vec<String>) -> Self {
        self.event_shas = shas;
        self
    }

    /// Match entries by event ID
    #[must_use]
    pub fn with_event_ids(mut self, ids: Vec<String>) -> Self {
        self.event_ids = ids;
        self
    }

    /// Whether either time bound is set
    #[must_use]
    pub fn has_time_bound(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Whether an entry passes every active filter
    ///
    /// Entries without a timestamp never pass while a time bound is active.
    #[must_use]
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if !self.levels.contains(&entry.level) {
            return false;
        }
        if self.has_time_bound() {
            let Some(ts) = entry.timestamp else {
                return false;
            };
            if self.start.is_some_and(|start| ts < start) || self.end.is_some_and(|end| ts > end) {
                return false;
            }
        }
        self.matches_event(entry)
    }

    fn matches_event(&self, entry: &LogEntry) -> bool {
        if self.event_shas.is_empty() && self.event_ids.is_empty() {
            return true;
        }
        let sha = entry.field_str(EVENT_SHA_KEY).unwrap_or_default();
        let sha_match = !sha.is_empty()
            && self
                .event_shas
                .iter()
                .any(|s| !s.is_empty() && (sha.starts_with(s.as_str()) || s.starts_with(sha)));
        let id = entry.field_str(EVENT_ID_KEY).unwrap_or_default();
        let id_match = !id.is_empty() && self.event_ids.iter().any(|i| i == id);
        sha_match || id_match
    }

    /// Matching entries in their original order
    #[must_use]
    pub fn filter<'a>(&self, entries: &'a [LogEntry]) -> Vec<&'a LogEntry> {
        entries.iter().filter(|e| self.matches(e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};
    use e2e_ci_ingest::{LogStreamParser, TimestampNormalizer};
    use proptest::prelude::*;

    fn normalizer() -> TimestampNormalizer {
        TimestampNormalizer::new(
            FixedOffset::east_opt(0).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 22).unwrap(),
        )
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    fn entry(json: &str) -> LogEntry {
        let n = normalizer();
        LogStreamParser::new(&n).parse_line(json).unwrap()
    }

    fn entry_at(ts: NaiveDateTime, level: &str) -> LogEntry {
        let mut e = entry(r#"{"msg":"m"}"#);
        e.timestamp = Some(ts);
        e.level = level.to_string();
        e
    }

    fn failed_record() -> TestRecord {
        let mut record = TestRecord::new(
            "TestGithubPullRequest",
            TestStatus::Failed,
            Duration::from_millis(2500),
        );
        record.start = Some(dt("2026-01-22 06:11:50"));
        record.end = Some(dt("2026-01-22 06:11:52.5"));
        record
    }

    #[test]
    fn test_level_set_parse() {
        assert_eq!(LevelSet::parse("all"), LevelSet::Any);
        assert_eq!(LevelSet::parse("ALL"), LevelSet::Any);
        assert_eq!(LevelSet::parse(""), LevelSet::Any);
        assert_eq!(LevelSet::parse(" , "), LevelSet::Any);
        let set = LevelSet::parse("Error, warn,,");
        assert!(set.contains("error"));
        assert!(set.contains("WARN"));
        assert!(!set.contains("info"));
        assert_eq!(set.to_string(), "error, warn");
    }

    #[test]
    fn test_level_policy_defaults() {
        let policy = LevelPolicy::StatusDefault;
        assert_eq!(policy.levels_for(TestStatus::Failed), LevelSet::failure_default());
        assert_eq!(policy.levels_for(TestStatus::Error), LevelSet::failure_default());
        assert_eq!(policy.levels_for(TestStatus::Passed), LevelSet::verbose_default());

        let fixed = LevelPolicy::Fixed(LevelSet::only(["debug"]));
        assert_eq!(fixed.levels_for(TestStatus::Failed), LevelSet::only(["debug"]));
    }

    #[test]
    fn test_window_for_test_applies_buffer() {
        let record = failed_record();
        let window =
            CorrelationWindow::for_test(&record, CORRELATION_BUFFER, LevelSet::Any).unwrap();
        assert_eq!(window.start, dt("2026-01-22 06:11:45"));
        assert_eq!(window.end, dt("2026-01-22 06:11:57.5"));
    }

    #[test]
    fn test_window_requires_reconstructed_times() {
        let record = TestRecord::new("T", TestStatus::Failed, Duration::from_secs(1));
        assert!(CorrelationWindow::for_test(&record, CORRELATION_BUFFER, LevelSet::Any).is_none());
    }

    #[test]
    fn test_window_bounds_inclusive() {
        let end = dt("2026-01-22 06:11:57.5");
        let window = CorrelationWindow::new(dt("2026-01-22 06:11:45"), end, LevelSet::Any);
        assert!(window.contains(&entry_at(end, "info")));
        assert!(window.contains(&entry_at(dt("2026-01-22 06:11:45"), "info")));
        assert!(!window.contains(&entry_at(end + TimeDelta::nanoseconds(1), "info")));
        assert!(!window.contains(&entry_at(dt("2026-01-22 06:11:44.999"), "info")));
    }

    #[test]
    fn test_correlate_failed_test_scenario() {
        let entries = vec![
            entry(r#"{"ts":"2026-01-22T06:11:52Z","level":"error","msg":"reconcile failed"}"#),
            entry(r#"{"ts":"2026-01-22T06:12:10Z","level":"info","msg":"later"}"#),
            entry(r#"{"ts":"2026-01-22T06:11:51Z","level":"info","msg":"in window but info"}"#),
        ];
        let levels = LevelPolicy::StatusDefault.levels_for(TestStatus::Failed);
        let window =
            CorrelationWindow::for_test(&failed_record(), CORRELATION_BUFFER, levels).unwrap();
        let matched = correlate(&window, &entries);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].message, "reconcile failed");
    }

    #[test]
    fn test_correlate_unsorted_and_untimed() {
        let entries = vec![
            entry(r#"{"ts":"2026-01-22T06:11:56Z","level":"warn","msg":"b"}"#),
            entry(r#"{"level":"error","msg":"no time"}"#),
            entry(r#"{"ts":"2026-01-22T06:11:46Z","level":"warn","msg":"a"}"#),
        ];
        let record = failed_record();
        let window =
            CorrelationWindow::for_test(&record, CORRELATION_BUFFER, LevelSet::Any).unwrap();
        let messages: Vec<_> = correlate(&window, &entries)
            .iter()
            .map(|e| e.message.as_str())
            .collect();
        assert_eq!(messages, vec!["b", "a"]);
    }

    #[test]
    fn test_window_as_query() {
        let window = CorrelationWindow::new(
            dt("2026-01-22 06:11:45"),
            dt("2026-01-22 06:11:57"),
            LevelSet::failure_default(),
        );
        let query = window.to_query();
        let e = entry_at(dt("2026-01-22 06:11:50"), "warn");
        assert_eq!(query.matches(&e), window.contains(&e));
        assert!(query.has_time_bound());
    }

    #[test]
    fn test_query_level_only_keeps_untimed_entries() {
        let entries = vec![
            entry(r#"{"level":"error","msg":"untimed"}"#),
            entry(r#"{"level":"info","msg":"info"}"#),
        ];
        let query = LogQuery::new().with_levels(LevelSet::only(["error"]));
        let matched = query.filter(&entries);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].message, "untimed");
    }

    #[test]
    fn test_query_open_ended_range() {
        let entries = vec![
            entry(r#"{"ts":"2026-01-22T06:00:00Z","msg":"early"}"#),
            entry(r#"{"ts":"2026-01-22T07:00:00Z","msg":"late"}"#),
            entry(r#"{"msg":"untimed"}"#),
        ];
        let query = LogQuery::new().with_range(Some(dt("2026-01-22 06:30:00")), None);
        let matched = query.filter(&entries);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].message, "late");
    }

    #[test]
    fn test_query_event_sha_prefix_either_way() {
        let entries = vec![
            entry(r#"{"msg":"full","event-sha":"abc123def"}"#),
            entry(r#"{"msg":"short","event-sha":"abc"}"#),
            entry(r#"{"msg":"other","event-sha":"fff000"}"#),
            entry(r#"{"msg":"none"}"#),
        ];
        let query = LogQuery::new().with_event_shas(vec!["abc123".to_string()]);
        let messages: Vec<_> = query.filter(&entries).iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["full", "short"]);
    }

    #[test]
    fn test_query_event_id_exact() {
        let entries = vec![
            entry(r#"{"msg":"hit","event-id":"b3bb62b7"}"#),
            entry(r#"{"msg":"miss","event-id":"b3bb62b7-extra"}"#),
        ];
        let query = LogQuery::new().with_event_ids(vec!["b3bb62b7".to_string()]);
        let matched = query.filter(&entries);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].message, "hit");
    }

    proptest! {
        #[test]
        fn prop_end_inclusive_epsilon_excluded(
            offset_ms in 0i64..86_400_000,
            eps_ns in 1i64..1_000_000_000,
        ) {
            let start = dt("2026-01-22 00:00:00");
            let end = start + TimeDelta::milliseconds(offset_ms);
            let window = CorrelationWindow::new(start, end, LevelSet::Any);
            prop_assert!(window.contains(&entry_at(end, "error")));
            let after = end + TimeDelta::nanoseconds(eps_ns);
            prop_assert!(!window.contains(&entry_at(after, "error")));
        }
    }
}
