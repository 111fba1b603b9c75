//! Timestamp normalization
//!
//! Controller logs, JUnit reports and user-supplied filter bounds all carry
//! timestamps in different shapes. Everything is normalized to a
//! timezone-naive local [`NaiveDateTime`] so the two event streams can be
//! compared directly.
//!
//! String parsing is an ordered chain of [`Strategy`] values: the most
//! specific shape is tried first and the first success wins. Nothing here
//! returns an error; an unrecognized value is simply `None`.

use chrono::{FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde_json::Value;

/// Which calendar components a strategy's format carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    DateTime,
    Date,
    Time,
}

/// One step of the parsing chain
#[derive(Debug, Clone, Copy)]
struct Strategy {
    format: &'static str,
    shape: Shape,
}

impl Strategy {
    const fn new(format: &'static str, shape: Shape) -> Self {
        Self { format, shape }
    }

    fn apply(&self, input: &str, today: NaiveDate) -> Option<NaiveDateTime> {
        match self.shape {
            Shape::DateTime => NaiveDateTime::parse_from_str(input, self.format).ok(),
            Shape::Date => NaiveDate::parse_from_str(input, self.format)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
            Shape::Time => NaiveTime::parse_from_str(input, self.format)
                .ok()
                .map(|t| today.and_time(t)),
        }
    }
}

/// Shapes accepted for log and test timestamps, most specific first
const DATED_STRATEGIES: &[Strategy] = &[
    Strategy::new("%Y-%m-%dT%H:%M:%S%.f", Shape::DateTime),
    Strategy::new("%Y-%m-%d %H:%M:%S%.f", Shape::DateTime),
    Strategy::new("%Y-%m-%dT%H:%M:%S", Shape::DateTime),
    Strategy::new("%Y-%m-%d %H:%M:%S", Shape::DateTime),
    Strategy::new("%Y-%m-%dT%H:%M", Shape::DateTime),
    Strategy::new("%Y-%m-%d %H:%M", Shape::DateTime),
    Strategy::new("%Y-%m-%d", Shape::Date),
];

/// Time-only shapes, anchored to today; only valid for filter bounds
const TIME_ONLY_STRATEGIES: &[Strategy] = &[
    Strategy::new("%H:%M:%S%.f", Shape::Time),
    Strategy::new("%H:%M:%S", Shape::Time),
    Strategy::new("%H:%M", Shape::Time),
];

/// Converts heterogeneous timestamps into comparable local instants
///
/// Holds the local UTC offset and the current date so a whole run uses one
/// consistent view of "local" and "today". Historical DST changes are not
/// taken into account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampNormalizer {
    local_offset: FixedOffset,
    today: NaiveDate,
}

impl TimestampNormalizer {
    /// Create a normalizer with an explicit offset and reference date
    #[must_use]
    pub const fn new(local_offset: FixedOffset, today: NaiveDate) -> Self {
        Self {
            local_offset,
            today,
        }
    }

    /// Create a normalizer from the process's current local offset and date
    #[must_use]
    pub fn system() -> Self {
        let now = Local::now();
        Self::new(*now.offset(), now.date_naive())
    }

    /// Normalize a JSON value: numbers are epoch seconds, strings are dates
    #[must_use]
    pub fn normalize_value(&self, value: &Value) -> Option<NaiveDateTime> {
        match value {
            Value::Number(n) => n.as_f64().and_then(|secs| self.normalize_epoch(secs)),
            Value::String(s) => self.normalize_str(s),
            _ => None,
        }
    }

    /// Normalize Unix epoch seconds (fractional allowed) to local time
    #[must_use]
    pub fn normalize_epoch(&self, secs: f64) -> Option<NaiveDateTime> {
        if !secs.is_finite() {
            return None;
        }
        let whole = secs.floor();
        let mut nanos = ((secs - whole) * 1e9).round() as i64;
        let mut whole = whole as i64;
        if nanos >= 1_000_000_000 {
            whole += 1;
            nanos -= 1_000_000_000;
        }
        let utc = chrono::DateTime::from_timestamp(whole, nanos as u32)?;
        self.to_local(utc.naive_utc())
    }

    /// Normalize a date/time string carried by a log entry or test report
    ///
    /// A trailing `Z` or an explicit `±HH:MM` offset marks the value as
    /// UTC. The offset's own value is not applied; the instant is shifted by
    /// the local offset only.
    #[must_use]
    pub fn normalize_str(&self, raw: &str) -> Option<NaiveDateTime> {
        self.parse_with(raw, DATED_STRATEGIES)
    }

    /// Parse a user-supplied filter bound
    ///
    /// Accepts everything [`normalize_str`](Self::normalize_str) does plus
    /// bare `HH:MM[:SS[.fff]]`, which is placed on the reference date.
    #[must_use]
    pub fn parse_bound(&self, raw: &str) -> Option<NaiveDateTime> {
        self.parse_with(raw, DATED_STRATEGIES)
            .or_else(|| self.parse_with(raw, TIME_ONLY_STRATEGIES))
    }

    fn parse_with(&self, raw: &str, strategies: &[Strategy]) -> Option<NaiveDateTime> {
        let (body, is_utc) = split_zone(raw.trim());
        let parsed = strategies
            .iter()
            .find_map(|strategy| strategy.apply(body, self.today))?;
        if is_utc {
            self.to_local(parsed)
        } else {
            Some(parsed)
        }
    }

    fn to_local(&self, utc: NaiveDateTime) -> Option<NaiveDateTime> {
        let shift = TimeDelta::seconds(i64::from(self.local_offset.local_minus_utc()));
        utc.checked_add_signed(shift)
    }
}

impl Default for TimestampNormalizer {
    fn default() -> Self {
        Self::system()
    }
}

/// Split a zone designator off the end of a timestamp
///
/// Returns the remaining text and whether a designator was present.
fn split_zone(raw: &str) -> (&str, bool) {
    if let Some(body) = raw.strip_suffix(['Z', 'z']) {
        return (body, true);
    }
    if let Some(idx) = raw.rfind(['+', '-']) {
        let (head, tail) = raw.split_at(idx);
        if head.contains(':') && is_offset_digits(&tail[1..]) {
            return (head, true);
        }
    }
    (raw, false)
}

/// `HH`, `HHMM` or `HH:MM`
fn is_offset_digits(s: &str) -> bool {
    let bytes = s.as_bytes();
    match bytes.len() {
        2 | 4 => bytes.iter().all(u8::is_ascii_digit),
        5 => {
            bytes[2] == b':'
                && bytes[..2].iter().all(u8::is_ascii_digit)
                && bytes[3..].iter().all(u8::is_ascii_digit)
        }
        _ => false,
    }
}
