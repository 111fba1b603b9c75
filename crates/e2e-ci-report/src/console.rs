//! Terminal output for filtered controller logs

use chrono::NaiveDateTime;
use colored::{ColoredString, Colorize};
use e2e_ci_ingest::LogEntry;
use serde_json::Value;

use crate::correlate::LogQuery;
use crate::error::Result;
use crate::markdown::{is_blank, value_text};

/// Fields shown on the indented context line under each entry
pub const CONTEXT_FIELDS: &[&str] = &[
    "event-id",
    "event-sha",
    "event-type",
    "namespace",
    "provider",
    "source-repo-url",
];

/// Output style of the log filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsoleFormat {
    /// Colored, human-readable lines
    #[default]
    Pretty,
    /// The original JSON object, one per line
    Json,
}

/// Render one entry in the chosen format
///
/// # Errors
///
/// Returns an error if JSON encoding fails.
pub fn format_entry(entry: &LogEntry, format: ConsoleFormat) -> Result<String> {
    match format {
        ConsoleFormat::Json => Ok(serde_json::to_string(&entry.to_object())?),
        ConsoleFormat::Pretty => Ok(format_pretty(entry)),
    }
}

/// `YYYY-MM-DD HH:MM:SS [LEVEL] caller: msg` plus an optional context line
#[must_use]
pub fn format_pretty(entry: &LogEntry) -> String {
    let level = entry.level.to_uppercase();
    let mut out = format!(
        "{} {} {}: {}",
        display_timestamp(entry),
        paint_level(&level),
        entry.caller,
        entry.message
    );

    let context: Vec<String> = CONTEXT_FIELDS
        .iter()
        .filter_map(|key| {
            let value = entry.fields.get(*key)?;
            (!is_blank(value)).then(|| format!("{key}={}", value_text(value)))
        })
        .collect();
    if !context.is_empty() {
        out.push_str("\n    └─ ");
        out.push_str(&context.join(" "));
    }
    out
}

/// Timestamp as shown in pretty output
///
/// Parseable values are rendered as the normalized local instant, the same
/// clock `--start-time` and `--end-time` are compared against. Unparseable
/// strings are shown as written, with `T` replaced by a space, `Z` dropped
/// and fractions cut off.
#[must_use]
pub fn display_timestamp(entry: &LogEntry) -> String {
    if let Some(t) = entry.timestamp {
        return t.format("%Y-%m-%d %H:%M:%S").to_string();
    }
    match &entry.raw_timestamp {
        None | Some(Value::Number(_)) => String::new(),
        Some(Value::String(s)) => s
            .replace('T', " ")
            .replace('Z', "")
            .chars()
            .take(19)
            .collect(),
        Some(other) => other.to_string(),
    }
}

/// Filter bound for the summary line, `*` when open
#[must_use]
pub fn format_bound(bound: Option<NaiveDateTime>) -> String {
    match bound {
        None => "*".to_string(),
        Some(t) if t.and_utc().timestamp_subsec_micros() > 0 => {
            t.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
        }
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

/// Trailing summary of the filter that was applied
#[must_use]
pub fn filter_summary(query: &LogQuery) -> String {
    let mut scope = format!("levels: {}", query.levels);
    if query.has_time_bound() {
        scope.push_str(&format!(
            ", time: {} to {}",
            format_bound(query.start),
            format_bound(query.end)
        ));
    }

    let mut out = String::from("\n--- Summary ---");
    if !query.event_shas.is_empty() {
        out.push_str(&format!("\nEvent SHAs: {} ({scope})", query.event_shas.join(", ")));
    }
    if !query.event_ids.is_empty() {
        out.push_str(&format!("\nEvent IDs: {} ({scope})", query.event_ids.join(", ")));
    }
    if query.event_shas.is_empty() && query.event_ids.is_empty() {
        out.push_str(&format!("\nAll events ({scope})"));
    }
    out
}

fn paint_level(level: &str) -> ColoredString {
    let tag = format!("[{level}]");
    match level {
        "INFO" => tag.green(),
        "WARN" => tag.yellow(),
        "ERROR" => tag.red(),
        "DEBUG" => tag.cyan(),
        _ => tag.normal(),
    }
}
