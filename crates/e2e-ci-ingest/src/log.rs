//! Controller log parsing
//!
//! Controller pods emit one JSON object per line. Captured log files are
//! usually mixed with plain-text noise (kubectl banners, stack dumps), so
//! anything that is not a JSON object line is silently dropped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::timestamp::TimestampNormalizer;

/// Key holding the entry timestamp (epoch number or ISO string)
pub const TS_KEY: &str = "ts";
/// Key holding the log level
pub const LEVEL_KEY: &str = "level";
/// Key holding the log message
pub const MSG_KEY: &str = "msg";
/// Key holding the source location
pub const CALLER_KEY: &str = "caller";

/// Level assumed when an entry carries none
pub const DEFAULT_LEVEL: &str = "info";

/// A single structured controller log line
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Normalized local instant, `None` when `ts` was missing or unparseable
    pub timestamp: Option<NaiveDateTime>,
    /// The `ts` value exactly as it appeared in the file
    pub raw_timestamp: Option<Value>,
    /// Lower-cased level
    pub level: String,
    /// Log message
    pub message: String,
    /// Source location (`file.go:123`)
    pub caller: String,
    /// All remaining keys in file order
    pub fields: Map<String, Value>,
}

impl LogEntry {
    /// Build an entry from a decoded JSON object
    #[must_use]
    pub fn from_object(mut object: Map<String, Value>, normalizer: &TimestampNormalizer) -> Self {
        let raw_timestamp = object.remove(TS_KEY);
        let timestamp = raw_timestamp
            .as_ref()
            .and_then(|ts| normalizer.normalize_value(ts));
        let level = object
            .remove(LEVEL_KEY)
            .map_or_else(|| DEFAULT_LEVEL.to_string(), value_text)
            .to_lowercase();
        let message = object.remove(MSG_KEY).map(value_text).unwrap_or_default();
        let caller = object.remove(CALLER_KEY).map(value_text).unwrap_or_default();

        Self {
            timestamp,
            raw_timestamp,
            level,
            message,
            caller,
            fields: object,
        }
    }

    /// String value of an extra field, if present and a string
    #[must_use]
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Re-assemble the original JSON object
    #[must_use]
    pub fn to_object(&self) -> Map<String, Value> {
        let mut object = Map::new();
        if let Some(ts) = &self.raw_timestamp {
            object.insert(TS_KEY.to_string(), ts.clone());
        }
        object.insert(LEVEL_KEY.to_string(), Value::String(self.level.clone()));
        object.insert(MSG_KEY.to_string(), Value::String(self.message.clone()));
        if !self.caller.is_empty() {
            object.insert(CALLER_KEY.to_string(), Value::String(self.caller.clone()));
        }
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        object
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Reads JSON-lines controller logs into [`LogEntry`] values
#[derive(Debug, Clone, Copy)]
pub struct LogStreamParser<'a> {
    normalizer: &'a TimestampNormalizer,
}

impl<'a> LogStreamParser<'a> {
    /// Create a parser using the given normalizer
    #[must_use]
    pub fn new(normalizer: &'a TimestampNormalizer) -> Self {
        Self { normalizer }
    }

    /// Parse a single line, `None` for anything that is not a JSON object
    #[must_use]
    pub fn parse_line(&self, line: &str) -> Option<LogEntry> {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        let object: Map<String, Value> = serde_json::from_str(line).ok()?;
        Some(LogEntry::from_object(object, self.normalizer))
    }

    /// Parse every line of a reader, keeping file order
    ///
    /// # Errors
    ///
    /// Returns an error only if the underlying reader fails.
    pub fn parse_reader<R: BufRead>(&self, reader: R) -> Result<Vec<LogEntry>> {
        let mut entries = Vec::new();
        for chunk in reader.split(b'\n') {
            let bytes = chunk?;
            let line = String::from_utf8_lossy(&bytes);
            if let Some(entry) = self.parse_line(&line) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Parse a log file
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadFailed`] if the file cannot be opened or read.
    pub fn parse_file(&self, path: &Path) -> Result<Vec<LogEntry>> {
        let read_failed = |source| Error::ReadFailed {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(read_failed)?;
        let entries = self
            .parse_reader(BufReader::new(file))
            .map_err(|e| match e {
                Error::IoError(source) => read_failed(source),
                other => other,
            })?;
        tracing::debug!(path = %path.display(), entries = entries.len(), "parsed controller log");
        Ok(entries)
    }
}
