//! Test runner output index
//!
//! gotestsum's `--jsonfile` output carries one event per line:
//!
//! ```text
//! {"Time":"...","Action":"output","Package":"test","Test":"TestFoo","Output":"line\n"}
//! {"Time":"...","Action":"pass","Package":"test","Test":"TestFoo","Elapsed":1.5}
//! ```
//!
//! Only `output` events are kept, concatenated per test in file order.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct RunnerEvent {
    #[serde(rename = "Action", default)]
    action: Option<String>,
    #[serde(rename = "Test", default)]
    test: Option<String>,
    #[serde(rename = "Output", default)]
    output: Option<String>,
}

/// Captured stdout/stderr per test name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestOutputIndex {
    entries: Vec<(String, String)>,
    by_name: HashMap<String, usize>,
}

impl TestOutputIndex {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append output for a test, creating its entry on first use
    pub fn append(&mut self, test: &str, output: &str) {
        if let Some(&idx) = self.by_name.get(test) {
            self.entries[idx].1.push_str(output);
        } else {
            self.by_name.insert(test.to_string(), self.entries.len());
            self.entries.push((test.to_string(), output.to_string()));
        }
    }

    /// Feed one JSON line; anything other than a named `output` event is ignored
    pub fn ingest_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let Ok(event) = serde_json::from_str::<RunnerEvent>(line) else {
            return;
        };
        if event.action.as_deref() != Some("output") {
            return;
        }
        match event.test.as_deref() {
            Some(test) if !test.is_empty() => {
                self.append(test, event.output.as_deref().unwrap_or_default());
            }
            _ => {}
        }
    }

    /// Feed every line of a reader
    ///
    /// # Errors
    ///
    /// Returns an error only if the reader fails.
    pub fn ingest_reader<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for chunk in reader.split(b'\n') {
            let bytes = chunk?;
            self.ingest_line(&String::from_utf8_lossy(&bytes));
        }
        Ok(())
    }

    /// Feed one runner output file
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadFailed`] if the file cannot be opened or read.
    pub fn ingest_file(&mut self, path: &Path) -> Result<()> {
        let read_failed = |source| Error::ReadFailed {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(read_failed)?;
        self.ingest_reader(BufReader::new(file)).map_err(|e| match e {
            Error::IoError(source) => read_failed(source),
            other => other,
        })
    }

    /// Build an index from several files, skipping unreadable ones
    #[must_use]
    pub fn from_files(paths: &[PathBuf]) -> Self {
        let mut index = Self::new();
        for path in paths {
            if let Err(e) = index.ingest_file(path) {
                tracing::warn!("Could not read runner output: {e}");
            }
        }
        index
    }

    /// Output for a test
    ///
    /// Exact name match first; otherwise the first test (in file order)
    /// whose name is a suffix of `name` or has `name` as suffix, which maps
    /// `Parent/Child` subtests onto their reports.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&str> {
        if let Some(&idx) = self.by_name.get(name) {
            let output = &self.entries[idx].1;
            if !output.is_empty() {
                return Some(output);
            }
        }
        self.entries
            .iter()
            .find(|(test, output)| {
                !output.is_empty() && (test.ends_with(name) || name.ends_with(test.as_str()))
            })
            .map(|(_, output)| output.as_str())
    }

    /// Number of tests with captured output
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Test names in first-seen order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const RUNNER_JSON: &str = r#"{"Time":"2026-01-22T06:11:50Z","Action":"run","Package":"test","Test":"TestFoo"}
{"Time":"2026-01-22T06:11:50Z","Action":"output","Package":"test","Test":"TestFoo","Output":"=== RUN   TestFoo\n"}
{"Time":"2026-01-22T06:11:50Z","Action":"output","Package":"test","Output":"package-level line\n"}
{"Time":"2026-01-22T06:11:51Z","Action":"output","Package":"test","Test":"TestBar/sub_case","Output":"sub output\n"}
not json at all
{"Time":"2026-01-22T06:11:52Z","Action":"output","Package":"test","Test":"TestFoo","Output":"    foo_test.go:12: boom\n"}
{"Time":"2026-01-22T06:11:52Z","Action":"fail","Package":"test","Test":"TestFoo","Elapsed":2}
"#;

    fn index() -> TestOutputIndex {
        let mut index = TestOutputIndex::new();
        index.ingest_reader(Cursor::new(RUNNER_JSON)).unwrap();
        index
    }

    #[test]
    fn test_output_concatenated_in_order() {
        let index = index();
        assert_eq!(
            index.lookup("TestFoo"),
            Some("=== RUN   TestFoo\n    foo_test.go:12: boom\n")
        );
    }

    #[test]
    fn test_only_named_output_events_kept() {
        let index = index();
        assert_eq!(index.len(), 2);
        let names: Vec<_> = index.names().collect();
        assert_eq!(names, vec!["TestFoo", "TestBar/sub_case"]);
    }

    #[test]
    fn test_suffix_fallback_for_subtests() {
        let index = index();
        assert_eq!(index.lookup("sub_case"), Some("sub output\n"));
        assert_eq!(
            index.lookup("github.com/org/repo/test/TestBar/sub_case"),
            Some("sub output\n")
        );
    }

    #[test]
    fn test_lookup_miss() {
        let index = index();
        assert_eq!(index.lookup("TestMissing"), None);
        assert!(TestOutputIndex::new().lookup("TestFoo").is_none());
    }

    #[test]
    fn test_ingest_file_and_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        std::fs::write(&a, RUNNER_JSON).unwrap();
        let missing = dir.path().join("missing.json");

        let index = TestOutputIndex::from_files(&[missing, a]);
        assert_eq!(index.len(), 2);
        assert!(!index.is_empty());
    }
}
