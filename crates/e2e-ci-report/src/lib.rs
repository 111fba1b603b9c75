//! E2E CI Report
//!
//! Attributes controller log entries to tests by time, merges per-provider
//! results into one summary and renders the Markdown posted as the CI job
//! summary. Also formats filtered log entries for the terminal.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// Allow common patterns
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::needless_raw_string_hashes)]
#![allow(clippy::uninlined_format_args)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod aggregate;
pub mod console;
pub mod correlate;
pub mod error;
pub mod markdown;

pub use aggregate::{
    DetailMode, Inconsistency, InconsistencyKind, ProviderResult, Summary, Tally, Verdict,
};
pub use console::ConsoleFormat;
pub use correlate::{CorrelationWindow, LevelPolicy, LevelSet, LogQuery, correlate};
pub use error::{Error, Result};
pub use markdown::{ReportRenderer, append_report};
