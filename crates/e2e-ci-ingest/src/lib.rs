//! E2E CI Ingest
//!
//! Parsers for the artifacts an end-to-end CI job leaves behind: JUnit XML
//! results, JSON-lines controller logs and JSON-lines test runner output.
//! Every parser is skip-and-warn: one bad file or line never aborts a batch.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// Allow common patterns
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]
#![cfg_attr(test, allow(clippy::uninlined_format_args))]

pub mod error;
pub mod junit;
pub mod log;
pub mod test_output;
pub mod timestamp;

pub use error::{Error, Result};
pub use junit::{JunitParser, SuiteResult, TestRecord, TestStatus, parse_files};
pub use log::{LogEntry, LogStreamParser};
pub use test_output::TestOutputIndex;
pub use timestamp::TimestampNormalizer;
