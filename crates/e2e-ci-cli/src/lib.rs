//! E2E CI CLI Library
//!
//! Library functions behind the `e2e-ci` binary: resolving configuration,
//! locating artifacts, and driving the ingest and report crates.

#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_const_for_fn)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod logging;

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use e2e_ci_ingest::{LogStreamParser, TestOutputIndex, TimestampNormalizer, parse_files};
use e2e_ci_report::console::{self, ConsoleFormat};
use e2e_ci_report::markdown::{self, ReportRenderer};
use e2e_ci_report::{DetailMode, LevelPolicy, LevelSet, LogQuery, ProviderResult, Summary};
use rayon::prelude::*;

/// Prefix of per-provider artifact directories in combined mode
pub const PROVIDER_DIR_PREFIX: &str = "logs-e2e-tests-";
/// Directory holding JUnit XML and runner JSON inside a provider directory
pub const RESULTS_SUBDIR: &str = "test-results";
/// Controller log file inside a provider directory
pub const CONTROLLER_LOG_NAME: &str = "pac-pods.log";

/// Resolved configuration of the `summary` command
#[derive(Debug, Clone)]
pub struct SummaryConfig {
    /// Report destination; always appended to
    pub summary_file: PathBuf,
    /// Provider name in single-provider mode
    pub provider: String,
    /// Directory with `*.xml` and `*.json` results in single-provider mode
    pub results_dir: PathBuf,
    /// Controller log file in single-provider mode
    pub logs_file: Option<PathBuf>,
    /// Combined mode root; `None` selects single-provider mode
    pub artifacts_dir: Option<PathBuf>,
    /// Which tests get a detail section
    pub detail: DetailMode,
    /// Log level selection for correlated logs
    pub levels: LevelPolicy,
    /// Emit window diagnostics
    pub debug: bool,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            summary_file: PathBuf::from("/dev/stdout"),
            provider: "unknown".to_string(),
            results_dir: PathBuf::from("/tmp/test-results"),
            logs_file: None,
            artifacts_dir: None,
            detail: DetailMode::default(),
            levels: LevelPolicy::default(),
            debug: false,
        }
    }
}

impl SummaryConfig {
    fn renderer(&self) -> ReportRenderer {
        ReportRenderer::new()
            .with_detail_mode(self.detail)
            .with_level_policy(self.levels.clone())
    }
}

/// Parse `SHOW_LOGS_FOR`, falling back to `failed` with a warning
pub fn parse_show_logs_for(raw: &str) -> DetailMode {
    raw.parse().unwrap_or_else(|e: String| {
        tracing::warn!("{e}, using 'failed'");
        DetailMode::Failed
    })
}

/// Parse `LOG_LEVELS`; unset or blank keeps the status-based default
pub fn parse_log_levels(raw: Option<&str>) -> LevelPolicy {
    match raw.map(str::trim) {
        None | Some("") => LevelPolicy::StatusDefault,
        Some(spec) => LevelPolicy::Fixed(LevelSet::parse(spec)),
    }
}

/// Split a comma-separated argument, dropping blanks
pub fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

/// Files directly inside `dir` with the given extension, sorted
pub fn find_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let pattern = format!(
        "{}/*.{extension}",
        glob::Pattern::escape(&dir.display().to_string())
    );
    let mut files: Vec<PathBuf> = match glob::glob(&pattern) {
        Ok(paths) => paths.filter_map(Result::ok).filter(|p| p.is_file()).collect(),
        Err(e) => {
            tracing::warn!("Invalid search pattern {pattern}: {e}");
            Vec::new()
        }
    };
    files.sort();
    files
}

/// Provider directories under a combined-mode artifacts root, sorted
///
/// Returns `(provider name, directory)` pairs.
pub fn discover_providers(artifacts_dir: &Path) -> Vec<(String, PathBuf)> {
    let pattern = format!(
        "{}/{PROVIDER_DIR_PREFIX}*",
        glob::Pattern::escape(&artifacts_dir.display().to_string())
    );
    let mut providers: Vec<(String, PathBuf)> = glob::glob(&pattern)
        .map(|paths| {
            paths
                .filter_map(Result::ok)
                .filter(|p| p.is_dir())
                .filter_map(|p| {
                    let name = p.file_name()?.to_str()?.strip_prefix(PROVIDER_DIR_PREFIX)?;
                    Some((name.to_string(), p.clone()))
                })
                .collect()
        })
        .unwrap_or_default();
    providers.sort();
    providers
}

/// Load one provider's results, runner output and controller logs
///
/// A provider without XML files yields [`ProviderResult::missing`].
/// Unreadable inputs are skipped with a warning.
pub fn load_provider(
    name: &str,
    results_dir: &Path,
    logs_file: Option<&Path>,
    normalizer: &TimestampNormalizer,
) -> ProviderResult {
    let xml_files = find_files(results_dir, "xml");
    if xml_files.is_empty() {
        tracing::debug!(provider = name, dir = %results_dir.display(), "no XML files found");
        return ProviderResult::missing(name);
    }
    let suite = parse_files(normalizer, &xml_files);

    let logs = match logs_file {
        Some(path) => match LogStreamParser::new(normalizer).parse_file(path) {
            Ok(logs) => {
                tracing::info!(provider = name, "Loaded {} controller log entries", logs.len());
                logs
            }
            Err(e) => {
                tracing::warn!(provider = name, "{e}");
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let json_files = find_files(results_dir, "json");
    let test_outputs = TestOutputIndex::from_files(&json_files);
    if !test_outputs.is_empty() {
        tracing::info!(provider = name, "Loaded test output for {} tests", test_outputs.len());
    }

    ProviderResult::new(name, suite, logs, test_outputs)
}

/// Render the single-provider summary
pub fn render_single(config: &SummaryConfig, normalizer: &TimestampNormalizer) -> String {
    let provider = load_provider(
        &config.provider,
        &config.results_dir,
        config.logs_file.as_deref(),
        normalizer,
    );
    if config.debug {
        log_window_diagnostics(&provider);
    }
    config.renderer().render_provider(&provider)
}

/// Render the combined summary for every provider under `artifacts_dir`
///
/// Providers are loaded in parallel; the summary orders them by name.
pub fn render_combined(
    artifacts_dir: &Path,
    renderer: &ReportRenderer,
    normalizer: &TimestampNormalizer,
) -> String {
    if !artifacts_dir.exists() {
        return markdown::missing_artifacts_section(artifacts_dir);
    }
    let dirs = discover_providers(artifacts_dir);
    if dirs.is_empty() {
        return markdown::no_providers_section();
    }

    let providers: Vec<ProviderResult> = dirs
        .par_iter()
        .map(|(name, dir)| {
            tracing::debug!(provider = %name, dir = %dir.display(), "processing provider");
            let logs_file = dir.join(CONTROLLER_LOG_NAME);
            load_provider(
                name,
                &dir.join(RESULTS_SUBDIR),
                logs_file.exists().then_some(logs_file.as_path()),
                normalizer,
            )
        })
        .collect();

    renderer.render_combined(&Summary::aggregate(providers))
}

/// Build and append the summary report
///
/// # Errors
///
/// Fails only when the report destination cannot be written.
pub fn run_summary(config: &SummaryConfig) -> Result<(), String> {
    let normalizer = TimestampNormalizer::system();
    let report = match &config.artifacts_dir {
        Some(dir) => {
            tracing::info!("Running in combined mode with artifacts from: {}", dir.display());
            render_combined(dir, &config.renderer(), &normalizer)
        }
        None => render_single(config, &normalizer),
    };
    markdown::append_report(&config.summary_file, &report).map_err(|e| e.to_string())
}

/// Build the filter for the `filter-logs` command
///
/// `all_levels` overrides `level`. Time bounds accept dated or time-only
/// values; time-only bounds use today's date.
///
/// # Errors
///
/// Returns an error naming the bound that could not be parsed.
pub fn build_log_query(
    event_sha: Option<&str>,
    event_id: Option<&str>,
    level: &str,
    all_levels: bool,
    start_time: Option<&str>,
    end_time: Option<&str>,
    normalizer: &TimestampNormalizer,
) -> Result<LogQuery, String> {
    let levels = if all_levels {
        LevelSet::Any
    } else {
        LevelSet::only(level.split(','))
    };
    let bound = |raw: Option<&str>, which: &str| -> Result<_, String> {
        raw.map(|r| {
            normalizer
                .parse_bound(r)
                .ok_or_else(|| format!("Invalid {which} time format: {r}"))
        })
        .transpose()
    };
    let start = bound(start_time, "start")?;
    let end = bound(end_time, "end")?;

    Ok(LogQuery::new()
        .with_levels(levels)
        .with_range(start, end)
        .with_event_shas(split_list(event_sha))
        .with_event_ids(split_list(event_id)))
}

/// Stream log lines from `reader`, writing matching entries to `out`
///
/// Returns the number of entries written.
///
/// # Errors
///
/// Fails if reading the input or writing the output fails.
pub fn filter_logs<R: BufRead, W: Write>(
    reader: R,
    out: &mut W,
    query: &LogQuery,
    format: ConsoleFormat,
    normalizer: &TimestampNormalizer,
) -> Result<usize, String> {
    let parser = LogStreamParser::new(normalizer);
    let mut written = 0;
    for chunk in reader.split(b'\n') {
        let bytes = chunk.map_err(|e| format!("Error reading logs: {e}"))?;
        let Some(entry) = parser.parse_line(&String::from_utf8_lossy(&bytes)) else {
            continue;
        };
        if !query.matches(&entry) {
            continue;
        }
        let line = console::format_entry(&entry, format).map_err(|e| e.to_string())?;
        writeln!(out, "{line}").map_err(|e| format!("Error writing output: {e}"))?;
        written += 1;
    }
    Ok(written)
}

/// Filter a log file, or stdin when `file` is `None`, to stdout
///
/// # Errors
///
/// Fails if the file does not exist or cannot be read.
pub fn run_filter_logs(
    file: Option<&Path>,
    query: &LogQuery,
    format: ConsoleFormat,
    normalizer: &TimestampNormalizer,
) -> Result<usize, String> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match file {
        Some(path) => {
            let f = File::open(path).map_err(|_| format!("File not found: {}", path.display()))?;
            filter_logs(BufReader::new(f), &mut out, query, format, normalizer)
        }
        None => filter_logs(std::io::stdin().lock(), &mut out, query, format, normalizer),
    }
}

fn log_window_diagnostics(provider: &ProviderResult) {
    let Some(suite) = &provider.suite else {
        return;
    };
    tracing::debug!("Suite start time: {:?}", suite.suite_start);
    if let Some(first) = suite.tests.first() {
        tracing::debug!(
            "First test: {}, start: {:?}, end: {:?}",
            first.name,
            first.start,
            first.end
        );
    }
    if let (Some(first), Some(last)) = (provider.logs.first(), provider.logs.last()) {
        tracing::debug!("First log timestamp: {:?}", first.timestamp);
        tracing::debug!("Last log timestamp: {:?}", last.timestamp);
    }
}
