//! E2E CI CLI
//!
//! Command-line interface for summarizing e2e test runs and filtering
//! controller logs.

#![allow(clippy::doc_markdown)]

use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};
use e2e_ci_cli::logging::init_logging;
use e2e_ci_cli::{
    SummaryConfig, build_log_query, parse_log_levels, parse_show_logs_for, run_filter_logs,
    run_summary,
};
use e2e_ci_ingest::TimestampNormalizer;
use e2e_ci_report::ConsoleFormat;
use e2e_ci_report::console::filter_summary;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "e2e-ci")]
#[command(about = "E2E CI job summary and controller log tools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a Markdown test summary with correlated controller logs
    Summary {
        /// Report destination (appended, never truncated)
        #[arg(long, env = "GITHUB_STEP_SUMMARY", default_value = "/dev/stdout")]
        summary_file: PathBuf,

        /// Provider name used in single-provider mode
        #[arg(long, env = "TEST_PROVIDER", default_value = "unknown")]
        provider: String,

        /// Directory containing JUnit XML and runner JSON files
        #[arg(long, env = "TEST_RESULTS_DIR", default_value = "/tmp/test-results")]
        results_dir: PathBuf,

        /// Controller log file (JSON lines)
        #[arg(long, env = "CONTROLLER_LOGS_FILE")]
        logs_file: Option<PathBuf>,

        /// Directory with logs-e2e-tests-<provider> artifacts; enables combined mode
        #[arg(long, env = "ARTIFACTS_DIR")]
        artifacts_dir: Option<PathBuf>,

        /// Which tests get details: failed, all or none
        #[arg(long, env = "SHOW_LOGS_FOR", default_value = "failed")]
        show_logs_for: String,

        /// Print window diagnostics to stderr
        #[arg(long, env = "DEBUG_SUMMARY", value_parser = FalseyValueParser::new())]
        debug: bool,

        /// Comma-separated log levels to correlate, or "all"
        #[arg(long, env = "LOG_LEVELS")]
        log_levels: Option<String>,
    },

    /// Filter controller logs by event, level and time range
    FilterLogs {
        /// Comma-separated event-sha values (prefixes match)
        #[arg(short = 's', long)]
        event_sha: Option<String>,

        /// Comma-separated event-id values
        #[arg(short = 'i', long)]
        event_id: Option<String>,

        /// Log file to read (default: stdin)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output the original JSON objects instead of pretty lines
        #[arg(short, long)]
        json: bool,

        /// Comma-separated log levels to include
        #[arg(short, long, default_value = "error")]
        level: String,

        /// Show all log levels (overrides --level)
        #[arg(short, long)]
        all_levels: bool,

        /// Start time ('HH:MM:SS.mmm', 'YYYY-MM-DD HH:MM:SS.mmm', ...)
        #[arg(short = 'S', long)]
        start_time: Option<String>,

        /// End time ('HH:MM:SS.mmm', 'YYYY-MM-DD HH:MM:SS.mmm', ...)
        #[arg(short = 'E', long)]
        end_time: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Summary {
            summary_file,
            provider,
            results_dir,
            logs_file,
            artifacts_dir,
            show_logs_for,
            debug,
            log_levels,
        } => {
            init_logging(debug);
            let non_empty = |p: Option<PathBuf>| p.filter(|p| !p.as_os_str().is_empty());
            let config = SummaryConfig {
                summary_file,
                provider: if provider.trim().is_empty() {
                    "unknown".to_string()
                } else {
                    provider
                },
                results_dir,
                logs_file: non_empty(logs_file),
                artifacts_dir: non_empty(artifacts_dir),
                detail: parse_show_logs_for(&show_logs_for),
                levels: parse_log_levels(log_levels.as_deref()),
                debug,
            };
            if let Err(e) = run_summary(&config) {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        Commands::FilterLogs {
            event_sha,
            event_id,
            file,
            json,
            level,
            all_levels,
            start_time,
            end_time,
        } => {
            init_logging(false);
            let normalizer = TimestampNormalizer::system();
            let query = match build_log_query(
                event_sha.as_deref(),
                event_id.as_deref(),
                &level,
                all_levels,
                start_time.as_deref(),
                end_time.as_deref(),
                &normalizer,
            ) {
                Ok(query) => query,
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            };
            let format = if json {
                ConsoleFormat::Json
            } else {
                ConsoleFormat::Pretty
            };
            if let Err(e) = run_filter_logs(file.as_deref(), &query, format, &normalizer) {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
            eprintln!("{}", filter_summary(&query));
        }
    }
}
