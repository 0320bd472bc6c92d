//! Command-line interface definitions for purescan.
//!
//! All CLI arguments, subcommands, and options using the clap derive API.
//! Global options (verbosity, database path) apply to every subcommand.
//!
//! # Example
//!
//! ```bash
//! # Scan a directory tree and persist results
//! purescan scan ~/Pictures
//!
//! # List duplicate groups as JSON for scripting
//! purescan duplicates --output json
//!
//! # Show files above 100 MiB
//! purescan large-files --min-size 100MiB
//!
//! # Verbose mode for debugging
//! purescan -v scan ~/Pictures
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Storage cleanup scanner.
///
/// purescan indexes media files, fingerprints them with SHA-256, and
/// persists the results for duplicate detection and storage statistics.
#[derive(Debug, Parser)]
#[command(name = "purescan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Path to the file store database
    ///
    /// If not specified, the configured or platform-specific path is used.
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for purescan.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a directory tree: index, fingerprint, and detect duplicates
    Scan(ScanArgs),
    /// List duplicate groups from the last persisted scan
    Duplicates(DuplicatesArgs),
    /// List files above a size threshold
    LargeFiles(LargeFilesArgs),
    /// Show storage statistics
    Stats(StatsArgs),
    /// Soft-delete files by id
    Cleanup(CleanupArgs),
    /// Physically remove soft-deleted records past the grace period
    Purge(PurgeArgs),
    /// Upload fingerprint metadata to the configured endpoint
    Sync(SyncArgs),
    /// List past scan sessions
    Sessions(SessionsArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directory tree to index
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Output format for the scan summary
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Number of I/O threads for hashing (default: 4)
    ///
    /// Lower values reduce disk thrashing on HDDs.
    #[arg(long, value_name = "N", default_value = "4")]
    pub io_threads: usize,
}

/// Arguments for the duplicates subcommand.
#[derive(Debug, Args)]
pub struct DuplicatesArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the large-files subcommand.
#[derive(Debug, Args)]
pub struct LargeFilesArgs {
    /// Minimum file size (e.g., 50MiB, 1GB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB.
    /// Defaults to the configured large-file threshold.
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the stats subcommand.
#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the cleanup subcommand.
#[derive(Debug, Args)]
pub struct CleanupArgs {
    /// Record ids to soft-delete
    #[arg(value_name = "ID", required_unless_present = "duplicates")]
    pub ids: Vec<String>,

    /// Soft-delete every duplicate copy, keeping the oldest per group
    #[arg(long, conflicts_with = "ids")]
    pub duplicates: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Arguments for the purge subcommand.
#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Grace period in days; soft-deleted records older than this are
    /// removed. Defaults to the configured value.
    #[arg(long, value_name = "DAYS")]
    pub grace_days: Option<u32>,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Arguments for the sync subcommand.
#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Endpoint URL; overrides the configured sync endpoint
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,
}

/// Arguments for the sessions subcommand.
#[derive(Debug, Args)]
pub struct SessionsArgs {
    /// Show at most this many sessions, newest first
    #[arg(long, value_name = "N", default_value = "10")]
    pub limit: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB.
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// a negative number, or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    // Find where the number ends and the suffix begins
    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    if num < 0.0 {
        return Err("Size cannot be negative".to_string());
    }

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
