//! Top-level application logic: wires CLI subcommands to the core modules.

use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use bytesize::ByteSize;
use chrono::{TimeZone, Utc};

use crate::catalog::FsCatalog;
use crate::cli::{
    CleanupArgs, Cli, Commands, DuplicatesArgs, LargeFilesArgs, OutputFormat, PurgeArgs, ScanArgs,
    SessionsArgs, StatsArgs, SyncArgs,
};
use crate::config::Config;
use crate::duplicates::Grouper;
use crate::error::ExitCode;
use crate::fingerprint::FsContentSource;
use crate::progress::Progress;
use crate::scan::ScanOrchestrator;
use crate::stats::StatsAggregator;
use crate::store::FileStore;
use crate::sync::{FileMetadataDto, MetadataEndpoint, SyncError, SyncJob};

/// Run the application with parsed CLI arguments.
///
/// Returns the exit code the process should terminate with; hard errors
/// propagate as `anyhow::Error` and map to [`ExitCode::GeneralError`].
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    crate::logging::init_logging(cli.verbose, cli.quiet);

    let config = Config::load();
    let db_path = match cli.db {
        Some(path) => path,
        None => config.resolve_database_path()?,
    };
    log::debug!("Using file store at {}", db_path.display());
    let store = FileStore::open(&db_path).context("failed to open file store")?;

    match cli.command {
        Commands::Scan(args) => cmd_scan(&store, args, cli.quiet),
        Commands::Duplicates(args) => cmd_duplicates(&store, args),
        Commands::LargeFiles(args) => cmd_large_files(&store, &config, args),
        Commands::Stats(args) => cmd_stats(&store, &config, args),
        Commands::Cleanup(args) => cmd_cleanup(&store, args),
        Commands::Purge(args) => cmd_purge(&store, &config, args),
        Commands::Sync(args) => cmd_sync(&store, &config, args),
        Commands::Sessions(args) => cmd_sessions(&store, args),
    }
}

fn cmd_scan(store: &FileStore, args: ScanArgs, quiet: bool) -> Result<ExitCode> {
    let catalog = FsCatalog::single_root(&args.path);

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&cancel);
        ctrlc::set_handler(move || {
            log::warn!("Interrupt received, stopping at the next file boundary");
            flag.store(true, Ordering::SeqCst);
        })
        .context("failed to install Ctrl+C handler")?;
    }

    let orchestrator = ScanOrchestrator::new(store, &catalog, FsContentSource)
        .with_io_threads(args.io_threads)
        .with_cancel_flag(Arc::clone(&cancel))
        .with_progress(Arc::new(Progress::new(quiet)));

    let outcome = orchestrator.run_scan()?;

    match args.output {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "session": outcome.session,
                "groups": outcome.groups,
                "hash_failures": outcome.hash_failures,
                "cancelled": outcome.cancelled,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!(
                "Scanned {} files ({})",
                outcome.session.files_scanned,
                ByteSize(outcome.session.bytes_scanned)
            );
            println!(
                "Found {} duplicate groups, {} reclaimable",
                outcome.groups.len(),
                ByteSize(outcome.session.bytes_potentially_saved)
            );
            if outcome.hash_failures > 0 {
                println!("{} files could not be fingerprinted", outcome.hash_failures);
            }
        }
    }

    if outcome.cancelled {
        return Ok(ExitCode::Interrupted);
    }
    if outcome.hash_failures > 0 {
        Ok(ExitCode::PartialSuccess)
    } else if outcome.groups.is_empty() {
        Ok(ExitCode::NoDuplicates)
    } else {
        Ok(ExitCode::Success)
    }
}

fn cmd_duplicates(store: &FileStore, args: DuplicatesArgs) -> Result<ExitCode> {
    let groups = Grouper::new(store).groups()?;

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&groups)?);
        }
        OutputFormat::Text => {
            if groups.is_empty() {
                println!("No duplicates found.");
            }
            for group in &groups {
                println!(
                    "{}  {} copies, {} total, {} reclaimable",
                    &group.content_hash[..12],
                    group.count(),
                    ByteSize(group.total_size()),
                    ByteSize(group.potential_savings())
                );
                for (i, file) in group.files.iter().enumerate() {
                    let marker = if i == 0 { "keep" } else { "dup " };
                    println!(
                        "  [{marker}] {}  {}  modified {}",
                        file.id,
                        file.locator,
                        format_timestamp(file.date_modified)
                    );
                }
            }
        }
    }

    if groups.is_empty() {
        Ok(ExitCode::NoDuplicates)
    } else {
        Ok(ExitCode::Success)
    }
}

fn cmd_large_files(store: &FileStore, config: &Config, args: LargeFilesArgs) -> Result<ExitCode> {
    let min_size = args.min_size.unwrap_or(config.large_file_threshold);
    let files = store.large_files(min_size)?;

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&files)?);
        }
        OutputFormat::Text => {
            if files.is_empty() {
                println!("No files at or above {}.", ByteSize(min_size));
            }
            for file in &files {
                println!(
                    "{:>10}  {}  {}",
                    ByteSize(file.size).to_string(),
                    file.media_type.as_str(),
                    file.locator
                );
            }
        }
    }
    Ok(ExitCode::Success)
}

fn cmd_stats(store: &FileStore, config: &Config, args: StatsArgs) -> Result<ExitCode> {
    let stats = StatsAggregator::new(store)
        .with_large_file_threshold(config.large_file_threshold)
        .snapshot()?;

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        OutputFormat::Text => {
            println!(
                "Total:      {} files, {}",
                stats.total_files,
                ByteSize(stats.total_size)
            );
            println!(
                "Duplicates: {} files, {}",
                stats.duplicate_files,
                ByteSize(stats.duplicate_size)
            );
            println!(
                "Large:      {} files, {} (threshold {})",
                stats.large_files,
                ByteSize(stats.large_files_size),
                ByteSize(config.large_file_threshold)
            );
            println!("Reclaimable: {}", ByteSize(stats.potential_savings));
        }
    }
    Ok(ExitCode::Success)
}

fn cmd_cleanup(store: &FileStore, args: CleanupArgs) -> Result<ExitCode> {
    let ids: Vec<String> = if args.duplicates {
        // Every copy except the oldest in each group.
        let groups = Grouper::new(store).groups()?;
        groups
            .iter()
            .flat_map(|g| g.files.iter().skip(1).map(|f| f.id.clone()))
            .collect()
    } else {
        args.ids
    };

    if ids.is_empty() {
        println!("Nothing to delete.");
        return Ok(ExitCode::Success);
    }

    if !args.yes && !confirm(&format!("Soft-delete {} file record(s)?", ids.len()))? {
        println!("Aborted.");
        return Ok(ExitCode::Success);
    }

    let deleted = store.mark_deleted(&ids)?;
    store.recompute_duplicate_flags()?;
    println!("Soft-deleted {deleted} record(s). Run `purescan purge` after the grace period to reclaim space in the store.");
    Ok(ExitCode::Success)
}

fn cmd_purge(store: &FileStore, config: &Config, args: PurgeArgs) -> Result<ExitCode> {
    let grace_days = args.grace_days.unwrap_or(config.purge_grace_days);
    let cutoff = Utc::now().timestamp_millis() - i64::from(grace_days) * 86_400_000;

    if !args.yes
        && !confirm(&format!(
            "Permanently remove soft-deleted records older than {grace_days} day(s)?"
        ))?
    {
        println!("Aborted.");
        return Ok(ExitCode::Success);
    }

    let purged = store.purge_deleted_before(cutoff)?;
    let sessions = store.delete_sessions_before(cutoff)?;
    println!("Purged {purged} record(s) and {sessions} old session(s).");
    Ok(ExitCode::Success)
}

fn cmd_sync(store: &FileStore, config: &Config, args: SyncArgs) -> Result<ExitCode> {
    let endpoint = args
        .endpoint
        .or_else(|| config.sync_endpoint.clone())
        .context("no sync endpoint configured; pass --endpoint or set it in the config file")?;

    let spool = NdjsonSpool::new(PathBuf::from(endpoint));
    let report = SyncJob::new(store, &spool).run()?;
    println!(
        "Synced {} record(s), skipped {} unhashed.",
        report.uploaded, report.skipped_unhashed
    );
    Ok(ExitCode::Success)
}

fn cmd_sessions(store: &FileStore, args: SessionsArgs) -> Result<ExitCode> {
    let mut sessions = store.sessions()?;
    sessions.truncate(args.limit);

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        OutputFormat::Text => {
            if sessions.is_empty() {
                println!("No scan sessions recorded.");
            }
            for s in &sessions {
                let status = match (&s.finished_at, &s.error) {
                    (None, _) => "running".to_string(),
                    (Some(_), Some(e)) => format!("failed: {e}"),
                    (Some(_), None) => "completed".to_string(),
                };
                println!(
                    "{}  started {}  {} files, {} dup(s), {} reclaimable  [{status}]",
                    s.id,
                    format_timestamp(s.started_at),
                    s.files_scanned,
                    s.duplicates_found,
                    ByteSize(s.bytes_potentially_saved)
                );
            }
        }
    }
    Ok(ExitCode::Success)
}

/// Metadata endpoint that appends each batch as JSON lines to a spool
/// file. A separate uploader drains the spool; keeping the handoff local
/// means a sync run never blocks on the network.
struct NdjsonSpool {
    path: PathBuf,
    file: Mutex<Option<std::fs::File>>,
}

impl NdjsonSpool {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: Mutex::new(None),
        }
    }
}

impl MetadataEndpoint for NdjsonSpool {
    fn upload(&self, batch: &[FileMetadataDto]) -> Result<(), SyncError> {
        let mut guard = self.file.lock().unwrap();
        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| SyncError::Endpoint(format!("{}: {e}", self.path.display())))?;
            *guard = Some(file);
        }
        let file = guard.as_mut().unwrap();
        for dto in batch {
            let line = serde_json::to_string(dto)
                .map_err(|e| SyncError::Endpoint(e.to_string()))?;
            writeln!(file, "{line}").map_err(|e| SyncError::Endpoint(e.to_string()))?;
        }
        Ok(())
    }
}

/// Prompt for a yes/no confirmation on stdin. Defaults to no.
fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes" | "Yes"))
}

/// Render an epoch-milliseconds timestamp for display.
fn format_timestamp(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => millis.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
        assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14 22:13:20");
    }

    #[test]
    fn test_ndjson_spool_appends_batches() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("spool.ndjson");
        let spool = NdjsonSpool::new(path.clone());

        let dto = FileMetadataDto {
            sha256: "a".repeat(64),
            size: 10,
            mime: None,
            path_tail: "x.jpg".to_string(),
        };
        spool.upload(std::slice::from_ref(&dto)).unwrap();
        spool.upload(std::slice::from_ref(&dto)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let back: FileMetadataDto = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(back, dto);
    }
}
