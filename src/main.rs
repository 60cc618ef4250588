//! dedup-backup - deduplicating directory backup
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use dedup_backup::config::{BackupConfig, CliArgs, Command};
use dedup_backup::progress::{print_header, print_stats, print_summary, ProgressReporter};
use dedup_backup::remote::{FsRemote, RemoteStore};
use dedup_backup::report::{find_missing, log_missing};
use dedup_backup::store::{compute_stats, MetadataStore};
use dedup_backup::walker::BackupCoordinator;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    if let Some(Command::Stats { db, name }) = &args.command {
        return run_stats(db, name);
    }

    // Validate and create config
    let config = BackupConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(
            &config.source_dir.display().to_string(),
            &config.name,
            config.threads,
            &config.store_path.display().to_string(),
            &config.bucket,
        );
    }

    run_backup(config)
}

fn run_backup(config: BackupConfig) -> Result<()> {
    let store = Arc::new(
        MetadataStore::open(&config.store_path, &config.name)
            .context("Cannot open metadata store")?,
    );
    let remote = Arc::new(
        FsRemote::connect(&config.remote_root, &config.project_id, &config.bucket)
            .context("Cannot connect to remote store")?,
    );

    // Create progress reporter
    let progress = config.show_progress.then(ProgressReporter::new);

    let mut coordinator = BackupCoordinator::new(
        config.clone(),
        Arc::clone(&store),
        Arc::clone(&remote) as Arc<dyn RemoteStore>,
    );
    if let Some(p) = &progress {
        p.set_status("Walking...");
        let reporter = p.clone();
        coordinator = coordinator.with_progress(move |snapshot| reporter.update(snapshot));
    }

    // Run the backup
    let result = coordinator.run().context("Backup failed")?;

    if let Some(p) = &progress {
        if result.completed {
            p.finish("Backup completed");
        } else {
            p.finish("Walk failed");
        }
    }

    info!(
        uploaded = remote.stats().uploaded(),
        reused = remote.stats().reused(),
        bytes = remote.stats().bytes_uploaded(),
        bucket = remote.bucket(),
        "Remote activity"
    );

    // An aborted walk leaves live files untouched, so only report after a full walk
    let missing = if result.completed {
        let missing = find_missing(&store, &result.touched).context("Cannot list missing files")?;
        log_missing(&missing);
        Some(missing.len())
    } else {
        warn!("Walk did not complete, skipping missing-file report");
        None
    };

    if config.show_progress {
        print_summary(&result, missing);
    }

    if result.errors() > 0 {
        info!(errors = result.errors(), "Backup completed with errors");
    }

    match result.walk_error {
        Some(e) => Err(anyhow::Error::new(e).context("Cannot walk through files")),
        None => Ok(()),
    }
}

fn run_stats(db: &Path, name: &str) -> Result<()> {
    if !db.is_dir() {
        anyhow::bail!("Metadata store '{}' does not exist", db.display());
    }
    let store = MetadataStore::open(db, name).context("Cannot open metadata store")?;
    let stats = compute_stats(&store).context("Cannot compute statistics")?;
    print_stats(name, &stats);
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("dedup_backup=debug,warn")
    } else {
        EnvFilter::new("dedup_backup=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
