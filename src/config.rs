//! Configuration types for dedup-backup
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Skip-list parsing

use crate::content::{SampleWindow, DEFAULT_SAMPLE_SIZE};
use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Default worker count
const DEFAULT_THREADS: usize = 20;

/// Smallest accepted sample window
const MIN_SAMPLE_SIZE: u64 = 1024;

/// Directory names skipped by default (NAS thumbnail caches)
pub const DEFAULT_SKIP_DIRS: &str = "@eaDir,.thumbcache";

/// File name suffixes skipped by default
pub const DEFAULT_SKIP_FILES: &str = ".dttags,.ini,thumbs.db,.DS_Store";

/// Deduplicating backup of a directory tree to an object store
#[derive(Parser, Debug, Clone)]
#[command(
    name = "dedup-backup",
    version,
    about = "Deduplicating backup of a directory tree to an object store",
    long_about = "Walks a directory tree, fingerprints every file by size and a sampled \
                  SHA-256, and uploads content not seen before. A local RocksDB store \
                  remembers what has been uploaded, so unchanged, moved and duplicated \
                  files are never sent twice.",
    after_help = "EXAMPLES:\n    \
        dedup-backup --db backup.rocks --name photos --dir /srv/photos \\\n        \
            --project-id home --bucket archive --remote-root /mnt/cold\n    \
        dedup-backup stats --db backup.rocks --name photos",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
pub struct CliArgs {
    /// Subcommand (stats)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Metadata store directory (RocksDB)
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Backup name: store namespace and remote object prefix
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Directory to back up
    #[arg(long, value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short = 't', long, default_value_t = DEFAULT_THREADS, value_name = "NUM")]
    pub threads: usize,

    /// Project owning the bucket
    #[arg(long, value_name = "ID")]
    pub project_id: Option<String>,

    /// Bucket receiving the objects
    #[arg(long, value_name = "NAME")]
    pub bucket: Option<String>,

    /// Root directory of the object store
    #[arg(long, value_name = "PATH")]
    pub remote_root: Option<PathBuf>,

    /// Comma-separated directory names to skip
    #[arg(long, default_value = DEFAULT_SKIP_DIRS, value_name = "LIST")]
    pub skip_dir: String,

    /// Comma-separated file name suffixes to skip
    #[arg(long, default_value = DEFAULT_SKIP_FILES, value_name = "LIST")]
    pub skip_file: String,

    /// Bytes hashed per file (whole file if smaller)
    #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE, value_name = "BYTES")]
    pub sample_size: u64,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Subcommands
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Show statistics for a backup namespace
    Stats {
        /// Metadata store directory (RocksDB)
        #[arg(long, value_name = "PATH")]
        db: PathBuf,

        /// Backup name
        #[arg(long, value_name = "NAME")]
        name: String,
    },
}

/// Validated runtime configuration for a backup run
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Metadata store path
    pub store_path: PathBuf,

    /// Backup name (namespace and object prefix)
    pub name: String,

    /// Root of the tree to back up
    pub source_dir: PathBuf,

    /// Number of worker threads
    pub threads: usize,

    /// Object store project
    pub project_id: String,

    /// Object store bucket
    pub bucket: String,

    /// Object store root directory
    pub remote_root: PathBuf,

    /// Directory names pruned from traversal
    pub skip_dirs: Vec<String>,

    /// File name suffixes ignored by traversal
    pub skip_files: Vec<String>,

    /// Sample window in bytes
    pub sample_size: u64,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl BackupConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let store_path = args.db.ok_or(ConfigError::Missing {
            hint: "--db is required",
        })?;
        let name = required(args.name, "--name is required")?;
        let source_dir = args.dir.ok_or(ConfigError::Missing {
            hint: "--dir is required",
        })?;
        let project_id = required(args.project_id, "--project-id is required")?;
        let bucket = required(args.bucket, "--bucket is required")?;
        let remote_root = args.remote_root.ok_or(ConfigError::Missing {
            hint: "--remote-root is required",
        })?;

        validate_name(&name)?;

        if args.threads == 0 || args.threads > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.threads,
                max: MAX_WORKERS,
            });
        }

        if args.sample_size < MIN_SAMPLE_SIZE {
            return Err(ConfigError::InvalidSampleSize {
                size: args.sample_size,
                min: MIN_SAMPLE_SIZE,
            });
        }

        if !source_dir.is_dir() {
            return Err(ConfigError::InvalidSourceDir {
                path: source_dir,
                reason: "Not an existing directory".to_string(),
            });
        }

        if store_path.exists() && !store_path.is_dir() {
            return Err(ConfigError::InvalidStorePath {
                path: store_path,
                reason: "Exists and is not a directory".to_string(),
            });
        }

        Ok(Self {
            store_path,
            name,
            source_dir,
            threads: args.threads,
            project_id,
            bucket,
            remote_root,
            skip_dirs: parse_list(&args.skip_dir),
            skip_files: parse_list(&args.skip_file),
            sample_size: args.sample_size,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Work queue capacity
    pub fn queue_capacity(&self) -> usize {
        self.threads * 2
    }

    /// Fingerprint sample window
    pub fn sample_window(&self) -> SampleWindow {
        SampleWindow::new(self.sample_size)
    }

    /// Check if a directory with this name should be pruned
    pub fn is_skipped_dir(&self, name: &str) -> bool {
        self.skip_dirs.iter().any(|d| d == name)
    }

    /// Check if a file with this name should be ignored
    pub fn is_skipped_file(&self, name: &str) -> bool {
        self.skip_files.iter().any(|suffix| name.ends_with(suffix.as_str()))
    }
}

fn required(value: Option<String>, hint: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::Missing { hint }),
    }
}

/// A backup name becomes a column family suffix and an object prefix
pub fn validate_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("empty"));
    }
    if name.contains(['/', '\\']) {
        return Err(invalid("must not contain path separators"));
    }
    if name == "." || name == ".." {
        return Err(invalid("reserved name"));
    }
    Ok(())
}

/// Split a comma-separated list, trimming items and dropping empty ones
pub fn parse_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["dedup-backup"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    fn full_args(dir: &str) -> Vec<String> {
        [
            "--db", "backup.rocks", "--name", "photos", "--dir", dir, "--project-id", "home",
            "--bucket", "archive", "--remote-root", "/tmp/remote",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("@eaDir,.thumbcache"), vec!["@eaDir", ".thumbcache"]);
        assert_eq!(parse_list(" a , ,b,"), vec!["a", "b"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_defaults() {
        let src = tempdir().unwrap();
        let argv = full_args(src.path().to_str().unwrap());
        let refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        let config = BackupConfig::from_args(args(&refs)).unwrap();

        assert_eq!(config.threads, 20);
        assert_eq!(config.queue_capacity(), 40);
        assert_eq!(config.sample_size, 128_000);
        assert_eq!(config.skip_dirs, vec!["@eaDir", ".thumbcache"]);
        assert_eq!(config.skip_files.len(), 4);
        assert!(config.show_progress);
    }

    #[test]
    fn test_skip_rules() {
        let src = tempdir().unwrap();
        let argv = full_args(src.path().to_str().unwrap());
        let refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        let config = BackupConfig::from_args(args(&refs)).unwrap();

        assert!(config.is_skipped_dir("@eaDir"));
        assert!(!config.is_skipped_dir("eaDir"));
        assert!(config.is_skipped_file("desktop.ini"));
        assert!(!config.is_skipped_file("Thumbs.db"));
        assert!(config.is_skipped_file("thumbs.db"));
        assert!(!config.is_skipped_file("photo.jpg"));
    }

    #[test]
    fn test_missing_required() {
        let err = BackupConfig::from_args(args(&["--db", "x"])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }

    #[test]
    fn test_invalid_threads() {
        let src = tempdir().unwrap();
        let mut argv = full_args(src.path().to_str().unwrap());
        argv.extend(["--threads".to_string(), "0".to_string()]);
        let refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        let err = BackupConfig::from_args(args(&refs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWorkerCount { count: 0, .. }));
    }

    #[test]
    fn test_invalid_sample_size() {
        let src = tempdir().unwrap();
        let mut argv = full_args(src.path().to_str().unwrap());
        argv.extend(["--sample-size".to_string(), "10".to_string()]);
        let refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        let err = BackupConfig::from_args(args(&refs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSampleSize { size: 10, .. }));
    }

    #[test]
    fn test_missing_source_dir() {
        let src = tempdir().unwrap();
        let gone = src.path().join("nope");
        let argv = full_args(gone.to_str().unwrap());
        let refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        let err = BackupConfig::from_args(args(&refs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSourceDir { .. }));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("photos").is_ok());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("").is_err());
    }

    #[test]
    fn test_stats_subcommand() {
        let cli = args(&["stats", "--db", "backup.rocks", "--name", "photos"]);
        match cli.command {
            Some(Command::Stats { db, name }) => {
                assert_eq!(db, PathBuf::from("backup.rocks"));
                assert_eq!(name, "photos");
            }
            None => panic!("expected stats subcommand"),
        }
    }
}
