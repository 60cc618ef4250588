//! Progress reporting for backup runs
//!
//! Provides real-time progress display using indicatif, plus the header,
//! summary and `stats` output printed around it.

use crate::store::StoreStats;
use crate::walker::{RunProgress, RunResult};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays run status
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        let spinner = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(spinner);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &RunProgress) {
        let phase = if progress.walk_done { "Draining" } else { "Walking" };

        let msg = format!(
            "{} | Files: {}/{} | Uploaded: {} ({}) | Dups: {} | Errors: {} | Rate: {:.0}/s | Queue: {} | Active: {}",
            phase,
            format_number(progress.files_processed),
            format_number(progress.files_queued),
            format_number(progress.uploaded),
            format_size(progress.bytes_uploaded, BINARY),
            format_number(progress.duplicates),
            format_number(progress.errors),
            progress.files_per_second(),
            progress.queue_len,
            progress.in_flight(),
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of a run
pub fn print_header(source: &str, name: &str, workers: usize, store: &str, bucket: &str) {
    println!();
    println!(
        "{} {}",
        style("dedup-backup").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), source);
    println!("  {} {}", style("Backup:").bold(), name);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Store:").bold(), store);
    println!("  {} {}", style("Bucket:").bold(), bucket);
    println!();
}

/// Print a summary of the run results
pub fn print_summary(result: &RunResult, missing: Option<usize>) {
    let o = &result.outcomes;
    let duration_secs = result.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        o.files_processed as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    if result.completed {
        println!("{}", style("Backup Complete").green().bold());
    } else {
        println!("{}", style("Backup Incomplete (walk failed)").red().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Directories:").bold(), format_number(result.dirs));
    println!(
        "  {} {} ({})",
        style("Files:").bold(),
        format_number(o.files_processed),
        format_size(result.bytes_queued, BINARY)
    );
    println!(
        "  {} {} ({}, {} resumed)",
        style("Uploaded:").bold(),
        format_number(o.uploaded),
        format_size(o.bytes_uploaded, BINARY),
        format_number(o.resumed)
    );
    println!("  {} {}", style("Duplicates:").bold(), format_number(o.duplicates));
    println!("  {} {}", style("Renamed:").bold(), format_number(o.renamed));
    println!("  {} {}", style("Unchanged:").bold(), format_number(o.unchanged));
    println!("  {} {}", style("Skipped:").bold(), format_number(result.ignored));
    println!(
        "  {} {:.1}s ({:.0} files/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if o.errors > 0 {
        println!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(o.errors)
        );
    }
    if let Some(missing) = missing {
        if missing > 0 {
            println!(
                "  {} {}",
                style("Missing:").yellow().bold(),
                format_number(missing as u64)
            );
        }
    }
    println!();
}

/// Print statistics for a namespace
pub fn print_stats(name: &str, stats: &StoreStats) {
    println!();
    println!("{} {}", style("Backup").cyan().bold(), name);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Entries:").bold(), format_number(stats.total_entries));
    println!("  {} {}", style("Uploaded:").bold(), format_number(stats.complete));
    println!(
        "  {} {} ({})",
        style("Pending:").bold(),
        format_number(stats.incomplete),
        format_size(stats.pending_bytes, BINARY)
    );
    println!(
        "  {} {}",
        style("Total Size:").bold(),
        format_size(stats.total_bytes, BINARY)
    );
    println!("  {} {}", style("Last ID:").bold(), stats.last_id);
    if stats.corrupt > 0 {
        println!(
            "  {} {}",
            style("Corrupt:").red().bold(),
            format_number(stats.corrupt)
        );
    }

    let or_never = |v: &Option<String>| v.clone().unwrap_or_else(|| "never".to_string());
    println!("  {} {}", style("Last Start:").bold(), or_never(&stats.last_run_start));
    println!("  {} {}", style("Last End:").bold(), or_never(&stats.last_run_end));
    println!("  {} {}", style("Last Status:").bold(), or_never(&stats.last_run_status));
    if let Some(source) = &stats.last_run_source {
        println!("  {} {}", style("Last Source:").bold(), source);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }
}
