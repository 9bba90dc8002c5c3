//! Command-line interface definitions for dupfind.
//!
//! Every scan option is optional here; unset options fall through to the
//! config file, the environment, and finally the built-in defaults (see
//! [`crate::config`]).
//!
//! # Example
//!
//! ```bash
//! # Scan a directory with the default pipeline strategy
//! dupfind ~/Downloads
//!
//! # Recursive fan-out, at most 8 concurrent I/O tasks, JSON report
//! dupfind ~/Downloads --strategy fan-out -j 8 --output json
//!
//! # Include smaller files
//! dupfind ~/Downloads --min-size 4KiB
//! ```

use clap::Parser;
use std::path::PathBuf;

use crate::duplicates::Strategy;
use crate::output::OutputFormat;
use crate::scanner::HashAlgorithm;

/// Concurrent duplicate file finder.
///
/// Walks a directory tree, hashes every file of at least the minimum size,
/// and reports groups of files with identical content.
#[derive(Debug, Parser)]
#[command(name = "dupfind")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to scan for duplicates
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors and the report
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, env = "NO_COLOR")]
    pub no_color: bool,

    /// Disable the progress spinner
    #[arg(long)]
    pub no_progress: bool,

    /// Minimum file size to consider (default: 512KiB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB.
    /// Empty files are always skipped.
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Scheduling strategy
    #[arg(long, value_enum)]
    pub strategy: Option<Strategy>,

    /// Maximum number of concurrently active I/O tasks (default: 2 x CPUs)
    #[arg(short, long, value_name = "N", value_parser = parse_positive)]
    pub jobs: Option<usize>,

    /// Capacity of the bounded work and result queues (default: 256)
    #[arg(long, value_name = "N", value_parser = parse_positive)]
    pub queue_capacity: Option<usize>,

    /// Read buffer size used while hashing (default: 64KiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub chunk_size: Option<u64>,

    /// Content hash function
    #[arg(long, value_enum)]
    pub algorithm: Option<HashAlgorithm>,

    /// Report format
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Configuration file (default: platform config dir, config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use dupfind::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("512KiB").unwrap(), 524_288);
/// assert_eq!(parse_size("1MiB").unwrap(), 1_048_576);
/// ```
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
    if s.starts_with('-') {
        return Err("Size cannot be negative".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1 << 10,
        "MB" | "M" => 1_000_000,
        "MIB" => 1 << 20,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1 << 30,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1 << 40,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    // Whole numbers stay exact; only fractional input goes through f64.
    if let Ok(whole) = num_str.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| format!("Size too large: '{s}'"));
    }
    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;
    Ok((num * multiplier as f64) as u64)
}

/// Parse a count that must be at least 1.
///
/// # Errors
///
/// Returns an error for zero or non-numeric input.
pub fn parse_positive(s: &str) -> Result<usize, String> {
    match s.trim().parse::<usize>() {
        Ok(0) => Err("Value must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("Invalid number: '{s}'")),
    }
}
