//! Progress reporting utilities using indicatif.
//!
//! This module provides the [`ProgressCallback`] trait, invoked from the
//! walker and hashing tasks, and the [`Progress`] spinner which implements
//! it on stderr.
//!
//! Callbacks arrive concurrently from many threads, so counters are atomic
//! and the spinner itself is only touched through indicatif's thread-safe
//! handle.

use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use bytesize::ByteSize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::scanner::{DigestedRecord, FileRecord};

/// Progress callback for a duplicate scan.
///
/// Implement this trait to receive progress updates during a scan.
pub trait ProgressCallback: Send + Sync {
    /// Called once before the walk begins.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory being scanned
    fn on_scan_start(&self, root: &Path);

    /// Called for each qualifying file the walker emits.
    fn on_file_found(&self, record: &FileRecord);

    /// Called after a file has been hashed successfully.
    fn on_file_hashed(&self, _record: &DigestedRecord) {}

    /// Called once after every task has finished, whether or not the scan
    /// completed.
    fn on_scan_end(&self);
}

/// Spinner progress reporter using indicatif.
pub struct Progress {
    bar: Mutex<Option<ProgressBar>>,
    found: AtomicUsize,
    hashed: AtomicUsize,
    hashed_bytes: AtomicU64,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, nothing is drawn.
    ///
    /// # Examples
    ///
    /// ```
    /// use dupfind::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            found: AtomicUsize::new(0),
            hashed: AtomicUsize::new(0),
            hashed_bytes: AtomicU64::new(0),
            quiet,
        }
    }

    /// Files found so far.
    #[must_use]
    pub fn found(&self) -> usize {
        self.found.load(Ordering::Relaxed)
    }

    /// Files hashed so far.
    #[must_use]
    pub fn hashed(&self) -> usize {
        self.hashed.load(Ordering::Relaxed)
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn status(&self) -> String {
        format!(
            "{} found, {} hashed ({})",
            self.found(),
            self.hashed(),
            ByteSize::b(self.hashed_bytes.load(Ordering::Relaxed))
        )
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(ref pb) = *guard {
                f(pb);
            }
        }
    }
}

impl ProgressCallback for Progress {
    fn on_scan_start(&self, root: &Path) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(Self::style());
        pb.set_message(format!("Scanning {}", truncate_path(&root.to_string_lossy(), 40)));
        pb.enable_steady_tick(Duration::from_millis(100));
        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(pb);
        }
    }

    fn on_file_found(&self, _record: &FileRecord) {
        self.found.fetch_add(1, Ordering::Relaxed);
        self.with_bar(|pb| pb.set_message(self.status()));
    }

    fn on_file_hashed(&self, record: &DigestedRecord) {
        self.hashed.fetch_add(1, Ordering::Relaxed);
        self.hashed_bytes
            .fetch_add(record.record.size, Ordering::Relaxed);
        self.with_bar(|pb| pb.set_message(self.status()));
    }

    fn on_scan_end(&self) {
        let taken = self.bar.lock().ok().and_then(|mut guard| guard.take());
        if let Some(pb) = taken {
            pb.finish_and_clear();
            log::debug!("Scan finished: {}", self.status());
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len + 4 > max_len {
        let tail: String = file_name
            .chars()
            .skip(name_len.saturating_sub(max_len.saturating_sub(3)))
            .collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
