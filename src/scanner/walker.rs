//! Directory walker.
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct for traversing a directory tree
//! and producing a [`FileRecord`] for every regular file that passes the size
//! filter. It offers two building blocks, one per scheduling strategy:
//!
//! - [`Walker::walk`]: a lazy sequential traversal of the whole tree (via
//!   [`walkdir`]).
//! - [`Walker::stream`]: one traversal task feeding a bounded queue, listing
//!   each directory under a governor permit.
//! - [`Walker::read_directory`]: list a single directory, leaving recursion
//!   to the caller so each subdirectory can become its own task.
//!
//! Symbolic links are never followed. Entries that cannot be read are
//! logged and skipped; only a failure to read the scan root is fatal.
//!
//! # Example
//!
//! ```no_run
//! use dupfind::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Downloads"), WalkerConfig::default());
//! let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
//! println!("Found {} candidate files", files.len());
//! ```

use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crossbeam_channel::Sender;
use walkdir::WalkDir;

use super::{FileRecord, Governor, ScanError, WalkerConfig};
use crate::progress::ProgressCallback;

/// Counters from a sequential walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Qualifying files emitted
    pub files: usize,
    /// Total bytes across emitted files
    pub bytes: u64,
    /// Entries skipped because of an error
    pub errors: usize,
}

/// Contents of a single directory.
#[derive(Debug, Default)]
pub struct DirListing {
    /// Subdirectories to descend into
    pub subdirs: Vec<PathBuf>,
    /// Qualifying files
    pub files: Vec<FileRecord>,
    /// Entries skipped because of an error
    pub errors: usize,
}

/// Directory walker for file discovery.
#[derive(Debug, Clone)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given path.
    ///
    /// # Arguments
    ///
    /// * `path` - Root directory to scan
    /// * `config` - Walker configuration options
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// When the flag is set to `true`, the walker stops as soon as it next
    /// checks it.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Root of the walk.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Walk the whole tree, yielding file records.
    ///
    /// Errors are yielded as [`ScanError`] values rather than stopping
    /// iteration; callers decide what is fatal via [`ScanError::is_fatal`].
    pub fn walk(&self) -> impl Iterator<Item = Result<FileRecord, ScanError>> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .take_while(move |_| {
                if self.is_shutdown_requested() {
                    log::debug!("Walker: Shutdown requested, stopping iteration");
                    return false;
                }
                true
            })
            .filter_map(move |entry_result| match entry_result {
                Ok(entry) => self.process_entry(entry),
                Err(e) => Some(Err(self.handle_walk_error(e))),
            })
    }

    /// Walk the whole tree depth-first and push every record onto `queue`.
    ///
    /// Each directory is listed with [`read_directory`](Self::read_directory)
    /// while holding a permit from `governor`; the directory handle is closed
    /// before the permit is released and before any record is sent.
    ///
    /// Returns once the tree is exhausted, shutdown is requested, or the
    /// queue has no receivers left.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::RootUnreadable`] if the root cannot be read.
    pub fn stream(
        &self,
        queue: &Sender<FileRecord>,
        governor: &Governor,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<WalkStats, ScanError> {
        let mut stats = WalkStats::default();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping traversal");
                break;
            }
            let listing = {
                let Some(_permit) = governor.acquire() else {
                    break;
                };
                self.read_directory(&dir)
            };
            let listing = match listing {
                Ok(listing) => listing,
                Err(e) if e.is_fatal() => return Err(e),
                Err(_) => {
                    stats.errors += 1;
                    continue;
                }
            };

            stats.errors += listing.errors;
            pending.extend(listing.subdirs.into_iter().rev());
            for record in listing.files {
                stats.files += 1;
                stats.bytes += record.size;
                if let Some(progress) = progress {
                    progress.on_file_found(&record);
                }
                if queue.send(record).is_err() {
                    log::debug!("Walker: metadata queue closed, stopping");
                    return Ok(stats);
                }
            }
        }

        Ok(stats)
    }

    /// List one directory without recursing.
    ///
    /// # Errors
    ///
    /// Fails if `dir` itself cannot be listed. For the walk root this is
    /// [`ScanError::RootUnreadable`].
    pub fn read_directory(&self, dir: &Path) -> Result<DirListing, ScanError> {
        let entries = fs::read_dir(dir).map_err(|e| {
            if dir == self.root {
                ScanError::RootUnreadable {
                    path: dir.to_path_buf(),
                    source: e,
                }
            } else {
                self.handle_io_error(dir, e)
            }
        })?;

        let mut listing = DirListing::default();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.handle_io_error(dir, e);
                    listing.errors += 1;
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    self.handle_io_error(&path, e);
                    listing.errors += 1;
                    continue;
                }
            };

            if file_type.is_dir() {
                listing.subdirs.push(path);
                continue;
            }
            if !file_type.is_file() {
                log::trace!("Skipping non-regular file: {}", path.display());
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => {
                    if let Some(record) = self.record_from_metadata(path, &metadata) {
                        listing.files.push(record);
                    }
                }
                Err(e) => {
                    self.handle_io_error(&path, e);
                    listing.errors += 1;
                }
            }
        }

        listing.subdirs.sort();
        listing.files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(listing)
    }

    /// Turn a walkdir entry into a record if it is a qualifying file.
    fn process_entry(&self, entry: walkdir::DirEntry) -> Option<Result<FileRecord, ScanError>> {
        // The root itself is never a candidate
        if entry.depth() == 0 {
            return None;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            return None;
        }
        if !file_type.is_file() {
            log::trace!("Skipping non-regular file: {}", entry.path().display());
            return None;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => return Some(Err(self.handle_walk_error(e))),
        };

        self.record_from_metadata(entry.into_path(), &metadata)
            .map(Ok)
    }

    /// Apply the size filter and build a record.
    fn record_from_metadata(&self, path: PathBuf, metadata: &Metadata) -> Option<FileRecord> {
        let size = metadata.len();

        if size == 0 {
            log::trace!("Skipping empty file: {}", path.display());
            return None;
        }
        if !self.config.qualifies(size) {
            log::trace!(
                "Skipping file below size threshold ({} < {}): {}",
                size,
                self.config.min_size,
                path.display()
            );
            return None;
        }

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Some(FileRecord::new(path, size, modified))
    }

    /// Handle I/O errors during entry access.
    fn handle_io_error(&self, path: &Path, error: std::io::Error) -> ScanError {
        let err = ScanError::from_io(path, error);
        log::warn!("{}", err);
        err
    }

    /// Handle walkdir errors. Errors at depth 0 concern the root and are fatal.
    fn handle_walk_error(&self, error: walkdir::Error) -> ScanError {
        let depth = error.depth();
        let path = error
            .path()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);
        let message = error.to_string();
        let source = error
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other(message));

        if depth == 0 {
            return ScanError::RootUnreadable { path, source };
        }
        self.handle_io_error(&path, source)
    }
}
