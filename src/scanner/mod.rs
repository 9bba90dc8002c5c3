//! Scanner module for directory traversal, resource bounding and file hashing.
//!
//! This module provides functionality for:
//! - Directory walking with size filtering
//! - A counting semaphore that bounds concurrently active I/O tasks
//! - Streaming content hashing (BLAKE3 or SHA-256)
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and file discovery
//! - [`governor`]: Bounded permit pool shared by every I/O task
//! - [`hasher`]: Chunked file hashing
//!
//! # Example
//!
//! ```no_run
//! use dupfind::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig {
//!     min_size: 1024, // Skip files under 1KB
//! };
//!
//! let walker = Walker::new(Path::new("."), config);
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod governor;
pub mod hasher;
pub mod walker;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

pub use governor::{Governor, Permit};
pub use hasher::{digest_to_hex, HashAlgorithm, Hasher, DEFAULT_CHUNK_SIZE, MIN_CHUNK_SIZE};
pub use walker::{DirListing, WalkStats, Walker};

/// Content digest shared by byte-identical files.
pub type Digest = [u8; 32];

/// Default minimum size for a file to be considered (512 KiB).
pub const DEFAULT_MIN_SIZE: u64 = 512 * 1024;

/// Metadata for a discovered file.
///
/// Created once per qualifying file during the walk and never modified
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path to the file as reached from the scan root
    pub path: PathBuf,
    /// Final path component
    pub name: String,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl FileRecord {
    /// Create a new FileRecord, deriving `name` from the path.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the file
    /// * `size` - File size in bytes
    /// * `modified` - Last modification time
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        let name = file_name_of(&path);
        Self {
            path,
            name,
            size,
            modified,
        }
    }
}

/// A file record paired with the digest of its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestedRecord {
    /// The file this digest belongs to
    pub record: FileRecord,
    /// Content digest
    pub digest: Digest,
}

impl DigestedRecord {
    /// Digest rendered as lowercase hex.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        digest_to_hex(&self.digest)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Configuration for directory walking.
///
/// Symbolic links are never followed and non-regular files are never
/// reported; only the size filter is tunable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkerConfig {
    /// Minimum file size to include (in bytes).
    /// Empty files are skipped regardless of this value.
    pub min_size: u64,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_SIZE,
        }
    }
}

impl WalkerConfig {
    /// Set the minimum file size.
    #[must_use]
    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }

    /// Whether a regular file of `size` bytes should be hashed.
    #[must_use]
    pub fn qualifies(&self, size: u64) -> bool {
        size > 0 && size >= self.min_size
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// The scan root could not be opened or listed. Aborts the run.
    #[error("Cannot read scan root {path}: {source}")]
    RootUnreadable {
        /// The root path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The entry disappeared between listing and stat.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Classify an I/O error for a single entry.
    #[must_use]
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Whether this error must abort the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RootUnreadable { .. })
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Hashing stopped because shutdown was requested.
    #[error("Hashing interrupted: {0}")]
    Interrupted(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    /// Classify an I/O error raised while opening or reading `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}
