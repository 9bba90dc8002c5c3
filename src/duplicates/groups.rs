//! Confirmed duplicate groups.
//!
//! # Example
//!
//! ```
//! use dupfind::duplicates::DuplicateGroup;
//! use dupfind::scanner::FileRecord;
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let files = vec![
//!     FileRecord::new(PathBuf::from("/a.bin"), 1024, SystemTime::now()),
//!     FileRecord::new(PathBuf::from("/b.bin"), 1024, SystemTime::now()),
//! ];
//! let group = DuplicateGroup::new([0u8; 32], files);
//!
//! assert_eq!(group.duplicate_count(), 1);
//! assert_eq!(group.wasted_space(), 1024);
//! ```

use crate::scanner::{digest_to_hex, Digest, FileRecord};

/// Files whose contents hash to the same digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    /// Content digest shared by every member
    pub digest: Digest,
    /// File size in bytes (shared by all members)
    pub size: u64,
    /// Member files, in aggregation order
    pub files: Vec<FileRecord>,
}

impl DuplicateGroup {
    /// Create a group from its digest and members.
    ///
    /// The size is taken from the first member.
    #[must_use]
    pub fn new(digest: Digest, files: Vec<FileRecord>) -> Self {
        let size = files.first().map_or(0, |f| f.size);
        if let Some(odd) = files.iter().find(|f| f.size != size) {
            log::warn!(
                "Group {} mixes sizes: {} is {} bytes, expected {}",
                digest_to_hex(&digest),
                odd.path.display(),
                odd.size,
                size
            );
        }
        Self {
            digest,
            size,
            files,
        }
    }

    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if the group has no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of redundant copies (all files minus one).
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.files.len().saturating_sub(1)
    }

    /// Bytes that could be reclaimed by keeping a single copy.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size * self.duplicate_count() as u64
    }

    /// Digest as a lowercase hex string.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        digest_to_hex(&self.digest)
    }
}
