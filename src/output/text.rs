//! Human-readable text report.
//!
//! Each duplicate group is printed as a red header line followed by one
//! block per member:
//!
//! ```text
//! Found 2 files with the same hash (9f86d081884c7d65...)
//! Path: /data/a.bin
//!  - Name:        a.bin
//!  - Size:        1048576 bytes (1.0 MiB)
//!  - ModifiedAt:  2024-05-01 10:22:31 +02:00
//! ```

use std::io::{self, Write};
use std::time::SystemTime;

use bytesize::ByteSize;
use chrono::{DateTime, Local};
use yansi::{Condition, Paint};

use crate::duplicates::{DuplicateGroup, ScanSummary};
use crate::scanner::FileRecord;

/// Digest characters shown in a group header.
const HASH_PREFIX_LEN: usize = 16;

/// Writes duplicate groups as colored text.
#[derive(Debug, Clone, Copy)]
pub struct TextReporter {
    color: bool,
}

impl TextReporter {
    /// Create a reporter; `color` enables ANSI styling.
    #[must_use]
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn condition(&self) -> Condition {
        if self.color {
            Condition::ALWAYS
        } else {
            Condition::NEVER
        }
    }

    /// Write every group followed by a one-line summary.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `writer` fails.
    pub fn write_report<W: Write>(
        &self,
        writer: &mut W,
        groups: &[DuplicateGroup],
        summary: &ScanSummary,
    ) -> io::Result<()> {
        for group in groups {
            self.write_group(writer, group)?;
        }
        self.write_summary(writer, summary)
    }

    /// Write one group.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `writer` fails.
    pub fn write_group<W: Write>(&self, writer: &mut W, group: &DuplicateGroup) -> io::Result<()> {
        let hash = group.hash_hex();
        let header = format!(
            "Found {} files with the same hash ({}...)",
            group.len(),
            &hash[..HASH_PREFIX_LEN]
        );
        writeln!(writer, "{}", header.red().bold().whenever(self.condition()))?;

        for file in &group.files {
            self.write_file(writer, file)?;
        }
        Ok(())
    }

    fn write_file<W: Write>(&self, writer: &mut W, file: &FileRecord) -> io::Result<()> {
        let path = format!("Path: {}", file.path.display());
        writeln!(writer, "{}", path.yellow().whenever(self.condition()))?;
        writeln!(writer, " - Name:        {}", file.name)?;
        writeln!(
            writer,
            " - Size:        {} bytes ({})",
            file.size,
            ByteSize::b(file.size)
        )?;
        writeln!(writer, " - ModifiedAt:  {}", format_modified(file.modified))?;
        writeln!(writer)
    }

    fn write_summary<W: Write>(&self, writer: &mut W, summary: &ScanSummary) -> io::Result<()> {
        if summary.duplicate_groups == 0 {
            return writeln!(
                writer,
                "No duplicate files found ({} files hashed).",
                summary.files_hashed
            );
        }

        let line = format!(
            "{} duplicate groups, {} redundant files, {} reclaimable ({} files hashed in {:.2?})",
            summary.duplicate_groups,
            summary.duplicate_files,
            summary.reclaimable_display(),
            summary.files_hashed,
            summary.scan_duration
        );
        writeln!(writer, "{}", line.bold().whenever(self.condition()))
    }
}

/// Local-time rendering of a modification timestamp.
fn format_modified(modified: SystemTime) -> String {
    let local: DateTime<Local> = modified.into();
    local.format("%Y-%m-%d %H:%M:%S %:z").to_string()
}
