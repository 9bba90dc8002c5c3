//! Output formatters for duplicate scan results.
//!
//! This module provides the report formats:
//! - Colored text for terminals (default)
//! - JSON for automation and scripting
//!
//! # Example
//!
//! ```no_run
//! use dupfind::duplicates::DuplicateFinder;
//! use dupfind::error::ExitCode;
//! use dupfind::output::JsonReporter;
//! use std::path::Path;
//!
//! let finder = DuplicateFinder::with_defaults();
//! let (map, summary) = finder.find_duplicates(Path::new(".")).unwrap();
//! let groups = map.duplicate_groups();
//!
//! let output = JsonReporter::new(&groups, &summary, ExitCode::Success);
//! println!("{}", output.to_json_pretty().unwrap());
//! ```

pub mod json;
pub mod text;

use serde::{Deserialize, Serialize};

pub use json::{JsonOutputError, JsonReporter};
pub use text::TextReporter;

/// Report format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Colored human-readable text
    #[default]
    Text,
    /// Machine-readable JSON
    Json,
}
