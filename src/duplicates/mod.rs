//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Scan orchestration under either scheduling strategy
//! - Single-writer aggregation of digests into a result map
//! - Duplicate group management

pub mod aggregator;
pub mod finder;
pub mod groups;

pub use aggregator::{Aggregator, AggregatorHandle, ResultMap};
pub use finder::{
    DuplicateFinder, FinderConfig, FinderError, RunState, ScanSummary, Strategy,
    DEFAULT_QUEUE_CAPACITY,
};
pub use groups::DuplicateGroup;
