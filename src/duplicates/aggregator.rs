//! Single-writer result aggregation.
//!
//! # Overview
//!
//! The [`Aggregator`] is the only place the digest → file-list map is ever
//! written. It runs on one dedicated thread and consumes the pair channel
//! until every sender has been dropped, then hands the finished
//! [`ResultMap`] back through [`AggregatorHandle::join`].
//!
//! Hashing tasks never touch the map directly, so no lock is involved.

use std::collections::HashMap;
use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use super::groups::DuplicateGroup;
use crate::scanner::{Digest, DigestedRecord};

/// Mapping from content digest to every file that produced it.
///
/// Within a bucket, records keep the order in which the aggregator
/// received them.
#[derive(Debug, Clone, Default)]
pub struct ResultMap {
    buckets: HashMap<Digest, Vec<DigestedRecord>>,
    records: usize,
}

impl ResultMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the bucket for its digest.
    pub fn insert(&mut self, record: DigestedRecord) {
        self.buckets.entry(record.digest).or_default().push(record);
        self.records += 1;
    }

    /// Number of distinct digests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Check if no record was ever inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total records across all buckets.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records
    }

    /// Records sharing `digest`, if any.
    #[must_use]
    pub fn bucket(&self, digest: &Digest) -> Option<&[DigestedRecord]> {
        self.buckets.get(digest).map(Vec::as_slice)
    }

    /// Iterate over all buckets.
    pub fn buckets(&self) -> impl Iterator<Item = (&Digest, &[DigestedRecord])> {
        self.buckets.iter().map(|(d, v)| (d, v.as_slice()))
    }

    /// Every bucket with more than one member, as a duplicate group.
    ///
    /// Groups are returned largest reclaimable space first, ties broken by
    /// digest, so output is stable between runs.
    #[must_use]
    pub fn duplicate_groups(&self) -> Vec<DuplicateGroup> {
        let mut groups: Vec<DuplicateGroup> = self
            .buckets
            .iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(digest, members)| {
                DuplicateGroup::new(
                    *digest,
                    members.iter().map(|m| m.record.clone()).collect(),
                )
            })
            .collect();

        groups.sort_by(|a, b| {
            b.wasted_space()
                .cmp(&a.wasted_space())
                .then_with(|| a.digest.cmp(&b.digest))
        });
        groups
    }
}

/// Owner of the result map for the duration of a run.
pub struct Aggregator;

impl Aggregator {
    /// Start the aggregator thread.
    ///
    /// The thread exits once every sender for `pairs` has been dropped and
    /// the channel is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn the thread.
    pub fn spawn(pairs: Receiver<DigestedRecord>) -> io::Result<AggregatorHandle> {
        let handle = thread::Builder::new()
            .name("dupfind-aggregator".to_string())
            .spawn(move || Self::collect(&pairs))?;
        Ok(AggregatorHandle { handle })
    }

    /// Drain `pairs` into a new map, blocking until the channel closes.
    #[must_use]
    pub fn collect(pairs: &Receiver<DigestedRecord>) -> ResultMap {
        let mut map = ResultMap::new();
        for record in pairs {
            log::trace!(
                "Aggregating {} -> {}",
                record.record.path.display(),
                record.digest_hex()
            );
            map.insert(record);
        }
        log::debug!(
            "Aggregator drained: {} records in {} buckets",
            map.record_count(),
            map.len()
        );
        map
    }
}

/// Handle to a running aggregator thread.
pub struct AggregatorHandle {
    handle: JoinHandle<ResultMap>,
}

impl AggregatorHandle {
    /// Wait for the aggregator to finish and take the completed map.
    ///
    /// Only returns once all senders are gone, so the caller must drop its
    /// own sender first.
    ///
    /// # Errors
    ///
    /// Returns an error if the aggregator thread panicked.
    pub fn join(self) -> io::Result<ResultMap> {
        self.handle
            .join()
            .map_err(|_| io::Error::other("aggregator thread panicked"))
    }
}
