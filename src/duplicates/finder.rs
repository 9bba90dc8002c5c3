//! Scan orchestration.
//!
//! # Overview
//!
//! The [`DuplicateFinder`] wires the walker, governor, hasher and
//! aggregator together for one of two scheduling strategies:
//!
//! - [`Strategy::Pipeline`]: the calling thread walks the tree and feeds a
//!   bounded queue of file records; a fixed pool of worker threads hashes
//!   them; one aggregator thread owns the result map.
//! - [`Strategy::FanOut`]: every directory becomes a task on a dedicated
//!   rayon pool and spawns one task per subdirectory and per file. The
//!   governor bounds how many of those tasks do I/O at once.
//!
//! Whatever happens, every channel is closed and every thread joined
//! before `find_duplicates` returns.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use super::aggregator::{Aggregator, ResultMap};
use crate::progress::ProgressCallback;
use crate::scanner::{
    governor, DigestedRecord, DirListing, FileRecord, Governor, HashAlgorithm, HashError, Hasher,
    ScanError, WalkStats, Walker, WalkerConfig, DEFAULT_CHUNK_SIZE,
};

/// Default capacity of the bounded metadata and pair queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// How hashing work is scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// One walker feeding a fixed pool of hashing workers
    #[default]
    Pipeline,
    /// Recursive per-directory tasks bounded by the governor
    FanOut,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Pipeline => write!(f, "pipeline"),
            Strategy::FanOut => write!(f, "fan-out"),
        }
    }
}

/// Lifecycle of a single run.
///
/// `Hashing` overlaps the walk: it is entered as soon as hashing tasks
/// may run, not when the walk ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Nothing started yet
    Idle,
    /// Traversal in progress
    Walking,
    /// Traversal and hashing in progress
    Hashing,
    /// Traversal finished, in-flight hashes finishing
    Draining,
    /// Every task done, result map published
    Aggregated,
    /// Report written
    Reported,
    /// Stopped by a fatal error or interruption
    Aborted,
}

impl RunState {
    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Reported | Self::Aborted)
    }

    /// Whether `next` is a legal successor of this state.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        use RunState::{Aborted, Aggregated, Draining, Hashing, Idle, Reported, Walking};

        match (self, next) {
            (Idle, Walking)
            | (Walking, Hashing | Draining)
            | (Hashing, Draining)
            | (Draining, Aggregated)
            | (Aggregated, Reported) => true,
            (from, Aborted) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Move to `next`. Illegal transitions are a logic error.
    pub fn advance(&mut self, next: Self) {
        debug_assert!(
            self.can_advance_to(next),
            "illegal run state transition {self:?} -> {next:?}"
        );
        log::debug!("Run state: {:?} -> {:?}", self, next);
        *self = next;
    }
}

/// Configuration for the duplicate finder.
#[derive(Clone)]
pub struct FinderConfig {
    /// Scheduling strategy.
    pub strategy: Strategy,
    /// Governor capacity; also the worker or pool thread count.
    pub concurrency: usize,
    /// Capacity of the bounded queues.
    pub queue_capacity: usize,
    /// Walker configuration for directory traversal.
    pub walker_config: WalkerConfig,
    /// Hash function.
    pub algorithm: HashAlgorithm,
    /// Read chunk size for hashing.
    pub chunk_size: usize,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback for reporting.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("strategy", &self.strategy)
            .field("concurrency", &self.concurrency)
            .field("queue_capacity", &self.queue_capacity)
            .field("walker_config", &self.walker_config)
            .field("algorithm", &self.algorithm)
            .field("chunk_size", &self.chunk_size)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            concurrency: governor::default_capacity(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            walker_config: WalkerConfig::default(),
            algorithm: HashAlgorithm::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl FinderConfig {
    /// Set the scheduling strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the concurrency bound (at least 1).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the queue capacity (at least 1).
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    /// Set the hash function.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the hashing chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Summary statistics from a duplicate scan.
#[derive(Debug, Clone)]
pub struct ScanSummary {
    /// Strategy the run used
    pub strategy: Strategy,
    /// Hash function the run used
    pub algorithm: HashAlgorithm,
    /// Governor capacity
    pub concurrency: usize,
    /// Qualifying files discovered
    pub files_found: usize,
    /// Total size of discovered files in bytes
    pub bytes_found: u64,
    /// Files hashed successfully
    pub files_hashed: usize,
    /// Bytes read while hashing
    pub bytes_hashed: u64,
    /// Files dropped because hashing failed
    pub hash_failures: usize,
    /// Entries skipped because the walker could not read them
    pub walk_errors: usize,
    /// Number of duplicate groups
    pub duplicate_groups: usize,
    /// Total number of duplicate files (excluding one copy per group)
    pub duplicate_files: usize,
    /// Total space that can be reclaimed by removing duplicates
    pub reclaimable_space: u64,
    /// Highest number of governor permits held at once
    pub peak_concurrency: usize,
    /// Duration of the entire scan
    pub scan_duration: Duration,
    /// Final run state
    pub state: RunState,
}

impl ScanSummary {
    /// Format reclaimable space as a human-readable string.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        ByteSize::b(self.reclaimable_space).to_string()
    }

    /// Format hashed bytes as a human-readable string.
    #[must_use]
    pub fn bytes_hashed_display(&self) -> String {
        ByteSize::b(self.bytes_hashed).to_string()
    }

    /// Record that the report has been written.
    pub fn mark_reported(&mut self) {
        self.state.advance(RunState::Reported);
    }
}

/// Errors that can occur during duplicate finding.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The scan was interrupted by user (Ctrl+C or shutdown signal).
    #[error("Scan interrupted by user")]
    Interrupted,

    /// The provided path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The provided path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The scan root could not be traversed.
    #[error(transparent)]
    Traversal(#[from] ScanError),

    /// The fan-out thread pool could not be created.
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A thread could not be spawned or joined.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared counters updated from every task.
#[derive(Debug, Default)]
struct ScanCounters {
    found: AtomicUsize,
    bytes_found: AtomicU64,
    hashed: AtomicUsize,
    bytes_hashed: AtomicU64,
    hash_failures: AtomicUsize,
    walk_errors: AtomicUsize,
}

impl ScanCounters {
    fn record_walk(&self, stats: WalkStats) {
        self.found.fetch_add(stats.files, Ordering::Relaxed);
        self.bytes_found.fetch_add(stats.bytes, Ordering::Relaxed);
        self.walk_errors.fetch_add(stats.errors, Ordering::Relaxed);
    }
}

/// Duplicate finder that runs one scan per call.
///
/// # Example
///
/// ```no_run
/// use dupfind::duplicates::{DuplicateFinder, FinderConfig, Strategy};
/// use std::path::Path;
///
/// let config = FinderConfig::default()
///     .with_strategy(Strategy::FanOut)
///     .with_concurrency(4);
/// let finder = DuplicateFinder::new(config);
///
/// let (map, summary) = finder.find_duplicates(Path::new("/some/path")).unwrap();
///
/// println!("Found {} duplicate groups", map.duplicate_groups().len());
/// println!("Reclaimable space: {}", summary.reclaimable_display());
/// ```
pub struct DuplicateFinder {
    config: FinderConfig,
    hasher: Hasher,
}

impl DuplicateFinder {
    /// Create a new duplicate finder with the given configuration.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        let mut hasher = Hasher::new()
            .with_algorithm(config.algorithm)
            .with_chunk_size(config.chunk_size);
        if let Some(ref flag) = config.shutdown_flag {
            hasher = hasher.with_shutdown_flag(flag.clone());
        }
        Self { config, hasher }
    }

    /// Create a new duplicate finder with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FinderConfig::default())
    }

    /// The configuration this finder runs with.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Scan `path` and return the digest map with run statistics.
    ///
    /// # Errors
    ///
    /// Returns `FinderError` if:
    /// - The path does not exist or is not a directory
    /// - The root directory cannot be read
    /// - The scan is interrupted by shutdown signal
    /// - A worker thread or the thread pool cannot be started
    pub fn find_duplicates(&self, path: &Path) -> Result<(ResultMap, ScanSummary), FinderError> {
        let start_time = Instant::now();

        if !path.exists() {
            return Err(FinderError::PathNotFound(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(FinderError::NotADirectory(path.to_path_buf()));
        }
        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        log::info!(
            "Starting duplicate scan of {} ({} strategy, {} jobs, {})",
            path.display(),
            self.config.strategy,
            self.config.concurrency,
            self.config.algorithm
        );

        let mut governor = Governor::new(self.config.concurrency);
        let mut walker = Walker::new(path, self.config.walker_config.clone());
        if let Some(ref flag) = self.config.shutdown_flag {
            governor = governor.with_shutdown_flag(flag.clone());
            walker = walker.with_shutdown_flag(flag.clone());
        }
        let counters = ScanCounters::default();
        let mut state = RunState::Idle;

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_scan_start(path);
        }
        state.advance(RunState::Walking);

        let result = match self.config.strategy {
            Strategy::Pipeline => self.run_pipeline(&walker, &governor, &counters, &mut state),
            Strategy::FanOut => self.run_fan_out(&walker, &governor, &counters, &mut state),
        };

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_scan_end();
        }

        let map = match result {
            Ok(map) => map,
            Err(e) => {
                state.advance(RunState::Aborted);
                return Err(e);
            }
        };
        if self.config.is_shutdown_requested() {
            state.advance(RunState::Aborted);
            log::info!("Scan interrupted by shutdown signal");
            return Err(FinderError::Interrupted);
        }
        state.advance(RunState::Aggregated);

        let (duplicate_groups, duplicate_files, reclaimable_space) = duplicate_totals(&map);
        let summary = ScanSummary {
            strategy: self.config.strategy,
            algorithm: self.config.algorithm,
            concurrency: governor.capacity(),
            files_found: counters.found.load(Ordering::Relaxed),
            bytes_found: counters.bytes_found.load(Ordering::Relaxed),
            files_hashed: counters.hashed.load(Ordering::Relaxed),
            bytes_hashed: counters.bytes_hashed.load(Ordering::Relaxed),
            hash_failures: counters.hash_failures.load(Ordering::Relaxed),
            walk_errors: counters.walk_errors.load(Ordering::Relaxed),
            duplicate_groups,
            duplicate_files,
            reclaimable_space,
            peak_concurrency: governor.peak(),
            scan_duration: start_time.elapsed(),
            state,
        };

        log::info!(
            "Scan complete: {} files hashed ({}), {} duplicate groups, {} reclaimable, peak concurrency {}/{}",
            summary.files_hashed,
            summary.bytes_hashed_display(),
            summary.duplicate_groups,
            summary.reclaimable_display(),
            summary.peak_concurrency,
            summary.concurrency
        );

        Ok((map, summary))
    }

    /// Single walker, fixed worker pool, one aggregator.
    fn run_pipeline(
        &self,
        walker: &Walker,
        governor: &Governor,
        counters: &ScanCounters,
        state: &mut RunState,
    ) -> Result<ResultMap, FinderError> {
        let (record_tx, record_rx) = bounded::<FileRecord>(self.config.queue_capacity);
        let (pair_tx, pair_rx) = bounded::<DigestedRecord>(self.config.queue_capacity);
        let aggregator = Aggregator::spawn(pair_rx)?;
        let progress = self.config.progress_callback.as_deref();

        let walked = thread::scope(|s| -> Result<WalkStats, FinderError> {
            let mut spawn_error = None;
            for id in 0..self.config.concurrency {
                let records = record_rx.clone();
                let pairs = pair_tx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("dupfind-hash-{id}"))
                    .spawn_scoped(s, move || {
                        self.hash_worker(&records, &pairs, governor, counters);
                    });
                if let Err(e) = spawned {
                    spawn_error = Some(e);
                    break;
                }
            }
            // Workers hold the only remaining clones from here on.
            drop(record_rx);
            drop(pair_tx);

            if let Some(e) = spawn_error {
                return Err(FinderError::Io(e));
            }

            state.advance(RunState::Hashing);
            let stats = walker.stream(&record_tx, governor, progress);
            drop(record_tx);
            state.advance(RunState::Draining);

            let stats = stats?;
            log::debug!(
                "Walk finished: {} files, {} errors",
                stats.files,
                stats.errors
            );
            Ok(stats)
        });

        // Every worker has been joined, so the last pair sender is gone.
        let map = aggregator.join()?;
        counters.record_walk(walked?);
        Ok(map)
    }

    /// Body of one pipeline worker: hash records until the queue closes.
    fn hash_worker(
        &self,
        records: &Receiver<FileRecord>,
        pairs: &Sender<DigestedRecord>,
        governor: &Governor,
        counters: &ScanCounters,
    ) {
        for record in records {
            let digested = {
                let Some(_permit) = governor.acquire() else {
                    log::debug!("Hash worker: shutdown requested, exiting");
                    break;
                };
                self.hash_one(record, counters)
            };
            if let Some(pair) = digested {
                if pairs.send(pair).is_err() {
                    break;
                }
            }
        }
    }

    /// Hash one record, logging and counting failures.
    fn hash_one(&self, record: FileRecord, counters: &ScanCounters) -> Option<DigestedRecord> {
        let size = record.size;
        match self.hasher.digest(record) {
            Ok(pair) => {
                log::trace!("Hashed {}", pair.record.path.display());
                counters.hashed.fetch_add(1, Ordering::Relaxed);
                counters.bytes_hashed.fetch_add(size, Ordering::Relaxed);
                if let Some(ref callback) = self.config.progress_callback {
                    callback.on_file_hashed(&pair);
                }
                Some(pair)
            }
            Err(HashError::Interrupted(path)) => {
                log::debug!("Hashing interrupted: {}", path.display());
                None
            }
            Err(e) => {
                log::warn!("Skipping file: {}", e);
                counters.hash_failures.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Recursive per-directory tasks on a dedicated rayon pool.
    fn run_fan_out(
        &self,
        walker: &Walker,
        governor: &Governor,
        counters: &ScanCounters,
        state: &mut RunState,
    ) -> Result<ResultMap, FinderError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.concurrency)
            .thread_name(|i| format!("dupfind-fanout-{i}"))
            .build()?;

        // The root listing runs before any task exists, so a fatal error
        // leaves nothing to clean up.
        let root_listing = {
            let Some(_permit) = governor.acquire() else {
                return Err(FinderError::Interrupted);
            };
            walker.read_directory(walker.root())?
        };

        let (pair_tx, pair_rx) = bounded::<DigestedRecord>(self.config.queue_capacity);
        let aggregator = Aggregator::spawn(pair_rx)?;

        state.advance(RunState::Hashing);
        let fan_out = FanOut {
            finder: self,
            walker,
            governor,
            counters,
            pairs: pair_tx,
        };
        pool.scope(|s| fan_out.dispatch(s, root_listing));
        state.advance(RunState::Draining);

        // Scope has returned: every descendant task is done.
        drop(fan_out);
        Ok(aggregator.join()?)
    }
}

/// Shared context for fan-out tasks.
struct FanOut<'a> {
    finder: &'a DuplicateFinder,
    walker: &'a Walker,
    governor: &'a Governor,
    counters: &'a ScanCounters,
    pairs: Sender<DigestedRecord>,
}

impl FanOut<'_> {
    /// Spawn one task per subdirectory and per file of a listing.
    fn dispatch<'s>(&'s self, scope: &rayon::Scope<'s>, listing: DirListing) {
        self.counters
            .walk_errors
            .fetch_add(listing.errors, Ordering::Relaxed);

        for dir in listing.subdirs {
            scope.spawn(move |s| self.visit_directory(s, &dir));
        }
        for record in listing.files {
            self.counters.found.fetch_add(1, Ordering::Relaxed);
            self.counters
                .bytes_found
                .fetch_add(record.size, Ordering::Relaxed);
            if let Some(ref callback) = self.finder.config.progress_callback {
                callback.on_file_found(&record);
            }
            scope.spawn(move |_| self.hash_file(record));
        }
    }

    /// List a directory while holding a permit, then fan out.
    fn visit_directory<'s>(&'s self, scope: &rayon::Scope<'s>, dir: &Path) {
        let Some(_permit) = self.governor.acquire() else {
            return;
        };
        match self.walker.read_directory(dir) {
            Ok(listing) => self.dispatch(scope, listing),
            // Already logged by the walker
            Err(_) => {
                self.counters.walk_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn hash_file(&self, record: FileRecord) {
        let digested = {
            let Some(_permit) = self.governor.acquire() else {
                return;
            };
            self.finder.hash_one(record, self.counters)
        };
        if let Some(pair) = digested {
            let _ = self.pairs.send(pair);
        }
    }
}

/// `(groups, redundant files, reclaimable bytes)` without cloning records.
fn duplicate_totals(map: &ResultMap) -> (usize, usize, u64) {
    map.buckets()
        .filter(|(_, members)| members.len() > 1)
        .fold((0, 0, 0), |(groups, files, bytes), (_, members)| {
            let extra = members.len() - 1;
            let size = members[0].record.size;
            (groups + 1, files + extra, bytes + size * extra as u64)
        })
}
