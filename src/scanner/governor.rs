//! Bounded permit pool for I/O and spawn-causing work.
//!
//! # Overview
//!
//! The [`Governor`] is a counting semaphore. Every task that opens a file
//! handle or spawns further concurrent work holds a [`Permit`] while doing
//! so. Permits are returned when dropped, so early returns and `?` cannot
//! leak them.
//!
//! The token pool is a bounded `crossbeam-channel` pre-filled with one unit
//! per permit: acquiring receives a token, releasing sends it back.
//!
//! # Example
//!
//! ```
//! use dupfind::scanner::Governor;
//!
//! let governor = Governor::new(2);
//! {
//!     let _a = governor.acquire().unwrap();
//!     let _b = governor.acquire().unwrap();
//!     assert!(governor.try_acquire().is_none());
//! }
//! assert_eq!(governor.active(), 0);
//! assert_eq!(governor.peak(), 2);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

/// How often a blocked `acquire` re-checks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Default permit count: twice the number of logical CPUs.
#[must_use]
pub fn default_capacity() -> usize {
    num_cpus::get() * 2
}

/// Counting semaphore with usage instrumentation.
#[derive(Debug)]
pub struct Governor {
    release: Sender<()>,
    tokens: Receiver<()>,
    capacity: usize,
    active: AtomicUsize,
    peak: AtomicUsize,
    acquired: AtomicU64,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Governor {
    /// Create a governor with `capacity` permits (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (release, tokens) = bounded(capacity);
        for _ in 0..capacity {
            // Cannot fail: the channel holds exactly `capacity` units.
            let _ = release.try_send(());
        }
        Self {
            release,
            tokens,
            capacity,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            acquired: AtomicU64::new(0),
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag; once raised, `acquire` stops granting permits.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Block until a permit is available.
    ///
    /// Returns `None` if shutdown was requested before a permit could be
    /// granted; callers treat that as "do not start new work".
    pub fn acquire(&self) -> Option<Permit<'_>> {
        loop {
            if self.is_shutdown_requested() {
                return None;
            }
            match self.tokens.recv_timeout(SHUTDOWN_POLL) {
                Ok(()) => return Some(self.grant()),
                Err(RecvTimeoutError::Timeout) => continue,
                // We own a sender, so the pool cannot disconnect.
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Take a permit only if one is free right now.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        if self.is_shutdown_requested() {
            return None;
        }
        self.tokens.try_recv().ok().map(|()| self.grant())
    }

    fn grant(&self) -> Permit<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.acquired.fetch_add(1, Ordering::Relaxed);
        Permit { governor: self }
    }

    /// Total number of permits.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently held.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of permits ever held at once.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Total permits granted so far.
    #[must_use]
    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }
}

/// A held permit. Dropping it returns the token to the pool.
#[derive(Debug)]
#[must_use = "the permit is released as soon as it is dropped"]
pub struct Permit<'a> {
    governor: &'a Governor,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.governor.active.fetch_sub(1, Ordering::SeqCst);
        // Never blocks: at most `capacity` tokens are ever outstanding.
        let _ = self.governor.release.try_send(());
    }
}
