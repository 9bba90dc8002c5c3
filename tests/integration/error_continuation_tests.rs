use dupfind::duplicates::{DuplicateFinder, FinderConfig, FinderError, Strategy};
use dupfind::progress::ProgressCallback;
use dupfind::scanner::{DigestedRecord, FileRecord, ScanError, WalkerConfig};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tempfile::tempdir;

const STRATEGIES: [Strategy; 2] = [Strategy::Pipeline, Strategy::FanOut];

fn finder(strategy: Strategy) -> DuplicateFinder {
    DuplicateFinder::new(
        FinderConfig::default()
            .with_strategy(strategy)
            .with_concurrency(2)
            .with_walker_config(WalkerConfig::default().with_min_size(1)),
    )
}

#[test]
fn test_missing_root_is_an_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");

    for strategy in STRATEGIES {
        let err = finder(strategy).find_duplicates(&missing).unwrap_err();
        assert!(matches!(err, FinderError::PathNotFound(ref p) if p == &missing));
    }
}

#[test]
fn test_file_root_is_an_error() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("plain.txt");
    fs::write(&file, b"content").unwrap();

    for strategy in STRATEGIES {
        let err = finder(strategy).find_duplicates(&file).unwrap_err();
        assert!(matches!(err, FinderError::NotADirectory(_)));
    }
}

#[test]
fn test_interrupted_run_produces_no_result() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), b"same").unwrap();
    fs::write(dir.path().join("b"), b"same").unwrap();

    for strategy in STRATEGIES {
        let flag = Arc::new(AtomicBool::new(true));
        let finder = DuplicateFinder::new(
            FinderConfig::default()
                .with_strategy(strategy)
                .with_shutdown_flag(flag),
        );
        assert!(matches!(
            finder.find_duplicates(dir.path()),
            Err(FinderError::Interrupted)
        ));
    }
}

/// Raises the shutdown flag once `after` files have been found.
struct TripAfter {
    flag: Arc<AtomicBool>,
    after: usize,
    found: AtomicUsize,
    hashed: AtomicUsize,
}

impl ProgressCallback for TripAfter {
    fn on_scan_start(&self, _root: &Path) {}

    fn on_file_found(&self, _record: &FileRecord) {
        if self.found.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
            self.flag.store(true, Ordering::SeqCst);
        }
    }

    fn on_file_hashed(&self, _record: &DigestedRecord) {
        self.hashed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_scan_end(&self) {}
}

#[test]
fn test_shutdown_during_scan_interrupts_run() {
    let dir = tempdir().unwrap();
    for d in 0..8 {
        let sub = dir.path().join(format!("dir{d}"));
        fs::create_dir(&sub).unwrap();
        for f in 0..5 {
            fs::write(sub.join(format!("f{f}")), vec![b'x'; 64 * 1024]).unwrap();
        }
    }
    let total = 40;

    for strategy in STRATEGIES {
        let flag = Arc::new(AtomicBool::new(false));
        let trip = Arc::new(TripAfter {
            flag: flag.clone(),
            after: 3,
            found: AtomicUsize::new(0),
            hashed: AtomicUsize::new(0),
        });
        let finder = DuplicateFinder::new(
            FinderConfig::default()
                .with_strategy(strategy)
                .with_concurrency(2)
                .with_walker_config(WalkerConfig::default().with_min_size(1))
                .with_shutdown_flag(flag.clone())
                .with_progress_callback(trip.clone()),
        );

        let (tx, rx) = mpsc::channel();
        let root = dir.path().to_path_buf();
        let worker = std::thread::spawn(move || {
            let _ = tx.send(finder.find_duplicates(&root));
        });
        let result = rx
            .recv_timeout(Duration::from_secs(30))
            .unwrap_or_else(|_| panic!("{strategy} run did not stop after shutdown"));
        worker.join().unwrap();

        assert!(matches!(result, Err(FinderError::Interrupted)), "{strategy}");
        assert!(flag.load(Ordering::SeqCst));
        assert!(trip.found.load(Ordering::SeqCst) >= 3);
        assert!(trip.hashed.load(Ordering::SeqCst) < total, "{strategy}");
    }
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn set_mode(path: &std::path::Path, mode: u32) {
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_unreadable_subdirectory_is_skipped() {
        let dir = tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("hidden"), b"dup").unwrap();
        fs::write(dir.path().join("a"), b"dup").unwrap();
        fs::write(dir.path().join("b"), b"dup").unwrap();
        set_mode(&locked, 0o000);

        // Privileged users can read anyway; nothing to observe then.
        if fs::read_dir(&locked).is_ok() {
            set_mode(&locked, 0o755);
            return;
        }

        for strategy in STRATEGIES {
            let (map, summary) = finder(strategy).find_duplicates(dir.path()).unwrap();
            let groups = map.duplicate_groups();
            assert_eq!(groups.len(), 1, "{strategy}");
            assert_eq!(groups[0].len(), 2);
            assert!(summary.walk_errors >= 1);
        }

        set_mode(&locked, 0o755);
    }

    #[test]
    fn test_unreadable_file_is_counted_not_fatal() {
        let dir = tempdir().unwrap();
        let secret = dir.path().join("secret");
        fs::write(&secret, b"dup").unwrap();
        fs::write(dir.path().join("a"), b"dup").unwrap();
        fs::write(dir.path().join("b"), b"dup").unwrap();
        set_mode(&secret, 0o000);

        if fs::File::open(&secret).is_ok() {
            set_mode(&secret, 0o644);
            return;
        }

        for strategy in STRATEGIES {
            let (map, summary) = finder(strategy).find_duplicates(dir.path()).unwrap();
            assert_eq!(map.duplicate_groups()[0].len(), 2, "{strategy}");
            assert_eq!(summary.hash_failures, 1);
            assert_eq!(summary.files_found, 3);
            assert_eq!(summary.files_hashed, 2);
        }

        set_mode(&secret, 0o644);
    }

    #[test]
    fn test_unreadable_root_is_fatal() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a"), b"x").unwrap();
        set_mode(&root, 0o000);

        if fs::read_dir(&root).is_ok() {
            set_mode(&root, 0o755);
            return;
        }

        for strategy in STRATEGIES {
            let err = finder(strategy).find_duplicates(&root).unwrap_err();
            assert!(
                matches!(err, FinderError::Traversal(ScanError::RootUnreadable { .. })),
                "{strategy}: {err:?}"
            );
        }

        set_mode(&root, 0o755);
    }
}
