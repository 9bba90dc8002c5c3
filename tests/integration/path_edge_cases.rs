use dupfind::duplicates::{DuplicateFinder, FinderConfig, Strategy};
use dupfind::scanner::WalkerConfig;
use std::fs;
use tempfile::tempdir;

fn finder(strategy: Strategy) -> DuplicateFinder {
    DuplicateFinder::new(
        FinderConfig::default()
            .with_strategy(strategy)
            .with_walker_config(WalkerConfig::default().with_min_size(1)),
    )
}

#[test]
fn test_unicode_and_spaces_in_names() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("ordner mit leerzeichen")).unwrap();
    fs::write(dir.path().join("ordner mit leerzeichen/café.txt"), b"same bytes").unwrap();
    fs::write(dir.path().join("日本語.txt"), b"same bytes").unwrap();

    for strategy in [Strategy::Pipeline, Strategy::FanOut] {
        let (map, _) = finder(strategy).find_duplicates(dir.path()).unwrap();
        let groups = map.duplicate_groups();
        assert_eq!(groups.len(), 1);

        let mut names: Vec<_> = groups[0].files.iter().map(|f| f.name.clone()).collect();
        names.sort();
        assert_eq!(names, ["café.txt", "日本語.txt"]);
    }
}

#[test]
fn test_paths_stay_under_root() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("a/b")).unwrap();
    fs::write(dir.path().join("a/b/one"), b"xyz").unwrap();
    fs::write(dir.path().join("two"), b"xyz").unwrap();

    for strategy in [Strategy::Pipeline, Strategy::FanOut] {
        let (map, _) = finder(strategy).find_duplicates(dir.path()).unwrap();
        for group in map.duplicate_groups() {
            for file in &group.files {
                assert!(file.path.starts_with(dir.path()), "{}", file.path.display());
            }
        }
    }
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_not_followed() {
    use std::os::unix::fs::symlink;

    let dir = tempdir().unwrap();
    let target = dir.path().join("real");
    fs::write(&target, b"linked content").unwrap();
    symlink(&target, dir.path().join("file_link")).unwrap();

    let outside = tempdir().unwrap();
    fs::write(outside.path().join("x"), b"linked content").unwrap();
    symlink(outside.path(), dir.path().join("dir_link")).unwrap();

    for strategy in [Strategy::Pipeline, Strategy::FanOut] {
        let (map, summary) = finder(strategy).find_duplicates(dir.path()).unwrap();
        assert!(map.duplicate_groups().is_empty(), "{strategy}");
        assert_eq!(summary.files_found, 1);
    }
}

#[test]
fn test_each_file_appears_once() {
    let dir = tempdir().unwrap();
    for d in 0..4 {
        let sub = dir.path().join(format!("d{d}"));
        fs::create_dir(&sub).unwrap();
        for f in 0..5 {
            fs::write(sub.join(format!("f{f}")), b"identical").unwrap();
        }
    }

    for strategy in [Strategy::Pipeline, Strategy::FanOut] {
        let (map, _) = finder(strategy).find_duplicates(dir.path()).unwrap();
        let groups = map.duplicate_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 20);

        let mut paths: Vec<_> = groups[0].files.iter().map(|f| f.path.clone()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 20);
    }
}
