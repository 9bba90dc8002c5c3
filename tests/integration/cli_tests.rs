use clap::Parser;
use dupfind::cli::Cli;
use dupfind::error::ExitCode;
use dupfind::run_with_writer;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const MIB: usize = 1024 * 1024;

fn run(args: &[&str]) -> (anyhow::Result<ExitCode>, String) {
    let _guard = crate::env_lock();
    let mut argv = vec!["dupfind", "--no-progress", "-q"];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).unwrap();

    let mut out = Vec::new();
    let result = run_with_writer(cli, &mut out, false);
    (result, String::from_utf8(out).unwrap())
}

fn scenario_a(root: &Path) {
    fs::write(root.join("zeros_1.bin"), vec![0u8; MIB]).unwrap();
    fs::write(root.join("zeros_2.bin"), vec![0u8; MIB]).unwrap();
    fs::write(root.join("ones.bin"), vec![1u8; MIB]).unwrap();
}

#[test]
fn test_text_report_lists_duplicate_group() {
    let dir = tempdir().unwrap();
    scenario_a(dir.path());
    let root = dir.path().to_str().unwrap();

    for strategy in ["pipeline", "fan-out"] {
        let (result, text) = run(&[root, "--strategy", strategy, "--output", "text"]);
        assert_eq!(result.unwrap(), ExitCode::Success);

        assert_eq!(text.matches("Found 2 files with the same hash").count(), 1);
        assert!(text.contains("zeros_1.bin"));
        assert!(text.contains("zeros_2.bin"));
        assert!(!text.contains("ones.bin"));
        assert!(text.contains(" - Size:        1048576 bytes"));
    }
}

#[test]
fn test_json_report() {
    let dir = tempdir().unwrap();
    scenario_a(dir.path());
    let root = dir.path().to_str().unwrap();

    let (result, text) = run(&[root, "-o", "json", "-j", "2"]);
    assert_eq!(result.unwrap(), ExitCode::Success);

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let groups = value["duplicates"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["count"], 2);
    assert_eq!(groups[0]["size"], MIB as u64);
    assert_eq!(value["summary"]["files_hashed"], 3);
    assert_eq!(value["summary"]["concurrency"], 2);
    assert_eq!(value["summary"]["exit_code"], 0);
}

#[test]
fn test_single_file_empty_report() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("solo.bin"), vec![4u8; MIB]).unwrap();
    let root = dir.path().to_str().unwrap();

    let (result, text) = run(&[root, "--output", "text"]);
    assert_eq!(result.unwrap(), ExitCode::Success);
    assert_eq!(text, "No duplicate files found (1 files hashed).\n");
}

#[test]
fn test_missing_root_exits_with_general_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("gone");

    for strategy in ["pipeline", "fan-out"] {
        let (result, text) = run(&[missing.to_str().unwrap(), "--strategy", strategy]);
        let err = result.unwrap_err();
        assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
        assert_eq!(ExitCode::for_error(&err).as_i32(), 1);
        assert!(text.is_empty());
    }
}

#[test]
fn test_missing_config_file_is_an_error() {
    let dir = tempdir().unwrap();
    let root = dir.path().to_str().unwrap();
    let config = dir.path().join("missing.toml");

    let (result, _) = run(&[root, "--config", config.to_str().unwrap()]);
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("missing.toml"));
}

#[test]
fn test_missing_path_argument() {
    let err = Cli::try_parse_from(["dupfind"]).unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
}

#[test]
fn test_json_errors_follow_configured_output() {
    let _guard = crate::env_lock();
    std::env::remove_var("DUPFIND_OUTPUT");
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "output = \"json\"\n").unwrap();
    let config = config.to_str().unwrap();

    let cli = Cli::try_parse_from(["dupfind", "/missing", "--config", config]).unwrap();
    assert!(dupfind::wants_json_errors(&cli));

    let cli = Cli::try_parse_from(["dupfind", "/missing", "--config", config, "--output", "text"])
        .unwrap();
    assert!(!dupfind::wants_json_errors(&cli));

    std::env::set_var("DUPFIND_OUTPUT", "json");
    let from_env = dupfind::wants_json_errors(&Cli::try_parse_from(["dupfind", "/missing"]).unwrap());
    std::env::remove_var("DUPFIND_OUTPUT");
    assert!(from_env);
}
