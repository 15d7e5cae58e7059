// Integration tests for configuration file discovery against a real directory tree.

use apiclient_config::{ConfigError, ConfigLocator, CONFIG_FILE_NAME, CONFIG_PATH_ENV};
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// Creates `<root>/apiclient.config` and returns the root.
fn solution_root(temp_dir: &TempDir) -> PathBuf {
    let root = temp_dir.path().join("solution");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join(CONFIG_FILE_NAME), "<configuration />").unwrap();
    root
}

fn mkdirs(path: &Path) -> PathBuf {
    fs::create_dir_all(path).unwrap();
    path.to_path_buf()
}

// ── Directory search ──────────────────────────────────────────────────────────

#[test]
fn test_build_output_layout_finds_solution_file() {
    let temp_dir = TempDir::new().unwrap();
    let root = solution_root(&temp_dir);
    let base_dir = mkdirs(&root.join("Console").join("bin").join("Debug"));

    let path = ConfigLocator::Search { base_dir }.locate().unwrap();
    assert_eq!(path, root.join(CONFIG_FILE_NAME));
}

#[test]
fn test_hosted_layout_finds_parent_file() {
    let temp_dir = TempDir::new().unwrap();
    let root = solution_root(&temp_dir);
    let base_dir = mkdirs(&root.join("WebApp"));

    let path = ConfigLocator::Search { base_dir }.locate().unwrap();
    assert_eq!(path, root.join(CONFIG_FILE_NAME));
}

#[test]
fn test_wrong_depth_reports_searched_path() {
    let temp_dir = TempDir::new().unwrap();
    let root = solution_root(&temp_dir);
    // Config sits two levels above a hosted base directory: one level is searched.
    let base_dir = mkdirs(&root.join("apps").join("WebApp"));

    match (ConfigLocator::Search { base_dir }).locate() {
        Err(ConfigError::ConfigurationNotFound { path }) => {
            assert_eq!(path, root.join("apps").join(CONFIG_FILE_NAME));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_directory_named_like_config_is_not_a_file() {
    let temp_dir = TempDir::new().unwrap();
    let root = mkdirs(&temp_dir.path().join("solution"));
    mkdirs(&root.join(CONFIG_FILE_NAME));
    let base_dir = mkdirs(&root.join("WebApp"));

    assert!(matches!(
        ConfigLocator::Search { base_dir }.locate(),
        Err(ConfigError::ConfigurationNotFound { .. })
    ));
}

// ── Environment override ──────────────────────────────────────────────────────

#[test]
#[serial]
fn test_env_override_wins() {
    let temp_dir = TempDir::new().unwrap();
    let custom = temp_dir.path().join("custom.config");
    fs::write(&custom, "<configuration />").unwrap();

    std::env::set_var(CONFIG_PATH_ENV, &custom);
    let locator = ConfigLocator::from_env().unwrap();
    std::env::remove_var(CONFIG_PATH_ENV);

    assert_eq!(locator, ConfigLocator::Override(custom.clone()));
    assert_eq!(locator.locate().unwrap(), custom);
}

#[test]
#[serial]
fn test_empty_env_override_is_ignored() {
    std::env::set_var(CONFIG_PATH_ENV, "");
    let locator = ConfigLocator::from_env().unwrap();
    std::env::remove_var(CONFIG_PATH_ENV);

    assert!(matches!(locator, ConfigLocator::Search { .. }));
}

#[test]
#[serial]
fn test_env_override_to_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing.config");

    std::env::set_var(CONFIG_PATH_ENV, &missing);
    let result = ConfigLocator::from_env().unwrap().locate();
    std::env::remove_var(CONFIG_PATH_ENV);

    match result {
        Err(err @ ConfigError::ConfigurationNotFound { .. }) => {
            assert_eq!(err.path(), Some(missing.as_path()));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
