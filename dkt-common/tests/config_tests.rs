//! Unit tests for configuration loading and root folder resolution
//!
//! Tests that manipulate DKT_ROOT_FOLDER are marked #[serial] so they run
//! sequentially, not in parallel.

use dkt_common::config::{
    database_path, load_config, load_toml_config, resolve_root_folder, write_toml_config,
    AnalysisConfig, TomlConfig,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
#[serial]
fn test_cli_argument_has_highest_priority() {
    env::set_var("DKT_ROOT_FOLDER", "/from/env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(Some(Path::new("/from/cli")), "DKT_ROOT_FOLDER", Some(&toml));

    assert_eq!(resolved, PathBuf::from("/from/cli"));
    env::remove_var("DKT_ROOT_FOLDER");
}

#[test]
#[serial]
fn test_env_var_beats_toml() {
    env::set_var("DKT_ROOT_FOLDER", "/from/env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(None, "DKT_ROOT_FOLDER", Some(&toml));

    assert_eq!(resolved, PathBuf::from("/from/env"));
    env::remove_var("DKT_ROOT_FOLDER");
}

#[test]
#[serial]
fn test_toml_used_when_no_cli_or_env() {
    env::remove_var("DKT_ROOT_FOLDER");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(None, "DKT_ROOT_FOLDER", Some(&toml));

    assert_eq!(resolved, PathBuf::from("/from/toml"));
}

#[test]
#[serial]
fn test_default_root_folder_is_non_empty() {
    env::remove_var("DKT_ROOT_FOLDER");

    let resolved = resolve_root_folder(None, "DKT_ROOT_FOLDER", None);

    assert!(!resolved.as_os_str().is_empty());
    assert!(resolved.to_string_lossy().contains("dkt"));
}

#[test]
fn test_missing_sections_fall_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[analysis]\nmodel = \"custom-model\"\n").unwrap();

    let config = load_toml_config(&path).unwrap();

    assert_eq!(config.analysis.model, "custom-model");
    assert_eq!(config.analysis.daily_quota, AnalysisConfig::default().daily_quota);
    assert_eq!(config.analysis.request_timeout_secs, 120);
    assert_eq!(config.cache.default_ttl_hours, 72);
    assert_eq!(config.logging.level, "info");
    assert!(config.root_folder.is_none());
}

#[test]
fn test_malformed_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "analysis = [not toml").unwrap();

    let err = load_toml_config(&path).unwrap_err();

    assert!(matches!(err, dkt_common::Error::Config(_)));
}

#[test]
fn test_explicit_missing_config_file_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.toml");

    assert!(load_config(Some(&path)).is_err());
}

#[test]
fn test_write_then_load_preserves_api_key() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("nested").join("config.toml");

    let mut config = TomlConfig::default();
    config.analysis.api_key = Some("sk-test".to_string());
    config.analysis.daily_quota = 10;

    write_toml_config(&config, &target).unwrap();

    assert!(target.exists());
    assert!(!temp_dir.path().join("nested").join("config.toml.tmp").exists());
    assert_eq!(load_toml_config(&target).unwrap(), config);
}

#[cfg(unix)]
#[test]
fn test_written_config_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");

    write_toml_config(&TomlConfig::default(), &target).unwrap();

    let mode = std::fs::metadata(&target).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_database_path_is_inside_root() {
    let path = database_path(Path::new("/srv/dkt"));
    assert_eq!(path, PathBuf::from("/srv/dkt/dkt.db"));
}
