//! Integration tests for configuration management
//!
//! These tests verify that configuration files and environment overrides
//! reach the components built from them.

use perfcheck::cli::App;
use perfcheck::config::LogFormat;
use perfcheck::{Config, JudgePolicy, Runner};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

// All config tests touch process-wide environment variables
static GLOBAL_CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

/// Remove every PERFCHECK_ variable, returning the originals
fn clean_perfcheck_env() -> HashMap<String, String> {
    let original: HashMap<String, String> = env::vars()
        .filter(|(key, _)| key.starts_with("PERFCHECK_"))
        .collect();
    for key in original.keys() {
        env::remove_var(key);
    }
    original
}

fn restore_env(original: HashMap<String, String>) {
    for (key, _) in env::vars() {
        if key.starts_with("PERFCHECK_") {
            env::remove_var(&key);
        }
    }
    for (key, value) in original {
        env::set_var(key, value);
    }
}

fn site_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/cyclone.toml")
}

#[test]
fn test_load_from_config_path_variable() {
    let _guard = GLOBAL_CONFIG_TEST_LOCK.lock().unwrap();
    let original_env = clean_perfcheck_env();

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("perfcheck.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[site]
path = "{}"

[judge]
strict = false
concurrency = 3

[logging]
format = "json"
"#,
            site_path().display()
        ),
    )
    .unwrap();
    env::set_var("PERFCHECK_CONFIG_PATH", &config_path);

    let config = Config::load().unwrap();
    assert_eq!(config.site.path, site_path());
    assert_eq!(config.judge.strict, Some(false));
    assert_eq!(config.judge.concurrency, 3);
    assert_eq!(config.logging.format, LogFormat::Json);
    // Untouched sections keep their defaults
    assert!(config.perflog.enabled);

    restore_env(original_env);
}

#[test]
fn test_environment_overrides_file() {
    let _guard = GLOBAL_CONFIG_TEST_LOCK.lock().unwrap();
    let original_env = clean_perfcheck_env();

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("perfcheck.toml");
    std::fs::write(&config_path, "[judge]\nconcurrency = 3\n").unwrap();

    env::set_var("PERFCHECK_JUDGE_CONCURRENCY", "12");
    env::set_var("PERFCHECK_PERFLOG_ENABLED", "off");
    env::set_var("PERFCHECK_LOGGING_LEVEL", "debug");

    let config = Config::load_from_file(Some(config_path.as_path())).unwrap();
    assert_eq!(config.judge.concurrency, 12);
    assert!(!config.perflog.enabled);
    assert_eq!(config.logging.level, "debug");

    // `from_file` ignores the environment
    let file_only = Config::from_file(&config_path).unwrap();
    assert_eq!(file_only.judge.concurrency, 3);
    assert!(file_only.perflog.enabled);

    restore_env(original_env);
}

#[test]
fn test_invalid_override_is_rejected() {
    let _guard = GLOBAL_CONFIG_TEST_LOCK.lock().unwrap();
    let original_env = clean_perfcheck_env();

    env::set_var("PERFCHECK_JUDGE_CONCURRENCY", "0");
    assert!(Config::load_from_file(None).is_err());

    env::set_var("PERFCHECK_JUDGE_CONCURRENCY", "many");
    assert!(Config::load_from_file(None).is_err());

    restore_env(original_env);
}

#[test]
fn test_judge_policy_from_config() {
    let mut config = Config::default();
    assert_eq!(JudgePolicy::from(&config.judge), JudgePolicy::default());

    config.judge.strict = Some(true);
    config.perflog.enabled = false;
    let runner = Runner::from_config(&config);
    assert_eq!(runner.policy().strict, Some(true));
}

#[test]
fn test_sample_config_loads() {
    let _guard = GLOBAL_CONFIG_TEST_LOCK.lock().unwrap();
    let original_env = clean_perfcheck_env();

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sample.toml");
    Config::create_sample_config(&path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("# perfcheck configuration"));
    assert_eq!(Config::from_file(&path).unwrap(), Config::default());

    restore_env(original_env);
}

#[test]
fn test_app_builds_from_config() {
    let mut config = Config::default();
    config.site.path = site_path();
    config.perflog.enabled = false;

    let app = App::new(config, false).unwrap();
    assert_eq!(app.registry().len(), 17);
}
