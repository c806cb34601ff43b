//! Test utilities for perfcheck
//!
//! Environment variables are process-global, so every test that touches
//! `PERFCHECK_*` variables takes the global lock and restores the original
//! values afterwards.

use std::collections::HashMap;
use std::env;
use std::sync::Mutex;

/// Global mutex to ensure all config-related tests run serially
pub static GLOBAL_CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

/// Remove all PERFCHECK_ environment variables and return their values
pub fn clean_perfcheck_env() -> HashMap<String, String> {
    let original_values: HashMap<String, String> = env::vars()
        .filter(|(key, _)| key.starts_with("PERFCHECK_"))
        .collect();

    for key in original_values.keys() {
        env::remove_var(key);
    }

    original_values
}

/// Restore environment variables saved by [`clean_perfcheck_env`]
pub fn restore_env(original_values: HashMap<String, String>) {
    for (key, _) in env::vars() {
        if key.starts_with("PERFCHECK_") {
            env::remove_var(&key);
        }
    }

    for (key, value) in original_values {
        env::set_var(key, value);
    }
}
