//! Fuzz target for config.toml parsing and validation.
//!
//! Tests that loading a malformed config file returns an error instead of
//! panicking, and that any config which loads also survives a save/load
//! cycle unchanged.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::fs;
use tempfile::TempDir;

use node_metrics::config::MetricsConfig;

fuzz_target!(|content: String| {
    let temp_dir = match TempDir::new() {
        Ok(dir) => dir,
        Err(_) => return,
    };

    let config_path = temp_dir.path().join("config.toml");
    if fs::write(&config_path, &content).is_err() {
        return;
    }

    let Ok(config) = MetricsConfig::load_from(&config_path) else {
        return;
    };

    let saved_path = temp_dir.path().join("saved.toml");
    config.save_to(&saved_path).expect("valid config serializes");
    let reloaded = MetricsConfig::load_from(&saved_path).expect("saved config loads");
    assert_eq!(config, reloaded);
});
