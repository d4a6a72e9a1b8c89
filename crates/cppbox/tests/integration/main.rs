//! Integration tests for cppbox
//!
//! These tests require a working g++ on the host.
//! Run with: cargo test -p cppbox --features integration-tests

#![cfg(feature = "integration-tests")]

use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};

use cppbox::Config;

mod execution;
mod handler_flow;
mod resource_limits;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

static NEXT_ROOT: AtomicU64 = AtomicU64::new(0);

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> Vec<u8> {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Create a test config with a workspace root unique to the calling test,
/// so leak assertions don't observe other tests' workspaces.
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    let id = NEXT_ROOT.fetch_add(1, Ordering::SeqCst);
    config.workspace_root = std::env::temp_dir().join(format!(
        "cppbox-it-{}-{id}",
        std::process::id()
    ));
    config
}

/// Assert that no workspace directories were leaked under the config's root
pub(crate) fn assert_no_leaked_workspaces(config: &Config) {
    if !config.workspace_root.exists() {
        return;
    }
    let leaked: Vec<_> = fs::read_dir(&config.workspace_root)
        .expect("workspace root should be readable")
        .collect();
    assert!(leaked.is_empty(), "leaked workspaces: {leaked:?}");
}
