use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::compiler::{CompilerConfig, DEFAULT_SANDBOX_PATH, expand_command};
use crate::types::ResourceLimits;

pub mod compiler;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../cppbox.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for cppbox
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root directory under which per-invocation workspaces are created
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Sandbox policy applied to every spawned child
    #[serde(default)]
    pub sandbox: SandboxPolicy,

    /// C++ toolchain invocation
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// Default resource limits applied to program execution.
    /// Overridden per-request within the ceilings in [`RequestPolicy`].
    #[serde(default)]
    pub default_limits: ResourceLimits,

    /// Caps applied to incoming requests before anything runs
    #[serde(default)]
    pub request: RequestPolicy,
}

/// Policy applied to every sandboxed child process
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxPolicy {
    /// PATH environment variable inside the sandbox
    #[serde(default = "default_sandbox_path")]
    pub path: String,

    /// Detach children from the network namespace (`unshare(CLONE_NEWNET)`).
    ///
    /// Requires CAP_SYS_ADMIN, which serverless hosts typically withhold; the
    /// container's own network policy is the outer boundary. When enabled on
    /// a host that refuses it, spawning fails loudly rather than running the
    /// child with network access.
    #[serde(default)]
    pub deny_network: bool,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            path: default_sandbox_path(),
            deny_network: false,
        }
    }
}

/// Caps applied during request validation, before any process spawns
#[derive(Debug, Clone, Deserialize)]
pub struct RequestPolicy {
    /// Maximum accepted source size in bytes
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,

    /// Maximum accepted stdin payload in bytes
    #[serde(default = "default_max_stdin_bytes")]
    pub max_stdin_bytes: usize,

    /// Hard ceiling for the per-request time override in milliseconds
    #[serde(default = "default_max_time_ms")]
    pub max_time_ms: u64,

    /// Hard ceiling for the per-request memory override in megabytes
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,

    /// Optional substring reject-list screened against the source text.
    /// The sandbox is the security boundary; this is defense in depth,
    /// empty by default.
    #[serde(default)]
    pub reject_patterns: Vec<String>,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            max_source_bytes: default_max_source_bytes(),
            max_stdin_bytes: default_max_stdin_bytes(),
            max_time_ms: default_max_time_ms(),
            max_memory_mb: default_max_memory_mb(),
            reject_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Create a new config from the embedded example configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge resource limits with the configured execution defaults
    pub fn effective_limits(&self, overrides: Option<&ResourceLimits>) -> ResourceLimits {
        match overrides {
            Some(limits) => self.default_limits.with_overrides(limits),
            None => self.default_limits.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join("cppbox")
}

fn default_sandbox_path() -> String {
    DEFAULT_SANDBOX_PATH.to_owned()
}

fn default_max_source_bytes() -> usize {
    256 * 1024
}

fn default_max_stdin_bytes() -> usize {
    1024 * 1024
}

fn default_max_time_ms() -> u64 {
    20_000
}

fn default_max_memory_mb() -> u64 {
    1024
}
