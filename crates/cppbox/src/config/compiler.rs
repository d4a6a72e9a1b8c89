use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::ResourceLimits;

/// Default PATH for sandboxed children
pub const DEFAULT_SANDBOX_PATH: &str = "/usr/bin:/bin";

/// Configuration for the C++ toolchain invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {output}
    pub command: Vec<String>,

    /// Source file name in the workspace (e.g., "main.cpp")
    #[serde(default = "default_source_name")]
    pub source_name: String,

    /// Output binary name (e.g., "program")
    #[serde(default = "default_output_name")]
    pub output_name: String,

    /// Environment variables to set during compilation
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Compiler flags submissions may request, matched exactly.
    /// Anything not on this list is rejected before a process spawns.
    #[serde(default)]
    pub allowed_flags: Vec<String>,

    /// Resource limits for compilation (overrides the compile-phase defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

impl CompilerConfig {
    /// Expand placeholders in the configured command and append the
    /// already-validated submission flags.
    pub fn build_command(&self, extra_flags: &[String]) -> Vec<String> {
        let mut cmd = expand_command(&self.command, &self.source_name, &self.output_name);
        cmd.extend(extra_flags.iter().cloned());
        cmd
    }

    /// Validate submission flags against the allow-list.
    ///
    /// Exact string match only. Prefix or pattern matching would reopen the
    /// argument-injection hole the allow-list exists to close.
    pub fn validate_flags<'a>(&self, flags: &'a [String]) -> Result<(), &'a str> {
        for flag in flags {
            if !self.allowed_flags.iter().any(|allowed| allowed == flag) {
                return Err(flag);
            }
        }
        Ok(())
    }

    /// Resolve the compiler program to an absolute path using the sandbox PATH.
    ///
    /// Programs that already contain a `/` are checked as-is. Used by the
    /// preflight probe; the spawn itself resolves through the child's PATH.
    pub fn resolve(&self, search_path: &str) -> Option<PathBuf> {
        let program = self.command.first()?;

        if program.contains('/') {
            let path = PathBuf::from(program);
            return path.exists().then_some(path);
        }

        for dir in search_path.split(':') {
            let candidate = Path::new(dir).join(program);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "g++".to_owned(),
                "{source}".to_owned(),
                "-o".to_owned(),
                "{output}".to_owned(),
            ],
            source_name: default_source_name(),
            output_name: default_output_name(),
            env: HashMap::new(),
            allowed_flags: Vec::new(),
            limits: None,
        }
    }
}

fn default_source_name() -> String {
    "main.cpp".to_owned()
}

fn default_output_name() -> String {
    "program".to_owned()
}

/// Expand {source} and {output} placeholders in the given command
pub fn expand_command(command: &[String], source: &str, output: &str) -> Vec<String> {
    command
        .iter()
        .map(|arg| arg.replace("{source}", source).replace("{output}", output))
        .collect()
}
