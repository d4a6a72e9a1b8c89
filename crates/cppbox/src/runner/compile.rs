//! Compilation step for submitted source
//!
//! Writes the submission to a fixed filename inside the workspace and
//! invokes the configured toolchain as a sandboxed child under the
//! compile-phase limits.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::runner::CompileError;
use crate::sandbox::{self, SpawnSpec};
use crate::types::{ExecutionStatus, ResourceLimits};
use crate::workspace::Workspace;

/// Outcome of a compilation, always produced before execution is attempted
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    /// The toolchain produced an executable artifact
    Success {
        /// Host path to the compiled binary
        artifact: PathBuf,
        /// Compiler warnings, possibly empty
        warnings: String,
    },

    /// The toolchain rejected the source or did not finish
    Failure {
        /// Compiler diagnostics, or a synthesized message for timeouts
        diagnostics: String,
        /// Compiler exit code, when it exited on its own
        exit_code: Option<i32>,
    },
}

impl CompileOutcome {
    /// Check if compilation succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, CompileOutcome::Success { .. })
    }
}

/// Default compile-phase limits, shorter than no limit and more generous
/// than execution: toolchains fork helpers and allocate far more than the
/// programs they build.
fn default_compile_limits() -> ResourceLimits {
    ResourceLimits {
        time_limit: Some(10.0),
        wall_time_limit: Some(10.0),
        memory_limit: Some(524288), // 512 MB
        stack_limit: Some(65536),
        max_processes: Some(256),
        max_output: Some(256), // 256 KB of diagnostics
        max_open_files: Some(256),
    }
}

/// Compile submitted source inside the workspace
#[instrument(skip(workspace, config, source, cancel))]
pub async fn compile(
    workspace: &Workspace,
    config: &Config,
    source: &[u8],
    flags: &[String],
    limits: Option<&ResourceLimits>,
    cancel: &CancellationToken,
) -> Result<CompileOutcome, CompileError> {
    // Allow-list check guards the spawn even when the caller skipped
    // request validation
    if let Err(flag) = config.compiler.validate_flags(flags) {
        return Err(CompileError::DisallowedFlag(flag.to_owned()));
    }

    let source_name = &config.compiler.source_name;
    workspace.write_file(source_name, source).await?;

    debug!(source_name, "wrote source file");

    // Determine limits: phase defaults → config compiler limits → caller
    let base_limits = default_compile_limits();
    let effective_limits = match (config.compiler.limits.as_ref(), limits) {
        (Some(cfg), Some(user)) => base_limits.with_overrides(cfg).with_overrides(user),
        (Some(cfg), None) => base_limits.with_overrides(cfg),
        (None, Some(user)) => base_limits.with_overrides(user),
        (None, None) => base_limits,
    };

    let command = config.compiler.build_command(flags);
    let (program, args) = command.split_first().ok_or(CompileError::EmptyCommand)?;

    let mut env = vec![("PATH".to_owned(), config.sandbox.path.clone())];
    env.extend(
        config
            .compiler
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );

    let spec = SpawnSpec {
        program: PathBuf::from(program),
        args: args.to_vec(),
        working_dir: workspace.path(),
        stdin: b"",
        env,
        limits: &effective_limits,
        deny_network: config.sandbox.deny_network,
    };

    let result = sandbox::run(spec, cancel).await?;

    // Combined diagnostics: compilers interleave warnings and errors across
    // both streams
    let mut diagnostics = String::from_utf8_lossy(&result.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&result.stderr);
    if !diagnostics.is_empty() && !stderr.is_empty() {
        diagnostics.push('\n');
    }
    diagnostics.push_str(&stderr);

    debug!(
        status = ?result.status,
        exit_code = ?result.exit_code,
        "compilation complete"
    );

    match result.status {
        ExecutionStatus::Ok if result.exit_code == Some(0) => {
            let artifact = workspace.file_path(&config.compiler.output_name)?;
            if !is_executable_file(&artifact).await {
                return Err(CompileError::ArtifactMissing);
            }
            Ok(CompileOutcome::Success {
                artifact,
                warnings: diagnostics,
            })
        }
        ExecutionStatus::Ok => Ok(CompileOutcome::Failure {
            diagnostics,
            exit_code: result.exit_code,
        }),
        ExecutionStatus::TimeLimitExceeded => Ok(CompileOutcome::Failure {
            diagnostics: synthesize(
                &diagnostics,
                &format!(
                    "compilation timed out after {:.0} seconds",
                    effective_limits.wall_time_limit.unwrap_or(0.0)
                ),
            ),
            exit_code: None,
        }),
        ExecutionStatus::Cancelled => Ok(CompileOutcome::Failure {
            diagnostics: synthesize(&diagnostics, "compilation cancelled"),
            exit_code: None,
        }),
        ExecutionStatus::MemoryLimitExceeded => Ok(CompileOutcome::Failure {
            diagnostics: synthesize(&diagnostics, "compiler exceeded its memory limit"),
            exit_code: None,
        }),
        ExecutionStatus::Signaled => Ok(CompileOutcome::Failure {
            diagnostics: synthesize(
                &diagnostics,
                &format!(
                    "compiler terminated by signal {}",
                    result.signal.unwrap_or(0)
                ),
            ),
            exit_code: None,
        }),
        ExecutionStatus::InternalError => Ok(CompileOutcome::Failure {
            diagnostics: synthesize(&diagnostics, "compiler terminated abnormally"),
            exit_code: None,
        }),
    }
}

/// Prepend a synthesized message to whatever partial diagnostics were captured
fn synthesize(diagnostics: &str, message: &str) -> String {
    if diagnostics.is_empty() {
        message.to_owned()
    } else {
        format!("{message}\n{diagnostics}")
    }
}

async fn is_executable_file(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}
