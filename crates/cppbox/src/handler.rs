//! One-invocation request handling
//!
//! The narrow interface the surrounding transport drives:
//! `handle(Submission) -> Response`. The handler validates the payload,
//! acquires a workspace, compiles, executes, assembles the response, and
//! releases the workspace on every path. Faults never escape un-translated;
//! every outcome becomes a structured [`Response`].

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::runner::{CompileOutcome, ExecuteError, Runner};
use crate::sandbox::SandboxError;
use crate::types::{ExecutionResult, ExecutionStatus, ResourceLimits};
use crate::workspace::WorkspaceManager;

/// One user-supplied C++ program plus its execution parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// C++ source text
    pub source: String,

    /// Optional text fed to the program's stdin
    #[serde(default)]
    pub stdin: Option<String>,

    /// Optional allow-listed compiler flags
    #[serde(default)]
    pub flags: Vec<String>,

    /// Optional limit overrides, clamped to the configured ceilings
    #[serde(default)]
    pub limits: LimitOverrides,
}

/// Per-request limit overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitOverrides {
    /// Execution time override in milliseconds
    #[serde(default)]
    pub time_ms: Option<u64>,

    /// Memory ceiling override in megabytes
    #[serde(default)]
    pub memory_mb: Option<u64>,
}

impl LimitOverrides {
    /// Convert to run-phase resource limits; None when nothing is overridden
    fn to_resource_limits(&self) -> Option<ResourceLimits> {
        if self.time_ms.is_none() && self.memory_mb.is_none() {
            return None;
        }

        let mut limits = ResourceLimits::none();
        if let Some(ms) = self.time_ms {
            let seconds = ms as f64 / 1000.0;
            limits = limits
                .with_time_limit(seconds)
                .with_wall_time_limit(seconds);
        }
        if let Some(mb) = self.memory_mb {
            limits = limits.with_memory_limit(mb * ResourceLimits::MB);
        }
        Some(limits)
    }
}

/// Top-level invocation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Compiled and ran to completion (any exit code)
    Ok,
    /// The toolchain rejected the source
    CompileError,
    /// The program was killed by a signal or could not be launched
    RuntimeError,
    /// Compile or execute exceeded its deadline, or the invocation was cancelled
    Timeout,
    /// Invalid request or an unexpected fault inside the sandbox
    InternalError,
}

/// Per-stream truncation flags
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TruncationFlags {
    pub stdout: bool,
    pub stderr: bool,
}

/// Structured result of one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Top-level status
    pub status: ResponseStatus,

    /// Compiler diagnostics or warnings, possibly empty
    pub compiler_output: String,

    /// Captured stdout, possibly truncated
    pub stdout: String,

    /// Captured stderr, possibly truncated
    pub stderr: String,

    /// Present only when the program ran to completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// End-to-end invocation duration in milliseconds
    pub duration_ms: u64,

    /// Whether each captured stream hit the output cap
    pub truncated: TruncationFlags,

    /// Generic error message; present on rejections and internal errors only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Opaque identifier correlating an internal error with the logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident: Option<String>,
}

impl Response {
    fn empty(status: ResponseStatus, duration: Duration) -> Self {
        Self {
            status,
            compiler_output: String::new(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            duration_ms: duration.as_millis() as u64,
            truncated: TruncationFlags::default(),
            error: None,
            incident: None,
        }
    }

    fn rejected(reason: &ValidationError, duration: Duration) -> Self {
        Self {
            error: Some(reason.to_string()),
            ..Self::empty(ResponseStatus::InternalError, duration)
        }
    }

    fn compile_failed(diagnostics: String, duration: Duration) -> Self {
        Self {
            compiler_output: diagnostics,
            ..Self::empty(ResponseStatus::CompileError, duration)
        }
    }

    fn from_execution(warnings: String, result: &ExecutionResult, duration: Duration) -> Self {
        let status = match result.status {
            ExecutionStatus::Ok => ResponseStatus::Ok,
            ExecutionStatus::TimeLimitExceeded | ExecutionStatus::Cancelled => {
                ResponseStatus::Timeout
            }
            ExecutionStatus::MemoryLimitExceeded | ExecutionStatus::Signaled => {
                ResponseStatus::RuntimeError
            }
            ExecutionStatus::InternalError => ResponseStatus::InternalError,
        };

        Self {
            status,
            compiler_output: warnings,
            stdout: String::from_utf8_lossy(&result.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
            exit_code: if result.ran_to_completion() {
                result.exit_code
            } else {
                None
            },
            duration_ms: duration.as_millis() as u64,
            truncated: TruncationFlags {
                stdout: result.stdout_truncated,
                stderr: result.stderr_truncated,
            },
            error: None,
            incident: None,
        }
    }

    /// Generic internal-error response with a fresh incident id.
    ///
    /// The fault itself goes to the logs with full context; the response
    /// carries no host detail.
    fn internal(
        context: &str,
        fault: &dyn std::error::Error,
        duration: Duration,
    ) -> Self {
        let incident = Uuid::new_v4().to_string();
        error!(%incident, error = %fault, "{context}");
        Self {
            error: Some("internal error".to_owned()),
            incident: Some(incident),
            ..Self::empty(ResponseStatus::InternalError, duration)
        }
    }
}

/// Rejections produced before any process spawns
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("submission source is empty")]
    EmptySource,

    #[error("submission source exceeds {max} bytes")]
    SourceTooLarge { max: usize },

    #[error("stdin payload exceeds {max} bytes")]
    StdinTooLarge { max: usize },

    #[error("flag '{0}' is not on the compiler allow-list")]
    DisallowedFlag(String),

    #[error("time override {requested}ms exceeds the {max}ms ceiling")]
    TimeOverCeiling { requested: u64, max: u64 },

    #[error("memory override {requested}MB exceeds the {max}MB ceiling")]
    MemoryOverCeiling { requested: u64, max: u64 },

    #[error("source contains a rejected construct")]
    RejectedPattern,
}

/// Handles one invocation at a time: validate, compile, execute, respond
#[derive(Debug, Clone)]
pub struct Handler {
    config: Config,
    runner: Runner,
    workspaces: WorkspaceManager,
}

impl Handler {
    /// Create a handler from the given configuration
    pub fn new(config: Config) -> Self {
        let workspaces = WorkspaceManager::new(config.workspace_root.clone());
        let runner = Runner::new(config.clone());
        Self {
            config,
            runner,
            workspaces,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check that the configured compiler is reachable on the sandbox PATH
    pub fn preflight(&self) -> Option<PathBuf> {
        self.config.compiler.resolve(&self.config.sandbox.path)
    }

    /// Handle one submission to completion
    pub async fn handle(&self, submission: Submission) -> Response {
        self.handle_with_cancel(submission, CancellationToken::new())
            .await
    }

    /// Handle one submission, observing an external cancellation signal.
    ///
    /// Cancellation escalates to forced termination of the child process
    /// tree; the workspace is still released.
    #[instrument(skip(self, submission, cancel))]
    pub async fn handle_with_cancel(
        &self,
        submission: Submission,
        cancel: CancellationToken,
    ) -> Response {
        let started = Instant::now();

        if let Err(reason) = self.validate(&submission) {
            warn!(error = %reason, "rejected submission");
            return Response::rejected(&reason, started.elapsed());
        }

        let mut workspace = match self.workspaces.acquire().await {
            Ok(workspace) => workspace,
            Err(fault) => {
                return Response::internal(
                    "workspace allocation failed",
                    &fault,
                    started.elapsed(),
                );
            }
        };

        let response = self
            .run_invocation(&workspace, &submission, &cancel, started)
            .await;

        // The single release point covering every terminal transition
        if let Err(fault) = workspace.release().await {
            warn!(error = %fault, "workspace release failed");
        }

        response
    }

    /// Structural validation; nothing spawns before this passes
    fn validate(&self, submission: &Submission) -> Result<(), ValidationError> {
        let policy = &self.config.request;

        if submission.source.is_empty() {
            return Err(ValidationError::EmptySource);
        }
        if submission.source.len() > policy.max_source_bytes {
            return Err(ValidationError::SourceTooLarge {
                max: policy.max_source_bytes,
            });
        }
        if let Some(ref stdin) = submission.stdin
            && stdin.len() > policy.max_stdin_bytes
        {
            return Err(ValidationError::StdinTooLarge {
                max: policy.max_stdin_bytes,
            });
        }

        if let Err(flag) = self.config.compiler.validate_flags(&submission.flags) {
            return Err(ValidationError::DisallowedFlag(flag.to_owned()));
        }

        if let Some(requested) = submission.limits.time_ms
            && requested > policy.max_time_ms
        {
            return Err(ValidationError::TimeOverCeiling {
                requested,
                max: policy.max_time_ms,
            });
        }
        if let Some(requested) = submission.limits.memory_mb
            && requested > policy.max_memory_mb
        {
            return Err(ValidationError::MemoryOverCeiling {
                requested,
                max: policy.max_memory_mb,
            });
        }

        for pattern in &policy.reject_patterns {
            if submission.source.contains(pattern.as_str()) {
                return Err(ValidationError::RejectedPattern);
            }
        }

        Ok(())
    }

    async fn run_invocation(
        &self,
        workspace: &crate::workspace::Workspace,
        submission: &Submission,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Response {
        let outcome = match self
            .runner
            .compile(
                workspace,
                submission.source.as_bytes(),
                &submission.flags,
                None,
                cancel,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(fault) => {
                return Response::internal("compilation could not run", &fault, started.elapsed());
            }
        };

        let warnings = match outcome {
            CompileOutcome::Failure { diagnostics, .. } => {
                return Response::compile_failed(diagnostics, started.elapsed());
            }
            CompileOutcome::Success { warnings, .. } => warnings,
        };

        let run_limits = submission.limits.to_resource_limits();
        let stdin = submission.stdin.as_deref().map(str::as_bytes);

        match self
            .runner
            .run(workspace, stdin, run_limits.as_ref(), cancel)
            .await
        {
            Ok(result) => Response::from_execution(warnings, &result, started.elapsed()),
            Err(ExecuteError::Sandbox(SandboxError::Spawn(fault))) => {
                // The artifact existed but the sandbox could not launch it;
                // distinct from the program failing on its own
                let mut response = Response::internal(
                    "sandbox failed to launch compiled program",
                    &fault,
                    started.elapsed(),
                );
                response.status = ResponseStatus::RuntimeError;
                response.compiler_output = warnings;
                response.error = Some("failed to launch compiled program".to_owned());
                response
            }
            Err(fault) => Response::internal("execution could not run", &fault, started.elapsed()),
        }
    }
}
