//! Compile-and-execute orchestration
//!
//! Provides high-level APIs for compiling a submission and running the
//! resulting binary inside its workspace.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use crate::runner::compile::{CompileOutcome, compile};
pub use crate::runner::execute::execute;

mod compile;
mod execute;

use crate::{
    config::Config,
    sandbox::SandboxError,
    types::{ExecutionResult, ResourceLimits},
    workspace::{Workspace, WorkspaceError},
};

/// Request for compiling and running a submission in one step
#[derive(Debug)]
pub struct CompileAndRunRequest<'a> {
    /// The workspace to compile and run in
    pub workspace: &'a Workspace,
    /// Source code to compile
    pub source: &'a [u8],
    /// Already-validated compiler flags
    pub flags: &'a [String],
    /// Optional input to provide to the program
    pub stdin: Option<&'a [u8]>,
    /// Optional resource limits for compilation
    pub compile_limits: Option<&'a ResourceLimits>,
    /// Optional resource limits for execution
    pub run_limits: Option<&'a ResourceLimits>,
}

/// Errors that occur during compilation
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("flag '{0}' is not on the compiler allow-list")]
    DisallowedFlag(String),

    #[error("compiler command is empty")]
    EmptyCommand,

    #[error("compiler reported success but produced no executable artifact")]
    ArtifactMissing,

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}

/// Errors that occur during execution
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("execution not started: {0}")]
    NotStarted(String),

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}

/// Errors that occur during compile-and-run operations
///
/// This error type preserves the full context of whether the error
/// occurred during compilation or execution.
#[derive(Debug, Error)]
pub enum CompileAndRunError {
    /// Error during compilation phase
    #[error("compilation error: {0}")]
    Compile(#[from] CompileError),

    /// Error during execution phase (compilation succeeded)
    #[error("execution error: {0}")]
    Execute(#[from] ExecuteError),
}

/// High-level runner for one submission's compile and execute phases
#[derive(Debug, Clone)]
pub struct Runner {
    config: Config,
}

impl Runner {
    /// Create a new runner with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Create a new runner with the embedded default configuration
    pub fn with_defaults() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Compile source code into the workspace
    pub async fn compile(
        &self,
        workspace: &Workspace,
        source: &[u8],
        flags: &[String],
        limits: Option<&ResourceLimits>,
        cancel: &CancellationToken,
    ) -> Result<CompileOutcome, CompileError> {
        compile::compile(workspace, &self.config, source, flags, limits, cancel).await
    }

    /// Run the compiled artifact with batch I/O
    pub async fn run(
        &self,
        workspace: &Workspace,
        stdin: Option<&[u8]>,
        limits: Option<&ResourceLimits>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecuteError> {
        execute::execute(workspace, &self.config, stdin, limits, cancel).await
    }

    /// Compile and run in one step
    ///
    /// Returns a tuple of (compile_outcome, optional_run_result). If
    /// compilation fails, the run result will be `None`; execution never
    /// begins before compilation has fully completed.
    ///
    /// # Errors
    ///
    /// Returns [`CompileAndRunError::Compile`] if compilation faults, or
    /// [`CompileAndRunError::Execute`] if compilation succeeds but execution
    /// faults. The error type preserves which phase failed.
    pub async fn compile_and_run(
        &self,
        request: CompileAndRunRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<(CompileOutcome, Option<ExecutionResult>), CompileAndRunError> {
        let outcome = self
            .compile(
                request.workspace,
                request.source,
                request.flags,
                request.compile_limits,
                cancel,
            )
            .await?;

        if !outcome.is_success() {
            return Ok((outcome, None));
        }

        let result = self
            .run(request.workspace, request.stdin, request.run_limits, cancel)
            .await?;
        Ok((outcome, Some(result)))
    }
}
