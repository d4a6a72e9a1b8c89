//! Execution step for compiled artifacts
//!
//! Runs the compiled binary inside its workspace under the run-phase
//! limits. Compilation must have fully completed first.

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::runner::ExecuteError;
use crate::sandbox::{self, SpawnSpec};
use crate::types::{ExecutionResult, ResourceLimits};
use crate::workspace::Workspace;

/// Execute the compiled artifact in the workspace with batch I/O
#[instrument(skip(workspace, config, stdin, cancel))]
pub async fn execute(
    workspace: &Workspace,
    config: &Config,
    stdin: Option<&[u8]>,
    limits: Option<&ResourceLimits>,
    cancel: &CancellationToken,
) -> Result<ExecutionResult, ExecuteError> {
    let binary = &config.compiler.output_name;

    if !workspace.file_exists(binary).await? {
        return Err(ExecuteError::NotStarted(format!(
            "binary '{binary}' not found in workspace - was compilation run?"
        )));
    }

    // Determine effective limits: config defaults → caller overrides
    let effective_limits = config.effective_limits(limits);

    let program = workspace.file_path(binary)?;

    debug!(program = %program.display(), "executing program");

    let spec = SpawnSpec {
        program,
        args: Vec::new(),
        working_dir: workspace.path(),
        stdin: stdin.unwrap_or(b""),
        env: vec![("PATH".to_owned(), config.sandbox.path.clone())],
        limits: &effective_limits,
        deny_network: config.sandbox.deny_network,
    };

    let result = sandbox::run(spec, cancel).await?;

    debug!(
        status = ?result.status,
        cause = ?result.cause,
        exit_code = ?result.exit_code,
        wall_ms = result.wall_time.as_millis() as u64,
        "execution complete"
    );

    Ok(result)
}
