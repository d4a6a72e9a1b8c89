//! Spawning, supervision, and I/O capture for sandboxed children
//!
//! Runs one child process to completion under the configured ceilings: the
//! waiter selects over child exit, the wall-clock deadline, and external
//! cancellation; a deadline or cancellation escalates to SIGKILL of the
//! child's process group followed by a reap, so no invocation can hang and
//! no process tree outlives its invocation.

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::sandbox::SandboxError;
use crate::sandbox::limits::ChildLimits;
use crate::types::{ExecutionResult, ExecutionStatus, LimitCause, ResourceLimits};

/// One child process to run under the sandbox
#[derive(Debug)]
pub struct SpawnSpec<'a> {
    /// Program to execute. Bare names resolve through the sandbox PATH.
    pub program: PathBuf,

    /// Arguments to the program
    pub args: Vec<String>,

    /// Working directory (the invocation's workspace)
    pub working_dir: &'a Path,

    /// Bytes fed to the child's stdin before EOF
    pub stdin: &'a [u8],

    /// Environment for the child. The inherited environment is cleared;
    /// only these variables are visible.
    pub env: Vec<(String, String)>,

    /// Resource ceilings, applied pre-exec
    pub limits: &'a ResourceLimits,

    /// Detach the child from the network namespace
    pub deny_network: bool,
}

/// Run a child process to completion under the sandbox
#[instrument(skip(spec, cancel), fields(program = %spec.program.display()))]
pub async fn run(
    spec: SpawnSpec<'_>,
    cancel: &CancellationToken,
) -> Result<ExecutionResult, SandboxError> {
    let capture_cap = spec.limits.capture_cap_bytes();
    let child_limits = ChildLimits::from_limits(spec.limits, spec.deny_network);

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(spec.working_dir)
        .env_clear()
        .envs(spec.env.iter().cloned())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Safety: apply() only performs async-signal-safe syscalls (setpgid,
    // setrlimit, unshare) on pre-computed plain data.
    unsafe {
        command.pre_exec(move || child_limits.apply());
    }

    let rss_floor = children_max_rss_kb();
    let started = Instant::now();
    let mut child = command.spawn().map_err(SandboxError::Spawn)?;
    let pgid = child.id().map(|id| Pid::from_raw(id as i32));

    debug!(pid = ?child.id(), "spawned sandboxed child");

    let stdin_pipe = child.stdin.take();
    let stdin_data = spec.stdin.to_vec();
    let stdin_task = tokio::spawn(async move {
        if let Some(mut pipe) = stdin_pipe {
            // EPIPE here just means the child stopped reading
            let _ = pipe.write_all(&stdin_data).await;
            let _ = pipe.shutdown().await;
        }
    });

    let stdout_pipe = child.stdout.take().ok_or(SandboxError::PipeUnavailable)?;
    let stderr_pipe = child.stderr.take().ok_or(SandboxError::PipeUnavailable)?;
    let stdout_task = tokio::spawn(drain_capped(stdout_pipe, capture_cap));
    let stderr_task = tokio::spawn(drain_capped(stderr_pipe, capture_cap));

    let deadline = spec
        .limits
        .wall_time_limit
        .map(|secs| tokio::time::Instant::now() + Duration::from_secs_f64(secs));
    let wall_sleep = async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(wall_sleep);

    enum WaitOutcome {
        Exited(std::process::ExitStatus),
        DeadlineExpired,
        Cancelled,
    }

    let outcome = tokio::select! {
        status = child.wait() => WaitOutcome::Exited(status.map_err(SandboxError::Wait)?),
        () = &mut wall_sleep => WaitOutcome::DeadlineExpired,
        () = cancel.cancelled() => WaitOutcome::Cancelled,
    };

    let (status, wall_timed_out, cancelled) = match outcome {
        WaitOutcome::Exited(status) => (status, false, false),
        WaitOutcome::DeadlineExpired => {
            warn!("wall-clock deadline expired, killing process group");
            kill_group(pgid, &mut child);
            let status = child.wait().await.map_err(SandboxError::Wait)?;
            (status, true, false)
        }
        WaitOutcome::Cancelled => {
            warn!("invocation cancelled, killing process group");
            kill_group(pgid, &mut child);
            let status = child.wait().await.map_err(SandboxError::Wait)?;
            (status, false, true)
        }
    };

    let wall_time = started.elapsed();

    // Sweep the group even after a normal exit: a forked straggler would
    // otherwise outlive the invocation and hold the output pipes open
    kill_group(pgid, &mut child);

    // Readers hit EOF once the whole group is dead and the pipes close
    let (stdout, stdout_truncated) = stdout_task.await?;
    let (stderr, stderr_truncated) = stderr_task.await?;
    let _ = stdin_task.await;

    let peak_memory = match (rss_floor, children_max_rss_kb()) {
        // Only trust a new high-water mark; an old one belongs to an
        // earlier child (e.g. the compiler)
        (Some(floor), Some(after)) if after > floor => Some(after),
        (None, after) => after,
        _ => None,
    };

    let mut result = ExecutionResult {
        status: ExecutionStatus::Ok,
        cause: LimitCause::None,
        exit_code: status.code(),
        signal: status.signal(),
        wall_time,
        peak_memory,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
    };
    classify(&mut result, wall_timed_out, cancelled, spec.limits);

    debug!(
        status = ?result.status,
        cause = ?result.cause,
        exit_code = ?result.exit_code,
        signal = ?result.signal,
        wall_ms = wall_time.as_millis() as u64,
        "sandboxed child finished"
    );

    Ok(result)
}

/// Classify the outcome in priority order: cancellation, then memory-limit
/// kill, then wall-clock timeout, then CPU-time kill, then signal
/// termination, then normal exit.
fn classify(
    result: &mut ExecutionResult,
    wall_timed_out: bool,
    cancelled: bool,
    limits: &ResourceLimits,
) {
    result.status = if result.signal == Some(libc::SIGXCPU) {
        result.cause = LimitCause::CpuTime;
        ExecutionStatus::TimeLimitExceeded
    } else if result.signal.is_some() {
        ExecutionStatus::Signaled
    } else if result.exit_code.is_some() {
        ExecutionStatus::Ok
    } else {
        ExecutionStatus::InternalError
    };

    if let Some(kb) = limits.memory_limit {
        result.detect_memory_limit(kb);
    }

    if wall_timed_out && result.status != ExecutionStatus::MemoryLimitExceeded {
        result.status = ExecutionStatus::TimeLimitExceeded;
        result.cause = LimitCause::WallTime;
    }

    if cancelled {
        result.status = ExecutionStatus::Cancelled;
        result.cause = LimitCause::None;
    }
}

/// SIGKILL the child's process group; falls back to killing the direct
/// child when the pid was already reaped.
fn kill_group(pgid: Option<Pid>, child: &mut Child) {
    match pgid {
        // ESRCH means the group is already gone
        Some(pgid) => {
            let _ = killpg(pgid, Signal::SIGKILL);
        }
        None => {
            let _ = child.start_kill();
        }
    }
}

/// Drain a stream into a buffer capped at `cap` bytes.
///
/// Bytes past the cap are read and discarded so the child never blocks on a
/// full pipe; capping alone never terminates the child. Returns the captured
/// bytes (at most exactly `cap`) and whether truncation occurred.
async fn drain_capped<R>(mut reader: R, cap: usize) -> (Vec<u8>, bool)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut captured = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if captured.len() < cap {
                    let take = n.min(cap - captured.len());
                    captured.extend_from_slice(&chunk[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }

    (captured, truncated)
}

fn children_max_rss_kb() -> Option<u64> {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    // Safety: usage is a valid, zeroed rusage struct
    let rc = unsafe { libc::getrusage(libc::RUSAGE_CHILDREN, &mut usage) };
    (rc == 0).then(|| usage.ru_maxrss as u64)
}
