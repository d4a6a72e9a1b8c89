use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU time limit in seconds
    #[serde(default)]
    pub time_limit: Option<f64>,

    /// Wall clock time limit in seconds
    #[serde(default)]
    pub wall_time_limit: Option<f64>,

    /// Memory limit in kilobytes (applied as the address-space ceiling)
    #[serde(default)]
    pub memory_limit: Option<u64>,

    /// Stack size limit in kilobytes
    #[serde(default)]
    pub stack_limit: Option<u64>,

    /// Maximum number of processes/threads
    #[serde(default)]
    pub max_processes: Option<u32>,

    /// Maximum output size in kilobytes. Caps both the bytes a child may
    /// write to files and the bytes captured per stream before truncation.
    #[serde(default)]
    pub max_output: Option<u64>,

    /// Maximum open file descriptors
    #[serde(default)]
    pub max_open_files: Option<u32>,
}

impl ResourceLimits {
    /// 1 megabyte in kilobytes
    pub const MB: u64 = 1024;
    /// 1 gigabyte in kilobytes
    pub const GB: u64 = 1024 * 1024;

    /// Create new resource limits with all fields set to None
    pub fn none() -> Self {
        Self {
            time_limit: None,
            wall_time_limit: None,
            memory_limit: None,
            stack_limit: None,
            max_processes: None,
            max_output: None,
            max_open_files: None,
        }
    }

    /// Set the CPU time limit in seconds
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    /// Set the wall clock time limit in seconds
    pub fn with_wall_time_limit(mut self, seconds: f64) -> Self {
        self.wall_time_limit = Some(seconds);
        self
    }

    /// Set the memory limit in kilobytes
    pub fn with_memory_limit(mut self, kb: u64) -> Self {
        self.memory_limit = Some(kb);
        self
    }

    /// Set the stack size limit in kilobytes
    pub fn with_stack_limit(mut self, kb: u64) -> Self {
        self.stack_limit = Some(kb);
        self
    }

    /// Set the maximum number of processes
    pub fn with_max_processes(mut self, count: u32) -> Self {
        self.max_processes = Some(count);
        self
    }

    /// Set the maximum output size in kilobytes
    pub fn with_max_output(mut self, kb: u64) -> Self {
        self.max_output = Some(kb);
        self
    }

    /// Apply overrides from another ResourceLimits, preferring values from `overrides`
    ///
    /// Returns a new ResourceLimits with values from `overrides` taking precedence
    /// over values from `self` when both are present.
    pub fn with_overrides(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            time_limit: overrides.time_limit.or(self.time_limit),
            wall_time_limit: overrides.wall_time_limit.or(self.wall_time_limit),
            memory_limit: overrides.memory_limit.or(self.memory_limit),
            stack_limit: overrides.stack_limit.or(self.stack_limit),
            max_processes: overrides.max_processes.or(self.max_processes),
            max_output: overrides.max_output.or(self.max_output),
            max_open_files: overrides.max_open_files.or(self.max_open_files),
        }
    }

    /// Output capture cap in bytes (defaults to 64 KB when unset)
    pub fn capture_cap_bytes(&self) -> usize {
        const DEFAULT_CAP_KB: u64 = 64;
        (self.max_output.unwrap_or(DEFAULT_CAP_KB) * 1024) as usize
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            time_limit: Some(5.0),
            wall_time_limit: Some(5.0),
            memory_limit: Some(262144), // 256 MB
            stack_limit: Some(8192),    // 8 MB
            max_processes: Some(256),
            max_output: Some(64), // 64 KB
            max_open_files: Some(64),
        }
    }
}

/// Outcome classification for one sandboxed child process.
///
/// When several conditions could apply at once, classification follows a
/// fixed priority: cancellation, then memory-limit kill, then wall-clock
/// timeout, then CPU-time kill, then signal termination, then normal exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Program exited normally (any exit code)
    Ok,

    /// Time limit exceeded (wall clock or CPU time, see [`LimitCause`])
    TimeLimitExceeded,

    /// Killed because it exceeded the memory ceiling
    MemoryLimitExceeded,

    /// Killed by a signal unrelated to a resource limit
    Signaled,

    /// Killed because the invocation was cancelled from outside
    Cancelled,

    /// The sandbox itself failed; the result does not describe the program
    InternalError,
}

/// Secondary status indicating which resource limit was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LimitCause {
    /// No limit was exceeded
    #[default]
    None,

    /// CPU time ceiling
    CpuTime,

    /// Wall clock deadline
    WallTime,

    /// Memory ceiling
    Memory,
}

/// Result of running one child process in the sandbox
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Outcome classification
    pub status: ExecutionStatus,

    /// Which limit was exceeded, if any
    pub cause: LimitCause,

    /// Exit code if the program exited normally
    pub exit_code: Option<i32>,

    /// Signal number if the program was killed by a signal
    pub signal: Option<i32>,

    /// Wall clock time from spawn to reap
    pub wall_time: Duration,

    /// Peak resident set size in kilobytes, when the kernel reported a new
    /// high-water mark for this child. None when no measurement is available.
    pub peak_memory: Option<u64>,

    /// Captured standard output, truncated at the capture cap
    pub stdout: Vec<u8>,

    /// Captured standard error, truncated at the capture cap
    pub stderr: Vec<u8>,

    /// Whether stdout hit the capture cap
    pub stdout_truncated: bool,

    /// Whether stderr hit the capture cap
    pub stderr_truncated: bool,
}

impl ExecutionResult {
    /// Check if the execution was successful (exited with code 0)
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::Ok) && self.exit_code == Some(0)
    }

    /// Check if the program ran to completion with its own exit code
    #[must_use]
    pub fn ran_to_completion(&self) -> bool {
        matches!(self.status, ExecutionStatus::Ok) && self.exit_code.is_some()
    }

    /// Reclassify a signal death as a memory-limit kill when the evidence
    /// supports it.
    ///
    /// A child that exhausts its address-space ceiling usually dies with
    /// SIGABRT after `operator new` throws (libstdc++ reports the bad_alloc
    /// on stderr before aborting); a child killed by an external OOM
    /// mechanism dies with SIGKILL at a resident size near the ceiling.
    pub fn detect_memory_limit(&mut self, memory_limit_kb: u64) {
        if self.status != ExecutionStatus::Signaled {
            return;
        }

        let aborted_on_bad_alloc = self.signal == Some(libc::SIGABRT)
            && contains_subslice(&self.stderr, b"bad_alloc");
        let killed_at_ceiling = self.signal == Some(libc::SIGKILL)
            && self.peak_memory.is_some_and(|peak| peak >= memory_limit_kb);

        if aborted_on_bad_alloc || killed_at_ceiling {
            self.status = ExecutionStatus::MemoryLimitExceeded;
            self.cause = LimitCause::Memory;
        }
    }
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self {
            status: ExecutionStatus::Ok,
            cause: LimitCause::None,
            exit_code: None,
            signal: None,
            wall_time: Duration::ZERO,
            peak_memory: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            stdout_truncated: false,
            stderr_truncated: false,
        }
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}
