//! A library for compiling and running untrusted C++ submissions in a sandbox.
//!
//! Cppbox provides an async Rust API for the compile-and-execute core of a
//! serverless code runner: it accepts arbitrary C++ source text, compiles it
//! with a configured toolchain, runs the binary under kernel-enforced
//! resource ceilings, and returns a structured result without letting the
//! submitted code compromise the host or outlive its invocation.
//!
//! # Features
//!
//! - **Per-invocation workspaces** — Uniquely-named scratch directories,
//!   deleted on every exit path.
//! - **Pre-exec resource ceilings** — CPU time, wall clock, memory, output
//!   size, process and fd counts, applied atomically with process creation.
//! - **Capped output capture** — Truncation is explicit and flagged, and
//!   never terminates the child.
//! - **Cancellation** — An external deadline signal kills the whole child
//!   process tree, never orphaning it.
//! - **Flag allow-list** — Submission compiler flags are matched exactly
//!   against configuration before anything spawns.
//! - **TOML configuration** — Toolchain command, limits, and request caps.

pub use config::{CompilerConfig, Config, ConfigError, EXAMPLE_CONFIG};
pub use handler::{
    Handler, LimitOverrides, Response, ResponseStatus, Submission, TruncationFlags,
    ValidationError,
};
pub use runner::{
    CompileAndRunError, CompileAndRunRequest, CompileError, CompileOutcome, ExecuteError, Runner,
};
pub use sandbox::{SandboxError, SpawnSpec};
pub use types::{ExecutionResult, ExecutionStatus, LimitCause, ResourceLimits};
pub use workspace::{Workspace, WorkspaceError, WorkspaceManager};

pub mod config;
pub mod handler;
pub mod runner;
pub mod sandbox;
pub mod types;
pub mod workspace;
