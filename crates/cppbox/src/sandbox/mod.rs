//! Confined child-process execution
//!
//! This module spawns untrusted programs with kernel-enforced resource
//! ceilings applied between fork and exec, captures their output into
//! size-capped buffers, and guarantees the whole process tree is dead
//! before control returns.

use thiserror::Error;

pub use crate::sandbox::process::{SpawnSpec, run};

mod limits;
mod process;

/// Errors that occur inside the execution sandbox
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to spawn sandboxed process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed while waiting for sandboxed process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("child I/O pipe unavailable")]
    PipeUnavailable,

    #[error("output capture task failed: {0}")]
    Capture(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
