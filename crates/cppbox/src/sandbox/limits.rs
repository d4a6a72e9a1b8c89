//! Kernel resource ceilings for sandboxed children
//!
//! Converts [`ResourceLimits`] into the rlimit set applied in the child's
//! pre-exec phase, between fork and exec. There is no window where the
//! child runs unconstrained.
//!
//! `RLIMIT_AS` is used for the memory ceiling: the submissions are plain
//! C++ binaries, not runtimes that map large virtual ranges up front, so
//! address-space limiting is accurate and needs no cgroup support.

use nix::sched::{CloneFlags, unshare};
use nix::unistd::{Pid, setpgid};
use rlimit::{Resource, setrlimit};

use crate::types::ResourceLimits;

/// Plain-data snapshot of the ceilings to apply in pre_exec.
///
/// pre_exec runs post-fork where allocation is off-limits; everything is
/// computed up front.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChildLimits {
    cpu_seconds: Option<u64>,
    address_space_bytes: Option<u64>,
    stack_bytes: Option<u64>,
    file_size_bytes: Option<u64>,
    open_files: Option<u64>,
    processes: Option<u64>,
    deny_network: bool,
}

impl ChildLimits {
    pub(crate) fn from_limits(limits: &ResourceLimits, deny_network: bool) -> Self {
        Self {
            cpu_seconds: limits.time_limit.map(|secs| secs.ceil().max(1.0) as u64),
            address_space_bytes: limits.memory_limit.map(|kb| kb * 1024),
            stack_bytes: limits.stack_limit.map(|kb| kb * 1024),
            file_size_bytes: limits.max_output.map(|kb| kb * 1024),
            open_files: limits.max_open_files.map(u64::from),
            processes: limits.max_processes.map(u64::from),
            deny_network,
        }
    }

    /// Apply the ceilings to the calling process. Runs between fork and exec.
    pub(crate) fn apply(&self) -> std::io::Result<()> {
        // Own process group, so the supervisor can kill the whole tree
        setpgid(Pid::from_raw(0), Pid::from_raw(0)).map_err(errno_to_io)?;

        setrlimit(Resource::CORE, 0, 0)?;

        if let Some(secs) = self.cpu_seconds {
            setrlimit(Resource::CPU, secs, secs)?;
        }
        if let Some(bytes) = self.address_space_bytes {
            setrlimit(Resource::AS, bytes, bytes)?;
        }
        if let Some(bytes) = self.stack_bytes {
            setrlimit(Resource::STACK, bytes, bytes)?;
        }
        if let Some(bytes) = self.file_size_bytes {
            setrlimit(Resource::FSIZE, bytes, bytes)?;
        }
        if let Some(count) = self.open_files {
            setrlimit(Resource::NOFILE, count, count)?;
        }
        if let Some(count) = self.processes {
            setrlimit(Resource::NPROC, count, count)?;
        }

        if self.deny_network {
            unshare(CloneFlags::CLONE_NEWNET).map_err(errno_to_io)?;
        }

        Ok(())
    }
}

fn errno_to_io(errno: nix::errno::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(errno as i32)
}
