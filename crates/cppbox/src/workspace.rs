//! Per-invocation scratch workspaces
//!
//! Manages the allocation, use, and guaranteed deletion of the isolated
//! directory a single invocation compiles and runs in.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Errors that occur during workspace operations
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("could not allocate a workspace after {attempts} attempts")]
    ResourceExhausted { attempts: u32 },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Allocates uniquely-named scratch directories under a common root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

/// Collision retries before giving up with `ResourceExhausted`
const ACQUIRE_RETRIES: u32 = 4;

impl WorkspaceManager {
    /// Create a manager rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the workspace root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, empty, uniquely-named workspace directory
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<Workspace, WorkspaceError> {
        tokio::fs::create_dir_all(&self.root).await?;

        for _ in 0..ACQUIRE_RETRIES {
            let path = self.root.join(format!("inv-{}", Uuid::new_v4()));
            match tokio::fs::create_dir(&path).await {
                Ok(()) => {
                    // Owner-only: nothing else on the host may look inside
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(0o700);
                    tokio::fs::set_permissions(&path, perms).await?;

                    debug!(?path, "workspace acquired");
                    return Ok(Workspace {
                        path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(WorkspaceError::Io(e)),
            }
        }

        Err(WorkspaceError::ResourceExhausted {
            attempts: ACQUIRE_RETRIES,
        })
    }
}

/// An isolated scratch directory owned by exactly one invocation
///
/// # Cleanup
///
/// Always call [`release()`](Self::release) explicitly before dropping. The
/// `Drop` implementation performs best-effort removal and logs a warning,
/// but its result cannot be observed.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl Workspace {
    /// Get the path to the workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the host path to a file inside the workspace
    ///
    /// Returns an error if the name contains path traversal attempts.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        if name.contains("..") || name.starts_with('/') || name.is_empty() {
            return Err(WorkspaceError::InvalidPath(format!(
                "path traversal not allowed: {name}"
            )));
        }
        Ok(self.path.join(name))
    }

    /// Write a file into the workspace
    #[instrument(skip(self, content))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<(), WorkspaceError> {
        let path = self.file_path(name)?;
        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file to workspace");
        Ok(())
    }

    /// Read a file from the workspace
    #[instrument(skip(self))]
    pub async fn read_file(&self, name: &str) -> Result<Vec<u8>, WorkspaceError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::read(&path).await?)
    }

    /// Check if a file exists in the workspace
    pub async fn file_exists(&self, name: &str) -> Result<bool, WorkspaceError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    /// Recursively delete the workspace directory
    ///
    /// Idempotent: releasing an already-released workspace is a no-op.
    #[must_use = "release errors should be handled"]
    #[instrument(skip(self))]
    pub async fn release(&mut self) -> Result<(), WorkspaceError> {
        if self.released {
            return Ok(());
        }

        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(WorkspaceError::Io(e)),
        }

        self.released = true;
        debug!(path = ?self.path, "workspace released");
        Ok(())
    }

    /// Check if the workspace has been released
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                path = %self.path.display(),
                "Workspace dropped without explicit release! \
                 Call release() before dropping to observe cleanup errors. \
                 Attempting best-effort removal."
            );
            if let Err(e) = std::fs::remove_dir_all(&self.path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %self.path.display(), error = %e, "best-effort removal failed");
            }
        }
    }
}
