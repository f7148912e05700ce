//! Typed failure conditions that callers may want to tell apart.
//!
//! Everything propagates as `anyhow::Error`; these variants are attached at
//! the point of failure so the CLI and tests can `downcast_ref` them.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error("target path does not exist: {}", .0.display())]
    TargetNotFound(PathBuf),

    #[error("required binary not found: {name} at {}", path.display())]
    MissingBinary { name: String, path: PathBuf },

    #[error(
        "writing to directory target {} is not supported (target individual files)",
        .0.display()
    )]
    UnsupportedWrite(PathBuf),

    #[error("{command} timed out after {timeout:?}")]
    ProcessTimeout { command: String, timeout: Duration },

    #[error("working directory does not exist: {}", .0.display())]
    WorkdirMissing(PathBuf),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl RepairError {
    /// Configuration-class errors are raised before any iteration runs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RepairError::TargetNotFound(_)
                | RepairError::MissingBinary { .. }
                | RepairError::InvalidConfig(_)
        )
    }
}
