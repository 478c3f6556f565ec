use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while spawning processes or running scripts
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to write {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Install command is empty")]
    EmptyInstallCommand,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
