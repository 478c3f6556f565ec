use thiserror::Error;

/// Errors that stop the loop before any attempt runs
#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
