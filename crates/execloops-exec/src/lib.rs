//! # execloops-exec
//!
//! Process plumbing for execloops: spawning children with streamed,
//! captured output and an optional time limit, and the script executor that
//! writes generated code and requirements to disk, installs dependencies,
//! and runs the result.

mod error;
mod executor;
mod output;
mod spawner;

pub use error::ExecError;
pub use executor::{
    format_error_feedback, ExecutionConfig, ExecutionReport, ExecutionStatus, ScriptExecutor,
    DEFAULT_REQUIREMENTS_NAME, DEFAULT_SCRIPT_NAME, DEFAULT_TIMEOUT, TIMEOUT_MESSAGE,
};
pub use output::{OutputCallback, OutputType, ProcessOutput};
pub use spawner::{ProcessSpawner, SpawnConfig};
