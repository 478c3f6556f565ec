//! # execloops-core
//!
//! The generate/execute/fix loop: ask the model for a script, extract the
//! code and requirements, run it, and feed failures back until it succeeds
//! or the attempt budget is spent.

mod context;
mod error;
mod loop_runner;
mod outcome;

pub use context::{AttemptRecord, AttemptStatus, LoopContext, DEFAULT_MAX_ATTEMPTS};
pub use error::LoopError;
pub use loop_runner::LoopRunner;
pub use outcome::LoopOutcome;
