use chrono::{DateTime, Utc};
use execloops_exec::ExecutionStatus;
use execloops_logging::AttemptEntry;
use execloops_prompts::CodePrompts;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Attempt budget used when none is configured
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

/// Shared context for the generate/execute/fix loop
#[derive(Debug, Clone)]
pub struct LoopContext {
    /// The user's task description
    pub request: String,
    /// Code-format instructions appended to the request
    pub template: String,
    /// Directory the script is written to and run in
    pub working_dir: PathBuf,
    /// Current attempt index (0-indexed)
    pub attempt: usize,
    pub max_attempts: usize,
    /// History of all attempts
    pub history: Vec<AttemptRecord>,
    /// When the loop started
    started_at: Instant,
    /// Prompt for the next model call
    prompt: String,
}

/// How a single attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Succeeded,
    ExecutionFailed,
    TimedOut,
    InstallFailed,
    /// Files could not be written or a process could not be started
    ExecutionError,
    ModelError,
    ExtractionError,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Succeeded => "succeeded",
            AttemptStatus::ExecutionFailed => "execution_failed",
            AttemptStatus::TimedOut => "timed_out",
            AttemptStatus::InstallFailed => "install_failed",
            AttemptStatus::ExecutionError => "execution_error",
            AttemptStatus::ModelError => "model_error",
            AttemptStatus::ExtractionError => "extraction_error",
        }
    }

    /// Whether the attempt produced output worth sending back to the model
    pub fn has_feedback(&self) -> bool {
        matches!(
            self,
            AttemptStatus::ExecutionFailed
                | AttemptStatus::TimedOut
                | AttemptStatus::InstallFailed
                | AttemptStatus::ExecutionError
        )
    }
}

impl From<&ExecutionStatus> for AttemptStatus {
    fn from(status: &ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Succeeded => AttemptStatus::Succeeded,
            ExecutionStatus::Failed { .. } => AttemptStatus::ExecutionFailed,
            ExecutionStatus::TimedOut => AttemptStatus::TimedOut,
            ExecutionStatus::InstallFailed { .. } => AttemptStatus::InstallFailed,
        }
    }
}

/// Record of a single attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt: usize,
    pub status: AttemptStatus,
    pub code: Option<String>,
    pub requirements: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub model_duration_secs: f64,
    pub execution_duration_secs: f64,
    pub timestamp: DateTime<Utc>,
}

impl AttemptRecord {
    /// Record for an attempt that ended before any code ran
    pub fn without_execution(
        attempt: usize,
        status: AttemptStatus,
        error: String,
        model_duration: Duration,
    ) -> Self {
        Self {
            attempt,
            status,
            code: None,
            requirements: None,
            stdout: String::new(),
            stderr: error,
            exit_code: None,
            model_duration_secs: model_duration.as_secs_f64(),
            execution_duration_secs: 0.0,
            timestamp: Utc::now(),
        }
    }

    pub fn session_entry(&self) -> AttemptEntry<'_> {
        AttemptEntry {
            attempt: self.attempt,
            status: self.status.as_str(),
            code: self.code.as_deref(),
            requirements: self.requirements.as_deref(),
            stdout: &self.stdout,
            stderr: &self.stderr,
            exit_code: self.exit_code,
            model_duration_secs: self.model_duration_secs,
            execution_duration_secs: self.execution_duration_secs,
            timestamp: self.timestamp,
        }
    }
}

impl LoopContext {
    pub fn new(request: String, working_dir: PathBuf) -> Self {
        let template = CodePrompts::default_template().to_string();
        let prompt = CodePrompts::initial_prompt(&request, &template);
        Self {
            request,
            template,
            working_dir,
            attempt: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            history: Vec::new(),
            started_at: Instant::now(),
            prompt,
        }
    }

    pub fn with_max_attempts(mut self, max: usize) -> Self {
        self.max_attempts = max;
        self
    }

    /// Replace the code-format instructions; resets the prompt
    pub fn with_template(mut self, template: String) -> Self {
        self.template = template;
        self.prompt = self.initial_prompt();
        self
    }

    pub fn increment_attempt(&mut self) {
        self.attempt += 1;
    }

    pub fn push_record(&mut self, record: AttemptRecord) {
        self.history.push(record);
    }

    pub fn total_duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn should_continue(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// 1-based number of the attempt about to run
    pub fn attempt_number(&self) -> usize {
        self.attempt + 1
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt_number() >= self.max_attempts
    }

    /// Request plus template, as sent on the first attempt
    pub fn initial_prompt(&self) -> String {
        CodePrompts::initial_prompt(&self.request, &self.template)
    }

    /// Prompt for the next model call
    pub fn current_prompt(&self) -> &str {
        &self.prompt
    }

    /// Switch to a fix prompt built from the failing code and its output
    ///
    /// The fix prompt always quotes the initial prompt, so it does not grow
    /// with each failed attempt.
    pub fn set_fix_prompt(&mut self, code: &str, error_output: &str) {
        self.prompt = CodePrompts::fix_prompt(&self.initial_prompt(), code, error_output);
    }
}
