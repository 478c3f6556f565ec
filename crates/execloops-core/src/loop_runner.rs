use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use execloops_exec::{format_error_feedback, OutputCallback, OutputType, ScriptExecutor};
use execloops_logging::{LogEvent, Logger, SessionWriter, StreamType};
use execloops_model::LanguageModel;
use execloops_prompts::GeneratedCode;

use crate::context::{AttemptRecord, AttemptStatus};
use crate::error::LoopError;
use crate::outcome::LoopOutcome;
use crate::LoopContext;

/// Orchestrates the generate/execute/fix loop
pub struct LoopRunner<'a> {
    model: &'a dyn LanguageModel,
    executor: &'a ScriptExecutor,
    logger: Arc<Logger>,
    session: Option<Arc<SessionWriter>>,
    interrupted: Arc<AtomicBool>,
}

impl<'a> LoopRunner<'a> {
    pub fn new(
        model: &'a dyn LanguageModel,
        executor: &'a ScriptExecutor,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            model,
            executor,
            logger,
            session: None,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Record start, attempts, and end to a session file
    pub fn with_session(mut self, session: Arc<SessionWriter>) -> Self {
        self.session = Some(session);
        self
    }

    /// Get a handle to signal interruption
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Create an output callback for streaming script output
    fn create_output_callback(&self, attempt: usize) -> OutputCallback {
        let logger = self.logger.clone();
        Arc::new(move |line: &str, output_type: OutputType| {
            let stream = match output_type {
                OutputType::Stdout => StreamType::Stdout,
                OutputType::Stderr => StreamType::Stderr,
            };
            logger.log(&LogEvent::ScriptStreamLine {
                attempt,
                stream,
                line: line.to_string(),
            });
        })
    }

    /// Run the loop until a script succeeds, the budget runs out, or the
    /// user interrupts
    pub async fn run(&self, mut context: LoopContext) -> Result<LoopOutcome, LoopError> {
        if context.max_attempts == 0 {
            return Err(LoopError::ConfigError(
                "max attempts must be at least 1".to_string(),
            ));
        }

        self.logger.log(&LogEvent::LoopStarted {
            prompt: context.request.clone(),
            working_dir: context.working_dir.clone(),
            model: self.model.model_id().to_string(),
            max_attempts: context.max_attempts,
        });
        if let Some(session) = &self.session {
            session.write_start(
                &context.request,
                &context.working_dir,
                self.model.name(),
                self.model.model_id(),
                context.max_attempts,
            );
        }

        let outcome = loop {
            if self.interrupted.load(Ordering::SeqCst) {
                info!("Loop interrupted by user");
                let duration = context.total_duration();
                break LoopOutcome::interrupted(context.attempt, context.history, duration);
            }

            if !context.should_continue() {
                self.logger.log(&LogEvent::MaxAttemptsReached {
                    attempts: context.attempt,
                });
                warn!(attempts = context.attempt, "Maximum attempts reached");
                let duration = context.total_duration();
                break LoopOutcome::max_attempts_reached(context.attempt, context.history, duration);
            }

            match self.run_attempt(&mut context).await {
                Some(outcome) => break outcome,
                None => context.increment_attempt(),
            }
        };

        if let Some(session) = &self.session {
            session.write_end(
                outcome.label(),
                outcome.attempts(),
                outcome.total_duration_secs(),
            );
        }

        Ok(outcome)
    }

    /// Run a single attempt
    /// Returns Some(outcome) if the script succeeded, None to continue
    async fn run_attempt(&self, context: &mut LoopContext) -> Option<LoopOutcome> {
        let attempt = context.attempt_number();
        let prompt = context.current_prompt().to_string();

        info!(attempt, max_attempts = context.max_attempts, "Starting attempt");
        self.logger.log(&LogEvent::AttemptStarted {
            attempt,
            max_attempts: context.max_attempts,
            prompt_preview: prompt.chars().take(100).collect(),
        });

        let model_start = Instant::now();
        let response = match self.model.complete(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!(attempt, error = %e, "Model call failed");
                self.logger.log(&LogEvent::ModelFailed {
                    attempt,
                    error: e.to_string(),
                });
                self.record(
                    context,
                    AttemptRecord::without_execution(
                        attempt,
                        AttemptStatus::ModelError,
                        e.to_string(),
                        model_start.elapsed(),
                    ),
                );
                return None;
            }
        };

        self.logger.log(&LogEvent::ModelResponded {
            attempt,
            response: response.text.clone(),
            duration_secs: response.duration.as_secs_f64(),
        });
        if let Some(reasoning) = &response.reasoning {
            debug!(attempt, %reasoning, "Model reasoning");
        }

        let generated = match GeneratedCode::extract(&response.text) {
            Ok(generated) => generated,
            Err(e) => {
                warn!(attempt, error = %e, "Could not extract code from response");
                self.logger.log(&LogEvent::ExtractionFailed {
                    attempt,
                    error: e.to_string(),
                });
                self.record(
                    context,
                    AttemptRecord::without_execution(
                        attempt,
                        AttemptStatus::ExtractionError,
                        e.to_string(),
                        response.duration,
                    ),
                );
                return None;
            }
        };

        self.logger.log(&LogEvent::CodeExtracted {
            attempt,
            code_lines: generated.code_lines(),
            packages: generated
                .packages()
                .into_iter()
                .map(str::to_string)
                .collect(),
        });

        self.logger.log(&LogEvent::ScriptStarted { attempt });
        let exec_start = Instant::now();
        let callback = self.create_output_callback(attempt);
        let (status, stdout, stderr, exit_code, exec_duration) = match self
            .executor
            .save_and_execute(&generated.code, &generated.requirements, Some(callback))
            .await
        {
            Ok(report) => {
                self.logger.log(&LogEvent::ScriptCompleted {
                    attempt,
                    status: report.status.to_string(),
                    exit_code: report.exit_code(),
                    duration_secs: report.duration.as_secs_f64(),
                });
                let exit_code = report.exit_code();
                (
                    AttemptStatus::from(&report.status),
                    report.stdout,
                    report.stderr,
                    exit_code,
                    report.duration,
                )
            }
            Err(e) => {
                warn!(attempt, error = %e, "Script could not be executed");
                self.logger.log(&LogEvent::ExecutionError {
                    attempt,
                    error: e.to_string(),
                });
                (
                    AttemptStatus::ExecutionError,
                    String::new(),
                    e.to_string(),
                    None,
                    exec_start.elapsed(),
                )
            }
        };

        let feedback = format_error_feedback(&stdout, &stderr);
        self.record(
            context,
            AttemptRecord {
                attempt,
                status,
                code: Some(generated.code.clone()),
                requirements: Some(generated.requirements.clone()),
                stdout,
                stderr,
                exit_code,
                model_duration_secs: response.duration.as_secs_f64(),
                execution_duration_secs: exec_duration.as_secs_f64(),
                timestamp: Utc::now(),
            },
        );

        if status == AttemptStatus::Succeeded {
            let duration = context.total_duration();
            self.logger.log(&LogEvent::LoopCompleted {
                attempts: attempt,
                duration_secs: duration.as_secs_f64(),
            });
            info!(attempt, "Script executed successfully");
            return Some(LoopOutcome::success(
                attempt,
                generated.code,
                generated.requirements,
                self.executor.config().script_path(),
                std::mem::take(&mut context.history),
                duration,
            ));
        }

        if !context.is_last_attempt() {
            self.logger.log(&LogEvent::FixRequested {
                attempt,
                next_attempt: attempt + 1,
            });
            context.set_fix_prompt(&generated.code, &feedback);
        }

        None
    }

    fn record(&self, context: &mut LoopContext, record: AttemptRecord) {
        if let Some(session) = &self.session {
            session.write_attempt(record.session_entry());
        }
        context.push_record(record);
    }
}
