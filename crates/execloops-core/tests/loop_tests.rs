#![cfg(unix)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use execloops_core::{AttemptStatus, LoopContext, LoopError, LoopOutcome, LoopRunner};
use execloops_exec::{ExecutionConfig, ScriptExecutor};
use execloops_logging::{LogFormat, Logger, SessionWriter};
use execloops_model::{LanguageModel, ModelError, ModelResponse};

/// Model that replays queued replies and remembers every prompt it saw
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    prompts: Mutex<Vec<String>>,
    /// Raised while answering, as Ctrl+C would be mid-attempt
    interrupt_on_reply: Mutex<Option<Arc<AtomicBool>>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<String, ModelError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
            interrupt_on_reply: Mutex::new(None),
        }
    }

    fn interrupt_on_reply(&self, handle: Arc<AtomicBool>) {
        *self.interrupt_on_reply.lock().unwrap() = Some(handle);
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, prompt: &str) -> Result<ModelResponse, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(handle) = self.interrupt_on_reply.lock().unwrap().as_ref() {
            handle.store(true, Ordering::SeqCst);
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(code_reply("exit 3")));
        reply.map(|text| ModelResponse {
            text,
            reasoning: None,
            usage: None,
            duration: Duration::from_millis(5),
        })
    }

    async fn is_available(&self) -> bool {
        true
    }
}

fn code_reply(code: &str) -> String {
    format!(
        "<python_code>\n{}\n</python_code>\n<requirements>\n</requirements>",
        code
    )
}

fn executor(dir: &Path) -> ScriptExecutor {
    ScriptExecutor::new(
        ExecutionConfig::new(dir.to_path_buf())
            .with_interpreter(PathBuf::from("sh"))
            .with_timeout(Duration::from_secs(10)),
    )
}

fn logger() -> Arc<Logger> {
    Arc::new(Logger::new(LogFormat::Compact))
}

fn context(dir: &Path, max_attempts: usize) -> LoopContext {
    LoopContext::new("print a greeting".into(), dir.to_path_buf())
        .with_template("Answer in tags.".into())
        .with_max_attempts(max_attempts)
}

#[tokio::test]
async fn test_first_attempt_success() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![Ok(code_reply("echo hello"))]);
    let executor = executor(dir.path());
    let runner = LoopRunner::new(&model, &executor, logger());

    let outcome = runner.run(context(dir.path(), 10)).await.unwrap();

    match &outcome {
        LoopOutcome::Success {
            attempts,
            code,
            script_path,
            history,
            ..
        } => {
            assert_eq!(*attempts, 1);
            assert_eq!(code, "echo hello");
            assert_eq!(script_path, &dir.path().join("generated_script.py"));
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].stdout.trim(), "hello");
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(model.prompts(), vec!["print a greeting \n Answer in tags.".to_string()]);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("generated_script.py")).unwrap(),
        "echo hello"
    );
}

#[tokio::test]
async fn test_failure_feeds_error_into_fix_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        Ok(code_reply("echo partial; echo boom >&2; exit 1")),
        Ok(code_reply("echo fixed")),
    ]);
    let executor = executor(dir.path());
    let runner = LoopRunner::new(&model, &executor, logger());

    let outcome = runner.run(context(dir.path(), 10)).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.attempts(), 2);
    assert_eq!(outcome.history()[0].status, AttemptStatus::ExecutionFailed);
    assert_eq!(outcome.history()[0].exit_code, Some(1));

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 2);
    let fix = &prompts[1];
    assert!(fix.contains("Original request: print a greeting \n Answer in tags."));
    assert!(fix.contains("echo partial; echo boom >&2; exit 1"));
    assert!(fix.contains("STDOUT: partial"));
    assert!(fix.contains("STDERR: boom"));
}

#[tokio::test]
async fn test_model_error_keeps_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        Err(ModelError::RateLimited),
        Ok(code_reply("echo ok")),
    ]);
    let executor = executor(dir.path());
    let runner = LoopRunner::new(&model, &executor, logger());

    let outcome = runner.run(context(dir.path(), 10)).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.attempts(), 2);
    assert_eq!(outcome.history()[0].status, AttemptStatus::ModelError);
    let prompts = model.prompts();
    assert_eq!(prompts[0], prompts[1]);
}

#[tokio::test]
async fn test_unextractable_reply_consumes_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        Ok("I cannot help with that.".to_string()),
        Ok(code_reply("echo ok")),
    ]);
    let executor = executor(dir.path());
    let runner = LoopRunner::new(&model, &executor, logger());

    let outcome = runner.run(context(dir.path(), 10)).await.unwrap();

    assert_eq!(outcome.attempts(), 2);
    assert_eq!(outcome.history()[0].status, AttemptStatus::ExtractionError);
    assert!(outcome.history()[0].code.is_none());
    let prompts = model.prompts();
    assert_eq!(prompts[0], prompts[1]);
}

#[tokio::test]
async fn test_budget_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("events.jsonl");
    let logger = Arc::new(Logger::with_file(LogFormat::Compact, &log_path).unwrap());
    let model = ScriptedModel::new(Vec::new());
    let executor = executor(dir.path());
    let runner = LoopRunner::new(&model, &executor, logger);

    let outcome = runner.run(context(dir.path(), 3)).await.unwrap();

    assert!(matches!(outcome, LoopOutcome::MaxAttemptsReached { attempts: 3, .. }));
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(outcome.history().len(), 3);
    assert_eq!(model.prompts().len(), 3);

    // No fix prompt is built after the final attempt
    let events = std::fs::read_to_string(&log_path).unwrap();
    let fixes = events
        .lines()
        .filter(|l| l.contains("\"fix_requested\""))
        .count();
    assert_eq!(fixes, 2);
}

#[tokio::test]
async fn test_interrupt_before_first_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![Ok(code_reply("echo never"))]);
    let executor = executor(dir.path());
    let runner = LoopRunner::new(&model, &executor, logger());
    runner.interrupt_handle().store(true, Ordering::SeqCst);

    let outcome = runner.run(context(dir.path(), 10)).await.unwrap();

    assert!(matches!(outcome, LoopOutcome::UserInterrupted { attempts: 0, .. }));
    assert_eq!(outcome.exit_code(), 130);
    assert!(model.prompts().is_empty());
}

#[tokio::test]
async fn test_interrupt_during_attempt_stops_after_it() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![Ok(code_reply("exit 1")), Ok(code_reply("echo ok"))]);
    let executor = executor(dir.path());
    let runner = LoopRunner::new(&model, &executor, logger());
    model.interrupt_on_reply(runner.interrupt_handle());

    let outcome = runner.run(context(dir.path(), 10)).await.unwrap();

    assert!(matches!(outcome, LoopOutcome::UserInterrupted { attempts: 1, .. }));
    assert_eq!(outcome.history().len(), 1);
    assert_eq!(outcome.history()[0].status, AttemptStatus::ExecutionFailed);
    assert_eq!(model.prompts().len(), 1);
}

#[tokio::test]
async fn test_zero_budget_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(Vec::new());
    let executor = executor(dir.path());
    let runner = LoopRunner::new(&model, &executor, logger());

    let result = runner.run(context(dir.path(), 0)).await;

    assert!(matches!(result, Err(LoopError::ConfigError(_))));
    assert!(model.prompts().is_empty());
}

#[tokio::test]
async fn test_session_file_records_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let sessions = dir.path().join("sessions");
    let session = Arc::new(SessionWriter::new_in(&sessions, "print a greeting").unwrap());
    let session_path = session.path().to_path_buf();
    let model = ScriptedModel::new(vec![Ok(code_reply("exit 2")), Ok(code_reply("echo ok"))]);
    let executor = executor(dir.path());
    let runner = LoopRunner::new(&model, &executor, logger()).with_session(session);

    runner.run(context(dir.path(), 10)).await.unwrap();

    let lines: Vec<serde_json::Value> = std::fs::read_to_string(session_path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0]["type"], "session_start");
    assert_eq!(lines[0]["model_provider"], "scripted");
    assert_eq!(lines[1]["status"], "execution_failed");
    assert_eq!(lines[1]["exit_code"], 2);
    assert_eq!(lines[2]["status"], "succeeded");
    assert_eq!(lines[3]["outcome"], "success");
    assert_eq!(lines[3]["attempts"], 2);
}

#[tokio::test]
async fn test_missing_interpreter_becomes_failed_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(Vec::new());
    let executor = ScriptExecutor::new(
        ExecutionConfig::new(dir.path().to_path_buf())
            .with_interpreter(PathBuf::from("definitely-not-an-interpreter-xyz")),
    );
    let runner = LoopRunner::new(&model, &executor, logger());

    let outcome = runner.run(context(dir.path(), 2)).await.unwrap();

    assert!(matches!(outcome, LoopOutcome::MaxAttemptsReached { attempts: 2, .. }));
    assert_eq!(outcome.history()[0].status, AttemptStatus::ExecutionError);
    assert!(model.prompts()[1].contains("definitely-not-an-interpreter-xyz"));
}
