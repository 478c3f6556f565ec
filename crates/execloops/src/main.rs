mod config;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use tracing::warn;

use config::ProjectConfig;
use execloops_core::{LoopContext, LoopOutcome, LoopRunner, DEFAULT_MAX_ATTEMPTS};
use execloops_exec::{ExecutionConfig, ScriptExecutor};
use execloops_logging::{init_tracing, LogFormat, Logger, SessionWriter};
use execloops_model::{create_model, ModelConfig, ModelKind};
use execloops_prompts::CodePrompts;

#[derive(Parser, Debug)]
#[command(
    name = "execloops",
    about = "Generate a script with an LLM, run it, and feed errors back until it works",
    version,
    author
)]
struct Cli {
    /// Task description (or reads from prompt.md if not provided)
    #[arg(short, long, env = "USER_PROMPT")]
    prompt: Option<String>,

    /// Path to prompt file (default: ./prompt.md)
    #[arg(long, default_value = "prompt.md")]
    prompt_file: PathBuf,

    /// Working directory for the generated files (default: current directory)
    #[arg(short = 'd', long)]
    working_dir: Option<PathBuf>,

    /// Model provider
    #[arg(long, value_enum)]
    provider: Option<ProviderChoice>,

    /// Model identifier
    #[arg(short, long, env = "MODEL_ID")]
    model: Option<String>,

    /// Sampling temperature
    #[arg(long, env = "TEMP")]
    temperature: Option<f32>,

    /// Maximum tokens per model reply
    #[arg(long, env = "MAX_TOKENS")]
    max_tokens: Option<u32>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide = true, hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_BASE_URL", hide = true)]
    base_url: Option<String>,

    /// Maximum attempts (default: 10)
    #[arg(short = 'n', long)]
    max_attempts: Option<usize>,

    /// File with the code-format instructions appended to the request
    #[arg(long)]
    template_file: Option<PathBuf>,

    /// Interpreter used to run the generated script (default: python3)
    #[arg(long)]
    interpreter: Option<PathBuf>,

    /// Time limit for each script run, e.g. "90s" or "5m"
    #[arg(long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormatChoice,

    /// Diagnostic log level (overridden by RUST_LOG)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Also append JSON events to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Output final result as JSON
    #[arg(long)]
    json_output: bool,

    /// Do not write a session record
    #[arg(long)]
    no_session: bool,

    /// Dry run: show what would happen without executing
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderChoice {
    Anthropic,
    ClaudeCli,
}

impl From<ProviderChoice> for ModelKind {
    fn from(choice: ProviderChoice) -> Self {
        match choice {
            ProviderChoice::Anthropic => ModelKind::Anthropic,
            ProviderChoice::ClaudeCli => ModelKind::ClaudeCli,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

fn parse_duration(s: &str) -> Result<Duration, humantime_serde::re::humantime::DurationError> {
    humantime_serde::re::humantime::parse_duration(s)
}

/// Everything needed to run the loop, after merging CLI, env, and file
struct RunSettings {
    working_dir: PathBuf,
    request: String,
    template: String,
    provider: ModelKind,
    model: ModelConfig,
    execution: ExecutionConfig,
    max_attempts: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_format: LogFormat = cli.log_format.into();
    init_tracing(&cli.log_level, log_format);

    let working_dir = match cli.working_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let project = ProjectConfig::load(&working_dir)?.unwrap_or_default();
    let settings = resolve_settings(&cli, working_dir, project)?;

    if cli.dry_run {
        print_dry_run(&settings);
        return Ok(());
    }

    let executor = ScriptExecutor::new(settings.execution.clone());
    if !executor.is_available().await {
        anyhow::bail!(
            "Interpreter '{}' is not available. Make sure it's installed and in PATH.",
            settings.execution.interpreter.display()
        );
    }

    let model = create_model(settings.provider, settings.model.clone())
        .with_context(|| format!("Failed to set up {} model", settings.provider))?;
    if !model.is_available().await {
        match settings.provider {
            ModelKind::Anthropic => anyhow::bail!("ANTHROPIC_API_KEY environment variable is not set"),
            ModelKind::ClaudeCli => anyhow::bail!(
                "Model provider '{}' is not available. Make sure the claude CLI is installed and in PATH.",
                model.name()
            ),
        }
    }

    let logger = match &cli.log_file {
        Some(path) => Logger::with_file(log_format, path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?,
        None => Logger::new(log_format),
    };

    let context = LoopContext::new(settings.request.clone(), settings.working_dir.clone())
        .with_template(settings.template.clone())
        .with_max_attempts(settings.max_attempts);

    let mut runner = LoopRunner::new(model.as_ref(), &executor, Arc::new(logger));
    if !cli.no_session {
        match SessionWriter::new(&settings.request) {
            Ok(session) => {
                eprintln!("Session: {}", session.path().display());
                runner = runner.with_session(Arc::new(session));
            }
            Err(e) => warn!(error = %e, "Could not create session file"),
        }
    }

    // Handle Ctrl+C gracefully
    let interrupt_handle = runner.interrupt_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Finishing current attempt...");
        interrupt_handle.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let outcome = runner.run(context).await?;

    if cli.json_output {
        let json = serde_json::to_string_pretty(&outcome)?;
        println!("{}", json);
    } else {
        print_outcome(&outcome);
    }

    std::process::exit(outcome.exit_code());
}

/// Merge CLI flags (and their env fallbacks) over the project file over defaults
fn resolve_settings(cli: &Cli, working_dir: PathBuf, project: ProjectConfig) -> Result<RunSettings> {
    let request = get_prompt(cli, &working_dir)?;

    let template = match cli
        .template_file
        .as_ref()
        .or(project.loop_.template_file.as_ref())
    {
        Some(path) => {
            let path = resolve_path(&working_dir, path);
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template file {}", path.display()))?
        }
        None => CodePrompts::default_template().to_string(),
    };

    let provider = match (cli.provider, project.model.provider.as_deref()) {
        (Some(choice), _) => choice.into(),
        (None, Some(name)) => name.parse::<ModelKind>().map_err(anyhow::Error::msg)?,
        (None, None) => ModelKind::Anthropic,
    };

    let mut model = ModelConfig::default().with_working_dir(working_dir.clone());
    if let Some(id) = cli.model.clone().or(project.model.id) {
        model = model.with_model(id);
    }
    if let Some(temperature) = cli.temperature.or(project.model.temperature) {
        model = model.with_temperature(temperature);
    }
    if let Some(max_tokens) = cli.max_tokens.or(project.model.max_tokens) {
        model = model.with_max_tokens(max_tokens);
    }
    if let Some(key) = cli.api_key.clone() {
        model = model.with_api_key(key);
    }
    if let Some(url) = cli.base_url.clone().or(project.model.base_url) {
        model = model.with_base_url(url);
    }
    if let Some(timeout) = project.model.request_timeout {
        model = model.with_request_timeout(timeout);
    }

    let mut execution = ExecutionConfig::new(working_dir.clone());
    if let Some(interpreter) = cli.interpreter.clone().or(project.execution.interpreter) {
        execution = execution.with_interpreter(interpreter);
    }
    if let Some(command) = project.execution.install_command {
        execution = execution.with_install_command(command);
    }
    if let Some(timeout) = cli.timeout.or(project.execution.timeout) {
        execution = execution.with_timeout(timeout);
    }
    if let Some(name) = project.execution.script_name {
        execution = execution.with_script_name(name);
    }
    if let Some(name) = project.execution.requirements_name {
        execution = execution.with_requirements_name(name);
    }

    let max_attempts = cli
        .max_attempts
        .or(project.loop_.max_attempts)
        .unwrap_or(DEFAULT_MAX_ATTEMPTS);
    if max_attempts == 0 {
        anyhow::bail!("Maximum attempts must be at least 1");
    }

    Ok(RunSettings {
        working_dir,
        request,
        template,
        provider,
        model,
        execution,
        max_attempts,
    })
}

fn resolve_path(working_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

fn get_prompt(cli: &Cli, working_dir: &Path) -> Result<String> {
    // Prefer --prompt flag (or USER_PROMPT)
    if let Some(prompt) = cli.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        return Ok(prompt.to_string());
    }

    let prompt_path = resolve_path(working_dir, &cli.prompt_file);
    if prompt_path.exists() {
        let content =
            std::fs::read_to_string(&prompt_path).context("Failed to read prompt file")?;
        let content = content.trim();
        if content.is_empty() {
            anyhow::bail!("Prompt file {} is empty", prompt_path.display());
        }
        Ok(content.to_string())
    } else {
        anyhow::bail!(
            "USER_PROMPT environment variable is not set. Set it, use --prompt, or create a {} file",
            cli.prompt_file.display()
        )
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

fn print_dry_run(settings: &RunSettings) {
    let initial_prompt = CodePrompts::initial_prompt(&settings.request, &settings.template);
    println!("=== Dry Run ===");
    println!("Request: {}", preview(&settings.request, 100));
    println!("Working dir: {}", settings.working_dir.display());
    println!("Provider: {}", settings.provider);
    println!(
        "Model: {}",
        settings
            .model
            .model_id
            .as_deref()
            .unwrap_or("(provider default)")
    );
    println!("Max attempts: {}", settings.max_attempts);
    println!("Interpreter: {}", settings.execution.interpreter.display());
    println!("Install command: {}", settings.execution.install_argv().join(" "));
    println!("Script: {}", settings.execution.script_path().display());
    println!("Timeout: {}s", settings.execution.timeout.as_secs());
    println!("Initial prompt: {}", preview(&initial_prompt, 200));
}

fn print_outcome(outcome: &LoopOutcome) {
    match outcome {
        LoopOutcome::Success {
            attempts,
            code,
            script_path,
            total_duration_secs,
            ..
        } => {
            eprintln!();
            eprintln!("{}", "=== SUCCESS ===".green().bold());
            eprintln!("Attempts: {}", attempts);
            eprintln!("Duration: {:.1}s", total_duration_secs);
            eprintln!("Script: {}", script_path.display());
            eprintln!("Final working code:");
            println!("{}", code);
        }
        LoopOutcome::MaxAttemptsReached {
            attempts,
            total_duration_secs,
            ..
        } => {
            eprintln!();
            eprintln!("{}", "=== FAILED ===".red().bold());
            eprintln!("Failed to generate working code after {} attempts", attempts);
            eprintln!("Duration: {:.1}s", total_duration_secs);
        }
        LoopOutcome::UserInterrupted {
            attempts,
            total_duration_secs,
            ..
        } => {
            eprintln!();
            eprintln!("{}", "=== INTERRUPTED ===".yellow().bold());
            eprintln!("User stopped after {} attempt(s)", attempts);
            eprintln!("Duration: {:.1}s", total_duration_secs);
        }
    }
}
