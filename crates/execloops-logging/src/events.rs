use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Type of output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Stdout,
    Stderr,
}

/// Structured log events for the auto-fix loop
///
/// Attempt numbers are 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    LoopStarted {
        prompt: String,
        working_dir: PathBuf,
        model: String,
        max_attempts: usize,
    },
    AttemptStarted {
        attempt: usize,
        max_attempts: usize,
        prompt_preview: String,
    },
    ModelResponded {
        attempt: usize,
        response: String,
        duration_secs: f64,
    },
    ModelFailed {
        attempt: usize,
        error: String,
    },
    CodeExtracted {
        attempt: usize,
        code_lines: usize,
        packages: Vec<String>,
    },
    ExtractionFailed {
        attempt: usize,
        error: String,
    },
    ScriptStarted {
        attempt: usize,
    },
    /// Streaming output line from the install step or the script
    ScriptStreamLine {
        attempt: usize,
        stream: StreamType,
        line: String,
    },
    ScriptCompleted {
        attempt: usize,
        status: String,
        exit_code: Option<i32>,
        duration_secs: f64,
    },
    ExecutionError {
        attempt: usize,
        error: String,
    },
    FixRequested {
        attempt: usize,
        next_attempt: usize,
    },
    LoopCompleted {
        attempts: usize,
        duration_secs: f64,
    },
    MaxAttemptsReached {
        attempts: usize,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for loop events - handles both console output and file logging
pub struct Logger {
    format: LogFormat,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            file_writer: Some(Mutex::new(file)),
        })
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                let _ = writeln!(file, "{}", json);
            }
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
        }
    }

    fn log_json(&self, event: &LogEvent) {
        let json = event.with_timestamp();
        let _ = writeln!(std::io::stderr(), "{}", json);
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        match event {
            LogEvent::LoopStarted {
                prompt,
                working_dir,
                model,
                max_attempts,
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╭─────────────────────────────────────────────────────────────────────╮"
                        .bright_blue()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {}{}",
                    "│".bright_blue(),
                    "execloops".bold().bright_white(),
                    " ".repeat(58) + &"│".bright_blue().to_string()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Prompt:".dimmed(),
                    Self::truncate_with_padding(prompt, 60, 68).dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Dir:".dimmed(),
                    Self::truncate_with_padding(&working_dir.display().to_string(), 63, 68)
                        .dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Model:".dimmed(),
                    Self::truncate_with_padding(
                        &format!("{} (max {} attempts)", model, max_attempts),
                        61,
                        68
                    )
                    .dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╰─────────────────────────────────────────────────────────────────────╯"
                        .bright_blue()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::AttemptStarted {
                attempt,
                max_attempts,
                ..
            } => {
                let header = format!("─ Attempt {}/{} ", attempt, max_attempts);
                let padding = "─".repeat(67usize.saturating_sub(header.chars().count()));
                let _ = writeln!(
                    stderr,
                    "{}{}{}",
                    "┌".bright_blue(),
                    header.bright_blue().bold(),
                    padding.bright_blue()
                );
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_cyan(),
                    "MODEL".bright_cyan().bold()
                );
            }
            LogEvent::ModelResponded {
                response,
                duration_secs,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "    {} {} chars ({:.1}s)",
                    "✓".bright_green(),
                    response.chars().count(),
                    duration_secs
                );
            }
            LogEvent::ModelFailed { error, .. } => {
                let _ = writeln!(stderr, "    {} {}", "✗".bright_red(), error.bright_red());
                let _ = writeln!(stderr);
            }
            LogEvent::CodeExtracted {
                code_lines,
                packages,
                ..
            } => {
                let deps = if packages.is_empty() {
                    "no dependencies".to_string()
                } else {
                    packages.join(", ")
                };
                let _ = writeln!(
                    stderr,
                    "    {} {} {} {}",
                    "📄".dimmed(),
                    code_lines,
                    if *code_lines == 1 { "line," } else { "lines," },
                    deps.dimmed()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::ExtractionFailed { error, .. } => {
                let _ = writeln!(
                    stderr,
                    "    {} {}",
                    "✗".bright_red(),
                    format!("Could not extract code: {}", error).bright_red()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::ScriptStarted { .. } => {
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_magenta(),
                    "SCRIPT".bright_magenta().bold()
                );
            }
            LogEvent::ScriptStreamLine { line, stream, .. } => {
                let prefix = "    │".dimmed();
                let styled_line = match stream {
                    StreamType::Stdout => line.normal(),
                    StreamType::Stderr => line.dimmed(),
                };
                let _ = writeln!(stderr, "{} {}", prefix, styled_line);
            }
            LogEvent::ScriptCompleted {
                status,
                exit_code,
                duration_secs,
                ..
            } => {
                if *exit_code == Some(0) {
                    let _ = writeln!(
                        stderr,
                        "    {} Done ({:.1}s)",
                        "✓".bright_green(),
                        duration_secs
                    );
                } else {
                    let _ = writeln!(
                        stderr,
                        "    {} {} ({:.1}s)",
                        "✗".bright_red(),
                        status,
                        duration_secs
                    );
                }
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    "└─────────────────────────────────────────────────────────────────────┘"
                        .bright_blue()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::ExecutionError { error, .. } => {
                let _ = writeln!(stderr, "    {} {}", "✗".bright_red(), error.bright_red());
                let _ = writeln!(stderr);
            }
            LogEvent::FixRequested { next_attempt, .. } => {
                let _ = writeln!(
                    stderr,
                    "{}",
                    format!("→ Preparing to fix errors for attempt {}", next_attempt)
                        .bright_yellow()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::LoopCompleted { .. } => {
                // The final outcome is printed by the binary
            }
            LogEvent::MaxAttemptsReached { attempts } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} Could not generate working code after {} attempts",
                    "⚠".bright_yellow(),
                    attempts
                );
            }
        }
    }

    fn log_compact(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::LoopStarted { max_attempts, .. } => {
                format!("[{}] loop:start max={}", timestamp, max_attempts)
            }
            LogEvent::AttemptStarted {
                attempt,
                max_attempts,
                ..
            } => format!("[{}] attempt:{}/{}", timestamp, attempt, max_attempts),
            LogEvent::ModelResponded {
                attempt,
                response,
                duration_secs,
            } => format!(
                "[{}] model:done:{} {}c {:.1}s",
                timestamp,
                attempt,
                response.len(),
                duration_secs
            ),
            LogEvent::ModelFailed { attempt, error } => {
                format!("[{}] model:error:{} {}", timestamp, attempt, error)
            }
            LogEvent::CodeExtracted {
                attempt,
                code_lines,
                packages,
            } => format!(
                "[{}] extract:{} {}l {}deps",
                timestamp,
                attempt,
                code_lines,
                packages.len()
            ),
            LogEvent::ExtractionFailed { attempt, error } => {
                format!("[{}] extract:error:{} {}", timestamp, attempt, error)
            }
            LogEvent::ScriptStarted { attempt } => {
                format!("[{}] script:start:{}", timestamp, attempt)
            }
            LogEvent::ScriptStreamLine { line, stream, .. } => {
                let stream_str = match stream {
                    StreamType::Stdout => "O",
                    StreamType::Stderr => "E",
                };
                format!("[{}] {}:{}", timestamp, stream_str, line)
            }
            LogEvent::ScriptCompleted {
                attempt,
                status,
                duration_secs,
                ..
            } => format!(
                "[{}] script:done:{} {} {:.1}s",
                timestamp, attempt, status, duration_secs
            ),
            LogEvent::ExecutionError { attempt, error } => {
                format!("[{}] script:error:{} {}", timestamp, attempt, error)
            }
            LogEvent::FixRequested { next_attempt, .. } => {
                format!("[{}] fix:{}", timestamp, next_attempt)
            }
            LogEvent::LoopCompleted {
                attempts,
                duration_secs,
            } => format!(
                "[{}] loop:done:{} {:.1}s",
                timestamp, attempts, duration_secs
            ),
            LogEvent::MaxAttemptsReached { attempts } => {
                format!("[{}] loop:limit:{}", timestamp, attempts)
            }
        };
        let _ = writeln!(stderr, "{}", msg);
    }

    /// Truncate a string and pad to exact width
    fn truncate_with_padding(s: &str, max_len: usize, total_width: usize) -> String {
        let char_count = s.chars().count();
        let truncated = if char_count > max_len {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{}...", kept)
        } else {
            s.to_string()
        };

        let padding_needed = total_width.saturating_sub(truncated.chars().count() + 1);
        format!("{}{}│", truncated, " ".repeat(padding_needed))
    }
}
