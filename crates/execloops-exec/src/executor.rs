use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{info, warn};

use crate::output::duration_secs;
use crate::{ExecError, OutputCallback, ProcessSpawner, SpawnConfig};

/// Default file the generated code is written to
pub const DEFAULT_SCRIPT_NAME: &str = "generated_script.py";
/// Default file the generated dependency list is written to
pub const DEFAULT_REQUIREMENTS_NAME: &str = "requirements.txt";
/// Default limit on a single script run
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Message reported on stderr when a script exceeds its time limit
pub const TIMEOUT_MESSAGE: &str = "Script execution timed out";

/// Settings for writing and running generated scripts
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Directory the files are written to and the script runs in
    pub working_dir: PathBuf,
    /// Interpreter used to run the script
    pub interpreter: PathBuf,
    /// Install command; the requirements path is appended as the last argument.
    /// `None` means `<interpreter> -m pip install -r`.
    pub install_command: Option<Vec<String>>,
    pub script_name: String,
    pub requirements_name: String,
    /// Limit on the script run (dependency installation is not limited)
    pub timeout: Duration,
    /// Additional environment variables for the install and the script
    pub env_vars: HashMap<String, String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            interpreter: PathBuf::from("python3"),
            install_command: None,
            script_name: DEFAULT_SCRIPT_NAME.to_string(),
            requirements_name: DEFAULT_REQUIREMENTS_NAME.to_string(),
            timeout: DEFAULT_TIMEOUT,
            env_vars: HashMap::new(),
        }
    }
}

impl ExecutionConfig {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            ..Default::default()
        }
    }

    pub fn with_interpreter(mut self, interpreter: PathBuf) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_install_command(mut self, command: Vec<String>) -> Self {
        self.install_command = Some(command);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = name.into();
        self
    }

    pub fn with_requirements_name(mut self, name: impl Into<String>) -> Self {
        self.requirements_name = name.into();
        self
    }

    pub fn with_env(mut self, key: String, value: String) -> Self {
        self.env_vars.insert(key, value);
        self
    }

    pub fn script_path(&self) -> PathBuf {
        self.working_dir.join(&self.script_name)
    }

    pub fn requirements_path(&self) -> PathBuf {
        self.working_dir.join(&self.requirements_name)
    }

    /// Full install command line, requirements path included
    pub fn install_argv(&self) -> Vec<String> {
        let mut argv = match &self.install_command {
            Some(command) => command.clone(),
            None => vec![
                self.interpreter.display().to_string(),
                "-m".into(),
                "pip".into(),
                "install".into(),
                "-r".into(),
            ],
        };
        argv.push(self.requirements_path().display().to_string());
        argv
    }

    fn spawn_config(&self, timeout: Option<Duration>) -> SpawnConfig {
        SpawnConfig {
            working_dir: self.working_dir.clone(),
            timeout,
            env_vars: self.env_vars.clone(),
        }
    }
}

/// How a script run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Succeeded,
    Failed { exit_code: i32 },
    TimedOut,
    InstallFailed { exit_code: i32 },
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Succeeded => write!(f, "succeeded"),
            ExecutionStatus::Failed { exit_code } => write!(f, "failed (exit {})", exit_code),
            ExecutionStatus::TimedOut => write!(f, "timed out"),
            ExecutionStatus::InstallFailed { exit_code } => {
                write!(f, "install failed (exit {})", exit_code)
            }
        }
    }
}

/// Formats captured output the way it is handed back to the model
pub fn format_error_feedback(stdout: &str, stderr: &str) -> String {
    format!("STDOUT: {}\nSTDERR: {}", stdout, stderr)
}

/// Result of saving, installing, and running a generated script
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    pub fn timed_out(duration: Duration) -> Self {
        Self {
            status: ExecutionStatus::TimedOut,
            stdout: String::new(),
            stderr: TIMEOUT_MESSAGE.to_string(),
            duration,
        }
    }

    /// Exit code of the failing step, if the failure had one
    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            ExecutionStatus::Succeeded => Some(0),
            ExecutionStatus::Failed { exit_code } => Some(exit_code),
            ExecutionStatus::InstallFailed { exit_code } => Some(exit_code),
            ExecutionStatus::TimedOut => None,
        }
    }

    /// Error text handed back to the model when the run failed
    pub fn error_feedback(&self) -> String {
        format_error_feedback(&self.stdout, &self.stderr)
    }
}

/// Writes generated code to disk, installs its dependencies, and runs it
pub struct ScriptExecutor {
    config: ExecutionConfig,
}

impl ScriptExecutor {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Check if the interpreter is available on the system
    pub async fn is_available(&self) -> bool {
        Command::new(&self.config.interpreter)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Save both files, install the requirements if any, and run the script.
    ///
    /// A non-zero exit, a failed install, or a timeout is reported through
    /// [`ExecutionStatus`]; `Err` is reserved for failures to write the files
    /// or to start a process.
    pub async fn save_and_execute(
        &self,
        code: &str,
        requirements: &str,
        on_output: Option<OutputCallback>,
    ) -> Result<ExecutionReport, ExecError> {
        let start = Instant::now();

        let script_path = self.config.script_path();
        write_file(&script_path, code).await?;
        info!(path = %script_path.display(), "Script saved");

        let requirements_path = self.config.requirements_path();
        write_file(&requirements_path, requirements).await?;
        info!(path = %requirements_path.display(), "Requirements saved");

        if !requirements.trim().is_empty() {
            info!("Installing necessary libraries");
            if matches!(&self.config.install_command, Some(command) if command.is_empty()) {
                return Err(ExecError::EmptyInstallCommand);
            }
            let argv = self.config.install_argv();
            let (program, args) = argv.split_first().ok_or(ExecError::EmptyInstallCommand)?;
            let install = ProcessSpawner::spawn_with_callback(
                Path::new(program),
                args,
                &self.config.spawn_config(None),
                on_output.clone(),
            )
            .await?;

            if !install.success() {
                warn!(exit_code = install.exit_code, "Dependency installation failed");
                return Ok(ExecutionReport {
                    status: ExecutionStatus::InstallFailed {
                        exit_code: install.exit_code,
                    },
                    stdout: install.stdout,
                    stderr: install.stderr,
                    duration: start.elapsed(),
                });
            }
        }

        info!(interpreter = %self.config.interpreter.display(), "Executing generated script");
        let run = ProcessSpawner::spawn_with_callback(
            &self.config.interpreter,
            &[script_path.as_os_str()],
            &self.config.spawn_config(Some(self.config.timeout)),
            on_output,
        )
        .await;

        let output = match run {
            Ok(output) => output,
            Err(ExecError::Timeout(limit)) => {
                warn!(timeout_secs = limit.as_secs(), "Script execution timed out");
                return Ok(ExecutionReport::timed_out(start.elapsed()));
            }
            Err(e) => return Err(e),
        };

        if !output.stdout.is_empty() {
            info!(stdout = %output.stdout, "Script output");
        }
        if !output.stderr.is_empty() {
            info!(stderr = %output.stderr, "Script errors");
        }

        let status = if output.success() {
            info!("Script executed successfully");
            ExecutionStatus::Succeeded
        } else {
            warn!(exit_code = output.exit_code, "Script failed");
            ExecutionStatus::Failed {
                exit_code: output.exit_code,
            }
        };

        Ok(ExecutionReport {
            status,
            stdout: output.stdout,
            stderr: output.stderr,
            duration: start.elapsed(),
        })
    }
}

async fn write_file(path: &Path, contents: &str) -> Result<(), ExecError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| ExecError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })
}
