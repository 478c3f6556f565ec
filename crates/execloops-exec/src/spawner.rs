use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, trace, warn};

use crate::{ExecError, OutputCallback, OutputType, ProcessOutput};

/// Where and how a child process runs
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub working_dir: PathBuf,
    /// Optional timeout (None = no limit)
    pub timeout: Option<Duration>,
    /// Additional environment variables
    pub env_vars: HashMap<String, String>,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            timeout: None,
            env_vars: HashMap::new(),
        }
    }
}

impl SpawnConfig {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_env(mut self, key: String, value: String) -> Self {
        self.env_vars.insert(key, value);
        self
    }
}

/// Utility for spawning child processes
pub struct ProcessSpawner;

impl ProcessSpawner {
    /// Spawn a process and capture its output
    pub async fn spawn<S: AsRef<OsStr>>(
        program: &Path,
        args: &[S],
        config: &SpawnConfig,
    ) -> Result<ProcessOutput, ExecError> {
        Self::spawn_with_callback(program, args, config, None).await
    }

    /// Spawn a process, stream each output line to `on_output`, and capture the output.
    ///
    /// When the configured timeout elapses the child is killed and
    /// [`ExecError::Timeout`] is returned.
    pub async fn spawn_with_callback<S: AsRef<OsStr>>(
        program: &Path,
        args: &[S],
        config: &SpawnConfig,
        on_output: Option<OutputCallback>,
    ) -> Result<ProcessOutput, ExecError> {
        let start = Instant::now();

        debug!(
            program = %program.display(),
            args = ?args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()).collect::<Vec<_>>(),
            working_dir = %config.working_dir.display(),
            "Spawning process"
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&config.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        for (key, value) in &config.env_vars {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| ExecError::SpawnFailed {
            program: program.display().to_string(),
            source,
        })?;

        let run = Self::wait_with_output(&mut child, on_output.as_ref());

        let (stdout, stderr, status) = match config.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await.ok() {
                Some(result) => result?,
                None => {
                    warn!(
                        program = %program.display(),
                        timeout_secs = limit.as_secs_f64(),
                        "Process timed out, killing it"
                    );
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill timed out process");
                    }
                    return Err(ExecError::Timeout(limit));
                }
            },
            None => run.await?,
        };

        let duration = start.elapsed();
        let exit_code = status.code().unwrap_or(-1);

        debug!(
            exit_code,
            duration_ms = duration.as_millis(),
            "Process completed"
        );

        Ok(ProcessOutput::new(stdout, stderr, exit_code, duration))
    }

    async fn wait_with_output(
        child: &mut Child,
        on_output: Option<&OutputCallback>,
    ) -> Result<(String, String, ExitStatus), ExecError> {
        let stdout_handle = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
        let stderr_handle = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr not captured"))?;

        let (stdout, stderr) = Self::read_streams(stdout_handle, stderr_handle, on_output).await;
        let status = child.wait().await?;
        Ok((stdout, stderr, status))
    }

    /// Read both streams concurrently until both are closed
    ///
    /// Lines are read as raw bytes and decoded lossily, so output that is not
    /// valid UTF-8 never ends the read early.
    async fn read_streams<O, E>(
        stdout_handle: O,
        stderr_handle: E,
        on_output: Option<&OutputCallback>,
    ) -> (String, String)
    where
        O: AsyncRead + Unpin,
        E: AsyncRead + Unpin,
    {
        let mut stdout_reader = BufReader::new(stdout_handle);
        let mut stderr_reader = BufReader::new(stderr_handle);
        let mut stdout_pending = Vec::new();
        let mut stderr_pending = Vec::new();

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut stdout_open = true;
        let mut stderr_open = true;

        while stdout_open || stderr_open {
            tokio::select! {
                biased;

                result = stdout_reader.read_until(b'\n', &mut stdout_pending), if stdout_open => {
                    stdout_open = take_line(
                        result,
                        &mut stdout_pending,
                        &mut stdout,
                        OutputType::Stdout,
                        on_output,
                    );
                }
                result = stderr_reader.read_until(b'\n', &mut stderr_pending), if stderr_open => {
                    stderr_open = take_line(
                        result,
                        &mut stderr_pending,
                        &mut stderr,
                        OutputType::Stderr,
                        on_output,
                    );
                }
            }
        }

        (stdout, stderr)
    }
}

/// Consume one `read_until` result; returns whether the stream is still open
///
/// Bytes left in `pending` by a cancelled read are flushed when the stream closes.
fn take_line(
    result: std::io::Result<usize>,
    pending: &mut Vec<u8>,
    buffer: &mut String,
    output_type: OutputType,
    on_output: Option<&OutputCallback>,
) -> bool {
    let open = match result {
        Ok(0) => false,
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, stream = ?output_type, "Failed to read process output");
            false
        }
    };

    if !pending.is_empty() {
        let line = decode_line(pending);
        pending.clear();
        trace!(line = %line, stream = ?output_type, "output");
        push_line(buffer, &line);
        if let Some(cb) = on_output {
            cb(&line, output_type);
        }
    }

    open
}

/// Strip the line ending and decode, replacing invalid UTF-8
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn push_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(line);
}
