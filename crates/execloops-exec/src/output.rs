use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Which stream a captured line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    Stdout,
    Stderr,
}

/// Callback invoked for every line a child process prints
pub type OutputCallback = Arc<dyn Fn(&str, OutputType) + Send + Sync>;

/// Output captured from a finished process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// Combined stdout output
    pub stdout: String,
    /// Combined stderr output
    pub stderr: String,
    /// Exit code from the process (-1 when killed by a signal)
    pub exit_code: i32,
    /// Duration of execution
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn new(stdout: String, stderr: String, exit_code: i32, duration: Duration) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            duration,
        }
    }

    /// Check if the process exited successfully
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get combined output (stdout + stderr)
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n\n--- stderr ---\n{}", self.stdout, self.stderr)
        }
    }

    pub fn stdout_lines(&self) -> usize {
        self.stdout.lines().count()
    }

    pub fn stderr_lines(&self) -> usize {
        self.stderr.lines().count()
    }
}

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output_joins_streams() {
        let output = ProcessOutput::new(
            "hello".into(),
            "oops".into(),
            1,
            Duration::from_millis(5),
        );
        assert_eq!(output.combined_output(), "hello\n\n--- stderr ---\noops");
        assert!(!output.success());
    }

    #[test]
    fn test_combined_output_single_stream() {
        let output = ProcessOutput::new("a\nb".into(), String::new(), 0, Duration::ZERO);
        assert_eq!(output.combined_output(), "a\nb");
        assert_eq!(output.stdout_lines(), 2);
        assert_eq!(output.stderr_lines(), 0);
    }
}
