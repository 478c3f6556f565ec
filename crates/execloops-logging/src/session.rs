use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Represents each line type in the session JSONL file.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionLine<'a> {
    SessionStart {
        timestamp: DateTime<Utc>,
        prompt: &'a str,
        working_dir: &'a Path,
        model_provider: &'a str,
        model_id: &'a str,
        max_attempts: usize,
    },
    Attempt(AttemptEntry<'a>),
    SessionEnd {
        outcome: &'a str,
        attempts: usize,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },
}

/// One generate/execute attempt as recorded in the session file
#[derive(Debug, Clone, Serialize)]
pub struct AttemptEntry<'a> {
    pub attempt: usize,
    pub status: &'a str,
    pub code: Option<&'a str>,
    pub requirements: Option<&'a str>,
    pub stdout: &'a str,
    pub stderr: &'a str,
    pub exit_code: Option<i32>,
    pub model_duration_secs: f64,
    pub execution_duration_secs: f64,
    pub timestamp: DateTime<Utc>,
}

/// Writes session data as JSONL to a file in ~/.local/share/execloops/sessions/.
pub struct SessionWriter {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl SessionWriter {
    /// Create a SessionWriter in the default sessions directory.
    pub fn new(prompt: &str) -> io::Result<Self> {
        Self::new_in(&Self::sessions_dir()?, prompt)
    }

    /// Create a SessionWriter in `sessions_dir`. The file name is the current
    /// UTC timestamp plus a short hash of the prompt.
    pub fn new_in(sessions_dir: &Path, prompt: &str) -> io::Result<Self> {
        fs::create_dir_all(sessions_dir)?;

        let timestamp_str = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();

        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        let hash = hex::encode(hasher.finalize());
        let short_hash = &hash[..6];

        let path = sessions_dir.join(format!("{}_{}.jsonl", timestamp_str, short_hash));
        let file = File::create(&path)?;

        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    /// Returns the path to the session file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_start(
        &self,
        prompt: &str,
        working_dir: &Path,
        model_provider: &str,
        model_id: &str,
        max_attempts: usize,
    ) {
        self.write_line(&SessionLine::SessionStart {
            timestamp: Utc::now(),
            prompt,
            working_dir,
            model_provider,
            model_id,
            max_attempts,
        });
    }

    pub fn write_attempt(&self, entry: AttemptEntry<'_>) {
        self.write_line(&SessionLine::Attempt(entry));
    }

    pub fn write_end(&self, outcome: &str, attempts: usize, duration_secs: f64) {
        self.write_line(&SessionLine::SessionEnd {
            outcome,
            attempts,
            duration_secs,
            timestamp: Utc::now(),
        });
    }

    fn write_line(&self, line: &SessionLine<'_>) {
        if let Ok(json) = serde_json::to_string(line) {
            if let Ok(mut writer) = self.file.lock() {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
    }

    fn sessions_dir() -> io::Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine data directory",
            )
        })?;
        Ok(data_dir.join("execloops").join("sessions"))
    }
}
