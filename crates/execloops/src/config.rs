//! Project configuration file support for execloops.
//!
//! Loads configuration from `execloops.toml` in the working directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project-level configuration loaded from `execloops.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default, rename = "loop")]
    pub loop_: LoopSection,
    #[serde(default)]
    pub execution: ExecutionSection,
}

/// `[model]`: which model answers and how it is called
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ModelSection {
    /// `anthropic` or `claude-cli`
    pub provider: Option<String>,
    pub id: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub base_url: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

/// `[loop]`: attempt budget and prompt template
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LoopSection {
    pub max_attempts: Option<usize>,
    /// Relative paths resolve against the working directory
    pub template_file: Option<PathBuf>,
}

/// `[execution]`: how generated scripts are installed and run
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ExecutionSection {
    pub interpreter: Option<PathBuf>,
    /// Install argv; the requirements path is appended as the last argument
    pub install_command: Option<Vec<String>>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub script_name: Option<String>,
    pub requirements_name: Option<String>,
}

/// The config file name
pub const CONFIG_FILE_NAME: &str = "execloops.toml";

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Some(config))
    }
}
