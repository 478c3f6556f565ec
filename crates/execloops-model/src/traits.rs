use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while asking a model for a completion
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Missing API key (set ANTHROPIC_API_KEY)")]
    MissingApiKey,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Rate limited by the model provider")]
    RateLimited,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse model response: {0}")]
    Parse(String),

    #[error("Model returned an empty answer")]
    EmptyAnswer,

    #[error("Model CLI failed: {0}")]
    CliFailed(String),

    #[error("Model configuration error: {0}")]
    ConfigError(String),
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A completed model call
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// The answer text that should contain the code blocks
    pub text: String,
    /// Reasoning the model gave alongside its answer, if any
    pub reasoning: Option<String>,
    pub usage: Option<Usage>,
    pub duration: Duration,
}

/// Configuration shared by all model transports
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Model identifier (provider default when None)
    pub model_id: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    /// Ask for a JSON object with `reasoning` and `answer` fields
    pub structured_answers: bool,
    /// Binary used by CLI-backed models
    pub binary_path: Option<PathBuf>,
    /// Working directory for CLI-backed models
    pub working_dir: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: None,
            api_key: None,
            base_url: None,
            temperature: None,
            max_tokens: 8192,
            request_timeout: Duration::from_secs(300),
            structured_answers: true,
            binary_path: None,
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl ModelConfig {
    pub fn with_model(mut self, model: String) -> Self {
        self.model_id = Some(model);
        self
    }

    pub fn with_api_key(mut self, key: String) -> Self {
        self.api_key = Some(key);
        self
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_structured_answers(mut self, enabled: bool) -> Self {
        self.structured_answers = enabled;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }
}

/// Supported model transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Anthropic Messages API over HTTPS
    Anthropic,
    /// Local `claude` CLI in print mode
    ClaudeCli,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Anthropic => write!(f, "anthropic"),
            ModelKind::ClaudeCli => write!(f, "claude-cli"),
        }
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "api" => Ok(ModelKind::Anthropic),
            "claude-cli" | "claude" | "cli" => Ok(ModelKind::ClaudeCli),
            _ => Err(format!("Unknown model provider: {}", s)),
        }
    }
}

/// The core abstraction over hosted code-generating models
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Human-readable name of the transport
    fn name(&self) -> &str;

    /// Model identifier sent to the provider
    fn model_id(&self) -> &str;

    /// Send a single-turn prompt and return the answer
    async fn complete(&self, prompt: &str) -> Result<ModelResponse, ModelError>;

    /// Check if the model can be reached with the current configuration
    async fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_round_trips_through_display() {
        for kind in [ModelKind::Anthropic, ModelKind::ClaudeCli] {
            assert_eq!(kind.to_string().parse::<ModelKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_model_kind_aliases() {
        assert_eq!("CLAUDE".parse::<ModelKind>(), Ok(ModelKind::ClaudeCli));
        assert_eq!("api".parse::<ModelKind>(), Ok(ModelKind::Anthropic));
        assert!("bedrock".parse::<ModelKind>().is_err());
    }
}
