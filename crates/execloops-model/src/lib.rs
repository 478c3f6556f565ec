//! # execloops-model
//!
//! Transports that turn a prompt into a model answer.
//!
//! ## Key Types
//!
//! - [`LanguageModel`] - The async trait the loop talks to
//! - [`AnthropicModel`] - Anthropic Messages API over HTTPS
//! - [`ClaudeCliModel`] - The local `claude` CLI in print mode
//! - [`StructuredAnswer`] - Splits `{"reasoning", "answer"}` replies

mod anthropic;
mod answer;
mod claude_cli;
mod traits;

pub use anthropic::{AnthropicModel, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use answer::{StructuredAnswer, STRUCTURED_SYSTEM_PROMPT};
pub use claude_cli::ClaudeCliModel;
pub use traits::{LanguageModel, ModelConfig, ModelError, ModelKind, ModelResponse, Usage};

/// Create a model by kind
pub fn create_model(
    kind: ModelKind,
    config: ModelConfig,
) -> Result<Box<dyn LanguageModel>, ModelError> {
    Ok(match kind {
        ModelKind::Anthropic => Box::new(AnthropicModel::new(config)?),
        ModelKind::ClaudeCli => Box::new(ClaudeCliModel::new(config)),
    })
}
