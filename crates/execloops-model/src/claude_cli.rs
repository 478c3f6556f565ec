use async_trait::async_trait;
use execloops_exec::{ProcessSpawner, SpawnConfig};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

use crate::answer::StructuredAnswer;
use crate::{LanguageModel, ModelConfig, ModelError, ModelResponse};

/// Model backed by the local `claude` CLI in print mode
pub struct ClaudeCliModel {
    binary_path: PathBuf,
    config: ModelConfig,
}

impl ClaudeCliModel {
    pub fn new(config: ModelConfig) -> Self {
        let binary_path = config
            .binary_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("claude"));
        Self {
            binary_path,
            config,
        }
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn build_args<'a>(&'a self, prompt: &'a str) -> Vec<&'a str> {
        // Non-interactive mode, output only
        let mut args = vec!["--print"];

        if let Some(ref model) = self.config.model_id {
            args.push("--model");
            args.push(model);
        }

        // Prompts starting with '-' must not be read as options
        args.push("--");
        args.push(prompt);
        args
    }
}

#[async_trait]
impl LanguageModel for ClaudeCliModel {
    fn name(&self) -> &str {
        "Claude CLI"
    }

    fn model_id(&self) -> &str {
        self.config.model_id.as_deref().unwrap_or("default")
    }

    async fn complete(&self, prompt: &str) -> Result<ModelResponse, ModelError> {
        debug!(
            model = self.name(),
            prompt_len = prompt.len(),
            "Running model CLI"
        );

        let start = Instant::now();
        let spawn_config = SpawnConfig::new(self.config.working_dir.clone())
            .with_timeout(self.config.request_timeout);

        let output =
            ProcessSpawner::spawn(&self.binary_path, &self.build_args(prompt), &spawn_config)
                .await
                .map_err(|e| ModelError::CliFailed(e.to_string()))?;

        if !output.success() {
            return Err(ModelError::CliFailed(format!(
                "exited with code {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }

        if output.stdout.trim().is_empty() {
            return Err(ModelError::EmptyAnswer);
        }

        let parsed = StructuredAnswer::parse(&output.stdout);
        Ok(ModelResponse {
            text: parsed.answer,
            reasoning: parsed.reasoning,
            usage: None,
            duration: start.elapsed(),
        })
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary_path)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_end_options_before_prompt() {
        let model = ClaudeCliModel::new(ModelConfig::default().with_model("sonnet".into()));
        assert_eq!(
            model.build_args("-rf everything"),
            vec!["--print", "--model", "sonnet", "--", "-rf everything"]
        );
    }

    #[cfg(unix)]
    fn fake_cli(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join(name);
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_complete_runs_cli_and_reports_failures() {
        let dir = tempfile::TempDir::new().unwrap();
        let ok = fake_cli(
            dir.path(),
            "fake-claude",
            "echo '<python_code>print(1)</python_code>'",
        );
        let failing = fake_cli(dir.path(), "failing-claude", "echo 'not logged in' >&2\nexit 2");

        let model = ClaudeCliModel::new(ModelConfig {
            binary_path: Some(ok),
            working_dir: dir.path().to_path_buf(),
            ..ModelConfig::default()
        });
        let response = model.complete("anything").await.unwrap();
        assert_eq!(response.text, "<python_code>print(1)</python_code>");
        assert!(response.usage.is_none());

        let model = ClaudeCliModel::new(ModelConfig {
            binary_path: Some(failing),
            working_dir: dir.path().to_path_buf(),
            ..ModelConfig::default()
        });
        match model.complete("anything").await {
            Err(ModelError::CliFailed(message)) => assert!(message.contains("not logged in")),
            other => panic!("expected CLI failure, got {:?}", other),
        }
    }
}
