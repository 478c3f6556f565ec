//! Anthropic Messages API transport

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use crate::answer::{StructuredAnswer, STRUCTURED_SYSTEM_PROMPT};
use crate::{LanguageModel, ModelConfig, ModelError, ModelResponse, Usage};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude over HTTPS
pub struct AnthropicModel {
    client: Client,
    config: ModelConfig,
}

impl AnthropicModel {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ModelError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    fn build_request<'a>(&'a self, prompt: &'a str) -> MessagesRequest<'a> {
        MessagesRequest {
            model: self.model_id(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: self
                .config
                .structured_answers
                .then_some(STRUCTURED_SYSTEM_PROMPT),
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        }
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    fn name(&self) -> &str {
        "Anthropic"
    }

    fn model_id(&self) -> &str {
        self.config.model_id.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    async fn complete(&self, prompt: &str) -> Result<ModelResponse, ModelError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ModelError::MissingApiKey)?;

        let start = Instant::now();
        debug!(
            model = self.model_id(),
            prompt_len = prompt.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(format!("{}/messages", self.base_url()))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&self.build_request(prompt))
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => ModelError::AuthenticationFailed,
                429 => ModelError::RateLimited,
                code => ModelError::Api {
                    status: code,
                    message,
                },
            });
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;

        let text: String = body
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect();

        if text.trim().is_empty() {
            return Err(ModelError::EmptyAnswer);
        }

        let duration = start.elapsed();
        info!(
            model = %body.model,
            input_tokens = body.usage.input_tokens,
            output_tokens = body.usage.output_tokens,
            stop_reason = body.stop_reason.as_deref().unwrap_or("unknown"),
            duration_secs = duration.as_secs_f64(),
            "Model responded"
        );

        let parsed = if self.config.structured_answers {
            StructuredAnswer::parse(&text)
        } else {
            StructuredAnswer {
                answer: text,
                reasoning: None,
            }
        };

        Ok(ModelResponse {
            text: parsed.answer,
            reasoning: parsed.reasoning,
            usage: Some(body.usage),
            duration,
        })
    }

    async fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one HTTP response and hand back the raw request
    async fn serve_once(status_line: &'static str, body: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }
            let reply = format!(
                "{}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });

        (format!("http://{}", addr), handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        request.len() >= header_end + 4 + content_length
    }

    fn config_for(base_url: String) -> ModelConfig {
        ModelConfig::default()
            .with_api_key("test-key".into())
            .with_base_url(base_url)
            .with_model("claude-test".into())
            .with_temperature(0.2)
    }

    #[tokio::test]
    async fn test_complete_sends_messages_request_and_unwraps_answer() {
        let body = serde_json::json!({
            "id": "msg_1",
            "model": "claude-test",
            "content": [{
                "type": "text",
                "text": "{\"reasoning\": \"simple\", \"answer\": \"<python_code>print(1)</python_code>\"}"
            }],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 34}
        })
        .to_string();
        let (url, server) = serve_once("HTTP/1.1 200 OK", body).await;

        let model = AnthropicModel::new(config_for(url)).unwrap();
        let response = model.complete("write hello world").await.unwrap();

        assert_eq!(response.text, "<python_code>print(1)</python_code>");
        assert_eq!(response.reasoning.as_deref(), Some("simple"));
        assert_eq!(
            response.usage,
            Some(Usage {
                input_tokens: 12,
                output_tokens: 34
            })
        );

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /messages "));
        assert!(request.to_lowercase().contains("x-api-key: test-key"));
        assert!(request.to_lowercase().contains("anthropic-version: 2023-06-01"));
        assert!(request.contains("\"model\":\"claude-test\""));
        assert!(request.contains("write hello world"));
        assert!(request.contains("\"system\""));
    }

    #[tokio::test]
    async fn test_complete_maps_rate_limit() {
        let (url, _server) =
            serve_once("HTTP/1.1 429 Too Many Requests", "{}".to_string()).await;
        let model = AnthropicModel::new(config_for(url)).unwrap();

        let result = model.complete("anything").await;
        assert!(matches!(result, Err(ModelError::RateLimited)));
    }

    #[tokio::test]
    async fn test_complete_maps_server_error() {
        let (url, _server) = serve_once(
            "HTTP/1.1 500 Internal Server Error",
            "{\"error\":\"overloaded\"}".to_string(),
        )
        .await;
        let model = AnthropicModel::new(config_for(url)).unwrap();

        match model.complete("anything").await {
            Err(ModelError::Api { status, message }) => {
                assert_eq!(status, 500);
                assert!(message.contains("overloaded"));
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_rejects_empty_answer() {
        let body = serde_json::json!({
            "model": "claude-test",
            "content": [],
            "usage": {"input_tokens": 1, "output_tokens": 0}
        })
        .to_string();
        let (url, _server) = serve_once("HTTP/1.1 200 OK", body).await;
        let model = AnthropicModel::new(config_for(url)).unwrap();

        assert!(matches!(
            model.complete("anything").await,
            Err(ModelError::EmptyAnswer)
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let model = AnthropicModel::new(ModelConfig::default()).unwrap();
        assert!(!model.is_available().await);
        assert!(matches!(
            model.complete("anything").await,
            Err(ModelError::MissingApiKey)
        ));
    }

    #[test]
    fn test_request_omits_system_prompt_when_unstructured() {
        let model = AnthropicModel::new(
            ModelConfig::default().with_structured_answers(false),
        )
        .unwrap();
        let json = serde_json::to_value(model.build_request("hi")).unwrap();
        assert!(json.get("system").is_none());
        assert!(json.get("temperature").is_none());
        assert_eq!(json["model"], DEFAULT_MODEL);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
    }
}
