// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Inference boundary for LLM-as-judge
//!
//! Judges only ever talk to an [`InferenceEngine`]: a batched
//! `infer(prompts) -> texts` call. Parallelism, rate limiting and
//! backpressure live behind that call. Concrete chat clients implement the
//! single-prompt [`LLMClient`] trait and get batching for free.

use crate::cache::CachedInference;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rubricjudge_core::{InferenceSettings, Provider, RubricError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Constraint key carrying the JSON schema the output must satisfy
pub const JSON_SCHEMA_CONSTRAINT: &str = "json_schema";
/// Constraint key overriding the sampling temperature
pub const TEMPERATURE_CONSTRAINT: &str = "temperature";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One prompt: a conversation plus generation constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub constraints: Map<String, Value>,
}

impl Prompt {
    /// Single user turn
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::new(Role::User, content)],
            constraints: Map::new(),
        }
    }

    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            constraints: Map::new(),
        }
    }

    /// Prepend a system turn
    pub fn with_system(mut self, content: impl Into<String>) -> Self {
        self.messages.insert(0, ChatMessage::new(Role::System, content));
        self
    }

    pub fn with_constraint(mut self, key: &str, value: Value) -> Self {
        self.constraints.insert(key.to_string(), value);
        self
    }

    /// Content of the last user turn
    pub fn user_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }

    fn temperature(&self) -> f64 {
        self.constraints
            .get(TEMPERATURE_CONSTRAINT)
            .and_then(|t| t.as_f64())
            .unwrap_or(0.0)
    }

    fn wants_json(&self) -> bool {
        self.constraints.contains_key(JSON_SCHEMA_CONSTRAINT)
    }
}

/// Batched text generation
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Generate one output per prompt, in order
    async fn infer(&self, prompts: Vec<Prompt>) -> Result<Vec<String>, LLMError>;

    /// Identifier used in logs and result metadata
    fn engine_name(&self) -> &str;
}

/// Single-prompt chat client
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<LLMResponse, LLMError>;

    fn model_name(&self) -> &str;

    /// Upper bound on in-flight requests within one batch
    fn max_concurrent(&self) -> usize {
        8
    }
}

#[async_trait]
impl<C: LLMClient> InferenceEngine for C {
    async fn infer(&self, prompts: Vec<Prompt>) -> Result<Vec<String>, LLMError> {
        let responses: Vec<Result<LLMResponse, LLMError>> = stream::iter(prompts)
            .map(|prompt| async move { self.complete(&prompt).await })
            .buffered(self.max_concurrent().max(1))
            .collect()
            .await;

        let mut outputs = Vec::with_capacity(responses.len());
        let mut total_tokens = 0u64;
        for response in responses {
            let response = response?;
            total_tokens += response.usage.total_tokens as u64;
            outputs.push(response.content);
        }
        debug!(
            "{} completed {} prompts using {} tokens",
            self.model_name(),
            outputs.len(),
            total_tokens
        );
        Ok(outputs)
    }

    fn engine_name(&self) -> &str {
        self.model_name()
    }
}

/// Response from LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
}

/// Token usage information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Errors from LLM clients
#[derive(Debug, Error)]
pub enum LLMError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<LLMError> for RubricError {
    fn from(err: LLMError) -> Self {
        RubricError::CollaboratorFailure(err.to_string())
    }
}

fn usage_from(value: &Value, input_key: &str, output_key: &str) -> TokenUsage {
    let count = |key: &str| {
        value[key]
            .as_u64()
            .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
    };
    let input = count(input_key);
    let output = count(output_key);
    TokenUsage {
        prompt_tokens: input,
        completion_tokens: output,
        total_tokens: input.saturating_add(output),
    }
}

/// OpenAI (and OpenAI-compatible) chat completions client
pub struct OpenAIClient {
    api_key: String,
    model: String,
    base_url: String,
    max_concurrent: usize,
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            max_concurrent: 8,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn complete(&self, prompt: &Prompt) -> Result<LLMResponse, LLMError> {
        let mut request = serde_json::json!({
            "model": self.model,
            "messages": prompt.messages,
            "temperature": prompt.temperature(),
        });
        if prompt.wants_json() {
            request["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LLMError::RateLimitExceeded);
            }
            return Err(LLMError::ApiError(error_text));
        }

        let response_data: Value = response.json().await?;

        let content = response_data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(LLMError::InvalidResponse("Missing content".to_string()))?
            .to_string();

        Ok(LLMResponse {
            content,
            usage: usage_from(&response_data["usage"], "prompt_tokens", "completion_tokens"),
            model: self.model.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

/// Anthropic Claude client implementation
pub struct AnthropicClient {
    api_key: String,
    model: String,
    base_url: String,
    max_concurrent: usize,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.anthropic.com/v1".to_string(),
            max_concurrent: 8,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }
}

#[async_trait]
impl LLMClient for AnthropicClient {
    async fn complete(&self, prompt: &Prompt) -> Result<LLMResponse, LLMError> {
        let system = prompt
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let messages: Vec<&ChatMessage> = prompt
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();

        let mut request = serde_json::json!({
            "model": self.model,
            "max_tokens": 4096,
            "messages": messages,
            "temperature": prompt.temperature(),
        });
        if !system.is_empty() {
            request["system"] = Value::String(system);
        }

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LLMError::RateLimitExceeded);
            }
            return Err(LLMError::ApiError(error_text));
        }

        let response_data: Value = response.json().await?;

        let content = response_data["content"][0]["text"]
            .as_str()
            .ok_or(LLMError::InvalidResponse("Missing content".to_string()))?
            .to_string();

        Ok(LLMResponse {
            content,
            usage: usage_from(&response_data["usage"], "input_tokens", "output_tokens"),
            model: self.model.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

/// Build an engine from configuration, wrapped in a response cache when a
/// TTL is configured
pub fn engine_from_settings(
    settings: &InferenceSettings,
) -> Result<Arc<dyn InferenceEngine>, RubricError> {
    let api_key = std::env::var(&settings.api_key_env).map_err(|_| {
        RubricError::Config(format!(
            "environment variable {} is not set",
            settings.api_key_env
        ))
    })?;

    let engine: Arc<dyn InferenceEngine> = match settings.provider {
        Provider::OpenAI => {
            let mut client = OpenAIClient::new(api_key, settings.model.clone())
                .with_max_concurrent(settings.max_concurrent);
            if let Some(base_url) = &settings.base_url {
                client = client.with_base_url(base_url.clone());
            }
            Arc::new(client)
        }
        Provider::Anthropic => {
            let mut client = AnthropicClient::new(api_key, settings.model.clone())
                .with_max_concurrent(settings.max_concurrent);
            if let Some(base_url) = &settings.base_url {
                client = client.with_base_url(base_url.clone());
            }
            Arc::new(client)
        }
    };

    if settings.cache_ttl_secs > 0 {
        Ok(Arc::new(CachedInference::new(
            engine,
            Duration::from_secs(settings.cache_ttl_secs),
        )))
    } else {
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_builders() {
        let prompt = Prompt::text("Judge this")
            .with_system("You are strict.")
            .with_constraint(TEMPERATURE_CONSTRAINT, serde_json::json!(0.3));

        assert_eq!(prompt.messages[0].role, Role::System);
        assert_eq!(prompt.user_text(), "Judge this");
        assert_eq!(prompt.temperature(), 0.3);
        assert!(!prompt.wants_json());
    }

    #[test]
    fn test_llm_error_becomes_collaborator_failure() {
        let err: RubricError = LLMError::RateLimitExceeded.into();
        assert!(matches!(err, RubricError::CollaboratorFailure(_)));
    }

    #[test]
    fn test_usage_counts_saturate() {
        let usage = usage_from(
            &serde_json::json!({ "input_tokens": 5_000_000_000u64, "output_tokens": 7 }),
            "input_tokens",
            "output_tokens",
        );
        assert_eq!(usage.prompt_tokens, u32::MAX);
        assert_eq!(usage.completion_tokens, 7);
        assert_eq!(usage.total_tokens, u32::MAX);

        let missing = usage_from(&Value::Null, "input_tokens", "output_tokens");
        assert_eq!(missing.total_tokens, 0);
    }

    #[tokio::test]
    async fn test_openai_batch_preserves_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"content":"{\"selected_option\":\"Good\"}"}}],
                    "usage":{"prompt_tokens":12,"completion_tokens":5}}"#,
            )
            .expect(2)
            .create_async()
            .await;

        let client = OpenAIClient::new("test".to_string(), "gpt-4o-mini".to_string())
            .with_base_url(server.url());
        let outputs = client
            .infer(vec![Prompt::text("a"), Prompt::text("b")])
            .await
            .unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0], r#"{"selected_option":"Good"}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_openai_rate_limit() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client = OpenAIClient::new("test".to_string(), "gpt-4o-mini".to_string())
            .with_base_url(server.url());
        let result = client.infer(vec![Prompt::text("a")]).await;
        assert!(matches!(result, Err(LLMError::RateLimitExceeded)));
    }

    #[tokio::test]
    async fn test_anthropic_moves_system_turns() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "system": "Be fair.",
                "messages": [{ "role": "user", "content": "Judge" }]
            })))
            .with_status(200)
            .with_body(r#"{"content":[{"text":"ok"}],"usage":{"input_tokens":3,"output_tokens":1}}"#)
            .create_async()
            .await;

        let client = AnthropicClient::new("test".to_string(), "claude".to_string())
            .with_base_url(server.url());
        let outputs = client
            .infer(vec![Prompt::text("Judge").with_system("Be fair.")])
            .await
            .unwrap();

        assert_eq!(outputs, vec!["ok".to_string()]);
        mock.assert_async().await;
    }
}
