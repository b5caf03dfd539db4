//! The black-box LLM provider call.
//!
//! A trait abstracts the actual HTTP call so a deterministic test
//! double can be swapped in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A proposed tool call the model emitted instead of (or alongside) a
/// final answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Raw provider response: text, any tool calls, and token usage. Cost
/// is computed by `LLMClient`, not the provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub tool_calls: Vec<ProposedToolCall>,
    pub usage: TokenUsage,
}

/// One chat message. System messages may carry a cacheable-prefix
/// hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant", content: content.into() }
    }
}

/// Abstraction over the actual provider HTTP call.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        model: &str,
        temperature: f64,
        tools: &[(String, serde_json::Value)],
        cache_system_prompt: bool,
    ) -> Result<ProviderResponse>;
}

/// `reqwest`-backed default implementation targeting an
/// Anthropic-Messages-API-shaped endpoint. The exact upstream wire
/// format is out of core scope; this implementation is a
/// thin, swappable default.
pub struct HttpLLMProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpLLMProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    temperature: f64,
    system: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct WireResponse {
    text: String,
    #[serde(default)]
    tool_calls: Vec<ProposedToolCall>,
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait]
impl LLMProvider for HttpLLMProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        model: &str,
        temperature: f64,
        tools: &[(String, serde_json::Value)],
        _cache_system_prompt: bool,
    ) -> Result<ProviderResponse> {
        let body = WireRequest {
            model,
            temperature,
            system,
            messages,
            tools: tools
                .iter()
                .map(|(name, schema)| serde_json::json!({"name": name, "input_schema": schema}))
                .collect(),
        };

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(crate::error::EntropyError::Http)?;

        let wire: WireResponse = resp.json().await.map_err(crate::error::EntropyError::Http)?;

        Ok(ProviderResponse {
            text: wire.text,
            tool_calls: wire.tool_calls,
            usage: TokenUsage {
                input_tokens: wire.input_tokens,
                output_tokens: wire.output_tokens,
            },
        })
    }
}
