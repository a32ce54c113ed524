//! External LLM completion providers.
//!
//! OpenAI and Groq share the chat-completions format. Anthropic's Messages
//! API takes the system prompt as a separate field. Calls are non-streaming.

use askdesk_core::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::types::PromptMessage;

pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Complete a conversation; returns the assistant text.
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String>;
}

/// OpenAI-compatible chat completions (OpenAI, Groq).
pub struct OpenAiCompatProvider {
    client: Client,
    name: &'static str,
    url: String,
    model: String,
    api_key: String,
    temperature: f64,
    max_tokens: usize,
}

impl OpenAiCompatProvider {
    pub fn new(
        client: Client,
        name: &'static str,
        url: impl Into<String>,
        model: String,
        api_key: String,
        temperature: f64,
        max_tokens: usize,
    ) -> Self {
        Self {
            client,
            name,
            url: url.into(),
            model,
            api_key,
            temperature,
            max_tokens,
        }
    }

    pub fn openai(
        client: Client,
        model: String,
        api_key: String,
        temperature: f64,
        max_tokens: usize,
    ) -> Self {
        Self::new(
            client,
            "openai",
            OPENAI_CHAT_URL,
            model,
            api_key,
            temperature,
            max_tokens,
        )
    }

    pub fn groq(
        client: Client,
        model: String,
        api_key: String,
        temperature: f64,
        max_tokens: usize,
    ) -> Self {
        Self::new(
            client,
            "groq",
            GROQ_CHAT_URL,
            model,
            api_key,
            temperature,
            max_tokens,
        )
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String> {
        let body = openai_request_body(&self.model, messages, self.temperature, self.max_tokens);
        debug!("Completion from {} with model {}", self.name, self.model);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("{} request failed: {}", self.name, e)))?;

        let json = read_json(response, self.name).await?;
        parse_openai_completion(&json)
    }
}

/// Anthropic Messages API.
pub struct AnthropicProvider {
    client: Client,
    url: String,
    model: String,
    api_key: String,
    temperature: f64,
    max_tokens: usize,
}

impl AnthropicProvider {
    pub fn new(
        client: Client,
        model: String,
        api_key: String,
        temperature: f64,
        max_tokens: usize,
    ) -> Self {
        Self {
            client,
            url: ANTHROPIC_MESSAGES_URL.into(),
            model,
            api_key,
            temperature,
            max_tokens,
        }
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String> {
        let body = anthropic_request_body(&self.model, messages, self.temperature, self.max_tokens);
        debug!("Completion from Anthropic with model {}", self.model);

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("anthropic request failed: {}", e)))?;

        let json = read_json(response, "anthropic").await?;
        parse_anthropic_completion(&json)
    }
}

async fn read_json(response: reqwest::Response, provider: &str) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("{} API error {}: {}", provider, status, body);
        return Err(Error::Provider(format!("{} API error {}", provider, status)));
    }
    response
        .json()
        .await
        .map_err(|e| Error::Provider(format!("invalid {} response: {}", provider, e)))
}

fn openai_request_body(
    model: &str,
    messages: &[PromptMessage],
    temperature: f64,
    max_tokens: usize,
) -> Value {
    let msgs: Vec<Value> = messages
        .iter()
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();
    json!({
        "model": model,
        "messages": msgs,
        "temperature": temperature,
        "max_tokens": max_tokens,
    })
}

fn parse_openai_completion(json: &Value) -> Result<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Provider("completion response has no content".into()))
}

fn anthropic_request_body(
    model: &str,
    messages: &[PromptMessage],
    temperature: f64,
    max_tokens: usize,
) -> Value {
    // Separate system messages from the conversation
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| m.content.as_str())
        .collect();
    let conv: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != "system")
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();

    let mut body = json!({
        "model": model,
        "messages": conv,
        "temperature": temperature,
        "max_tokens": max_tokens,
    });
    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }
    body
}

fn parse_anthropic_completion(json: &Value) -> Result<String> {
    let text: String = json["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .filter_map(|b| b["text"].as_str())
                .collect()
        })
        .unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::Provider("completion response has no content".into()));
    }
    Ok(text.to_string())
}
