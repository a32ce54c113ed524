//! Chat types.

use askdesk_resolve::SearchHit;
use askdesk_store::DocType;
use serde::{Deserialize, Serialize};

/// LLM provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    OpenAI,
    Anthropic,
    Groq,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Groq => write!(f, "groq"),
        }
    }
}

/// One message of a provider request. `role` is `system`, `user`, or `assistant`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// A retrieved record cited by a reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    pub score: f64,
}

impl From<&SearchHit> for SourceRef {
    fn from(hit: &SearchHit) -> Self {
        Self {
            id: hit.id.clone(),
            title: hit.title.clone(),
            url: hit.url.clone(),
            doc_type: hit.doc_type,
            score: hit.combined_score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub message: String,
    pub sources: Vec<SourceRef>,
    /// False when no stored record supported the answer.
    pub grounded: bool,
}

/// Outcome of one chat turn. Being rate limited is a normal outcome, not an error.
#[derive(Debug, Clone)]
pub enum ChatTurn {
    Answered(ChatReply),
    RateLimited { retry_after_secs: u64 },
}
