//! Grounded chat: retrieve context, compose a prompt, call an external LLM.
//!
//! LLM calls go to external APIs (OpenAI, Anthropic, Groq) through the
//! `CompletionProvider` trait; no local model is required.

pub mod config;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod types;

pub use config::LLMConfig;
pub use orchestrator::{ChatOrchestrator, ChatSettings};
pub use providers::{AnthropicProvider, CompletionProvider, OpenAiCompatProvider};
pub use types::*;
