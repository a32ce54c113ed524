//! LLM provider selection from the environment.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::providers::{AnthropicProvider, CompletionProvider, OpenAiCompatProvider};
use crate::types::LLMProvider;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-20241022";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";

pub const DEFAULT_TEMPERATURE: f64 = 0.3;
pub const DEFAULT_MAX_TOKENS: usize = 800;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// `auto`, `openai`, `anthropic`, or `groq`.
    pub preferred_provider: String,
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub anthropic_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub groq_api_key: Option<String>,
    pub openai_model: String,
    pub anthropic_model: String,
    pub groq_model: String,
    pub temperature: f64,
    pub max_tokens: usize,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            preferred_provider: "auto".into(),
            openai_api_key: None,
            anthropic_api_key: None,
            groq_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.into(),
            anthropic_model: DEFAULT_ANTHROPIC_MODEL.into(),
            groq_model: DEFAULT_GROQ_MODEL.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl LLMConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Keys: `ASKDESK_LLM_PROVIDER`, `ASKDESK_LLM_MODEL` (applies to the
    /// resolved provider), `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `GROQ_API_KEY`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self {
            preferred_provider: key("ASKDESK_LLM_PROVIDER")
                .map(|p| p.trim().to_lowercase())
                .unwrap_or_else(|| "auto".into()),
            openai_api_key: key("OPENAI_API_KEY"),
            anthropic_api_key: key("ANTHROPIC_API_KEY"),
            groq_api_key: key("GROQ_API_KEY"),
            ..Default::default()
        };

        if let Some(model) = key("ASKDESK_LLM_MODEL") {
            match config.resolve_provider().map(|(p, _, _)| p) {
                Some(LLMProvider::OpenAI) => config.openai_model = model,
                Some(LLMProvider::Anthropic) => config.anthropic_model = model,
                Some(LLMProvider::Groq) => config.groq_model = model,
                None => {}
            }
        }
        config
    }

    /// Resolve which provider, model, and key to use.
    pub fn resolve_provider(&self) -> Option<(LLMProvider, String, String)> {
        // Explicit preference
        if self.preferred_provider != "auto" {
            return match self.preferred_provider.as_str() {
                "openai" => self
                    .openai_api_key
                    .as_ref()
                    .map(|k| (LLMProvider::OpenAI, self.openai_model.clone(), k.clone())),
                "anthropic" => self
                    .anthropic_api_key
                    .as_ref()
                    .map(|k| (LLMProvider::Anthropic, self.anthropic_model.clone(), k.clone())),
                "groq" => self
                    .groq_api_key
                    .as_ref()
                    .map(|k| (LLMProvider::Groq, self.groq_model.clone(), k.clone())),
                _ => None,
            };
        }

        // Auto mode: Anthropic > Groq > OpenAI
        if let Some(k) = &self.anthropic_api_key {
            return Some((LLMProvider::Anthropic, self.anthropic_model.clone(), k.clone()));
        }
        if let Some(k) = &self.groq_api_key {
            return Some((LLMProvider::Groq, self.groq_model.clone(), k.clone()));
        }
        if let Some(k) = &self.openai_api_key {
            return Some((LLMProvider::OpenAI, self.openai_model.clone(), k.clone()));
        }

        None
    }

    /// Build the resolved provider, or `None` if no key is configured.
    pub fn create_provider(&self, timeout: Duration) -> Option<Arc<dyn CompletionProvider>> {
        let (provider, model, key) = self.resolve_provider()?;
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Failed to build HTTP client for {}: {}", provider, e);
                return None;
            }
        };
        info!("LLM provider: {} (model={})", provider, model);

        let provider: Arc<dyn CompletionProvider> = match provider {
            LLMProvider::OpenAI => Arc::new(OpenAiCompatProvider::openai(
                client,
                model,
                key,
                self.temperature,
                self.max_tokens,
            )),
            LLMProvider::Groq => Arc::new(OpenAiCompatProvider::groq(
                client,
                model,
                key,
                self.temperature,
                self.max_tokens,
            )),
            LLMProvider::Anthropic => Arc::new(AnthropicProvider::new(
                client,
                model,
                key,
                self.temperature,
                self.max_tokens,
            )),
        };
        Some(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_auto_prefers_anthropic_then_groq() {
        let config = LLMConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-o"),
            ("GROQ_API_KEY", "gsk"),
        ]));
        let (provider, model, key) = config.resolve_provider().unwrap();
        assert_eq!(provider, LLMProvider::Groq);
        assert_eq!(model, DEFAULT_GROQ_MODEL);
        assert_eq!(key, "gsk");

        let config = LLMConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-o"),
            ("ANTHROPIC_API_KEY", "sk-a"),
        ]));
        assert_eq!(config.resolve_provider().unwrap().0, LLMProvider::Anthropic);
    }

    #[test]
    fn test_explicit_preference_and_model_override() {
        let config = LLMConfig::from_lookup(lookup_from(&[
            ("ASKDESK_LLM_PROVIDER", "OpenAI"),
            ("ASKDESK_LLM_MODEL", "gpt-4o"),
            ("OPENAI_API_KEY", "sk-o"),
            ("ANTHROPIC_API_KEY", "sk-a"),
        ]));
        let (provider, model, _) = config.resolve_provider().unwrap();
        assert_eq!(provider, LLMProvider::OpenAI);
        assert_eq!(model, "gpt-4o");
        assert_eq!(config.anthropic_model, DEFAULT_ANTHROPIC_MODEL);
    }

    #[test]
    fn test_no_keys_means_no_provider() {
        let config = LLMConfig::from_lookup(lookup_from(&[("OPENAI_API_KEY", "  ")]));
        assert!(config.resolve_provider().is_none());
        assert!(config.create_provider(Duration::from_secs(1)).is_none());

        let missing = LLMConfig::from_lookup(lookup_from(&[
            ("ASKDESK_LLM_PROVIDER", "groq"),
            ("OPENAI_API_KEY", "sk-o"),
        ]));
        assert!(missing.resolve_provider().is_none());
    }

    #[test]
    fn test_create_provider_names() {
        let config = LLMConfig::from_lookup(lookup_from(&[("ANTHROPIC_API_KEY", "sk-a")]));
        let provider = config.create_provider(Duration::from_secs(5)).unwrap();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.model(), DEFAULT_ANTHROPIC_MODEL);
    }
}
