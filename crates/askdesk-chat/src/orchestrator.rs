//! One chat turn: validate, rate limit, retrieve, prompt, complete, record.

use std::sync::Arc;
use std::time::Duration;

use askdesk_core::{ChatLimits, Error, Result, SearchDefaults};
use askdesk_resolve::{HybridSearch, SearchOptions};
use askdesk_session::{ChatMessage, RateLimiter, SessionManager};
use askdesk_store::DocType;
use tracing::{debug, error, info};

use crate::prompt::build_messages;
use crate::providers::CompletionProvider;
use crate::types::{ChatReply, ChatTurn, SourceRef};

/// Types the chat endpoint may cite.
pub const CHAT_ALLOWED_TYPES: &[DocType] = &[
    DocType::Faq,
    DocType::Event,
    DocType::Blog,
    DocType::Instructor,
    DocType::Knowledge,
];

#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Turns allowed per session per rate window.
    pub rate_limit: usize,
    pub history_window: usize,
    pub max_message_chars: usize,
    pub llm_timeout: Duration,
    pub search: SearchOptions,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from_config(&ChatLimits::default(), SearchDefaults::default())
    }
}

impl ChatSettings {
    pub fn from_config(limits: &ChatLimits, search: SearchDefaults) -> Self {
        let mut search = SearchOptions::from(search);
        search.top_k = limits.context_records.max(1);
        search.allowed_types = Some(CHAT_ALLOWED_TYPES.to_vec());
        Self {
            rate_limit: limits.rate_limit,
            history_window: limits.history_window,
            max_message_chars: limits.max_message_chars,
            llm_timeout: limits.llm_timeout(),
            search,
        }
    }
}

pub struct ChatOrchestrator {
    sessions: Arc<SessionManager>,
    limiter: Arc<RateLimiter>,
    search: Arc<HybridSearch>,
    llm: Option<Arc<dyn CompletionProvider>>,
    settings: ChatSettings,
}

impl ChatOrchestrator {
    pub fn new(
        sessions: Arc<SessionManager>,
        limiter: Arc<RateLimiter>,
        search: Arc<HybridSearch>,
        llm: Option<Arc<dyn CompletionProvider>>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            sessions,
            limiter,
            search,
            llm,
            settings,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Name and model of the configured LLM, if any.
    pub fn llm_info(&self) -> Option<(String, String)> {
        self.llm
            .as_ref()
            .map(|p| (p.name().to_string(), p.model().to_string()))
    }

    /// Process one user message.
    ///
    /// The session history only changes when the LLM produced a reply. A
    /// rate-limited turn consumes nothing and calls no provider.
    pub async fn chat(&self, session_id: &str, message: &str) -> Result<ChatTurn> {
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::Validation("message must not be empty".into()));
        }
        if message.chars().count() > self.settings.max_message_chars {
            return Err(Error::Validation(format!(
                "message exceeds {} characters",
                self.settings.max_message_chars
            )));
        }
        if !self.sessions.exists(session_id) {
            return Err(Error::NotFound(format!("session {}", session_id)));
        }

        if !self.limiter.is_allowed(session_id, self.settings.rate_limit) {
            let wait = self.limiter.retry_after(session_id);
            let retry_after_secs = (wait.as_secs_f64().ceil() as u64).max(1);
            debug!("Rate limited session {} (retry in {}s)", session_id, retry_after_secs);
            return Ok(ChatTurn::RateLimited { retry_after_secs });
        }

        // Held until the exchange is appended so turns land in arrival order.
        let mut session = self
            .sessions
            .lock(session_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;

        let hits = self
            .search
            .search(message, &self.settings.search)
            .await
            .map_err(|e| match e {
                Error::Provider(_) | Error::ProviderUnavailable(_) => e,
                other => Error::Provider(format!("search failed: {}", other)),
            })?;

        let prompt = build_messages(&hits, session.recent(self.settings.history_window), message);

        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| Error::Provider("no LLM provider configured".into()))?;
        let completion = tokio::time::timeout(self.settings.llm_timeout, llm.complete(&prompt));
        let reply = match completion.await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                error!("LLM {} failed for session {}: {}", llm.name(), session_id, e);
                return Err(e);
            }
            Err(_) => {
                error!("LLM {} timed out for session {}", llm.name(), session_id);
                return Err(Error::Provider(format!(
                    "completion timed out after {:?}",
                    self.settings.llm_timeout
                )));
            }
        };

        session.push_exchange(ChatMessage::user(message), ChatMessage::assistant(reply.clone()));
        info!(
            "Chat turn for session {}: {} sources, {} messages",
            session_id,
            hits.len(),
            session.messages.len()
        );

        Ok(ChatTurn::Answered(ChatReply {
            message: reply,
            sources: hits.iter().map(SourceRef::from).collect(),
            grounded: !hits.is_empty(),
        }))
    }
}
