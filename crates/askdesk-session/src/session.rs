//! In-memory chat sessions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use askdesk_core::now_millis;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Unix milliseconds.
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    pub started_at: i64,
    pub last_activity_at: i64,
    #[serde(skip)]
    last_activity: Instant,
}

impl ChatSession {
    fn new(id: String) -> Self {
        let now = now_millis();
        Self {
            id,
            messages: Vec::new(),
            started_at: now,
            last_activity_at: now,
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_at = now_millis();
        self.last_activity = Instant::now();
    }

    /// Append one completed user/assistant exchange.
    pub fn push_exchange(&mut self, user: ChatMessage, assistant: ChatMessage) {
        self.messages.push(user);
        self.messages.push(assistant);
        self.touch();
    }

    /// The last `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Public view returned by the session status action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: String,
    pub active: bool,
    pub message_count: usize,
    pub started_at: Option<i64>,
    pub last_activity_at: Option<i64>,
}

impl SessionStatus {
    fn inactive(id: &str) -> Self {
        Self {
            session_id: id.to_string(),
            active: false,
            message_count: 0,
            started_at: None,
            last_activity_at: None,
        }
    }
}

#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<String, Arc<Mutex<ChatSession>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session and return its id.
    pub fn create_session(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions
            .insert(id.clone(), Arc::new(Mutex::new(ChatSession::new(id.clone()))));
        info!("Session started: {}", id);
        id
    }

    pub fn exists(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Snapshot of a session. Waits for an in-flight turn of that session to finish.
    pub async fn get_session(&self, id: &str) -> Option<ChatSession> {
        let guard = self.lock(id).await?;
        Some(guard.clone())
    }

    /// Exclusive access to a session for the duration of one turn.
    /// Waiters are served in arrival order.
    pub async fn lock(&self, id: &str) -> Option<OwnedMutexGuard<ChatSession>> {
        // Clone the Arc so the map shard is not held across the await.
        let session = self.sessions.get(id).map(|s| Arc::clone(s.value()))?;
        Some(session.lock_owned().await)
    }

    /// End a session. Ending an unknown session is not an error.
    pub fn delete_session(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            info!("Session ended: {}", id);
        }
        removed
    }

    pub async fn status(&self, id: &str) -> SessionStatus {
        match self.get_session(id).await {
            Some(s) => SessionStatus {
                session_id: s.id,
                active: true,
                message_count: s.messages.len(),
                started_at: Some(s.started_at),
                last_activity_at: Some(s.last_activity_at),
            },
            None => SessionStatus::inactive(id),
        }
    }

    /// Remove sessions idle for at least `ttl`; returns the removed ids.
    /// Sessions with a turn in flight are never reaped.
    pub fn reap_idle(&self, ttl: Duration) -> Vec<String> {
        let mut reaped = Vec::new();
        self.sessions.retain(|id, session| match session.try_lock() {
            Ok(s) if s.idle_for() >= ttl => {
                reaped.push(id.clone());
                false
            }
            _ => true,
        });
        if !reaped.is_empty() {
            debug!("Reaped {} idle sessions", reaped.len());
        }
        reaped
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
