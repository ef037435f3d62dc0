//! Session Management
//!
//! A session owns the chat transcript shown to one user: an append-only list
//! of user and assistant turns, kept in memory only.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::reasoning::{Agent, EventSink};

/// First assistant turn of every session
pub const GREETING: &str = "Hello! I am your mathematical assistant.";

/// Longest session id accepted from a client
pub const MAX_SESSION_ID_LEN: usize = 64;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Accept a client-chosen id: 1 to 64 ASCII letters, digits, `-` or `_`
    pub fn parse(s: &str) -> Result<Self> {
        let valid = !s.is_empty()
            && s.len() <= MAX_SESSION_ID_LEN
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(AgentError::InvalidSessionId(format!(
                "expected 1-{MAX_SESSION_ID_LEN} letters, digits, '-' or '_'"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who wrote a chat turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    Assistant,
    User,
}

/// One bubble in the chat transcript
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ChatRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, text)
    }
}

/// A user's chat session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,

    /// Chat history, oldest first
    transcript: Vec<ChatTurn>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session seeded with the greeting
    pub fn new() -> Self {
        Self::with_id(SessionId::new())
    }

    /// Create with specific ID
    pub fn with_id(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            transcript: vec![ChatTurn::assistant(GREETING)],
            created_at: now,
            updated_at: now,
        }
    }

    /// Chat history, oldest first
    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    /// Number of turns
    pub fn len(&self) -> usize {
        self.transcript.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn append(&mut self, turn: ChatTurn) {
        self.transcript.push(turn);
        self.touch();
    }

    /// Ask the agent a question and record the exchange
    ///
    /// An empty question is rejected without touching the transcript.
    /// Otherwise exactly one user turn and one assistant turn are appended;
    /// agent failures are rendered into the assistant turn instead of being
    /// returned.
    pub async fn submit(
        &mut self,
        agent: &Agent,
        question: &str,
        events: Option<&EventSink>,
    ) -> Result<ChatTurn> {
        if question.trim().is_empty() {
            return Err(AgentError::EmptyQuestion);
        }

        self.append(ChatTurn::user(question));

        let reply = match agent.ask(question, events).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "Agent run failed");
                e.to_chat_text()
            }
        };

        let turn = ChatTurn::assistant(reply);
        self.append(turn.clone());
        Ok(turn)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Session handle shared between requests
pub type SharedSession = Arc<Mutex<Session>>;

/// Sessions untouched for this long are evicted
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Most sessions held at once
pub const DEFAULT_CAPACITY: usize = 10_000;

struct Entry {
    session: SharedSession,
    last_seen: DateTime<Utc>,
}

impl Entry {
    fn new(session: Session) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            last_seen: Utc::now(),
        }
    }

    fn idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_seen < cutoff
    }
}

/// In-memory session store
///
/// Each session sits behind its own async mutex, so one session handles one
/// submission at a time while different sessions run concurrently. Sessions
/// idle past the timeout are dropped by `evict_idle`; at capacity the least
/// recently used session makes room for a new one.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Entry>>,
    idle_timeout: Duration,
    capacity: usize,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_IDLE_TIMEOUT, DEFAULT_CAPACITY)
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with a custom idle timeout and capacity (at least one session)
    pub fn with_limits(idle_timeout: Duration, capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
            capacity: capacity.max(1),
        }
    }

    /// Create and register a new session
    pub fn create(&self) -> (SessionId, SharedSession) {
        let session = Session::new();
        let id = session.id.clone();
        let entry = Entry::new(session);
        let shared = entry.session.clone();

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        self.make_room(&mut sessions);
        sessions.insert(id.clone(), entry);
        drop(sessions);

        tracing::debug!(session = %id, "Session created");
        (id, shared)
    }

    /// Look up a session and mark it as used
    pub fn get(&self, id: &SessionId) -> Option<SharedSession> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let entry = sessions.get_mut(id)?;
        entry.last_seen = Utc::now();
        Some(entry.session.clone())
    }

    /// Look up a session, creating it under the given ID if unknown
    pub fn get_or_create(&self, id: &SessionId) -> SharedSession {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = sessions.get_mut(id) {
            entry.last_seen = Utc::now();
            return entry.session.clone();
        }

        self.make_room(&mut sessions);
        let entry = Entry::new(Session::with_id(id.clone()));
        let shared = entry.session.clone();
        sessions.insert(id.clone(), entry);
        tracing::debug!(session = %id, "Session created");
        shared
    }

    /// Drop a session
    pub fn remove(&self, id: &SessionId) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    /// Drop every session idle longer than the timeout; returns how many went
    pub fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        self.evict_idle_locked(&mut sessions)
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_idle_locked(&self, sessions: &mut HashMap<SessionId, Entry>) -> usize {
        let Ok(idle) = chrono::Duration::from_std(self.idle_timeout) else {
            return 0;
        };
        let cutoff = Utc::now() - idle;

        let before = sessions.len();
        sessions.retain(|_, entry| !entry.idle_since(cutoff));
        let evicted = before - sessions.len();

        if evicted > 0 {
            tracing::debug!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    /// Free a slot for one more session
    fn make_room(&self, sessions: &mut HashMap<SessionId, Entry>) {
        if sessions.len() < self.capacity {
            return;
        }
        if self.evict_idle_locked(sessions) > 0 {
            return;
        }

        let oldest = sessions
            .iter()
            .min_by_key(|(_, entry)| entry.last_seen)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            sessions.remove(&id);
            tracing::debug!(session = %id, "Session store full, dropped least recently used");
        }
    }
}
