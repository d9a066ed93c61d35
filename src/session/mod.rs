// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Session store for Revu
//!
//! Holds per-conversation review state: the pull request a session is bound
//! to, its interaction mode, message history, the one-shot initial-review
//! flag, and the live partition handles. Sessions live in memory for the
//! lifetime of the process; there is no eviction.
//!
//! Concurrency: the map is behind an `RwLock` and each session behind its
//! own `Mutex`, so turns on the same session are serialized while different
//! sessions proceed independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::store::{LoadedPartitions, PartitionMap};

/// Interaction mode for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Proactive, structured review: the first turn produces an initial
    /// review summary regardless of what the caller asked
    CoReviewer,
    /// Reactive assistant: answers stay narrowly scoped to the question
    InteractiveAssistant,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::CoReviewer => write!(f, "co_reviewer"),
            Mode::InteractiveAssistant => write!(f, "interactive_assistant"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "co_reviewer" => Ok(Mode::CoReviewer),
            "interactive_assistant" => Ok(Mode::InteractiveAssistant),
            other => Err(format!(
                "unknown mode '{other}' (expected co_reviewer or interactive_assistant)"
            )),
        }
    }
}

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a session's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-conversation review state
pub struct Session {
    /// Pull request this session is bound to (fixed at creation)
    pub pr_id: String,

    /// Interaction mode (fixed at creation)
    pub mode: Mode,

    /// Ordered message history, trimmed to the store's pair budget
    pub history: Vec<ChatMessage>,

    /// Flips false -> true exactly once, on the first co_reviewer turn
    pub initial_review_generated: bool,

    /// Live query handles by partition name
    pub handles: PartitionMap,

    /// Partition names available for this PR
    pub collections: Vec<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn new(pr_id: impl Into<String>, mode: Mode, loaded: LoadedPartitions) -> Self {
        Self {
            pr_id: pr_id.into(),
            mode,
            history: Vec::new(),
            initial_review_generated: false,
            handles: loaded.handles,
            collections: loaded.collections,
            created_at: Utc::now(),
        }
    }

    /// Append a message to history
    pub fn push(&mut self, message: ChatMessage) {
        self.history.push(message);
    }

    /// Mark the one-shot initial review as produced
    pub fn mark_initial_review(&mut self) {
        self.initial_review_generated = true;
    }

    /// Trim history to the most recent `max_pairs` exchanges, oldest first
    pub fn trim_history(&mut self, max_pairs: usize) {
        let max_len = max_pairs * 2;
        if self.history.len() > max_len {
            let excess = self.history.len() - max_len;
            self.history.drain(..excess);
        }
    }
}

/// Shared handle to one session's state
pub type SharedSession = Arc<Mutex<Session>>;

/// In-memory session store
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
    max_history_pairs: usize,
}

impl SessionStore {
    pub fn new(max_history_pairs: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_history_pairs,
        }
    }

    /// History budget, in user/assistant pairs
    pub fn max_history_pairs(&self) -> usize {
        self.max_history_pairs
    }

    /// Look up a session by id
    pub async fn get(&self, session_id: Uuid) -> Option<SharedSession> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    /// Create a session with a fresh id
    pub async fn create(
        &self,
        pr_id: impl Into<String>,
        mode: Mode,
        loaded: LoadedPartitions,
    ) -> (Uuid, SharedSession) {
        let session_id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(Session::new(pr_id, mode, loaded)));
        self.sessions
            .write()
            .await
            .insert(session_id, session.clone());
        (session_id, session)
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store holds no sessions
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
