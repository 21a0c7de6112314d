//! Chat session memory: bounded, append-only, per-session conversation turns.
//!
//! Grounded in the session-store shape from the voice pipeline this crate was
//! adapted from (a trait behind `Arc<dyn _>`, an in-memory `RwLock<HashMap<...>>`
//! implementation), reduced to the four operations the spec actually needs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::tokens::estimate_tokens;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

/// Chat session memory.
///
/// - `append` creates the session on first call.
/// - `history` of an unknown session returns the empty list without creating it.
/// - `exists` is a pure predicate; it never creates a session.
/// - `clear` removes the session if present.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn append(&self, session_id: &str, role: TurnRole, text: String);
    async fn history(&self, session_id: &str) -> Vec<Turn>;
    async fn exists(&self, session_id: &str) -> bool;
    async fn clear(&self, session_id: &str);
}

/// In-process session store bounded by turn count, evicting the oldest turn
/// first. No durable storage; state does not survive a process restart.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Vec<Turn>>>,
    max_turns: usize,
}

impl InMemorySessionStore {
    pub fn new(max_turns: usize) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns,
        })
    }

    /// Number of currently tracked sessions, for diagnostics/tests.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append(&self, session_id: &str, role: TurnRole, text: String) {
        let mut sessions = self.sessions.write().await;
        let turns = sessions.entry(session_id.to_string()).or_default();
        turns.push(Turn { role, text });
        while turns.len() > self.max_turns {
            turns.remove(0);
        }
    }

    async fn history(&self, session_id: &str) -> Vec<Turn> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn exists(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    async fn clear(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }
}

/// Bounds a session's history by an estimated token budget, evicting the oldest
/// turns first. Used where the caller wants a token bound rather than a raw turn
/// count bound (both are permitted by the spec).
pub fn bound_by_tokens(turns: &[Turn], budget: usize) -> Vec<Turn> {
    let mut kept: Vec<Turn> = Vec::new();
    let mut used = 0usize;
    for turn in turns.iter().rev() {
        let cost = estimate_tokens(&turn.text);
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push(turn.clone());
    }
    kept.reverse();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_session_history_is_empty_and_not_created() {
        let store = InMemorySessionStore::new(10);
        assert!(store.history("nope").await.is_empty());
        assert!(!store.exists("nope").await);
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn append_creates_session_on_first_call() {
        let store = InMemorySessionStore::new(10);
        store.append("s1", TurnRole::User, "hello".into()).await;
        assert!(store.exists("s1").await);
        assert_eq!(store.history("s1").await.len(), 1);
    }

    #[tokio::test]
    async fn bounded_length_evicts_oldest_first() {
        let store = InMemorySessionStore::new(2);
        store.append("s1", TurnRole::User, "a".into()).await;
        store.append("s1", TurnRole::Assistant, "b".into()).await;
        store.append("s1", TurnRole::User, "c".into()).await;
        let history = store.history("s1").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "b");
        assert_eq!(history[1].text, "c");
    }

    #[tokio::test]
    async fn clear_removes_session() {
        let store = InMemorySessionStore::new(10);
        store.append("s1", TurnRole::User, "a".into()).await;
        store.clear("s1").await;
        assert!(!store.exists("s1").await);
        assert!(store.history("s1").await.is_empty());
    }
}
