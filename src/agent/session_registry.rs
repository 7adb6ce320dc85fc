//! Concurrent registry of live agent sessions
//!
//! A lock-free concurrent map, since multiple gateway requests can touch
//! different sessions at once.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use super::session_state::SessionState;

/// Owns every live [`SessionState`], keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Mutex<SessionState>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            sessions: DashMap::new(),
        }
    }

    /// Get the session, creating it if this is the first time it's seen.
    pub fn get_or_create(&self, session_id: &str) -> Arc<Mutex<SessionState>> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionState::new(session_id))))
            .clone()
    }

    /// Get an existing session without creating one.
    pub fn get(&self, session_id: &str) -> Option<Arc<Mutex<SessionState>>> {
        self.sessions.get(session_id).map(|e| e.clone())
    }

    pub fn remove(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_returns_same_handle() {
        let registry = SessionRegistry::new();
        let a = registry.get_or_create("s1");
        let b = registry.get_or_create("s1");
        {
            let mut guard = a.lock().await;
            guard.add_fact("hi");
        }
        let guard = b.lock().await;
        assert_eq!(guard.facts().count(), 1);
    }

    #[test]
    fn remove_drops_session() {
        let registry = SessionRegistry::new();
        registry.get_or_create("s1");
        assert_eq!(registry.active_count(), 1);
        registry.remove("s1");
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn get_without_create_returns_none_for_unknown() {
        let registry = SessionRegistry::new();
        assert!(registry.get("nope").is_none());
    }
}
