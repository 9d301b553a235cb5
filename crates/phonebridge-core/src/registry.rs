//! Table of active calls keyed by stream id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::session::{CallSession, CallState, SessionConfig};

/// Result of [`SessionRegistry::create`].
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Arc<CallSession>),
    /// A session with this id was already registered; it is returned untouched.
    Existing(Arc<CallSession>),
}

impl CreateOutcome {
    pub fn session(&self) -> &Arc<CallSession> {
        match self {
            CreateOutcome::Created(s) | CreateOutcome::Existing(s) => s,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// Active call sessions. The map lock only guards membership; per-call state
/// has its own lock inside [`CallSession`].
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<CallSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session, or return the existing one for this id.
    pub fn create(&self, stream_id: &str, config: Arc<SessionConfig>) -> CreateOutcome {
        if let Some(existing) = self.sessions.read().get(stream_id) {
            return CreateOutcome::Existing(Arc::clone(existing));
        }

        let mut sessions = self.sessions.write();
        if let Some(existing) = sessions.get(stream_id) {
            return CreateOutcome::Existing(Arc::clone(existing));
        }
        let session = Arc::new(CallSession::new(stream_id, config));
        sessions.insert(stream_id.to_string(), Arc::clone(&session));
        debug!(stream_sid = %stream_id, active = sessions.len(), "Session created");
        CreateOutcome::Created(session)
    }

    pub fn get(&self, stream_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.read().get(stream_id).cloned()
    }

    /// Apply `mutator` under the session's own lock. `None` if the session is gone.
    pub fn update<R>(&self, stream_id: &str, mutator: impl FnOnce(&mut CallState) -> R) -> Option<R> {
        let session = self.get(stream_id)?;
        if session.is_closed() {
            return None;
        }
        Some(session.with_state(mutator))
    }

    /// Remove the session and mark it closed. Returns whether it existed.
    pub fn destroy(&self, stream_id: &str) -> bool {
        let removed = self.sessions.write().remove(stream_id);
        match removed {
            Some(session) => {
                session.close();
                debug!(stream_sid = %stream_id, "Session destroyed");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn stream_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    fn config() -> Arc<SessionConfig> {
        Arc::new(SessionConfig {
            system_prompt: "system".into(),
            ..Default::default()
        })
    }

    #[test]
    fn test_create_is_idempotent() {
        let registry = SessionRegistry::new();
        let first = registry.create("CA1", config());
        assert!(first.is_created());
        first.session().push_turn(Role::Assistant, "hello");

        let second = registry.create("CA1", config());
        assert!(!second.is_created());
        assert!(Arc::ptr_eq(first.session(), second.session()));
        assert_eq!(second.session().transcript().len(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_missing_is_none() {
        let registry = SessionRegistry::new();
        assert!(registry.get("CAX").is_none());
        assert!(registry.update("CAX", |s| s.pending_audio.push(vec![1])).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_mutates_session_state() {
        let registry = SessionRegistry::new();
        registry.create("CA1", config());
        let len = registry.update("CA1", |s| {
            s.pending_audio.push(vec![1, 2]);
            s.pending_audio.len()
        });
        assert_eq!(len, Some(1));
        assert_eq!(registry.get("CA1").unwrap().pending_chunks(), 1);
    }

    #[test]
    fn test_destroy_closes_session() {
        let registry = SessionRegistry::new();
        let session = registry.create("CA1", config()).session().clone();
        assert!(registry.destroy("CA1"));
        assert!(!registry.destroy("CA1"));
        assert!(session.is_closed());
        assert!(registry.get("CA1").is_none());
    }

    #[test]
    fn test_stream_ids_sorted() {
        let registry = SessionRegistry::new();
        registry.create("CB2", config());
        registry.create("CA1", config());
        assert_eq!(registry.stream_ids(), vec!["CA1", "CB2"]);
    }

    #[test]
    fn test_concurrent_creates_yield_one_session() {
        let registry = Arc::new(SessionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.create("CA1", config()).is_created())
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| *c)
            .count();
        assert_eq!(created, 1);
        assert_eq!(registry.len(), 1);
    }
}
