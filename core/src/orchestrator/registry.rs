//! Keyed collection of interception sessions and their subprocess handles.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::{InterceptionSession, SessionStatus};
use crate::error::{Error, Result};

struct SessionEntry<C> {
    session: InterceptionSession,
    process: Option<C>,
}

/// Exclusive owner of every [`InterceptionSession`].
///
/// Locks are held only for the duration of a single map operation.
pub struct SessionRegistry<C> {
    entries: RwLock<HashMap<String, SessionEntry<C>>>,
}

impl<C> SessionRegistry<C> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a session. Fails if one already exists under the same id.
    pub fn insert(&self, session: InterceptionSession) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&session.id) {
            return Err(Error::SessionAlreadyExists(session.id));
        }
        entries.insert(
            session.id.clone(),
            SessionEntry {
                session,
                process: None,
            },
        );
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<InterceptionSession> {
        self.entries.read().get(id).map(|e| e.session.clone())
    }

    /// All sessions, ordered by id.
    pub fn list(&self) -> Vec<InterceptionSession> {
        let mut sessions: Vec<_> = self
            .entries
            .read()
            .values()
            .map(|e| e.session.clone())
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Applies `updater` to a session. Returns false if it is not registered.
    pub fn update<F>(&self, id: &str, updater: F) -> bool
    where
        F: FnOnce(&mut InterceptionSession),
    {
        match self.entries.write().get_mut(id) {
            Some(entry) => {
                updater(&mut entry.session);
                true
            }
            None => false,
        }
    }

    /// Attaches the subprocess handle and marks the session connected.
    pub fn attach(&self, id: &str, process: C) -> bool {
        match self.entries.write().get_mut(id) {
            Some(entry) => {
                entry.process = Some(process);
                entry.session.status = SessionStatus::Connected;
                entry.session.last_error = None;
                true
            }
            None => false,
        }
    }

    /// Moves a session to `disconnecting` and hands its process handle out.
    pub fn begin_stop(&self, id: &str) -> Result<(InterceptionSession, Option<C>)> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        entry.session.status = SessionStatus::Disconnecting;
        Ok((entry.session.clone(), entry.process.take()))
    }

    pub fn remove(&self, id: &str) -> Option<InterceptionSession> {
        self.entries.write().remove(id).map(|e| e.session)
    }

    /// Removes sessions `keep` rejects, returning them with their handles.
    ///
    /// Sessions in `error` status stay for diagnosis.
    pub fn prune<F>(&self, keep: F) -> Vec<(InterceptionSession, Option<C>)>
    where
        F: Fn(&InterceptionSession) -> bool,
    {
        let mut entries = self.entries.write();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.session.status != SessionStatus::Error && !keep(&e.session))
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|id| entries.remove(&id))
            .map(|e| (e.session, e.process))
            .collect()
    }
}

impl<C> Default for SessionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn local(deployment: &str) -> InterceptionSession {
        InterceptionSession::starting("shop", deployment, deployment, 5001)
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let registry: SessionRegistry<()> = SessionRegistry::new();
        assert_ok!(registry.insert(local("orders")));

        let err = assert_err!(registry.insert(local("orders")));
        assert!(matches!(err, Error::SessionAlreadyExists(id) if id == "orders"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_attach_marks_connected() {
        let registry = SessionRegistry::new();
        registry.insert(local("orders")).unwrap();
        assert!(registry.attach("orders", 42u32));

        let session = registry.get("orders").unwrap();
        assert_eq!(session.status, SessionStatus::Connected);
        assert!(!registry.attach("missing", 7));
    }

    #[test]
    fn test_begin_stop_takes_process() {
        let registry = SessionRegistry::new();
        registry.insert(local("orders")).unwrap();
        registry.attach("orders", 42u32);

        let (session, process) = registry.begin_stop("orders").unwrap();
        assert_eq!(session.status, SessionStatus::Disconnecting);
        assert_eq!(process, Some(42));

        let (_, process) = registry.begin_stop("orders").unwrap();
        assert_eq!(process, None);

        assert!(matches!(
            registry.begin_stop("missing"),
            Err(Error::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_prune_keeps_only_listed_and_error_sessions() {
        let registry: SessionRegistry<u32> = SessionRegistry::new();
        registry
            .insert(InterceptionSession::detected("shop", "cart", None))
            .unwrap();
        registry.insert(local("orders")).unwrap();
        registry.attach("orders", 42);
        registry.insert(local("payments")).unwrap();
        registry.insert(local("broken")).unwrap();
        registry.update("broken", |s| s.mark_error("spawn failed"));

        let removed = registry.prune(|s| s.id == "payments");
        let mut removed: Vec<_> = removed.into_iter().map(|(s, p)| (s.id, p)).collect();
        removed.sort();
        assert_eq!(
            removed,
            vec![("cart".to_string(), None), ("orders".to_string(), Some(42))]
        );
        assert_eq!(registry.ids(), vec!["broken", "payments"]);
    }
}
