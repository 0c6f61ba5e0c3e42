//! Session-keyed registry of conversations.
//!
//! Owned by the serving layer and passed into handlers explicitly. Each
//! conversation sits behind its own async mutex, held for the whole turn, so
//! one conversation never has two completion calls in flight while distinct
//! conversations proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::session::Conversation;

pub type SharedConversation = Arc<Mutex<Conversation>>;

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SharedConversation>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session seeded with `seed` and return its id.
    pub fn create(&self, seed: &str) -> Uuid {
        let id = Uuid::new_v4();
        let conversation = Arc::new(Mutex::new(Conversation::new(seed)));
        self.write().insert(id, conversation);
        tracing::info!(session = %id, "session started");
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<SharedConversation> {
        self.read().get(id).cloned()
    }

    /// End a session. Returns false if it did not exist.
    pub fn remove(&self, id: &Uuid) -> bool {
        let removed = self.write().remove(id).is_some();
        if removed {
            tracing::info!(session = %id, "session ended");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Entries are inserted and removed whole, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, SharedConversation>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, SharedConversation>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_get_remove() {
        let store = SessionStore::new();
        let a = store.create("seed a");
        let b = store.create("seed b");
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);

        let conv = store.get(&a).unwrap();
        assert_eq!(conv.try_lock().unwrap().seed(), "seed a");

        assert!(store.remove(&a));
        assert!(!store.remove(&a));
        assert!(store.get(&a).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn poisoned_lock_still_registers_sessions() {
        let store = SessionStore::new();
        let existing = store.create("before");

        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.sessions.write().unwrap();
            panic!("writer died");
        }));
        assert!(poisoned.is_err());
        assert!(store.sessions.is_poisoned());

        let id = store.create("after");
        assert!(store.get(&id).is_some());
        assert!(store.get(&existing).is_some());
        assert_eq!(store.len(), 2);
        assert!(store.remove(&id));
    }

    #[tokio::test]
    async fn sessions_do_not_share_state() {
        let store = SessionStore::new();
        let a = store.get(&store.create("seed")).unwrap();
        let b = store.get(&store.create("seed")).unwrap();

        let _held = a.lock().await;
        // a turn in flight on `a` never blocks `b`
        assert!(b.try_lock().is_ok());
        assert!(a.try_lock().is_err());
    }
}
