#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use flagdesk_kernel_contracts::identity::UserId;
use flagdesk_kernel_contracts::session::UserSession;

/// Per-identity workflow state and cached listings. In-memory only; lost on restart.
///
/// Callers load a copy, work on it, and save it back. Two concurrent events for the same
/// identity therefore resolve as last writer wins. Different identities never contend beyond
/// the map lookup itself.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, UserSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, UserSession>> {
        // A panicked writer can only leave a whole session behind, never a torn one.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn load(&self, user_id: UserId) -> UserSession {
        self.lock().get(&user_id).cloned().unwrap_or_default()
    }

    pub fn save(&self, user_id: UserId, session: UserSession) {
        let mut map = self.lock();
        if session == UserSession::default() {
            map.remove(&user_id);
        } else {
            map.insert(user_id, session);
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.lock().len()
    }
}
