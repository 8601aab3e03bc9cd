//! Known session summaries and the "current" pointer
//!
//! The list keeps whatever order the server returned; the registry never
//! sorts. New sessions learned about locally go to the front, which is
//! where a server ordered by last activity would put them.

use crate::models::{ChatSession, SessionId};

/// Session summaries plus the current selection
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Vec<ChatSession>,
    current: Option<ChatSession>,
}

impl SessionRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions in server order
    pub fn list(&self) -> &[ChatSession] {
        &self.sessions
    }

    /// Installs a server listing as-is
    ///
    /// The current pointer survives; if the listing carries a newer summary
    /// of the current session, the pointer picks it up.
    pub fn replace_all(&mut self, sessions: Vec<ChatSession>) {
        self.sessions = sessions;
        if let Some(current) = self.current.as_ref() {
            if let Some(fresh) = self.sessions.iter().find(|s| s.id == current.id) {
                self.current = Some(fresh.clone());
            }
        }
    }

    /// Inserts a session or merges it into the existing entry with that id
    pub fn upsert(&mut self, session: ChatSession) {
        match self.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session.clone(),
            None => self.sessions.insert(0, session.clone()),
        }
        if self.current.as_ref().map(|c| c.id) == Some(session.id) {
            self.current = Some(session);
        }
    }

    /// Changes the current session
    pub fn set_current(&mut self, session: Option<ChatSession>) {
        self.current = session;
    }

    /// The current session, if any
    pub fn current(&self) -> Option<&ChatSession> {
        self.current.as_ref()
    }

    /// Id of the current session, if any
    pub fn current_id(&self) -> Option<SessionId> {
        self.current.as_ref().map(|s| s.id)
    }

    /// Looks up a known session
    pub fn get(&self, id: SessionId) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Evicts a session
    ///
    /// Returns true if it was current, in which case the pointer is cleared
    /// and the caller must reset the message log.
    pub fn remove(&mut self, id: SessionId) -> bool {
        self.sessions.retain(|s| s.id != id);
        if self.current_id() == Some(id) {
            self.current = None;
            true
        } else {
            false
        }
    }
}
