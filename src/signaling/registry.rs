//! In-memory map of live sessions.
//!
//! Only the signaling engine writes to the registry. Keys are unique: a
//! second live session under the same key is refused.

use super::error::SignalingError;
use super::session::Session;
use peercall_core::{PeerId, SessionKey};
use std::collections::{HashMap, VecDeque};

/// How many ended sessions are remembered for dropping trailing candidates.
const RECENTLY_CLOSED_CAPACITY: usize = 32;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionKey, Session>,
    /// Wire ids of sessions that ended, oldest first.
    recently_closed: VecDeque<String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. A refused session is closed before it is dropped.
    pub fn insert(&mut self, mut session: Session) -> Result<(), SignalingError> {
        let key = session.key().clone();
        if self.sessions.contains_key(&key) {
            session.close();
            return Err(SignalingError::SessionExists(key));
        }
        self.sessions.insert(key, session);
        Ok(())
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.contains_key(key)
    }

    pub fn get(&self, key: &SessionKey) -> Option<&Session> {
        self.sessions.get(key)
    }

    pub fn get_mut(&mut self, key: &SessionKey) -> Option<&mut Session> {
        self.sessions.get_mut(key)
    }

    /// Look a session up by the id carried on the wire.
    pub fn find_by_wire(&self, wire: &str) -> Option<&SessionKey> {
        self.sessions.keys().find(|key| key.wire_id() == wire)
    }

    /// The existing session for `key`, or a fresh placeholder.
    pub fn get_or_insert_placeholder(&mut self, key: SessionKey, peer: PeerId) -> &mut Session {
        self.sessions
            .entry(key)
            .or_insert_with_key(|key| Session::placeholder(key.clone(), peer))
    }

    /// Remove an ended session. Its wire id is remembered so that
    /// candidates still in flight for it do not resurrect it.
    pub fn remove(&mut self, key: &SessionKey) -> Option<Session> {
        let session = self.sessions.remove(key)?;
        self.remember_closed(key.wire_id());
        Some(session)
    }

    /// Remove every session that has `peer` as either party.
    pub fn remove_involving(&mut self, peer: &PeerId) -> Vec<Session> {
        let keys: Vec<SessionKey> = self
            .sessions
            .keys()
            .filter(|key| key.involves(peer))
            .cloned()
            .collect();
        keys.iter().filter_map(|key| self.remove(key)).collect()
    }

    /// Drop the session under `key` if it is only a placeholder. Returns
    /// whether one was dropped. The wire id is not remembered as closed.
    pub fn discard_placeholder(&mut self, key: &SessionKey) -> bool {
        if self.sessions.get(key).is_some_and(|s| !s.has_connection()) {
            self.sessions.remove(key);
            return true;
        }
        false
    }

    pub fn was_recently_closed(&self, wire: &str) -> bool {
        self.recently_closed.iter().any(|closed| closed == wire)
    }

    /// Allow a new session to reuse `wire`.
    pub fn forget_closed(&mut self, wire: &str) {
        self.recently_closed.retain(|closed| closed != wire);
    }

    fn remember_closed(&mut self, wire: String) {
        self.forget_closed(&wire);
        if self.recently_closed.len() == RECENTLY_CLOSED_CAPACITY {
            self.recently_closed.pop_front();
        }
        self.recently_closed.push_back(wire);
    }

    pub fn drain(&mut self) -> Vec<Session> {
        self.sessions.drain().map(|(_, session)| session).collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &SessionKey> {
        self.sessions.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
