//! One negotiated (or negotiating) call leg.

use crate::media::{MediaStream, PeerConnection};
use chrono::{DateTime, Utc};
use log::debug;
use peercall_core::proto::IceCandidate;
use peercall_core::{MediaKind, PeerId, SessionKey};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Immutable snapshot of a session handed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub key: SessionKey,
    pub peer: PeerId,
    /// `None` for placeholders created by early candidates.
    pub media: Option<MediaKind>,
    pub created_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn wire_id(&self) -> String {
        self.key.wire_id()
    }
}

/// Everything a session owns once negotiation starts.
pub(crate) struct Negotiation {
    pub connection: Arc<dyn PeerConnection>,
    pub local_stream: Arc<dyn MediaStream>,
    /// Event pump and candidate pacer of this connection.
    pub tasks: Vec<JoinHandle<()>>,
}

impl Negotiation {
    pub(crate) fn release(self) {
        for task in &self.tasks {
            task.abort();
        }
        self.connection.close();
        self.local_stream.stop();
    }
}

pub struct Session {
    key: SessionKey,
    peer: PeerId,
    media: Option<MediaKind>,
    created_at: DateTime<Utc>,
    negotiation: Option<Negotiation>,
    remote_description_applied: bool,
    /// Candidates that arrived before the remote description. Kept in
    /// arrival order and drained exactly once.
    pending_remote_candidates: Vec<IceCandidate>,
    closed: bool,
}

impl Session {
    pub fn new(key: SessionKey, peer: PeerId, media: MediaKind) -> Self {
        Self {
            media: Some(media),
            ..Self::placeholder(key, peer)
        }
    }

    /// A session created only to hold candidates that beat the offer.
    pub fn placeholder(key: SessionKey, peer: PeerId) -> Self {
        Self {
            key,
            peer,
            media: None,
            created_at: Utc::now(),
            negotiation: None,
            remote_description_applied: false,
            pending_remote_candidates: Vec::new(),
            closed: false,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn media(&self) -> Option<MediaKind> {
        self.media
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            key: self.key.clone(),
            peer: self.peer.clone(),
            media: self.media,
            created_at: self.created_at,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn has_connection(&self) -> bool {
        self.negotiation.is_some()
    }

    pub fn connection(&self) -> Option<Arc<dyn PeerConnection>> {
        self.negotiation.as_ref().map(|n| n.connection.clone())
    }

    pub fn local_stream(&self) -> Option<Arc<dyn MediaStream>> {
        self.negotiation.as_ref().map(|n| n.local_stream.clone())
    }

    pub fn remote_description_applied(&self) -> bool {
        self.remote_description_applied
    }

    /// The connection, if a candidate can be applied to it right now.
    pub fn ready_connection(&self) -> Option<Arc<dyn PeerConnection>> {
        if self.remote_description_applied {
            self.connection()
        } else {
            None
        }
    }

    pub fn pending_remote_candidates(&self) -> &[IceCandidate] {
        &self.pending_remote_candidates
    }

    pub fn buffer_candidate(&mut self, candidate: IceCandidate) {
        self.pending_remote_candidates.push(candidate);
        debug!(
            "Buffered remote candidate for {} ({} pending)",
            self.key,
            self.pending_remote_candidates.len()
        );
    }

    /// Install a connection, replacing (and releasing) any previous one.
    /// The remote description of the new connection starts unapplied.
    pub(crate) fn attach(&mut self, media: MediaKind, negotiation: Negotiation) {
        if let Some(previous) = self.negotiation.replace(negotiation) {
            debug!("Replacing connection of session {}", self.key);
            previous.release();
        }
        self.media = Some(media);
        self.remote_description_applied = false;
        self.closed = false;
    }

    /// Record that the remote description is set and hand back the buffered
    /// candidates, in arrival order, for the caller to apply.
    pub fn mark_remote_description_applied(&mut self) -> Vec<IceCandidate> {
        self.remote_description_applied = true;
        std::mem::take(&mut self.pending_remote_candidates)
    }

    /// Release the connection, local media and background tasks. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(negotiation) = self.negotiation.take() {
            negotiation.release();
        }
        self.pending_remote_candidates.clear();
        self.remote_description_applied = false;
        debug!("Closed session {}", self.key);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("peer", &self.peer)
            .field("media", &self.media)
            .field("has_connection", &self.has_connection())
            .field("remote_description_applied", &self.remote_description_applied)
            .field("pending_remote_candidates", &self.pending_remote_candidates.len())
            .field("closed", &self.closed)
            .finish()
    }
}
