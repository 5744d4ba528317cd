//! Event sink for engine notifications.
//!
//! The engine awaits each notification before moving on, and never holds
//! the session registry lock while doing so. Implementations may therefore
//! call back into the engine, and observe transitions in exactly the order
//! the engine produced them.

use super::session::SessionInfo;
use crate::media::MediaStream;
use async_trait::async_trait;
use peercall_core::{CallState, PeerId, SignalingState};
use std::sync::Arc;

/// Peer list published by the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct PeersUpdate {
    pub self_id: PeerId,
    pub peers: serde_json::Value,
}

#[async_trait]
pub trait SignalingObserver: Send + Sync {
    async fn on_signaling_state(&self, _state: SignalingState) {}

    /// `session` is `None` only for a relay error that arrives before any
    /// call attempt.
    async fn on_call_state(&self, session: Option<&SessionInfo>, state: CallState);

    async fn on_local_stream(&self, _session: &SessionInfo, _stream: Arc<dyn MediaStream>) {}

    async fn on_remote_stream(&self, _session: &SessionInfo, _stream: Arc<dyn MediaStream>) {}

    async fn on_peers(&self, _update: &PeersUpdate) {}
}
