use crate::media::MediaStream;
use crate::recording::RecordedArtifact;
use crate::signaling::{PeersUpdate, SessionInfo};
use peercall_core::CallState;
use std::sync::Arc;

/// Presentation-facing callbacks of a [`super::CallAdapter`].
///
/// Called from the adapter's event path; implementations should hand work
/// off rather than block.
pub trait CallListener: Send + Sync {
    fn on_state_change(&self, state: CallState, session: Option<&SessionInfo>);

    fn on_local_stream(&self, _stream: Arc<dyn MediaStream>) {}

    fn on_peer_stream(&self, _stream: Arc<dyn MediaStream>) {}

    /// The merged stream being recorded.
    fn on_combined_stream(&self, _stream: Arc<dyn MediaStream>) {}

    fn on_recording_ready(&self, _artifact: &RecordedArtifact) {}

    fn on_peers(&self, _update: &PeersUpdate) {}
}
