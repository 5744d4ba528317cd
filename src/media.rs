//! Capabilities the engine consumes but does not implement.
//!
//! Media capture, peer connections and rendering are platform services. The
//! engine talks to them only through the traits below, so the same engine
//! drives a native WebRTC stack, a browser binding, or the mocks used in
//! tests.

use async_trait::async_trait;
use peercall_core::MediaKind;
use peercall_core::proto::{IceCandidate, SessionDescription};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media unavailable: {0}")]
    Unavailable(String),

    #[error("peer connection error: {0}")]
    Connection(String),

    #[error("description rejected: {0}")]
    Description(String),

    #[error("candidate rejected: {0}")]
    Candidate(String),

    #[error("connection closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A single audio or video track.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);
    fn stop(&self);
}

/// A bundle of tracks, local or remote.
pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;
    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;

    fn audio_tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks_of(TrackKind::Audio)
    }

    fn video_tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks_of(TrackKind::Video)
    }

    fn tracks_of(&self, kind: TrackKind) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks()
            .into_iter()
            .filter(|t| t.kind() == kind)
            .collect()
    }

    /// Stop every track. Stopped tracks stay stopped.
    fn stop(&self) {
        for track in self.tracks() {
            track.stop();
        }
    }
}

/// Camera/microphone acquisition.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire audio, plus video when `kind` is [`MediaKind::Video`].
    async fn get_user_media(&self, kind: MediaKind) -> Result<Arc<dyn MediaStream>, MediaError>;
}

/// Events raised by a peer connection after creation.
#[derive(Clone)]
pub enum PeerEvent {
    /// A local candidate was discovered and should reach the peer.
    IceCandidate(IceCandidate),
    /// The peer started sending a stream.
    RemoteStream(Arc<dyn MediaStream>),
    IceConnectionState(String),
}

impl std::fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IceCandidate(c) => f.debug_tuple("IceCandidate").field(c).finish(),
            Self::RemoteStream(s) => f.debug_tuple("RemoteStream").field(&s.id()).finish(),
            Self::IceConnectionState(s) => f.debug_tuple("IceConnectionState").field(s).finish(),
        }
    }
}

/// Where a peer connection reports its [`PeerEvent`]s.
pub type PeerEventSink = mpsc::UnboundedSender<PeerEvent>;

/// One peer connection resource, exclusively owned by a session.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, MediaError>;
    async fn create_answer(&self) -> Result<SessionDescription, MediaError>;
    async fn set_local_description(&self, desc: &SessionDescription) -> Result<(), MediaError>;
    async fn set_remote_description(&self, desc: &SessionDescription) -> Result<(), MediaError>;
    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), MediaError>;
    fn add_track(
        &self,
        track: Arc<dyn MediaTrack>,
        stream: &Arc<dyn MediaStream>,
    ) -> Result<(), MediaError>;
    /// Release the connection. No other method may be called afterwards.
    fn close(&self);
}

#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        config: &RtcConfiguration,
        events: PeerEventSink,
    ) -> Result<Arc<dyn PeerConnection>, MediaError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IceTransportPolicy {
    #[default]
    All,
    Relay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BundlePolicy {
    Balanced,
    MaxBundle,
    #[default]
    MaxCompat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtcpMuxPolicy {
    Negotiate,
    #[default]
    Require,
}

/// Settings handed to [`PeerConnectionFactory::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcConfiguration {
    pub ice_servers: Vec<IceServer>,
    pub ice_transport_policy: IceTransportPolicy,
    pub bundle_policy: BundlePolicy,
    pub rtcp_mux_policy: RtcpMuxPolicy,
}

impl Default for RtcConfiguration {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::stun("stun:stun.l.google.com:19302")],
            ice_transport_policy: IceTransportPolicy::default(),
            bundle_policy: BundlePolicy::default(),
            rtcp_mux_policy: RtcpMuxPolicy::default(),
        }
    }
}

impl RtcConfiguration {
    pub fn with_ice_server(mut self, server: IceServer) -> Self {
        self.ice_servers.push(server);
        self
    }

    pub fn relay_only(mut self) -> Self {
        self.ice_transport_policy = IceTransportPolicy::Relay;
        self
    }
}
