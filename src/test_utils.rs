use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use peercall_core::proto::{IceCandidate, SessionDescription};
use peercall_core::{CallState, MediaKind, PeerId, SessionKey, SignalingState};

use crate::adapter::CallListener;
use crate::config::SignalingConfig;
use crate::media::{
    MediaDevices, MediaError, MediaStream, MediaTrack, PeerConnection, PeerConnectionFactory,
    PeerEvent, PeerEventSink, RtcConfiguration, TrackKind,
};
use crate::recording::{
    ChunkSink, MediaRecorder, RecordedArtifact, RecorderFactory, RecordingError, Region,
    VideoSurface,
};
use crate::signaling::{PeersUpdate, SessionInfo, SignalingEngine, SignalingObserver};
use crate::transport::mock::{MockRelay, MockTransportFactory};

pub fn id(s: &str) -> PeerId {
    PeerId::from(s)
}

/// SDP body produced by [`MockPeerConnection`]; contains the High profile
/// id so rewrites are observable.
pub const MOCK_SDP: &str = "v=0\r\na=fmtp:102 profile-level-id=640c1f\r\n";

pub struct MockTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl MockTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl MediaTrack for MockTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

pub struct MockStream {
    id: String,
    tracks: Vec<Arc<MockTrack>>,
}

impl MockStream {
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Arc<Self> {
        let id = id.into();
        let mut tracks = vec![MockTrack::new(format!("{id}/audio"), TrackKind::Audio)];
        if kind.wants_video() {
            tracks.push(MockTrack::new(format!("{id}/video"), TrackKind::Video));
        }
        Arc::new(Self { id, tracks })
    }

    pub fn mock_tracks(&self) -> &[Arc<MockTrack>] {
        &self.tracks
    }

    pub fn all_stopped(&self) -> bool {
        self.tracks.iter().all(|t| t.is_stopped())
    }
}

impl MediaStream for MockStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .map(|t| t.clone() as Arc<dyn MediaTrack>)
            .collect()
    }
}

#[derive(Default)]
pub struct MockMediaDevices {
    fail: AtomicBool,
    acquired: Mutex<Vec<Arc<MockStream>>>,
}

impl MockMediaDevices {
    pub fn failing() -> Self {
        let devices = Self::default();
        devices.set_failing(true);
        devices
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> Vec<Arc<MockStream>> {
        self.acquired.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn get_user_media(&self, kind: MediaKind) -> Result<Arc<dyn MediaStream>, MediaError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MediaError::Unavailable("permission denied".into()));
        }
        let mut acquired = self.acquired.lock().unwrap();
        let stream = MockStream::new(format!("local-{}", acquired.len()), kind);
        acquired.push(stream.clone());
        Ok(stream)
    }
}

pub struct MockPeerConnection {
    events: PeerEventSink,
    reject_remote: bool,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
    tracks: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockPeerConnection {
    pub fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().unwrap().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }

    /// Remote candidates in the order they were applied.
    pub fn applied_candidates(&self) -> Vec<String> {
        self.candidates
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.candidate.clone())
            .collect()
    }

    pub fn track_ids(&self) -> Vec<String> {
        self.tracks.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Pretend ICE gathering found a local candidate.
    pub fn discover_candidate(&self, candidate: &str) {
        let _ = self
            .events
            .send(PeerEvent::IceCandidate(IceCandidate::new(candidate)));
    }

    pub fn receive_stream(&self, stream: Arc<dyn MediaStream>) {
        let _ = self.events.send(PeerEvent::RemoteStream(stream));
    }
}

#[async_trait]
impl PeerConnection for MockPeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription, MediaError> {
        Ok(SessionDescription::offer(MOCK_SDP))
    }

    async fn create_answer(&self) -> Result<SessionDescription, MediaError> {
        if self.remote.lock().unwrap().is_none() {
            return Err(MediaError::Description("no remote offer".into()));
        }
        Ok(SessionDescription::answer(MOCK_SDP))
    }

    async fn set_local_description(&self, desc: &SessionDescription) -> Result<(), MediaError> {
        *self.local.lock().unwrap() = Some(desc.clone());
        Ok(())
    }

    async fn set_remote_description(&self, desc: &SessionDescription) -> Result<(), MediaError> {
        if self.reject_remote {
            return Err(MediaError::Description("malformed sdp".into()));
        }
        *self.remote.lock().unwrap() = Some(desc.clone());
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), MediaError> {
        if self.remote.lock().unwrap().is_none() {
            return Err(MediaError::Candidate(
                "candidate added before remote description".into(),
            ));
        }
        self.candidates.lock().unwrap().push(candidate.clone());
        Ok(())
    }

    fn add_track(
        &self,
        track: Arc<dyn MediaTrack>,
        _stream: &Arc<dyn MediaStream>,
    ) -> Result<(), MediaError> {
        self.tracks.lock().unwrap().push(track.id().to_string());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockPeerConnectionFactory {
    reject_remote: AtomicBool,
    created: Mutex<Vec<Arc<MockPeerConnection>>>,
}

impl MockPeerConnectionFactory {
    /// Connections created from now on refuse every remote description.
    pub fn reject_remote_descriptions(&self) {
        self.reject_remote.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<Arc<MockPeerConnection>> {
        self.created.lock().unwrap().clone()
    }

    pub fn last(&self) -> Arc<MockPeerConnection> {
        self.created
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection created")
    }
}

#[async_trait]
impl PeerConnectionFactory for MockPeerConnectionFactory {
    async fn create(
        &self,
        _config: &RtcConfiguration,
        events: PeerEventSink,
    ) -> Result<Arc<dyn PeerConnection>, MediaError> {
        let connection = Arc::new(MockPeerConnection {
            events,
            reject_remote: self.reject_remote.load(Ordering::SeqCst),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            tracks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.created.lock().unwrap().push(connection.clone());
        Ok(connection)
    }
}

/// Observer that records everything it is told.
#[derive(Default)]
pub struct RecordingObserver {
    states: Mutex<Vec<(Option<SessionKey>, CallState)>>,
    signaling: Mutex<Vec<SignalingState>>,
    local_streams: Mutex<Vec<String>>,
    remote_streams: Mutex<Vec<String>>,
    peers: Mutex<Vec<PeersUpdate>>,
}

impl RecordingObserver {
    pub fn states(&self) -> Vec<CallState> {
        self.states.lock().unwrap().iter().map(|(_, s)| *s).collect()
    }

    pub fn transitions(&self) -> Vec<(Option<SessionKey>, CallState)> {
        self.states.lock().unwrap().clone()
    }

    pub fn signaling_states(&self) -> Vec<SignalingState> {
        self.signaling.lock().unwrap().clone()
    }

    pub fn local_streams(&self) -> Vec<String> {
        self.local_streams.lock().unwrap().clone()
    }

    pub fn remote_streams(&self) -> Vec<String> {
        self.remote_streams.lock().unwrap().clone()
    }

    pub fn peers(&self) -> Vec<PeersUpdate> {
        self.peers.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalingObserver for RecordingObserver {
    async fn on_signaling_state(&self, state: SignalingState) {
        self.signaling.lock().unwrap().push(state);
    }

    async fn on_call_state(&self, session: Option<&SessionInfo>, state: CallState) {
        self.states
            .lock()
            .unwrap()
            .push((session.map(|s| s.key.clone()), state));
    }

    async fn on_local_stream(&self, _session: &SessionInfo, stream: Arc<dyn MediaStream>) {
        self.local_streams
            .lock()
            .unwrap()
            .push(stream.id().to_string());
    }

    async fn on_remote_stream(&self, _session: &SessionInfo, stream: Arc<dyn MediaStream>) {
        self.remote_streams
            .lock()
            .unwrap()
            .push(stream.id().to_string());
    }

    async fn on_peers(&self, update: &PeersUpdate) {
        self.peers.lock().unwrap().push(update.clone());
    }
}

/// Listener that records every adapter callback.
#[derive(Default)]
pub struct RecordingListener {
    states: Mutex<Vec<CallState>>,
    local_streams: Mutex<Vec<String>>,
    peer_streams: Mutex<Vec<String>>,
    combined_streams: Mutex<Vec<String>>,
    artifacts: Mutex<Vec<RecordedArtifact>>,
}

impl RecordingListener {
    pub fn states(&self) -> Vec<CallState> {
        self.states.lock().unwrap().clone()
    }

    pub fn local_streams(&self) -> Vec<String> {
        self.local_streams.lock().unwrap().clone()
    }

    pub fn peer_streams(&self) -> Vec<String> {
        self.peer_streams.lock().unwrap().clone()
    }

    pub fn combined_streams(&self) -> Vec<String> {
        self.combined_streams.lock().unwrap().clone()
    }

    pub fn artifacts(&self) -> Vec<RecordedArtifact> {
        self.artifacts.lock().unwrap().clone()
    }
}

impl CallListener for RecordingListener {
    fn on_state_change(&self, state: CallState, _session: Option<&SessionInfo>) {
        self.states.lock().unwrap().push(state);
    }

    fn on_local_stream(&self, stream: Arc<dyn MediaStream>) {
        self.local_streams
            .lock()
            .unwrap()
            .push(stream.id().to_string());
    }

    fn on_peer_stream(&self, stream: Arc<dyn MediaStream>) {
        self.peer_streams
            .lock()
            .unwrap()
            .push(stream.id().to_string());
    }

    fn on_combined_stream(&self, stream: Arc<dyn MediaStream>) {
        self.combined_streams
            .lock()
            .unwrap()
            .push(stream.id().to_string());
    }

    fn on_recording_ready(&self, artifact: &RecordedArtifact) {
        self.artifacts.lock().unwrap().push(artifact.clone());
    }
}

pub struct MockSurface {
    track: Arc<MockTrack>,
    draws: Mutex<Vec<(String, Region)>>,
}

impl Default for MockSurface {
    fn default() -> Self {
        Self {
            track: MockTrack::new("surface/video", TrackKind::Video),
            draws: Mutex::new(Vec::new()),
        }
    }
}

impl MockSurface {
    pub fn draws(&self) -> Vec<(String, Region)> {
        self.draws.lock().unwrap().clone()
    }
}

impl VideoSurface for MockSurface {
    fn size(&self) -> (u32, u32) {
        (1280, 480)
    }

    fn draw(&self, source: &dyn MediaStream, region: Region) {
        self.draws
            .lock()
            .unwrap()
            .push((source.id().to_string(), region));
    }

    fn capture_track(&self) -> Arc<dyn MediaTrack> {
        self.track.clone()
    }
}

/// Recorder factory whose recorders emit fixed chunks: the first on start,
/// the rest on stop.
pub struct MockRecorderFactory {
    chunks: Vec<Bytes>,
    recorded_tracks: Mutex<Vec<Vec<String>>>,
    stops: Arc<AtomicUsize>,
}

impl MockRecorderFactory {
    pub fn new(chunks: &[&'static [u8]]) -> Self {
        Self {
            chunks: chunks.iter().copied().map(Bytes::from_static).collect(),
            recorded_tracks: Mutex::new(Vec::new()),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Track ids of each recorded stream, one entry per recorder.
    pub fn recorded_tracks(&self) -> Vec<Vec<String>> {
        self.recorded_tracks.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl RecorderFactory for MockRecorderFactory {
    fn create(
        &self,
        stream: Arc<dyn MediaStream>,
        _mime_type: &str,
        sink: ChunkSink,
    ) -> Result<Box<dyn MediaRecorder>, RecordingError> {
        self.recorded_tracks
            .lock()
            .unwrap()
            .push(stream.tracks().iter().map(|t| t.id().to_string()).collect());
        Ok(Box::new(MockRecorder {
            chunks: self.chunks.clone(),
            sink,
            stops: self.stops.clone(),
        }))
    }
}

struct MockRecorder {
    chunks: Vec<Bytes>,
    sink: ChunkSink,
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl MediaRecorder for MockRecorder {
    async fn start(&self) -> Result<(), RecordingError> {
        if let Some(first) = self.chunks.first() {
            self.sink.push(first.clone());
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), RecordingError> {
        for chunk in self.chunks.iter().skip(1) {
            self.sink.push(chunk.clone());
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// An engine wired to mocks, plus handles to inspect them.
pub struct TestHarness {
    pub engine: Arc<SignalingEngine>,
    pub relay: MockRelay,
    pub media: Arc<MockMediaDevices>,
    pub connections: Arc<MockPeerConnectionFactory>,
    pub observer: Arc<RecordingObserver>,
}

impl TestHarness {
    /// Engine for `local` with pacing disabled, connected and observed.
    pub async fn connected(local: &str) -> Self {
        let config = SignalingConfig::default().with_candidate_pacing(Duration::ZERO);
        Self::with_config(local, config).await
    }

    pub async fn with_config(local: &str, config: SignalingConfig) -> Self {
        let (transport_factory, relay) = MockTransportFactory::new();
        let media = Arc::new(MockMediaDevices::default());
        let connections = Arc::new(MockPeerConnectionFactory::default());
        let engine = SignalingEngine::new(
            local,
            config,
            Arc::new(transport_factory),
            media.clone(),
            connections.clone(),
        );
        let observer = Arc::new(RecordingObserver::default());
        engine.set_observer(observer.clone()).await;
        engine.connect().await.expect("mock connect should succeed");
        // Let the inbound loop process the Connected event and announce.
        settle().await;
        Self {
            engine,
            relay,
            media,
            connections,
            observer,
        }
    }
}

/// Yield long enough for spawned tasks to drain their queues.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
