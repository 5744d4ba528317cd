//! Call-lifecycle facade over the signaling engine.
//!
//! The adapter tracks one current call, forwards every call-state change to
//! a [`CallListener`], stamps call timing, and drives the recording pipeline:
//! recording starts once a call is connected and both streams are known, and
//! stops when the call ends.

mod listener;
mod timing;

pub use listener::CallListener;
pub use timing::{CallTiming, format_duration};

use crate::config::CallAdapterConfig;
use crate::media::MediaStream;
use crate::recording::{RecordedArtifact, RecordingPipeline};
use crate::signaling::{
    PeersUpdate, SessionInfo, SignalingEngine, SignalingError, SignalingObserver,
};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use peercall_core::{CallState, MediaKind, PeerId, SessionKey};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

#[derive(Default)]
struct CallSlot {
    state: CallState,
    session: Option<SessionInfo>,
    local_stream: Option<Arc<dyn MediaStream>>,
    /// Remote stream and the session it arrived on. It may arrive before
    /// the session's `New`.
    peer_stream: Option<(SessionKey, Arc<dyn MediaStream>)>,
    timing: CallTiming,
    recording_started: bool,
    artifact: Option<RecordedArtifact>,
}

impl CallSlot {
    /// Whether an event for `session` concerns the current call.
    fn is_current(&self, session: Option<&SessionInfo>) -> bool {
        match (&self.session, session) {
            (Some(current), Some(other)) => current.key == other.key,
            _ => true,
        }
    }

    fn is_idle(&self) -> bool {
        self.session.is_none() || self.state.is_terminal() || self.state == CallState::Idle
    }
}

pub struct CallAdapter {
    engine: Arc<SignalingEngine>,
    config: CallAdapterConfig,
    listener: Arc<dyn CallListener>,
    recording: Option<RecordingPipeline>,
    slot: Mutex<CallSlot>,
}

impl CallAdapter {
    /// Wrap `engine` and register as its observer.
    pub async fn new(
        engine: Arc<SignalingEngine>,
        config: CallAdapterConfig,
        listener: Arc<dyn CallListener>,
        recording: Option<RecordingPipeline>,
    ) -> Arc<Self> {
        let adapter = Arc::new(Self {
            engine,
            config,
            listener,
            recording,
            slot: Mutex::new(CallSlot::default()),
        });
        let bridge = Arc::new(AdapterObserver(Arc::downgrade(&adapter)));
        adapter.engine.set_observer(bridge).await;
        adapter
    }

    pub fn engine(&self) -> &Arc<SignalingEngine> {
        &self.engine
    }

    pub async fn connect(&self) -> Result<(), SignalingError> {
        self.engine.connect().await
    }

    pub async fn start_call(
        &self,
        callee: &PeerId,
        media: MediaKind,
    ) -> Result<SessionKey, SignalingError> {
        if callee.is_empty() {
            warn!("Starting a call with an empty callee id");
        }
        if callee == self.engine.local_id() {
            warn!("Starting a call to ourselves ({callee})");
        }
        self.engine.invite(callee, media).await
    }

    /// Accept the current call with the configured media kind.
    pub async fn accept(&self) -> Result<(), SignalingError> {
        self.accept_with(self.config.accept_media).await
    }

    pub async fn accept_with(&self, media: MediaKind) -> Result<(), SignalingError> {
        let Some(key) = self.current_key().await else {
            warn!("accept with no current call");
            return Ok(());
        };
        self.engine.accept(&key, media).await
    }

    pub async fn reject(&self) {
        match self.current_key().await {
            Some(key) => self.engine.reject(&key).await,
            None => debug!("reject with no current call"),
        }
    }

    /// Returns the new muted state.
    pub async fn toggle_mute(&self) -> Option<bool> {
        self.engine.toggle_mute().await
    }

    /// Hang up the current call and return its duration as `m:ss`, or
    /// `None` if it never connected.
    pub async fn disconnect_call(&self) -> Option<String> {
        if let Some(key) = self.current_key().await {
            self.engine.bye(&key).await;
        }
        let mut slot = self.slot.lock().await;
        let now = Utc::now();
        if slot.timing.started_at.is_some() {
            slot.timing.mark_ended(now);
        }
        let duration = slot.timing.formatted(now);
        info!(
            "Call disconnected after {}",
            duration.as_deref().unwrap_or("(never connected)")
        );
        duration
    }

    /// Elapsed time of the current or last call.
    pub async fn call_duration(&self) -> Option<chrono::Duration> {
        self.slot.lock().await.timing.duration(Utc::now())
    }

    pub async fn call_timing(&self) -> CallTiming {
        self.slot.lock().await.timing
    }

    pub async fn current_state(&self) -> CallState {
        self.slot.lock().await.state
    }

    pub async fn current_session(&self) -> Option<SessionInfo> {
        self.slot.lock().await.session.clone()
    }

    pub async fn local_stream(&self) -> Option<Arc<dyn MediaStream>> {
        self.slot.lock().await.local_stream.clone()
    }

    pub async fn peer_stream(&self) -> Option<Arc<dyn MediaStream>> {
        self.slot
            .lock()
            .await
            .peer_stream
            .as_ref()
            .map(|(_, stream)| stream.clone())
    }

    /// The artifact of the last finished recording.
    pub async fn recorded_artifact(&self) -> Option<RecordedArtifact> {
        self.slot.lock().await.artifact.clone()
    }

    /// Tear down: hang up gracefully, finish any recording and close the
    /// engine.
    pub async fn dispose(&self) {
        info!("Disposing call adapter");
        if self.current_key().await.is_some() {
            self.disconnect_call().await;
        }
        self.finish_recording().await;
        self.engine.close().await;
    }

    async fn current_key(&self) -> Option<SessionKey> {
        let slot = self.slot.lock().await;
        match slot.state {
            CallState::Bye | CallState::PeerNotFound | CallState::Idle => None,
            _ => slot.session.as_ref().map(|s| s.key.clone()),
        }
    }

    async fn handle_call_state(&self, session: Option<&SessionInfo>, state: CallState) {
        let mut start_recording = false;
        let mut stop_recording = false;
        {
            let mut slot = self.slot.lock().await;
            if state == CallState::New && slot.is_idle() {
                let key = session.map(|s| &s.key);
                if slot.peer_stream.as_ref().is_some_and(|(k, _)| Some(k) != key) {
                    slot.peer_stream = None;
                }
                slot.session = session.cloned();
                slot.timing = CallTiming::default();
                slot.recording_started = false;
            }

            if !slot.is_current(session) {
                debug!("{state} for a session other than the current call");
            } else if !slot.state.can_transition_to(state) {
                // Forwarded below, but the current call keeps its state so
                // it can still be hung up.
                warn!("Unexpected call state transition {} -> {state}", slot.state);
            } else {
                slot.state = state;
                match state {
                    CallState::Connected => {
                        slot.timing.mark_started(Utc::now());
                        start_recording = true;
                    }
                    CallState::Bye => {
                        slot.timing.mark_ended(Utc::now());
                        stop_recording = true;
                    }
                    _ => {}
                }
            }
        }

        self.listener.on_state_change(state, session);
        if start_recording {
            self.maybe_start_recording().await;
        }
        if stop_recording {
            self.finish_recording().await;
        }
    }

    async fn handle_local_stream(&self, session: &SessionInfo, stream: Arc<dyn MediaStream>) {
        debug!("Local stream {} for {}", stream.id(), session.key);
        self.slot.lock().await.local_stream = Some(stream.clone());
        self.listener.on_local_stream(stream);
    }

    async fn handle_remote_stream(&self, session: &SessionInfo, stream: Arc<dyn MediaStream>) {
        {
            let mut slot = self.slot.lock().await;
            if !slot.is_idle() && !slot.is_current(Some(session)) {
                debug!("Ignoring remote stream for {}", session.key);
                return;
            }
            slot.peer_stream = Some((session.key.clone(), stream.clone()));
        }
        self.listener.on_peer_stream(stream);
        self.maybe_start_recording().await;
    }

    /// Start recording if enabled, connected, both streams are known, and
    /// this call has not been recorded yet.
    async fn maybe_start_recording(&self) {
        let Some(pipeline) = self.recording.as_ref().filter(|_| self.config.record) else {
            return;
        };
        let (local, peer, media) = {
            let mut slot = self.slot.lock().await;
            if slot.recording_started || slot.state != CallState::Connected {
                return;
            }
            let peer = slot
                .peer_stream
                .as_ref()
                .filter(|(key, _)| slot.session.as_ref().is_some_and(|s| &s.key == key))
                .map(|(_, stream)| stream.clone());
            let (Some(local), Some(peer)) = (slot.local_stream.clone(), peer) else {
                debug!("Recording deferred until both streams are available");
                return;
            };
            slot.recording_started = true;
            let media = slot
                .session
                .as_ref()
                .and_then(|s| s.media)
                .unwrap_or(self.config.accept_media);
            (local, peer, media)
        };

        match pipeline.start(local, peer, media).await {
            Ok(stream) => self.listener.on_combined_stream(stream),
            Err(e) => warn!("Failed to start recording: {e}"),
        }
    }

    async fn finish_recording(&self) {
        let Some(pipeline) = self.recording.as_ref() else {
            return;
        };
        match pipeline.stop().await {
            Ok(Some(artifact)) => {
                self.slot.lock().await.artifact = Some(artifact.clone());
                self.listener.on_recording_ready(&artifact);
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to finalize recording: {e}"),
        }
    }
}

/// Engine observer that forwards to the adapter without keeping it alive.
struct AdapterObserver(Weak<CallAdapter>);

#[async_trait]
impl SignalingObserver for AdapterObserver {
    async fn on_call_state(&self, session: Option<&SessionInfo>, state: CallState) {
        if let Some(adapter) = self.0.upgrade() {
            adapter.handle_call_state(session, state).await;
        }
    }

    async fn on_local_stream(&self, session: &SessionInfo, stream: Arc<dyn MediaStream>) {
        if let Some(adapter) = self.0.upgrade() {
            adapter.handle_local_stream(session, stream).await;
        }
    }

    async fn on_remote_stream(&self, session: &SessionInfo, stream: Arc<dyn MediaStream>) {
        if let Some(adapter) = self.0.upgrade() {
            adapter.handle_remote_stream(session, stream).await;
        }
    }

    async fn on_peers(&self, update: &PeersUpdate) {
        if let Some(adapter) = self.0.upgrade() {
            adapter.listener.on_peers(update);
        }
    }
}
