//! The signaling engine: relay connection, session lifecycle, and the
//! offer/answer/candidate exchange.

use super::attempt::AttemptTracker;
use super::channel::SignalChannel;
use super::error::SignalingError;
use super::observer::{PeersUpdate, SignalingObserver};
use super::pacing::{CandidatePacer, CandidateRoute};
use super::registry::SessionRegistry;
use super::session::{Negotiation, Session, SessionInfo};
use crate::config::SignalingConfig;
use crate::media::{MediaDevices, MediaStream, PeerConnection, PeerConnectionFactory, PeerEvent};
use crate::transport::{TransportEvent, TransportFactory};
use log::{debug, info, warn};
use peercall_core::proto::{
    Announce, AnswerPayload, ByePayload, CandidatePayload, IceCandidate, OfferPayload,
    SessionDescription, apply_rewrites,
};
use peercall_core::{CallState, Envelope, MediaKind, PeerId, SessionKey, SignalingState};
use scopeguard::{ScopeGuard, guard};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::JoinHandle;

/// Which half of the exchange a locally created description is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalRole {
    Offer,
    Answer,
}

pub struct SignalingEngine {
    local_id: PeerId,
    config: SignalingConfig,
    transport_factory: Arc<dyn TransportFactory>,
    media: Arc<dyn MediaDevices>,
    connections: Arc<dyn PeerConnectionFactory>,

    channel: Arc<SignalChannel>,
    registry: Mutex<SessionRegistry>,
    attempts: Mutex<AttemptTracker>,
    observer: RwLock<Option<Arc<dyn SignalingObserver>>>,

    /// Bumped on [`SignalingEngine::close`]; background loops exit on change.
    shutdown: watch::Sender<u64>,
    inbound_task: Mutex<Option<JoinHandle<()>>>,
}

impl SignalingEngine {
    pub fn new(
        local_id: impl Into<PeerId>,
        config: SignalingConfig,
        transport_factory: Arc<dyn TransportFactory>,
        media: Arc<dyn MediaDevices>,
        connections: Arc<dyn PeerConnectionFactory>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(0);
        Arc::new(Self {
            local_id: local_id.into(),
            config,
            transport_factory,
            media,
            connections,
            channel: Arc::new(SignalChannel::new()),
            registry: Mutex::new(SessionRegistry::new()),
            attempts: Mutex::new(AttemptTracker::default()),
            observer: RwLock::new(None),
            shutdown,
            inbound_task: Mutex::new(None),
        })
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn config(&self) -> &SignalingConfig {
        &self.config
    }

    /// Install the observer that receives every notification. Replaces any
    /// previous observer.
    pub async fn set_observer(&self, observer: Arc<dyn SignalingObserver>) {
        *self.observer.write().await = Some(observer);
    }

    pub async fn is_connected(&self) -> bool {
        self.channel.is_open().await
    }

    /// Open the relay channel and start processing inbound envelopes. The
    /// announce is sent as soon as the transport reports it is connected.
    pub async fn connect(self: &Arc<Self>) -> Result<(), SignalingError> {
        if self.channel.is_open().await {
            return Err(SignalingError::AlreadyConnected);
        }

        info!(target: "Signaling", "Connecting to relay as {}", self.local_id);
        let (transport, events) = match self.transport_factory.create_transport().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Failed to connect to relay: {e}");
                self.notify_signaling(SignalingState::ConnectionError).await;
                return Err(SignalingError::Transport(e));
            }
        };
        self.channel.attach(transport).await;

        let engine = self.clone();
        let shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move { engine.run_inbound(events, shutdown).await });
        if let Some(previous) = self.inbound_task.lock().await.replace(handle) {
            previous.abort();
        }

        if let Some(interval) = self.config.keepalive_interval {
            tokio::spawn(run_keepalive(
                self.channel.clone(),
                interval,
                self.shutdown.subscribe(),
            ));
        }
        Ok(())
    }

    async fn run_inbound(
        self: Arc<Self>,
        mut events: mpsc::Receiver<TransportEvent>,
        mut shutdown: watch::Receiver<u64>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!("Shutdown signaled, leaving inbound loop");
                    break;
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Connected) => {
                        self.announce().await;
                        self.notify_signaling(SignalingState::ConnectionOpen).await;
                    }
                    Some(TransportEvent::TextReceived(text)) => match Envelope::decode(&text) {
                        Ok(envelope) => self.handle_envelope(envelope).await,
                        Err(e) => warn!("Dropping undecodable relay frame: {e}"),
                    },
                    Some(TransportEvent::Disconnected) | None => {
                        info!(target: "Signaling", "Relay connection closed");
                        self.channel.detach().await;
                        self.notify_signaling(SignalingState::ConnectionClosed).await;
                        break;
                    }
                }
            }
        }
    }

    async fn announce(&self) {
        self.channel
            .send(&Envelope::New(Announce {
                name: self.config.display_name.clone(),
                id: self.local_id.clone(),
                user_agent: self.config.user_agent.clone(),
            }))
            .await;
    }

    /// Process one inbound envelope. Envelopes must be handed in in arrival
    /// order; the inbound loop does this for relay traffic.
    pub async fn handle_envelope(self: &Arc<Self>, envelope: Envelope) {
        debug!("Handling {} envelope", envelope.kind());
        match envelope {
            Envelope::Offer(offer) => self.on_offer(offer).await,
            Envelope::Answer(answer) => self.on_answer(answer).await,
            Envelope::Candidate(candidate) => self.on_candidate(candidate).await,
            Envelope::Leave(peer) => self.on_leave(&peer).await,
            Envelope::Bye(bye) => self.on_bye(&bye.session_id).await,
            Envelope::Error(detail) => self.on_relay_error(detail).await,
            Envelope::Peers(peers) => {
                if let Some(observer) = self.current_observer().await {
                    let update = PeersUpdate {
                        self_id: self.local_id.clone(),
                        peers,
                    };
                    observer.on_peers(&update).await;
                }
            }
            Envelope::Keepalive => debug!("Keepalive acknowledged by relay"),
            Envelope::New(announce) => debug!("Ignoring announce echo for {}", announce.id),
        }
    }

    /// Call `peer`. Returns the new session's key once the offer is sent.
    ///
    /// Nothing is registered if media or connection setup fails. Only a
    /// session with a live connection blocks a new invite; a placeholder
    /// holding stale candidates under the same key is replaced.
    pub async fn invite(
        self: &Arc<Self>,
        peer: &PeerId,
        media: MediaKind,
    ) -> Result<SessionKey, SignalingError> {
        let key = SessionKey::outgoing(&self.local_id, peer);
        if self
            .registry
            .lock()
            .await
            .get(&key)
            .is_some_and(Session::has_connection)
        {
            return Err(SignalingError::SessionExists(key));
        }
        self.attempts.lock().await.begin(key.clone());

        let mut session = Session::new(key.clone(), peer.clone(), media);
        let info = session.info();
        let negotiation = guard(self.open_negotiation(&info, media).await?, Negotiation::release);
        let local_stream = negotiation.local_stream.clone();
        let offer = self
            .create_local_description(negotiation.connection.as_ref(), LocalRole::Offer)
            .await?;
        session.attach(media, ScopeGuard::into_inner(negotiation));
        {
            let mut registry = self.registry.lock().await;
            if registry.discard_placeholder(&key) {
                debug!("Dropping stale candidates buffered under {key}");
            }
            registry.forget_closed(&key.wire_id());
            registry.insert(session)?;
        }

        info!(target: "Signaling", "Inviting {peer} to a {media} call ({key})");
        self.notify_local_stream(&info, local_stream).await;
        self.emit(Some(&info), CallState::New).await;
        self.emit(Some(&info), CallState::Invite).await;

        self.channel
            .send(&Envelope::Offer(OfferPayload {
                to: peer.clone(),
                from: self.local_id.clone(),
                description: offer,
                session_id: key.wire_id(),
                media,
            }))
            .await;
        Ok(key)
    }

    /// Answer a ringing session. A [`MediaKind::Data`] call is answered with
    /// an empty description.
    pub async fn accept(&self, key: &SessionKey, media: MediaKind) -> Result<(), SignalingError> {
        let (connection, info) = {
            let registry = self.registry.lock().await;
            let session = registry
                .get(key)
                .ok_or_else(|| SignalingError::SessionNotFound(key.clone()))?;
            let connection = session
                .connection()
                .ok_or_else(|| SignalingError::NoConnection(key.clone()))?;
            (connection, session.info())
        };

        let description = if media == MediaKind::Data {
            let answer = SessionDescription::empty_answer();
            connection.set_local_description(&answer).await?;
            answer
        } else {
            self.create_local_description(connection.as_ref(), LocalRole::Answer)
                .await?
        };

        info!(target: "Signaling", "Accepting {key} as {media}");
        self.channel
            .send(&Envelope::Answer(AnswerPayload {
                to: info.peer.clone(),
                from: self.local_id.clone(),
                description,
                session_id: key.wire_id(),
            }))
            .await;
        self.emit(Some(&info), CallState::Connected).await;
        Ok(())
    }

    /// Hang up. The peer is told even when no local session exists.
    pub async fn bye(&self, key: &SessionKey) {
        let session = self.registry.lock().await.remove(key);

        self.channel
            .send(&Envelope::Bye(ByePayload {
                session_id: key.wire_id(),
                from: Some(self.local_id.clone()),
            }))
            .await;

        match session {
            Some(mut session) => {
                session.close();
                info!(target: "Signaling", "Ended session {key}");
                self.emit(Some(&session.info()), CallState::Bye).await;
            }
            None => debug!("bye for unknown session {key}, peer notified anyway"),
        }
    }

    /// Decline a ringing call. Same wire effect as [`Self::bye`].
    pub async fn reject(&self, key: &SessionKey) {
        self.bye(key).await;
    }

    /// Flip the enabled flag of every local audio track. Returns the new
    /// muted state, or `None` when there is nothing to mute.
    pub async fn toggle_mute(&self) -> Option<bool> {
        let tracks: Vec<_> = self
            .registry
            .lock()
            .await
            .iter()
            .filter_map(Session::local_stream)
            .flat_map(|stream| stream.audio_tracks())
            .collect();
        let enable = !tracks.first()?.is_enabled();
        for track in &tracks {
            track.set_enabled(enable);
        }
        debug!("Local audio {}", if enable { "unmuted" } else { "muted" });
        Some(!enable)
    }

    pub async fn session(&self, key: &SessionKey) -> Option<SessionInfo> {
        self.registry.lock().await.get(key).map(Session::info)
    }

    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.lock().await.iter().map(Session::info).collect()
    }

    /// Direct registry access. Never hold the guard across an await on
    /// the engine.
    #[cfg(test)]
    pub(crate) async fn registry(&self) -> tokio::sync::MutexGuard<'_, SessionRegistry> {
        self.registry.lock().await
    }

    /// Close every session and the relay channel. No call state is emitted.
    pub async fn close(&self) {
        info!(target: "Signaling", "Closing signaling engine");
        self.shutdown.send_modify(|generation| *generation += 1);
        let sessions = self.registry.lock().await.drain();
        for mut session in sessions {
            session.close();
        }
        self.channel.close().await;
        self.notify_signaling(SignalingState::ConnectionClosed).await;
    }

    async fn on_offer(self: &Arc<Self>, offer: OfferPayload) {
        let key = self.resolve_inbound(&offer.session_id, &offer.from).await;
        let info = SessionInfo {
            key: key.clone(),
            peer: offer.from.clone(),
            media: Some(offer.media),
            created_at: chrono::Utc::now(),
        };

        let negotiation = match self.open_negotiation(&info, offer.media).await {
            Ok(negotiation) => negotiation,
            Err(e) => {
                warn!("Dropping offer for {key}: {e}");
                self.abandon_offer(&key).await;
                return;
            }
        };
        let negotiation = guard(negotiation, Negotiation::release);
        if let Err(e) = negotiation
            .connection
            .set_remote_description(&offer.description)
            .await
        {
            warn!("Remote offer for {key} rejected: {e}");
            self.abandon_offer(&key).await;
            return;
        }

        let connection = negotiation.connection.clone();
        let local_stream = negotiation.local_stream.clone();
        let negotiation = ScopeGuard::into_inner(negotiation);
        let (info, pending) = {
            let mut registry = self.registry.lock().await;
            registry.forget_closed(&offer.session_id);
            let session = registry.get_or_insert_placeholder(key.clone(), offer.from.clone());
            session.attach(offer.media, negotiation);
            (session.info(), session.mark_remote_description_applied())
        };
        self.apply_candidates(&key, connection.as_ref(), pending).await;

        info!(target: "Signaling", "Incoming {} call from {} ({key})", offer.media, offer.from);
        self.notify_local_stream(&info, local_stream).await;
        self.emit(Some(&info), CallState::New).await;
        self.emit(Some(&info), CallState::Ringing).await;
    }

    async fn on_answer(&self, answer: AnswerPayload) {
        let target = {
            let registry = self.registry.lock().await;
            registry.find_by_wire(&answer.session_id).and_then(|key| {
                registry
                    .get(key)
                    .and_then(Session::connection)
                    .map(|connection| (key.clone(), connection))
            })
        };
        let Some((key, connection)) = target else {
            debug!("Answer for unknown session {}, ignoring", answer.session_id);
            return;
        };

        if let Err(e) = connection.set_remote_description(&answer.description).await {
            warn!("Remote answer for {key} rejected: {e}");
            return;
        }

        let applied = {
            let mut registry = self.registry.lock().await;
            registry
                .get_mut(&key)
                .map(|session| (session.info(), session.mark_remote_description_applied()))
        };
        let Some((info, pending)) = applied else {
            debug!("Session {key} ended while its answer was applied");
            return;
        };
        self.apply_candidates(&key, connection.as_ref(), pending).await;
        self.emit(Some(&info), CallState::Connected).await;
    }

    async fn on_candidate(&self, payload: CandidatePayload) {
        let ready = {
            let mut registry = self.registry.lock().await;
            let key = match registry.find_by_wire(&payload.session_id) {
                Some(key) => key.clone(),
                None => {
                    let key =
                        SessionKey::resolve(&payload.session_id, &self.local_id, &payload.from);
                    // Only an offer we have yet to see can be preceded by
                    // candidates; our own sessions exist before the peer
                    // learns of them.
                    if key.is_initiated_by(&self.local_id)
                        || registry.was_recently_closed(&payload.session_id)
                    {
                        debug!("Dropping candidate for ended session {key}");
                        return;
                    }
                    key
                }
            };
            let session = registry.get_or_insert_placeholder(key.clone(), payload.from.clone());
            match session.ready_connection() {
                Some(connection) => Some((key, connection, payload.candidate)),
                None => {
                    session.buffer_candidate(payload.candidate);
                    None
                }
            }
        };

        if let Some((key, connection, candidate)) = ready {
            self.apply_candidates(&key, connection.as_ref(), vec![candidate])
                .await;
        }
    }

    async fn on_leave(&self, peer: &PeerId) {
        let sessions = self.registry.lock().await.remove_involving(peer);
        if sessions.is_empty() {
            debug!("{peer} left with no shared sessions");
            return;
        }
        info!(target: "Signaling", "{peer} left, ending {} session(s)", sessions.len());
        for mut session in sessions {
            session.close();
            self.emit(Some(&session.info()), CallState::Bye).await;
        }
    }

    async fn on_bye(&self, wire: &str) {
        let session = {
            let mut registry = self.registry.lock().await;
            let key = registry.find_by_wire(wire).cloned();
            key.and_then(|key| registry.remove(&key))
        };
        match session {
            Some(mut session) => {
                session.close();
                info!(target: "Signaling", "Peer ended session {}", session.key());
                self.emit(Some(&session.info()), CallState::Bye).await;
            }
            None => debug!("bye for unknown session {wire}, ignoring"),
        }
    }

    async fn on_relay_error(&self, detail: serde_json::Value) {
        let (first, key) = {
            let mut attempts = self.attempts.lock().await;
            (attempts.report_not_found(), attempts.session().cloned())
        };
        if !first {
            debug!("Suppressing repeated relay error for the same attempt: {detail}");
            return;
        }
        let Some(key) = key else {
            warn!("Relay reported an error before any call attempt: {detail}");
            self.emit(None, CallState::PeerNotFound).await;
            return;
        };

        // Only an outgoing session that is still waiting for its answer can
        // fail to find its peer.
        let torn_down = {
            let mut registry = self.registry.lock().await;
            let negotiating = registry
                .get(&key)
                .is_some_and(|session| !session.remote_description_applied());
            if negotiating {
                registry.remove(&key)
            } else {
                None
            }
        };
        match torn_down {
            Some(mut session) => {
                warn!("Relay could not reach the peer of {key}: {detail}");
                session.close();
                self.emit(Some(&session.info()), CallState::PeerNotFound).await;
            }
            None => warn!("Ignoring relay error, {key} is not awaiting an answer: {detail}"),
        }
    }

    /// Drop whatever an aborted offer left behind. Candidates buffered for
    /// it are useless without a connection.
    async fn abandon_offer(&self, key: &SessionKey) {
        if self.registry.lock().await.discard_placeholder(key) {
            debug!("Discarded placeholder for abandoned offer {key}");
        }
    }

    /// Acquire local media, create the connection and add the local tracks.
    /// On failure everything acquired so far is released.
    async fn open_negotiation(
        self: &Arc<Self>,
        info: &SessionInfo,
        media: MediaKind,
    ) -> Result<Negotiation, SignalingError> {
        let local_stream = self.media.get_user_media(media).await?;
        let (connection, tasks) = match self.spawn_connection(info).await {
            Ok(pair) => pair,
            Err(e) => {
                local_stream.stop();
                return Err(e);
            }
        };
        let negotiation = guard(
            Negotiation {
                connection,
                local_stream,
                tasks,
            },
            Negotiation::release,
        );
        for track in negotiation.local_stream.tracks() {
            negotiation
                .connection
                .add_track(track, &negotiation.local_stream)?;
        }
        Ok(ScopeGuard::into_inner(negotiation))
    }

    /// Create a peer connection plus its event pump and candidate pacer.
    async fn spawn_connection(
        self: &Arc<Self>,
        info: &SessionInfo,
    ) -> Result<(Arc<dyn PeerConnection>, Vec<JoinHandle<()>>), SignalingError> {
        let (sink, mut events) = mpsc::unbounded_channel();
        let connection = self.connections.create(&self.config.rtc, sink).await?;

        let route = CandidateRoute {
            to: info.peer.clone(),
            from: self.local_id.clone(),
            session_id: info.wire_id(),
        };
        let (pacer, pacer_task) =
            CandidatePacer::spawn(self.channel.clone(), self.config.candidate_pacing, route);

        let engine = Arc::downgrade(self);
        let info = info.clone();
        let pump_task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    PeerEvent::IceCandidate(candidate) => pacer.submit(candidate),
                    PeerEvent::RemoteStream(stream) => {
                        let Some(engine) = Weak::upgrade(&engine) else {
                            break;
                        };
                        engine.notify_remote_stream(&info, stream).await;
                    }
                    PeerEvent::IceConnectionState(state) => {
                        debug!("ICE connection state of {} is now {state}", info.key)
                    }
                }
            }
        });

        Ok((connection, vec![pump_task, pacer_task]))
    }

    async fn create_local_description(
        &self,
        connection: &dyn PeerConnection,
        role: LocalRole,
    ) -> Result<SessionDescription, SignalingError> {
        let description = match role {
            LocalRole::Offer => connection.create_offer().await?,
            LocalRole::Answer => connection.create_answer().await?,
        };
        let description = apply_rewrites(description, &self.config.sdp_rewrites);
        connection.set_local_description(&description).await?;
        Ok(description)
    }

    async fn apply_candidates(
        &self,
        key: &SessionKey,
        connection: &dyn PeerConnection,
        candidates: Vec<IceCandidate>,
    ) {
        for candidate in candidates {
            if let Err(e) = connection.add_ice_candidate(&candidate).await {
                warn!("Failed to apply remote candidate for {key}: {e}");
            }
        }
    }

    async fn resolve_inbound(&self, wire: &str, from: &PeerId) -> SessionKey {
        let registry = self.registry.lock().await;
        match registry.find_by_wire(wire) {
            Some(key) => key.clone(),
            None => SessionKey::resolve(wire, &self.local_id, from),
        }
    }

    async fn current_observer(&self) -> Option<Arc<dyn SignalingObserver>> {
        self.observer.read().await.clone()
    }

    async fn emit(&self, session: Option<&SessionInfo>, state: CallState) {
        match session {
            Some(info) => debug!("Call state of {} -> {state}", info.key),
            None => debug!("Call state -> {state}"),
        }
        if let Some(observer) = self.current_observer().await {
            observer.on_call_state(session, state).await;
        }
    }

    async fn notify_signaling(&self, state: SignalingState) {
        if let Some(observer) = self.current_observer().await {
            observer.on_signaling_state(state).await;
        }
    }

    async fn notify_local_stream(&self, info: &SessionInfo, stream: Arc<dyn MediaStream>) {
        if let Some(observer) = self.current_observer().await {
            observer.on_local_stream(info, stream).await;
        }
    }

    async fn notify_remote_stream(&self, info: &SessionInfo, stream: Arc<dyn MediaStream>) {
        debug!("Remote stream {} arrived for {}", stream.id(), info.key);
        if let Some(observer) = self.current_observer().await {
            observer.on_remote_stream(info, stream).await;
        }
    }
}

async fn run_keepalive(
    channel: Arc<SignalChannel>,
    interval: Duration,
    mut shutdown: watch::Receiver<u64>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if !channel.send(&Envelope::Keepalive).await {
                    debug!("Channel closed, stopping keepalive");
                    break;
                }
            }
        }
    }
}
