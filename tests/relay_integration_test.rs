use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use peercall::media::{
    MediaDevices, MediaError, MediaStream, PeerConnection, PeerConnectionFactory, PeerEventSink,
    RtcConfiguration,
};
use peercall::signaling::{PeersUpdate, SessionInfo};
use peercall::transport::TokioWebSocketTransportFactory;
use peercall::{
    CallState, MediaKind, SessionKey, SignalingConfig, SignalingEngine, SignalingObserver,
    SignalingState,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

struct NoMedia;

#[async_trait]
impl MediaDevices for NoMedia {
    async fn get_user_media(&self, _kind: MediaKind) -> Result<Arc<dyn MediaStream>, MediaError> {
        Err(MediaError::Unavailable("no devices".into()))
    }
}

#[async_trait]
impl PeerConnectionFactory for NoMedia {
    async fn create(
        &self,
        _config: &RtcConfiguration,
        _events: PeerEventSink,
    ) -> Result<Arc<dyn PeerConnection>, MediaError> {
        Err(MediaError::Connection("no peer connections".into()))
    }
}

#[derive(Default)]
struct Collector {
    signaling: Mutex<Vec<SignalingState>>,
    peers: Mutex<Vec<PeersUpdate>>,
}

#[async_trait]
impl SignalingObserver for Collector {
    async fn on_signaling_state(&self, state: SignalingState) {
        self.signaling.lock().unwrap().push(state);
    }

    async fn on_call_state(&self, _session: Option<&SessionInfo>, _state: CallState) {}

    async fn on_peers(&self, update: &PeersUpdate) {
        self.peers.lock().unwrap().push(update.clone());
    }
}

/// Accepts one WebSocket client, forwards every text frame it sends to
/// `frames`, and pushes `replies` to it once the first frame arrives.
async fn spawn_relay(replies: Vec<Value>) -> (String, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut replies = Some(replies);
        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let frame: Value = serde_json::from_str(text.as_str()).unwrap();
            let _ = frames_tx.send(frame);
            for reply in replies.take().unwrap_or_default() {
                ws.send(Message::text(reply.to_string())).await.unwrap();
            }
        }
    });

    (format!("ws://{addr}/ws"), frames_rx)
}

async fn next_frame(frames: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("relay frame in time")
        .expect("relay still running")
}

#[tokio::test]
async fn test_engine_talks_to_websocket_relay() {
    let (url, mut frames) =
        spawn_relay(vec![json!({"type": "peers", "data": [{"id": "B", "name": "Bob"}]})]).await;

    let config = SignalingConfig::default().with_display_name("Alice");
    let engine = SignalingEngine::new(
        "A",
        config,
        Arc::new(TokioWebSocketTransportFactory::new(url)),
        Arc::new(NoMedia),
        Arc::new(NoMedia),
    );
    let collector = Arc::new(Collector::default());
    engine.set_observer(collector.clone()).await;
    engine.connect().await.unwrap();

    let announce = next_frame(&mut frames).await;
    assert_eq!(announce["type"], "new");
    assert_eq!(announce["data"]["id"], "A");
    assert_eq!(announce["data"]["name"], "Alice");

    for _ in 0..100 {
        if !collector.peers.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let peers = collector.peers.lock().unwrap().clone();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].self_id, "A");
    assert_eq!(peers[0].peers, json!([{"id": "B", "name": "Bob"}]));

    // Hanging up a session the engine never had still reaches the relay.
    let key = SessionKey::outgoing(&"A".into(), &"B".into());
    engine.bye(&key).await;
    let bye = next_frame(&mut frames).await;
    assert_eq!(bye["type"], "bye");
    assert_eq!(bye["data"]["session_id"], "A-B");
    assert_eq!(bye["data"]["from"], "A");

    // Media is unavailable, so the invite fails without registering anything.
    assert!(engine.invite(&"B".into(), MediaKind::Audio).await.is_err());
    assert!(engine.sessions().await.is_empty());

    engine.close().await;
    assert!(!engine.is_connected().await);
    assert!(
        collector
            .signaling
            .lock()
            .unwrap()
            .contains(&SignalingState::ConnectionClosed)
    );
}
