//! Shared duplex channel to the relay server.

use crate::transport::Transport;
use log::{debug, warn};
use peercall_core::Envelope;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Owns the live transport, if any. Sends never fail loudly: a frame that
/// cannot be delivered is logged and dropped.
#[derive(Default)]
pub struct SignalChannel {
    transport: RwLock<Option<Arc<dyn Transport>>>,
}

impl SignalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn attach(&self, transport: Arc<dyn Transport>) {
        if let Some(previous) = self.transport.write().await.replace(transport) {
            previous.disconnect().await;
        }
    }

    /// Forget the transport after the relay went away.
    pub(crate) async fn detach(&self) {
        self.transport.write().await.take();
    }

    pub async fn is_open(&self) -> bool {
        self.transport.read().await.is_some()
    }

    /// Encode and send one envelope. Returns whether it was handed to the
    /// transport.
    pub async fn send(&self, envelope: &Envelope) -> bool {
        let transport = self.transport.read().await.clone();
        let Some(transport) = transport else {
            warn!(
                "Socket not connected, dropping {} envelope",
                envelope.kind()
            );
            return false;
        };

        let text = match envelope.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode {} envelope: {e}", envelope.kind());
                return false;
            }
        };

        debug!("Sending {} envelope", envelope.kind());
        match transport.send_text(text).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send {} envelope: {e}", envelope.kind());
                false
            }
        }
    }

    /// Close the transport. Safe to call repeatedly.
    pub async fn close(&self) {
        let transport = self.transport.write().await.take();
        if let Some(transport) = transport {
            transport.disconnect().await;
        }
    }
}
