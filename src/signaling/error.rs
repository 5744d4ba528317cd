//! Signaling error types.

use crate::media::MediaError;
use peercall_core::SessionKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("already connected to the relay")]
    AlreadyConnected,

    #[error("session already exists: {0}")]
    SessionExists(SessionKey),

    #[error("session not found: {0}")]
    SessionNotFound(SessionKey),

    #[error("session {0} has no peer connection")]
    NoConnection(SessionKey),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("transport error: {0}")]
    Transport(anyhow::Error),
}
