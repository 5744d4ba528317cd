// Re-export core modules
pub use peercall_core::{
    CallState, Envelope, MediaKind, PeerId, ProtocolError, SessionKey, SignalingState, proto,
    types,
};

pub mod adapter;
pub mod config;
pub mod media;
pub mod recording;
pub mod signaling;
pub mod transport;

#[cfg(test)]
pub mod test_utils;

pub use adapter::{CallAdapter, CallListener};
pub use config::{CallAdapterConfig, RecordingConfig, SignalingConfig};
pub use signaling::{SignalingEngine, SignalingError, SignalingObserver};
