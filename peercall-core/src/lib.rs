//! Runtime-agnostic building blocks for peer call signaling.
//!
//! This crate holds everything that does not need an async runtime: the
//! identities and keys used to track call sessions, the observable call
//! states, and the JSON wire envelopes exchanged with the relay server.

pub mod proto;
pub mod types;

pub use proto::{Envelope, ProtocolError};
pub use types::{CallState, MediaKind, PeerId, SessionKey, SignalingState};
