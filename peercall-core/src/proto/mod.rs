//! Relay wire protocol.
//!
//! Every frame is a JSON object `{"type": ..., "data": ...}`. The open
//! string tag is decoded into the closed [`Envelope`] sum type at the edge,
//! so the engine only ever matches on typed variants.

mod envelope;
mod error;
mod sdp;

pub use envelope::{
    Announce, AnswerPayload, ByePayload, CandidatePayload, Envelope, OfferPayload,
};
pub use error::ProtocolError;
pub use sdp::{IceCandidate, SdpRewrite, SdpType, SessionDescription, apply_rewrites};
