//! Call state machine and media kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Observable phase of a call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// Connected to the relay, no call in progress.
    #[default]
    Idle,
    /// A session was created, locally or by an inbound offer.
    New,
    /// Outgoing call: offer sent, waiting for the answer.
    Invite,
    /// Incoming call: offer applied, waiting for the local user.
    Ringing,
    /// Both descriptions applied.
    Connected,
    /// Call ended by either side.
    Bye,
    /// The relay could not find the callee.
    #[serde(rename = "not_found")]
    PeerNotFound,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Bye | Self::PeerNotFound)
    }

    pub fn is_ringing(&self) -> bool {
        matches!(self, Self::Invite | Self::Ringing)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Terminal states only allow starting a fresh attempt (`New`) or going
    /// back to `Idle`.
    pub fn can_transition_to(&self, next: CallState) -> bool {
        use CallState::*;
        match (self, next) {
            (Idle, New | PeerNotFound) => true,
            (New, Invite | Ringing | PeerNotFound | Bye) => true,
            (Invite, Connected | Bye | PeerNotFound) => true,
            (Ringing, Connected | Bye) => true,
            (Connected, Bye) => true,
            (Bye | PeerNotFound, New | Idle) => true,
            _ => false,
        }
    }

    /// Apply a transition. Returns the new state or the rejected attempt.
    pub fn transition(self, next: CallState) -> Result<CallState, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                current_state: self,
                attempted: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::New => "new",
            Self::Invite => "invite",
            Self::Ringing => "ringing",
            Self::Connected => "connected",
            Self::Bye => "bye",
            Self::PeerNotFound => "not_found",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub current_state: CallState,
    pub attempted: CallState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid transition to {} in state {}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// Kind of media a session negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    #[default]
    Video,
    /// Data-only session; answered with an empty description.
    Data,
}

impl MediaKind {
    pub fn wants_video(&self) -> bool {
        matches!(self, Self::Video)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = UnknownMediaKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            "data" => Ok(Self::Data),
            other => Err(UnknownMediaKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown media kind: {0}")]
pub struct UnknownMediaKind(pub String);

/// State of the channel to the relay server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    ConnectionOpen,
    ConnectionClosed,
    ConnectionError,
}
