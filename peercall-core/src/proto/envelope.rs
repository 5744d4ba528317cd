use super::error::ProtocolError;
use super::sdp::{IceCandidate, SessionDescription};
use crate::types::{MediaKind, PeerId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity announcement sent once after the channel opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announce {
    pub name: String,
    pub id: PeerId,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferPayload {
    pub to: PeerId,
    pub from: PeerId,
    pub description: SessionDescription,
    pub session_id: String,
    pub media: MediaKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub to: PeerId,
    pub from: PeerId,
    pub description: SessionDescription,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePayload {
    pub to: PeerId,
    pub from: PeerId,
    pub candidate: IceCandidate,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByePayload {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<PeerId>,
}

/// A decoded relay frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    New(Announce),
    /// Peer list as published by the relay, kept verbatim.
    Peers(Value),
    Offer(OfferPayload),
    Answer(AnswerPayload),
    Candidate(CandidatePayload),
    /// The departing peer's id.
    Leave(PeerId),
    Bye(ByePayload),
    /// Relay-side failure, usually a peer lookup miss.
    Error(Value),
    Keepalive,
}

/// Frame layout shared by every envelope kind.
#[derive(Serialize, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::New(_) => "new",
            Self::Peers(_) => "peers",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::Candidate(_) => "candidate",
            Self::Leave(_) => "leave",
            Self::Bye(_) => "bye",
            Self::Error(_) => "error",
            Self::Keepalive => "keepalive",
        }
    }

    /// The wire session id this envelope refers to, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Offer(p) => Some(&p.session_id),
            Self::Answer(p) => Some(&p.session_id),
            Self::Candidate(p) => Some(&p.session_id),
            Self::Bye(p) => Some(&p.session_id),
            _ => None,
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let frame: Frame = serde_json::from_str(text)?;
        Self::from_parts(&frame.kind, frame.data)
    }

    fn from_parts(kind: &str, data: Value) -> Result<Self, ProtocolError> {
        Ok(match kind {
            "new" => Self::New(payload("new", data)?),
            "peers" => Self::Peers(data),
            "offer" => Self::Offer(payload("offer", data)?),
            "answer" => Self::Answer(payload("answer", data)?),
            "candidate" => Self::Candidate(payload("candidate", data)?),
            "leave" => Self::Leave(payload("leave", data)?),
            "bye" => Self::Bye(payload("bye", data)?),
            "error" => Self::Error(data),
            "keepalive" => Self::Keepalive,
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        })
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let data = match self {
            Self::New(p) => serde_json::to_value(p)?,
            Self::Peers(v) | Self::Error(v) => v.clone(),
            Self::Offer(p) => serde_json::to_value(p)?,
            Self::Answer(p) => serde_json::to_value(p)?,
            Self::Candidate(p) => serde_json::to_value(p)?,
            Self::Leave(p) => serde_json::to_value(p)?,
            Self::Bye(p) => serde_json::to_value(p)?,
            Self::Keepalive => Value::Object(Default::default()),
        };
        let frame = Frame {
            kind: self.kind().to_string(),
            data,
        };
        Ok(serde_json::to_string(&frame)?)
    }
}

fn payload<T: DeserializeOwned>(kind: &'static str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}
