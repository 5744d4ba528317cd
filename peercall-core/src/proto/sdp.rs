//! Session descriptions and ICE candidates as they appear on the wire.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

/// One half of an offer/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    #[serde(default)]
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Placeholder answer used for data-only sessions.
    pub fn empty_answer() -> Self {
        Self::answer(String::new())
    }
}

/// A connectivity option proposed by one peer for the other to attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }

    pub fn with_sdp_mid(mut self, sdp_mid: impl Into<String>) -> Self {
        self.sdp_mid = Some(sdp_mid.into());
        self
    }

    pub fn with_sdp_m_line_index(mut self, index: u16) -> Self {
        self.sdp_m_line_index = Some(index);
        self
    }
}

/// A textual substitution applied to locally created descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpRewrite {
    pub find: String,
    pub replace: String,
}

impl SdpRewrite {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
        }
    }

    /// Downgrade H.264 High profile (level 3.1) to Constrained Baseline
    /// (level 5.0) so decoders without High profile support accept the stream.
    pub fn h264_baseline() -> Self {
        Self::new("profile-level-id=640c1f", "profile-level-id=42e032")
    }
}

/// Apply every rule, in order, to every occurrence in the SDP body.
pub fn apply_rewrites(desc: SessionDescription, rules: &[SdpRewrite]) -> SessionDescription {
    if rules.is_empty() {
        return desc;
    }
    let mut sdp = desc.sdp;
    for rule in rules.iter().filter(|r| !r.find.is_empty()) {
        if sdp.contains(&rule.find) {
            log::trace!("Rewriting SDP: {} -> {}", rule.find, rule.replace);
            sdp = sdp.replace(&rule.find, &rule.replace);
        }
    }
    SessionDescription {
        sdp_type: desc.sdp_type,
        sdp,
    }
}
