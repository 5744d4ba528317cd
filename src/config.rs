//! Engine, adapter and recording configuration.

use crate::media::RtcConfiguration;
use peercall_core::MediaKind;
use peercall_core::proto::SdpRewrite;
use std::time::Duration;

/// Configuration for the signaling engine.
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Display name announced to the relay.
    pub display_name: String,
    /// User agent announced to the relay.
    pub user_agent: String,
    /// Passed to every peer connection the engine creates.
    pub rtc: RtcConfiguration,
    /// Delay between discovering a local candidate and sending it.
    /// `Duration::ZERO` sends immediately.
    pub candidate_pacing: Duration,
    /// Substitutions applied to locally created offers and answers.
    pub sdp_rewrites: Vec<SdpRewrite>,
    /// Send `keepalive` envelopes at this interval while connected.
    pub keepalive_interval: Option<Duration>,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            display_name: "New Peer Connection".to_string(),
            user_agent: format!("peercall/{}", env!("CARGO_PKG_VERSION")),
            rtc: RtcConfiguration::default(),
            candidate_pacing: Duration::from_secs(1),
            sdp_rewrites: vec![SdpRewrite::h264_baseline()],
            keepalive_interval: None,
        }
    }
}

impl SignalingConfig {
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_rtc(mut self, rtc: RtcConfiguration) -> Self {
        self.rtc = rtc;
        self
    }

    pub fn with_candidate_pacing(mut self, pacing: Duration) -> Self {
        self.candidate_pacing = pacing;
        self
    }

    pub fn with_sdp_rewrites(mut self, rules: Vec<SdpRewrite>) -> Self {
        self.sdp_rewrites = rules;
        self
    }

    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.keepalive_interval = Some(interval);
        self
    }
}

/// Configuration for the call adapter.
#[derive(Debug, Clone)]
pub struct CallAdapterConfig {
    /// Media kind used by [`crate::adapter::CallAdapter::accept`].
    pub accept_media: MediaKind,
    /// Start the recording pipeline when a call connects.
    pub record: bool,
}

impl Default for CallAdapterConfig {
    fn default() -> Self {
        Self {
            accept_media: MediaKind::Video,
            record: false,
        }
    }
}

impl CallAdapterConfig {
    pub fn recording() -> Self {
        Self {
            record: true,
            ..Default::default()
        }
    }
}

/// Configuration for the recording pipeline.
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// Wait before the first composited frame so both videos are rendering.
    pub warm_up: Duration,
    /// Time between composited frames.
    pub frame_interval: Duration,
    /// Container type of the finalized artifact.
    pub mime_type: String,
    /// File name used when persisting.
    pub file_name: String,
    /// Save the artifact through the configured store as soon as it is final.
    pub persist: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            warm_up: Duration::from_secs(5),
            frame_interval: Duration::from_micros(16_667),
            mime_type: "video/webm".to_string(),
            file_name: "recorded_video.webm".to_string(),
            persist: false,
        }
    }
}

impl RecordingConfig {
    pub fn persisted(mut self) -> Self {
        self.persist = true;
        self
    }
}
