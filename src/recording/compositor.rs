use crate::media::{MediaStream, MediaTrack};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A rectangle on a [`VideoSurface`], in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Split a surface into its left and right halves.
    pub fn halves(width: u32, height: u32) -> (Region, Region) {
        let left = width / 2;
        (
            Region {
                x: 0,
                y: 0,
                width: left,
                height,
            },
            Region {
                x: left,
                y: 0,
                width: width - left,
                height,
            },
        )
    }
}

/// Drawing target whose contents can be captured as a video track.
pub trait VideoSurface: Send + Sync {
    fn size(&self) -> (u32, u32);
    /// Draw the current video frame of `source` into `region`.
    fn draw(&self, source: &dyn MediaStream, region: Region);
    fn capture_track(&self) -> Arc<dyn MediaTrack>;
}

/// Peer on the left, local party on the right.
pub fn draw_frame(surface: &dyn VideoSurface, peer: &dyn MediaStream, local: &dyn MediaStream) {
    let (width, height) = surface.size();
    let (left, right) = Region::halves(width, height);
    surface.draw(peer, left);
    surface.draw(local, right);
}

pub(crate) fn spawn_draw_loop(
    surface: Arc<dyn VideoSurface>,
    peer: Arc<dyn MediaStream>,
    local: Arc<dyn MediaStream>,
    warm_up: Duration,
    frame_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(warm_up).await;
        let mut ticker = tokio::time::interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            draw_frame(surface.as_ref(), peer.as_ref(), local.as_ref());
        }
    })
}

/// The stream handed to the recorder: both parties' audio plus, for video
/// calls, the captured surface.
pub struct CompositeStream {
    id: String,
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl CompositeStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }
}

impl std::fmt::Debug for CompositeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tracks: Vec<&str> = self.tracks.iter().map(|t| t.id()).collect();
        f.debug_struct("CompositeStream")
            .field("id", &self.id)
            .field("tracks", &tracks)
            .finish()
    }
}

impl MediaStream for CompositeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks.clone()
    }
}
