//! Call recording: composites both parties onto one surface, records the
//! merged stream into memory and optionally persists the result.

mod artifact;
mod compositor;
mod pipeline;
mod store;

pub use artifact::{ChunkSink, RecordedArtifact};
pub use compositor::{CompositeStream, Region, VideoSurface, draw_frame};
pub use pipeline::{MediaRecorder, RecorderFactory, RecordingPipeline};
pub use store::{ArtifactStore, FsArtifactStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("neither stream has a track to record")]
    NoTracks,

    #[error("recorder error: {0}")]
    Recorder(String),

    #[error("failed to persist recording: {0}")]
    Store(#[from] std::io::Error),
}
