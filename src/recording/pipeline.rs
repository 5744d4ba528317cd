use super::RecordingError;
use super::artifact::{ChunkSink, RecordedArtifact};
use super::compositor::{CompositeStream, VideoSurface, spawn_draw_loop};
use super::store::ArtifactStore;
use crate::config::RecordingConfig;
use crate::media::{MediaStream, MediaTrack};
use async_trait::async_trait;
use log::{info, warn};
use peercall_core::MediaKind;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A chunked recorder bound to one stream.
#[async_trait]
pub trait MediaRecorder: Send + Sync {
    async fn start(&self) -> Result<(), RecordingError>;
    /// Stop recording. Every remaining chunk must be in the sink when this
    /// returns.
    async fn stop(&self) -> Result<(), RecordingError>;
}

pub trait RecorderFactory: Send + Sync {
    fn create(
        &self,
        stream: Arc<dyn MediaStream>,
        mime_type: &str,
        sink: ChunkSink,
    ) -> Result<Box<dyn MediaRecorder>, RecordingError>;
}

struct ActiveRecording {
    recorder: Box<dyn MediaRecorder>,
    sink: ChunkSink,
    draw_task: JoinHandle<()>,
}

/// Records one call at a time.
pub struct RecordingPipeline {
    config: RecordingConfig,
    surface: Arc<dyn VideoSurface>,
    recorders: Arc<dyn RecorderFactory>,
    store: Option<Arc<dyn ArtifactStore>>,
    active: Mutex<Option<ActiveRecording>>,
}

impl RecordingPipeline {
    pub fn new(
        config: RecordingConfig,
        surface: Arc<dyn VideoSurface>,
        recorders: Arc<dyn RecorderFactory>,
    ) -> Self {
        Self {
            config,
            surface,
            recorders,
            store: None,
            active: Mutex::new(None),
        }
    }

    /// Where finished artifacts go when `persist` is set.
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    pub async fn is_recording(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Start compositing and recording. Returns the stream being recorded.
    pub async fn start(
        &self,
        local: Arc<dyn MediaStream>,
        peer: Arc<dyn MediaStream>,
        media: MediaKind,
    ) -> Result<Arc<CompositeStream>, RecordingError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }

        let mut tracks: Vec<Arc<dyn MediaTrack>> = local.audio_tracks();
        tracks.extend(peer.audio_tracks());
        if media.wants_video() {
            tracks.push(self.surface.capture_track());
        }
        if tracks.is_empty() {
            return Err(RecordingError::NoTracks);
        }
        let stream = Arc::new(CompositeStream::new(
            format!("{}+{}", peer.id(), local.id()),
            tracks,
        ));

        let sink = ChunkSink::new();
        let recorder = self
            .recorders
            .create(stream.clone(), &self.config.mime_type, sink.clone())?;
        recorder.start().await?;

        let draw_task = spawn_draw_loop(
            self.surface.clone(),
            peer,
            local,
            self.config.warm_up,
            self.config.frame_interval,
        );
        info!("Recording started ({} tracks, {media})", stream.tracks().len());
        *active = Some(ActiveRecording {
            recorder,
            sink,
            draw_task,
        });
        Ok(stream)
    }

    /// Stop and finalize. `Ok(None)` when nothing was being recorded.
    pub async fn stop(&self) -> Result<Option<RecordedArtifact>, RecordingError> {
        let Some(recording) = self.active.lock().await.take() else {
            return Ok(None);
        };
        recording.draw_task.abort();
        recording.recorder.stop().await?;

        let mut artifact =
            RecordedArtifact::from_chunks(recording.sink.take(), &self.config.mime_type);
        info!(
            "Recording finished: {} bytes in {} chunks",
            artifact.len(),
            artifact.chunk_count
        );

        if self.config.persist {
            match &self.store {
                Some(store) => match store.save(&self.config.file_name, &artifact.data).await {
                    Ok(path) => artifact.saved_to = Some(path),
                    Err(e) => warn!("Keeping recording in memory only: {e}"),
                },
                None => warn!("Recording persistence requested but no store is configured"),
            }
        }
        Ok(Some(artifact))
    }
}
