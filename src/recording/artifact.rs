use bytes::{Bytes, BytesMut};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Ordered, shared collection point for recorder output.
#[derive(Debug, Clone, Default)]
pub struct ChunkSink {
    chunks: Arc<Mutex<Vec<Bytes>>>,
}

impl ChunkSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk. Empty chunks carry nothing and are skipped.
    pub fn push(&self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(chunk);
    }

    pub fn len(&self) -> usize {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn take(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.chunks.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// A finished recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedArtifact {
    pub data: Bytes,
    pub mime_type: String,
    pub chunk_count: usize,
    /// Where the artifact was persisted, if it was.
    pub saved_to: Option<PathBuf>,
}

impl RecordedArtifact {
    /// Concatenate chunks, in order, into one blob.
    pub fn from_chunks(chunks: Vec<Bytes>, mime_type: impl Into<String>) -> Self {
        let total = chunks.iter().map(Bytes::len).sum();
        let mut data = BytesMut::with_capacity(total);
        for chunk in &chunks {
            data.extend_from_slice(chunk);
        }
        Self {
            data: data.freeze(),
            mime_type: mime_type.into(),
            chunk_count: chunks.len(),
            saved_to: None,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
