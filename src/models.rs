//! Core data models used throughout vidscribe.
//!
//! These types represent the videos, audio chunks, transcription outcomes,
//! and index entries that flow through the transcription and retrieval
//! pipeline.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A video file handed to the pipeline by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSource {
    pub path: PathBuf,
    /// File stem, used as the key in the transcript record.
    pub base_name: String,
}

impl VideoSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let base_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self { path, base_name }
    }
}

/// One fixed-duration segment of a video's audio track, encoded as WAV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// 1-based position in the video's timeline.
    pub ordinal: usize,
    pub path: PathBuf,
    /// Length of the segment in samples at the decoder's sample rate.
    pub samples: usize,
}

impl AudioChunk {
    /// Chunk identifier used as the transcript key, e.g. `chunk_3.wav`.
    pub fn name(&self) -> String {
        chunk_file_name(self.ordinal)
    }
}

pub fn chunk_file_name(ordinal: usize) -> String {
    format!("chunk_{}.wav", ordinal)
}

/// Why a single chunk could not be transcribed.
///
/// Failures are data: they are recorded against the chunk and never
/// propagate past it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptionFailure {
    #[error("speech was unintelligible")]
    Unintelligible,
    #[error("speech service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("transcription error: {0}")]
    Other(String),
}

impl TranscriptionFailure {
    /// Human-readable text stored in place of a transcript.
    ///
    /// `engine` is the recognizer's display name, e.g.
    /// `"Google Speech Recognition"`.
    pub fn placeholder(&self, engine: &str) -> String {
        match self {
            TranscriptionFailure::Unintelligible => {
                format!("{} could not understand audio", engine)
            }
            TranscriptionFailure::ServiceUnavailable(detail) => {
                format!("Could not request results from {} service; {}", engine, detail)
            }
            TranscriptionFailure::Other(detail) => {
                format!("Error transcribing audio: {}", detail)
            }
        }
    }
}

/// Exactly one per audio chunk.
pub type TranscriptionOutcome = Result<String, TranscriptionFailure>;

/// Per-chunk transcript text keyed by chunk name, in ordinal order.
pub type ChunkTranscripts = IndexMap<String, String>;

/// Transcript entry for one video in the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoTranscript {
    pub text_folder: String,
    pub transcriptions: ChunkTranscripts,
}

/// The durable aggregate written once per pipeline run.
///
/// Keys are video base names in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TranscriptRecord {
    pub videos: IndexMap<String, VideoTranscript>,
}

impl TranscriptRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, video: &str, text_folder: &Path, transcriptions: ChunkTranscripts) {
        self.videos.insert(
            video.to_string(),
            VideoTranscript {
                text_folder: text_folder.to_string_lossy().to_string(),
                transcriptions,
            },
        );
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.videos.values().map(|v| v.transcriptions.len()).sum()
    }

    /// Flatten into `(video, chunk, text)` triples in record order.
    pub fn chunks(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.videos.iter().flat_map(|(video, entry)| {
            entry
                .transcriptions
                .iter()
                .map(move |(chunk, text)| (video.as_str(), chunk.as_str(), text.as_str()))
        })
    }
}

/// Metadata kept in parallel with an index vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub document: String,
    pub video_name: String,
    pub chunk_name: String,
}

/// A query hit: the chunk's metadata plus its distance to the query.
///
/// The chunk's embedding is not carried here. It is the index row at the
/// same position as this entry's metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexEntry {
    #[serde(flatten)]
    pub metadata: EntryMetadata,
    /// Squared Euclidean distance between unit vectors.
    pub distance: f32,
}
