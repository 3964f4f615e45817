//! Audio chunking.
//!
//! Decodes a video's audio track to 16 kHz mono 16-bit PCM and splits it
//! into consecutive fixed-length segments written as `chunk_<n>.wav`
//! files in a per-video folder. The final segment holds the remainder and
//! may be shorter; an empty remainder produces no segment.
//!
//! Decoding goes through the [`AudioDecoder`] trait. [`FfmpegDecoder`]
//! shells out to FFmpeg; tests substitute their own decoder.

use anyhow::Context;
use async_trait::async_trait;
use std::io::Cursor;
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{chunk_file_name, AudioChunk, VideoSource};

/// Sample rate of every decoded track and every chunk file.
pub const SAMPLE_RATE: u32 = 16_000;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Input file not found: {0}")]
    InputNotFound(String),

    #[error("Failed to start decoder: {0}")]
    DecoderUnavailable(String),

    #[error("Decoding failed: {0}")]
    DecodeFailed(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully decoded mono PCM track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl DecodedAudio {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }

    /// Encode as an in-memory WAV file.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, AudioError> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(self.sample_rate))?;
            for &s in &self.samples {
                writer.write_sample(s)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    /// Raw little-endian 16-bit PCM, no header.
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for &s in &self.samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes
    }
}

/// Turns a video container into a decoded audio track.
#[async_trait]
pub trait AudioDecoder: Send + Sync {
    async fn decode(&self, video: &Path) -> Result<DecodedAudio, AudioError>;
}

/// Decodes through an external `ffmpeg` binary, streaming raw PCM over stdout.
pub struct FfmpegDecoder {
    binary: String,
}

impl FfmpegDecoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl AudioDecoder for FfmpegDecoder {
    async fn decode(&self, video: &Path) -> Result<DecodedAudio, AudioError> {
        if !video.exists() {
            return Err(AudioError::InputNotFound(video.display().to_string()));
        }

        let rate = SAMPLE_RATE.to_string();
        let output = tokio::process::Command::new(&self.binary)
            .arg("-nostdin")
            .args(["-v", "error", "-i"])
            .arg(video)
            .args(["-vn", "-ac", "1", "-ar", &rate])
            .args(["-f", "s16le", "-acodec", "pcm_s16le", "pipe:1"])
            .output()
            .await
            .map_err(|e| AudioError::DecoderUnavailable(format!("{}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AudioError::DecodeFailed(stderr.trim().to_string()));
        }

        Ok(DecodedAudio {
            sample_rate: SAMPLE_RATE,
            samples: pcm_from_le_bytes(&output.stdout),
        })
    }
}

fn pcm_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Number of samples in a full-length chunk. Never zero.
///
/// Saturates for chunk lengths too large to count in samples, which then
/// cover any whole track in one chunk.
pub fn samples_per_chunk(sample_rate: u32, chunk_ms: u64) -> usize {
    let samples = (sample_rate as u64).saturating_mul(chunk_ms) / 1000;
    usize::try_from(samples.max(1)).unwrap_or(usize::MAX)
}

/// Consecutive, non-overlapping ranges covering `0..total`.
///
/// Yields `ceil(total / per_chunk)` ranges; only the last may be short.
pub fn chunk_ranges(total: usize, per_chunk: usize) -> Vec<Range<usize>> {
    let per_chunk = per_chunk.max(1);
    (0..total)
        .step_by(per_chunk)
        .map(|start| start..start.saturating_add(per_chunk).min(total))
        .collect()
}

/// Write `audio` as numbered WAV segments into `dir`.
pub fn write_chunks(
    audio: &DecodedAudio,
    dir: &Path,
    chunk_ms: u64,
) -> Result<Vec<AudioChunk>, AudioError> {
    let per_chunk = samples_per_chunk(audio.sample_rate, chunk_ms);
    let spec = wav_spec(audio.sample_rate);

    let mut chunks = Vec::new();
    for (i, range) in chunk_ranges(audio.samples.len(), per_chunk)
        .into_iter()
        .enumerate()
    {
        let ordinal = i + 1;
        let path = dir.join(chunk_file_name(ordinal));
        let mut writer = hound::WavWriter::create(&path, spec)?;
        for &s in &audio.samples[range.clone()] {
            writer.write_sample(s)?;
        }
        writer.finalize()?;

        chunks.push(AudioChunk {
            ordinal,
            path,
            samples: range.len(),
        });
    }
    Ok(chunks)
}

/// Read a chunk file back into memory.
pub fn load_chunk(path: &Path) -> Result<DecodedAudio, AudioError> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.channels != 1 || spec.bits_per_sample != 16 {
        return Err(AudioError::DecodeFailed(format!(
            "Expected mono 16-bit audio, got {} channels at {} bits",
            spec.channels, spec.bits_per_sample
        )));
    }
    let samples = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DecodedAudio {
        sample_rate: spec.sample_rate,
        samples,
    })
}

/// Folder holding one video's chunk files.
pub fn video_audio_dir(audio_dir: &Path, video: &VideoSource) -> PathBuf {
    audio_dir.join(&video.base_name)
}

/// Decode `video` and split it into chunk files under `audio_dir/<base_name>/`.
///
/// A video that cannot be decoded yields an empty list and a warning; it
/// never fails the batch. Failing to create the folder or write a chunk
/// file is an environment problem and is returned as an error.
pub async fn chunk_video(
    decoder: &dyn AudioDecoder,
    video: &VideoSource,
    audio_dir: &Path,
    chunk_ms: u64,
) -> anyhow::Result<Vec<AudioChunk>> {
    let dir = video_audio_dir(audio_dir, video);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create audio folder: {}", dir.display()))?;

    let audio = match decoder.decode(&video.path).await {
        Ok(audio) => audio,
        Err(e) => {
            tracing::warn!(video = %video.path.display(), error = %e, "Error loading audio");
            return Ok(Vec::new());
        }
    };

    tracing::debug!(
        video = %video.base_name,
        duration_ms = audio.duration_ms(),
        "decoded audio track"
    );

    let out_dir = dir.clone();
    let chunks = tokio::task::spawn_blocking(move || write_chunks(&audio, &out_dir, chunk_ms))
        .await?
        .with_context(|| format!("Failed to write audio chunks to {}", dir.display()))?;

    Ok(chunks)
}
