//! The `process` pipeline: videos → chunks → transcripts → record.
//!
//! Each discovered video moves through
//!
//! ```text
//! Discovered ──▶ Chunked ──▶ Transcribed ──▶ Recorded
//!     │              │
//!     └──────────────┴──▶ Skipped (file gone / no audio chunks)
//! ```
//!
//! Videos are handled one at a time in discovery order. Per-video and
//! per-chunk problems are logged and absorbed; only environment failures
//! (output folders, the final JSON) abort the run.
//!
//! The run ends with exactly one pass of terminal side effects, in this
//! order: remove the audio working folder, write the transcript record,
//! and (only if enabled and everything before it succeeded) remove the
//! input root folder.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::audio::{self, AudioDecoder};
use crate::config::Config;
use crate::discover;
use crate::models::{TranscriptRecord, VideoSource};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::store;
use crate::transcribe::{SpeechRecognizer, Transcriber};

/// Per-video lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoState {
    Discovered,
    Chunked { chunks: usize },
    Transcribed { chunks: usize, failed: usize },
    Recorded { chunks: usize, failed: usize },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The file disappeared between discovery and processing.
    Missing,
    /// Decoding failed or the track was empty.
    NoAudio,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Missing => write!(f, "file not found"),
            SkipReason::NoAudio => write!(f, "no audio chunks created"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub chunk_ms: u64,
    pub delete_audio: bool,
    pub delete_root: bool,
}

impl ProcessOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_ms: config.chunking.chunk_ms,
            delete_audio: config.cleanup.delete_audio,
            delete_root: config.cleanup.delete_root,
        }
    }
}

/// Outcome of one `process` run.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub record_path: PathBuf,
    pub videos_found: usize,
    pub videos: Vec<(String, VideoState)>,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub root_deleted: bool,
}

impl ProcessReport {
    pub fn recorded(&self) -> usize {
        self.videos
            .iter()
            .filter(|(_, s)| matches!(s, VideoState::Recorded { .. }))
            .count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, SkipReason)> {
        self.videos.iter().filter_map(|(name, s)| match s {
            VideoState::Skipped(reason) => Some((name.as_str(), *reason)),
            _ => None,
        })
    }
}

/// Services and settings for one run, constructed once by the caller.
pub struct Pipeline<'a> {
    decoder: &'a dyn AudioDecoder,
    transcriber: Transcriber<'a>,
    progress: &'a dyn ProgressReporter,
    options: ProcessOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        decoder: &'a dyn AudioDecoder,
        recognizer: &'a dyn SpeechRecognizer,
        progress: &'a dyn ProgressReporter,
        options: ProcessOptions,
    ) -> Self {
        Self {
            decoder,
            transcriber: Transcriber::new(recognizer),
            progress,
            options,
        }
    }

    /// Transcribe every video under `root` and write the record next to it.
    pub async fn process(
        &self,
        root: &Path,
        audio_dir: &Path,
        text_dir: &Path,
    ) -> Result<ProcessReport> {
        if self.options.chunk_ms == 0 {
            bail!("chunk length must be > 0 ms");
        }
        if !root.is_dir() {
            bail!("Root folder does not exist: {}", root.display());
        }
        let record_path = store::record_path(&logical_path(root)?);
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", root.display()))?;

        self.progress.report(ProgressEvent::Discovering {
            root: root.display().to_string(),
        });
        let videos = discover::find_videos(&root)?;

        fs::create_dir_all(audio_dir)
            .with_context(|| format!("Failed to create audio folder: {}", audio_dir.display()))?;
        fs::create_dir_all(text_dir)
            .with_context(|| format!("Failed to create text folder: {}", text_dir.display()))?;

        let mut record = TranscriptRecord::new();
        let mut states = Vec::with_capacity(videos.len());
        let total = videos.len() as u64;

        for (i, video) in videos.iter().enumerate() {
            self.progress.report(ProgressEvent::Video {
                n: i as u64 + 1,
                total,
                name: video.base_name.clone(),
            });

            let state = self
                .process_video(video, audio_dir, text_dir, &mut record)
                .await?;
            if let VideoState::Skipped(reason) = &state {
                tracing::warn!(video = %video.path.display(), %reason, "skipping video");
            }
            states.push((video.base_name.clone(), state));
        }

        let (chunks, failed_chunks) = states.iter().fold((0, 0), |(c, f), (_, s)| match s {
            VideoState::Recorded { chunks, failed } => (c + chunks, f + failed),
            _ => (c, f),
        });

        let root_deleted = self.finish(&record, &record_path, &root, audio_dir)?;

        Ok(ProcessReport {
            record_path,
            videos_found: videos.len(),
            videos: states,
            chunks,
            failed_chunks,
            root_deleted,
        })
    }

    /// Drive one video to `Recorded` or `Skipped`.
    async fn process_video(
        &self,
        video: &VideoSource,
        audio_dir: &Path,
        text_dir: &Path,
        record: &mut TranscriptRecord,
    ) -> Result<VideoState> {
        let mut state = VideoState::Discovered;
        let mut chunks = Vec::new();
        let mut transcribed = None;

        loop {
            state = match state {
                VideoState::Discovered => {
                    if !video.path.exists() {
                        VideoState::Skipped(SkipReason::Missing)
                    } else {
                        tracing::info!(video = %video.path.display(), "processing");
                        chunks = audio::chunk_video(
                            self.decoder,
                            video,
                            audio_dir,
                            self.options.chunk_ms,
                        )
                        .await?;
                        VideoState::Chunked {
                            chunks: chunks.len(),
                        }
                    }
                }
                VideoState::Chunked { chunks: 0 } => VideoState::Skipped(SkipReason::NoAudio),
                VideoState::Chunked { chunks: n } => {
                    let out = self
                        .transcriber
                        .transcribe_all(
                            &chunks,
                            &text_dir.join(&video.base_name),
                            &video.base_name,
                            self.progress,
                        )
                        .await?;
                    let failed = out.failed;
                    transcribed = Some(out.transcripts);
                    VideoState::Transcribed { chunks: n, failed }
                }
                VideoState::Transcribed { chunks: n, failed } => {
                    if record.videos.contains_key(&video.base_name) {
                        tracing::warn!(
                            video = %video.base_name,
                            "duplicate video name, replacing earlier transcript"
                        );
                    }
                    record.insert(
                        &video.base_name,
                        &text_dir.join(&video.base_name),
                        transcribed.take().unwrap_or_default(),
                    );
                    VideoState::Recorded { chunks: n, failed }
                }
                done @ (VideoState::Recorded { .. } | VideoState::Skipped(_)) => return Ok(done),
            };
        }
    }

    /// Terminal side effects. Returns whether `root` was removed.
    fn finish(
        &self,
        record: &TranscriptRecord,
        record_path: &Path,
        root: &Path,
        audio_dir: &Path,
    ) -> Result<bool> {
        let mut clean = true;

        if self.options.delete_audio && audio_dir.exists() {
            if let Err(e) = fs::remove_dir_all(audio_dir) {
                tracing::warn!(dir = %audio_dir.display(), error = %e, "failed to remove audio folder");
                clean = false;
            }
        }

        store::write_record(record, record_path)?;

        if !self.options.delete_root {
            return Ok(false);
        }
        if !clean {
            tracing::warn!(root = %root.display(), "cleanup incomplete, keeping root folder");
            return Ok(false);
        }
        fs::remove_dir_all(root)
            .with_context(|| format!("Failed to remove root folder: {}", root.display()))?;
        Ok(true)
    }
}

/// `path` made absolute with `.` and `..` folded away, symlinks left as given.
/// The record is placed beside this path, so a symlinked root keeps its
/// record next to the link.
fn logical_path(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// CLI entry point for `vidscribe process`.
pub async fn run_process(
    config: &Config,
    root: &Path,
    audio_dir: &Path,
    text_dir: &Path,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let decoder = audio::FfmpegDecoder::new(config.transcription.ffmpeg.clone());
    let recognizer = crate::transcribe::create_recognizer(&config.transcription)?;
    let pipeline = Pipeline::new(
        &decoder,
        recognizer.as_ref(),
        progress,
        ProcessOptions::from_config(config),
    );

    let report = pipeline.process(root, audio_dir, text_dir).await?;

    println!("process {}", root.display());
    println!("  videos found: {}", report.videos_found);
    println!("  videos transcribed: {}", report.recorded());
    for (name, reason) in report.skipped() {
        println!("  skipped: {} ({})", name, reason);
    }
    println!("  chunks: {}", report.chunks);
    println!("  failed chunks: {}", report.failed_chunks);
    if report.root_deleted {
        println!("  removed root folder: {}", root.display());
    }
    println!("Transcriptions JSON saved to: {}", report.record_path.display());
    println!("ok");
    Ok(())
}
