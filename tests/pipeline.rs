//! End-to-end `process` runs with a scripted decoder and recognizer.
//!
//! Video files are plain text describing their audio track as
//! `<seconds> <amplitude>` lines, so no media tooling is needed.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use vidscribe::audio::{AudioDecoder, AudioError, DecodedAudio, SAMPLE_RATE};
use vidscribe::models::{TranscriptionFailure, TranscriptionOutcome};
use vidscribe::pipeline::{Pipeline, ProcessOptions, SkipReason, VideoState};
use vidscribe::progress::NoProgress;
use vidscribe::store;
use vidscribe::transcribe::SpeechRecognizer;

struct ScriptedDecoder;

#[async_trait]
impl AudioDecoder for ScriptedDecoder {
    async fn decode(&self, video: &Path) -> Result<DecodedAudio, AudioError> {
        let script = fs::read_to_string(video)?;
        let mut samples = Vec::new();
        for line in script.lines().filter(|l| !l.trim().is_empty()) {
            let mut parts = line.split_whitespace();
            let seconds: f64 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| AudioError::DecodeFailed(format!("bad track: {}", line)))?;
            let amplitude: i16 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| AudioError::DecodeFailed(format!("bad track: {}", line)))?;
            let n = (seconds * SAMPLE_RATE as f64).round() as usize;
            samples.extend(std::iter::repeat(amplitude).take(n));
        }
        Ok(DecodedAudio {
            sample_rate: SAMPLE_RATE,
            samples,
        })
    }
}

/// Reports the chunk's length; silence is unintelligible.
struct CountingRecognizer;

#[async_trait]
impl SpeechRecognizer for CountingRecognizer {
    fn engine_name(&self) -> &str {
        "Fake Recognizer"
    }

    async fn recognize(&self, audio: &DecodedAudio) -> TranscriptionOutcome {
        if audio.samples.iter().all(|s| *s == 0) {
            return Err(TranscriptionFailure::Unintelligible);
        }
        Ok(format!("{} samples", audio.samples.len()))
    }
}

/// Replaces the audio folder with a plain file, then fails to decode.
struct AudioFolderClobberer {
    audio_dir: PathBuf,
}

#[async_trait]
impl AudioDecoder for AudioFolderClobberer {
    async fn decode(&self, _video: &Path) -> Result<DecodedAudio, AudioError> {
        fs::remove_dir_all(&self.audio_dir)?;
        fs::write(&self.audio_dir, "not a folder")?;
        Err(AudioError::DecodeFailed("no audio stream".into()))
    }
}

struct Workspace {
    tmp: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("course")).unwrap();
        Self { tmp }
    }

    fn root(&self) -> std::path::PathBuf {
        self.tmp.path().join("course")
    }

    fn audio(&self) -> std::path::PathBuf {
        self.tmp.path().join("work/audio")
    }

    fn text(&self) -> std::path::PathBuf {
        self.tmp.path().join("work/text")
    }

    fn video(&self, rel: &str, track: &str) {
        let path = self.root().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, track).unwrap();
    }

    fn record_file(&self) -> std::path::PathBuf {
        self.tmp.path().join(store::RECORD_FILE_NAME)
    }
}

fn options(chunk_ms: u64) -> ProcessOptions {
    ProcessOptions {
        chunk_ms,
        delete_audio: true,
        delete_root: false,
    }
}

#[tokio::test]
async fn ninety_second_video_becomes_two_chunks() {
    let ws = Workspace::new();
    ws.video("lecture.mp4", "90 100");

    let pipeline = Pipeline::new(&ScriptedDecoder, &CountingRecognizer, &NoProgress, options(60_000));
    let report = pipeline
        .process(&ws.root(), &ws.audio(), &ws.text())
        .await
        .unwrap();

    assert_eq!(report.videos_found, 1);
    assert_eq!(report.recorded(), 1);
    assert_eq!(report.chunks, 2);
    assert_eq!(report.failed_chunks, 0);

    let record = store::load_record(&ws.record_file()).unwrap();
    let entry = &record.videos["lecture"];
    let chunks: Vec<(&str, &str)> = entry
        .transcriptions
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    assert_eq!(
        chunks,
        vec![("chunk_1.wav", "960000 samples"), ("chunk_2.wav", "480000 samples")]
    );
    assert!(entry.text_folder.ends_with("lecture"));

    let text_file = ws.text().join("lecture").join("chunk_2.wav.txt");
    assert_eq!(fs::read_to_string(text_file).unwrap(), "480000 samples");
}

#[tokio::test]
async fn undecodable_video_is_left_out_of_the_record() {
    let ws = Workspace::new();
    ws.video("a_good.mp4", "2 100");
    ws.video("b_broken.mkv", "corrupt");

    let pipeline = Pipeline::new(&ScriptedDecoder, &CountingRecognizer, &NoProgress, options(1_000));
    let report = pipeline
        .process(&ws.root(), &ws.audio(), &ws.text())
        .await
        .unwrap();

    assert_eq!(report.videos_found, 2);
    assert_eq!(report.recorded(), 1);
    let skipped: Vec<_> = report.skipped().collect();
    assert_eq!(skipped, vec![("b_broken", SkipReason::NoAudio)]);

    let record = store::load_record(&ws.record_file()).unwrap();
    assert!(record.videos.contains_key("a_good"));
    assert!(!record.videos.contains_key("b_broken"));
}

#[tokio::test]
async fn failed_chunk_does_not_drop_its_siblings() {
    let ws = Workspace::new();
    ws.video("talk.mp4", "1 100\n1 0\n1 100");

    let pipeline = Pipeline::new(&ScriptedDecoder, &CountingRecognizer, &NoProgress, options(1_000));
    let report = pipeline
        .process(&ws.root(), &ws.audio(), &ws.text())
        .await
        .unwrap();

    assert_eq!(report.chunks, 3);
    assert_eq!(report.failed_chunks, 1);
    assert_eq!(
        report.videos,
        vec![(
            "talk".to_string(),
            VideoState::Recorded {
                chunks: 3,
                failed: 1
            }
        )]
    );

    let record = store::load_record(&ws.record_file()).unwrap();
    let t = &record.videos["talk"].transcriptions;
    assert_eq!(t["chunk_1.wav"], "16000 samples");
    assert_eq!(t["chunk_2.wav"], "Fake Recognizer could not understand audio");
    assert_eq!(t["chunk_3.wav"], "16000 samples");
}

#[tokio::test]
async fn chunk_order_survives_reparsing() {
    let ws = Workspace::new();
    ws.video("long.mp4", "1.2 100");

    let pipeline = Pipeline::new(&ScriptedDecoder, &CountingRecognizer, &NoProgress, options(100));
    pipeline
        .process(&ws.root(), &ws.audio(), &ws.text())
        .await
        .unwrap();

    let record = store::load_record(&ws.record_file()).unwrap();
    let keys: Vec<String> = record.videos["long"].transcriptions.keys().cloned().collect();
    let expected: Vec<String> = (1..=12).map(|i| format!("chunk_{}.wav", i)).collect();
    assert_eq!(keys, expected);
}

#[tokio::test]
async fn audio_is_removed_and_root_kept_by_default() {
    let ws = Workspace::new();
    ws.video("clip.mp4", "1 100");

    let pipeline = Pipeline::new(&ScriptedDecoder, &CountingRecognizer, &NoProgress, options(1_000));
    let report = pipeline
        .process(&ws.root(), &ws.audio(), &ws.text())
        .await
        .unwrap();

    assert!(!ws.audio().exists());
    assert!(ws.text().join("clip").exists());
    assert!(ws.root().join("clip.mp4").exists());
    assert!(!report.root_deleted);
    assert!(ws.record_file().exists());
}

#[tokio::test]
async fn root_is_removed_only_when_enabled() {
    let ws = Workspace::new();
    ws.video("clip.mp4", "1 100");

    let mut opts = options(1_000);
    opts.delete_root = true;
    let pipeline = Pipeline::new(&ScriptedDecoder, &CountingRecognizer, &NoProgress, opts);
    let report = pipeline
        .process(&ws.root(), &ws.audio(), &ws.text())
        .await
        .unwrap();

    assert!(report.root_deleted);
    assert!(!ws.root().exists());
    let record = store::load_record(&ws.record_file()).unwrap();
    assert_eq!(record.chunk_count(), 1);
}

#[tokio::test]
async fn empty_root_still_writes_a_record() {
    let ws = Workspace::new();
    fs::write(ws.root().join("notes.txt"), "not a video").unwrap();

    let pipeline = Pipeline::new(&ScriptedDecoder, &CountingRecognizer, &NoProgress, options(1_000));
    let report = pipeline
        .process(&ws.root(), &ws.audio(), &ws.text())
        .await
        .unwrap();

    assert_eq!(report.videos_found, 0);
    assert_eq!(fs::read_to_string(ws.record_file()).unwrap(), "{}");
}

#[tokio::test]
async fn missing_root_fails_without_writing() {
    let ws = Workspace::new();
    let missing = ws.tmp.path().join("nope");

    let pipeline = Pipeline::new(&ScriptedDecoder, &CountingRecognizer, &NoProgress, options(1_000));
    let err = pipeline
        .process(&missing, &ws.audio(), &ws.text())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("does not exist"));
    assert!(!ws.record_file().exists());
}

#[tokio::test]
async fn oversized_chunk_length_yields_one_chunk() {
    let ws = Workspace::new();
    ws.video("clip.mp4", "3 100");

    let pipeline = Pipeline::new(&ScriptedDecoder, &CountingRecognizer, &NoProgress, options(u64::MAX));
    let report = pipeline
        .process(&ws.root(), &ws.audio(), &ws.text())
        .await
        .unwrap();

    assert_eq!(report.chunks, 1);
    let record = store::load_record(&ws.record_file()).unwrap();
    assert_eq!(
        record.videos["clip"].transcriptions["chunk_1.wav"],
        format!("{} samples", 3 * SAMPLE_RATE)
    );
}

#[tokio::test]
async fn failed_record_write_keeps_root() {
    let ws = Workspace::new();
    ws.video("clip.mp4", "1 100");
    fs::create_dir_all(ws.record_file().join("occupied")).unwrap();

    let mut opts = options(1_000);
    opts.delete_root = true;
    let pipeline = Pipeline::new(&ScriptedDecoder, &CountingRecognizer, &NoProgress, opts);
    let result = pipeline.process(&ws.root(), &ws.audio(), &ws.text()).await;

    assert!(result.is_err());
    assert!(ws.root().join("clip.mp4").exists());
    assert!(ws.record_file().is_dir());
}

#[tokio::test]
async fn failed_audio_cleanup_keeps_root() {
    let ws = Workspace::new();
    ws.video("clip.mp4", "1 100");

    let decoder = AudioFolderClobberer {
        audio_dir: ws.audio(),
    };
    let mut opts = options(1_000);
    opts.delete_root = true;
    let pipeline = Pipeline::new(&decoder, &CountingRecognizer, &NoProgress, opts);
    let report = pipeline
        .process(&ws.root(), &ws.audio(), &ws.text())
        .await
        .unwrap();

    assert!(!report.root_deleted);
    assert!(ws.audio().is_file());
    assert!(ws.root().join("clip.mp4").exists());
    assert_eq!(fs::read_to_string(ws.record_file()).unwrap(), "{}");
}

#[tokio::test]
async fn record_lands_beside_the_root_as_named() {
    let ws = Workspace::new();
    ws.video("clip.mp4", "1 100");
    fs::create_dir_all(ws.root().join("nested")).unwrap();
    let named = ws.root().join("nested").join("..");

    let pipeline = Pipeline::new(&ScriptedDecoder, &CountingRecognizer, &NoProgress, options(1_000));
    let report = pipeline
        .process(&named, &ws.audio(), &ws.text())
        .await
        .unwrap();

    assert_eq!(report.record_path, ws.record_file());
    assert!(ws.record_file().exists());
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_root_keeps_record_beside_the_link() {
    let ws = Workspace::new();
    ws.video("clip.mp4", "1 100");
    let links = ws.tmp.path().join("links");
    fs::create_dir_all(&links).unwrap();
    let link = links.join("course");
    std::os::unix::fs::symlink(ws.root(), &link).unwrap();

    let pipeline = Pipeline::new(&ScriptedDecoder, &CountingRecognizer, &NoProgress, options(1_000));
    let report = pipeline
        .process(&link, &ws.audio(), &ws.text())
        .await
        .unwrap();

    let beside_link = links.join(store::RECORD_FILE_NAME);
    assert_eq!(report.record_path, beside_link);
    assert!(beside_link.exists());
    assert!(!ws.record_file().exists());
    let record = store::load_record(&beside_link).unwrap();
    assert_eq!(record.chunk_count(), 1);
}
