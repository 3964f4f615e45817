//! Speech-to-text for audio chunks.
//!
//! Defines the [`SpeechRecognizer`] trait and two HTTP backends:
//! - **[`GoogleRecognizer`]**: the Google Web Speech v2 endpoint, fed raw 16-bit PCM.
//! - **[`OpenAIRecognizer`]**: any OpenAI-compatible `/v1/audio/transcriptions` endpoint.
//!
//! [`Transcriber`] drives a recognizer over a video's chunks. Each chunk
//! yields exactly one [`TranscriptionOutcome`]; a failure becomes a
//! placeholder text for that chunk and never stops its siblings.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry
//! - HTTP 4xx (not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)
//!
//! Exhausted retries and rejected requests surface as
//! [`TranscriptionFailure::ServiceUnavailable`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::audio::{self, DecodedAudio};
use crate::config::TranscriptionConfig;
use crate::models::{AudioChunk, ChunkTranscripts, TranscriptionFailure, TranscriptionOutcome};
use crate::progress::{ProgressEvent, ProgressReporter};

/// A speech-to-text engine.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Display name used in failure placeholders (e.g. `"Google Speech Recognition"`).
    fn engine_name(&self) -> &str;

    async fn recognize(&self, audio: &DecodedAudio) -> TranscriptionOutcome;
}

// ============ Google Web Speech ============

const GOOGLE_SPEECH_URL: &str = "http://www.google.com/speech-api/v2/recognize";

pub struct GoogleRecognizer {
    client: reqwest::Client,
    url: String,
    api_key: String,
    language: String,
    max_retries: u32,
}

impl GoogleRecognizer {
    /// # Errors
    ///
    /// Returns an error if no API key is configured and
    /// `GOOGLE_SPEECH_API_KEY` is not set.
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let api_key = match &config.api_key {
            Some(k) => k.clone(),
            None => std::env::var("GOOGLE_SPEECH_API_KEY").map_err(|_| {
                anyhow::anyhow!(
                    "GOOGLE_SPEECH_API_KEY environment variable not set (or set transcription.api_key)"
                )
            })?,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| GOOGLE_SPEECH_URL.to_string()),
            api_key,
            language: config.language.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl SpeechRecognizer for GoogleRecognizer {
    fn engine_name(&self) -> &str {
        "Google Speech Recognition"
    }

    async fn recognize(&self, audio: &DecodedAudio) -> TranscriptionOutcome {
        let body = audio.to_pcm_bytes();
        let content_type = format!("audio/l16; rate={}", audio.sample_rate);

        let response = send_with_retry(self.max_retries, || {
            self.client
                .post(&self.url)
                .query(&[
                    ("client", "chromium"),
                    ("lang", self.language.as_str()),
                    ("key", self.api_key.as_str()),
                ])
                .header("Content-Type", content_type.as_str())
                .body(body.clone())
        })
        .await?;

        let text = response
            .text()
            .await
            .map_err(|e| TranscriptionFailure::ServiceUnavailable(e.to_string()))?;
        parse_google_response(&text)
    }
}

/// Parse the newline-delimited JSON returned by the Web Speech endpoint.
///
/// The first line is usually an empty `{"result":[]}`; the transcript is
/// the first alternative of the first non-empty result.
fn parse_google_response(body: &str) -> TranscriptionOutcome {
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let json: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| TranscriptionFailure::Other(format!("invalid response: {}", e)))?;

        let transcript = json
            .get("result")
            .and_then(|r| r.as_array())
            .and_then(|r| r.first())
            .and_then(|r| r.get("alternative"))
            .and_then(|a| a.as_array())
            .and_then(|a| a.first())
            .and_then(|a| a.get("transcript"))
            .and_then(|t| t.as_str());

        if let Some(t) = transcript {
            if !t.trim().is_empty() {
                return Ok(t.trim().to_string());
            }
        }
    }
    Err(TranscriptionFailure::Unintelligible)
}

// ============ OpenAI-compatible ============

const OPENAI_TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

pub struct OpenAIRecognizer {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    language: String,
    max_retries: u32,
}

impl OpenAIRecognizer {
    /// # Errors
    ///
    /// Returns an error if no API key is configured and `OPENAI_API_KEY`
    /// is not set.
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let api_key = match &config.api_key {
            Some(k) => k.clone(),
            None => std::env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        // The API takes ISO-639-1 codes ("en"), config uses locales ("en-US").
        let language = config
            .language
            .split(['-', '_'])
            .next()
            .unwrap_or("en")
            .to_lowercase();

        Ok(Self {
            client,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_TRANSCRIPTIONS_URL.to_string()),
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "whisper-1".to_string()),
            language,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl SpeechRecognizer for OpenAIRecognizer {
    fn engine_name(&self) -> &str {
        "OpenAI Speech Recognition"
    }

    async fn recognize(&self, audio: &DecodedAudio) -> TranscriptionOutcome {
        let wav = audio
            .to_wav_bytes()
            .map_err(|e| TranscriptionFailure::Other(e.to_string()))?;

        let response = send_with_retry(self.max_retries, || {
            let part = reqwest::multipart::Part::bytes(wav.clone()).file_name("chunk.wav");
            let form = reqwest::multipart::Form::new()
                .part("file", part)
                .text("model", self.model.clone())
                .text("language", self.language.clone())
                .text("response_format", "json");
            self.client
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .multipart(form)
        })
        .await?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TranscriptionFailure::Other(format!("invalid response: {}", e)))?;

        match json.get("text").and_then(|t| t.as_str()) {
            Some(t) if !t.trim().is_empty() => Ok(t.trim().to_string()),
            Some(_) => Err(TranscriptionFailure::Unintelligible),
            None => Err(TranscriptionFailure::Other(
                "response is missing the text field".to_string(),
            )),
        }
    }
}

/// Send a request built by `build`, retrying transient failures.
async fn send_with_retry<F>(
    max_retries: u32,
    build: F,
) -> Result<reqwest::Response, TranscriptionFailure>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let body_text = response.text().await.unwrap_or_default();
                let detail = format!("recognition request failed: {} {}", status, body_text.trim());

                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(detail);
                    continue;
                }

                return Err(TranscriptionFailure::ServiceUnavailable(detail));
            }
            Err(e) => {
                last_err = Some(format!("recognition connection failed: {}", e));
                continue;
            }
        }
    }

    Err(TranscriptionFailure::ServiceUnavailable(
        last_err.unwrap_or_else(|| "recognition failed after retries".to_string()),
    ))
}

/// Create the configured [`SpeechRecognizer`].
///
/// | Config Value | Recognizer |
/// |-------------|----------|
/// | `"google"` | [`GoogleRecognizer`] |
/// | `"openai"` | [`OpenAIRecognizer`] |
pub fn create_recognizer(config: &TranscriptionConfig) -> Result<Box<dyn SpeechRecognizer>> {
    match config.provider.as_str() {
        "google" => Ok(Box::new(GoogleRecognizer::new(config)?)),
        "openai" => Ok(Box::new(OpenAIRecognizer::new(config)?)),
        other => bail!("Unknown transcription provider: {}", other),
    }
}

// ============ Transcriber ============

/// Every chunk's text for one video, plus how many were failure placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscribedVideo {
    pub transcripts: ChunkTranscripts,
    pub failed: usize,
}

/// Runs a recognizer over chunk files, one at a time.
pub struct Transcriber<'a> {
    recognizer: &'a dyn SpeechRecognizer,
}

impl<'a> Transcriber<'a> {
    pub fn new(recognizer: &'a dyn SpeechRecognizer) -> Self {
        Self { recognizer }
    }

    /// Transcribe one chunk file. An unreadable file is an `Other` failure.
    pub async fn transcribe(&self, chunk: &AudioChunk) -> TranscriptionOutcome {
        let path = chunk.path.clone();
        let audio = tokio::task::spawn_blocking(move || audio::load_chunk(&path))
            .await
            .map_err(|e| TranscriptionFailure::Other(e.to_string()))?
            .map_err(|e| TranscriptionFailure::Other(e.to_string()))?;

        self.recognizer.recognize(&audio).await
    }

    /// Transcribe every chunk of one video, in order.
    ///
    /// Each result (text or failure placeholder) is also written to
    /// `<video_text_dir>/<chunk_name>.txt`. Only failing to write those
    /// files is an error.
    pub async fn transcribe_all(
        &self,
        chunks: &[AudioChunk],
        video_text_dir: &Path,
        video: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<TranscribedVideo> {
        std::fs::create_dir_all(video_text_dir).with_context(|| {
            format!("Failed to create text folder: {}", video_text_dir.display())
        })?;

        let total = chunks.len() as u64;
        let mut transcripts = ChunkTranscripts::with_capacity(chunks.len());
        let mut failed = 0usize;

        for (i, chunk) in chunks.iter().enumerate() {
            let name = chunk.name();
            let text = match self.transcribe(chunk).await {
                Ok(text) => text,
                Err(failure) => {
                    failed += 1;
                    tracing::warn!(video, chunk = %name, error = %failure, "chunk transcription failed");
                    failure.placeholder(self.recognizer.engine_name())
                }
            };

            let text_path = video_text_dir.join(format!("{}.txt", name));
            std::fs::write(&text_path, &text)
                .with_context(|| format!("Failed to write {}", text_path.display()))?;

            transcripts.insert(name, text);
            progress.report(ProgressEvent::Chunk {
                video: video.to_string(),
                n: i as u64 + 1,
                total,
            });
        }

        Ok(TranscribedVideo {
            transcripts,
            failed,
        })
    }
}
