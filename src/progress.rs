//! Operator-facing progress for `vidscribe process` and index builds.
//!
//! Progress is emitted on **stderr** so stdout stays parseable for scripts.
//! It reports liveness only and never affects scheduling.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Walking the root folder; total unknown.
    Discovering { root: String },
    /// Starting video `n` of `total`.
    Video { n: u64, total: u64, name: String },
    /// Transcribed chunk `n` of `total` for `video`.
    Chunk { video: String, n: u64, total: u64 },
    /// Embedding `n` chunk texts into the index.
    Indexing { n: u64 },
}

/// Receives progress events from the pipeline.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly lines: "process  video 3 / 12  lecture-03".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Discovering { root } => format!("process  discovering {}...\n", root),
            ProgressEvent::Video { n, total, name } => format!(
                "process  video {} / {}  {}\n",
                format_number(*n),
                format_number(*total),
                name
            ),
            ProgressEvent::Chunk { video, n, total } => format!(
                "process  {}  chunk {} / {}\n",
                video,
                format_number(*n),
                format_number(*total)
            ),
            ProgressEvent::Indexing { n } => {
                format!("index  embedding {} chunks\n", format_number(*n))
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Discovering { root } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "root": root
            }),
            ProgressEvent::Video { n, total, name } => serde_json::json!({
                "event": "progress",
                "phase": "video",
                "video": name,
                "n": n,
                "total": total
            }),
            ProgressEvent::Chunk { video, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "chunk",
                "video": video,
                "n": n,
                "total": total
            }),
            ProgressEvent::Indexing { n } => serde_json::json!({
                "event": "progress",
                "phase": "indexing",
                "n": n
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse a `--progress` value; `auto` defers to [`default_for_tty`](Self::default_for_tty).
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "auto" => Ok(Self::default_for_tty()),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            "off" => Ok(ProgressMode::Off),
            other => anyhow::bail!(
                "Unknown progress mode: '{}'. Use auto, human, json, or off.",
                other
            ),
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
