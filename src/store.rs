//! Durable storage for the [`TranscriptRecord`].
//!
//! The record is written once per run as pretty-printed JSON next to the
//! input root folder. Writes go to a temporary sibling file that is then
//! renamed over the target, so a reader never sees a half-written record.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::TranscriptRecord;

pub const RECORD_FILE_NAME: &str = "transcriptions.json";

/// `{parent_of(root)}/transcriptions.json`.
pub fn record_path(root: &Path) -> PathBuf {
    root.parent()
        .map(|p| p.join(RECORD_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(RECORD_FILE_NAME))
}

pub fn to_json(record: &TranscriptRecord) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    record.serialize(&mut ser)?;
    Ok(buf)
}

/// Atomically write `record` to `path`.
pub fn write_record(record: &TranscriptRecord, path: &Path) -> Result<()> {
    let json = to_json(record)?;

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| RECORD_FILE_NAME.into());
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, &json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move record into place: {}", path.display()))?;
    Ok(())
}

pub fn load_record(path: &Path) -> Result<TranscriptRecord> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read transcript record: {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Invalid transcript record: {}", path.display()))
}
