//! Semantic retrieval over a transcript record.
//!
//! Every `(video, chunk)` pair in the record becomes one row of a
//! [`FlatIndex`], with the chunk's transcript text as the embedded
//! document. Queries are embedded the same way and ranked by squared
//! Euclidean distance, which on unit vectors orders results exactly as
//! cosine similarity does.
//!
//! Built indexes are persisted to `retrieval.index_dir` so a later
//! query-only run can reuse them. Reuse requires the stored record hash,
//! embedding model, and dimensionality to match; otherwise the artifacts
//! are deleted and rebuilt from scratch.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::index::{self, FlatIndex, IndexArtifacts};
use crate::models::{EntryMetadata, IndexEntry, TranscriptRecord};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Builds and queries indexes with one embedder for the whole run.
pub struct RetrievalEngine<'a> {
    embedder: &'a dyn Embedder,
    batch_size: usize,
    progress: &'a dyn ProgressReporter,
}

impl<'a> RetrievalEngine<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        batch_size: usize,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            embedder,
            batch_size,
            progress,
        }
    }

    /// Embed every chunk of `record` into a fresh index.
    ///
    /// Rows follow record order: videos in insertion order, chunks in
    /// ordinal order within each video.
    pub async fn build_index(
        &self,
        record: &TranscriptRecord,
        record_hash: [u8; 32],
    ) -> Result<IndexArtifacts> {
        let metadata: Vec<EntryMetadata> = record
            .chunks()
            .map(|(video, chunk, text)| EntryMetadata {
                document: text.to_string(),
                video_name: video.to_string(),
                chunk_name: chunk.to_string(),
            })
            .collect();

        self.progress.report(ProgressEvent::Indexing {
            n: metadata.len() as u64,
        });

        let documents: Vec<String> = metadata.iter().map(|m| m.document.clone()).collect();
        let vectors = embedding::embed_texts(self.embedder, &documents, self.batch_size).await?;

        let mut index = FlatIndex::new(self.embedder.dims());
        for v in &vectors {
            index.add(v)?;
        }

        tracing::info!(
            entries = index.len(),
            model = self.embedder.model_name(),
            "built index"
        );

        Ok(IndexArtifacts {
            index,
            metadata,
            record_hash,
            model: self.embedder.model_name().to_string(),
        })
    }

    /// The at most `k` entries nearest to `text`, nearest first.
    ///
    /// Fewer than `k` entries come back when the index is small. A row with
    /// no metadata entry is dropped rather than returned.
    pub async fn query(
        &self,
        artifacts: &IndexArtifacts,
        text: &str,
        k: usize,
    ) -> Result<Vec<IndexEntry>> {
        if text.trim().is_empty() || k == 0 || artifacts.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = embedding::embed_query(self.embedder, text).await?;
        let k = k.min(artifacts.index.len());
        let hits = artifacts.index.search(&query_vec, k)?;

        Ok(hits
            .into_iter()
            .filter_map(|(row, distance)| {
                artifacts
                    .metadata
                    .get(row)
                    .map(|metadata| IndexEntry {
                        metadata: metadata.clone(),
                        distance,
                    })
            })
            .collect())
    }

    /// Build from the record at `record_path` and persist to `index_dir`.
    pub async fn rebuild(&self, record_path: &Path, index_dir: &Path) -> Result<IndexArtifacts> {
        let (record, hash) = read_record(record_path)?;
        index::remove_artifacts(index_dir)?;
        let artifacts = self.build_index(&record, hash).await?;
        index::write_artifacts(index_dir, &artifacts)?;
        Ok(artifacts)
    }

    /// Reuse the persisted index if it matches the record and embedder,
    /// otherwise [`rebuild`](Self::rebuild).
    pub async fn load_or_build(
        &self,
        record_path: &Path,
        index_dir: &Path,
        force_rebuild: bool,
    ) -> Result<IndexArtifacts> {
        if !force_rebuild {
            let (_, hash) = read_record(record_path)?;
            match index::read_artifacts(index_dir) {
                Ok(Some(artifacts))
                    if artifacts.is_fresh(
                        &hash,
                        self.embedder.model_name(),
                        self.embedder.dims(),
                    ) =>
                {
                    tracing::debug!(dir = %index_dir.display(), "reusing index");
                    return Ok(artifacts);
                }
                Ok(Some(_)) => {
                    tracing::info!("index is stale for this record or model, rebuilding")
                }
                Ok(None) => {}
                Err(e) => {
                    let error = format!("{:#}", e);
                    tracing::warn!(%error, "unreadable index, rebuilding");
                }
            }
        }
        self.rebuild(record_path, index_dir).await
    }
}

/// Parse the record and hash its exact bytes.
fn read_record(path: &Path) -> Result<(TranscriptRecord, [u8; 32])> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read transcript record: {}", path.display()))?;
    let record: TranscriptRecord = serde_json::from_slice(&bytes)
        .with_context(|| format!("Invalid transcript record: {}", path.display()))?;
    Ok((record, index::record_hash(&bytes)))
}

/// CLI entry point for `vidscribe index`.
pub async fn run_index(
    config: &Config,
    json_path: &Path,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let embedder = embedding::create_embedder(&config.embedding)?;
    let engine = RetrievalEngine::new(embedder.as_ref(), config.embedding.batch_size, progress);
    let index_dir = &config.retrieval.index_dir;

    let artifacts = engine.rebuild(json_path, index_dir).await?;

    println!("index {}", json_path.display());
    println!("  entries: {}", artifacts.index.len());
    println!("  model: {} ({} dims)", artifacts.model, artifacts.index.dims());
    println!("  index: {}", index::index_path(index_dir).display());
    println!("  metadata: {}", index::metadata_path(index_dir).display());
    println!("ok");
    Ok(())
}

/// CLI entry point for `vidscribe query`.
pub async fn run_query(
    config: &Config,
    json_path: &Path,
    query: &str,
    k: Option<usize>,
    rebuild: bool,
    format: &str,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    if format != "text" && format != "json" {
        anyhow::bail!("Unknown output format: {}. Use text or json.", format);
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let engine = RetrievalEngine::new(embedder.as_ref(), config.embedding.batch_size, progress);
    let k = k.unwrap_or(config.retrieval.top_k);

    let artifacts = engine
        .load_or_build(json_path, &config.retrieval.index_dir, rebuild)
        .await?;
    let results = engine.query(&artifacts, query, k).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for entry in &results {
        println!("Document: {}", entry.metadata.document);
        println!("Video Name: {}", entry.metadata.video_name);
        println!("Chunk Name: {}", entry.metadata.chunk_name);
        println!();
    }
    Ok(())
}
