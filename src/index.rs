//! Exact flat vector index and its on-disk artifacts.
//!
//! The index is a dense row-major `f32` matrix searched by brute force
//! under squared Euclidean distance. Row `i` of the matrix always
//! corresponds to element `i` of the metadata array, so a search hit's
//! position dereferences directly to its source chunk.
//!
//! # Artifacts
//!
//! | File | Contents |
//! |------|----------|
//! | `transcription.index` | binary header + vectors (below) |
//! | `transcription_metadata.json` | JSON array of [`EntryMetadata`] in row order |
//!
//! Index file layout (all integers little-endian):
//!
//! ```text
//! "VSIX" | u32 version | u32 dims | u64 count | [u8; 32] record sha256
//!        | u16 model_len | model_len bytes UTF-8 | count*dims f32
//! ```
//!
//! Artifacts are never appended to. [`write_artifacts`] deletes both files
//! before writing the new ones.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::embedding::{blob_to_vec, squared_l2, vec_to_blob};
use crate::models::EntryMetadata;

pub const INDEX_FILE_NAME: &str = "transcription.index";
pub const METADATA_FILE_NAME: &str = "transcription_metadata.json";

const MAGIC: &[u8; 4] = b"VSIX";
const FORMAT_VERSION: u32 = 1;

/// Brute-force nearest-neighbor index.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dims: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            data: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one vector; its label is the previous [`len`](Self::len).
    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dims {
            bail!(
                "Vector has {} dimensions, index expects {}",
                vector.len(),
                self.dims
            );
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dims..(i + 1) * self.dims]
    }

    /// The `k` nearest rows to `query`, nearest first, as `(row, distance)`.
    ///
    /// Returns `min(k, len)` pairs; a `k` beyond the row count is not
    /// padded. Equal distances are ordered by row.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dims {
            bail!(
                "Query has {} dimensions, index expects {}",
                query.len(),
                self.dims
            );
        }

        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|i| (i, squared_l2(self.row(i), query)))
            .collect();
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

/// A persisted index together with the facts needed to judge its freshness.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexArtifacts {
    pub index: FlatIndex,
    pub metadata: Vec<EntryMetadata>,
    pub record_hash: [u8; 32],
    pub model: String,
}

impl IndexArtifacts {
    /// True if these artifacts were built from the same record bytes with
    /// the same embedding model.
    pub fn is_fresh(&self, record_hash: &[u8; 32], model: &str, dims: usize) -> bool {
        &self.record_hash == record_hash
            && self.model == model
            && self.index.dims() == dims
            && self.index.len() == self.metadata.len()
    }
}

pub fn record_hash(record_bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(record_bytes));
    out
}

pub fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE_NAME)
}

pub fn metadata_path(dir: &Path) -> PathBuf {
    dir.join(METADATA_FILE_NAME)
}

/// Delete both artifact files. Missing files are not an error.
pub fn remove_artifacts(dir: &Path) -> Result<()> {
    for path in [index_path(dir), metadata_path(dir)] {
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed stale index artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove {}", path.display()))
            }
        }
    }
    Ok(())
}

/// Replace any existing artifacts in `dir` with `artifacts`.
pub fn write_artifacts(dir: &Path, artifacts: &IndexArtifacts) -> Result<()> {
    if artifacts.index.len() != artifacts.metadata.len() {
        bail!(
            "Index has {} vectors but {} metadata entries",
            artifacts.index.len(),
            artifacts.metadata.len()
        );
    }
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create index folder: {}", dir.display()))?;
    remove_artifacts(dir)?;

    let index_file = index_path(dir);
    fs::write(&index_file, encode_index(artifacts)?)
        .with_context(|| format!("Failed to write {}", index_file.display()))?;

    let meta_file = metadata_path(dir);
    let json = serde_json::to_vec_pretty(&artifacts.metadata)?;
    fs::write(&meta_file, json)
        .with_context(|| format!("Failed to write {}", meta_file.display()))?;
    Ok(())
}

/// Load artifacts from `dir`, or `None` if either file is absent.
pub fn read_artifacts(dir: &Path) -> Result<Option<IndexArtifacts>> {
    let index_file = index_path(dir);
    let meta_file = metadata_path(dir);
    if !index_file.exists() || !meta_file.exists() {
        return Ok(None);
    }

    let bytes =
        fs::read(&index_file).with_context(|| format!("Failed to read {}", index_file.display()))?;
    let (index, record_hash, model) = decode_index(&bytes)
        .with_context(|| format!("Invalid index file: {}", index_file.display()))?;

    let meta_bytes =
        fs::read(&meta_file).with_context(|| format!("Failed to read {}", meta_file.display()))?;
    let metadata: Vec<EntryMetadata> = serde_json::from_slice(&meta_bytes)
        .with_context(|| format!("Invalid metadata file: {}", meta_file.display()))?;

    Ok(Some(IndexArtifacts {
        index,
        metadata,
        record_hash,
        model,
    }))
}

// ============ Binary Encoding ============

fn encode_index(artifacts: &IndexArtifacts) -> Result<Vec<u8>> {
    let model = artifacts.model.as_bytes();
    let model_len = u16::try_from(model.len())
        .map_err(|_| anyhow::anyhow!("Model name too long: {}", artifacts.model))?;
    let dims = u32::try_from(artifacts.index.dims())
        .map_err(|_| anyhow::anyhow!("Too many dimensions: {}", artifacts.index.dims()))?;

    let mut out = Vec::with_capacity(54 + model.len() + artifacts.index.data.len() * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&dims.to_le_bytes());
    out.extend_from_slice(&(artifacts.index.len() as u64).to_le_bytes());
    out.extend_from_slice(&artifacts.record_hash);
    out.extend_from_slice(&model_len.to_le_bytes());
    out.extend_from_slice(model);
    out.extend_from_slice(&vec_to_blob(&artifacts.index.data));
    Ok(out)
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            bail!("unexpected end of file");
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

fn decode_index(bytes: &[u8]) -> Result<(FlatIndex, [u8; 32], String)> {
    let mut r = Reader { buf: bytes };

    if &r.array::<4>()? != MAGIC {
        bail!("bad magic");
    }
    let version = u32::from_le_bytes(r.array()?);
    if version != FORMAT_VERSION {
        bail!("unsupported index version {}", version);
    }
    let dims = u32::from_le_bytes(r.array()?) as usize;
    let count = u64::from_le_bytes(r.array()?) as usize;
    let record_hash: [u8; 32] = r.array()?;
    let model_len = u16::from_le_bytes(r.array()?) as usize;
    let model = String::from_utf8(r.take(model_len)?.to_vec())?;

    let expected = count
        .checked_mul(dims)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| anyhow::anyhow!("index size overflow"))?;
    if r.buf.len() != expected {
        bail!(
            "expected {} bytes of vector data, found {}",
            expected,
            r.buf.len()
        );
    }

    let index = FlatIndex {
        dims,
        data: blob_to_vec(r.buf),
    };
    Ok((index, record_hash, model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta(video: &str, chunk: &str) -> EntryMetadata {
        EntryMetadata {
            document: format!("{} {}", video, chunk),
            video_name: video.into(),
            chunk_name: chunk.into(),
        }
    }

    fn sample() -> IndexArtifacts {
        let mut index = FlatIndex::new(2);
        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();
        IndexArtifacts {
            index,
            metadata: vec![meta("a", "chunk_1.wav"), meta("a", "chunk_2.wav")],
            record_hash: record_hash(b"{}"),
            model: "hash-2".into(),
        }
    }

    #[test]
    fn search_orders_by_distance() {
        let mut index = FlatIndex::new(2);
        index.add(&[0.0, 1.0]).unwrap();
        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[0.6, 0.8]).unwrap();

        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        let labels: Vec<usize> = hits.iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, vec![1, 2, 0]);
        assert_eq!(hits[0].1, 0.0);
    }

    #[test]
    fn search_beyond_row_count_returns_every_row() {
        let mut index = FlatIndex::new(2);
        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();
        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0], (0, 0.0));

        let empty = FlatIndex::new(2);
        assert!(empty.search(&[1.0, 0.0], 2).unwrap().is_empty());
    }

    #[test]
    fn huge_k_is_bounded_by_the_index() {
        let mut index = FlatIndex::new(2);
        index.add(&[1.0, 0.0]).unwrap();
        let hits = index.search(&[1.0, 0.0], usize::MAX).unwrap();
        assert_eq!(hits, vec![(0, 0.0)]);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut index = FlatIndex::new(2);
        index.add(&[0.0, 1.0]).unwrap();
        index.add(&[0.0, -1.0]).unwrap();
        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[1].0, 1);
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let mut index = FlatIndex::new(3);
        assert!(index.add(&[1.0]).is_err());
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn artifacts_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let artifacts = sample();
        write_artifacts(tmp.path(), &artifacts).unwrap();

        let loaded = read_artifacts(tmp.path()).unwrap().unwrap();
        assert_eq!(loaded, artifacts);
        assert!(loaded.is_fresh(&record_hash(b"{}"), "hash-2", 2));
        assert!(!loaded.is_fresh(&record_hash(b"{ }"), "hash-2", 2));
        assert!(!loaded.is_fresh(&record_hash(b"{}"), "other", 2));
    }

    #[test]
    fn rewrite_replaces_previous_artifacts() {
        let tmp = TempDir::new().unwrap();
        write_artifacts(tmp.path(), &sample()).unwrap();

        let mut smaller = sample();
        smaller.index = FlatIndex::new(2);
        smaller.index.add(&[1.0, 0.0]).unwrap();
        smaller.metadata.truncate(1);
        write_artifacts(tmp.path(), &smaller).unwrap();

        let loaded = read_artifacts(tmp.path()).unwrap().unwrap();
        assert_eq!(loaded.index.len(), 1);
        assert_eq!(loaded.metadata.len(), 1);
    }

    #[test]
    fn missing_artifacts_read_as_none() {
        let tmp = TempDir::new().unwrap();
        assert!(read_artifacts(tmp.path()).unwrap().is_none());
        remove_artifacts(tmp.path()).unwrap();
    }

    #[test]
    fn corrupt_index_is_an_error() {
        let tmp = TempDir::new().unwrap();
        write_artifacts(tmp.path(), &sample()).unwrap();
        let path = index_path(tmp.path());
        let mut bytes = fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 3);
        fs::write(&path, bytes).unwrap();
        assert!(read_artifacts(tmp.path()).is_err());

        fs::write(&path, b"NOPE").unwrap();
        assert!(read_artifacts(tmp.path()).is_err());
    }

    #[test]
    fn mismatched_lengths_refused() {
        let tmp = TempDir::new().unwrap();
        let mut bad = sample();
        bad.metadata.pop();
        assert!(write_artifacts(tmp.path(), &bad).is_err());
    }
}
