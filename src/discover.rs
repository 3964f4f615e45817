//! Video discovery: walk a root folder and keep recognized video files.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::VideoSource;

/// Recognized video extensions, compared case-insensitively.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "flv", "wmv"];

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Every regular file under `root`, at any depth, sorted by file name
/// within each directory.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Root folder does not exist: {}", root.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Discover the videos under `root`, in walk order.
pub fn find_videos(root: &Path) -> Result<Vec<VideoSource>> {
    Ok(list_files(root)?
        .into_iter()
        .filter(|p| is_video_file(p))
        .map(VideoSource::from_path)
        .collect())
}

pub fn run_list_videos(root: &Path) -> Result<()> {
    for video in find_videos(root)? {
        println!("Video file path: {}", video.path.display());
    }
    Ok(())
}
