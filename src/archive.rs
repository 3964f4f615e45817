//! Archive extraction for course bundles delivered as `.zip` files.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Extract `archive` into `dest`, creating `dest` if needed.
///
/// Returns the number of files written. Only `.zip` is supported; entries
/// whose names would land outside `dest` are rejected.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<usize> {
    let ext = archive
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "zip" => extract_zip(archive, dest),
        "rar" => bail!(
            "Unsupported archive format: RAR archives are not supported, repack {} as .zip",
            archive.display()
        ),
        _ => bail!(
            "Unsupported archive format. Please provide a .zip file: {}",
            archive.display()
        ),
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<usize> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;

    let file = fs::File::open(archive)
        .with_context(|| format!("Failed to open archive: {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("Not a valid zip archive: {}", archive.display()))?;

    let mut written = 0usize;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let relative = match entry.enclosed_name() {
            Some(p) => p,
            None => bail!("Archive entry escapes destination: {}", entry.name()),
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        std::io::copy(&mut entry, &mut out)?;
        written += 1;
    }

    Ok(written)
}

pub fn run_extract(archive: &Path, dest: &Path) -> Result<()> {
    let count = extract_archive(archive, dest)?;
    println!("extract {}", archive.display());
    println!("  destination: {}", dest.display());
    println!("  files: {}", count);
    println!("ok");
    Ok(())
}
