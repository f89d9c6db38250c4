//! Collecting uploads from paths on disk.
//!
//! Files named on the command line are taken as-is, whatever their
//! extension, so an unsupported file is reported by the extractor rather
//! than silently dropped. Directories are walked recursively and only
//! `.pdf`, `.docx`, and `.txt` files inside them are picked up.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::{DocumentFormat, UploadedFile};

/// Resolve `paths` into uploads, in argument order. Directory contents are
/// sorted by path for deterministic ordering.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<UploadedFile>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            files.extend(walk_dir(path)?);
        } else if path.is_file() {
            files.push(read_file(path)?);
        } else {
            bail!("No such file or directory: {}", path.display());
        }
    }

    Ok(files)
}

fn walk_dir(root: &Path) -> Result<Vec<UploadedFile>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if DocumentFormat::from_filename(&name).is_some() {
            found.push(entry.into_path());
        }
    }

    found.sort();
    found.iter().map(|p| read_file(p)).collect()
}

fn read_file(path: &Path) -> Result<UploadedFile> {
    UploadedFile::from_path(path).with_context(|| format!("Failed to read {}", path.display()))
}
