use anyhow::Result;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extensions picked up when a directory is given as input
const VIDEO_EXTENSIONS: &[&str] = &[
    ".mkv", ".mp4", ".avi", ".mov", ".m4v", ".webm", ".ts", ".m2ts", ".mts", ".wmv", ".flv",
    ".mpg", ".mpeg", ".mxf",
];

/// Expand user-supplied paths into an ordered, de-duplicated list of
/// absolute input files.
///
/// Files are taken as given whatever their extension; directories are
/// walked recursively for video files, skipping hidden subdirectories.
/// Missing paths are logged and skipped.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut inputs = Vec::new();

    for path in paths {
        if !path.exists() {
            warn!("Input does not exist: {}", path.display());
            continue;
        }

        if path.is_dir() {
            for file in scan_directory(path) {
                push_unique(&mut inputs, &mut seen, &file);
            }
        } else {
            push_unique(&mut inputs, &mut seen, path);
        }
    }

    debug!("Collected {} input files", inputs.len());
    Ok(inputs)
}

fn push_unique(inputs: &mut Vec<PathBuf>, seen: &mut HashSet<PathBuf>, path: &Path) {
    let absolute = match fs::canonicalize(path) {
        Ok(p) => p,
        Err(e) => {
            warn!("Failed to resolve {}: {}", path.display(), e);
            return;
        }
    };
    if seen.insert(absolute.clone()) {
        inputs.push(absolute);
    }
}

fn scan_directory(root: &Path) -> Vec<PathBuf> {
    debug!("Scanning directory: {}", root.display());
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            // Skip hidden directories, but not the root itself
            if e.file_type().is_dir() && e.path() != root {
                !e.file_name()
                    .to_str()
                    .map(|s| s.starts_with('.'))
                    .unwrap_or(false)
            } else {
                true
            }
        })
    {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && is_video_file(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            Err(e) => warn!("Error accessing directory entry: {}", e),
        }
    }
    files
}

/// Check if a file has a video extension
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}
