use std::path::PathBuf;

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::ThrottledProgress;

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map_or(false, |s| s.starts_with('.'))
}

/// Expand sources into a flat file list in discovery order. Directories are
/// walked recursively with entries sorted by name; hidden entries are skipped.
/// The list is complete before anything gets renamed.
pub fn collect_sources(sources: &[PathBuf], progress: &ThrottledProgress) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let total = sources.len() as u64;

    for (i, source) in sources.iter().enumerate() {
        progress.report("scan", i as u64, total, &format!("Scanning {}", source.display()));
        if !source.exists() {
            warn!(path = %source.display(), "Source does not exist, skipping");
            continue;
        }
        if source.is_file() {
            files.push(source.clone());
            continue;
        }

        let walker = WalkDir::new(source)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));
        for entry in walker {
            match entry {
                Ok(e) if e.file_type().is_file() => files.push(e.into_path()),
                Ok(_) => {}
                Err(e) => warn!("Cannot read directory entry: {e}"),
            }
        }
    }

    debug!(count = files.len(), "Collected source files");
    files
}
