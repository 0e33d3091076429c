use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{SkipError, SkipResult};
use crate::media::Media;

/// Extra `_` suffixes tried after the base name before giving up.
pub const MAX_CONFLICT_SUFFIXING: usize = 10;

/// Where a media file ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Move (or convert) to this path
    Move(PathBuf),
    /// Already normalized
    InPlace,
    /// Same bytes already live at this path
    Duplicate(PathBuf),
}

/// Assigns target paths sequentially, tracking what this run already claimed
/// and by which source.
pub struct Planner {
    output: PathBuf,
    keep_heic: bool,
    assigned: HashMap<PathBuf, PathBuf>,
}

impl Planner {
    pub fn new(output: &Path, keep_heic: bool) -> Self {
        Self {
            output: output.to_path_buf(),
            keep_heic,
            assigned: HashMap::new(),
        }
    }

    pub fn place(&mut self, media: &Media) -> SkipResult<Placement> {
        let capture = media.capture.ok_or(SkipError::NoCaptureTime)?;
        let dir = self.output.join(capture.day());
        let ext = media.target_extension(self.keep_heic);
        let mut stem = capture.stem();
        let mut candidate = dir.join(file_name(&stem, &ext));

        for _ in 0..=MAX_CONFLICT_SUFFIXING {
            if same_file(&candidate, &media.path) {
                self.assigned.insert(candidate, media.path.clone());
                return Ok(Placement::InPlace);
            }
            // Claimed bytes sit at the claiming source until applied, and
            // stay there in dry-run
            let existing = if candidate.exists() {
                Some(candidate.clone())
            } else {
                self.assigned.get(&candidate).cloned()
            };
            match existing {
                None => {
                    self.assigned.insert(candidate.clone(), media.path.clone());
                    return Ok(Placement::Move(candidate));
                }
                Some(existing) => {
                    if is_duplicate(&media.path, &existing)? {
                        return Ok(Placement::Duplicate(candidate));
                    }
                }
            }
            stem.push('_');
            candidate = dir.join(file_name(&stem, &ext));
        }

        Err(SkipError::TooManyConflicts {
            path: candidate,
            attempts: MAX_CONFLICT_SUFFIXING,
        })
    }
}

fn file_name(stem: &str, ext: &str) -> String {
    if ext.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{ext}")
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// SHA-256 of a file, streamed.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Size check first, hash only when sizes agree. A missing `existing`
/// counts as different.
fn is_duplicate(source: &Path, existing: &Path) -> io::Result<bool> {
    let Ok(existing_meta) = fs::metadata(existing) else {
        return Ok(false);
    };
    if fs::metadata(source)?.len() != existing_meta.len() {
        return Ok(false);
    }
    Ok(hash_file(source)? == hash_file(existing)?)
}
