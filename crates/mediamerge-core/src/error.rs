use std::path::PathBuf;

use thiserror::Error;

/// Reasons a single file is left alone. None of these abort the run.
#[derive(Debug, Error)]
pub enum SkipError {
    #[error("{} already exists", .0.display())]
    TargetExists(PathBuf),

    #[error("{} still exists after {attempts} suffixing attempts", .path.display())]
    TooManyConflicts { path: PathBuf, attempts: usize },

    #[error("no capture time found")]
    NoCaptureTime,

    #[error("EXIF: {0}")]
    Exif(String),

    #[error("probe: {0}")]
    Probe(String),

    #[error("convert: {0}")]
    Convert(String),

    #[error("identical to {}", .0.display())]
    Duplicate(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<exif::Error> for SkipError {
    fn from(e: exif::Error) -> Self {
        SkipError::Exif(e.to_string())
    }
}

pub type SkipResult<T> = std::result::Result<T, SkipError>;
