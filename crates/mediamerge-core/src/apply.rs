use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use filetime::FileTime;
use serde::Serialize;
use tracing::info;

use crate::convert::Converter;
use crate::error::SkipResult;

/// One filesystem mutation. Dry-run logs these instead of performing them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Action {
    DeleteSidecar { path: PathBuf },
    Convert { from: PathBuf, to: PathBuf },
    Rename { from: PathBuf, to: PathBuf },
    SetModified { path: PathBuf, time: DateTime<Utc> },
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::DeleteSidecar { path } => write!(f, "delete {}", path.display()),
            Action::Convert { from, to } => write!(f, "convert {} -> {}", from.display(), to.display()),
            Action::Rename { from, to } => write!(f, "rename {} -> {}", from.display(), to.display()),
            Action::SetModified { path, time } => {
                write!(f, "set mtime of {} to {}", path.display(), time.to_rfc3339())
            }
        }
    }
}

/// Current mtime of a file as a unix timestamp.
pub fn modified_unix(path: &Path) -> Option<i64> {
    let meta = fs::metadata(path).ok()?;
    Some(FileTime::from_last_modification_time(&meta).unix_seconds())
}

/// Executes actions, remembering which directories it already created.
pub struct Applier {
    dry_run: bool,
    converter: Converter,
    created_dirs: HashSet<PathBuf>,
}

impl Applier {
    pub fn new(dry_run: bool, converter: Converter) -> Self {
        Self {
            dry_run,
            converter,
            created_dirs: HashSet::new(),
        }
    }

    pub fn apply(&mut self, action: &Action) -> SkipResult<()> {
        if self.dry_run {
            info!("[dry-run] would {action}");
            return Ok(());
        }
        info!("{action}");
        match action {
            Action::DeleteSidecar { path } => fs::remove_file(path)?,
            Action::Convert { from, to } => {
                self.ensure_parent(to)?;
                self.converter.convert(from, to)?;
            }
            Action::Rename { from, to } => {
                self.ensure_parent(to)?;
                fs::rename(from, to)?;
            }
            Action::SetModified { path, time } => {
                let ft = FileTime::from_unix_time(time.timestamp(), 0);
                filetime::set_file_times(path, ft, ft)?;
            }
        }
        Ok(())
    }

    fn ensure_parent(&mut self, path: &Path) -> SkipResult<()> {
        let Some(dir) = path.parent() else {
            return Ok(());
        };
        // Create directory only once per unique path
        if !self.created_dirs.contains(dir) {
            fs::create_dir_all(dir)?;
            self.created_dirs.insert(dir.to_path_buf());
        }
        Ok(())
    }
}
