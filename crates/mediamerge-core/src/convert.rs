use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::error::{SkipError, SkipResult};

/// HEIC to JPEG through ImageMagick. The output format follows the target
/// extension.
pub struct Converter {
    program: String,
}

impl Converter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Write `dest` from `src`, then remove `src`. Never overwrites.
    pub fn convert(&self, src: &Path, dest: &Path) -> SkipResult<()> {
        if dest.exists() {
            return Err(SkipError::TargetExists(dest.to_path_buf()));
        }
        info!(from = %src.display(), to = %dest.display(), "Converting image");
        let output = Command::new(&self.program)
            .arg(src)
            .arg(dest)
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => SkipError::Convert(format!("{} not found", self.program)),
                _ => SkipError::Convert(e.to_string()),
            })?;
        if !output.status.success() {
            // Don't leave a half-written target behind
            let _ = fs::remove_file(dest);
            return Err(SkipError::Convert(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        fs::remove_file(src)?;
        Ok(())
    }
}
