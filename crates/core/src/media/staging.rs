//! Output files written under a temporary name and renamed into place.

use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::debug;

/// Temporary sibling of a destination path.
///
/// The staged file keeps the destination's extension so ffmpeg can infer the
/// container. Dropping it without [`StagedOutput::commit`] removes the staged
/// file and leaves the destination untouched.
pub struct StagedOutput {
    staged: TempPath,
    destination: PathBuf,
}

impl StagedOutput {
    pub fn create(destination: &Path) -> std::io::Result<Self> {
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let prefix = format!(
            ".{}.",
            destination
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        );
        let suffix = destination
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let staged = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(parent)?
            .into_temp_path();
        Ok(Self {
            staged,
            destination: destination.to_path_buf(),
        })
    }

    /// Path the tool should write to.
    pub fn path(&self) -> &Path {
        &self.staged
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Renames the staged file over the destination.
    pub fn commit(self) -> std::io::Result<()> {
        debug!(
            staged = %self.staged.display(),
            output = %self.destination.display(),
            "Committing staged output"
        );
        self.staged.persist(&self.destination).map_err(|e| e.error)
    }
}
