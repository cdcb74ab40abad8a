//! File system utils.

use std::{io::Write, path::Path};

use anyhow::Context;

pub struct FsHandler;

impl FsHandler {
    /// Create the parent directory of `path` if it doesn't exist.
    pub fn create_parent_directory(path: &Path) -> anyhow::Result<()> {
        let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(());
        };

        if !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            tracing::debug!("Created directory: {}", parent.display());
        }

        Ok(())
    }

    /// Replace the content of `path` atomically.
    ///
    /// The content is written and flushed to a temporary file in the same
    /// directory, which is then renamed over `path`. Readers observe either the
    /// previous file or the complete new one, never a truncated file.
    pub fn write_atomic(path: &Path, content: &[u8]) -> anyhow::Result<()> {
        Self::create_parent_directory(path)?;

        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent,
            None => Path::new("."),
        };

        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
        temp.write_all(content)
            .context("Failed to write temporary file")?;
        temp.as_file()
            .sync_all()
            .context("Failed to flush temporary file")?;
        temp.persist(path)
            .with_context(|| format!("Failed to move temporary file to {}", path.display()))?;

        Ok(())
    }
}
