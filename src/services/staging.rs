use crate::models::UploadedImage;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Writes uploads into the staging directory under collision-free names.
#[derive(Debug, Clone)]
pub struct Stager {
    dir: PathBuf,
}

/// A staged upload. The file is deleted by [`StagedFile::release`] or, failing
/// that, when the value is dropped.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl Stager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the staging directory if it does not exist yet
    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Persists the upload as `<uuid><ext>` and returns once every byte is flushed.
    pub async fn stage(&self, upload: &UploadedImage) -> io::Result<StagedFile> {
        // The directory may have been removed since startup
        self.ensure_dir().await?;

        let prefix = Uuid::new_v4().to_string();
        let extension = upload.extension();
        let named = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&extension)
            .rand_bytes(0)
            .tempfile_in(&self.dir)?;

        // From here on a failed write still removes the partial file on drop
        let (file, temp) = named.into_parts();
        let staged = StagedFile {
            path: temp.to_path_buf(),
            temp: Some(temp),
        };

        let mut file = tokio::fs::File::from_std(file);
        file.write_all(&upload.data).await?;
        file.flush().await?;
        file.sync_all().await?;

        tracing::debug!(
            "Staged {} ({} bytes, {}) at {}",
            upload.file_name,
            upload.data.len(),
            upload.content_type.as_deref().unwrap_or("no content type"),
            staged.path.display()
        );

        Ok(staged)
    }
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the staged file. Safe to call more than once and when the file
    /// is already gone.
    pub fn release(&mut self) -> io::Result<()> {
        let Some(temp) = self.temp.take() else {
            return Ok(());
        };
        match temp.close() {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
