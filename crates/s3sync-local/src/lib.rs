//! Local filesystem storage backend.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use s3sync_core::{File, FileReader, StorageBackend, StorageError};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

/// Local filesystem backend.
///
/// Listing walks the tree under the root once, following symlinks for file
/// metadata. Writes go to a temporary sibling first and are renamed into place.
#[derive(Debug, Default, Clone)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".s3sync.tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_files(&self, prefix: &str) -> Result<Vec<File>, StorageError> {
        let root = PathBuf::from(prefix);
        let files = tokio::task::spawn_blocking(move || walk(&root))
            .await
            .map_err(|e| StorageError::Io(format!("Directory walk task failed: {}", e)))??;
        debug!("Listed {} local files under {}", files.len(), prefix);
        Ok(files)
    }

    #[instrument(skip(self), level = "debug")]
    async fn read_file(&self, path: &str) -> Result<FileReader, StorageError> {
        let file = fs::File::open(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            _ => StorageError::Io(format!("Failed to open {}: {}", path, e)),
        })?;
        Ok(Box::new(file))
    }

    #[instrument(skip(self, content), level = "debug")]
    async fn write_file(
        &self,
        path: &str,
        mut content: FileReader,
        _public: bool,
    ) -> Result<(), StorageError> {
        let file_path = PathBuf::from(path);

        // Ensure parent directory exists
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::Io(format!(
                    "Failed to create parent directory for {}: {}",
                    file_path.display(),
                    e
                ))
            })?;
        }

        // Write atomically via temp file
        let temp_path = Self::temp_path(&file_path);
        let mut guard = TempFileGuard::new(temp_path.clone());
        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            let bytes = tokio::io::copy(&mut content, &mut file).await?;
            file.flush().await?;
            Ok::<u64, std::io::Error>(bytes)
        }
        .await;

        let bytes = written.map_err(|e| {
            StorageError::Io(format!("Failed to write {}: {}", file_path.display(), e))
        })?;

        fs::rename(&temp_path, &file_path).await.map_err(|e| {
            StorageError::Io(format!(
                "Failed to rename temp file to {}: {}",
                file_path.display(),
                e
            ))
        })?;
        guard.disarm();

        debug!("Wrote {} bytes to {}", bytes, file_path.display());
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        fs::remove_file(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            _ => StorageError::Io(format!("Failed to remove {}: {}", path, e)),
        })
    }

    fn resolve_path(&self, path: &str) -> Result<String, StorageError> {
        let absolute = std::path::absolute(path).map_err(|e| {
            StorageError::InvalidAddress(format!("Cannot resolve {}: {}", path, e))
        })?;
        Ok(absolute.to_string_lossy().to_string())
    }
}

/// Removes a temp file on drop unless it was renamed into place.
///
/// Covers error returns as well as the write future being dropped on timeout
/// or cancellation.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed unfinished temp file {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temp file {}: {}", self.path.display(), e),
        }
    }
}

/// Recursively collect regular files under `root`.
///
/// A missing root is an empty listing. Symlinks are resolved for metadata;
/// symlinked directories are not descended into.
fn walk(root: &Path) -> Result<Vec<File>, StorageError> {
    let mut files = Vec::new();

    match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(StorageError::InvalidAddress(format!(
                "Not a directory: {}",
                root.display()
            )))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
        Err(e) => {
            return Err(StorageError::Io(format!(
                "Failed to stat {}: {}",
                root.display(),
                e
            )))
        }
    }

    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            StorageError::Io(format!("Failed to walk {}: {}", root.display(), e))
        })?;
        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        // Follows symlinks to the target's metadata
        let metadata = std::fs::metadata(path).map_err(|e| {
            StorageError::Io(format!(
                "Failed to get metadata of {}: {}",
                path.display(),
                e
            ))
        })?;
        if metadata.is_dir() {
            debug!("Not descending into symlinked directory {}", path.display());
            continue;
        }

        let last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        files.push(File::new(
            relative_name(root, path),
            metadata.len(),
            last_modified,
        ));
    }

    Ok(files)
}

fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
