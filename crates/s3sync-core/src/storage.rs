use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::StorageError;
use crate::file::File;

/// Readable content stream handed from one backend to another.
pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;

/// Storage backend abstraction over the local filesystem and object stores.
///
/// Paths passed to `read_file`, `write_file` and `delete_file` are absolute in the
/// backend's own addressing scheme (see `resolve_path`). Implementations must be
/// safe to call concurrently from multiple transfer workers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Returns the backend name (e.g., "local", "s3").
    fn backend_name(&self) -> &'static str;

    /// List every file below `prefix`, with filenames relative to it.
    ///
    /// Listing is all-or-nothing: any failure aborts the whole listing.
    async fn list_files(&self, prefix: &str) -> Result<Vec<File>, StorageError>;

    /// Open a file for reading.
    async fn read_file(&self, path: &str) -> Result<FileReader, StorageError>;

    /// Write the full content of `content` to `path`.
    ///
    /// # Arguments
    /// * `path` - Destination path
    /// * `content` - Stream to drain
    /// * `public` - Whether the object should be publicly readable (ignored where meaningless)
    async fn write_file(
        &self,
        path: &str,
        content: FileReader,
        public: bool,
    ) -> Result<(), StorageError>;

    /// Delete a file.
    async fn delete_file(&self, path: &str) -> Result<(), StorageError>;

    /// Normalize a user-supplied path into the backend's canonical form.
    fn resolve_path(&self, path: &str) -> Result<String, StorageError>;
}

/// Join a listing root and a relative filename with a single `/`.
pub fn join_path(root: &str, filename: &str) -> String {
    let trimmed = root.trim_end_matches('/');
    let filename = filename.trim_start_matches('/');
    if root.is_empty() {
        filename.to_string()
    } else if filename.is_empty() {
        root.to_string()
    } else {
        format!("{}/{}", trimmed, filename)
    }
}
