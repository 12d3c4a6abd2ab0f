use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use s3sync_core::{
    File, FileReader, PrefixCrawler, StorageBackend, StorageError, DEFAULT_CRAWL_WORKERS,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::address::RemoteAddress;
use crate::content_type::content_type_for;
use crate::lister::S3PageLister;
use crate::retry::with_retry;
use crate::upload::{Chunker, MAX_PARTS, PART_SIZE};

/// S3 (or S3-compatible) storage backend.
///
/// Paths are `s3://bucket/key` addresses. Listing crawls the prefix tree
/// concurrently with a fixed-size worker pool.
#[derive(Clone)]
pub struct S3Storage {
    s3_client: S3Client,
    crawl_workers: usize,
    cancel: CancellationToken,
}

impl S3Storage {
    /// Create a new S3Storage backend.
    pub fn new(s3_client: S3Client) -> Self {
        Self {
            s3_client,
            crawl_workers: DEFAULT_CRAWL_WORKERS,
            cancel: CancellationToken::new(),
        }
    }

    /// Number of concurrent listing workers used when crawling.
    pub fn with_crawl_workers(mut self, workers: usize) -> Self {
        self.crawl_workers = workers.max(1);
        self
    }

    /// Token that aborts in-progress listings when cancelled.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_files(&self, prefix: &str) -> Result<Vec<File>, StorageError> {
        let address = RemoteAddress::parse(prefix)?;
        let root = address.directory_prefix();
        let lister = S3PageLister::new(self.s3_client.clone(), address.bucket.clone());

        let files = PrefixCrawler::new(Arc::new(lister))
            .with_workers(self.crawl_workers)
            .enumerate(&root, &self.cancel)
            .await?;

        debug!("Listed {} objects under {}", files.len(), prefix);
        Ok(files)
    }

    #[instrument(skip(self), level = "debug")]
    async fn read_file(&self, path: &str) -> Result<FileReader, StorageError> {
        let address = RemoteAddress::parse(path)?;

        let output = with_retry("get_object", &address.key, || {
            self.s3_client
                .get_object()
                .bucket(&address.bucket)
                .key(&address.key)
                .send()
        })
        .await
        .map_err(|e| {
            let service_error = e.into_service_error();
            if service_error.is_no_such_key() {
                StorageError::NotFound(path.to_string())
            } else {
                StorageError::Transfer(format!(
                    "S3 get_object error for {}: {}",
                    path,
                    DisplayErrorContext(&service_error)
                ))
            }
        })?;

        Ok(Box::new(Box::pin(output.body.into_async_read())))
    }

    #[instrument(skip(self, content), level = "debug")]
    async fn write_file(
        &self,
        path: &str,
        content: FileReader,
        public: bool,
    ) -> Result<(), StorageError> {
        let address = RemoteAddress::parse(path)?;
        let content_type = content_type_for(&address.key);
        let acl = public.then_some(ObjectCannedAcl::PublicRead);

        let mut chunks = Chunker::new(content, PART_SIZE);
        let first = chunks
            .next_chunk()
            .await
            .map_err(|e| read_error(path, e))?
            .unwrap_or_default();

        let size = if first.len() < chunks.chunk_size() {
            let size = first.len() as u64;
            self.put_single(&address, path, first, content_type, acl)
                .await?;
            size
        } else {
            self.put_multipart(&address, path, first, &mut chunks, content_type, acl)
                .await?
        };

        debug!("Uploaded {} ({} bytes, {})", path, size, content_type);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        let address = RemoteAddress::parse(path)?;

        with_retry("delete_object", &address.key, || {
            self.s3_client
                .delete_object()
                .bucket(&address.bucket)
                .key(&address.key)
                .send()
        })
        .await
        .map_err(|e| {
            StorageError::Transfer(format!(
                "S3 delete_object error for {}: {}",
                path,
                DisplayErrorContext(&e)
            ))
        })?;

        Ok(())
    }

    fn resolve_path(&self, path: &str) -> Result<String, StorageError> {
        RemoteAddress::parse(path)?;
        Ok(path.to_string())
    }
}

impl S3Storage {
    async fn put_single(
        &self,
        address: &RemoteAddress,
        path: &str,
        body: Bytes,
        content_type: &str,
        acl: Option<ObjectCannedAcl>,
    ) -> Result<(), StorageError> {
        with_retry("put_object", &address.key, || {
            self.s3_client
                .put_object()
                .bucket(&address.bucket)
                .key(&address.key)
                .content_type(content_type)
                .set_acl(acl.clone())
                .body(ByteStream::from(body.clone()))
                .send()
        })
        .await
        .map_err(|e| transfer_error("put_object", path, e))?;
        Ok(())
    }

    /// Stream the remaining chunks as a multipart upload, aborting it on failure.
    async fn put_multipart(
        &self,
        address: &RemoteAddress,
        path: &str,
        first: Bytes,
        chunks: &mut Chunker<FileReader>,
        content_type: &str,
        acl: Option<ObjectCannedAcl>,
    ) -> Result<u64, StorageError> {
        let created = with_retry("create_multipart_upload", &address.key, || {
            self.s3_client
                .create_multipart_upload()
                .bucket(&address.bucket)
                .key(&address.key)
                .content_type(content_type)
                .set_acl(acl.clone())
                .send()
        })
        .await
        .map_err(|e| transfer_error("create_multipart_upload", path, e))?;

        let upload_id = created.upload_id().map(str::to_string).ok_or_else(|| {
            StorageError::Transfer(format!(
                "S3 create_multipart_upload for {} returned no upload id",
                path
            ))
        })?;
        let mut pending = PendingUpload::new(self.s3_client.clone(), address, &upload_id);

        let result = match self
            .upload_parts(address, path, &upload_id, first, chunks)
            .await
        {
            Ok((parts, size)) => self
                .complete_multipart(address, path, &upload_id, parts)
                .await
                .map(|_| size),
            Err(e) => Err(e),
        };

        pending.disarm();
        if result.is_err() {
            self.abort_multipart(address, &upload_id).await;
        }
        result
    }

    async fn upload_parts(
        &self,
        address: &RemoteAddress,
        path: &str,
        upload_id: &str,
        first: Bytes,
        chunks: &mut Chunker<FileReader>,
    ) -> Result<(Vec<CompletedPart>, u64), StorageError> {
        let mut parts = Vec::new();
        let mut size = 0u64;
        let mut next = Some(first);

        while let Some(body) = next {
            let part_number = parts.len() as i32 + 1;
            if part_number > MAX_PARTS {
                return Err(StorageError::Transfer(format!(
                    "{} exceeds {} parts of {} bytes",
                    path, MAX_PARTS, PART_SIZE
                )));
            }
            size += body.len() as u64;

            let output = with_retry("upload_part", &address.key, || {
                self.s3_client
                    .upload_part()
                    .bucket(&address.bucket)
                    .key(&address.key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(body.clone()))
                    .send()
            })
            .await
            .map_err(|e| transfer_error("upload_part", path, e))?;

            debug!(part_number, bytes = body.len(), "Uploaded part of {}", path);
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            next = chunks.next_chunk().await.map_err(|e| read_error(path, e))?;
        }

        Ok((parts, size))
    }

    async fn complete_multipart(
        &self,
        address: &RemoteAddress,
        path: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError> {
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        with_retry("complete_multipart_upload", &address.key, || {
            self.s3_client
                .complete_multipart_upload()
                .bucket(&address.bucket)
                .key(&address.key)
                .upload_id(upload_id)
                .multipart_upload(upload.clone())
                .send()
        })
        .await
        .map_err(|e| transfer_error("complete_multipart_upload", path, e))?;
        Ok(())
    }

    async fn abort_multipart(&self, address: &RemoteAddress, upload_id: &str) {
        let aborted = self
            .s3_client
            .abort_multipart_upload()
            .bucket(&address.bucket)
            .key(&address.key)
            .upload_id(upload_id)
            .send()
            .await;
        if let Err(e) = aborted {
            warn!(
                "Failed to abort multipart upload {} for {}: {}",
                upload_id,
                address,
                DisplayErrorContext(&e)
            );
        }
    }
}

/// Aborts a multipart upload in the background if the upload future is dropped
/// before it finishes (operation timeout or cancellation).
struct PendingUpload {
    s3_client: S3Client,
    bucket: String,
    key: String,
    upload_id: String,
    armed: bool,
}

impl PendingUpload {
    fn new(s3_client: S3Client, address: &RemoteAddress, upload_id: &str) -> Self {
        Self {
            s3_client,
            bucket: address.bucket.clone(),
            key: address.key.clone(),
            upload_id: upload_id.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let request = self
            .s3_client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id);
        let key = std::mem::take(&mut self.key);
        handle.spawn(async move {
            if let Err(e) = request.send().await {
                warn!("Failed to abort interrupted upload of {}: {}", key, DisplayErrorContext(&e));
            }
        });
    }
}

fn read_error(path: &str, e: std::io::Error) -> StorageError {
    StorageError::Io(format!("Failed to read content for {}: {}", path, e))
}

fn transfer_error(operation: &str, path: &str, e: impl std::error::Error) -> StorageError {
    StorageError::Transfer(format!(
        "S3 {} error for {}: {}",
        operation,
        path,
        DisplayErrorContext(&e)
    ))
}
