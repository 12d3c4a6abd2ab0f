use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of each multipart part; bodies shorter than this go up in one `put_object`.
pub(crate) const PART_SIZE: usize = 16 * 1024 * 1024;
/// S3 limit on the number of parts in one multipart upload.
pub(crate) const MAX_PARTS: i32 = 10_000;

/// Splits a reader into fixed-size chunks.
///
/// Every chunk but the last is exactly `chunk_size` bytes. An empty reader
/// yields no chunks.
pub(crate) struct Chunker<R> {
    reader: R,
    chunk_size: usize,
    exhausted: bool,
}

impl<R: AsyncRead + Unpin> Chunker<R> {
    pub(crate) fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            exhausted: false,
        }
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Read the next chunk, or `None` once the reader is drained.
    pub(crate) async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut buf = Vec::new();
        (&mut self.reader)
            .take(self.chunk_size as u64)
            .read_to_end(&mut buf)
            .await?;

        if buf.len() < self.chunk_size {
            self.exhausted = true;
        }
        if buf.is_empty() {
            return Ok(None);
        }
        Ok(Some(Bytes::from(buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3sync_core::FileReader;
    use std::io::Cursor;

    async fn chunk_sizes<R: AsyncRead + Unpin>(mut chunker: Chunker<R>) -> Vec<usize> {
        let mut sizes = Vec::new();
        while let Some(chunk) = chunker.next_chunk().await.unwrap() {
            sizes.push(chunk.len());
        }
        sizes
    }

    #[tokio::test]
    async fn test_last_chunk_is_short() {
        let chunker = Chunker::new(Cursor::new(vec![7u8; 10]), 4);
        assert_eq!(chunk_sizes(chunker).await, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_trailing_empty_chunk() {
        let chunker = Chunker::new(Cursor::new(vec![1u8; 8]), 4);
        assert_eq!(chunk_sizes(chunker).await, vec![4, 4]);
    }

    #[tokio::test]
    async fn test_empty_reader_yields_nothing() {
        let mut chunker = Chunker::new(Cursor::new(Vec::<u8>::new()), 4);
        assert!(chunker.next_chunk().await.unwrap().is_none());
        assert!(chunker.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_chunks_preserve_content_in_order() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let reader: FileReader = Box::new(Cursor::new(data.clone()));
        let mut chunker = Chunker::new(reader, 300);

        let mut joined = Vec::new();
        while let Some(chunk) = chunker.next_chunk().await.unwrap() {
            assert!(chunk.len() <= chunker.chunk_size());
            joined.extend_from_slice(&chunk);
        }
        assert_eq!(joined, data);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_is_clamped() {
        let chunker = Chunker::new(Cursor::new(vec![0u8; 3]), 0);
        assert_eq!(chunker.chunk_size(), 1);
        assert_eq!(chunk_sizes(chunker).await, vec![1, 1, 1]);
    }
}
