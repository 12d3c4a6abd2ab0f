//! S3 storage backend for s3sync.
//!
//! Works against AWS S3 and S3-compatible services (MinIO, R2, ...) via
//! `aws-sdk-s3`. Addresses look like `s3://bucket/path`.

mod address;
mod content_type;
mod lister;
mod retry;
mod storage;
mod upload;

pub use address::RemoteAddress;
pub use content_type::content_type_for;
pub use lister::S3PageLister;
pub use storage::S3Storage;
