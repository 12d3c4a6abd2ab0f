//! Core traits and engine for s3sync.
//!
//! This crate is backend-agnostic:
//! - `StorageBackend`: list/read/write/delete over one storage system
//! - `PrefixCrawler`: flat listing of a paged, delimiter-grouped object store
//! - `classify`: the diff between a source and a destination listing
//! - `SyncScheduler`: bounded-concurrency execution of the resulting plan

mod crawl;
mod diff;
mod engine;
mod error;
mod file;
mod scheduler;
mod storage;

#[cfg(test)]
mod testing;

pub use crawl::{ListPage, ObjectEntry, ObjectLister, PrefixCrawler, DEFAULT_CRAWL_WORKERS};
pub use diff::{classify, CopyAction, CopyReason, SyncPlan};
pub use engine::synchronize;
pub use error::StorageError;
pub use file::File;
pub use scheduler::{
    ActionKind, ItemFailure, Location, SyncOptions, SyncReport, SyncScheduler,
    DEFAULT_MAX_CONCURRENCY, DEFAULT_OP_TIMEOUT,
};
pub use storage::{join_path, FileReader, StorageBackend};
