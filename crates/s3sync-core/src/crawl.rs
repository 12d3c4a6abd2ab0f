//! Recursive, concurrent enumeration of a paged object store.
//!
//! Object stores list keys one page at a time and group deeper keys into
//! "common prefixes" when a delimiter is given. `PrefixCrawler` turns that into
//! a flat listing: every common prefix becomes a new work item, a bounded pool
//! of workers lists prefixes in parallel, and a single coordinator owns the
//! pending queue and the set of already dispatched prefixes.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::StorageError;
use crate::file::File;

/// Default number of concurrent listing workers.
pub const DEFAULT_CRAWL_WORKERS: usize = 10;

/// One object returned in a listing page.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    /// Full key of the object
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Last modified timestamp, if reported
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a delimiter-scoped listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Keys directly under the listed prefix
    pub objects: Vec<ObjectEntry>,
    /// Sub-prefixes grouped by the delimiter (full prefixes, ending with the delimiter)
    pub common_prefixes: Vec<String>,
    /// Continuation token, `None` on the last page
    pub next_token: Option<String>,
}

/// A store that can list one page of keys under a prefix, grouped by `/`.
#[async_trait]
pub trait ObjectLister: Send + Sync + 'static {
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage, StorageError>;
}

enum CrawlEvent {
    Object(File),
    Prefix(String),
}

/// Flattens a hierarchical, paginated listing into a list of files.
pub struct PrefixCrawler<L> {
    lister: Arc<L>,
    workers: usize,
}

impl<L: ObjectLister> PrefixCrawler<L> {
    pub fn new(lister: Arc<L>) -> Self {
        Self {
            lister,
            workers: DEFAULT_CRAWL_WORKERS,
        }
    }

    /// Set the worker pool size (at least 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// List every object below `root`.
    ///
    /// Filenames are reported relative to `root`. The first failing page aborts
    /// the crawl and nothing gathered so far is returned.
    pub async fn enumerate(
        &self,
        root: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<File>, StorageError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pending: VecDeque<String> = VecDeque::from([root.to_string()]);
        let mut dispatched: HashSet<String> = HashSet::new();
        let mut workers: JoinSet<Result<(), StorageError>> = JoinSet::new();
        let mut files = Vec::new();

        loop {
            while workers.len() < self.workers {
                let Some(prefix) = pending.pop_front() else {
                    break;
                };
                if !dispatched.insert(prefix.clone()) {
                    continue;
                }
                workers.spawn(crawl_prefix(
                    self.lister.clone(),
                    root.to_string(),
                    prefix,
                    tx.clone(),
                ));
            }

            if workers.is_empty() {
                // Every worker has been joined and its events drained, so no
                // new prefix can appear after this point.
                while let Ok(event) = rx.try_recv() {
                    absorb(event, &mut files, &mut pending, &dispatched);
                }
                if pending.is_empty() {
                    break;
                }
                continue;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    workers.abort_all();
                    return Err(StorageError::Cancelled);
                }
                Some(joined) = workers.join_next() => {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            workers.abort_all();
                            return Err(e);
                        }
                        Err(e) => {
                            workers.abort_all();
                            return Err(StorageError::Listing(format!(
                                "crawl worker failed: {}",
                                e
                            )));
                        }
                    }
                    // A finished worker sent all its events before exiting.
                    while let Ok(event) = rx.try_recv() {
                        absorb(event, &mut files, &mut pending, &dispatched);
                    }
                    debug!(
                        active = workers.len(),
                        pending = pending.len(),
                        discovered = files.len(),
                        "scanning prefixes"
                    );
                }
                Some(event) = rx.recv() => {
                    absorb(event, &mut files, &mut pending, &dispatched);
                }
            }
        }

        debug!(
            root,
            files = files.len(),
            prefixes = dispatched.len(),
            "crawl complete"
        );
        Ok(files)
    }
}

fn absorb(
    event: CrawlEvent,
    files: &mut Vec<File>,
    pending: &mut VecDeque<String>,
    dispatched: &HashSet<String>,
) {
    match event {
        CrawlEvent::Object(file) => files.push(file),
        CrawlEvent::Prefix(prefix) => {
            if !dispatched.contains(&prefix) {
                pending.push_back(prefix);
            }
        }
    }
}

/// List all pages of one prefix, streaming objects and sub-prefixes back.
async fn crawl_prefix<L: ObjectLister>(
    lister: Arc<L>,
    root: String,
    prefix: String,
    tx: mpsc::UnboundedSender<CrawlEvent>,
) -> Result<(), StorageError> {
    let mut continuation: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = lister.list_page(&prefix, continuation.take()).await?;
        pages += 1;

        for object in page.objects {
            // Directory markers
            if object.key.ends_with('/') {
                continue;
            }
            let filename = relative_name(&root, &object.key);
            let _ = tx.send(CrawlEvent::Object(File::new(
                filename,
                object.size,
                object.last_modified,
            )));
        }

        for sub_prefix in page.common_prefixes {
            let _ = tx.send(CrawlEvent::Prefix(sub_prefix));
        }

        match page.next_token {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }

    debug!(prefix, pages, "listed prefix");
    Ok(())
}

fn relative_name(root: &str, key: &str) -> String {
    key.strip_prefix(root)
        .unwrap_or(key)
        .trim_start_matches('/')
        .to_string()
}
