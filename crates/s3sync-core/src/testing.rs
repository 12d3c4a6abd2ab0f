//! In-memory backend used as a test double.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::io::AsyncReadExt;

use crate::error::StorageError;
use crate::file::File;
use crate::storage::{FileReader, StorageBackend};

pub(crate) fn old_stamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
}

#[derive(Default)]
pub(crate) struct MemoryStorage {
    objects: Mutex<HashMap<String, (Vec<u8>, DateTime<Utc>)>>,
    failing_reads: Mutex<HashSet<String>>,
    delay: Duration,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn put(&self, path: &str, data: &[u8], modified: DateTime<Utc>) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (data.to_vec(), modified));
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .map(|(data, _)| data.clone())
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    pub fn fail_reads_of(&self, path: &str) {
        self.failing_reads.lock().unwrap().insert(path.to_string());
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<File>, StorageError> {
        let root = format!("{}/", prefix.trim_end_matches('/'));
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(path, (data, modified))| {
                path.strip_prefix(&root)
                    .map(|name| File::new(name, data.len() as u64, Some(*modified)))
            })
            .collect())
    }

    async fn read_file(&self, path: &str) -> Result<FileReader, StorageError> {
        if self.failing_reads.lock().unwrap().contains(path) {
            return Err(StorageError::Io(format!("cannot read {}", path)));
        }
        let data = self
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn write_file(
        &self,
        path: &str,
        mut content: FileReader,
        _public: bool,
    ) -> Result<(), StorageError> {
        self.enter();
        let mut data = Vec::new();
        let result = content.read_to_end(&mut data).await;
        self.pause().await;
        self.leave();

        result?;
        self.put(path, &data, Utc::now());
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        self.enter();
        self.pause().await;
        self.leave();
        self.objects
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn resolve_path(&self, path: &str) -> Result<String, StorageError> {
        Ok(path.to_string())
    }
}
