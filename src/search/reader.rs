//! Shared, reference-counted index readers / 共享索引读取器
//!
//! A partition is opened the first time a reader needs it and closed when the
//! last reader using it is released. Readers are handed out wrapped in a
//! [`ReaderGuard`], which releases them on drop.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

use super::partition::{IndexPartition, PartitionSettings};
use super::schema::PartitionId;
use crate::error::{Result, SearchError};

struct SharedPartition {
    partition: Arc<IndexPartition>,
    refs: usize,
}

/// Read view over a set of partitions / 多分区读取视图
#[derive(Debug)]
pub struct IndexReader {
    partitions: Vec<Arc<IndexPartition>>,
}

impl IndexReader {
    pub fn partitions(&self) -> &[Arc<IndexPartition>] {
        &self.partitions
    }

}

/// Hands out readers and tracks how many are using each partition / 读取器提供者
pub struct ReaderProvider {
    index_dir: PathBuf,
    settings: PartitionSettings,
    open: Mutex<HashMap<PartitionId, SharedPartition>>,
}

impl ReaderProvider {
    pub fn new(index_dir: impl Into<PathBuf>, settings: PartitionSettings) -> Self {
        Self {
            index_dir: index_dir.into(),
            settings,
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire a reader spanning `ids` (duplicates ignored, order kept) / 打开读取器
    ///
    /// On failure every partition acquired so far is released again.
    pub async fn open_reader(self: &Arc<Self>, ids: &[PartitionId]) -> Result<ReaderGuard> {
        let mut unique: Vec<&PartitionId> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }

        let mut acquired = Vec::with_capacity(unique.len());
        for id in unique {
            match self.acquire(id).await {
                Ok(partition) => acquired.push(partition),
                Err(e) => {
                    let partial = IndexReader { partitions: acquired };
                    if let Err(release) = self.close_reader(partial) {
                        tracing::error!("Cannot close index reader: {}", release);
                    }
                    return Err(e);
                }
            }
        }

        Ok(ReaderGuard {
            provider: Arc::clone(self),
            reader: IndexReader { partitions: acquired },
        })
    }

    async fn acquire(&self, id: &PartitionId) -> Result<Arc<IndexPartition>> {
        let existing = {
            let mut open = self.open.lock();
            open.get_mut(id).map(|shared| {
                shared.refs += 1;
                Arc::clone(&shared.partition)
            })
        };
        if let Some(partition) = existing {
            return Ok(partition);
        }

        let opened = Arc::new(IndexPartition::open(&self.index_dir, id.clone(), &self.settings).await?);

        let mut open = self.open.lock();
        let shared = open.entry(id.clone()).or_insert_with(|| SharedPartition {
            partition: Arc::clone(&opened),
            refs: 0,
        });
        if !Arc::ptr_eq(&shared.partition, &opened) {
            tracing::debug!("Index partition {} opened concurrently, reusing", id);
        }
        shared.refs += 1;
        Ok(Arc::clone(&shared.partition))
    }

    /// Release a reader / 释放读取器
    ///
    /// Partitions whose count drops to zero are closed. Every partition is
    /// processed even if one of them is no longer tracked; the first such
    /// failure is returned.
    pub fn close_reader(&self, reader: IndexReader) -> Result<()> {
        let mut failure = None;
        let mut open = self.open.lock();

        for partition in &reader.partitions {
            let id = partition.id();
            match open.get_mut(id) {
                Some(shared) if Arc::ptr_eq(&shared.partition, partition) => {
                    shared.refs -= 1;
                    if shared.refs == 0 {
                        open.remove(id);
                        tracing::debug!("Index partition {} released", id);
                    }
                }
                _ => {
                    failure.get_or_insert(SearchError::ReaderNotOpen(id.clone()));
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Number of partitions currently held open
    pub fn open_partitions(&self) -> usize {
        self.open.lock().len()
    }

    pub fn ref_count(&self, id: &PartitionId) -> usize {
        self.open.lock().get(id).map(|s| s.refs).unwrap_or(0)
    }

    /// Close every partition regardless of outstanding readers / 关闭所有分区
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<IndexPartition>> =
            self.open.lock().drain().map(|(_, shared)| shared.partition).collect();
        for partition in drained {
            partition.close().await;
        }
    }
}

/// Scoped reader; released when dropped / 作用域读取器，离开作用域自动释放
pub struct ReaderGuard {
    provider: Arc<ReaderProvider>,
    reader: IndexReader,
}

impl ReaderGuard {
    /// Release now and report the outcome instead of logging it
    pub fn release(mut self) -> Result<()> {
        let reader = self.take();
        self.provider.close_reader(reader)
    }

    fn take(&mut self) -> IndexReader {
        IndexReader {
            partitions: std::mem::take(&mut self.reader.partitions),
        }
    }
}

impl Deref for ReaderGuard {
    type Target = IndexReader;

    fn deref(&self) -> &IndexReader {
        &self.reader
    }
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        let reader = self.take();
        if reader.partitions.is_empty() {
            return;
        }
        if let Err(e) = self.provider.close_reader(reader) {
            tracing::error!("Cannot close index reader: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn provider(dir: &Path) -> Arc<ReaderProvider> {
        Arc::new(ReaderProvider::new(dir, PartitionSettings::default()))
    }

    fn ids(names: &[&str]) -> Vec<PartitionId> {
        names.iter().map(|n| PartitionId::new(*n)).collect()
    }

    #[tokio::test]
    async fn test_reference_counting() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let a = PartitionId::new("a");

        let first = provider.open_reader(&ids(&["a", "b"])).await.unwrap();
        let second = provider.open_reader(&ids(&["a"])).await.unwrap();
        assert_eq!(provider.ref_count(&a), 2);
        assert_eq!(provider.open_partitions(), 2);

        drop(first);
        assert_eq!(provider.ref_count(&a), 1);
        assert_eq!(provider.open_partitions(), 1);

        drop(second);
        assert_eq!(provider.ref_count(&a), 0);
        assert_eq!(provider.open_partitions(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_acquired_once() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());

        let reader = provider.open_reader(&ids(&["a", "b", "a"])).await.unwrap();
        let open: Vec<PartitionId> = reader.partitions().iter().map(|p| p.id().clone()).collect();
        assert_eq!(open, ids(&["a", "b"]));
        assert_eq!(provider.ref_count(&PartitionId::new("a")), 1);

        reader.release().unwrap();
        assert_eq!(provider.open_partitions(), 0);
    }

    #[tokio::test]
    async fn test_failed_open_releases_partial_reader() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where partition b's database file should be
        std::fs::create_dir(dir.path().join(PartitionId::new("b").file_name())).unwrap();
        let provider = provider(dir.path());

        assert!(provider.open_reader(&ids(&["a", "b"])).await.is_err());
        assert_eq!(provider.open_partitions(), 0);
    }

    #[tokio::test]
    async fn test_release_after_shutdown_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());

        let reader = provider.open_reader(&ids(&["a"])).await.unwrap();
        provider.shutdown().await;
        assert_eq!(provider.open_partitions(), 0);

        let err = reader.release().unwrap_err();
        assert!(matches!(err, SearchError::ReaderNotOpen(id) if id == PartitionId::new("a")));
    }

    #[tokio::test]
    async fn test_drop_after_shutdown_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());

        let reader = provider.open_reader(&ids(&["a"])).await.unwrap();
        provider.shutdown().await;
        drop(reader);

        let again = provider.open_reader(&ids(&["a"])).await.unwrap();
        assert_eq!(provider.ref_count(&PartitionId::new("a")), 1);
        drop(again);
        assert_eq!(provider.open_partitions(), 0);
    }
}
