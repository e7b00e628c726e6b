//! Index writer - keeps the text index in step with the database / 索引写入
//!
//! Write handles are separate from the reader pools; both sides see the same
//! SQLite files through WAL.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use super::partition::{IndexPartition, PartitionSettings};
use super::registry::EntityBindings;
use super::schema::{IndexDocument, IndexStats, PartitionId};
use crate::db::Session;
use crate::error::Result;
use crate::models::Entity;

pub const DEFAULT_BATCH_SIZE: usize = 500;

pub struct IndexWriter {
    index_dir: PathBuf,
    settings: PartitionSettings,
    bindings: Arc<EntityBindings>,
    batch_size: usize,
    partitions: Mutex<HashMap<PartitionId, Arc<IndexPartition>>>,
}

impl IndexWriter {
    pub(crate) fn new(
        index_dir: PathBuf,
        settings: PartitionSettings,
        bindings: Arc<EntityBindings>,
        batch_size: usize,
    ) -> Self {
        Self {
            index_dir,
            settings,
            bindings,
            batch_size: batch_size.max(1),
            partitions: Mutex::new(HashMap::new()),
        }
    }

    async fn partition(&self, id: &PartitionId) -> Result<Arc<IndexPartition>> {
        let existing = self.partitions.lock().get(id).cloned();
        if let Some(partition) = existing {
            return Ok(partition);
        }

        let opened = Arc::new(IndexPartition::open(&self.index_dir, id.clone(), &self.settings).await?);
        let partition = self
            .partitions
            .lock()
            .entry(id.clone())
            .or_insert(opened)
            .clone();
        Ok(partition)
    }

    /// Index (or re-index) one entity / 索引单个实体
    pub async fn index<T: Entity>(&self, entity: &T) -> Result<()> {
        self.index_batch(std::slice::from_ref(entity)).await?;
        Ok(())
    }

    /// Index a batch of entities, grouped per partition / 批量索引
    pub async fn index_batch<T: Entity>(&self, entities: &[T]) -> Result<usize> {
        let docs = entities
            .iter()
            .map(|e| IndexDocument::new(T::NAME, e.id().to_string(), e.indexed_text()))
            .collect();
        self.write_documents(T::NAME, docs).await
    }

    /// Index a raw document produced elsewhere; the entity must be registered
    pub async fn index_document(&self, doc: IndexDocument) -> Result<()> {
        let entity = doc.entity.clone();
        self.write_documents(&entity, vec![doc]).await?;
        Ok(())
    }

    async fn write_documents(&self, entity: &str, docs: Vec<IndexDocument>) -> Result<usize> {
        let strategy = self.bindings.strategy(entity)?;

        let mut grouped: BTreeMap<PartitionId, Vec<IndexDocument>> = BTreeMap::new();
        for doc in docs {
            grouped.entry(strategy.partition_for_id(&doc.id)).or_default().push(doc);
        }

        let mut written = 0;
        for (id, docs) in grouped {
            let partition = self.partition(&id).await?;
            partition.add_documents(&docs).await?;
            partition.set_last_updated().await?;
            written += docs.len();
        }
        Ok(written)
    }

    /// Remove an entity's document / 删除实体索引
    pub async fn delete<T: Entity>(&self, id: i64) -> Result<bool> {
        let id = id.to_string();
        let partition_id = self.bindings.strategy(T::NAME)?.partition_for_id(&id);
        let partition = self.partition(&partition_id).await?;
        partition.delete_document(T::NAME, &id).await
    }

    /// Remove every document of `T` from all its partitions / 清空实体索引
    pub async fn purge_all<T: Entity>(&self) -> Result<u64> {
        let mut removed = 0;
        for id in self.bindings.partitions_for_query(T::NAME)? {
            removed += self.partition(&id).await?.delete_entity(T::NAME).await?;
        }
        Ok(removed)
    }

    /// Rebuild the index of `T` from the database / 从数据库重建索引
    ///
    /// Existing entries are purged first, so rows deleted from the database
    /// stop showing up as stale hits.
    pub async fn reindex<T: Entity>(&self, session: &Session) -> Result<usize> {
        let purged = self.purge_all::<T>().await?;
        tracing::info!("Reindexing {}: purged {} entries", T::NAME, purged);

        let mut indexed = 0;
        let mut last_id = i64::MIN;
        loop {
            let batch: Vec<T> = session.batch_after(last_id, self.batch_size).await?;
            let Some(last) = batch.last() else {
                break;
            };
            last_id = last.id();
            indexed += self.index_batch(&batch).await?;
            tracing::debug!("Reindexing {}: {} entities so far", T::NAME, indexed);

            if batch.len() < self.batch_size {
                break;
            }
        }

        tracing::info!("Reindexing {} finished: {} entities", T::NAME, indexed);
        Ok(indexed)
    }

    /// Statistics over all partitions of `T` / 索引统计
    pub async fn stats<T: Entity>(&self) -> Result<IndexStats> {
        let mut stats = IndexStats::default();
        for id in self.bindings.partitions_for_query(T::NAME)? {
            stats.merge(&self.partition(&id).await?.stats().await?);
        }
        Ok(stats)
    }

    pub async fn close(&self) {
        let drained: Vec<Arc<IndexPartition>> =
            self.partitions.lock().drain().map(|(_, p)| p).collect();
        for partition in drained {
            partition.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{insert_article, run_migrations, Session};
    use crate::models::{Article, CreateArticleRequest};
    use crate::search::partition::PartitionSettings;
    use crate::search::registry::SearchFactory;
    use crate::search::schema::IndexDocument;
    use crate::search::sharding::{IdHashSharding, NotSharded};
    use crate::error::SearchError;

    async fn session(dir: &tempfile::TempDir) -> Session {
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("main.db").to_string_lossy());
        let pool = crate::db::connect(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        Session::new(pool)
    }

    fn article(id: i64, text: &str) -> Article {
        Article {
            id,
            title: text.to_string(),
            body: String::new(),
            created_at: String::new(),
        }
    }

    #[tokio::test]
    async fn test_sharded_batch_lands_in_every_partition() {
        let dir = tempfile::tempdir().unwrap();
        let factory = SearchFactory::new(dir.path().join("search"), PartitionSettings::default());
        factory.register::<Article>(IdHashSharding::new("article", 3));

        let articles: Vec<Article> = (1..=30).map(|i| article(i, "shared words")).collect();
        let written = factory.writer().index_batch(&articles).await.unwrap();
        assert_eq!(written, 30);

        for id in factory.targeted_partitions::<Article>().unwrap() {
            let partition = factory.writer().partition(&id).await.unwrap();
            assert!(partition.doc_count().await.unwrap() > 0);
        }

        let stats = factory.writer().stats::<Article>().await.unwrap();
        assert_eq!(stats.document_count, 30);
        assert!(stats.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_delete_and_purge() {
        let dir = tempfile::tempdir().unwrap();
        let factory = SearchFactory::new(dir.path(), PartitionSettings::default());
        factory.register::<Article>(NotSharded::new("article"));
        let writer = factory.writer();

        writer.index(&article(1, "one")).await.unwrap();
        writer.index(&article(2, "two")).await.unwrap();

        assert!(writer.delete::<Article>(1).await.unwrap());
        assert!(!writer.delete::<Article>(1).await.unwrap());
        assert_eq!(writer.purge_all::<Article>().await.unwrap(), 1);
        assert_eq!(writer.stats::<Article>().await.unwrap().document_count, 0);
    }

    #[tokio::test]
    async fn test_unregistered_entity_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let factory = SearchFactory::new(dir.path(), PartitionSettings::default());

        let err = factory
            .writer()
            .index_document(IndexDocument::new("comment", "1", "text"))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::UnknownEntity(_)));
    }

    #[tokio::test]
    async fn test_reindex_walks_whole_table_in_batches() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(&dir).await;
        for i in 0..7 {
            let req = CreateArticleRequest {
                title: format!("title {}", i),
                body: "body".to_string(),
            };
            insert_article(session.pool(), &req).await.unwrap();
        }

        let mut config = crate::config::AppConfig::default();
        config.database.data_dir = dir.path().to_string_lossy().into_owned();
        config.search.batch_size = 3;
        let factory = SearchFactory::from_config(&config);
        factory.register::<Article>(NotSharded::new("article"));

        // an entry that no longer exists in the database
        factory.writer().index(&article(99, "ghost")).await.unwrap();

        let indexed = factory.writer().reindex::<Article>(&session).await.unwrap();
        assert_eq!(indexed, 7);
        assert_eq!(factory.writer().stats::<Article>().await.unwrap().document_count, 7);
    }
}
