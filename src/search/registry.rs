//! Search factory - entity bindings, readers and the writer / 搜索工厂
//!
//! The factory is created once at startup and shared (`Arc`) by everything
//! that searches or indexes.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::partition::PartitionSettings;
use super::reader::ReaderProvider;
use super::schema::PartitionId;
use super::sharding::{strategy_for, ShardingStrategy};
use super::writer::{IndexWriter, DEFAULT_BATCH_SIZE};
use crate::config::AppConfig;
use crate::error::{Result, SearchError};
use crate::models::Entity;

/// Entity name → sharding strategy / 实体与分区策略的绑定
#[derive(Default)]
pub struct EntityBindings {
    inner: RwLock<HashMap<String, Arc<dyn ShardingStrategy>>>,
}

impl EntityBindings {
    pub fn bind(&self, entity: &str, strategy: Arc<dyn ShardingStrategy>) {
        tracing::debug!("Entity {} bound to {:?}", entity, strategy);
        self.inner.write().insert(entity.to_string(), strategy);
    }

    pub fn strategy(&self, entity: &str) -> Result<Arc<dyn ShardingStrategy>> {
        self.inner
            .read()
            .get(entity)
            .cloned()
            .ok_or_else(|| SearchError::UnknownEntity(entity.to_string()))
    }

    /// Partitions to search for an entity, deduplicated in first-seen order
    pub fn partitions_for_query(&self, entity: &str) -> Result<Vec<PartitionId>> {
        let mut partitions: Vec<PartitionId> = Vec::new();
        for partition in self.strategy(entity)?.partitions_for_query() {
            if !partitions.contains(&partition) {
                partitions.push(partition);
            }
        }
        Ok(partitions)
    }

    pub fn entities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
        names.sort();
        names
    }
}

pub struct SearchFactory {
    bindings: Arc<EntityBindings>,
    readers: Arc<ReaderProvider>,
    writer: IndexWriter,
}

impl SearchFactory {
    pub fn new(index_dir: impl Into<PathBuf>, settings: PartitionSettings) -> Self {
        Self::build(index_dir.into(), settings, DEFAULT_BATCH_SIZE)
    }

    /// Build from configuration / 根据配置创建
    pub fn from_config(config: &AppConfig) -> Self {
        Self::build(
            config.get_index_dir(),
            PartitionSettings::from(&config.search),
            config.search.batch_size,
        )
    }

    fn build(index_dir: PathBuf, settings: PartitionSettings, batch_size: usize) -> Self {
        let bindings = Arc::new(EntityBindings::default());
        Self {
            readers: Arc::new(ReaderProvider::new(index_dir.clone(), settings.clone())),
            writer: IndexWriter::new(index_dir, settings, Arc::clone(&bindings), batch_size),
            bindings,
        }
    }

    /// Bind an entity type to a sharding strategy / 注册实体
    pub fn register<T: Entity>(&self, strategy: impl ShardingStrategy + 'static) {
        self.bindings.bind(T::NAME, Arc::new(strategy));
    }

    /// Bind an entity type using the configured shard count
    pub fn register_sharded<T: Entity>(&self, shards: u32) {
        self.bindings.bind(T::NAME, Arc::from(strategy_for(T::NAME, shards)));
    }

    /// Partitions a query over `T` must cover / 查询实体需要覆盖的分区
    pub fn targeted_partitions<T: Entity>(&self) -> Result<Vec<PartitionId>> {
        self.bindings.partitions_for_query(T::NAME)
    }

    pub fn bindings(&self) -> &EntityBindings {
        &self.bindings
    }

    pub fn reader_provider(&self) -> &Arc<ReaderProvider> {
        &self.readers
    }

    pub fn writer(&self) -> &IndexWriter {
        &self.writer
    }

    /// Close all readers and write handles / 关闭所有分区
    pub async fn shutdown(&self) {
        self.readers.shutdown().await;
        self.writer.close().await;
        tracing::info!("Search factory shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Article;
    use crate::search::sharding::{IdHashSharding, NotSharded};

    /// Reports one of its partitions twice
    #[derive(Debug)]
    struct Overlapping;

    impl ShardingStrategy for Overlapping {
        fn partitions_for_query(&self) -> Vec<PartitionId> {
            vec![PartitionId::new("x"), PartitionId::new("y"), PartitionId::new("x")]
        }

        fn partition_for_id(&self, _id: &str) -> PartitionId {
            PartitionId::new("x")
        }
    }

    #[test]
    fn test_unknown_entity() {
        let factory = SearchFactory::new("unused", PartitionSettings::default());
        assert!(matches!(
            factory.targeted_partitions::<Article>(),
            Err(SearchError::UnknownEntity(name)) if name == "article"
        ));
    }

    #[test]
    fn test_targeted_partitions_are_deduplicated() {
        let factory = SearchFactory::new("unused", PartitionSettings::default());
        factory.register::<Article>(Overlapping);
        assert_eq!(
            factory.targeted_partitions::<Article>().unwrap(),
            vec![PartitionId::new("x"), PartitionId::new("y")]
        );
    }

    #[test]
    fn test_register_replaces_binding() {
        let factory = SearchFactory::new("unused", PartitionSettings::default());
        factory.register::<Article>(NotSharded::new("article"));
        factory.register::<Article>(IdHashSharding::new("article", 2));

        assert_eq!(factory.targeted_partitions::<Article>().unwrap().len(), 2);
        assert_eq!(factory.bindings().entities(), vec!["article".to_string()]);
    }

    #[test]
    fn test_register_sharded_from_config() {
        let mut config = AppConfig::default();
        config.search.shards = 3;
        let factory = SearchFactory::from_config(&config);
        factory.register_sharded::<Article>(config.search.shards);

        let partitions = factory.targeted_partitions::<Article>().unwrap();
        assert_eq!(partitions.len(), 3);
        let strategy = factory.bindings().strategy("article").unwrap();
        assert!(partitions.contains(&strategy.partition_for_id("7")));
    }
}
