//! Partition selection / 分区选择策略

use sha2::{Digest, Sha256};
use std::fmt::Debug;

use super::schema::PartitionId;

/// Decides which partitions hold an entity's documents
pub trait ShardingStrategy: Send + Sync + Debug {
    /// Every partition a query has to look at / 查询需要覆盖的分区
    fn partitions_for_query(&self) -> Vec<PartitionId>;

    /// Partition a document with this identifier is written to / 文档写入的分区
    fn partition_for_id(&self, id: &str) -> PartitionId;
}

/// Single partition named after the entity
#[derive(Debug, Clone)]
pub struct NotSharded {
    partition: PartitionId,
}

impl NotSharded {
    pub fn new(entity: &str) -> Self {
        Self {
            partition: PartitionId::new(entity),
        }
    }
}

impl ShardingStrategy for NotSharded {
    fn partitions_for_query(&self) -> Vec<PartitionId> {
        vec![self.partition.clone()]
    }

    fn partition_for_id(&self, _id: &str) -> PartitionId {
        self.partition.clone()
    }
}

/// `shards` partitions `<entity>-0 .. <entity>-N`, routed by a stable hash of the id
#[derive(Debug, Clone)]
pub struct IdHashSharding {
    partitions: Vec<PartitionId>,
}

impl IdHashSharding {
    pub fn new(entity: &str, shards: u32) -> Self {
        let shards = shards.max(1);
        Self {
            partitions: (0..shards)
                .map(|i| PartitionId::new(format!("{}-{}", entity, i)))
                .collect(),
        }
    }

    pub fn shard_of(&self, id: &str) -> usize {
        let digest = Sha256::digest(id.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(head) % self.partitions.len() as u64) as usize
    }
}

impl ShardingStrategy for IdHashSharding {
    fn partitions_for_query(&self) -> Vec<PartitionId> {
        self.partitions.clone()
    }

    fn partition_for_id(&self, id: &str) -> PartitionId {
        self.partitions[self.shard_of(id)].clone()
    }
}

/// Strategy from a configured shard count / 根据配置选择策略
pub fn strategy_for(entity: &str, shards: u32) -> Box<dyn ShardingStrategy> {
    if shards <= 1 {
        Box::new(NotSharded::new(entity))
    } else {
        Box::new(IdHashSharding::new(entity, shards))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_sharded() {
        let strategy = NotSharded::new("article");
        assert_eq!(strategy.partitions_for_query(), vec![PartitionId::new("article")]);
        assert_eq!(strategy.partition_for_id("42"), PartitionId::new("article"));
    }

    #[test]
    fn test_hash_routing_is_stable_and_in_range() {
        let strategy = IdHashSharding::new("article", 4);
        assert_eq!(strategy.partitions_for_query().len(), 4);

        for i in 0..100 {
            let id = i.to_string();
            let p = strategy.partition_for_id(&id);
            assert_eq!(p, strategy.partition_for_id(&id));
            assert!(strategy.partitions_for_query().contains(&p));
        }
    }

    #[test]
    fn test_hash_routing_spreads_ids() {
        let strategy = IdHashSharding::new("article", 3);
        let mut used = std::collections::HashSet::new();
        for i in 0..60 {
            used.insert(strategy.shard_of(&i.to_string()));
        }
        assert_eq!(used.len(), 3);
    }

    #[test]
    fn test_zero_shards_means_one() {
        let strategy = IdHashSharding::new("article", 0);
        assert_eq!(strategy.partitions_for_query(), vec![PartitionId::new("article-0")]);
        assert_eq!(strategy_for("article", 1).partitions_for_query(), vec![PartitionId::new("article")]);
    }
}
