//! Search module - partitioned full-text index / 搜索模块
//!
//! Index features / 索引特性：
//! - One SQLite database per partition, inverted term table + stored ids
//! - Entities are bound to partitions through a sharding strategy
//! - Supports Chinese segmentation (jieba) and simplified/traditional matching
//! - Readers are reference counted and shared between concurrent searches

pub mod partition;
pub mod query;
pub mod reader;
pub mod registry;
pub mod schema;
pub mod searcher;
pub mod sharding;
pub mod tokenizer;
pub mod writer;

pub use query::Query;
pub use reader::{IndexReader, ReaderGuard, ReaderProvider};
pub use registry::{EntityBindings, SearchFactory};
pub use schema::{DocAddress, IndexDocument, IndexStats, PartitionId, ScoreDoc, StoredDocument, TopDocs};
pub use searcher::IndexSearcher;
pub use sharding::{IdHashSharding, NotSharded, ShardingStrategy};
pub use writer::IndexWriter;
