//! Search index schema definition / 搜索索引的 Schema 定义

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Name of one index partition / 索引分区名
///
/// Backed by `index_<name>.db` inside the index directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionId(String);

impl PartitionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Database file name for this partition / 分区数据库文件名
    pub fn file_name(&self) -> String {
        format!("index_{}.db", self.0)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document to be written into the index / 待索引文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Entity name the document belongs to / 实体名
    pub entity: String,
    /// Identifier stored verbatim, normally the primary key / 文档标识
    pub id: String,
    /// Text to analyze / 待分词文本
    pub text: String,
}

impl IndexDocument {
    pub fn new(entity: impl Into<String>, id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Stored fields of a matching document / 命中文档的存储字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub entity: String,
    pub id: String,
}

/// Location of a document inside a reader: (partition index, document number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocAddress {
    pub partition: usize,
    pub doc: i64,
}

impl fmt::Display for DocAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.partition, self.doc)
    }
}

/// One hit / 单个命中
///
/// Carries the stored fields read together with the postings, so a hit stays
/// resolvable after its document is replaced or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDoc {
    pub address: DocAddress,
    /// Relevance score / 相关性分数
    pub score: f32,
    pub stored: StoredDocument,
}

impl ScoreDoc {
    /// Descending score, then ascending address
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.address.cmp(&other.address))
    }
}

/// Ranked hits of one query / 查询结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopDocs {
    /// Number of matching documents, independent of the requested limit
    pub total_hits: usize,
    pub score_docs: Vec<ScoreDoc>,
}

/// Index statistics / 索引统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub document_count: u64,
    pub term_count: u64,
    pub last_updated: Option<i64>,
}

impl IndexStats {
    pub fn merge(&mut self, other: &IndexStats) {
        self.document_count += other.document_count;
        self.term_count += other.term_count;
        self.last_updated = match (self.last_updated, other.last_updated) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}
