//! Index partition - one SQLite file per partition / 索引分区
//!
//! Storage layout / 存储方案：
//! - search_docs: document number + entity name + stored identifier
//! - search_terms: postings (term, doc, tf), WITHOUT ROWID
//! - search_meta: last update time etc.
//!
//! Each partition is its own database in WAL mode, so readers and the writer
//! can work on it at the same time. 每个分区独立数据库 + WAL 模式

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite, Transaction};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::schema::{IndexDocument, IndexStats, PartitionId, StoredDocument};
use super::tokenizer::tokenize;
use crate::config::SearchConfig;
use crate::error::{is_busy, Result, SearchError};

const MAX_RETRIES: u32 = 3;

/// Connection settings shared by all partitions / 分区连接设置
#[derive(Debug, Clone)]
pub struct PartitionSettings {
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for PartitionSettings {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for PartitionSettings {
    fn from(config: &SearchConfig) -> Self {
        Self {
            max_connections: config.max_connections.max(1),
            busy_timeout_ms: config.busy_timeout_ms,
        }
    }
}

/// One postings row, with the stored fields of its document / 倒排记录
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Posting {
    pub term: String,
    pub doc: i64,
    pub tf: i64,
    pub entity: String,
    pub entity_id: String,
}

impl Posting {
    pub fn stored(&self) -> StoredDocument {
        StoredDocument {
            entity: self.entity.clone(),
            id: self.entity_id.clone(),
        }
    }
}

/// One index partition / 单个索引分区
#[derive(Debug)]
pub struct IndexPartition {
    id: PartitionId,
    path: PathBuf,
    db: Pool<Sqlite>,
}

impl IndexPartition {
    /// Open (creating if needed) the partition database inside `dir` / 打开分区数据库
    pub async fn open(dir: &Path, id: PartitionId, settings: &PartitionSettings) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(id.file_name());

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(settings.busy_timeout_ms));

        let db = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await
            .map_err(|source| SearchError::OpenPartition {
                partition: id.clone(),
                source,
            })?;

        let partition = Self { id, path, db };
        partition.init().await?;

        tracing::debug!("Index partition opened: {:?} (WAL mode)", partition.path);
        Ok(partition)
    }

    pub fn id(&self) -> &PartitionId {
        &self.id
    }

    /// Create tables if they do not exist / 初始化表结构
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search_docs (
                doc INTEGER PRIMARY KEY,
                entity TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                UNIQUE(entity, entity_id)
            )
            "#,
        )
        .execute(&self.db)
        .await
        .map_err(SearchError::Index)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search_terms (
                term TEXT NOT NULL,
                doc INTEGER NOT NULL,
                tf INTEGER NOT NULL,
                PRIMARY KEY(term, doc)
            ) WITHOUT ROWID
            "#,
        )
        .execute(&self.db)
        .await
        .map_err(SearchError::Index)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_terms_doc ON search_terms(doc)")
            .execute(&self.db)
            .await
            .map_err(SearchError::Index)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await
        .map_err(SearchError::Index)?;

        Ok(())
    }

    /// Add or replace documents, retrying while the database is locked / 批量写入（带重试）
    pub async fn add_documents(&self, docs: &[IndexDocument]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }

        let mut attempt = 0;
        loop {
            match self.do_add_documents(docs).await {
                Ok(()) => return Ok(()),
                Err(e) if is_busy(&e) => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES {
                        return Err(SearchError::RetriesExhausted {
                            partition: self.id.clone(),
                            attempts: attempt,
                            source: e,
                        });
                    }
                    let delay = 100 * u64::from(attempt);
                    tracing::debug!(
                        "Partition {} locked, retrying in {}ms (attempt {}/{})",
                        self.id,
                        delay,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(SearchError::Index(e)),
            }
        }
    }

    async fn do_add_documents(&self, docs: &[IndexDocument]) -> Result<(), sqlx::Error> {
        let mut tx = self.db.begin().await?;

        for doc in docs {
            Self::remove_in_tx(&mut tx, &doc.entity, &doc.id).await?;

            let result = sqlx::query("INSERT INTO search_docs (entity, entity_id) VALUES (?, ?)")
                .bind(&doc.entity)
                .bind(&doc.id)
                .execute(&mut *tx)
                .await?;
            let doc_num = result.last_insert_rowid();

            let mut freqs: HashMap<String, i64> = HashMap::new();
            for token in tokenize(&doc.text) {
                *freqs.entry(token).or_default() += 1;
            }

            for (term, tf) in freqs {
                sqlx::query("INSERT INTO search_terms (term, doc, tf) VALUES (?, ?, ?)")
                    .bind(term)
                    .bind(doc_num)
                    .bind(tf)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn remove_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        entity: &str,
        entity_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT doc FROM search_docs WHERE entity = ? AND entity_id = ?")
                .bind(entity)
                .bind(entity_id)
                .fetch_optional(&mut **tx)
                .await?;

        let Some((doc,)) = existing else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM search_terms WHERE doc = ?")
            .bind(doc)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM search_docs WHERE doc = ?")
            .bind(doc)
            .execute(&mut **tx)
            .await?;
        Ok(true)
    }

    /// Remove one document, returns whether it existed / 删除文档
    pub async fn delete_document(&self, entity: &str, entity_id: &str) -> Result<bool> {
        let mut tx = self.db.begin().await.map_err(SearchError::Index)?;
        let removed = Self::remove_in_tx(&mut tx, entity, entity_id)
            .await
            .map_err(SearchError::Index)?;
        tx.commit().await.map_err(SearchError::Index)?;
        Ok(removed)
    }

    /// Remove every document of an entity / 删除实体的全部文档
    pub async fn delete_entity(&self, entity: &str) -> Result<u64> {
        let mut tx = self.db.begin().await.map_err(SearchError::Index)?;
        sqlx::query(
            "DELETE FROM search_terms WHERE doc IN (SELECT doc FROM search_docs WHERE entity = ?)",
        )
        .bind(entity)
        .execute(&mut *tx)
        .await
        .map_err(SearchError::Index)?;
        let result = sqlx::query("DELETE FROM search_docs WHERE entity = ?")
            .bind(entity)
            .execute(&mut *tx)
            .await
            .map_err(SearchError::Index)?;
        tx.commit().await.map_err(SearchError::Index)?;
        Ok(result.rows_affected())
    }

    pub async fn doc_count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM search_docs")
            .fetch_one(&self.db)
            .await
            .map_err(SearchError::Index)?;
        Ok(count as u64)
    }

    /// Postings of one term / 词项倒排
    pub async fn term_postings(&self, term: &str) -> Result<Vec<Posting>> {
        sqlx::query_as(
            r#"
            SELECT t.term, t.doc, t.tf, d.entity, d.entity_id
            FROM search_terms t JOIN search_docs d ON d.doc = t.doc
            WHERE t.term = ?
            ORDER BY t.doc
            "#,
        )
        .bind(term)
        .fetch_all(&self.db)
        .await
        .map_err(SearchError::Index)
    }

    /// Postings of every term starting with `prefix` / 前缀倒排
    pub async fn prefix_postings(&self, prefix: &str) -> Result<Vec<Posting>> {
        let pattern = format!("{}%", escape_like(prefix));
        sqlx::query_as(
            r#"
            SELECT t.term, t.doc, t.tf, d.entity, d.entity_id
            FROM search_terms t JOIN search_docs d ON d.doc = t.doc
            WHERE t.term LIKE ? ESCAPE '\'
            ORDER BY t.term, t.doc
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.db)
        .await
        .map_err(SearchError::Index)
    }

    /// Every document with its stored fields
    pub async fn all_docs(&self) -> Result<Vec<(i64, StoredDocument)>> {
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT doc, entity, entity_id FROM search_docs ORDER BY doc")
                .fetch_all(&self.db)
                .await
                .map_err(SearchError::Index)?;
        Ok(rows
            .into_iter()
            .map(|(doc, entity, id)| (doc, StoredDocument { entity, id }))
            .collect())
    }

    /// Set index last updated time / 设置索引更新时间
    pub async fn set_last_updated(&self) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT OR REPLACE INTO search_meta (key, value) VALUES ('last_updated', ?)")
            .bind(now.to_string())
            .execute(&self.db)
            .await
            .map_err(SearchError::Index)?;
        Ok(())
    }

    /// Get index last updated time / 获取索引更新时间
    pub async fn last_updated(&self) -> Option<i64> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT value FROM search_meta WHERE key = 'last_updated'")
                .fetch_optional(&self.db)
                .await
                .ok()
                .flatten();

        result.and_then(|(v,)| v.parse::<i64>().ok())
    }

    /// 获取统计信息
    pub async fn stats(&self) -> Result<IndexStats> {
        let document_count = self.doc_count().await?;
        let (terms,): (i64,) = sqlx::query_as("SELECT COUNT(DISTINCT term) FROM search_terms")
            .fetch_one(&self.db)
            .await
            .map_err(SearchError::Index)?;

        Ok(IndexStats {
            document_count,
            term_count: terms as u64,
            last_updated: self.last_updated().await,
        })
    }

    /// 关闭数据库连接池 / Close database connection pool
    pub async fn close(&self) {
        self.db.close().await;
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
