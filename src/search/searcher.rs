//! Query execution over a reader / 查询执行

use std::collections::HashSet;

use super::query::{Query, StoredFields};
use super::reader::IndexReader;
use super::schema::{DocAddress, ScoreDoc, StoredDocument, TopDocs};
use crate::error::{Result, SearchError};

pub struct IndexSearcher<'r> {
    reader: &'r IndexReader,
}

impl<'r> IndexSearcher<'r> {
    pub fn new(reader: &'r IndexReader) -> Self {
        Self { reader }
    }

    /// Run `query` on every partition and merge the hits / 执行查询并合并结果
    ///
    /// `total_hits` counts every match; `score_docs` holds at most `limit` of
    /// them, best first. A document replaced while the query runs can be seen
    /// under both its old and new number; only the better ranked hit is kept.
    pub async fn search(&self, query: &Query, limit: usize) -> Result<TopDocs> {
        let mut score_docs = Vec::new();

        for (index, partition) in self.reader.partitions().iter().enumerate() {
            let doc_count = partition.doc_count().await?;
            if doc_count == 0 {
                continue;
            }
            let mut stored = StoredFields::new();
            let scores = query.execute(partition, doc_count, &mut stored).await?;
            score_docs.extend(scores.into_iter().filter_map(|(doc, score)| {
                stored.remove(&doc).map(|fields| ScoreDoc {
                    address: DocAddress { partition: index, doc },
                    score,
                    stored: fields,
                })
            }));
        }

        score_docs.sort_by(|a, b| a.rank_cmp(b));
        let mut seen = HashSet::new();
        score_docs.retain(|hit| {
            seen.insert((hit.address.partition, hit.stored.entity.clone(), hit.stored.id.clone()))
        });
        let total_hits = score_docs.len();
        score_docs.truncate(limit);

        tracing::debug!(
            "Query matched {} documents across {} partitions",
            total_hits,
            self.reader.partitions().len()
        );
        Ok(TopDocs { total_hits, score_docs })
    }

    /// Stored fields of a hit / 读取命中文档
    ///
    /// The fields were read in the same statement as the hit's postings, so
    /// this keeps working when the index changes after the search.
    pub fn doc<'h>(&self, hit: &'h ScoreDoc) -> Result<&'h StoredDocument> {
        if hit.address.partition >= self.reader.partitions().len() {
            return Err(SearchError::DocumentNotFound(hit.address));
        }
        Ok(&hit.stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::partition::{IndexPartition, PartitionSettings};
    use crate::search::reader::ReaderProvider;
    use crate::search::schema::{IndexDocument, PartitionId};
    use crate::search::sharding::NotSharded;
    use crate::search::registry::SearchFactory;
    use std::sync::Arc;

    async fn seed(dir: &std::path::Path, partition: &str, docs: &[(&str, &str)]) {
        let p = IndexPartition::open(dir, PartitionId::new(partition), &PartitionSettings::default())
            .await
            .unwrap();
        let docs: Vec<_> = docs
            .iter()
            .map(|(id, text)| IndexDocument::new("article", *id, *text))
            .collect();
        p.add_documents(&docs).await.unwrap();
        p.close().await;
    }

    #[tokio::test]
    async fn test_merges_partitions_by_score() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), "a", &[("1", "rust"), ("2", "rust rust rust rust")]).await;
        seed(dir.path(), "b", &[("3", "rust rust"), ("4", "java")]).await;

        let provider = Arc::new(ReaderProvider::new(dir.path(), PartitionSettings::default()));
        let reader = provider
            .open_reader(&[PartitionId::new("a"), PartitionId::new("b")])
            .await
            .unwrap();
        let searcher = IndexSearcher::new(&reader);

        let top = searcher.search(&Query::term("rust"), usize::MAX).await.unwrap();
        assert_eq!(top.total_hits, 3);

        let ids: Vec<&str> = top
            .score_docs
            .iter()
            .map(|hit| searcher.doc(hit).unwrap().id.as_str())
            .collect();
        assert_eq!(ids, vec!["3", "2", "1"]);
    }

    #[tokio::test]
    async fn test_hits_stay_resolvable_after_reindex() {
        let dir = tempfile::tempdir().unwrap();
        let factory = SearchFactory::new(dir.path(), PartitionSettings::default());
        factory.register::<crate::models::Article>(NotSharded::new("article"));
        for id in ["1", "2", "3"] {
            factory
                .writer()
                .index_document(IndexDocument::new("article", id, "rust"))
                .await
                .unwrap();
        }

        let reader = factory
            .reader_provider()
            .open_reader(&[PartitionId::new("article")])
            .await
            .unwrap();
        let searcher = IndexSearcher::new(&reader);
        let top = searcher.search(&Query::term("rust"), usize::MAX).await.unwrap();

        // replaced under a new document number between search and resolve
        factory
            .writer()
            .index_document(IndexDocument::new("article", "1", "rust"))
            .await
            .unwrap();

        let mut ids: Vec<&str> = top
            .score_docs
            .iter()
            .map(|hit| searcher.doc(hit).unwrap().id.as_str())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_limit_keeps_total() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), "a", &[("1", "x"), ("2", "x"), ("3", "x")]).await;

        let provider = Arc::new(ReaderProvider::new(dir.path(), PartitionSettings::default()));
        let reader = provider.open_reader(&[PartitionId::new("a")]).await.unwrap();
        let searcher = IndexSearcher::new(&reader);

        let top = searcher.search(&Query::term("x"), 2).await.unwrap();
        assert_eq!(top.total_hits, 3);
        assert_eq!(top.score_docs.len(), 2);
    }

    #[tokio::test]
    async fn test_doc_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ReaderProvider::new(dir.path(), PartitionSettings::default()));
        let reader = provider.open_reader(&[PartitionId::new("a")]).await.unwrap();
        let searcher = IndexSearcher::new(&reader);

        let foreign = ScoreDoc {
            address: DocAddress { partition: 5, doc: 1 },
            score: 1.0,
            stored: StoredDocument {
                entity: "article".to_string(),
                id: "1".to_string(),
            },
        };
        assert!(matches!(
            searcher.doc(&foreign),
            Err(SearchError::DocumentNotFound(_))
        ));
    }
}
