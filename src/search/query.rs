//! Prebuilt search queries / 查询表达式
//!
//! A [`Query`] is built by the caller and handed to the searcher as is; the
//! paging layer never looks inside it.

use futures::future::BoxFuture;
use std::collections::HashMap;

use super::partition::{IndexPartition, Posting};
use super::schema::StoredDocument;
use super::tokenizer::{normalize_term, tokenize};
use crate::error::Result;

/// Per-document scores inside one partition
pub type Scores = HashMap<i64, f32>;

/// Stored fields of every document seen while scoring, read with its postings
pub type StoredFields = HashMap<i64, StoredDocument>;

/// Weight of a prefix match relative to an exact term / 前缀匹配权重
const PREFIX_BOOST: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Exact (normalized) term
    Term(String),
    /// Any term starting with the given text
    Prefix(String),
    /// Free text, analyzed; any resulting term may match
    Text(String),
    Boolean {
        must: Vec<Query>,
        should: Vec<Query>,
        must_not: Vec<Query>,
    },
    /// Every document in the index
    All,
}

impl Query {
    pub fn term(term: impl AsRef<str>) -> Self {
        Query::Term(normalize_term(term.as_ref()))
    }

    pub fn prefix(prefix: impl AsRef<str>) -> Self {
        Query::Prefix(normalize_term(prefix.as_ref()))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Query::Text(text.into())
    }

    pub fn boolean() -> Self {
        Query::Boolean {
            must: Vec::new(),
            should: Vec::new(),
            must_not: Vec::new(),
        }
    }

    pub fn must(mut self, query: Query) -> Self {
        if let Query::Boolean { must, .. } = &mut self {
            must.push(query);
        }
        self
    }

    pub fn should(mut self, query: Query) -> Self {
        if let Query::Boolean { should, .. } = &mut self {
            should.push(query);
        }
        self
    }

    pub fn must_not(mut self, query: Query) -> Self {
        if let Query::Boolean { must_not, .. } = &mut self {
            must_not.push(query);
        }
        self
    }

    /// Parse a query string / 解析查询字符串
    ///
    /// Whitespace separated clauses: `+word` must match, `-word` must not match,
    /// `wor*` is a prefix, anything else is optional free text. `*` alone
    /// matches every document.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input == "*" {
            return Query::All;
        }

        let mut query = Query::boolean();
        for clause in input.split_whitespace() {
            let (kind, body) = match clause.chars().next() {
                Some('+') => ('+', &clause[1..]),
                Some('-') => ('-', &clause[1..]),
                _ => (' ', clause),
            };
            if body.is_empty() {
                continue;
            }

            let sub = match body.strip_suffix('*') {
                Some(prefix) if !prefix.is_empty() => Query::prefix(prefix),
                Some(_) => continue,
                None => Query::text(body),
            };

            query = match kind {
                '+' => query.must(sub),
                '-' => query.must_not(sub),
                _ => query.should(sub),
            };
        }
        query
    }

    /// Score every matching document of one partition / 在单个分区上执行
    ///
    /// `doc_count` is the partition size, used for idf. The stored fields of
    /// every scored document are added to `stored`.
    pub(crate) fn execute<'a>(
        &'a self,
        partition: &'a IndexPartition,
        doc_count: u64,
        stored: &'a mut StoredFields,
    ) -> BoxFuture<'a, Result<Scores>> {
        Box::pin(async move {
            match self {
                Query::Term(term) => term_scores(partition, term, doc_count, stored).await,
                Query::Prefix(prefix) => {
                    let rows = partition.prefix_postings(prefix).await?;
                    let mut by_term: HashMap<&str, Vec<&Posting>> = HashMap::new();
                    for posting in &rows {
                        by_term.entry(posting.term.as_str()).or_default().push(posting);
                    }

                    let mut scores = Scores::new();
                    for postings in by_term.values() {
                        let idf = idf(doc_count, postings.len() as u64);
                        for posting in postings {
                            *scores.entry(posting.doc).or_default() +=
                                PREFIX_BOOST * tf_weight(posting.tf) * idf;
                        }
                    }
                    for posting in &rows {
                        stored.entry(posting.doc).or_insert_with(|| posting.stored());
                    }
                    Ok(scores)
                }
                Query::Text(text) => {
                    let mut scores = Scores::new();
                    let mut terms = tokenize(text);
                    terms.sort();
                    terms.dedup();
                    for term in terms {
                        for (doc, score) in term_scores(partition, &term, doc_count, &mut *stored).await? {
                            *scores.entry(doc).or_default() += score;
                        }
                    }
                    Ok(scores)
                }
                Query::Boolean { must, should, must_not } => {
                    let mut required: Option<Scores> = None;
                    for clause in must {
                        let clause_scores = clause.execute(partition, doc_count, &mut *stored).await?;
                        required = Some(match required {
                            None => clause_scores,
                            Some(acc) => acc
                                .into_iter()
                                .filter_map(|(doc, score)| {
                                    clause_scores.get(&doc).map(|s| (doc, score + s))
                                })
                                .collect(),
                        });
                    }

                    let mut optional = Scores::new();
                    for clause in should {
                        for (doc, score) in clause.execute(partition, doc_count, &mut *stored).await? {
                            *optional.entry(doc).or_default() += score;
                        }
                    }

                    let mut scores = match required {
                        Some(mut acc) => {
                            for (doc, score) in acc.iter_mut() {
                                if let Some(extra) = optional.get(doc) {
                                    *score += extra;
                                }
                            }
                            acc
                        }
                        None => optional,
                    };

                    for clause in must_not {
                        if scores.is_empty() {
                            break;
                        }
                        for doc in clause.execute(partition, doc_count, &mut *stored).await?.keys() {
                            scores.remove(doc);
                        }
                    }
                    Ok(scores)
                }
                Query::All => {
                    let mut scores = Scores::new();
                    for (doc, fields) in partition.all_docs().await? {
                        scores.insert(doc, 1.0);
                        stored.entry(doc).or_insert(fields);
                    }
                    Ok(scores)
                }
            }
        })
    }
}

async fn term_scores(
    partition: &IndexPartition,
    term: &str,
    doc_count: u64,
    stored: &mut StoredFields,
) -> Result<Scores> {
    let postings = partition.term_postings(term).await?;
    let idf = idf(doc_count, postings.len() as u64);
    let mut scores = Scores::with_capacity(postings.len());
    for posting in postings {
        scores.insert(posting.doc, tf_weight(posting.tf) * idf);
        stored.entry(posting.doc).or_insert_with(|| posting.stored());
    }
    Ok(scores)
}

fn tf_weight(tf: i64) -> f32 {
    (tf.max(0) as f32).sqrt()
}

/// BM25 style idf, always positive
fn idf(doc_count: u64, doc_freq: u64) -> f32 {
    let n = doc_count as f32;
    let df = doc_freq as f32;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}
