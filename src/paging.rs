//! Paginated full-text search resolved to persisted entities / 分页搜索
//!
//! [`Paginator::list`] runs a prebuilt query over every index partition of an
//! entity type, cuts a page window out of the ranked hits and loads each hit
//! from the database by primary key. Hits that do not resolve are skipped and
//! logged; the page keeps the relevance order of the hits that do.
//!
//! Window policy: an offset past the total number of hits starts over at the
//! first hit instead of producing an empty page.

use serde::Serialize;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;

use crate::db::Session;
use crate::error::Result;
use crate::models::Entity;
use crate::search::query::Query;
use crate::search::registry::SearchFactory;
use crate::search::searcher::IndexSearcher;

/// 1-based page number + page size / 页码请求
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl PageRequest {
    pub fn new(page: usize, size: usize) -> Self {
        Self { page, size }
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The row behind the index entry no longer exists
    StaleReference,
    /// The stored identifier is not an integer key
    MalformedIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedHit {
    pub id: String,
    pub reason: SkipReason,
}

/// One page of resolved entities / 分页结果
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matches before paging
    pub total_hits: usize,
    /// Offset actually used, after the out-of-range reset
    pub offset: usize,
    pub skipped: Vec<SkippedHit>,
}

/// Offset actually used for `total` hits / 实际偏移量
pub fn effective_offset(from: usize, total: usize) -> usize {
    if from > total {
        0
    } else {
        from
    }
}

/// Hit positions covered by a page / 分页窗口
pub fn page_window(from: usize, max_results: usize, total: usize) -> Range<usize> {
    let start = effective_offset(from, total);
    start..start.saturating_add(max_results).min(total)
}

/// Paginating resolver for one entity type / 分页解析器
pub struct Paginator<T> {
    factory: Arc<SearchFactory>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Paginator<T> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Paginator<T> {
    pub fn new(factory: Arc<SearchFactory>) -> Self {
        Self {
            factory,
            _entity: PhantomData,
        }
    }

    /// Search and resolve one page / 搜索并加载一页
    ///
    /// Never fails: if the search itself cannot run, the error is logged and
    /// an empty list is returned, so callers cannot tell "no matches" from
    /// "search failed". Use [`Paginator::try_list`] to tell them apart.
    pub async fn list(
        &self,
        session: &Session,
        query: &Query,
        from: usize,
        max_results: usize,
    ) -> Vec<T> {
        match self.try_list(session, query, from, max_results).await {
            Ok(page) => page.items,
            Err(e) => {
                tracing::error!("Unable to query search index for {}: {}", T::NAME, e);
                Vec::new()
            }
        }
    }

    /// [`Paginator::list`] addressed by page number
    pub async fn page(&self, session: &Session, query: &Query, request: PageRequest) -> Vec<T> {
        self.list(session, query, request.offset(), request.size).await
    }

    /// Search and resolve one page, reporting failures / 搜索并加载一页（返回错误）
    pub async fn try_list(
        &self,
        session: &Session,
        query: &Query,
        from: usize,
        max_results: usize,
    ) -> Result<Page<T>> {
        let partitions = self.factory.targeted_partitions::<T>()?;
        // Released when dropped, on every way out of this function
        let reader = self.factory.reader_provider().open_reader(&partitions).await?;
        let searcher = IndexSearcher::new(&reader);

        let top = searcher.search(query, usize::MAX).await?;
        let window = page_window(from, max_results, top.total_hits);
        let available = top.score_docs.len();
        let window = window.start.min(available)..window.end.min(available);

        let mut page = Page {
            items: Vec::with_capacity(window.len()),
            total_hits: top.total_hits,
            offset: window.start,
            skipped: Vec::new(),
        };

        for hit in &top.score_docs[window] {
            let stored = searcher.doc(hit)?;

            let id = match stored.id.parse::<i64>() {
                Ok(id) => id,
                Err(e) => {
                    tracing::error!("Malformed object id {:?} in search index: {}", stored.id, e);
                    page.skipped.push(SkippedHit {
                        id: stored.id.clone(),
                        reason: SkipReason::MalformedIdentifier,
                    });
                    continue;
                }
            };

            match session.get::<T>(id).await? {
                Some(entity) => page.items.push(entity),
                None => {
                    tracing::warn!(
                        "Object {} {} not found in database, search index probably needs reindexing.",
                        T::NAME,
                        id
                    );
                    page.skipped.push(SkippedHit {
                        id: stored.id.clone(),
                        reason: SkipReason::StaleReference,
                    });
                }
            }
        }

        tracing::debug!(
            "{} page at offset {}: {} of {} hits resolved",
            T::NAME,
            page.offset,
            page.items.len(),
            page.total_hits
        );
        Ok(page)
    }
}
