use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::PersistenceError;
use crate::models::{Article, CreateArticleRequest, Entity};

/// Open the main database pool / 打开主数据库连接池
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations / 运行数据库迁移
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS articles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert an article row and return it / 插入文章
pub async fn insert_article(pool: &SqlitePool, req: &CreateArticleRequest) -> Result<Article> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query("INSERT INTO articles (title, body, created_at) VALUES (?, ?, ?)")
        .bind(&req.title)
        .bind(&req.body)
        .bind(&now)
        .execute(pool)
        .await?;

    Ok(Article {
        id: result.last_insert_rowid(),
        title: req.title.clone(),
        body: req.body.clone(),
        created_at: now,
    })
}

/// Delete an article row, leaving its index entry untouched / 删除文章（不更新索引）
pub async fn delete_article(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM articles WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Persistence session / 持久化会话
///
/// Owned by the caller. Search operations borrow it for primary-key lookups and
/// never close it.
#[derive(Debug, Clone)]
pub struct Session {
    pool: SqlitePool,
}

impl Session {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Load an entity by primary key, `None` when the row does not exist
    pub async fn get<T: Entity>(&self, id: i64) -> Result<Option<T>, PersistenceError> {
        let sql = format!("SELECT * FROM {} WHERE {} = ?", T::TABLE, T::ID_COLUMN);
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Keyset page through a table in primary key order / 按主键分批读取
    pub async fn batch_after<T: Entity>(
        &self,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<T>, PersistenceError> {
        let sql = format!(
            "SELECT * FROM {table} WHERE {id} > ? ORDER BY {id} LIMIT ?",
            table = T::TABLE,
            id = T::ID_COLUMN
        );
        let rows = sqlx::query_as::<_, T>(&sql)
            .bind(after_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool(dir: &tempfile::TempDir) -> SqlitePool {
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("main.db").to_string_lossy());
        let pool = connect(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn article(title: &str) -> CreateArticleRequest {
        CreateArticleRequest {
            title: title.to_string(),
            body: "body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_get_existing_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir).await;
        let inserted = insert_article(&pool, &article("first")).await.unwrap();

        let session = Session::new(pool);
        let found: Option<Article> = session.get(inserted.id).await.unwrap();
        assert_eq!(found, Some(inserted.clone()));

        let missing: Option<Article> = session.get(inserted.id + 100).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_batch_after_walks_in_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir).await;
        for i in 0..5 {
            insert_article(&pool, &article(&format!("a{}", i))).await.unwrap();
        }
        let session = Session::new(pool);

        let first: Vec<Article> = session.batch_after(0, 2).await.unwrap();
        assert_eq!(first.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1, 2]);

        let rest: Vec<Article> = session.batch_after(2, 10).await.unwrap();
        assert_eq!(rest.iter().map(|a| a.id).collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_delete_article() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir).await;
        let a = insert_article(&pool, &article("gone")).await.unwrap();

        assert!(delete_article(&pool, a.id).await.unwrap());
        assert!(!delete_article(&pool, a.id).await.unwrap());
    }
}
