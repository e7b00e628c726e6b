use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;

/// A persisted domain type that can be indexed and resolved by primary key / 可索引的持久化实体
///
/// The entity type is always passed explicitly as a type parameter; nothing is
/// discovered at runtime.
pub trait Entity: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static {
    /// Name used to bind the entity to its index partitions
    const NAME: &'static str;
    /// Table holding the rows
    const TABLE: &'static str;
    /// Integer primary key column
    const ID_COLUMN: &'static str = "id";

    fn id(&self) -> i64;

    /// Text fed to the analyzer when the entity is indexed
    fn indexed_text(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub created_at: String,
}

impl Entity for Article {
    const NAME: &'static str = "article";
    const TABLE: &'static str = "articles";

    fn id(&self) -> i64 {
        self.id
    }

    fn indexed_text(&self) -> String {
        format!("{} {}", self.title, self.body)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateArticleRequest {
    pub title: String,
    pub body: String,
}
