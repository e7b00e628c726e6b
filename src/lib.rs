pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod paging;
pub mod search;

pub use error::{PersistenceError, Result, SearchError};
pub use models::Entity;
pub use paging::{Page, PageRequest, Paginator, SkipReason, SkippedHit};
