pub mod accounts_repo;
pub mod mappings_repo;
pub mod migrations;
pub mod pool;
pub mod posts_repo;
pub mod store;

use thiserror::Error;

pub use accounts_repo::{AccountRecord, list_enabled_accounts};
pub use mappings_repo::{
    MappingsOverview, fetch_mappings_overview, find_mapping, insert_mapping, list_mappings_for_post,
};
pub use migrations::run_migrations;
pub use pool::{DbPool, DbPoolError, connect_lazy};
pub use posts_repo::{find_post, list_syncable_posts};
pub use store::PgStore;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("invalid stored value in {column}: {value}")]
    InvalidValue { column: &'static str, value: String },
}
