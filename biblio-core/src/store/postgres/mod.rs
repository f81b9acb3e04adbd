//! Postgres-backed implementation of the repository traits in
//! `crate::store`. Each submodule owns one aggregate's queries, mirroring
//! the one-repository-per-aggregate layout the rest of this codebase uses
//! for its postgres repositories.

mod books;
mod chapters;
mod entities;
mod files;
mod jobs;

pub use books::PostgresBookRepository;
pub use chapters::PostgresChapterRepository;
pub use entities::PostgresEntityRepository;
pub use files::PostgresFileRepository;
pub use jobs::PostgresJobRepository;

use sqlx::PgPool;

use crate::error::{LibraryError, Result};
use crate::store::Tx;

/// Cheap to clone (wraps a pooled connection handle); construct once per
/// process and hand clones to each repository.
#[derive(Clone, Debug)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn books(&self) -> PostgresBookRepository {
        PostgresBookRepository::new(self.pool.clone())
    }

    pub fn files(&self) -> PostgresFileRepository {
        PostgresFileRepository::new(self.pool.clone())
    }

    pub fn chapters(&self) -> PostgresChapterRepository {
        PostgresChapterRepository::new(self.pool.clone())
    }

    pub fn entities(&self) -> PostgresEntityRepository {
        PostgresEntityRepository::new(self.pool.clone())
    }

    pub fn jobs(&self) -> PostgresJobRepository {
        PostgresJobRepository::new(self.pool.clone())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Opens the transaction the per-file scanner drives every book/file/
    /// relationship write for one file through.
    pub async fn begin(&self) -> Result<Tx<'_>> {
        self.pool
            .begin()
            .await
            .map_err(|e| LibraryError::Internal(format!("begin transaction: {e}")))
    }
}
