//! Repository traits the scanner, driver, and job controller depend on.
//! `postgres` provides the only implementation shipped here; a host
//! application is free to substitute another backend behind these traits.

pub mod postgres;

use async_trait::async_trait;
use biblio_model::{
    AuthorRef, Book, BookId, Chapter, File, FileId, GenreId, Identifier, IdentifierType, Imprint,
    Job, JobId, JobStatus, LibraryId, NarratorRef, Publisher, SeriesRef, TagId,
};

use crate::error::Result;

/// The per-file scanner opens one of these and drives every book/file/
/// relationship write for a file through it, so observers only ever see the
/// pre- or post-scan state of that file (never a mixture).
pub type Tx<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Read-only; runs against the pool directly, outside any transaction.
    async fn find_by_path(&self, library_id: LibraryId, filepath: &str) -> Result<Option<Book>>;
    async fn upsert(&self, tx: &mut Tx<'_>, book: &Book) -> Result<()>;
    async fn delete(&self, tx: &mut Tx<'_>, book_id: BookId) -> Result<()>;
    async fn set_authors(&self, tx: &mut Tx<'_>, book_id: BookId, authors: &[AuthorRef]) -> Result<()>;
    async fn set_genres(&self, tx: &mut Tx<'_>, book_id: BookId, genres: &[GenreId]) -> Result<()>;
    async fn set_tags(&self, tx: &mut Tx<'_>, book_id: BookId, tags: &[TagId]) -> Result<()>;
    async fn set_series(&self, tx: &mut Tx<'_>, book_id: BookId, series: &[SeriesRef]) -> Result<()>;
    /// Every book path in `library_id` still present in the database, for
    /// the driver's post-scan orphan sweep.
    async fn list_paths(&self, library_id: LibraryId) -> Result<Vec<(BookId, String)>>;
}

#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn find_by_path(&self, path: &str) -> Result<Option<File>>;
    async fn upsert(&self, tx: &mut Tx<'_>, file: &File) -> Result<()>;
    async fn delete(&self, tx: &mut Tx<'_>, file_id: FileId) -> Result<()>;
    async fn count_for_book(&self, book_id: BookId) -> Result<u64>;
    async fn set_narrators(&self, tx: &mut Tx<'_>, file_id: FileId, narrators: &[NarratorRef]) -> Result<()>;
    async fn set_identifiers(&self, tx: &mut Tx<'_>, file_id: FileId, identifiers: &[Identifier]) -> Result<()>;
    async fn list_identifiers(&self, file_id: FileId) -> Result<Vec<Identifier>>;
    async fn list_paths_for_book(&self, book_id: BookId) -> Result<Vec<(FileId, String)>>;
}

#[async_trait]
pub trait ChapterRepository: Send + Sync {
    async fn has_chapters(&self, file_id: FileId) -> Result<bool>;
    async fn replace_tree(&self, tx: &mut Tx<'_>, file_id: FileId, chapters: &[Chapter]) -> Result<()>;
}

#[async_trait]
pub trait IdentifierLookup: Send + Sync {
    async fn find(&self, file_id: FileId, identifier_type: IdentifierType) -> Result<Option<Identifier>>;
}

/// Aggregates the find-or-create entity repositories the scan-time
/// `ScanCache` dispatches to — one implementor, four trait objects.
pub trait EntityRepository:
    crate::cache::PersonFinder
    + crate::cache::GenreFinder
    + crate::cache::TagFinder
    + crate::cache::SeriesFinder
    + Send
    + Sync
{
}

#[async_trait]
pub trait PublisherRepository: Send + Sync {
    async fn find_or_create(&self, name: &str, library_id: LibraryId) -> Result<Publisher>;
}

#[async_trait]
pub trait ImprintRepository: Send + Sync {
    async fn find_or_create(&self, name: &str, library_id: LibraryId) -> Result<Imprint>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn has_active_scan(&self, library_id: Option<LibraryId>) -> Result<bool>;
    async fn enqueue_scan(&self, library_id: Option<LibraryId>) -> Result<Job>;
    async fn claim_oldest_pending_scan(&self, process_id: &str) -> Result<Option<Job>>;
    async fn set_progress(&self, job_id: JobId, percent: u8) -> Result<()>;
    async fn complete(&self, job_id: JobId, status: JobStatus, data: serde_json::Value) -> Result<()>;
    async fn request_cancel(&self, job_id: JobId) -> Result<()>;
    async fn is_cancel_requested(&self, job_id: JobId) -> Result<bool>;
}
