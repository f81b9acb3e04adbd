use async_trait::async_trait;
use biblio_model::{AuthorRef, Book, BookId, DataSource, GenreId, LibraryId, SeriesRef, TagId};
use sqlx::PgPool;
use sqlx::Row;

use crate::error::{LibraryError, Result};
use crate::store::{BookRepository, Tx};

#[derive(Clone, Debug)]
pub struct PostgresBookRepository {
    pool: PgPool,
}

impl PostgresBookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_authors(&self, book_id: BookId) -> Result<Vec<AuthorRef>> {
        let rows = sqlx::query(
            "SELECT person_id, role, sort_order FROM book_authors \
             WHERE book_id = $1 ORDER BY sort_order",
        )
        .bind(book_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LibraryError::Internal(format!("load authors: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| AuthorRef {
                person_id: row.get::<uuid::Uuid, _>("person_id").into(),
                role: row.get("role"),
                sort_order: row.get("sort_order"),
            })
            .collect())
    }

    async fn load_genres(&self, book_id: BookId) -> Result<Vec<GenreId>> {
        let rows = sqlx::query("SELECT genre_id FROM book_genres WHERE book_id = $1")
            .bind(book_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LibraryError::Internal(format!("load genres: {e}")))?;
        Ok(rows.into_iter().map(|row| row.get::<uuid::Uuid, _>("genre_id").into()).collect())
    }

    async fn load_tags(&self, book_id: BookId) -> Result<Vec<TagId>> {
        let rows = sqlx::query("SELECT tag_id FROM book_tags WHERE book_id = $1")
            .bind(book_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LibraryError::Internal(format!("load tags: {e}")))?;
        Ok(rows.into_iter().map(|row| row.get::<uuid::Uuid, _>("tag_id").into()).collect())
    }

    async fn load_series(&self, book_id: BookId) -> Result<Vec<SeriesRef>> {
        let rows = sqlx::query(
            "SELECT series_id, number, sort_order FROM book_series \
             WHERE book_id = $1 ORDER BY sort_order",
        )
        .bind(book_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LibraryError::Internal(format!("load series: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| SeriesRef {
                series_id: row.get::<uuid::Uuid, _>("series_id").into(),
                number: row.get("number"),
                sort_order: row.get("sort_order"),
            })
            .collect())
    }
}

fn source_str(source: DataSource) -> &'static str {
    source.as_str()
}

fn parse_source(raw: &str) -> DataSource {
    raw.parse().unwrap_or(DataSource::Filepath)
}

#[async_trait]
impl BookRepository for PostgresBookRepository {
    async fn find_by_path(&self, library_id: LibraryId, filepath: &str) -> Result<Option<Book>> {
        let row = sqlx::query(
            "SELECT id, title, title_source, sort_title, sort_title_source, subtitle, \
             subtitle_source, description, description_source, authors_source, genres_source, \
             tags_source, series_source \
             FROM books WHERE library_id = $1 AND filepath = $2",
        )
        .bind(library_id.as_uuid())
        .bind(filepath)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LibraryError::Internal(format!("find book by path: {e}")))?;

        let Some(row) = row else { return Ok(None) };
        let id: BookId = row.get::<uuid::Uuid, _>("id").into();

        Ok(Some(Book {
            id,
            library_id,
            filepath: filepath.to_string(),
            title: row.get("title"),
            title_source: parse_source(row.get("title_source")),
            sort_title: row.get("sort_title"),
            sort_title_source: parse_source(row.get("sort_title_source")),
            subtitle: row.get("subtitle"),
            subtitle_source: parse_source(row.get("subtitle_source")),
            description: row.get("description"),
            description_source: parse_source(row.get("description_source")),
            authors: self.load_authors(id).await?,
            authors_source: parse_source(row.get("authors_source")),
            genres: self.load_genres(id).await?,
            genres_source: parse_source(row.get("genres_source")),
            tags: self.load_tags(id).await?,
            tags_source: parse_source(row.get("tags_source")),
            series: self.load_series(id).await?,
            series_source: parse_source(row.get("series_source")),
        }))
    }

    async fn upsert(&self, tx: &mut Tx<'_>, book: &Book) -> Result<()> {
        sqlx::query(
            "INSERT INTO books (id, library_id, filepath, title, title_source, sort_title, \
             sort_title_source, subtitle, subtitle_source, description, description_source, \
             authors_source, genres_source, tags_source, series_source) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15) \
             ON CONFLICT (id) DO UPDATE SET \
               title = EXCLUDED.title, title_source = EXCLUDED.title_source, \
               sort_title = EXCLUDED.sort_title, sort_title_source = EXCLUDED.sort_title_source, \
               subtitle = EXCLUDED.subtitle, subtitle_source = EXCLUDED.subtitle_source, \
               description = EXCLUDED.description, description_source = EXCLUDED.description_source, \
               authors_source = EXCLUDED.authors_source, genres_source = EXCLUDED.genres_source, \
               tags_source = EXCLUDED.tags_source, series_source = EXCLUDED.series_source",
        )
        .bind(book.id.as_uuid())
        .bind(book.library_id.as_uuid())
        .bind(&book.filepath)
        .bind(&book.title)
        .bind(source_str(book.title_source))
        .bind(&book.sort_title)
        .bind(source_str(book.sort_title_source))
        .bind(&book.subtitle)
        .bind(source_str(book.subtitle_source))
        .bind(&book.description)
        .bind(source_str(book.description_source))
        .bind(source_str(book.authors_source))
        .bind(source_str(book.genres_source))
        .bind(source_str(book.tags_source))
        .bind(source_str(book.series_source))
        .execute(&mut **tx)
        .await
        .map_err(|e| LibraryError::Internal(format!("upsert book: {e}")))?;
        Ok(())
    }

    async fn delete(&self, tx: &mut Tx<'_>, book_id: BookId) -> Result<()> {
        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(book_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| LibraryError::Internal(format!("delete book: {e}")))?;
        Ok(())
    }

    async fn set_authors(&self, tx: &mut Tx<'_>, book_id: BookId, authors: &[AuthorRef]) -> Result<()> {
        sqlx::query("DELETE FROM book_authors WHERE book_id = $1")
            .bind(book_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| LibraryError::Internal(format!("clear authors: {e}")))?;

        for author in authors {
            sqlx::query(
                "INSERT INTO book_authors (book_id, person_id, role, sort_order) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(book_id.as_uuid())
            .bind(author.person_id.as_uuid())
            .bind(&author.role)
            .bind(author.sort_order)
            .execute(&mut **tx)
            .await
            .map_err(|e| LibraryError::Internal(format!("insert author: {e}")))?;
        }
        Ok(())
    }

    async fn set_genres(&self, tx: &mut Tx<'_>, book_id: BookId, genres: &[GenreId]) -> Result<()> {
        sqlx::query("DELETE FROM book_genres WHERE book_id = $1")
            .bind(book_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| LibraryError::Internal(format!("clear genres: {e}")))?;

        for genre_id in genres {
            sqlx::query("INSERT INTO book_genres (book_id, genre_id) VALUES ($1, $2)")
                .bind(book_id.as_uuid())
                .bind(genre_id.as_uuid())
                .execute(&mut **tx)
                .await
                .map_err(|e| LibraryError::Internal(format!("insert genre: {e}")))?;
        }
        Ok(())
    }

    async fn set_tags(&self, tx: &mut Tx<'_>, book_id: BookId, tags: &[TagId]) -> Result<()> {
        sqlx::query("DELETE FROM book_tags WHERE book_id = $1")
            .bind(book_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| LibraryError::Internal(format!("clear tags: {e}")))?;

        for tag_id in tags {
            sqlx::query("INSERT INTO book_tags (book_id, tag_id) VALUES ($1, $2)")
                .bind(book_id.as_uuid())
                .bind(tag_id.as_uuid())
                .execute(&mut **tx)
                .await
                .map_err(|e| LibraryError::Internal(format!("insert tag: {e}")))?;
        }
        Ok(())
    }

    async fn set_series(&self, tx: &mut Tx<'_>, book_id: BookId, series: &[SeriesRef]) -> Result<()> {
        sqlx::query("DELETE FROM book_series WHERE book_id = $1")
            .bind(book_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| LibraryError::Internal(format!("clear series: {e}")))?;

        for entry in series {
            sqlx::query(
                "INSERT INTO book_series (book_id, series_id, number, sort_order) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(book_id.as_uuid())
            .bind(entry.series_id.as_uuid())
            .bind(entry.number)
            .bind(entry.sort_order)
            .execute(&mut **tx)
            .await
            .map_err(|e| LibraryError::Internal(format!("insert series: {e}")))?;
        }
        Ok(())
    }

    async fn list_paths(&self, library_id: LibraryId) -> Result<Vec<(BookId, String)>> {
        let rows = sqlx::query("SELECT id, filepath FROM books WHERE library_id = $1")
            .bind(library_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LibraryError::Internal(format!("list book paths: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get::<uuid::Uuid, _>("id").into(), row.get("filepath")))
            .collect())
    }
}
