use async_trait::async_trait;
use biblio_model::{
    BookId, CoverRef, DataSource, File, FileId, FileType, Identifier, IdentifierType, NarratorRef,
};
use sqlx::{PgPool, Row};

use crate::error::{LibraryError, Result};
use crate::store::{FileRepository, Tx};

#[derive(Clone, Debug)]
pub struct PostgresFileRepository {
    pool: PgPool,
}

impl PostgresFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_narrators(&self, file_id: FileId) -> Result<Vec<NarratorRef>> {
        let rows = sqlx::query(
            "SELECT person_id, sort_order FROM file_narrators \
             WHERE file_id = $1 ORDER BY sort_order",
        )
        .bind(file_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LibraryError::Internal(format!("load narrators: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| NarratorRef {
                person_id: row.get::<uuid::Uuid, _>("person_id").into(),
                sort_order: row.get("sort_order"),
            })
            .collect())
    }

    async fn load_identifiers(&self, file_id: FileId) -> Result<Vec<Identifier>> {
        let rows = sqlx::query("SELECT identifier_type, value, source FROM identifiers WHERE file_id = $1")
            .bind(file_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LibraryError::Internal(format!("load identifiers: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| Identifier {
                file_id,
                identifier_type: parse_identifier_type(row.get("identifier_type")),
                value: row.get("value"),
                source: parse_source(row.get("source")),
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

fn identifier_type_str(identifier_type: IdentifierType) -> &'static str {
    match identifier_type {
        IdentifierType::Isbn10 => "isbn10",
        IdentifierType::Isbn13 => "isbn13",
        IdentifierType::Asin => "asin",
        IdentifierType::Doi => "doi",
        IdentifierType::Other => "other",
    }
}

fn parse_identifier_type(raw: &str) -> IdentifierType {
    match raw {
        "isbn10" => IdentifierType::Isbn10,
        "isbn13" => IdentifierType::Isbn13,
        "asin" => IdentifierType::Asin,
        "doi" => IdentifierType::Doi,
        _ => IdentifierType::Other,
    }
}

fn file_type_str(file_type: FileType) -> &'static str {
    match file_type {
        FileType::Epub => "epub",
        FileType::Cbz => "cbz",
        FileType::M4b => "m4b",
        FileType::Supplement => "supplement",
    }
}

fn parse_file_type(raw: &str) -> FileType {
    match raw {
        "epub" => FileType::Epub,
        "cbz" => FileType::Cbz,
        "m4b" => FileType::M4b,
        _ => FileType::Supplement,
    }
}

#[async_trait]
impl FileRepository for PostgresFileRepository {
    async fn find_by_path(&self, path: &str) -> Result<Option<File>> {
        let row = sqlx::query(
            "SELECT id, book_id, file_type, size, page_count, duration_ms, bitrate_kbps, \
             cover_path, cover_mime, cover_source_page, name, name_source, url, url_source, \
             publisher_id, publisher_source, imprint_id, imprint_source, release_date, \
             release_date_source, narrators_source \
             FROM files WHERE path = $1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LibraryError::Internal(format!("find file by path: {e}")))?;

        let Some(row) = row else { return Ok(None) };
        let id: FileId = row.get::<uuid::Uuid, _>("id").into();

        let cover_path: Option<String> = row.get("cover_path");
        let cover = cover_path.map(|path| CoverRef {
            path,
            mime: row.get("cover_mime"),
            source_page: row.get::<Option<i32>, _>("cover_source_page").map(|p| p as u32),
        });

        Ok(Some(File {
            id,
            book_id: row.get::<uuid::Uuid, _>("book_id").into(),
            path: path.to_string(),
            file_type: parse_file_type(row.get("file_type")),
            size: row.get::<i64, _>("size") as u64,
            page_count: row.get("page_count"),
            duration_ms: row.get("duration_ms"),
            bitrate_kbps: row.get("bitrate_kbps"),
            cover,
            name: row.get("name"),
            name_source: parse_source(row.get("name_source")),
            url: row.get("url"),
            url_source: parse_source(row.get("url_source")),
            publisher_id: row.get::<Option<uuid::Uuid>, _>("publisher_id").map(Into::into),
            publisher_source: parse_source(row.get("publisher_source")),
            imprint_id: row.get::<Option<uuid::Uuid>, _>("imprint_id").map(Into::into),
            imprint_source: parse_source(row.get("imprint_source")),
            release_date: row.get("release_date"),
            release_date_source: parse_source(row.get("release_date_source")),
            narrators: self.load_narrators(id).await?,
            narrators_source: parse_source(row.get("narrators_source")),
        }))
    }

    async fn upsert(&self, tx: &mut Tx<'_>, file: &File) -> Result<()> {
        let cover_source_page = file.cover.as_ref().and_then(|c| c.source_page).map(|p| p as i32);
        sqlx::query(
            "INSERT INTO files (id, book_id, path, file_type, size, page_count, duration_ms, \
             bitrate_kbps, cover_path, cover_mime, cover_source_page, name, name_source, url, \
             url_source, publisher_id, publisher_source, imprint_id, imprint_source, \
             release_date, release_date_source, narrators_source) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22) \
             ON CONFLICT (id) DO UPDATE SET \
               file_type = EXCLUDED.file_type, size = EXCLUDED.size, \
               page_count = EXCLUDED.page_count, duration_ms = EXCLUDED.duration_ms, \
               bitrate_kbps = EXCLUDED.bitrate_kbps, cover_path = EXCLUDED.cover_path, \
               cover_mime = EXCLUDED.cover_mime, cover_source_page = EXCLUDED.cover_source_page, \
               name = EXCLUDED.name, name_source = EXCLUDED.name_source, url = EXCLUDED.url, \
               url_source = EXCLUDED.url_source, publisher_id = EXCLUDED.publisher_id, \
               publisher_source = EXCLUDED.publisher_source, imprint_id = EXCLUDED.imprint_id, \
               imprint_source = EXCLUDED.imprint_source, release_date = EXCLUDED.release_date, \
               release_date_source = EXCLUDED.release_date_source, \
               narrators_source = EXCLUDED.narrators_source",
        )
        .bind(file.id.as_uuid())
        .bind(file.book_id.as_uuid())
        .bind(&file.path)
        .bind(file_type_str(file.file_type))
        .bind(file.size as i64)
        .bind(file.page_count)
        .bind(file.duration_ms)
        .bind(file.bitrate_kbps)
        .bind(file.cover.as_ref().map(|c| c.path.as_str()))
        .bind(file.cover.as_ref().map(|c| c.mime.as_str()))
        .bind(cover_source_page)
        .bind(&file.name)
        .bind(source_str(file.name_source))
        .bind(&file.url)
        .bind(source_str(file.url_source))
        .bind(file.publisher_id.map(|id| id.as_uuid()))
        .bind(source_str(file.publisher_source))
        .bind(file.imprint_id.map(|id| id.as_uuid()))
        .bind(source_str(file.imprint_source))
        .bind(file.release_date)
        .bind(source_str(file.release_date_source))
        .bind(source_str(file.narrators_source))
        .execute(&mut **tx)
        .await
        .map_err(|e| LibraryError::Internal(format!("upsert file: {e}")))?;
        Ok(())
    }

    async fn delete(&self, tx: &mut Tx<'_>, file_id: FileId) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(file_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| LibraryError::Internal(format!("delete file: {e}")))?;
        Ok(())
    }

    async fn count_for_book(&self, book_id: BookId) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM files WHERE book_id = $1")
            .bind(book_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| LibraryError::Internal(format!("count files for book: {e}")))?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    async fn set_narrators(&self, tx: &mut Tx<'_>, file_id: FileId, narrators: &[NarratorRef]) -> Result<()> {
        sqlx::query("DELETE FROM file_narrators WHERE file_id = $1")
            .bind(file_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| LibraryError::Internal(format!("clear narrators: {e}")))?;

        for narrator in narrators {
            sqlx::query(
                "INSERT INTO file_narrators (file_id, person_id, sort_order) VALUES ($1, $2, $3)",
            )
            .bind(file_id.as_uuid())
            .bind(narrator.person_id.as_uuid())
            .bind(narrator.sort_order)
            .execute(&mut **tx)
            .await
            .map_err(|e| LibraryError::Internal(format!("insert narrator: {e}")))?;
        }
        Ok(())
    }

    async fn set_identifiers(&self, tx: &mut Tx<'_>, file_id: FileId, identifiers: &[Identifier]) -> Result<()> {
        sqlx::query("DELETE FROM identifiers WHERE file_id = $1")
            .bind(file_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| LibraryError::Internal(format!("clear identifiers: {e}")))?;

        for identifier in identifiers {
            sqlx::query(
                "INSERT INTO identifiers (file_id, identifier_type, value, source) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(file_id.as_uuid())
            .bind(identifier_type_str(identifier.identifier_type))
            .bind(&identifier.value)
            .bind(source_str(identifier.source))
            .execute(&mut **tx)
            .await
            .map_err(|e| LibraryError::Internal(format!("insert identifier: {e}")))?;
        }
        Ok(())
    }

    async fn list_identifiers(&self, file_id: FileId) -> Result<Vec<Identifier>> {
        self.load_identifiers(file_id).await
    }

    async fn list_paths_for_book(&self, book_id: BookId) -> Result<Vec<(FileId, String)>> {
        let rows = sqlx::query("SELECT id, path FROM files WHERE book_id = $1")
            .bind(book_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LibraryError::Internal(format!("list file paths: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get::<uuid::Uuid, _>("id").into(), row.get("path")))
            .collect())
    }
}
