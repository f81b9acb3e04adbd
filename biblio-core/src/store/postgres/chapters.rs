use async_trait::async_trait;
use biblio_model::{Chapter, ChapterId, FileId};
use sqlx::{PgPool, Row};

use crate::error::{LibraryError, Result};
use crate::store::{ChapterRepository, Tx};

#[derive(Clone, Debug)]
pub struct PostgresChapterRepository {
    pool: PgPool,
}

impl PostgresChapterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChapterRepository for PostgresChapterRepository {
    async fn has_chapters(&self, file_id: FileId) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chapters WHERE file_id = $1")
            .bind(file_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| LibraryError::Internal(format!("count chapters: {e}")))?;
        Ok(row.get::<i64, _>("n") > 0)
    }

    /// Chapters are never reconciled once present (see the open question on
    /// this), so the caller only invokes this for a file's first-ever
    /// chapter tree. Still written as a full delete+insert for symmetry with
    /// the relationship tables and to keep `parent_id` wiring simple: every
    /// row is inserted once its parent already has an id.
    async fn replace_tree(&self, tx: &mut Tx<'_>, file_id: FileId, chapters: &[Chapter]) -> Result<()> {
        sqlx::query("DELETE FROM chapters WHERE file_id = $1")
            .bind(file_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| LibraryError::Internal(format!("clear chapters: {e}")))?;

        // Parents must already exist in `chapters` before children referencing
        // them can be inserted (self-referencing FK), so insert top-down.
        let mut remaining: Vec<&Chapter> = chapters.iter().collect();
        let mut inserted: std::collections::HashSet<ChapterId> = std::collections::HashSet::new();

        while !remaining.is_empty() {
            let mut progressed = false;
            let mut next_remaining = Vec::new();

            for chapter in remaining {
                let ready = match chapter.parent_id {
                    None => true,
                    Some(parent_id) => inserted.contains(&parent_id),
                };
                if !ready {
                    next_remaining.push(chapter);
                    continue;
                }

                sqlx::query(
                    "INSERT INTO chapters (id, file_id, parent_id, title, sort_order, \
                     start_page, start_timestamp_ms, href) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
                )
                .bind(chapter.id.as_uuid())
                .bind(file_id.as_uuid())
                .bind(chapter.parent_id.map(|id| id.as_uuid()))
                .bind(&chapter.title)
                .bind(chapter.sort_order)
                .bind(chapter.start_page)
                .bind(chapter.start_timestamp_ms)
                .bind(&chapter.href)
                .execute(&mut **tx)
                .await
                .map_err(|e| LibraryError::Internal(format!("insert chapter: {e}")))?;

                inserted.insert(chapter.id);
                progressed = true;
            }

            if !progressed {
                return Err(LibraryError::InvalidMetadata(
                    "chapter tree has a parent_id cycle or a dangling parent reference".into(),
                ));
            }
            remaining = next_remaining;
        }

        Ok(())
    }
}
