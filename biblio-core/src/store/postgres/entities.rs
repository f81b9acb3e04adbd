use async_trait::async_trait;
use biblio_model::{Genre, LibraryId, Person, Series, Tag};
use sqlx::PgPool;

use crate::cache::{GenreFinder, PersonFinder, SeriesFinder, TagFinder};
use crate::error::{LibraryError, Result};

/// Find-or-create for the four cached named-entity kinds, plus publishers
/// and imprints (uncached — see `crate::cache`'s doc comment on why).
#[derive(Clone, Debug)]
pub struct PostgresEntityRepository {
    pool: PgPool,
}

impl PostgresEntityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Every cached entity kind shares the same upsert shape: insert, and on a
/// case-insensitive name collision within the library, return the existing
/// row instead of erroring.
macro_rules! find_or_create_named {
    ($fn_name:ident, $table:literal, $out:ty) => {
        async fn $fn_name(pool: &PgPool, name: &str, library_id: LibraryId) -> Result<$out> {
            let row = sqlx::query_as::<_, $out>(concat!(
                "INSERT INTO ",
                $table,
                " (id, library_id, name) VALUES ($1, $2, $3) ",
                "ON CONFLICT (library_id, lower(name)) DO UPDATE SET name = ",
                $table,
                ".name ",
                "RETURNING id, library_id, name"
            ))
            .bind(uuid::Uuid::now_v7())
            .bind(library_id.as_uuid())
            .bind(name)
            .fetch_one(pool)
            .await
            .map_err(|e| LibraryError::Internal(format!("find_or_create in {}: {e}", $table)))?;
            Ok(row)
        }
    };
}

find_or_create_named!(find_or_create_person, "persons", Person);
find_or_create_named!(find_or_create_genre, "genres", Genre);
find_or_create_named!(find_or_create_tag, "tags", Tag);
find_or_create_named!(find_or_create_series, "series", Series);

#[async_trait]
impl PersonFinder for PostgresEntityRepository {
    async fn find_or_create(&self, name: &str, library_id: LibraryId) -> Result<Person> {
        find_or_create_person(&self.pool, name, library_id).await
    }
}

#[async_trait]
impl GenreFinder for PostgresEntityRepository {
    async fn find_or_create(&self, name: &str, library_id: LibraryId) -> Result<Genre> {
        find_or_create_genre(&self.pool, name, library_id).await
    }
}

#[async_trait]
impl TagFinder for PostgresEntityRepository {
    async fn find_or_create(&self, name: &str, library_id: LibraryId) -> Result<Tag> {
        find_or_create_tag(&self.pool, name, library_id).await
    }
}

#[async_trait]
impl SeriesFinder for PostgresEntityRepository {
    async fn find_or_create(&self, name: &str, library_id: LibraryId) -> Result<Series> {
        find_or_create_series(&self.pool, name, library_id).await
    }
}

#[async_trait]
impl crate::store::PublisherRepository for PostgresEntityRepository {
    async fn find_or_create(&self, name: &str, library_id: LibraryId) -> Result<biblio_model::Publisher> {
        find_or_create_named!(inner, "publishers", biblio_model::Publisher);
        inner(&self.pool, name, library_id).await
    }
}

#[async_trait]
impl crate::store::ImprintRepository for PostgresEntityRepository {
    async fn find_or_create(&self, name: &str, library_id: LibraryId) -> Result<biblio_model::Imprint> {
        find_or_create_named!(inner, "imprints", biblio_model::Imprint);
        inner(&self.pool, name, library_id).await
    }
}

impl crate::store::EntityRepository for PostgresEntityRepository {}
