//! Library-scoped normalized entities: persons, genres, tags, series,
//! publishers, imprints. Each is unique within a library by case-insensitive
//! name.

use crate::ids::{GenreId, ImprintId, LibraryId, PersonId, PublisherId, SeriesId, TagId};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub id: PersonId,
    pub library_id: LibraryId,
    pub name: String,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genre {
    pub id: GenreId,
    pub library_id: LibraryId,
    pub name: String,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: TagId,
    pub library_id: LibraryId,
    pub name: String,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Series {
    pub id: SeriesId,
    pub library_id: LibraryId,
    pub name: String,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publisher {
    pub id: PublisherId,
    pub library_id: LibraryId,
    pub name: String,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Imprint {
    pub id: ImprintId,
    pub library_id: LibraryId,
    pub name: String,
}

/// One of the four kinds the scan-time entity cache deduplicates
/// find-or-create calls for. Publishers, imprints, and identifiers are
/// deliberately excluded — they rarely repeat across books.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedEntityKind {
    Person,
    Genre,
    Tag,
    Series,
}

/// An author association: who, what role, and where in the ordered list.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorRef {
    pub person_id: PersonId,
    pub role: Option<String>,
    pub sort_order: i32,
}

/// A narrator association (file-scoped, ordered, no role).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarratorRef {
    pub person_id: PersonId,
    pub sort_order: i32,
}

/// A series association carrying an optional position in the series.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRef {
    pub series_id: SeriesId,
    pub number: Option<f64>,
    pub sort_order: i32,
}
