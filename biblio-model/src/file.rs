use crate::data_source::DataSource;
use crate::entities::NarratorRef;
use crate::ids::{BookId, FileId, ImprintId, PublisherId};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Epub,
    Cbz,
    M4b,
    Supplement,
}

impl FileType {
    /// Dispatches on extension (case-insensitive). Returns `Supplement` for
    /// anything else that is not filtered out before reaching the scanner.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "epub" => FileType::Epub,
            "cbz" => FileType::Cbz,
            "m4b" => FileType::M4b,
            _ => FileType::Supplement,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierType {
    Isbn10,
    Isbn13,
    Asin,
    Doi,
    Other,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub file_id: FileId,
    pub identifier_type: IdentifierType,
    pub value: String,
    pub source: DataSource,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoverRef {
    pub path: String,
    pub mime: String,
    /// Origin page index within the archive, set for CBZ covers.
    pub source_page: Option<u32>,
}

/// A physical artifact belonging to exactly one `Book`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub id: FileId,
    pub book_id: BookId,
    pub path: String,
    pub file_type: FileType,
    pub size: u64,

    pub page_count: Option<i32>,
    pub duration_ms: Option<i64>,
    pub bitrate_kbps: Option<i32>,

    pub cover: Option<CoverRef>,

    pub name: Option<String>,
    pub name_source: DataSource,
    pub url: Option<String>,
    pub url_source: DataSource,
    pub publisher_id: Option<PublisherId>,
    pub publisher_source: DataSource,
    pub imprint_id: Option<ImprintId>,
    pub imprint_source: DataSource,
    pub release_date: Option<chrono_date::Date>,
    pub release_date_source: DataSource,

    pub narrators: Vec<NarratorRef>,
    pub narrators_source: DataSource,
}

impl File {
    pub fn new(book_id: BookId, path: String, file_type: FileType, size: u64) -> Self {
        Self {
            id: FileId::new(),
            book_id,
            path,
            file_type,
            size,
            page_count: None,
            duration_ms: None,
            bitrate_kbps: None,
            cover: None,
            name: None,
            name_source: DataSource::Filepath,
            url: None,
            url_source: DataSource::Filepath,
            publisher_id: None,
            publisher_source: DataSource::Filepath,
            imprint_id: None,
            imprint_source: DataSource::Filepath,
            release_date: None,
            release_date_source: DataSource::Filepath,
            narrators: Vec::new(),
            narrators_source: DataSource::Filepath,
        }
    }
}

/// Thin re-export so the model crate does not force a hard `chrono`
/// dependency on consumers that only want the non-serde shape; with the
/// `chrono` feature on, `Date` is `chrono::NaiveDate`.
#[cfg(feature = "chrono")]
pub mod chrono_date {
    pub type Date = chrono::NaiveDate;
}

#[cfg(not(feature = "chrono"))]
pub mod chrono_date {
    /// ISO-8601 `YYYY-MM-DD`, used when the `chrono` feature is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub struct Date {
        pub year: i32,
        pub month: u8,
        pub day: u8,
    }
}
