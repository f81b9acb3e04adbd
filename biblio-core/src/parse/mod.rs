//! Format parsers. Each takes a path and produces a `ParsedMetadata` record
//! or an error; parse failures are handled by the caller (the scanner logs
//! and skips the file — see `crate::scan::scanner`).

mod cbz;
mod epub;
mod m4b;

use std::path::Path;

use biblio_model::{DataSource, FileType};

use crate::error::{LibraryError, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedAuthor {
    pub name: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSeries {
    pub name: String,
    pub number: Option<f64>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIdentifier {
    pub identifier_type: biblio_model::IdentifierType,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCover {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub source_page: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedChapter {
    pub title: String,
    pub sort_order: i32,
    pub start_page: Option<i32>,
    pub start_timestamp_ms: Option<i64>,
    pub href: Option<String>,
    pub children: Vec<ParsedChapter>,
}

/// Everything a container parser can extract, before sidecars or the
/// reconciler see it. Every populated field is tagged with the same
/// `source` — the parser doesn't get to mix priorities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMetadata {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub authors: Vec<ParsedAuthor>,
    pub narrators: Vec<String>,
    pub series: Vec<ParsedSeries>,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    pub publisher: Option<String>,
    pub imprint: Option<String>,
    pub url: Option<String>,
    pub release_date: Option<chrono::NaiveDate>,
    pub identifiers: Vec<ParsedIdentifier>,
    pub cover: Option<ParsedCover>,
    pub duration_ms: Option<i64>,
    pub bitrate_kbps: Option<i32>,
    pub page_count: Option<i32>,
    pub chapters: Vec<ParsedChapter>,
    pub source: DataSource,
}

impl ParsedMetadata {
    fn with_source(source: DataSource) -> Self {
        Self { source, ..Default::default() }
    }
}

/// Dispatches on `file_type` to the matching container parser. `Supplement`
/// files never reach the scanner's parse step (filtered out earlier by the
/// driver's extension allow-list) and have no parser here.
pub async fn parse(path: &Path, file_type: FileType) -> Result<ParsedMetadata> {
    match file_type {
        FileType::Epub => epub::parse(path).await,
        FileType::Cbz => cbz::parse(path).await,
        FileType::M4b => m4b::parse(path).await,
        FileType::Supplement => Err(LibraryError::InvalidMetadata(format!(
            "no parser for supplement file {}",
            path.display()
        ))),
    }
}
