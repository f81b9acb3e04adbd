//! Deterministic artifact identity. A `Fingerprint` is derived from the
//! current Book + File state; its stable-encoded hash is the content
//! address under which a generated artifact (e.g. a KePub conversion) is
//! cached on disk.

use biblio_model::{Book, File};
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuthorFp {
    pub name: String,
    pub role: Option<String>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NarratorFp {
    pub name: String,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SeriesFp {
    pub name: String,
    pub number: Option<f64>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IdentifierFp {
    #[serde(rename = "type")]
    pub identifier_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CoverFp {
    pub sha256: String,
    pub mime: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChapterFp {
    pub title: String,
    pub sort_order: i32,
    pub start_page: Option<i32>,
    pub start_timestamp_ms: Option<i64>,
    pub href: Option<String>,
    pub children: Vec<ChapterFp>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ArtifactFormat {
    Epub,
    Cbz,
    M4b,
    Kepub,
}

impl ArtifactFormat {
    pub const fn as_dir_name(self) -> &'static str {
        match self {
            ArtifactFormat::Epub => "epub",
            ArtifactFormat::Cbz => "cbz",
            ArtifactFormat::M4b => "m4b",
            ArtifactFormat::Kepub => "kepub",
        }
    }

    pub const fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Epub => "epub",
            ArtifactFormat::Cbz => "cbz",
            ArtifactFormat::M4b => "m4b",
            ArtifactFormat::Kepub => "kepub",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Fingerprint {
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub authors: Vec<AuthorFp>,
    pub narrators: Vec<NarratorFp>,
    pub series: Vec<SeriesFp>,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    pub identifiers: Vec<IdentifierFp>,
    pub url: Option<String>,
    pub publisher: Option<String>,
    pub imprint: Option<String>,
    pub release_date: Option<String>,
    pub name: Option<String>,
    pub cover: Option<CoverFp>,
    pub format: ArtifactFormat,
    pub chapters: Vec<ChapterFp>,
}

impl Fingerprint {
    /// Serializes the document with a stable encoding (struct field order
    /// plus pre-sorted lists — see `FingerprintInputs::build`) and returns
    /// the lowercase hex SHA-256 digest used as the cache key.
    pub fn hash(&self) -> String {
        let bytes = serde_json::to_vec(self).expect("Fingerprint serialization cannot fail");
        let digest = Sha256::digest(&bytes);
        format!("{digest:x}")
    }
}

/// Everything needed to build a `Fingerprint` besides the target format.
/// Kept separate from `Book`/`File` so resolving names (person/genre/tag ids
/// to display strings) happens once, outside the hot fingerprinting path.
pub struct FingerprintInputs<'a> {
    pub book: &'a Book,
    pub author_names: Vec<(String, Option<String>, i32)>,
    pub narrator_names: Vec<(String, i32)>,
    pub series_names: Vec<(String, Option<f64>, i32)>,
    pub genre_names: Vec<String>,
    pub tag_names: Vec<String>,
    pub file: &'a File,
    pub publisher_name: Option<String>,
    pub imprint_name: Option<String>,
    pub identifiers: Vec<IdentifierFp>,
    pub cover: Option<CoverFp>,
    pub chapters: Vec<ChapterFp>,
}

impl<'a> FingerprintInputs<'a> {
    /// Orders the user-visible lists by `sort_order` and alphabetizes
    /// genres/tags, then assembles the `Fingerprint`.
    pub fn build(self, format: ArtifactFormat) -> Fingerprint {
        let mut authors = self.author_names;
        authors.sort_by_key(|(_, _, order)| *order);
        let mut narrators = self.narrator_names;
        narrators.sort_by_key(|(_, order)| *order);
        let mut series = self.series_names;
        series.sort_by_key(|(_, _, order)| *order);
        let mut genres = self.genre_names;
        genres.sort();
        let mut tags = self.tag_names;
        tags.sort();
        let mut chapters = self.chapters;
        chapters.sort_by_key(|c| c.sort_order);
        for chapter in &mut chapters {
            chapter.children.sort_by_key(|c| c.sort_order);
        }


        Fingerprint {
            title: self.book.title.clone(),
            subtitle: self.book.subtitle.clone(),
            description: self.book.description.clone(),
            authors: authors
                .into_iter()
                .map(|(name, role, sort_order)| AuthorFp { name, role, sort_order })
                .collect(),
            narrators: narrators
                .into_iter()
                .map(|(name, sort_order)| NarratorFp { name, sort_order })
                .collect(),
            series: series
                .into_iter()
                .map(|(name, number, sort_order)| SeriesFp { name, number, sort_order })
                .collect(),
            genres,
            tags,
            identifiers: self.identifiers,
            url: self.file.url.clone(),
            publisher: self.publisher_name,
            imprint: self.imprint_name,
            release_date: self.file.release_date.map(|d| d.to_string()),
            name: self.file.name.clone(),
            cover: self.cover,
            format,
            chapters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biblio_model::{Book, DataSource, File, FileType};

    fn sample_book() -> Book {
        Book::new(
            biblio_model::LibraryId::new(),
            "/lib/dune".into(),
            "Dune".into(),
            DataSource::EpubMetadata,
        )
    }

    fn sample_file(book_id: biblio_model::BookId) -> File {
        File::new(book_id, "/lib/dune/dune.epub".into(), FileType::Epub, 1024)
    }

    #[test]
    fn equal_up_to_relationship_order_hashes_identically() {
        let book = sample_book();
        let file = sample_file(book.id);

        let inputs_a = FingerprintInputs {
            book: &book,
            author_names: vec![("A".into(), None, 0), ("B".into(), None, 1)],
            narrator_names: vec![],
            series_names: vec![],
            genre_names: vec!["Sci-Fi".into(), "Adventure".into()],
            tag_names: vec![],
            file: &file,
            publisher_name: None,
            imprint_name: None,
            identifiers: vec![],
            cover: None,
            chapters: vec![],
        };
        let fp_a = inputs_a.build(ArtifactFormat::Epub);

        // Different *input* order, same sort_order/alphabetical outcome.
        let inputs_b = FingerprintInputs {
            book: &book,
            author_names: vec![("B".into(), None, 1), ("A".into(), None, 0)],
            narrator_names: vec![],
            series_names: vec![],
            genre_names: vec!["Adventure".into(), "Sci-Fi".into()],
            tag_names: vec![],
            file: &file,
            publisher_name: None,
            imprint_name: None,
            identifiers: vec![],
            cover: None,
            chapters: vec![],
        };
        let fp_b = inputs_b.build(ArtifactFormat::Epub);

        assert_eq!(fp_a.hash(), fp_b.hash());
    }

    #[test]
    fn different_content_hashes_differently() {
        let book = sample_book();
        let file = sample_file(book.id);
        let base = FingerprintInputs {
            book: &book,
            author_names: vec![],
            narrator_names: vec![],
            series_names: vec![],
            genre_names: vec![],
            tag_names: vec![],
            file: &file,
            publisher_name: None,
            imprint_name: None,
            identifiers: vec![],
            cover: None,
            chapters: vec![],
        };
        let fp_a = base.build(ArtifactFormat::Epub);

        let mut book_b = book.clone();
        book_b.title = "Dune Messiah".into();
        let base_b = FingerprintInputs {
            book: &book_b,
            author_names: vec![],
            narrator_names: vec![],
            series_names: vec![],
            genre_names: vec![],
            tag_names: vec![],
            file: &file,
            publisher_name: None,
            imprint_name: None,
            identifiers: vec![],
            cover: None,
            chapters: vec![],
        };
        let fp_b = base_b.build(ArtifactFormat::Epub);

        assert_ne!(fp_a.hash(), fp_b.hash());
    }
}
