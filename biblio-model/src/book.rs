use crate::data_source::DataSource;
use crate::entities::{AuthorRef, SeriesRef};
use crate::ids::{BookId, GenreId, LibraryId, TagId};

/// A logical work in a library. Carries one `DataSource` tag per editable
/// scalar and per relationship class.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: BookId,
    pub library_id: LibraryId,
    pub filepath: String,

    pub title: String,
    pub title_source: DataSource,
    pub sort_title: String,
    pub sort_title_source: DataSource,
    pub subtitle: Option<String>,
    pub subtitle_source: DataSource,
    pub description: Option<String>,
    pub description_source: DataSource,

    pub authors: Vec<AuthorRef>,
    pub authors_source: DataSource,
    pub genres: Vec<GenreId>,
    pub genres_source: DataSource,
    pub tags: Vec<TagId>,
    pub tags_source: DataSource,
    pub series: Vec<SeriesRef>,
    pub series_source: DataSource,
}

impl Book {
    pub fn new(library_id: LibraryId, filepath: String, title: String, title_source: DataSource) -> Self {
        let sort_title = derive_sort_title(&title);
        Self {
            id: BookId::new(),
            library_id,
            filepath,
            title,
            title_source,
            sort_title,
            sort_title_source: title_source,
            subtitle: None,
            subtitle_source: DataSource::Filepath,
            description: None,
            description_source: DataSource::Filepath,
            authors: Vec::new(),
            authors_source: DataSource::Filepath,
            genres: Vec::new(),
            genres_source: DataSource::Filepath,
            tags: Vec::new(),
            tags_source: DataSource::Filepath,
            series: Vec::new(),
            series_source: DataSource::Filepath,
        }
    }
}

/// Strips a leading English definite/indefinite article for sort purposes.
/// Used as the default `sort_title` unless the user overrides it.
pub fn derive_sort_title(title: &str) -> String {
    let trimmed = title.trim();
    for article in ["The ", "A ", "An "] {
        if let Some(rest) = trimmed.strip_prefix(article) {
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_articles() {
        assert_eq!(derive_sort_title("The Hobbit"), "Hobbit");
        assert_eq!(derive_sort_title("A Study in Scarlet"), "Study in Scarlet");
        assert_eq!(derive_sort_title("An Unexpected Journey"), "Unexpected Journey");
        assert_eq!(derive_sort_title("Dune"), "Dune");
    }
}
