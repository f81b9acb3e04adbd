//! Sidecar I/O: versioned metadata documents stored next to originals, read
//! at priority `sidecar` and written on any mutation.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

const BOOK_SIDECAR_NAME: &str = "book.biblio.json";
const BOOK_SIDECAR_VERSION: u32 = 1;
const FILE_SIDECAR_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SidecarAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SidecarSeries {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<f64>,
    pub sort_order: i32,
}

/// One per Book directory.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BookSidecar {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<SidecarAuthor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<SidecarSeries>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl BookSidecar {
    pub fn new() -> Self {
        Self {
            version: BOOK_SIDECAR_VERSION,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SidecarNarrator {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SidecarIdentifier {
    #[serde(rename = "type")]
    pub identifier_type: String,
    pub value: String,
}

/// One per File.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FileSidecar {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub narrators: Vec<SidecarNarrator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imprint: Option<String>,
    /// ISO-8601 `YYYY-MM-DD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<SidecarIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl FileSidecar {
    pub fn new() -> Self {
        Self {
            version: FILE_SIDECAR_VERSION,
            ..Default::default()
        }
    }
}

fn file_sidecar_path(file_path: &Path) -> PathBuf {
    file_path.with_extension(match file_path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.biblio.json"),
        None => "biblio.json".to_string(),
    })
}

/// Reads the book sidecar in `book_dir`. A missing sidecar is not an error —
/// it returns `None`, same as a sidecar that fails to parse (logged at
/// `warn`, then treated as absent).
pub fn read_book_sidecar(book_dir: &Path) -> Option<BookSidecar> {
    read_sidecar(&book_dir.join(BOOK_SIDECAR_NAME))
}

pub fn read_file_sidecar(file_path: &Path) -> Option<FileSidecar> {
    read_sidecar(&file_sidecar_path(file_path))
}

fn read_sidecar<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read sidecar, treating as missing");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed sidecar, treating as missing");
            None
        }
    }
}

pub fn write_book_sidecar(book_dir: &Path, sidecar: &BookSidecar) -> Result<()> {
    write_atomic(&book_dir.join(BOOK_SIDECAR_NAME), sidecar)
}

pub fn write_file_sidecar(file_path: &Path, sidecar: &FileSidecar) -> Result<()> {
    write_atomic(&file_sidecar_path(file_path), sidecar)
}

/// Write-to-temp-then-rename so a concurrent scan never observes a torn
/// file.
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_sidecar_returns_none_not_error() {
        let dir = tempdir().unwrap();
        assert!(read_book_sidecar(dir.path()).is_none());
    }

    #[test]
    fn malformed_sidecar_is_treated_as_missing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(BOOK_SIDECAR_NAME), b"{ not json").unwrap();
        assert!(read_book_sidecar(dir.path()).is_none());
    }

    #[test]
    fn round_trips_book_sidecar() {
        let dir = tempdir().unwrap();
        let mut sidecar = BookSidecar::new();
        sidecar.title = Some("Dune".into());
        sidecar.authors.push(SidecarAuthor {
            name: "Frank Herbert".into(),
            role: None,
        });
        write_book_sidecar(dir.path(), &sidecar).unwrap();

        let read_back = read_book_sidecar(dir.path()).unwrap();
        assert_eq!(read_back, sidecar);
    }

    #[test]
    fn file_sidecar_path_is_next_to_original() {
        let path = PathBuf::from("/library/Dune/Dune.epub");
        assert_eq!(
            file_sidecar_path(&path),
            PathBuf::from("/library/Dune/Dune.epub.biblio.json")
        );
    }
}
