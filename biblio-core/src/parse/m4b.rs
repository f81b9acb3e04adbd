//! M4B parsing via `mp4ameta`'s atom reader. Audiobook M4Bs follow the
//! convention also used by most audiobook management tools: album == book
//! title, artist == author, composer == narrator, embedded chapter atoms
//! give the (flat, one-level) chapter list with millisecond offsets.

use std::path::Path;
use std::time::Duration;

use biblio_model::DataSource;

use crate::error::{LibraryError, Result};
use crate::parse::{ParsedAuthor, ParsedChapter, ParsedCover, ParsedMetadata};

pub async fn parse(path: &Path) -> Result<ParsedMetadata> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || parse_blocking(&path))
        .await
        .map_err(|e| LibraryError::Internal(format!("m4b parse task panicked: {e}")))?
}

fn parse_blocking(path: &Path) -> Result<ParsedMetadata> {
    let tag = mp4ameta::Tag::read_from_path(path)
        .map_err(|e| LibraryError::InvalidMetadata(format!("{}: {e}", path.display())))?;

    let mut meta = ParsedMetadata::with_source(DataSource::M4bMetadata);

    meta.title = tag.album().map(str::to_string).or_else(|| tag.title().map(str::to_string));
    if let Some(artist) = tag.artist() {
        meta.authors.push(ParsedAuthor { name: artist.to_string(), role: None });
    }
    if let Some(narrator) = tag.composer() {
        meta.narrators.push(narrator.to_string());
    }
    meta.genres = tag.genres().map(str::to_string).collect();
    meta.description = tag.comment().map(str::to_string);
    meta.publisher = None;

    if let Some(year) = tag.year() {
        meta.release_date = year
            .get(..4)
            .and_then(|y| y.parse::<i32>().ok())
            .and_then(|y| chrono::NaiveDate::from_ymd_opt(y, 1, 1));
    }

    let duration = tag.duration();
    meta.duration_ms = duration.map(|d: Duration| d.as_millis() as i64);

    if let (Some(duration), Ok(file_meta)) = (duration, std::fs::metadata(path)) {
        let seconds = duration.as_secs_f64();
        if seconds > 0.0 {
            let bits = file_meta.len() as f64 * 8.0;
            meta.bitrate_kbps = Some((bits / seconds / 1000.0).round() as i32);
        }
    }

    if let Some(artwork) = tag.artwork() {
        let mime = match artwork.fmt {
            mp4ameta::ImgFmt::Png => "image/png",
            mp4ameta::ImgFmt::Bmp => "image/bmp",
            _ => "image/jpeg",
        };
        meta.cover = Some(ParsedCover { bytes: artwork.data.to_vec(), mime: mime.to_string(), source_page: None });
    }

    let mut chapters: Vec<ParsedChapter> = tag
        .chapters()
        .enumerate()
        .map(|(i, chapter)| ParsedChapter {
            title: chapter.title.clone(),
            sort_order: i as i32,
            start_timestamp_ms: Some(chapter.start.as_millis() as i64),
            ..Default::default()
        })
        .collect();
    chapters.sort_by_key(|c| c.start_timestamp_ms);
    meta.chapters = chapters;

    Ok(meta)
}
