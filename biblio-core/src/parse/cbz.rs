//! CBZ parsing: the archive's image entries give the page count and cover;
//! an optional `ComicInfo.xml` sidecar inside the archive supplies the rest.
//! `ComicInfo.xml` is small and flat, read with `quick-xml`'s event reader
//! rather than building a DOM for it.

use std::io::Read;
use std::path::Path;

use biblio_model::DataSource;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{LibraryError, Result};
use crate::parse::{ParsedChapter, ParsedCover, ParsedMetadata};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

fn io_err(path: &Path, e: impl std::fmt::Display) -> LibraryError {
    LibraryError::InvalidMetadata(format!("{}: {e}", path.display()))
}

pub async fn parse(path: &Path) -> Result<ParsedMetadata> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || parse_blocking(&path))
        .await
        .map_err(|e| LibraryError::Internal(format!("cbz parse task panicked: {e}")))?
}

fn is_image_name(name: &str) -> bool {
    name.rsplit('.')
        .next()
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn guess_mime(name: &str) -> String {
    match name.rsplit('.').next().unwrap_or("").to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
    .to_string()
}

fn parse_blocking(path: &Path) -> Result<ParsedMetadata> {
    let file = std::fs::File::open(path).map_err(|e| io_err(path, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| io_err(path, e))?;

    let mut pages: Vec<String> = (0..zip.len())
        .filter_map(|i| zip.by_index(i).ok().map(|e| e.name().to_string()))
        .filter(|name| is_image_name(name))
        .collect();
    pages.sort();

    let mut meta = ParsedMetadata::with_source(DataSource::CbzMetadata);
    meta.page_count = Some(pages.len() as i32);

    if let Some(first_page) = pages.first() {
        if let Ok(mut entry) = zip.by_name(first_page) {
            let mut bytes = Vec::new();
            if entry.read_to_end(&mut bytes).is_ok() {
                meta.cover = Some(ParsedCover { bytes, mime: guess_mime(first_page), source_page: Some(0) });
            }
        }
    }

    meta.chapters = pages
        .iter()
        .enumerate()
        .map(|(i, _)| ParsedChapter {
            title: format!("Page {}", i + 1),
            sort_order: i as i32,
            start_page: Some(i as i32),
            ..Default::default()
        })
        .collect();

    let comic_info_name = (0..zip.len())
        .filter_map(|i| zip.by_index(i).ok().map(|e| e.name().to_string()))
        .find(|name| name.eq_ignore_ascii_case("ComicInfo.xml"));

    if let Some(name) = comic_info_name {
        if let Ok(mut entry) = zip.by_name(&name) {
            let mut xml = String::new();
            if entry.read_to_string(&mut xml).is_ok() {
                apply_comic_info(&xml, &mut meta);
            }
        }
    }

    Ok(meta)
}

fn apply_comic_info(xml: &str, meta: &mut ParsedMetadata) {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current_tag = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                current_tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map(|s| s.trim().to_string()).unwrap_or_default();
                if text.is_empty() {
                    continue;
                }
                match current_tag.as_str() {
                    "Title" if meta.title.is_none() => meta.title = Some(text),
                    "Summary" => meta.description = Some(text),
                    "Publisher" => meta.publisher = Some(text),
                    "Imprint" => meta.imprint = Some(text),
                    "Writer" => meta.authors.push(crate::parse::ParsedAuthor { name: text, role: Some("writer".into()) }),
                    "Genre" => meta.genres.extend(text.split(',').map(|g| g.trim().to_string())),
                    "Web" => meta.url = Some(text),
                    "Series" => meta.series.push(crate::parse::ParsedSeries { name: text, number: None, sort_order: 0 }),
                    "Number" => {
                        if let Some(last) = meta.series.last_mut() {
                            last.number = text.parse().ok();
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
}
