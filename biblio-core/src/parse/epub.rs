//! EPUB container parsing: `META-INF/container.xml` locates the OPF, whose
//! `<metadata>` and `<spine>`/NCX or EPUB3 nav document supply everything
//! else. Grounded in the ebook-reader container-parsing approach retrieved
//! alongside this codebase (`zip` + `roxmltree`, no full EPUB object model).

use std::io::Read;
use std::path::Path;

use biblio_model::{DataSource, IdentifierType};
use roxmltree::Document;

use crate::error::{LibraryError, Result};
use crate::parse::{ParsedAuthor, ParsedChapter, ParsedCover, ParsedIdentifier, ParsedMetadata, ParsedSeries};

fn io_err(path: &Path, e: impl std::fmt::Display) -> LibraryError {
    LibraryError::InvalidMetadata(format!("{}: {e}", path.display()))
}

pub async fn parse(path: &Path) -> Result<ParsedMetadata> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || parse_blocking(&path))
        .await
        .map_err(|e| LibraryError::Internal(format!("epub parse task panicked: {e}")))?
}

fn parse_blocking(path: &Path) -> Result<ParsedMetadata> {
    let file = std::fs::File::open(path).map_err(|e| io_err(path, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| io_err(path, e))?;

    let opf_path = locate_opf(&mut zip, path)?;
    let opf_xml = read_entry(&mut zip, &opf_path, path)?;
    let opf = Document::parse(&opf_xml).map_err(|e| io_err(path, e))?;
    let opf_dir = parent_dir(&opf_path);

    let mut meta = ParsedMetadata::with_source(DataSource::EpubMetadata);
    let root = opf.root_element();

    let metadata_el = root
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "metadata");
    let manifest_el = root
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "manifest");
    let spine_el = root
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "spine");

    if let Some(metadata_el) = metadata_el {
        let mut author_order = 0i32;
        let mut series_order = 0i32;
        for node in metadata_el.children().filter(|n| n.is_element()) {
            let text = node.text().unwrap_or("").trim().to_string();
            match node.tag_name().name() {
                "title" if meta.title.is_none() && !text.is_empty() => meta.title = Some(text),
                "description" if !text.is_empty() => meta.description = Some(text),
                "publisher" if !text.is_empty() => meta.publisher = Some(text),
                "creator" if !text.is_empty() => {
                    let role = node
                        .attributes()
                        .find(|a| a.name() == "role")
                        .map(|a| a.value().to_string());
                    meta.authors.push(ParsedAuthor { name: text, role });
                    author_order += 1;
                    let _ = author_order;
                }
                "subject" if !text.is_empty() => meta.genres.push(text),
                "date" if meta.release_date.is_none() && !text.is_empty() => {
                    meta.release_date = parse_date_prefix(&text);
                }
                "identifier" if !text.is_empty() => {
                    let scheme = node
                        .attributes()
                        .find(|a| a.name().eq_ignore_ascii_case("scheme"))
                        .map(|a| a.value().to_ascii_uppercase());
                    let identifier_type = match scheme.as_deref() {
                        Some("ISBN") if text.len() <= 10 => IdentifierType::Isbn10,
                        Some("ISBN") => IdentifierType::Isbn13,
                        Some("ASIN") => IdentifierType::Asin,
                        Some("DOI") => IdentifierType::Doi,
                        _ => IdentifierType::Other,
                    };
                    meta.identifiers.push(ParsedIdentifier { identifier_type, value: text });
                }
                "meta" => {
                    let name = node.attributes().find(|a| a.name() == "name").map(|a| a.value());
                    let content = node.attributes().find(|a| a.name() == "content").map(|a| a.value());
                    match (name, content) {
                        (Some("calibre:series"), Some(series_name)) => {
                            meta.series.push(ParsedSeries {
                                name: series_name.to_string(),
                                number: None,
                                sort_order: series_order,
                            });
                            series_order += 1;
                        }
                        (Some("calibre:series_index"), Some(idx)) => {
                            if let Some(last) = meta.series.last_mut() {
                                last.number = idx.parse().ok();
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }

    if let (Some(manifest_el), Some(spine_el)) = (manifest_el, spine_el) {
        if let Some(cover) = locate_cover(&mut zip, manifest_el, metadata_el, &opf_dir, path) {
            meta.cover = Some(cover);
        }
        meta.chapters = locate_toc(&mut zip, manifest_el, spine_el, &opf_dir, path)?;
    }

    Ok(meta)
}

fn parent_dir(path_in_zip: &str) -> String {
    match path_in_zip.rfind('/') {
        Some(idx) => path_in_zip[..idx].to_string(),
        None => String::new(),
    }
}

fn join_zip_path(dir: &str, href: &str) -> String {
    if href.starts_with('/') {
        return href.trim_start_matches('/').to_string();
    }
    if dir.is_empty() {
        href.to_string()
    } else {
        format!("{dir}/{href}")
    }
}

fn read_entry(zip: &mut zip::ZipArchive<std::fs::File>, name: &str, path: &Path) -> Result<String> {
    let mut entry = zip.by_name(name).map_err(|e| io_err(path, format!("missing {name}: {e}")))?;
    let mut buf = String::new();
    entry.read_to_string(&mut buf).map_err(|e| io_err(path, e))?;
    Ok(buf)
}

fn read_entry_bytes(zip: &mut zip::ZipArchive<std::fs::File>, name: &str) -> Option<Vec<u8>> {
    let mut entry = zip.by_name(name).ok()?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).ok()?;
    Some(buf)
}

fn locate_opf(zip: &mut zip::ZipArchive<std::fs::File>, path: &Path) -> Result<String> {
    let container_xml = read_entry(zip, "META-INF/container.xml", path)?;
    let doc = Document::parse(&container_xml).map_err(|e| io_err(path, e))?;
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "rootfile")
        .and_then(|n| n.attribute("full-path"))
        .map(str::to_string)
        .ok_or_else(|| LibraryError::InvalidMetadata(format!("{}: no rootfile in container.xml", path.display())))
}

fn guess_mime(href: &str) -> String {
    match href.rsplit('.').next().unwrap_or("").to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
    .to_string()
}

fn locate_cover(
    zip: &mut zip::ZipArchive<std::fs::File>,
    manifest_el: roxmltree::Node,
    metadata_el: Option<roxmltree::Node>,
    opf_dir: &str,
    _path: &Path,
) -> Option<ParsedCover> {
    let items: Vec<_> = manifest_el.children().filter(|n| n.is_element() && n.tag_name().name() == "item").collect();

    let cover_item_id = metadata_el.and_then(|metadata_el| {
        metadata_el
            .children()
            .find(|n| {
                n.is_element()
                    && n.tag_name().name() == "meta"
                    && n.attribute("name") == Some("cover")
            })
            .and_then(|n| n.attribute("content"))
    });

    let cover_item = items
        .iter()
        .find(|n| n.attribute("properties").map(|p| p.split_whitespace().any(|t| t == "cover-image")).unwrap_or(false))
        .or_else(|| items.iter().find(|n| cover_item_id.is_some() && n.attribute("id") == cover_item_id))?;

    let href = cover_item.attribute("href")?;
    let mime = cover_item.attribute("media-type").map(str::to_string).unwrap_or_else(|| guess_mime(href));
    let zip_path = join_zip_path(opf_dir, href);
    let bytes = read_entry_bytes(zip, &zip_path)?;

    Some(ParsedCover { bytes, mime, source_page: None })
}

/// EPUB3 nav document if declared, else the EPUB2 NCX. Both produce a
/// nested `ParsedChapter` tree; href is resolved relative to the OPF.
fn locate_toc(
    zip: &mut zip::ZipArchive<std::fs::File>,
    manifest_el: roxmltree::Node,
    spine_el: roxmltree::Node,
    opf_dir: &str,
    path: &Path,
) -> Result<Vec<ParsedChapter>> {
    let items: Vec<_> = manifest_el.children().filter(|n| n.is_element() && n.tag_name().name() == "item").collect();

    if let Some(nav_item) = items.iter().find(|n| {
        n.attribute("properties").map(|p| p.split_whitespace().any(|t| t == "nav")).unwrap_or(false)
    }) {
        let href = nav_item.attribute("href").unwrap_or_default();
        let zip_path = join_zip_path(opf_dir, href);
        if let Ok(xml) = read_entry(zip, &zip_path, path) {
            if let Ok(doc) = Document::parse(&xml) {
                return Ok(parse_nav_document(&doc));
            }
        }
        return Ok(Vec::new());
    }

    let Some(toc_id) = spine_el.attribute("toc") else { return Ok(Vec::new()) };
    let Some(ncx_item) = items.iter().find(|n| n.attribute("id") == Some(toc_id)) else {
        return Ok(Vec::new());
    };
    let href = ncx_item.attribute("href").unwrap_or_default();
    let zip_path = join_zip_path(opf_dir, href);
    let Ok(xml) = read_entry(zip, &zip_path, path) else { return Ok(Vec::new()) };
    let Ok(doc) = Document::parse(&xml) else { return Ok(Vec::new()) };
    Ok(parse_ncx_document(&doc))
}

fn parse_nav_document(doc: &Document) -> Vec<ParsedChapter> {
    let toc_nav = doc.descendants().find(|n| {
        n.is_element()
            && n.tag_name().name() == "nav"
            && n.attributes().any(|a| a.name() == "type" && a.value() == "toc")
    });
    let Some(toc_nav) = toc_nav else { return Vec::new() };
    let Some(ol) = toc_nav.children().find(|n| n.is_element() && n.tag_name().name() == "ol") else {
        return Vec::new();
    };
    parse_nav_ol(ol)
}

fn parse_nav_ol(ol: roxmltree::Node) -> Vec<ParsedChapter> {
    let mut chapters = Vec::new();
    let mut order = 0i32;
    for li in ol.children().filter(|n| n.is_element() && n.tag_name().name() == "li") {
        let a = li.children().find(|n| n.is_element() && n.tag_name().name() == "a");
        let title = a.and_then(|a| a.text()).unwrap_or_default().trim().to_string();
        let href = a.and_then(|a| a.attribute("href")).map(str::to_string);
        let children = li
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "ol")
            .map(parse_nav_ol)
            .unwrap_or_default();

        chapters.push(ParsedChapter { title, sort_order: order, href, children, ..Default::default() });
        order += 1;
    }
    chapters
}

fn parse_ncx_document(doc: &Document) -> Vec<ParsedChapter> {
    let Some(nav_map) = doc.descendants().find(|n| n.is_element() && n.tag_name().name() == "navMap") else {
        return Vec::new();
    };
    parse_ncx_nav_points(nav_map)
}

fn parse_ncx_nav_points(parent: roxmltree::Node) -> Vec<ParsedChapter> {
    let mut chapters = Vec::new();
    let mut order = 0i32;
    for nav_point in parent.children().filter(|n| n.is_element() && n.tag_name().name() == "navPoint") {
        let title = nav_point
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "navLabel")
            .and_then(|label| label.children().find(|n| n.is_element() && n.tag_name().name() == "text"))
            .and_then(|n| n.text())
            .unwrap_or_default()
            .trim()
            .to_string();
        let href = nav_point
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "content")
            .and_then(|n| n.attribute("src"))
            .map(str::to_string);
        let children = parse_ncx_nav_points(nav_point);

        chapters.push(ParsedChapter { title, sort_order: order, href, children, ..Default::default() });
        order += 1;
    }
    chapters
}

fn parse_date_prefix(raw: &str) -> Option<chrono::NaiveDate> {
    let prefix = &raw[..raw.len().min(10)];
    chrono::NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .ok()
        .or_else(|| chrono::NaiveDate::parse_from_str(&raw[..raw.len().min(4)], "%Y").ok().map(|_| {
            let year: i32 = raw[..raw.len().min(4)].parse().unwrap_or(1970);
            chrono::NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or_default()
        }))
}
