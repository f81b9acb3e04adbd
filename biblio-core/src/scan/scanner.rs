//! Per-file scanner: the twelve-step algorithm that turns one path on disk
//! into reconciled `Book`/`File`/relationship rows. Every write happens
//! inside one transaction per file, so observers never see a torn update.

use std::path::{Path, PathBuf};

use biblio_model::{
    AuthorRef, Book, Chapter, ChapterId, DataSource, File, FileId, FileType, Identifier,
    IdentifierType, LibraryId, NarratorRef, SeriesRef,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::ScanCache;
use crate::error::{LibraryError, Result};
use crate::parse::{self, ParsedChapter, ParsedIdentifier, ParsedMetadata};
use crate::reconcile::{should_replace_relationship, should_replace_scalar};
use crate::sidecar::{self, BookSidecar, FileSidecar};
use crate::store::postgres::Store;
use crate::store::{ImprintRepository, PublisherRepository};

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanFlags {
    pub force_refresh: bool,
    pub is_resync: bool,
}

#[derive(Debug)]
pub enum FileOutcome {
    Deleted { path: PathBuf, book_deleted: bool },
    Scanned {
        path: PathBuf,
        book_id: biblio_model::BookId,
        file_id: FileId,
        book_created: bool,
        file_created: bool,
    },
    Skipped { path: PathBuf, reason: String },
    Cancelled { path: PathBuf },
}

pub struct FileScanner {
    store: Store,
    cache: std::sync::Arc<ScanCache>,
}

impl FileScanner {
    pub fn new(store: Store, cache: std::sync::Arc<ScanCache>) -> Self {
        Self { store, cache }
    }

    pub async fn scan_file(&self, path: &Path, library_id: LibraryId, flags: ScanFlags, cancel: &CancellationToken) -> FileOutcome {
        match self.scan_file_inner(path, library_id, flags, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "scan of file failed, skipping");
                FileOutcome::Skipped { path: path.to_path_buf(), reason: e.to_string() }
            }
        }
    }

    async fn scan_file_inner(&self, path: &Path, library_id: LibraryId, flags: ScanFlags, cancel: &CancellationToken) -> Result<FileOutcome> {
        let path_str = path.to_string_lossy().to_string();

        // Step 1: existence check.
        if !path.exists() {
            return self.handle_missing(&path_str).await;
        }

        // Cancellation checkpoint 1 of 2 (spec.md §5): before parse.
        if cancel.is_cancelled() {
            return Ok(FileOutcome::Cancelled { path: path.to_path_buf() });
        }

        // Step 2: parse.
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let file_type = FileType::from_extension(ext);
        if file_type == FileType::Supplement {
            return Ok(FileOutcome::Skipped { path: path.to_path_buf(), reason: "unsupported extension".into() });
        }
        let parsed = parse::parse(path, file_type).await?;

        // Step 3: sidecars applied on top of parsed metadata.
        let book_dir = path.parent().unwrap_or(path);
        let book_sidecar = sidecar::read_book_sidecar(book_dir);
        let file_sidecar = sidecar::read_file_sidecar(path);
        let draft = MergedMetadata::build(&parsed, book_sidecar.as_ref(), file_sidecar.as_ref());

        // Step 4: filename fallback for title.
        let (title, title_source) = if draft.title.0.is_empty() {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("untitled").to_string();
            (stem, DataSource::Filepath)
        } else {
            draft.title.clone()
        };

        let book_dir_str = book_dir.to_string_lossy().to_string();

        // Cancellation checkpoint 2 of 2 (spec.md §5): before the per-file
        // transaction. Nothing has been written yet, so there's nothing to
        // roll back.
        if cancel.is_cancelled() {
            return Ok(FileOutcome::Cancelled { path: path.to_path_buf() });
        }

        let mut tx = self.store.begin().await?;

        // Step 5: resolve Book.
        let existing_book = self.store.books().find_by_path(library_id, &book_dir_str).await?;
        let book_created = existing_book.is_none();
        let mut book = existing_book.unwrap_or_else(|| Book::new(library_id, book_dir_str.clone(), title.clone(), title_source));

        // Step 6: resolve or create File.
        let existing_file = self.store.files().find_by_path(&path_str).await?;
        let file_created = existing_file.is_none();
        let mut file = existing_file.unwrap_or_else(|| {
            File::new(book.id, path_str.clone(), file_type, std::fs::metadata(path).map(|m| m.len()).unwrap_or(0))
        });
        let mut file_dirty = false;
        if file.book_id != book.id {
            file.book_id = book.id;
            file_dirty = true;
        }
        if file.file_type != file_type {
            file.file_type = file_type;
            file_dirty = true;
        }
        // Technical facts read straight off the container, not subject to
        // source-priority reconciliation — there is only ever one source.
        let new_page_count = parsed.page_count.or(file.page_count);
        if new_page_count != file.page_count {
            file.page_count = new_page_count;
            file_dirty = true;
        }
        let new_duration_ms = parsed.duration_ms.or(file.duration_ms);
        if new_duration_ms != file.duration_ms {
            file.duration_ms = new_duration_ms;
            file_dirty = true;
        }
        let new_bitrate_kbps = parsed.bitrate_kbps.or(file.bitrate_kbps);
        if new_bitrate_kbps != file.bitrate_kbps {
            file.bitrate_kbps = new_bitrate_kbps;
            file_dirty = true;
        }

        // Step 7: scalar reconciliation. Each `apply_*` call reports whether
        // it actually replaced the stored value so the upsert below can be
        // skipped entirely on an unchanged rescan (spec.md §8: "running the
        // scan again produces zero writes").
        let mut book_dirty = apply_scalar(&mut book.title, &mut book.title_source, &title, title_source, flags.force_refresh);
        book.sort_title = biblio_model::derive_sort_title(&book.title);
        book.sort_title_source = book.title_source;
        book_dirty |= apply_scalar_opt(&mut book.subtitle, &mut book.subtitle_source, &draft.subtitle, flags.force_refresh);
        book_dirty |= apply_scalar_opt(&mut book.description, &mut book.description_source, &draft.description, flags.force_refresh);

        file_dirty |= apply_scalar_opt(&mut file.name, &mut file.name_source, &draft.name, flags.force_refresh);
        file_dirty |= apply_scalar_opt(&mut file.url, &mut file.url_source, &draft.url, flags.force_refresh);
        file_dirty |= apply_scalar_opt(&mut file.release_date, &mut file.release_date_source, &draft.release_date, flags.force_refresh);

        if let (Some(name), source) = &draft.publisher {
            let publisher = PublisherRepository::find_or_create(&self.store.entities(), name, library_id).await?;
            if should_replace_id(publisher.id, file.publisher_id, *source, file.publisher_source, flags.force_refresh) {
                file.publisher_id = Some(publisher.id);
                file.publisher_source = *source;
                file_dirty = true;
            }
        }
        if let (Some(name), source) = &draft.imprint {
            let imprint = ImprintRepository::find_or_create(&self.store.entities(), name, library_id).await?;
            if should_replace_id(imprint.id, file.imprint_id, *source, file.imprint_source, flags.force_refresh) {
                file.imprint_id = Some(imprint.id);
                file.imprint_source = *source;
                file_dirty = true;
            }
        }

        if book_created || book_dirty {
            self.store.books().upsert(&mut tx, &book).await?;
        }
        if file_created || file_dirty {
            self.store.files().upsert(&mut tx, &file).await?;
        }

        // Step 8: relationship reconciliation, resolved through the cache.
        self.reconcile_authors(&mut tx, &book, &draft, library_id, flags.force_refresh).await?;
        self.reconcile_genres(&mut tx, &book, &draft, library_id, flags.force_refresh).await?;
        self.reconcile_tags(&mut tx, &book, &draft, library_id, flags.force_refresh).await?;
        self.reconcile_series(&mut tx, &book, &draft, library_id, flags.force_refresh).await?;
        self.reconcile_narrators(&mut tx, &file, &draft, library_id, flags.force_refresh).await?;
        self.reconcile_identifiers(&mut tx, &file, &draft, flags.force_refresh).await?;

        // Step 9: chapters, only on a first-time file.
        if !parsed.chapters.is_empty() && !self.store.chapters().has_chapters(file.id).await? {
            let chapters = flatten_chapters(&parsed.chapters, file.id, None);
            self.store.chapters().replace_tree(&mut tx, file.id, &chapters).await?;
        }

        // Step 11: cover policy — disk is checked before any extraction.
        let cover_before = file.cover.clone();
        self.apply_cover_policy(book_dir, &parsed, &mut file)?;
        if file.cover != cover_before {
            self.store.files().upsert(&mut tx, &file).await?;
        }

        tx.commit().await.map_err(|e| LibraryError::Internal(format!("commit file scan: {e}")))?;

        // Step 10: rewrite sidecars to reflect the now-reconciled state.
        self.rewrite_sidecars(book_dir, path, &book, &file)?;

        debug!(path = %path_str, book_id = %book.id, file_id = %file.id, "scanned file");
        Ok(FileOutcome::Scanned {
            path: path.to_path_buf(),
            book_id: book.id,
            file_id: file.id,
            book_created,
            file_created,
        })
    }

    async fn handle_missing(&self, path_str: &str) -> Result<FileOutcome> {
        let Some(file) = self.store.files().find_by_path(path_str).await? else {
            return Ok(FileOutcome::Deleted { path: PathBuf::from(path_str), book_deleted: false });
        };
        let book_id = file.book_id;
        let mut tx = self.store.begin().await?;
        self.store.files().delete(&mut tx, file.id).await?;
        tx.commit().await.map_err(|e| LibraryError::Internal(format!("commit file delete: {e}")))?;

        let remaining = self.store.files().count_for_book(book_id).await?;
        let book_deleted = remaining == 0;
        if book_deleted {
            let mut tx = self.store.begin().await?;
            self.store.books().delete(&mut tx, book_id).await?;
            tx.commit().await.map_err(|e| LibraryError::Internal(format!("commit book delete: {e}")))?;
        }
        Ok(FileOutcome::Deleted { path: PathBuf::from(path_str), book_deleted })
    }

    async fn reconcile_authors(
        &self,
        tx: &mut crate::store::Tx<'_>,
        book: &Book,
        draft: &MergedMetadata,
        library_id: LibraryId,
        force_refresh: bool,
    ) -> Result<()> {
        let (authors, source) = &draft.authors;
        let mut resolved = Vec::with_capacity(authors.len());
        for (i, author) in authors.iter().enumerate() {
            let person = self.cache.get_or_create_person(&author.name, library_id, &self.store.entities()).await?;
            resolved.push(AuthorRef { person_id: person.id, role: author.role.clone(), sort_order: i as i32 });
        }
        if should_replace_relationship(&resolved, &book.authors, *source, book.authors_source, force_refresh) {
            self.store.books().set_authors(tx, book.id, &resolved).await?;
        }
        Ok(())
    }

    async fn reconcile_genres(
        &self,
        tx: &mut crate::store::Tx<'_>,
        book: &Book,
        draft: &MergedMetadata,
        library_id: LibraryId,
        force_refresh: bool,
    ) -> Result<()> {
        let (names, source) = &draft.genres;
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            let genre = self.cache.get_or_create_genre(name, library_id, &self.store.entities()).await?;
            resolved.push(genre.id);
        }
        if should_replace_relationship(&resolved, &book.genres, *source, book.genres_source, force_refresh) {
            self.store.books().set_genres(tx, book.id, &resolved).await?;
        }
        Ok(())
    }

    async fn reconcile_tags(
        &self,
        tx: &mut crate::store::Tx<'_>,
        book: &Book,
        draft: &MergedMetadata,
        library_id: LibraryId,
        force_refresh: bool,
    ) -> Result<()> {
        let (names, source) = &draft.tags;
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            let tag = self.cache.get_or_create_tag(name, library_id, &self.store.entities()).await?;
            resolved.push(tag.id);
        }
        if should_replace_relationship(&resolved, &book.tags, *source, book.tags_source, force_refresh) {
            self.store.books().set_tags(tx, book.id, &resolved).await?;
        }
        Ok(())
    }

    async fn reconcile_series(
        &self,
        tx: &mut crate::store::Tx<'_>,
        book: &Book,
        draft: &MergedMetadata,
        library_id: LibraryId,
        force_refresh: bool,
    ) -> Result<()> {
        let (entries, source) = &draft.series;
        let mut resolved = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let series = self.cache.get_or_create_series(&entry.name, library_id, &self.store.entities()).await?;
            resolved.push(SeriesRef { series_id: series.id, number: entry.number, sort_order: i as i32 });
        }
        if should_replace_relationship(&resolved, &book.series, *source, book.series_source, force_refresh) {
            self.store.books().set_series(tx, book.id, &resolved).await?;
        }
        Ok(())
    }

    async fn reconcile_narrators(
        &self,
        tx: &mut crate::store::Tx<'_>,
        file: &File,
        draft: &MergedMetadata,
        library_id: LibraryId,
        force_refresh: bool,
    ) -> Result<()> {
        let (names, source) = &draft.narrators;
        let mut resolved = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let person = self.cache.get_or_create_person(name, library_id, &self.store.entities()).await?;
            resolved.push(NarratorRef { person_id: person.id, sort_order: i as i32 });
        }
        if should_replace_relationship(&resolved, &file.narrators, *source, file.narrators_source, force_refresh) {
            self.store.files().set_narrators(tx, file.id, &resolved).await?;
        }
        Ok(())
    }

    async fn reconcile_identifiers(
        &self,
        tx: &mut crate::store::Tx<'_>,
        file: &File,
        draft: &MergedMetadata,
        force_refresh: bool,
    ) -> Result<()> {
        let (items, source) = &draft.identifiers;
        if items.is_empty() {
            return Ok(());
        }
        let resolved: Vec<Identifier> = items
            .iter()
            .map(|i| Identifier { file_id: file.id, identifier_type: i.identifier_type, value: i.value.clone(), source: *source })
            .collect();

        // Identifiers carry a per-row source rather than one on `File`, so
        // there is no single stored "existing source" column to compare
        // against; use the strongest source present among the stored rows
        // as a stand-in, and compare values ignoring each row's individual
        // source so an equal-priority rescan with unchanged values is a
        // no-op.
        let current = self.store.files().list_identifiers(file.id).await?;
        let existing_priority = current.iter().map(|i| i.source.priority()).min().unwrap_or(DataSource::Filepath.priority());
        let new_priority = source.priority();

        let replace = if force_refresh {
            !resolved.is_empty()
        } else if new_priority < existing_priority {
            !resolved.is_empty()
        } else if new_priority > existing_priority {
            false
        } else {
            !resolved.is_empty() && !identifier_values_match(&resolved, &current)
        };

        if replace {
            self.store.files().set_identifiers(tx, file.id, &resolved).await?;
        }
        Ok(())
    }

    /// Disk truth wins: an already-present cover file is never re-extracted
    /// or compared against parsed bytes.
    fn apply_cover_policy(&self, book_dir: &Path, parsed: &ParsedMetadata, file: &mut File) -> Result<()> {
        for ext in ["jpg", "jpeg", "png", "gif", "webp"] {
            let candidate = book_dir.join(format!("cover.{ext}"));
            if candidate.exists() {
                file.cover = Some(biblio_model::CoverRef {
                    path: candidate.to_string_lossy().to_string(),
                    mime: guess_cover_mime(ext),
                    source_page: None,
                });
                return Ok(());
            }
        }

        let Some(cover) = &parsed.cover else { return Ok(()) };
        let ext = match cover.mime.as_str() {
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "jpg",
        };
        let dest = book_dir.join(format!("cover.{ext}"));
        std::fs::write(&dest, &cover.bytes)?;
        file.cover = Some(biblio_model::CoverRef {
            path: dest.to_string_lossy().to_string(),
            mime: cover.mime.clone(),
            source_page: cover.source_page,
        });
        Ok(())
    }

    fn rewrite_sidecars(&self, book_dir: &Path, file_path: &Path, book: &Book, file: &File) -> Result<()> {
        let mut book_sidecar = BookSidecar::new();
        book_sidecar.title = Some(book.title.clone());
        book_sidecar.subtitle = book.subtitle.clone();
        book_sidecar.description = book.description.clone();
        sidecar::write_book_sidecar(book_dir, &book_sidecar)?;

        let mut file_sidecar = FileSidecar::new();
        file_sidecar.url = file.url.clone();
        file_sidecar.name = file.name.clone();
        file_sidecar.release_date = file.release_date.map(|d| d.to_string());
        sidecar::write_file_sidecar(file_path, &file_sidecar)?;
        Ok(())
    }
}

fn guess_cover_mime(ext: &str) -> String {
    match ext {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
    .to_string()
}

fn identifier_values_match(a: &[Identifier], b: &[Identifier]) -> bool {
    let strip = |items: &[Identifier]| -> Vec<(IdentifierType, String)> {
        items.iter().map(|i| (i.identifier_type, i.value.clone())).collect()
    };
    strip(a) == strip(b)
}

/// Same priority rule as `should_replace_scalar`, specialized to foreign-key
/// fields where "the value" is an id rather than a string: non-empty means
/// "resolved to some id", and equality is id equality rather than text
/// equality.
fn should_replace_id<T: PartialEq>(new_id: T, existing_id: Option<T>, new_source: DataSource, existing_source: DataSource, force_refresh: bool) -> bool {
    if force_refresh {
        return true;
    }
    match new_source.priority().cmp(&existing_source.priority()) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => existing_id.as_ref() != Some(&new_id),
    }
}

/// Returns whether the value was actually replaced, so callers can decide
/// whether a write is needed at all rather than upserting every pass.
fn apply_scalar(current: &mut String, current_source: &mut DataSource, incoming: &str, incoming_source: DataSource, force_refresh: bool) -> bool {
    if should_replace_scalar(incoming, current, incoming_source, *current_source, force_refresh) {
        *current = incoming.to_string();
        *current_source = incoming_source;
        true
    } else {
        false
    }
}

fn apply_scalar_opt<T: Clone + ToString + PartialEq>(
    current: &mut Option<T>,
    current_source: &mut DataSource,
    incoming: &(Option<T>, DataSource),
    force_refresh: bool,
) -> bool {
    let Some(new_value) = &incoming.0 else { return false };
    let current_str = current.as_ref().map(|v| v.to_string()).unwrap_or_default();
    if should_replace_scalar(&new_value.to_string(), &current_str, incoming.1, *current_source, force_refresh) {
        *current = Some(new_value.clone());
        *current_source = incoming.1;
        true
    } else {
        false
    }
}

/// Parsed metadata with book/file sidecars folded in — sidecar strictly
/// outranks format-parsed data, so a non-empty sidecar field always wins.
struct MergedMetadata {
    title: (String, DataSource),
    subtitle: (Option<String>, DataSource),
    description: (Option<String>, DataSource),
    name: (Option<String>, DataSource),
    url: (Option<String>, DataSource),
    publisher: (Option<String>, DataSource),
    imprint: (Option<String>, DataSource),
    release_date: (Option<chrono::NaiveDate>, DataSource),
    authors: (Vec<crate::parse::ParsedAuthor>, DataSource),
    narrators: (Vec<String>, DataSource),
    series: (Vec<crate::parse::ParsedSeries>, DataSource),
    genres: (Vec<String>, DataSource),
    tags: (Vec<String>, DataSource),
    identifiers: (Vec<ParsedIdentifier>, DataSource),
}

impl MergedMetadata {
    fn build(parsed: &ParsedMetadata, book_sidecar: Option<&BookSidecar>, file_sidecar: Option<&FileSidecar>) -> Self {
        let base_source = parsed.source;

        let title = merge_str(parsed.title.clone(), base_source, book_sidecar.and_then(|s| s.title.clone()));
        let subtitle = merge_opt(parsed.subtitle.clone(), base_source, book_sidecar.and_then(|s| s.subtitle.clone()));
        let description = merge_opt(parsed.description.clone(), base_source, book_sidecar.and_then(|s| s.description.clone()));
        let name = merge_opt(None, base_source, file_sidecar.and_then(|s| s.name.clone()));
        let url = merge_opt(parsed.url.clone(), base_source, file_sidecar.and_then(|s| s.url.clone()));
        let publisher = merge_opt(parsed.publisher.clone(), base_source, file_sidecar.and_then(|s| s.publisher.clone()));
        let imprint = merge_opt(parsed.imprint.clone(), base_source, file_sidecar.and_then(|s| s.imprint.clone()));

        let sidecar_date = file_sidecar
            .and_then(|s| s.release_date.as_ref())
            .and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
        let release_date = merge_opt(parsed.release_date, base_source, sidecar_date);

        let sidecar_authors: Option<Vec<crate::parse::ParsedAuthor>> = book_sidecar.map(|s| {
            s.authors
                .iter()
                .map(|a| crate::parse::ParsedAuthor { name: a.name.clone(), role: a.role.clone() })
                .collect()
        });
        let authors = merge_list(parsed.authors.clone(), base_source, sidecar_authors);

        let sidecar_narrators: Option<Vec<String>> =
            file_sidecar.map(|s| s.narrators.iter().map(|n| n.name.clone()).collect());
        let narrators = merge_list(parsed.narrators.clone(), base_source, sidecar_narrators);

        let sidecar_series: Option<Vec<crate::parse::ParsedSeries>> = book_sidecar.map(|s| {
            s.series
                .iter()
                .map(|s| crate::parse::ParsedSeries { name: s.name.clone(), number: s.number, sort_order: s.sort_order })
                .collect()
        });
        let series = merge_list(parsed.series.clone(), base_source, sidecar_series);

        let genres = merge_list(parsed.genres.clone(), base_source, book_sidecar.map(|s| s.genres.clone()));
        let tags = merge_list(parsed.tags.clone(), base_source, book_sidecar.map(|s| s.tags.clone()));

        let sidecar_identifiers: Option<Vec<ParsedIdentifier>> = file_sidecar.map(|s| {
            s.identifiers
                .iter()
                .map(|i| ParsedIdentifier {
                    identifier_type: parse_identifier_type_str(&i.identifier_type),
                    value: i.value.clone(),
                })
                .collect()
        });
        let identifiers = merge_list(parsed.identifiers.clone(), base_source, sidecar_identifiers);

        Self {
            title,
            subtitle,
            description,
            name,
            url,
            publisher,
            imprint,
            release_date,
            authors,
            narrators,
            series,
            genres,
            tags,
            identifiers,
        }
    }
}

fn parse_identifier_type_str(raw: &str) -> IdentifierType {
    match raw {
        "isbn10" => IdentifierType::Isbn10,
        "isbn13" => IdentifierType::Isbn13,
        "asin" => IdentifierType::Asin,
        "doi" => IdentifierType::Doi,
        _ => IdentifierType::Other,
    }
}

fn merge_str(parsed: Option<String>, parsed_source: DataSource, sidecar: Option<String>) -> (String, DataSource) {
    let base = parsed.unwrap_or_default();
    match sidecar {
        Some(s) if should_replace_scalar(&s, &base, DataSource::Sidecar, parsed_source, false) => (s, DataSource::Sidecar),
        _ => (base, parsed_source),
    }
}

fn merge_opt<T: Clone + ToString>(parsed: Option<T>, parsed_source: DataSource, sidecar: Option<T>) -> (Option<T>, DataSource) {
    let base_str = parsed.as_ref().map(|v| v.to_string()).unwrap_or_default();
    match sidecar {
        Some(s) if should_replace_scalar(&s.to_string(), &base_str, DataSource::Sidecar, parsed_source, false) => {
            (Some(s), DataSource::Sidecar)
        }
        _ => (parsed, parsed_source),
    }
}

fn merge_list<T: Clone + PartialEq>(parsed: Vec<T>, parsed_source: DataSource, sidecar: Option<Vec<T>>) -> (Vec<T>, DataSource) {
    match sidecar {
        Some(s) if should_replace_relationship(&s, &parsed, DataSource::Sidecar, parsed_source, false) => (s, DataSource::Sidecar),
        Some(s) if !s.is_empty() && parsed.is_empty() => (s, DataSource::Sidecar),
        _ => (parsed, parsed_source),
    }
}

/// Flattens a `ParsedChapter` tree into `Chapter` rows with generated ids
/// and `parent_id` back-pointers, assigning dense `sort_order` per sibling
/// group in source order.
fn flatten_chapters(nodes: &[ParsedChapter], file_id: FileId, parent_id: Option<ChapterId>) -> Vec<Chapter> {
    let mut out = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        let id = ChapterId::new();
        out.push(Chapter {
            id,
            file_id,
            parent_id,
            title: node.title.clone(),
            sort_order: i as i32,
            start_page: node.start_page,
            start_timestamp_ms: node.start_timestamp_ms,
            href: node.href.clone(),
        });
        out.extend(flatten_chapters(&node.children, file_id, Some(id)));
    }
    out
}
