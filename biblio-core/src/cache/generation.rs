//! Content-addressed artifact generation cache. The cache key is a stable
//! digest of the current book/file state (the [`Fingerprint`]); writes go
//! through a temp-file-then-rename so a reader never observes a torn
//! artifact, and concurrent requests for the same key share one build
//! instead of racing each other.
//!
//! The on-disk layout is the literal contract from spec.md §6: rooted at a
//! configurable path, one subdirectory per format, file name the hex SHA-256
//! of the fingerprint plus the format's extension — no auxiliary index or
//! metadata file, the directory is entirely content-addressed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, instrument};

use biblio_model::{Book, File};

use crate::cache::fingerprint::Fingerprint;
use crate::error::{LibraryError, Result};

/// Produces a derived artifact (e.g. a KePub conversion) for a source file,
/// writing it to `dest_path`. Pure from the cache's point of view — it never
/// touches the cache directory's naming scheme itself.
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    async fn generate(&self, source_path: &Path, dest_path: &Path, book: &Book, file: &File) -> Result<()>;
}

type BuildOutcome = std::result::Result<PathBuf, Arc<LibraryError>>;
type SharedBuild = Shared<BoxFuture<'static, BuildOutcome>>;

pub struct GenerationCache {
    cache_dir: PathBuf,
    in_progress: Arc<DashMap<String, SharedBuild>>,
}

impl GenerationCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            in_progress: Arc::new(DashMap::new()),
        }
    }

    fn cache_key(fingerprint: &Fingerprint) -> String {
        format!("{}/{}", fingerprint.format.as_dir_name(), fingerprint.hash())
    }

    /// `<root>/<format>/<hash prefix>/<hash>.<ext>`, per spec.md §6.
    fn artifact_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        let hash = fingerprint.hash();
        let prefix = &hash[..2];
        self.cache_dir
            .join(fingerprint.format.as_dir_name())
            .join(prefix)
            .join(format!("{hash}.{}", fingerprint.format.extension()))
    }

    /// Returns the cached artifact's path if it exists. If a build is
    /// already in flight for this fingerprint, awaits and returns its result
    /// instead of starting a second one; otherwise starts the build and
    /// registers it so concurrent callers join it. Dropping the await here
    /// (e.g. the caller's request was cancelled) does not stop the build —
    /// it keeps running in a detached task and lands in the cache for the
    /// next caller.
    #[instrument(skip_all, fields(format = ?fingerprint.format))]
    pub async fn get_or_generate(
        &self,
        fingerprint: &Fingerprint,
        source_path: &Path,
        book: &Book,
        file: &File,
        generator: Arc<dyn ArtifactGenerator>,
    ) -> Result<PathBuf> {
        let dest_path = self.artifact_path(fingerprint);
        if tokio::fs::try_exists(&dest_path).await.unwrap_or(false) {
            debug!(path = %dest_path.display(), "generation cache hit");
            return Ok(dest_path);
        }

        let key = Self::cache_key(fingerprint);
        let shared = self
            .in_progress
            .entry(key.clone())
            .or_insert_with(|| {
                let in_progress = self.in_progress.clone();
                let key = key.clone();
                let source_path = source_path.to_path_buf();
                let dest_path = dest_path.clone();
                let book = book.clone();
                let file = file.clone();

                let fut: BoxFuture<'static, BuildOutcome> = Box::pin(async move {
                    let outcome = build_into(&source_path, &dest_path, &book, &file, generator).await;
                    in_progress.remove(&key);
                    outcome.map_err(Arc::new)
                });
                let shared = fut.shared();
                tokio::spawn(shared.clone());
                shared
            })
            .clone();

        shared.await.map_err(|e| LibraryError::Internal(e.to_string()))
    }

    pub async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<()> {
        let path = self.artifact_path(fingerprint);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Generates into a temp file next to the destination, then renames into
/// place — the destination is only ever observed complete or absent. On
/// failure the temp file is removed and the error propagated to every
/// waiter.
async fn build_into(source_path: &Path, dest_path: &Path, book: &Book, file: &File, generator: Arc<dyn ArtifactGenerator>) -> Result<PathBuf> {
    if let Some(parent) = dest_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = dest_path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));

    match generator.generate(source_path, &tmp_path, book, file).await {
        Ok(()) => {
            tokio::fs::rename(&tmp_path, dest_path).await?;
            Ok(dest_path.to_path_buf())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fingerprint::{ArtifactFormat, FingerprintInputs};
    use biblio_model::DataSource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    fn sample_book() -> Book {
        Book::new(
            biblio_model::LibraryId::new(),
            "/lib/dune".into(),
            "Dune".into(),
            DataSource::EpubMetadata,
        )
    }

    fn sample_fingerprint(book: &Book, file: &File) -> Fingerprint {
        FingerprintInputs {
            book,
            author_names: vec![],
            narrator_names: vec![],
            series_names: vec![],
            genre_names: vec![],
            tag_names: vec![],
            file,
            publisher_name: None,
            imprint_name: None,
            identifiers: vec![],
            cover: None,
            chapters: vec![],
        }
        .build(ArtifactFormat::Kepub)
    }

    struct CountingGenerator {
        calls: AtomicUsize,
        payload: Vec<u8>,
    }

    #[async_trait]
    impl ArtifactGenerator for CountingGenerator {
        async fn generate(&self, _source_path: &Path, dest_path: &Path, _book: &Book, _file: &File) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            tokio::fs::write(dest_path, &self.payload).await?;
            Ok(())
        }
    }

    struct FailingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ArtifactGenerator for FailingGenerator {
        async fn generate(&self, _source_path: &Path, _dest_path: &Path, _book: &Book, _file: &File) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LibraryError::Internal("boom".into()))
        }
    }

    #[tokio::test]
    async fn second_request_hits_disk_cache() {
        let dir = tempdir().unwrap();
        let cache = GenerationCache::new(dir.path());
        let book = sample_book();
        let file = File::new(book.id, "/lib/dune/dune.epub".into(), biblio_model::FileType::Epub, 1024);
        let fp = sample_fingerprint(&book, &file);
        let generator = Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
            payload: b"artifact bytes".to_vec(),
        });

        let first = cache
            .get_or_generate(&fp, Path::new("/lib/dune/dune.epub"), &book, &file, generator.clone())
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&first).await.unwrap(), b"artifact bytes");

        let second = cache
            .get_or_generate(&fp, Path::new("/lib/dune/dune.epub"), &book, &file, generator.clone())
            .await
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_for_same_fingerprint_build_once() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(GenerationCache::new(dir.path()));
        let book = sample_book();
        let file = File::new(book.id, "/lib/dune/dune.epub".into(), biblio_model::FileType::Epub, 1024);
        let fp = sample_fingerprint(&book, &file);
        let generator = Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
            payload: b"shared build".to_vec(),
        });

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let fp = fp.clone();
            let book = book.clone();
            let file = file.clone();
            let generator = generator.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_generate(&fp, Path::new("/lib/dune/dune.epub"), &book, &file, generator)
                    .await
            }));
        }

        let mut paths = Vec::new();
        for handle in handles {
            paths.push(handle.await.unwrap().unwrap());
        }
        assert!(paths.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(tokio::fs::read(&paths[0]).await.unwrap(), b"shared build");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_build_does_not_poison_the_key_for_retries() {
        let dir = tempdir().unwrap();
        let cache = GenerationCache::new(dir.path());
        let book = sample_book();
        let file = File::new(book.id, "/lib/dune/dune.epub".into(), biblio_model::FileType::Epub, 1024);
        let fp = sample_fingerprint(&book, &file);
        let failing = Arc::new(FailingGenerator { calls: AtomicUsize::new(0) });

        let err = cache
            .get_or_generate(&fp, Path::new("/lib/dune/dune.epub"), &book, &file, failing.clone())
            .await;
        assert!(err.is_err());

        let succeeding = Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
            payload: b"recovered".to_vec(),
        });
        let ok = cache
            .get_or_generate(&fp, Path::new("/lib/dune/dune.epub"), &book, &file, succeeding)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&ok).await.unwrap(), b"recovered");
    }
}
