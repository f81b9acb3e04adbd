//! Drives one scan job to completion: walks each library root, hands
//! discovered paths to a [`WorkerPool`](super::worker_pool::WorkerPool) of
//! [`FileScanner`]s, throttles progress writes, watches for cancellation,
//! and sweeps orphaned rows once the walk is drained.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use biblio_model::{BookId, JobId, LibraryId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::ScanCache;
use crate::error::{LibraryError, Result};
use crate::scan::scanner::{FileOutcome, FileScanner, ScanFlags};
use crate::scan::worker_pool::{worker_count, WorkerPool};
use crate::store::postgres::Store;

const PROGRESS_WRITE_INTERVAL: Duration = Duration::from_millis(500);

/// One library's worth of walk-and-scan results, shaped for the job's
/// `data` payload (spec.md leaves the payload free-form; this is the
/// structured summary this engine writes into it).
#[derive(Debug, Default, serde::Serialize)]
pub struct LibrarySummary {
    pub books_created: u64,
    pub books_updated: u64,
    pub files_created: u64,
    pub files_updated: u64,
    pub files_deleted: u64,
    pub books_deleted: u64,
    pub skipped: Vec<(PathBuf, String)>,
    pub duration_ms: u64,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct ScanSummary {
    pub libraries: Vec<(LibraryId, LibrarySummary)>,
}

pub struct ScanDriver {
    store: Store,
    allowed_extensions: Vec<String>,
    worker_count: Option<usize>,
}

impl ScanDriver {
    pub fn new(store: Store, allowed_extensions: Vec<String>, worker_count: Option<usize>) -> Self {
        Self { store, allowed_extensions, worker_count }
    }

    /// Runs every library in `library_roots`, serially, reporting aggregate
    /// progress against `job_id`. `flags.force_refresh` re-runs as if every
    /// source were fresh; it does not bypass the reconciler's priority
    /// ordering, only the "unchanged, skip" shortcut within it.
    pub async fn run(
        &self,
        job_id: JobId,
        library_roots: &[(LibraryId, PathBuf)],
        flags: ScanFlags,
    ) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();
        let total_libraries = library_roots.len();
        for (library_id, root) in library_roots {
            if self.store.jobs().is_cancel_requested(job_id).await? {
                info!(job_id = %job_id, "scan job cancelled, stopping before next library");
                return Err(LibraryError::Cancelled(format!("job {job_id} cancelled before library {library_id}")));
            }
            let library_summary =
                self.run_library(job_id, *library_id, root, flags, summary.libraries.len(), total_libraries).await?;
            summary.libraries.push((*library_id, library_summary));
        }
        Ok(summary)
    }

    async fn run_library(
        &self,
        job_id: JobId,
        library_id: LibraryId,
        root: &Path,
        flags: ScanFlags,
        libraries_done: usize,
        total_libraries: usize,
    ) -> Result<LibrarySummary> {
        let started = Instant::now();
        let paths = self.walk(root);
        let total = paths.len();
        info!(library_id = %library_id, root = %root.display(), total, "scanning library");

        let cache = Arc::new(ScanCache::default());
        let scanner = Arc::new(FileScanner::new(self.store.clone(), cache));

        let (path_tx, path_rx) = mpsc::channel::<PathBuf>(total.max(1));
        for path in paths {
            // Never blocks: the channel's capacity equals the number of
            // paths about to be sent.
            path_tx.send(path).await.ok();
        }
        drop(path_tx);

        let workers = worker_count(self.worker_count, num_cpus::get());
        let cancel = CancellationToken::new();

        // Bridges the DB-polled cancel flag into the in-process token that
        // the worker pool and per-file scanner actually check. Runs until
        // either the path channel drains (handled via select against the
        // watcher's own poll loop ending when `cancel` fires) or the job is
        // cancelled.
        let watcher_store = self.store.clone();
        let watcher_cancel = cancel.clone();
        let watcher = tokio::spawn(async move {
            loop {
                if watcher_cancel.is_cancelled() {
                    return;
                }
                tokio::select! {
                    _ = tokio::time::sleep(PROGRESS_WRITE_INTERVAL) => {}
                    _ = watcher_cancel.cancelled() => return,
                }
                match watcher_store.jobs().is_cancel_requested(job_id).await {
                    Ok(true) => {
                        watcher_cancel.cancel();
                        return;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(job_id = %job_id, error = %e, "failed to poll cancellation state");
                    }
                }
            }
        });

        let scanner_for_pool = scanner.clone();
        let cancel_for_pool = cancel.clone();
        let mut pool = WorkerPool::spawn(
            workers,
            path_rx,
            cancel.clone(),
            move |path| {
                let scanner = scanner_for_pool.clone();
                let cancel = cancel_for_pool.clone();
                async move { scanner.scan_file(&path, library_id, flags, &cancel).await }
            },
            |path| FileOutcome::Skipped { path, reason: "worker panicked".into() },
        );

        let mut results = pool.take_results();
        let mut library_summary = LibrarySummary::default();
        let mut processed = 0usize;
        let mut last_progress_write = Instant::now() - PROGRESS_WRITE_INTERVAL;

        while let Some(outcome) = results.recv().await {
            processed += 1;
            match outcome {
                FileOutcome::Scanned { book_created, file_created, .. } => {
                    if book_created {
                        library_summary.books_created += 1;
                    } else {
                        library_summary.books_updated += 1;
                    }
                    if file_created {
                        library_summary.files_created += 1;
                    } else {
                        library_summary.files_updated += 1;
                    }
                }
                FileOutcome::Deleted { book_deleted, .. } => {
                    library_summary.files_deleted += 1;
                    if book_deleted {
                        library_summary.books_deleted += 1;
                    }
                }
                FileOutcome::Skipped { path, reason } => {
                    warn!(path = %path.display(), reason, "file skipped during scan");
                    library_summary.skipped.push((path, reason));
                }
                FileOutcome::Cancelled { path } => {
                    debug_assert!(cancel.is_cancelled());
                    library_summary.skipped.push((path, "cancelled".into()));
                }
            }

            if last_progress_write.elapsed() >= PROGRESS_WRITE_INTERVAL {
                let overall = overall_percent(libraries_done, total_libraries, processed, total);
                self.store.jobs().set_progress(job_id, overall).await?;
                last_progress_write = Instant::now();
            }
        }

        pool.join().await;
        let was_cancelled = cancel.is_cancelled();
        cancel.cancel();
        watcher.abort();

        self.store.jobs().set_progress(job_id, overall_percent(libraries_done, total_libraries, total, total)).await?;

        if was_cancelled {
            info!(job_id = %job_id, library_id = %library_id, "cancellation observed, skipping orphan sweep");
            return Err(LibraryError::Cancelled(format!("job {job_id} cancelled while scanning library {library_id}")));
        }

        let (orphan_files, orphan_books) = self.orphan_sweep(library_id).await?;
        library_summary.files_deleted += orphan_files;
        library_summary.books_deleted += orphan_books;
        library_summary.duration_ms = started.elapsed().as_millis() as u64;
        Ok(library_summary)
    }

    fn walk(&self, root: &Path) -> Vec<PathBuf> {
        walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.is_allowed(path))
            .collect()
    }

    fn is_allowed(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else { return false };
        self.allowed_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }

    /// Catches rows whose path vanished between scans without the driver
    /// ever walking past them — the per-file scanner's own existence check
    /// (step 1) only fires for paths the walk actually visits, so a file or
    /// an entire book directory deleted outside of a rescan needs this
    /// separate sweep.
    async fn orphan_sweep(&self, library_id: LibraryId) -> Result<(u64, u64)> {
        let mut deleted_files = 0u64;
        let mut deleted_books = 0u64;

        for (book_id, book_path) in self.store.books().list_paths(library_id).await? {
            if !Path::new(&book_path).exists() {
                deleted_files += self.delete_all_files(book_id).await?;
                let mut tx = self.store.begin().await?;
                self.store.books().delete(&mut tx, book_id).await?;
                tx.commit()
                    .await
                    .map_err(|e| crate::error::LibraryError::Internal(format!("commit orphan book delete: {e}")))?;
                deleted_books += 1;
                continue;
            }

            let mut any_deleted = false;
            for (file_id, file_path) in self.store.files().list_paths_for_book(book_id).await? {
                if Path::new(&file_path).exists() {
                    continue;
                }
                let mut tx = self.store.begin().await?;
                self.store.files().delete(&mut tx, file_id).await?;
                tx.commit()
                    .await
                    .map_err(|e| crate::error::LibraryError::Internal(format!("commit orphan file delete: {e}")))?;
                deleted_files += 1;
                any_deleted = true;
            }

            if any_deleted && self.store.files().count_for_book(book_id).await? == 0 {
                let mut tx = self.store.begin().await?;
                self.store.books().delete(&mut tx, book_id).await?;
                tx.commit()
                    .await
                    .map_err(|e| crate::error::LibraryError::Internal(format!("commit orphan book delete: {e}")))?;
                deleted_books += 1;
            }
        }

        Ok((deleted_files, deleted_books))
    }

    async fn delete_all_files(&self, book_id: BookId) -> Result<u64> {
        let files = self.store.files().list_paths_for_book(book_id).await?;
        let count = files.len() as u64;
        for (file_id, _) in files {
            let mut tx = self.store.begin().await?;
            self.store.files().delete(&mut tx, file_id).await?;
            tx.commit()
                .await
                .map_err(|e| crate::error::LibraryError::Internal(format!("commit orphan file delete: {e}")))?;
        }
        Ok(count)
    }
}

/// Weights each library's contribution to overall progress by its already-
/// completed libraries plus the fraction done of the one in flight — a
/// per-library `processed/total` alone would make progress regress to 0%
/// at the start of every library after the first.
fn overall_percent(libraries_done: usize, total_libraries: usize, processed: usize, total: usize) -> u8 {
    let denom = total_libraries.max(1) as f64;
    let fraction_of_current = if total == 0 { 1.0 } else { processed as f64 / total as f64 };
    let overall = (libraries_done as f64 + fraction_of_current) / denom;
    (overall * 100.0).clamp(0.0, 100.0) as u8
}

// `ScanDriver` itself is constructed from a live `Store` (a `PgPool`
// wrapper), so exercising `run`/`run_library` end to end — including the
// cancellation path added above — needs a real Postgres fixture in the
// style of the teacher's `#[sqlx::test(migrator = "crate::MIGRATOR")]`
// tests. This crate doesn't carry migrations or a `MIGRATOR` yet, so that
// integration coverage is left to the host application's test suite; the
// cancellation contract itself (workers stop draining, a per-file
// checkpoint reports `Cancelled` instead of completing) is covered directly
// in `worker_pool`'s tests and `scanner`'s `FileOutcome::Cancelled` checks.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_percent_is_zero_at_the_very_start() {
        assert_eq!(overall_percent(0, 3, 0, 100), 0);
    }

    #[test]
    fn overall_percent_does_not_regress_across_libraries() {
        // Finishing library 1 of 3 should read higher than any point inside
        // library 0, even though `processed/total` resets to near 0.
        let end_of_first = overall_percent(0, 3, 100, 100);
        let start_of_second = overall_percent(1, 3, 1, 100);
        assert!(start_of_second >= end_of_first, "{start_of_second} should be >= {end_of_first}");
    }

    #[test]
    fn overall_percent_reaches_100_on_the_last_library() {
        assert_eq!(overall_percent(2, 3, 100, 100), 100);
    }

    #[test]
    fn overall_percent_handles_an_empty_library_as_fully_done() {
        assert_eq!(overall_percent(0, 1, 0, 0), 100);
    }
}
