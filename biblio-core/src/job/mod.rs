//! Thin orchestration layer tying [`JobRepository`](crate::store::JobRepository)
//! to the [`ScanDriver`]: a host process calls [`JobController::request_scan`]
//! / [`JobController::run_next`] instead of juggling the repository and
//! driver separately.

use std::path::PathBuf;
use std::sync::Arc;

use biblio_model::{Job, JobId, JobStatus, LibraryId};
use tracing::{error, info};

use crate::config::ScanEngineConfig;
use crate::error::Result;
use crate::scan::{ScanDriver, ScanFlags, ScanSummary};
use crate::store::postgres::Store;

/// Resolves a library id to the directory the driver should walk, or every
/// registered library and its root when `None`. Left as a trait rather than
/// a concrete lookup: library registration (creating libraries, naming
/// their roots) is a host-application concern this crate doesn't model —
/// spec.md §1 puts HTTP handlers and the rest of the app out of scope.
pub trait LibraryRootResolver: Send + Sync {
    fn roots_for(&self, library_id: Option<LibraryId>) -> Vec<(LibraryId, PathBuf)>;
}

pub struct JobController<R> {
    store: Store,
    config: ScanEngineConfig,
    roots: Arc<R>,
    process_id: String,
}

impl<R: LibraryRootResolver> JobController<R> {
    pub fn new(store: Store, config: ScanEngineConfig, roots: Arc<R>, process_id: String) -> Self {
        Self { store, config, roots, process_id }
    }

    pub async fn request_scan(&self, library_id: Option<LibraryId>) -> Result<Job> {
        self.store.jobs().enqueue_scan(library_id).await
    }

    pub async fn request_cancel(&self, job_id: JobId) -> Result<()> {
        self.store.jobs().request_cancel(job_id).await
    }

    /// Claims the oldest pending scan job, if any, and drives it to
    /// completion. Returns `Ok(None)` when there was nothing to claim —
    /// callers poll this on an interval rather than blocking on a queue.
    pub async fn run_next(&self) -> Result<Option<ScanSummary>> {
        let Some(job) = self.store.jobs().claim_oldest_pending_scan(&self.process_id).await? else {
            return Ok(None);
        };

        let library_roots = self.roots.roots_for(job.library_id);
        let force_refresh = self.config.forces_refresh_over(last_scan_version(&job));
        let flags = ScanFlags { force_refresh, is_resync: false };

        let driver = ScanDriver::new(
            self.store.clone(),
            self.config.allowed_extensions.clone(),
            self.config.effective_worker_count(),
        );

        info!(job_id = %job.id, libraries = library_roots.len(), force_refresh, "starting scan job");
        match driver.run(job.id, &library_roots, flags).await {
            Ok(summary) => {
                let data = scan_summary_to_json(&summary, self.config.scan_version);
                self.store.jobs().complete(job.id, JobStatus::Completed, data).await?;
                Ok(Some(summary))
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "scan job failed");
                self.store
                    .jobs()
                    .complete(job.id, JobStatus::Failed, serde_json::json!({ "error": e.to_string() }))
                    .await?;
                Err(e)
            }
        }
    }
}

fn last_scan_version(job: &Job) -> Option<u32> {
    job.data.get("last_scan_version").and_then(|v| v.as_u64()).map(|v| v as u32)
}

fn scan_summary_to_json(summary: &ScanSummary, scan_version: u32) -> serde_json::Value {
    serde_json::json!({
        "last_scan_version": scan_version,
        "libraries": summary.libraries.iter().map(|(id, s)| serde_json::json!({
            "library_id": id,
            "summary": s,
        })).collect::<Vec<_>>(),
    })
}
