//! The scan engine: per-file reconciliation (`scanner`), the bounded worker
//! pool that runs it concurrently (`worker_pool`), and the per-library
//! driver that walks, dispatches, and sweeps orphans (`driver`).

pub mod driver;
pub mod scanner;
pub mod worker_pool;

pub use driver::{LibrarySummary, ScanDriver, ScanSummary};
pub use scanner::{FileOutcome, FileScanner, ScanFlags};
pub use worker_pool::{worker_count, WorkerPool};
