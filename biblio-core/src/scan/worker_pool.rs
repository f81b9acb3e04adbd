//! Fixed-size worker pool: a bounded path channel feeds `N` tasks, each
//! invoking the scan closure and forwarding its result on an unbounded
//! result channel for the driver to drain.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Clamps the configured worker count into `[4, cpu_count]`, defaulting to
/// the machine's CPU count when unconfigured.
pub fn worker_count(configured: Option<usize>, cpu_count: usize) -> usize {
    let n = configured.unwrap_or(cpu_count);
    n.clamp(4, cpu_count.max(4))
}

pub struct WorkerPool<R> {
    result_tx: mpsc::UnboundedSender<R>,
    result_rx: Option<mpsc::UnboundedReceiver<R>>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl<R: Send + 'static> WorkerPool<R> {
    /// Spawns `workers` tasks pulling from `paths` (shared behind a mutex so
    /// every worker competes for the next item) until the channel drains or
    /// `cancel` fires — a cancelled worker stops draining new paths and
    /// returns without waiting for the channel to empty (spec.md §4.5 point
    /// 4). A panic inside `scan_one` is caught and converted via `on_panic`
    /// rather than killing the worker task.
    pub fn spawn<F, Fut>(
        workers: usize,
        paths: mpsc::Receiver<PathBuf>,
        cancel: CancellationToken,
        scan_one: F,
        on_panic: impl Fn(PathBuf) -> R + Send + Sync + 'static,
    ) -> Self
    where
        F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let paths = Arc::new(Mutex::new(paths));
        let scan_one = Arc::new(scan_one);
        let on_panic = Arc::new(on_panic);

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let paths = paths.clone();
            let scan_one = scan_one.clone();
            let on_panic = on_panic.clone();
            let result_tx = result_tx.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }

                    let next = {
                        let mut guard = paths.lock().await;
                        guard.recv().await
                    };
                    let Some(path) = next else { break };

                    let outcome = match AssertUnwindSafe(scan_one(path.clone())).catch_unwind().await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            error!(path = %path.display(), "worker panicked while scanning file");
                            on_panic(path)
                        }
                    };

                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
            }));
        }

        Self { result_tx, result_rx: Some(result_rx), handles }
    }

    pub fn take_results(&mut self) -> mpsc::UnboundedReceiver<R> {
        self.result_rx.take().expect("results already taken")
    }

    /// Drops the pool's own result sender, then waits for every worker to
    /// exit — the receiver observes EOF once in-flight sends have landed.
    pub async fn join(self) {
        drop(self.result_tx);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task failed to join");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn panicking_task_degrades_to_fallback_instead_of_killing_the_pool() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(PathBuf::from("/lib/ok-1.epub")).await.unwrap();
        tx.send(PathBuf::from("/lib/boom.epub")).await.unwrap();
        tx.send(PathBuf::from("/lib/ok-2.epub")).await.unwrap();
        drop(tx);

        let mut pool = WorkerPool::spawn(
            4,
            rx,
            CancellationToken::new(),
            |path| async move {
                if path == PathBuf::from("/lib/boom.epub") {
                    panic!("simulated worker panic");
                }
                format!("scanned {}", path.display())
            },
            |path| format!("panicked on {}", path.display()),
        );

        let mut results = pool.take_results();
        let mut seen = Vec::new();
        while let Some(r) = results.recv().await {
            seen.push(r);
        }
        pool.join().await;

        assert_eq!(seen.len(), 3);
        assert!(seen.contains(&"panicked on /lib/boom.epub".to_string()));
        assert!(seen.contains(&"scanned /lib/ok-1.epub".to_string()));
        assert!(seen.contains(&"scanned /lib/ok-2.epub".to_string()));
    }

    #[tokio::test]
    async fn cancelled_token_stops_workers_from_draining_further_paths() {
        let (tx, rx) = mpsc::channel(8);
        for i in 0..8 {
            tx.send(PathBuf::from(format!("/lib/{i}.epub"))).await.unwrap();
        }
        drop(tx);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut pool = WorkerPool::spawn(
            4,
            rx,
            cancel,
            |_path| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                "should not run".to_string()
            },
            |_path| "panicked".to_string(),
        );

        let mut results = pool.take_results();
        let mut seen = Vec::new();
        while let Some(r) = results.recv().await {
            seen.push(r);
        }
        pool.join().await;

        assert!(seen.is_empty(), "a pre-cancelled token must stop every worker before it pulls a path");
    }
}
