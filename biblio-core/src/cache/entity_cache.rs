//! Shared entity cache: collapses hundreds of repeated find-or-create calls
//! for the same author/genre/tag/series name into one database round trip
//! per scan run.

use std::sync::Arc;

use async_trait::async_trait;
use biblio_model::{Genre, LibraryId, Person, Series, Tag};
use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::error::Result;

/// Resolves a name to a persisted entity, creating it if absent. Implemented
/// by the postgres store; the cache itself never talks to the database.
#[async_trait]
pub trait PersonFinder: Send + Sync {
    async fn find_or_create(&self, name: &str, library_id: LibraryId) -> Result<Person>;
}

#[async_trait]
pub trait GenreFinder: Send + Sync {
    async fn find_or_create(&self, name: &str, library_id: LibraryId) -> Result<Genre>;
}

#[async_trait]
pub trait TagFinder: Send + Sync {
    async fn find_or_create(&self, name: &str, library_id: LibraryId) -> Result<Tag>;
}

#[async_trait]
pub trait SeriesFinder: Send + Sync {
    async fn find_or_create(&self, name: &str, library_id: LibraryId) -> Result<Series>;
}

type CacheKey = (String, LibraryId);
type Cell<T> = Arc<OnceCell<T>>;

/// Per-scan-run cache. Constructed when a scan starts, discarded when it
/// completes.
#[derive(Debug, Default)]
pub struct ScanCache {
    persons: DashMap<CacheKey, Cell<Person>>,
    genres: DashMap<CacheKey, Cell<Genre>>,
    tags: DashMap<CacheKey, Cell<Tag>>,
    series: DashMap<CacheKey, Cell<Series>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanCacheStats {
    pub persons: usize,
    pub genres: usize,
    pub tags: usize,
    pub series: usize,
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}

/// Looks up (or registers, then awaits) the `OnceCell` for `key` in `map`,
/// then drives its single initialization. The `dashmap` shard lock is only
/// ever held for the synchronous `entry` call; the async `finder` call runs
/// outside it, so unrelated keys never block each other and concurrent
/// callers for the same key share one in-flight future via `OnceCell`.
async fn get_or_create<T, F, Fut>(
    map: &DashMap<CacheKey, Cell<T>>,
    name: &str,
    library_id: LibraryId,
    init: F,
) -> Result<T>
where
    T: Clone,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let key = (fold(name), library_id);
    let cell = map.entry(key).or_insert_with(|| Arc::new(OnceCell::new())).clone();
    cell.get_or_try_init(init).await.cloned()
}

impl ScanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create_person(
        &self,
        name: &str,
        library_id: LibraryId,
        finder: &dyn PersonFinder,
    ) -> Result<Person> {
        get_or_create(&self.persons, name, library_id, || {
            finder.find_or_create(name, library_id)
        })
        .await
    }

    pub async fn get_or_create_genre(
        &self,
        name: &str,
        library_id: LibraryId,
        finder: &dyn GenreFinder,
    ) -> Result<Genre> {
        get_or_create(&self.genres, name, library_id, || {
            finder.find_or_create(name, library_id)
        })
        .await
    }

    pub async fn get_or_create_tag(
        &self,
        name: &str,
        library_id: LibraryId,
        finder: &dyn TagFinder,
    ) -> Result<Tag> {
        get_or_create(&self.tags, name, library_id, || {
            finder.find_or_create(name, library_id)
        })
        .await
    }

    pub async fn get_or_create_series(
        &self,
        name: &str,
        library_id: LibraryId,
        finder: &dyn SeriesFinder,
    ) -> Result<Series> {
        get_or_create(&self.series, name, library_id, || {
            finder.find_or_create(name, library_id)
        })
        .await
    }

    /// End-of-scan observability: entry counts per submap, for job logging.
    pub fn stats(&self) -> ScanCacheStats {
        ScanCacheStats {
            persons: self.persons.len(),
            genres: self.genres.len(),
            tags: self.tags.len(),
            series: self.series.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biblio_model::PersonId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingFinder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PersonFinder for CountingFinder {
        async fn find_or_create(&self, name: &str, library_id: LibraryId) -> Result<Person> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Person {
                id: PersonId::new(),
                library_id,
                name: name.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn concurrent_same_key_calls_finder_once() {
        let cache = ScanCache::new();
        let finder = CountingFinder { calls: AtomicUsize::new(0) };
        let lib = LibraryId::new();

        let results = futures::future::join_all((0..16).map(|_| {
            cache.get_or_create_person("J. R. R. Tolkien", lib, &finder)
        }))
        .await;

        for r in &results {
            assert!(r.is_ok());
        }
        assert_eq!(finder.calls.load(Ordering::SeqCst), 1);

        let first_id = results[0].as_ref().unwrap().id;
        assert!(results.iter().all(|r| r.as_ref().unwrap().id == first_id));
    }

    #[tokio::test]
    async fn case_folding_is_applied_to_the_key() {
        let cache = ScanCache::new();
        let finder = CountingFinder { calls: AtomicUsize::new(0) };
        let lib = LibraryId::new();

        let a = cache.get_or_create_person("Tolkien", lib, &finder).await.unwrap();
        let b = cache.get_or_create_person("TOLKIEN", lib, &finder).await.unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(finder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_serialize() {
        let cache = ScanCache::new();
        let finder = CountingFinder { calls: AtomicUsize::new(0) };
        let lib = LibraryId::new();

        let start = std::time::Instant::now();
        let _ = futures::future::join_all(
            ["A", "B", "C", "D"].iter().map(|n| cache.get_or_create_person(n, lib, &finder)),
        )
        .await;
        // Four distinct 20ms lookups running concurrently should take much
        // less than 4 * 20ms if they are not serialized against each other.
        assert!(start.elapsed() < Duration::from_millis(70));
        assert_eq!(finder.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn stats_count_distinct_entries() {
        let cache = ScanCache::new();
        let finder = CountingFinder { calls: AtomicUsize::new(0) };
        let lib = LibraryId::new();
        let _ = cache.get_or_create_person("A", lib, &finder).await.unwrap();
        let _ = cache.get_or_create_person("B", lib, &finder).await.unwrap();
        let _ = cache.get_or_create_person("a", lib, &finder).await.unwrap();
        assert_eq!(cache.stats().persons, 2);
    }
}
