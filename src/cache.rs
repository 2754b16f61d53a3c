use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use super::client::{FetchError, TreeSource};
use super::protocol::TreeEntry;

/// Entries of one successful fetch together with the moment it started.
/// Swapped in as a whole so readers never see a mismatched pair.
#[derive(Debug)]
struct Snapshot {
    entries: Arc<Vec<TreeEntry>>,
    fetched_at: Instant,
}

impl Snapshot {
    fn is_usable(&self) -> bool {
        !self.entries.is_empty()
    }
}

/// A tree handed out by the cache.
#[derive(Debug, Clone)]
pub struct Tree {
    pub entries: Arc<Vec<TreeEntry>>,
    /// True when served from a previous fetch, fresh or stale.
    pub cached: bool,
}

/// Single-slot, time-bounded cache of the upstream tree listing.
///
/// Refreshes happen lazily on the calling request. Two requests that both
/// see an expired slot both fetch; the last one to finish wins the slot.
pub struct TreeCache {
    source: Box<dyn TreeSource>,
    ttl: Duration,
    slot: RwLock<Option<Arc<Snapshot>>>,
}

impl TreeCache {
    pub fn new<S: TreeSource + 'static>(source: S, ttl: Duration) -> Self {
        Self {
            source: Box::new(source),
            ttl,
            slot: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn current(&self) -> Option<Arc<Snapshot>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, snapshot: Snapshot) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(snapshot));
    }

    /// Returns the current tree, refreshing it from upstream once it expired.
    ///
    /// With `allow_stale_fallback`, a failed refresh is masked by the last
    /// good snapshot when one exists.
    pub async fn get_tree(&self, allow_stale_fallback: bool) -> Result<Tree, FetchError> {
        // Fast path
        if let Some(snapshot) = self.current().filter(|s| s.is_usable()) {
            if snapshot.fetched_at.elapsed() < self.ttl {
                return Ok(Tree {
                    entries: snapshot.entries.clone(),
                    cached: true,
                });
            }
        }

        // Refresh
        let started = Instant::now();
        match self.source.fetch().await {
            Ok(entries) => {
                let entries = Arc::new(entries);
                self.store(Snapshot {
                    entries: entries.clone(),
                    fetched_at: started,
                });
                log::info!("Refreshed tree cache with {} entries", entries.len());
                Ok(Tree {
                    entries,
                    cached: false,
                })
            }
            Err(err) => {
                if allow_stale_fallback {
                    if let Some(snapshot) = self.current().filter(|s| s.is_usable()) {
                        log::warn!("Serving stale tree after failed refresh: {}", err);
                        return Ok(Tree {
                            entries: snapshot.entries.clone(),
                            cached: true,
                        });
                    }
                }
                log::error!("Tree refresh failed: {}", err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted source: replays queued results, repeating the last one.
    #[derive(Clone)]
    pub(crate) struct FakeSource {
        script: Arc<Mutex<VecDeque<Result<Vec<TreeEntry>, FetchError>>>>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeSource {
        pub(crate) fn new(results: Vec<Result<Vec<TreeEntry>, FetchError>>) -> Self {
            Self {
                script: Arc::new(Mutex::new(results.into())),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn ok(paths: &[&str]) -> Self {
            Self::new(vec![Ok(entries(paths))])
        }

        pub(crate) fn failing() -> Self {
            Self::new(vec![Err(FetchError::Transport("connection refused".into()))])
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TreeSource for FakeSource {
        async fn fetch(&self) -> Result<Vec<TreeEntry>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    pub(crate) fn entries(paths: &[&str]) -> Vec<TreeEntry> {
        paths.iter().map(|p| TreeEntry::blob(p)).collect()
    }

    fn rate_limited() -> FetchError {
        FetchError::Status {
            status: 403,
            body: "rate limited".into(),
        }
    }

    const TTL: Duration = Duration::from_secs(300);

    #[tokio::test(start_paused = true)]
    async fn serves_from_cache_within_ttl() {
        let source = FakeSource::ok(&["A/1.0/gen/index.html"]);
        let cache = TreeCache::new(source.clone(), TTL);

        let first = cache.get_tree(false).await.unwrap();
        assert!(!first.cached);

        tokio::time::advance(Duration::from_secs(299)).await;
        let second = cache.get_tree(false).await.unwrap();
        assert!(second.cached);
        assert_eq!(first.entries, second.entries);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_triggers_refresh() {
        let source = FakeSource::new(vec![
            Ok(entries(&["A/1.0/gen/index.html"])),
            Ok(entries(&["B/2.0/gen/index.html"])),
        ]);
        let cache = TreeCache::new(source.clone(), TTL);

        cache.get_tree(false).await.unwrap();
        tokio::time::advance(TTL).await;
        let refreshed = cache.get_tree(false).await.unwrap();

        assert!(!refreshed.cached);
        assert_eq!(*refreshed.entries, entries(&["B/2.0/gen/index.html"]));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_fallback_masks_upstream_failure() {
        let source = FakeSource::new(vec![
            Ok(entries(&["A/1.0/gen/index.html"])),
            Err(rate_limited()),
        ]);
        let cache = TreeCache::new(source.clone(), TTL);
        cache.get_tree(false).await.unwrap();
        tokio::time::advance(TTL + Duration::from_secs(1)).await;

        let stale = cache.get_tree(true).await.unwrap();
        assert!(stale.cached);
        assert_eq!(*stale.entries, entries(&["A/1.0/gen/index.html"]));

        let err = cache.get_tree(false).await.unwrap_err();
        assert_eq!(err, rate_limited());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn failure_without_snapshot_propagates() {
        let cache = TreeCache::new(FakeSource::failing(), TTL);
        let err = cache.get_tree(true).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_failed_refresh() {
        let source = FakeSource::new(vec![
            Ok(entries(&["A/1.0/gen/index.html"])),
            Err(rate_limited()),
            Ok(entries(&["B/1.0/gen/index.html"])),
        ]);
        let cache = TreeCache::new(source.clone(), TTL);
        cache.get_tree(false).await.unwrap();
        tokio::time::advance(TTL).await;

        assert!(cache.get_tree(false).await.is_err());
        let refreshed = cache.get_tree(true).await.unwrap();
        assert!(!refreshed.cached);
        assert_eq!(*refreshed.entries, entries(&["B/1.0/gen/index.html"]));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn empty_listing_is_not_served_from_cache() {
        let source = FakeSource::new(vec![Ok(Vec::new())]);
        let cache = TreeCache::new(source.clone(), TTL);

        assert!(cache.get_tree(true).await.unwrap().entries.is_empty());
        assert!(!cache.get_tree(true).await.unwrap().cached);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_both_fetch() {
        let source = FakeSource::ok(&["A/1.0/gen/index.html"]);
        let cache = TreeCache::new(source.clone(), TTL);

        let (a, b) = tokio::join!(cache.get_tree(false), cache.get_tree(false));
        assert!(!a.unwrap().cached);
        assert!(!b.unwrap().cached);
        assert_eq!(source.calls(), 2);

        assert!(cache.get_tree(false).await.unwrap().cached);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_see_whole_snapshots() {
        let first = entries(&[
            "A/1.0/gen/index.html",
            "A/1.0/gen/other.html",
            "A/1.0/gen/more.html",
        ]);
        let second = entries(&[
            "B/2.0/gen/index.html",
            "B/2.0/gen/other.html",
            "B/2.0/gen/more.html",
        ]);
        let source = FakeSource::new(vec![Ok(first.clone()), Ok(second.clone())]);
        let cache = Arc::new(TreeCache::new(source, Duration::ZERO));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_tree(true).await.unwrap() })
            })
            .collect();
        for task in tasks {
            let tree = task.await.unwrap();
            assert!(*tree.entries == first || *tree.entries == second);
        }
    }
}
