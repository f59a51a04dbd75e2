//! A concurrent, TTL-indexed key/value store with a background sweeper and
//! an expired-entry callback.
//!
//! Mirrors the `patrickmn/go-cache`-style cache the original agent used:
//! `Set`/`Add`/`Get`/`Refresh`/`Delete` plus a janitor task that runs
//! `DeleteExpired` on an interval and fans the removed entries out to a
//! registered handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::task::JoinHandle;

/// Sentinel duration meaning "use the cache's configured default expiration".
pub const DEFAULT_EXPIRATION: Duration = Duration::ZERO;

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if at <= Instant::now())
    }
}

type ExpiredHandler<V> = dyn Fn(HashMap<String, V>) + Send + Sync;

struct Inner<V> {
    items: RwLock<HashMap<String, Entry<V>>>,
    default_expiration: Duration,
    expired_handler: RwLock<Option<Arc<ExpiredHandler<V>>>>,
}

/// A `Cache<V>` may be cloned cheaply; clones share the same backing store
/// and sweeper task.
pub struct Cache<V> {
    inner: Arc<Inner<V>>,
    sweeper: Option<Arc<JoinHandle<()>>>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            sweeper: self.sweeper.clone(),
        }
    }
}

impl<V> Drop for Cache<V> {
    fn drop(&mut self) {
        // The sweeper is only aborted once the last handle (including the
        // one retained internally to keep it alive) is dropped.
        if let Some(sweeper) = self.sweeper.take() {
            if Arc::strong_count(&sweeper) == 1 {
                sweeper.abort();
            }
        }
    }
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache with the given default expiration and cleanup
    /// interval. A `cleanup_interval` of zero (or less) disables the
    /// sweeper: expired entries become invisible to `get` immediately but
    /// are only actually removed from storage by an explicit `delete` or a
    /// later `sweep_now`.
    pub fn new(default_expiration: Duration, cleanup_interval: Duration) -> Self {
        let inner = Arc::new(Inner {
            items: RwLock::new(HashMap::new()),
            default_expiration,
            expired_handler: RwLock::new(None),
        });

        let sweeper = if cleanup_interval > Duration::ZERO {
            let inner = inner.clone();
            Some(Arc::new(tokio::spawn(Self::run_sweeper(
                inner,
                cleanup_interval,
            ))))
        } else {
            None
        };

        Self { inner, sweeper }
    }

    async fn run_sweeper(inner: Arc<Inner<V>>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            Self::sweep(&inner);
        }
    }

    fn sweep(inner: &Arc<Inner<V>>) {
        let expired = {
            let mut items = inner.items.write();
            let expired_keys: Vec<String> = items
                .iter()
                .filter(|(_, e)| e.expired())
                .map(|(k, _)| k.clone())
                .collect();
            if expired_keys.is_empty() {
                return;
            }
            expired_keys
                .into_iter()
                .filter_map(|k| items.remove(&k).map(|e| (k, e.value)))
                .collect::<HashMap<_, _>>()
        };

        if expired.is_empty() {
            return;
        }

        if let Some(handler) = inner.expired_handler.read().clone() {
            tokio::spawn(async move { handler(expired) });
        }
    }

    /// Install a callback invoked once per sweep with the map of removed
    /// entries, whenever a sweep actually removes something. Runs on a
    /// task disjoint from the sweeper's lock acquisition.
    pub fn register_expired_handler<F>(&self, f: F)
    where
        F: Fn(HashMap<String, V>) + Send + Sync + 'static,
    {
        *self.inner.expired_handler.write() = Some(Arc::new(f));
    }

    fn resolve_expiration(&self, d: Duration) -> Option<Instant> {
        let d = if d == DEFAULT_EXPIRATION {
            self.inner.default_expiration
        } else {
            d
        };
        if d > Duration::ZERO {
            Some(Instant::now() + d)
        } else {
            None
        }
    }

    /// Replaces any existing entry for `k`.
    pub fn set(&self, k: impl Into<String>, v: V, d: Duration) {
        let expires_at = self.resolve_expiration(d);
        self.inner.items.write().insert(
            k.into(),
            Entry {
                value: v,
                expires_at,
            },
        );
    }

    /// `set` using the cache's configured default expiration.
    pub fn set_default(&self, k: impl Into<String>, v: V) {
        self.set(k, v, DEFAULT_EXPIRATION);
    }

    /// As `set`, but fails if a non-expired entry for `k` already exists.
    pub fn add(&self, k: impl Into<String>, v: V, d: Duration) -> Result<(), super::Error> {
        let k = k.into();
        let mut items = self.inner.items.write();
        if matches!(items.get(&k), Some(e) if !e.expired()) {
            return Err(super::Error::KeyConflict(k));
        }
        let expires_at = self.resolve_expiration(d);
        items.insert(
            k,
            Entry {
                value: v,
                expires_at,
            },
        );
        Ok(())
    }

    /// Returns the value for `k` if a non-expired entry exists.
    pub fn get(&self, k: &str) -> Option<V> {
        let items = self.inner.items.read();
        match items.get(k) {
            Some(e) if !e.expired() => Some(e.value.clone()),
            _ => None,
        }
    }

    /// If a non-expired entry exists for `k`, updates its expiration as
    /// `set` would and returns `true`. Otherwise returns `false` without
    /// inserting anything.
    pub fn refresh(&self, k: &str, d: Duration) -> bool {
        let mut items = self.inner.items.write();
        match items.get_mut(k) {
            Some(e) if !e.expired() => {
                e.expires_at = self.resolve_expiration(d);
                true
            }
            _ => false,
        }
    }

    /// Removes `k` unconditionally. Idempotent.
    pub fn delete(&self, k: &str) {
        self.inner.items.write().remove(k);
    }

    /// Snapshot view of all entries, including any expired-but-unswept ones.
    pub fn items(&self) -> Vec<(String, V)> {
        self.inner
            .items
            .read()
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Live (non-expired) entries only.
    pub fn live_items(&self) -> Vec<(String, V)> {
        self.inner
            .items
            .read()
            .iter()
            .filter(|(_, e)| !e.expired())
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Length of the underlying map; may include expired-but-unswept entries.
    pub fn item_count(&self) -> usize {
        self.inner.items.read().len()
    }

    /// Removes everything.
    pub fn flush(&self) {
        self.inner.items.write().clear();
    }

    /// Forces an immediate sweep, as the background janitor would. Exposed
    /// for tests that don't want to wait on the interval.
    pub fn sweep_now(&self) {
        Self::sweep(&self.inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn set_get_roundtrip() {
        let cache: Cache<i32> = Cache::new(Duration::ZERO, Duration::ZERO);
        cache.set("a", 1, DEFAULT_EXPIRATION);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn add_fails_on_conflict() {
        let cache: Cache<i32> = Cache::new(Duration::ZERO, Duration::ZERO);
        cache.set("a", 1, DEFAULT_EXPIRATION);
        assert!(cache.add("a", 2, DEFAULT_EXPIRATION).is_err());
        assert_eq!(cache.get("a"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_invisible_before_sweep() {
        let cache: Cache<i32> = Cache::new(Duration::ZERO, Duration::ZERO);
        cache.set("a", 1, Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(cache.get("a"), None);
        // still present in storage (unswept)
        assert_eq!(cache.item_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_extends_expiration() {
        let cache: Cache<i32> = Cache::new(Duration::from_millis(100), Duration::ZERO);
        cache.set_default("a", 1);
        tokio::time::advance(Duration::from_millis(80)).await;
        assert!(cache.refresh("a", DEFAULT_EXPIRATION));
        tokio::time::advance(Duration::from_millis(80)).await;
        assert_eq!(cache.get("a"), Some(1));
    }

    #[test]
    fn refresh_returns_false_without_inserting() {
        let cache: Cache<i32> = Cache::new(Duration::ZERO, Duration::ZERO);
        assert!(!cache.refresh("missing", DEFAULT_EXPIRATION));
        assert_eq!(cache.item_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_invokes_handler_only_when_something_expired() {
        let cache: Cache<i32> = Cache::new(Duration::ZERO, Duration::from_millis(10));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(AtomicUsize::new(0));
        {
            let calls = calls.clone();
            let seen = seen.clone();
            cache.register_expired_handler(move |expired| {
                calls.fetch_add(1, Ordering::SeqCst);
                seen.fetch_add(expired.len(), Ordering::SeqCst);
            });
        }

        // No entries yet: a sweep tick should not invoke the handler.
        tokio::time::advance(Duration::from_millis(15)).await;
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        cache.set("a", 1, Duration::from_millis(5));
        tokio::time::advance(Duration::from_millis(15)).await;
        // allow the spawned handler task to run
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let cache: Cache<i32> = Cache::new(Duration::ZERO, Duration::ZERO);
        cache.delete("missing");
        cache.set("a", 1, DEFAULT_EXPIRATION);
        cache.delete("a");
        cache.delete("a");
        assert_eq!(cache.get("a"), None);
    }
}
