//! One service per data domain: a cache store plus the fetch state machine
//! `Idle -> Fetching -> Fetched | FetchFailed`.
//!
//! Each `(url, key)` carries a generation counter. A fetch only lands in the
//! cache if no newer fetch (or clear/reset) for the same pair started while
//! it was in flight, so a slow old response can't overwrite a fresh one.

use crate::cache::{CacheAction, CacheEntry, CacheStore, FetchStatus};
use crate::cluster::Cluster;
use crate::error::{ErrorKind, FetchError, FetchResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Where a fetch is aimed: the endpoint URL and the cluster it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchScope {
    pub url: String,
    pub cluster: Cluster,
}

impl FetchScope {
    pub fn new(url: impl Into<String>, cluster: Cluster) -> Self {
        Self {
            url: url.into(),
            cluster,
        }
    }
}

#[derive(Debug)]
pub struct ReportContext<'a> {
    pub resource: &'a str,
    pub key: &'a str,
    pub url: &'a str,
    pub cluster: Cluster,
}

/// External error-tracking collaborator.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, ctx: &ReportContext<'_>, error: &FetchError);
}

/// Default reporter: error-level log line under `solx::report`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, ctx: &ReportContext<'_>, error: &FetchError) {
        log::error!(
            target: "solx::report",
            "{} [{}] on {} ({}): {error}",
            ctx.resource,
            ctx.key,
            ctx.cluster,
            ctx.url
        );
    }
}

/// Lookup misses and bad input are expected; user-supplied endpoints are
/// never reported.
pub fn should_report(cluster: Cluster, error: &FetchError) -> bool {
    if cluster == Cluster::Custom {
        return false;
    }
    matches!(error.kind(), ErrorKind::Transient | ErrorKind::Unexpected)
}

pub type SubscriptionId = u64;

type Listener<T> = Arc<dyn Fn(&str, &CacheEntry<T>) + Send + Sync>;

struct Inner<T> {
    store: CacheStore<T>,
    generations: HashMap<(String, String), u64>,
    next_generation: u64,
}

impl<T> Inner<T> {
    fn bump(&mut self, url: &str, key: &str) -> u64 {
        self.next_generation += 1;
        let g = self.next_generation;
        self.generations.insert((url.to_string(), key.to_string()), g);
        g
    }

    fn is_current(&self, url: &str, key: &str, generation: u64) -> bool {
        self.generations
            .get(&(url.to_string(), key.to_string()))
            .is_some_and(|g| *g == generation)
    }
}

/// Armed while a fetch future is awaited. If the caller drops the future
/// first, the entry it left in `Fetching` goes back to `Idle` so later
/// reads issue a new request.
struct InFlight<'a, T: Clone> {
    resource: &'a Resource<T>,
    url: &'a str,
    key: &'a str,
    generation: u64,
    armed: bool,
}

impl<T: Clone> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut inner = lock(&self.resource.inner);
            if !inner.is_current(self.url, self.key, self.generation) {
                return;
            }
            inner
                .generations
                .remove(&(self.url.to_string(), self.key.to_string()));
            inner.store.dispatch(CacheAction::Update {
                url: self.url.to_string(),
                key: self.key.to_string(),
                status: FetchStatus::Idle,
                data: None,
                error: None,
            });
        }
        log::debug!("[{}] fetch for {} cancelled", self.resource.name, self.key);
        self.resource.notify(self.url, self.key);
    }
}

pub struct Resource<T> {
    name: &'static str,
    inner: Mutex<Inner<T>>,
    listeners: Mutex<Vec<(SubscriptionId, String, Listener<T>)>>,
    next_subscription: AtomicU64,
    reporter: Arc<dyn ErrorReporter>,
}

fn lock<U>(m: &Mutex<U>) -> MutexGuard<'_, U> {
    // a panicking listener must not wedge the cache
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl<T: Clone> Resource<T> {
    pub fn new(name: &'static str, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            name,
            inner: Mutex::new(Inner {
                store: CacheStore::new(),
                generations: HashMap::new(),
                next_generation: 0,
            }),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            reporter,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, url: &str, key: &str) -> Option<CacheEntry<T>> {
        lock(&self.inner).store.get(url, key).cloned()
    }

    /// Last fetched data for the pair, if the entry is in `Fetched`.
    pub fn data(&self, url: &str, key: &str) -> Option<T> {
        self.get(url, key).and_then(|e| e.data)
    }

    pub fn keys(&self, url: &str) -> Vec<String> {
        lock(&self.inner).store.keys(url)
    }

    pub fn subscribe<F>(&self, key: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&str, &CacheEntry<T>) + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, key.to_string(), Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(sid, _, _)| *sid != id);
        listeners.len() != before
    }

    fn notify(&self, url: &str, key: &str) {
        let Some(entry) = self.get(url, key) else {
            return;
        };
        // snapshot so callbacks may (un)subscribe
        let targets: Vec<Listener<T>> = lock(&self.listeners)
            .iter()
            .filter(|(_, k, _)| k == key)
            .map(|(_, _, cb)| cb.clone())
            .collect();
        for cb in targets {
            cb(url, &entry);
        }
    }

    /// Run `fut` for `(scope.url, key)` through the fetch state machine.
    ///
    /// Returns the entry that landed in the cache, or `None` if a newer
    /// request for the same pair superseded this one.
    pub async fn fetch<F>(&self, scope: &FetchScope, key: &str, fut: F) -> Option<CacheEntry<T>>
    where
        F: Future<Output = FetchResult<T>>,
    {
        let generation = {
            let mut inner = lock(&self.inner);
            let g = inner.bump(&scope.url, key);
            inner.store.dispatch(CacheAction::fetching(&scope.url, key));
            g
        };
        self.notify(&scope.url, key);

        let mut in_flight = InFlight {
            resource: self,
            url: &scope.url,
            key,
            generation,
            armed: true,
        };
        let result = fut.await;
        in_flight.armed = false;
        drop(in_flight);

        let entry = {
            let mut inner = lock(&self.inner);
            if !inner.is_current(&scope.url, key, generation) {
                log::debug!(
                    "[{}] dropping stale response for {key} (generation {generation})",
                    self.name
                );
                return None;
            }
            match &result {
                Ok(data) => inner
                    .store
                    .dispatch(CacheAction::fetched(&scope.url, key, data.clone())),
                Err(e) => inner
                    .store
                    .dispatch(CacheAction::failed(&scope.url, key, e.to_string())),
            }
            inner.store.get(&scope.url, key).cloned()
        };

        if let Err(e) = &result {
            log::warn!("[{}] {key} failed: {e}", self.name);
            if should_report(scope.cluster, e) {
                self.reporter.report(
                    &ReportContext {
                        resource: self.name,
                        key,
                        url: &scope.url,
                        cluster: scope.cluster,
                    },
                    e,
                );
            }
        }
        self.notify(&scope.url, key);
        entry
    }

    /// Cached read: a `Fetched` entry is returned as is, anything else
    /// (missing, idle, failed) triggers a fetch. An entry already in
    /// `Fetching` is returned without starting a second request; a fetch
    /// whose caller went away leaves `Idle` behind, never `Fetching`.
    pub async fn ensure<F, Fut>(&self, scope: &FetchScope, key: &str, make: F) -> Option<CacheEntry<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        if let Some(entry) = self.get(&scope.url, key) {
            if matches!(entry.status, FetchStatus::Fetched | FetchStatus::Fetching) {
                return Some(entry);
            }
        }
        self.fetch(scope, key, make()).await
    }

    /// Put the pair back to `Idle`; an in-flight fetch for it is discarded.
    pub fn reset(&self, url: &str, key: &str) {
        {
            let mut inner = lock(&self.inner);
            inner.bump(url, key);
            inner.store.dispatch(CacheAction::Update {
                url: url.to_string(),
                key: key.to_string(),
                status: FetchStatus::Idle,
                data: None,
                error: None,
            });
        }
        self.notify(url, key);
    }

    /// Drop every entry under `url`; in-flight fetches for it are discarded.
    pub fn clear(&self, url: &str) {
        let mut inner = lock(&self.inner);
        inner.generations.retain(|(u, _), _| u != url);
        inner.store.dispatch(CacheAction::clear(url));
    }
}
