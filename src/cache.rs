//! Two-level resource cache: endpoint URL -> resource key -> entry.
//!
//! Only [`CacheStore::dispatch`] mutates the store. Keying by URL first means
//! data fetched from one cluster is never read back while another is active.

use serde::Serialize;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FetchStatus {
    Idle,
    Fetching,
    Fetched,
    FetchFailed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CacheEntry<T> {
    pub status: FetchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> CacheEntry<T> {
    pub fn idle() -> Self {
        Self {
            status: FetchStatus::Idle,
            data: None,
            error: None,
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.status == FetchStatus::Fetching
    }
}

#[derive(Clone, Debug)]
pub enum CacheAction<T> {
    Update {
        url: String,
        key: String,
        status: FetchStatus,
        data: Option<T>,
        error: Option<String>,
    },
    Clear {
        url: String,
    },
}

impl<T> CacheAction<T> {
    pub fn fetching(url: &str, key: &str) -> Self {
        CacheAction::Update {
            url: url.to_string(),
            key: key.to_string(),
            status: FetchStatus::Fetching,
            data: None,
            error: None,
        }
    }

    pub fn fetched(url: &str, key: &str, data: T) -> Self {
        CacheAction::Update {
            url: url.to_string(),
            key: key.to_string(),
            status: FetchStatus::Fetched,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(url: &str, key: &str, error: impl Into<String>) -> Self {
        CacheAction::Update {
            url: url.to_string(),
            key: key.to_string(),
            status: FetchStatus::FetchFailed,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn clear(url: &str) -> Self {
        CacheAction::Clear {
            url: url.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct CacheStore<T> {
    by_url: HashMap<String, HashMap<String, CacheEntry<T>>>,
}

impl<T> Default for CacheStore<T> {
    fn default() -> Self {
        Self {
            by_url: HashMap::new(),
        }
    }
}

impl<T> CacheStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(&mut self, action: CacheAction<T>) {
        match action {
            CacheAction::Update {
                url,
                key,
                status,
                data,
                error,
            } => {
                // data only survives on Fetched, error only on FetchFailed
                let entry = CacheEntry {
                    status,
                    data: if status == FetchStatus::Fetched { data } else { None },
                    error: if status == FetchStatus::FetchFailed { error } else { None },
                };
                self.by_url.entry(url).or_default().insert(key, entry);
            }
            CacheAction::Clear { url } => {
                self.by_url.insert(url, HashMap::new());
            }
        }
    }

    pub fn get(&self, url: &str, key: &str) -> Option<&CacheEntry<T>> {
        self.by_url.get(url)?.get(key)
    }

    pub fn keys(&self, url: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .by_url
            .get(url)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn len(&self, url: &str) -> usize {
        self.by_url.get(url).map_or(0, |m| m.len())
    }
}
