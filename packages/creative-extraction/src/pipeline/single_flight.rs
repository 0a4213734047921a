//! Per-run exclusion: URLs in flight and per-hash extraction locks.
//!
//! A URL is claimed before any work starts and released when the returned
//! guard drops, so cancellation and panics release the claim as well.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::types::creative::ContentHash;

/// URLs in flight within one run.
#[derive(Clone, Default)]
pub struct InFlightSet {
    urls: Arc<Mutex<HashSet<String>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.urls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `url`. Returns `None` if another processor holds it.
    pub fn try_claim(&self, url: &str) -> Option<InFlightGuard> {
        if !self.lock().insert(url.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            urls: self.urls.clone(),
            url: url.to_string(),
        })
    }

    pub fn contains(&self, url: &str) -> bool {
        self.lock().contains(url)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Releases its URL on drop.
#[must_use = "the claim is released as soon as the guard is dropped"]
pub struct InFlightGuard {
    urls: Arc<Mutex<HashSet<String>>>,
    url: String,
}

impl InFlightGuard {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.url);
    }
}

type LockMap = HashMap<ContentHash, Arc<AsyncMutex<()>>>;

/// Serializes dedup-check, extraction and dedup write per content hash, so
/// creatives with identical content reach the provider once per run.
///
/// An entry lives only while some task holds or waits for it.
#[derive(Default)]
pub struct HashLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl HashLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for exclusive use of `hash`. Released when the guard drops.
    pub async fn lock(&self, hash: &ContentHash) -> HashLockGuard {
        let lock = self.map().entry(hash.clone()).or_default().clone();
        let guard = lock.clone().lock_owned().await;
        HashLockGuard {
            locks: self.locks.clone(),
            hash: hash.clone(),
            lock,
            guard: Some(guard),
        }
    }

    /// Hashes currently held or waited on.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

/// Exclusive hold on one content hash.
#[must_use = "the hash is unlocked as soon as the guard is dropped"]
pub struct HashLockGuard {
    locks: Arc<Mutex<LockMap>>,
    hash: ContentHash,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for HashLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Map entry plus ours: nobody else holds or waits
        let idle = Arc::strong_count(&self.lock) == 2;
        let ours = locks
            .get(&self.hash)
            .is_some_and(|current| Arc::ptr_eq(current, &self.lock));
        if idle && ours {
            locks.remove(&self.hash);
        }
    }
}
