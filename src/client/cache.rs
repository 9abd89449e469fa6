use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::http::HttpResponse;
use crate::template::functions::sha256_hex;

/// Expiry used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Cached response with its expiry.
struct CacheEntry {
    response: HttpResponse,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory response cache shared by every execution of a client.
///
/// Expired entries are dropped lazily when looked up.
pub struct ResponseCache {
    data: RwLock<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<HttpResponse> {
        {
            let store = self.data.read().await;
            match store.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.response.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Stale: re-check under the write lock, another writer may have
        // refreshed the entry in between.
        let mut store = self.data.write().await;
        match store.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.response.clone()),
            Some(_) => {
                store.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn insert(&self, key: impl Into<String>, response: HttpResponse, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let entry = CacheEntry {
            response,
            expires_at,
        };
        self.data.write().await.insert(key.into(), entry);
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.data.write().await.remove(key).is_some()
    }

    pub async fn clear(&self) {
        self.data.write().await.clear();
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Default cache key: the URL, plus a SHA-256 of the body when there is one.
pub fn fingerprint(url: &str, body: &[u8]) -> String {
    if body.is_empty() {
        url.to_string()
    } else {
        format!("{url}:{}", sha256_hex(body))
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;

    fn response(body: &str) -> HttpResponse {
        HttpResponse::new(StatusCode::OK, body.to_string())
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache = ResponseCache::new();
        cache.insert("k", response("v"), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await.unwrap().text(), "v");
        assert!(cache.get("other").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_evicted() {
        let cache = ResponseCache::new();
        cache.insert("k", response("v"), Duration::from_secs(2)).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("k").await.is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let cache = ResponseCache::new();
        cache
            .insert("k", response("v"), Duration::from_secs(u64::MAX))
            .await;
        assert_eq!(cache.get("k").await.unwrap().text(), "v");
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let cache = ResponseCache::new();
        cache.insert("a", response("1"), Duration::from_secs(60)).await;
        cache.insert("b", response("2"), Duration::from_secs(60)).await;
        assert!(cache.remove("a").await);
        assert!(!cache.remove("a").await);
        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }

    #[test]
    fn test_fingerprint() {
        assert_eq!(fingerprint("http://h/p", b""), "http://h/p");
        let key = fingerprint("http://h/p", b"abc");
        assert_eq!(
            key,
            "http://h/p:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
