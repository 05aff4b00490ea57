//! In-memory implementations of the platform traits.
//!
//! These back the adapters outside the browser (native hosts, unit tests) and model the browser
//! behaviour the adapters depend on: cookie expiry, storage quotas and storage estimates. Each
//! type is a cheap handle over shared state, so a clone observes the same data.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use serde_json::Value;
use storekit_core::{async_trait, platform, BackendError};

use crate::cache::{CacheStore, StorageEstimate};
use crate::cookie::CookieJar;
use crate::idb::KeyValueStore;
use crate::web_storage::WebStorage;

type BackendResult<T> = std::result::Result<T, BackendError>;

/// `Storage.length` is an `unsigned long`.
fn storage_length(len: usize) -> BackendResult<u32> {
    u32::try_from(len).map_err(|_| {
        BackendError::new("RangeError", format!("{len} items do not fit a storage length"))
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave these maps half-updated.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
struct StoredCookie {
    name: String,
    value: String,
    expires: Option<SystemTime>,
}

#[derive(Debug)]
struct CookieJarState {
    hostname: String,
    cookies: Vec<StoredCookie>,
    writes: Vec<String>,
}

/// Cookie jar honouring `expires` and `max-age`.
#[derive(Debug, Clone)]
pub struct MemoryCookieJar {
    state: Arc<Mutex<CookieJarState>>,
}

impl Default for MemoryCookieJar {
    fn default() -> Self {
        Self::new("localhost")
    }
}

impl MemoryCookieJar {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CookieJarState {
                hostname: hostname.into(),
                cookies: Vec::new(),
                writes: Vec::new(),
            })),
        }
    }

    /// Every assignment passed to [`CookieJar::set_cookie`], oldest first.
    pub fn writes(&self) -> Vec<String> {
        lock(&self.state).writes.clone()
    }

    pub fn len(&self) -> usize {
        let now = platform::now();
        lock(&self.state)
            .cookies
            .iter()
            .filter(|c| !is_expired(c.expires, now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_expired(expires: Option<SystemTime>, now: SystemTime) -> bool {
    expires.is_some_and(|at| at <= now)
}

impl CookieJar for MemoryCookieJar {
    fn cookie_string(&self) -> BackendResult<String> {
        let now = platform::now();
        let state = lock(&self.state);
        Ok(state
            .cookies
            .iter()
            .filter(|c| !is_expired(c.expires, now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "))
    }

    fn set_cookie(&self, cookie: &str) -> BackendResult<()> {
        let mut parts = cookie.split(';').map(str::trim);
        let pair = parts.next().unwrap_or_default();
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = name.trim();
        if name.is_empty() {
            return Err(BackendError::new("SyntaxError", "cookie has no name"));
        }

        let now = platform::now();
        let mut expires = None;
        for attr in parts {
            let (attr, arg) = attr.split_once('=').unwrap_or((attr, ""));
            match attr.trim().to_ascii_lowercase().as_str() {
                // `max-age` wins over `expires` when both are present.
                "max-age" => {
                    if let Ok(secs) = arg.trim().parse::<i64>() {
                        expires = Some(if secs <= 0 {
                            SystemTime::UNIX_EPOCH
                        } else {
                            now + std::time::Duration::from_secs(secs as u64)
                        });
                        break;
                    }
                }
                "expires" => {
                    if let Ok(at) = httpdate::parse_http_date(arg.trim()) {
                        expires = Some(at);
                    }
                }
                _ => {}
            }
        }

        let mut state = lock(&self.state);
        state.writes.push(cookie.to_owned());
        let existing = state.cookies.iter().position(|c| c.name == name);
        if is_expired(expires, now) {
            if let Some(idx) = existing {
                state.cookies.remove(idx);
            }
            return Ok(());
        }

        let stored = StoredCookie {
            name: name.to_owned(),
            value: value.trim().to_owned(),
            expires,
        };
        match existing {
            Some(idx) => state.cookies[idx] = stored,
            None => state.cookies.push(stored),
        }
        Ok(())
    }

    fn hostname(&self) -> BackendResult<String> {
        Ok(lock(&self.state).hostname.clone())
    }
}

#[derive(Debug, Default)]
struct WebStorageState {
    items: BTreeMap<String, String>,
    quota_bytes: Option<usize>,
}

impl WebStorageState {
    fn usage_without(&self, key: &str) -> usize {
        self.items
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

/// `Storage` object with an optional byte quota over keys plus values.
#[derive(Debug, Clone, Default)]
pub struct MemoryWebStorage {
    state: Arc<Mutex<WebStorageState>>,
}

impl MemoryWebStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        let storage = Self::default();
        lock(&storage.state).quota_bytes = Some(quota_bytes);
        storage
    }

    /// Raw stored text, bypassing any adapter encoding.
    pub fn raw(&self, key: &str) -> Option<String> {
        lock(&self.state).items.get(key).cloned()
    }
}

impl WebStorage for MemoryWebStorage {
    fn length(&self) -> BackendResult<u32> {
        storage_length(lock(&self.state).items.len())
    }

    fn key(&self, index: u32) -> BackendResult<Option<String>> {
        Ok(lock(&self.state).items.keys().nth(index as usize).cloned())
    }

    fn get_item(&self, key: &str) -> BackendResult<Option<String>> {
        Ok(lock(&self.state).items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> BackendResult<()> {
        let mut state = lock(&self.state);
        if let Some(quota) = state.quota_bytes {
            let needed = state.usage_without(key) + key.len() + value.len();
            if needed > quota {
                return Err(BackendError::quota_exceeded(format!(
                    "setting the value of '{key}' exceeded the quota"
                )));
            }
        }
        state.items.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> BackendResult<()> {
        lock(&self.state).items.remove(key);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CacheState {
    caches: BTreeMap<String, BTreeMap<String, String>>,
    estimate: Option<StorageEstimate>,
}

/// Cache storage whose storage estimate is set by the caller.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    state: Arc<Mutex<CacheState>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_estimate(&self, estimate: Option<StorageEstimate>) {
        lock(&self.state).estimate = estimate;
    }

    pub fn cache_names(&self) -> Vec<String> {
        lock(&self.state).caches.keys().cloned().collect()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl CacheStore for MemoryCacheStore {
    async fn match_request(&self, cache_name: &str, url: &str) -> BackendResult<Option<String>> {
        Ok(lock(&self.state)
            .caches
            .get(cache_name)
            .and_then(|cache| cache.get(url))
            .cloned())
    }

    async fn put(&self, cache_name: &str, url: &str, body: &str) -> BackendResult<()> {
        lock(&self.state)
            .caches
            .entry(cache_name.to_owned())
            .or_default()
            .insert(url.to_owned(), body.to_owned());
        Ok(())
    }

    async fn delete(&self, cache_name: &str, url: &str) -> BackendResult<bool> {
        Ok(lock(&self.state)
            .caches
            .get_mut(cache_name)
            .is_some_and(|cache| cache.remove(url).is_some()))
    }

    async fn request_urls(&self, cache_name: &str) -> BackendResult<Vec<String>> {
        Ok(lock(&self.state)
            .caches
            .get(cache_name)
            .map(|cache| cache.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn estimate(&self) -> BackendResult<Option<StorageEstimate>> {
        Ok(lock(&self.state).estimate)
    }
}

#[derive(Debug, Default)]
struct KeyValueState {
    items: BTreeMap<String, Value>,
    quota_bytes: Option<usize>,
}

/// Object store with an optional quota over keys plus JSON-encoded values.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    state: Arc<Mutex<KeyValueState>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        let store = Self::default();
        lock(&store.state).quota_bytes = Some(quota_bytes);
        store
    }

    /// Stored value, bypassing the adapter.
    pub fn raw(&self, key: &str) -> Option<Value> {
        lock(&self.state).items.get(key).cloned()
    }
}

fn stored_size(key: &str, value: &Value) -> usize {
    key.len() + value.to_string().len()
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> BackendResult<Option<Value>> {
        Ok(lock(&self.state).items.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> BackendResult<()> {
        let mut state = lock(&self.state);
        if let Some(quota) = state.quota_bytes {
            let used: usize = state
                .items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| stored_size(k, v))
                .sum();
            if used + stored_size(key, value) > quota {
                return Err(BackendError::quota_exceeded(
                    "the transaction was aborted because the quota was exceeded",
                ));
            }
        }
        state.items.insert(key.to_owned(), value.clone());
        Ok(())
    }

    async fn del(&self, key: &str) -> BackendResult<()> {
        lock(&self.state).items.remove(key);
        Ok(())
    }

    async fn keys(&self) -> BackendResult<Vec<String>> {
        Ok(lock(&self.state).items.keys().cloned().collect())
    }

    async fn entries(&self) -> BackendResult<Vec<(String, Value)>> {
        Ok(lock(&self.state)
            .items
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_max_age_zero_deletes() {
        let jar = MemoryCookieJar::default();
        jar.set_cookie("a=1; path=/; max-age=60").unwrap();
        jar.set_cookie("b=2; path=/").unwrap();
        assert_eq!(jar.cookie_string().unwrap(), "a=1; b=2");

        jar.set_cookie("a=; path=/; max-age=0").unwrap();
        assert_eq!(jar.cookie_string().unwrap(), "b=2");
        assert_eq!(jar.writes().len(), 3);
    }

    #[test]
    fn cookie_expires_in_the_past_deletes() {
        let jar = MemoryCookieJar::default();
        jar.set_cookie("a=1").unwrap();
        jar.set_cookie("a=; expires=Thu, 01 Jan 1970 00:00:01 GMT").unwrap();
        assert!(jar.is_empty());
    }

    #[test]
    fn web_storage_quota_counts_replaced_values_once() {
        let storage = MemoryWebStorage::with_quota(10);
        storage.set_item("k", "12345").unwrap();
        // Replacing the value does not double count the old one.
        storage.set_item("k", "123456789").unwrap();
        let err = storage.set_item("j", "1").unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(storage.raw("k").as_deref(), Some("123456789"));
    }

    #[test]
    fn web_storage_keys_are_positional() {
        let storage = MemoryWebStorage::new();
        storage.set_item("b", "2").unwrap();
        storage.set_item("a", "1").unwrap();
        assert_eq!(storage.length().unwrap(), 2);
        assert_eq!(storage.key(0).unwrap().as_deref(), Some("a"));
        assert_eq!(storage.key(1).unwrap().as_deref(), Some("b"));
        assert_eq!(storage.key(2).unwrap(), None);
    }
}
