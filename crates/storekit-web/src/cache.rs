use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use storekit_core::platform::{self, MaybeSendSync};
use storekit_core::value::safe_json_parse;
use storekit_core::{async_trait, BackendError, Result, StorageAdapter, StorageType, StoreError};

use crate::options::CacheOptions;

/// Result of `navigator.storage.estimate()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEstimate {
    pub usage: u64,
    pub quota: u64,
}

impl StorageEstimate {
    pub fn is_full(&self) -> bool {
        self.usage >= self.quota
    }
}

/// Request/response cache storage (`caches` plus `navigator.storage`).
///
/// Requests are identified by URL and responses carry a text body.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait CacheStore: MaybeSendSync {
    async fn match_request(
        &self,
        cache_name: &str,
        url: &str,
    ) -> std::result::Result<Option<String>, BackendError>;

    async fn put(&self, cache_name: &str, url: &str, body: &str)
        -> std::result::Result<(), BackendError>;

    /// Whether a matching entry existed.
    async fn delete(&self, cache_name: &str, url: &str) -> std::result::Result<bool, BackendError>;

    async fn request_urls(&self, cache_name: &str) -> std::result::Result<Vec<String>, BackendError>;

    /// `None` when the platform cannot estimate storage usage.
    async fn estimate(&self) -> std::result::Result<Option<StorageEstimate>, BackendError>;
}

/// Adapter over the Cache API.
///
/// All keys live in one named cache. A key is stored as a synthetic request URL
/// (`<url_prefix><percent-encoded key>`) whose response body is the JSON-encoded value, so every
/// JSON type round-trips exactly.
///
/// After a successful write the adapter checks the storage estimate in a detached task. This is
/// best-effort only: the write has already landed and the caller never sees the result. When the
/// estimate reports usage at or over quota the task logs an error and records the estimate,
/// which can be collected with [`CacheAdapter::take_quota_alert`].
#[derive(Debug)]
pub struct CacheAdapter<C> {
    cache: Arc<C>,
    options: CacheOptions,
    quota_alert: Arc<Mutex<Option<StorageEstimate>>>,
}

impl<C: CacheStore + 'static> CacheAdapter<C> {
    pub fn new(cache: C) -> Self {
        Self::with_options(cache, CacheOptions::default())
    }

    pub fn with_options(cache: C, options: CacheOptions) -> Self {
        Self {
            cache: Arc::new(cache),
            options,
            quota_alert: Arc::new(Mutex::new(None)),
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// The estimate recorded by the most recent over-quota check, if any.
    pub fn take_quota_alert(&self) -> Option<StorageEstimate> {
        self.quota_alert
            .lock()
            .map(|mut alert| alert.take())
            .unwrap_or(None)
    }

    fn request_url(&self, key: &str) -> String {
        format!("{}{}", self.options.url_prefix, urlencoding::encode(key))
    }

    /// Recover the key from a stored request URL. Browsers report absolute URLs, so match on the
    /// prefix rather than on the whole string.
    fn key_from_url(&self, url: &str) -> Option<String> {
        let start = url.rfind(&self.options.url_prefix)? + self.options.url_prefix.len();
        let encoded = &url[start..];
        Some(
            urlencoding::decode(encoded)
                .map(|key| key.into_owned())
                .unwrap_or_else(|_| encoded.to_owned()),
        )
    }

    fn spawn_quota_check(&self) {
        let cache = Arc::clone(&self.cache);
        let alert = Arc::clone(&self.quota_alert);
        platform::spawn_detached("storekit-cache-quota", async move {
            match cache.estimate().await {
                Ok(Some(estimate)) if estimate.is_full() => {
                    tracing::error!(
                        storage_type = %StorageType::Cache,
                        usage = estimate.usage,
                        quota = estimate.quota,
                        "browser storage is full"
                    );
                    if let Ok(mut slot) = alert.lock() {
                        *slot = Some(estimate);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(error = %err, "storage estimate unavailable");
                }
            }
        });
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<C: CacheStore + 'static> StorageAdapter for CacheAdapter<C> {
    fn storage_type(&self) -> StorageType {
        StorageType::Cache
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let url = self.request_url(key);
        Ok(self
            .cache
            .match_request(&self.options.cache_name, &url)
            .await?
            .is_some())
    }

    async fn get(&self, key: &str) -> Result<Value> {
        let url = self.request_url(key);
        let body = self
            .cache
            .match_request(&self.options.cache_name, &url)
            .await?;
        Ok(safe_json_parse(body.as_deref()))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let url = self.request_url(key);
        let body = serde_json::to_string(value)?;
        self.cache
            .put(&self.options.cache_name, &url, &body)
            .await
            .map_err(|err| StoreError::from_write(StorageType::Cache, err))?;

        if self.options.quota_check {
            self.spawn_quota_check();
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let url = self.request_url(key);
        self.cache.delete(&self.options.cache_name, &url).await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let urls = self.cache.request_urls(&self.options.cache_name).await?;
        Ok(urls.iter().filter_map(|url| self.key_from_url(url)).collect())
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>> {
        let urls = self.cache.request_urls(&self.options.cache_name).await?;
        let mut entries = Vec::with_capacity(urls.len());
        for url in urls {
            let Some(key) = self.key_from_url(&url) else {
                continue;
            };
            // The entry may have been deleted between listing and matching.
            if let Some(body) = self
                .cache
                .match_request(&self.options.cache_name, &url)
                .await?
            {
                entries.push((key, safe_json_parse(Some(&body))));
            }
        }
        Ok(entries)
    }
}
