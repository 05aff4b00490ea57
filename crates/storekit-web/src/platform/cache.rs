use js_sys::{Array, Reflect};
use storekit_core::{async_trait, BackendError};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

use super::{backend_error_from_js, worker_scope};
use crate::cache::{CacheStore, StorageEstimate};

/// `caches` and `navigator.storage` of the current global (window or worker).
#[derive(Debug, Clone)]
pub struct BrowserCacheStore {
    caches: web_sys::CacheStorage,
    storage: web_sys::StorageManager,
}

impl BrowserCacheStore {
    pub fn new() -> Result<Self, BackendError> {
        if let Some(window) = web_sys::window() {
            return Ok(Self {
                caches: window.caches().map_err(backend_error_from_js)?,
                storage: window.navigator().storage(),
            });
        }
        let scope = worker_scope()
            .ok_or_else(|| BackendError::new("NotSupportedError", "no window or worker scope"))?;
        Ok(Self {
            caches: scope.caches().map_err(backend_error_from_js)?,
            storage: scope.navigator().storage(),
        })
    }

    async fn open(&self, cache_name: &str) -> Result<web_sys::Cache, BackendError> {
        JsFuture::from(self.caches.open(cache_name))
            .await
            .map_err(backend_error_from_js)?
            .dyn_into::<web_sys::Cache>()
            .map_err(|_| BackendError::new("TypeError", "caches.open did not return a Cache"))
    }
}

#[async_trait(?Send)]
impl CacheStore for BrowserCacheStore {
    async fn match_request(
        &self,
        cache_name: &str,
        url: &str,
    ) -> Result<Option<String>, BackendError> {
        let cache = self.open(cache_name).await?;
        let matched = JsFuture::from(cache.match_with_str(url))
            .await
            .map_err(backend_error_from_js)?;
        if matched.is_undefined() || matched.is_null() {
            return Ok(None);
        }
        let response = matched
            .dyn_into::<web_sys::Response>()
            .map_err(|_| BackendError::new("TypeError", "cache match did not return a Response"))?;
        let text = JsFuture::from(response.text().map_err(backend_error_from_js)?)
            .await
            .map_err(backend_error_from_js)?;
        Ok(text.as_string())
    }

    async fn put(&self, cache_name: &str, url: &str, body: &str) -> Result<(), BackendError> {
        let cache = self.open(cache_name).await?;
        let response =
            web_sys::Response::new_with_opt_str(Some(body)).map_err(backend_error_from_js)?;
        JsFuture::from(cache.put_with_str(url, &response))
            .await
            .map_err(backend_error_from_js)?;
        Ok(())
    }

    async fn delete(&self, cache_name: &str, url: &str) -> Result<bool, BackendError> {
        let cache = self.open(cache_name).await?;
        let deleted = JsFuture::from(cache.delete_with_str(url))
            .await
            .map_err(backend_error_from_js)?;
        Ok(deleted.as_bool().unwrap_or(false))
    }

    async fn request_urls(&self, cache_name: &str) -> Result<Vec<String>, BackendError> {
        let cache = self.open(cache_name).await?;
        let requests = JsFuture::from(cache.keys())
            .await
            .map_err(backend_error_from_js)?;
        let requests: Array = requests.unchecked_into();
        Ok(requests
            .iter()
            .filter_map(|request| request.dyn_into::<web_sys::Request>().ok())
            .map(|request| request.url())
            .collect())
    }

    async fn estimate(&self) -> Result<Option<StorageEstimate>, BackendError> {
        let promise = match self.storage.estimate() {
            Ok(promise) => promise,
            Err(_) => return Ok(None),
        };
        let estimate = JsFuture::from(promise)
            .await
            .map_err(backend_error_from_js)?;
        let field = |name: &str| {
            Reflect::get(&estimate, &JsValue::from_str(name))
                .ok()
                .and_then(|v| v.as_f64())
        };
        Ok(match (field("usage"), field("quota")) {
            (Some(usage), Some(quota)) => Some(StorageEstimate {
                usage: usage as u64,
                quota: quota as u64,
            }),
            _ => None,
        })
    }
}
