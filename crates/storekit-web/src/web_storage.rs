use serde_json::Value;
use storekit_core::platform::MaybeSendSync;
use storekit_core::value::{encode_text, safe_json_parse};
use storekit_core::{async_trait, BackendError, Result, StorageAdapter, StorageType, StoreError};

/// The synchronous `Storage` interface shared by `localStorage` and `sessionStorage`.
pub trait WebStorage: MaybeSendSync {
    fn length(&self) -> std::result::Result<u32, BackendError>;
    fn key(&self, index: u32) -> std::result::Result<Option<String>, BackendError>;
    fn get_item(&self, key: &str) -> std::result::Result<Option<String>, BackendError>;
    fn set_item(&self, key: &str, value: &str) -> std::result::Result<(), BackendError>;
    fn remove_item(&self, key: &str) -> std::result::Result<(), BackendError>;
}

/// Adapter over an origin-scoped `Storage` object.
///
/// Local and session storage behave identically and differ only in which `Storage` they address,
/// so one type serves both; [`WebStorageAdapter::local`] and [`WebStorageAdapter::session`] pick
/// the discriminant.
#[derive(Debug)]
pub struct WebStorageAdapter<S> {
    storage: S,
    storage_type: StorageType,
}

impl<S: WebStorage> WebStorageAdapter<S> {
    pub fn local(storage: S) -> Self {
        Self {
            storage,
            storage_type: StorageType::LocalStorage,
        }
    }

    pub fn session(storage: S) -> Self {
        Self {
            storage,
            storage_type: StorageType::SessionStorage,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Positional scan over the store; O(n) per call.
    fn scan_keys(&self) -> Result<Vec<String>> {
        let len = self.storage.length()?;
        let mut keys = Vec::with_capacity(len as usize);
        for index in 0..len {
            if let Some(key) = self.storage.key(index)? {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<S: WebStorage> StorageAdapter for WebStorageAdapter<S> {
    fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.storage.get_item(key)?.is_some())
    }

    async fn get(&self, key: &str) -> Result<Value> {
        Ok(safe_json_parse(self.storage.get_item(key)?.as_deref()))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.storage
            .set_item(key, &encode_text(value))
            .map_err(|err| StoreError::from_write(self.storage_type, err))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.storage.remove_item(key)?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.scan_keys()
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>> {
        self.scan_keys()?
            .into_iter()
            .map(|key| -> Result<(String, Value)> {
                let value = safe_json_parse(self.storage.get_item(&key)?.as_deref());
                Ok((key, value))
            })
            .collect()
    }
}
