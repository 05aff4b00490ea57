use serde_json::Value;
use storekit_core::platform::MaybeSendSync;
use storekit_core::value::{encode_text, is_structured};
use storekit_core::{async_trait, BackendError, Result, StorageAdapter, StorageType, StoreError};

/// Minimal key/value view of one IndexedDB object store (the `idb-keyval` surface).
///
/// Values are structured: objects and arrays are stored natively rather than as JSON text.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait KeyValueStore: MaybeSendSync {
    async fn get(&self, key: &str) -> std::result::Result<Option<Value>, BackendError>;
    async fn set(&self, key: &str, value: &Value) -> std::result::Result<(), BackendError>;
    async fn del(&self, key: &str) -> std::result::Result<(), BackendError>;
    async fn keys(&self) -> std::result::Result<Vec<String>, BackendError>;
    async fn entries(&self) -> std::result::Result<Vec<(String, Value)>, BackendError>;
}

/// Adapter over an IndexedDB key/value store.
///
/// Objects and arrays are stored as-is; scalars are coerced to their string form, so a stored
/// number reads back as a string. Reads return exactly what is stored, without JSON decoding.
#[derive(Debug)]
pub struct IdbAdapter<S> {
    store: S,
}

impl<S: KeyValueStore> IdbAdapter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<S: KeyValueStore> StorageAdapter for IdbAdapter<S> {
    fn storage_type(&self) -> StorageType {
        StorageType::Idb
    }

    /// IndexedDB has no cheap existence check through this surface; this lists every key.
    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.store.keys().await?.iter().any(|k| k == key))
    }

    async fn get(&self, key: &str) -> Result<Value> {
        Ok(self.store.get(key).await?.unwrap_or(Value::Null))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let stored;
        let value = if is_structured(value) {
            value
        } else {
            stored = Value::String(encode_text(value));
            &stored
        };
        self.store
            .set(key, value)
            .await
            .map_err(|err| StoreError::from_write(StorageType::Idb, err))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.store.del(key).await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.store.keys().await?)
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>> {
        Ok(self.store.entries().await?)
    }
}
