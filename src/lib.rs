//! Swappable key/value storage for browser applications.
//!
//! One contract, [`StorageAdapter`], over seven backends: cookies, `localStorage`,
//! `sessionStorage`, the Cache API, IndexedDB, the origin-private file system (OPFS) and OPFS
//! behind a dedicated worker. Pick a backend by [`StorageType`]:
//!
//! - [`open_browser_store`] (`wasm32` only) binds the real browser services.
//! - [`open_memory_store`] uses the in-memory platform implementations, for native hosts and
//!   tests.
//!
//! ```
//! # futures::executor::block_on(async {
//! use serde_json::json;
//! use storekit::{open_memory_store, StorageType, StoreConfig};
//!
//! let store = open_memory_store(StorageType::LocalStorage, &StoreConfig::default()).unwrap();
//! store.set("meaning", &json!({ "ofLife": 42 })).await.unwrap();
//! assert_eq!(store.get("meaning").await.unwrap(), json!({ "ofLife": 42 }));
//! # });
//! ```

mod config;
pub mod scenario;

pub use config::StoreConfig;
pub use storekit_core::{
    async_trait, BackendError, EntryBatch, KeyBatch, ProtocolError, Result, StorageAdapter,
    StorageType, StoreError, Value,
};
pub use storekit_opfs::{OpfsAdapter, OpfsWorkerAdapter, WorkerOptions};
pub use storekit_web::{
    CacheAdapter, CacheOptions, CookieAdapter, CookieOptions, IdbAdapter, IdbOptions,
    WebStorageAdapter,
};

/// Re-exported backend crates, for the platform traits and their implementations.
pub use storekit_core as core;
pub use storekit_opfs as opfs;
pub use storekit_web as web;

use storekit_opfs::memory::MemoryFs;
use storekit_web::memory::{
    MemoryCacheStore, MemoryCookieJar, MemoryKeyValueStore, MemoryWebStorage,
};

/// A fresh, empty store of kind `storage_type` backed by in-memory platform services.
///
/// On native targets the `opfs-worker` store runs its worker on a background thread. There is
/// no thread to run it on in `wasm32`, so it is [`StoreError::Unavailable`] there.
pub fn open_memory_store(
    storage_type: StorageType,
    config: &StoreConfig,
) -> Result<Box<dyn StorageAdapter>> {
    let store: Box<dyn StorageAdapter> = match storage_type {
        StorageType::Cookie => Box::new(CookieAdapter::with_options(
            MemoryCookieJar::default(),
            config.cookie.clone(),
        )),
        StorageType::LocalStorage => Box::new(WebStorageAdapter::local(MemoryWebStorage::new())),
        StorageType::SessionStorage => {
            Box::new(WebStorageAdapter::session(MemoryWebStorage::new()))
        }
        StorageType::Cache => Box::new(CacheAdapter::with_options(
            MemoryCacheStore::new(),
            config.cache.clone(),
        )),
        StorageType::Idb => Box::new(IdbAdapter::new(MemoryKeyValueStore::new())),
        StorageType::Opfs => Box::new(OpfsAdapter::new(MemoryFs::new())),
        StorageType::OpfsWorker => open_memory_worker_store(config)?,
    };
    tracing::debug!(%storage_type, "opened in-memory store");
    Ok(store)
}

#[cfg(not(target_arch = "wasm32"))]
fn open_memory_worker_store(config: &StoreConfig) -> Result<Box<dyn StorageAdapter>> {
    use storekit_opfs::native::ThreadWorkerSpawner;

    Ok(Box::new(OpfsWorkerAdapter::with_options(
        ThreadWorkerSpawner::new(MemoryFs::new()),
        config.worker.clone(),
    )))
}

#[cfg(target_arch = "wasm32")]
fn open_memory_worker_store(_config: &StoreConfig) -> Result<Box<dyn StorageAdapter>> {
    Err(StoreError::Unavailable(
        "in-memory opfs-worker store needs threads".to_owned(),
    ))
}

/// A store of kind `storage_type` bound to the browser's own storage services.
///
/// Fails with [`StoreError::Backend`] when the service is missing from the current global
/// scope, e.g. `localStorage` inside a worker.
#[cfg(target_arch = "wasm32")]
pub fn open_browser_store(
    storage_type: StorageType,
    config: &StoreConfig,
) -> Result<Box<dyn StorageAdapter>> {
    use storekit_opfs::platform::{BrowserRoot, BrowserWorkerSpawner};
    use storekit_web::platform::{
        BrowserCacheStore, BrowserStorage, DocumentCookieJar, IdbKeyValueStore,
    };

    let store: Box<dyn StorageAdapter> = match storage_type {
        StorageType::Cookie => Box::new(CookieAdapter::with_options(
            DocumentCookieJar::new()?,
            config.cookie.clone(),
        )),
        StorageType::LocalStorage => Box::new(WebStorageAdapter::local(BrowserStorage::local()?)),
        StorageType::SessionStorage => {
            Box::new(WebStorageAdapter::session(BrowserStorage::session()?))
        }
        StorageType::Cache => Box::new(CacheAdapter::with_options(
            BrowserCacheStore::new()?,
            config.cache.clone(),
        )),
        StorageType::Idb => Box::new(IdbAdapter::new(IdbKeyValueStore::new(config.idb.clone()))),
        StorageType::Opfs => Box::new(OpfsAdapter::new(BrowserRoot)),
        StorageType::OpfsWorker => Box::new(OpfsWorkerAdapter::with_options(
            BrowserWorkerSpawner,
            config.worker.clone(),
        )),
    };
    Ok(store)
}
