#![cfg(target_arch = "wasm32")]

use storekit::{open_browser_store, scenario, StorageType, StoreConfig};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

async fn run(storage_type: StorageType, config: &StoreConfig) {
    let store = open_browser_store(storage_type, config).unwrap();
    // Start from an empty namespace even if an earlier run left data behind.
    for key in store.keys().await.unwrap() {
        store.remove(&key).await.unwrap();
    }
    scenario::run(store.as_ref()).await.unwrap();
    store.remove("meaning").await.unwrap();
}

#[wasm_bindgen_test]
async fn local_storage_scenario() {
    run(StorageType::LocalStorage, &StoreConfig::default()).await;
}

#[wasm_bindgen_test]
async fn session_storage_scenario() {
    run(StorageType::SessionStorage, &StoreConfig::default()).await;
}

#[wasm_bindgen_test]
async fn idb_scenario() {
    run(StorageType::Idb, &StoreConfig::default()).await;
}

#[wasm_bindgen_test]
async fn cookie_scenario() {
    // The test server speaks plain http.
    let config = StoreConfig::from_json(r#"{ "cookie": { "secure": false } }"#).unwrap();
    run(StorageType::Cookie, &config).await;
}
