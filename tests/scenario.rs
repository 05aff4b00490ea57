#![cfg(not(target_arch = "wasm32"))]

use serde_json::{json, Value};
use storekit::{open_memory_store, scenario, StorageType, StoreConfig, StoreError};

fn open(storage_type: StorageType) -> Box<dyn storekit::StorageAdapter> {
    open_memory_store(storage_type, &StoreConfig::default()).unwrap()
}

#[tokio::test]
async fn every_backend_passes_the_scenario() {
    for storage_type in StorageType::ALL {
        let store = open(storage_type);
        assert_eq!(store.storage_type(), storage_type);
        if let Err(err) = scenario::run(store.as_ref()).await {
            panic!("{storage_type}: {err}");
        }
    }
}

#[tokio::test]
async fn batches_keep_input_order_everywhere() {
    for storage_type in StorageType::ALL {
        let store = open(storage_type);
        assert!(
            store
                .set_many(json!([["b", { "n": 2 }], ["a", { "n": 1 }]]).try_into().unwrap())
                .await,
            "{storage_type}"
        );
        assert_eq!(
            store.get_many(vec!["a", "missing", "b"].into()).await.unwrap(),
            vec![json!({ "n": 1 }), Value::Null, json!({ "n": 2 })],
            "{storage_type}"
        );
        assert!(store.remove_many(vec!["a", "b"].into()).await, "{storage_type}");
        assert!(store.keys().await.unwrap().is_empty(), "{storage_type}");
    }
}

#[tokio::test]
async fn keys_and_entries_agree() {
    for storage_type in StorageType::ALL {
        let store = open(storage_type);
        for (key, value) in [("x", json!([1, 2])), ("y", json!({ "z": null })), ("w", json!("s"))] {
            store.set(key, &value).await.unwrap();
        }
        let mut keys = store.keys().await.unwrap();
        let mut entry_keys: Vec<String> = store
            .entries()
            .await
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        entry_keys.sort();
        assert_eq!(keys, entry_keys, "{storage_type}");
        assert_eq!(keys, ["w", "x", "y"], "{storage_type}");
    }
}

#[tokio::test]
async fn missing_keys_read_as_null() {
    for storage_type in StorageType::ALL {
        let store = open(storage_type);
        assert!(!store.has("nope").await.unwrap(), "{storage_type}");
        assert_eq!(store.get("nope").await.unwrap(), Value::Null, "{storage_type}");
        store.remove("nope").await.unwrap();
        assert!(store.keys().await.unwrap().is_empty(), "{storage_type}");
    }
}

#[tokio::test]
async fn oversized_cookie_is_a_quota_error() {
    let store = open(StorageType::Cookie);
    let err = store
        .set("big", &Value::String("x".repeat(5000)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::QuotaExceeded {
            backend: StorageType::Cookie,
            ..
        }
    ));
    assert!(store.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn worker_store_accepts_configured_options() {
    let config = StoreConfig::from_json(r#"{ "worker": { "name": "scenario-worker" } }"#).unwrap();
    let store = open_memory_store(StorageType::OpfsWorker, &config).unwrap();
    scenario::run(store.as_ref()).await.unwrap();
}
