#![cfg(not(target_arch = "wasm32"))]

use std::time::Duration;

use futures::future::join_all;
use serde_json::{json, Value};
use storekit_core::{StorageAdapter, StorageType, StoreError};
use storekit_opfs::memory::MemoryFs;
use storekit_opfs::native::NativeDirectory;
use storekit_opfs::OpfsAdapter;

async fn scenario(adapter: &dyn StorageAdapter) {
    adapter.set("hello", &json!("world")).await.unwrap();
    assert_eq!(adapter.get("hello").await.unwrap(), json!("world"));
    adapter.set("meaning", &json!({ "ofLife": 42 })).await.unwrap();
    assert_eq!(adapter.get("meaning").await.unwrap(), json!({ "ofLife": 42 }));

    let mut keys = adapter.keys().await.unwrap();
    keys.sort();
    assert_eq!(keys, ["hello", "meaning"]);

    let mut entry_keys: Vec<String> = adapter
        .entries()
        .await
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    entry_keys.sort();
    assert_eq!(entry_keys, keys);

    adapter.remove("hello").await.unwrap();
    assert_eq!(adapter.keys().await.unwrap(), ["meaning"]);
    assert!(!adapter.has("hello").await.unwrap());
    assert_eq!(adapter.get("hello").await.unwrap(), Value::Null);
}

#[tokio::test]
async fn memory_backed_scenario() {
    let adapter = OpfsAdapter::new(MemoryFs::new());
    assert_eq!(adapter.storage_type(), StorageType::Opfs);
    scenario(&adapter).await;
}

#[tokio::test]
async fn directory_backed_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = OpfsAdapter::new(NativeDirectory::new(dir.path().join("root")));
    scenario(&adapter).await;

    let stored = std::fs::read_to_string(dir.path().join("root").join("meaning")).unwrap();
    assert_eq!(stored, r#"{"ofLife":42}"#);
}

#[tokio::test]
async fn concurrent_first_calls_open_the_root_once() {
    let fs = MemoryFs::new().with_open_delay(Duration::from_millis(20));
    let adapter = OpfsAdapter::new(fs.clone());

    let results = join_all((0..8).map(|i| adapter.has(if i % 2 == 0 { "a" } else { "b" }))).await;
    assert!(results.into_iter().all(|has| !has.unwrap()));
    adapter.keys().await.unwrap();
    assert_eq!(fs.root_opens(), 1);
}

#[tokio::test]
async fn reading_a_missing_key_does_not_create_it() {
    let fs = MemoryFs::new();
    let adapter = OpfsAdapter::new(fs.clone());
    assert_eq!(adapter.get("ghost").await.unwrap(), Value::Null);
    assert!(adapter.keys().await.unwrap().is_empty());
    assert_eq!(fs.raw("ghost"), None);
}

#[tokio::test]
async fn remove_is_idempotent() {
    let adapter = OpfsAdapter::new(MemoryFs::new());
    adapter.remove("ghost").await.unwrap();
    adapter.set("k", &json!(1)).await.unwrap();
    adapter.remove("k").await.unwrap();
    adapter.remove("k").await.unwrap();
    assert!(adapter.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn scalars_are_stored_as_text() {
    let fs = MemoryFs::new();
    let adapter = OpfsAdapter::new(fs.clone());
    adapter.set("n", &json!(42)).await.unwrap();
    adapter.set("s", &json!("plain text")).await.unwrap();
    adapter.set("empty", &json!("")).await.unwrap();

    assert_eq!(fs.raw("n").as_deref(), Some("42"));
    assert_eq!(adapter.get("n").await.unwrap(), json!(42));
    assert_eq!(adapter.get("s").await.unwrap(), json!("plain text"));
    assert_eq!(adapter.get("empty").await.unwrap(), Value::Null);
}

#[tokio::test]
async fn writes_overwrite_the_whole_file() {
    let fs = MemoryFs::new();
    let adapter = OpfsAdapter::new(fs.clone());
    adapter.set("k", &json!("a much longer value")).await.unwrap();
    adapter.set("k", &json!("short")).await.unwrap();
    assert_eq!(fs.raw("k").as_deref(), Some("short"));
}

#[tokio::test]
async fn quota_failures_are_classified() {
    let adapter = OpfsAdapter::new(MemoryFs::with_quota(8));
    let err = adapter
        .set("big", &Value::String("x".repeat(64)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::QuotaExceeded {
            backend: StorageType::Opfs,
            ..
        }
    ));
}

#[tokio::test]
async fn names_outside_the_root_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = OpfsAdapter::new(NativeDirectory::new(dir.path()));
    match adapter.set("../escape", &json!(1)).await.unwrap_err() {
        StoreError::Backend(err) => assert_eq!(err.name, "TypeError"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!dir.path().parent().unwrap().join("escape").exists());
}

#[tokio::test]
async fn batches_fan_out_over_files() {
    let adapter = OpfsAdapter::new(MemoryFs::new());
    assert!(adapter.set_many(json!({ "a": 1, "b": [2] }).try_into().unwrap()).await);
    assert_eq!(
        adapter.get_many(vec!["b", "a", "c"].into()).await.unwrap(),
        vec![json!([2]), json!(1), Value::Null]
    );
    assert!(adapter.remove_many(vec!["a", "b", "c"].into()).await);
    assert!(adapter.keys().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn in_flight_writes_never_show_up_as_keys() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = std::sync::Arc::new(OpfsAdapter::new(NativeDirectory::new(dir.path())));
    let big = Value::String("x".repeat(1 << 20));

    let writer = tokio::spawn({
        let adapter = std::sync::Arc::clone(&adapter);
        async move {
            for _ in 0..50 {
                adapter.set("k", &big).await.unwrap();
            }
        }
    });
    while !writer.is_finished() {
        for key in adapter.keys().await.unwrap() {
            assert_eq!(key, "k");
        }
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
    assert_eq!(adapter.keys().await.unwrap(), ["k"]);
}

#[tokio::test]
async fn leftover_staging_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = OpfsAdapter::new(NativeDirectory::new(dir.path()));
    adapter.set("k", &json!(1)).await.unwrap();

    // As if a write had crashed before its rename.
    std::fs::write(dir.path().join(".crswap").join("lost.crswap"), "2").unwrap();

    assert_eq!(adapter.keys().await.unwrap(), ["k"]);
    assert_eq!(adapter.entries().await.unwrap(), vec![("k".to_owned(), json!(1))]);
    match adapter.set(".crswap", &json!(1)).await.unwrap_err() {
        StoreError::Backend(err) => assert_eq!(err.name, "TypeError"),
        other => panic!("unexpected error: {other:?}"),
    }
}
