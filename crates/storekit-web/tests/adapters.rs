#![cfg(not(target_arch = "wasm32"))]

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use storekit_core::{StorageAdapter, StorageType, StoreError};
use storekit_web::memory::{MemoryCacheStore, MemoryCookieJar, MemoryKeyValueStore, MemoryWebStorage};
use storekit_web::{
    CacheAdapter, CacheOptions, CookieAdapter, CookieOptions, IdbAdapter, StorageEstimate,
    WebStorageAdapter,
};

async fn exercise_contract(adapter: &dyn StorageAdapter) {
    assert!(!adapter.has("hello").await.unwrap());
    assert_eq!(adapter.get("hello").await.unwrap(), Value::Null);

    adapter.set("hello", &json!("world")).await.unwrap();
    adapter.set("meaning", &json!({ "ofLife": 42 })).await.unwrap();
    assert!(adapter.has("hello").await.unwrap());
    assert_eq!(adapter.get("hello").await.unwrap(), json!("world"));
    assert_eq!(adapter.get("meaning").await.unwrap(), json!({ "ofLife": 42 }));

    let mut keys = adapter.keys().await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["hello".to_owned(), "meaning".to_owned()]);

    let mut entries = adapter.entries().await.unwrap();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        entries,
        vec![
            ("hello".to_owned(), json!("world")),
            ("meaning".to_owned(), json!({ "ofLife": 42 })),
        ]
    );

    adapter.remove("hello").await.unwrap();
    adapter.remove("hello").await.unwrap();
    assert!(!adapter.has("hello").await.unwrap());
    assert_eq!(adapter.get("hello").await.unwrap(), Value::Null);

    assert!(adapter.set_many([("a", json!("x")), ("b", json!("y"))].into()).await);
    assert_eq!(
        adapter.get_many(["b", "a", "missing"].into()).await.unwrap(),
        vec![json!("y"), json!("x"), Value::Null]
    );
    assert!(adapter.remove_many(["a", "b", "meaning"].into()).await);
    assert!(adapter.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn cookie_adapter_honours_the_contract() {
    let adapter = CookieAdapter::new(MemoryCookieJar::default());
    assert_eq!(adapter.storage_type(), StorageType::Cookie);
    exercise_contract(&adapter).await;
}

#[tokio::test]
async fn local_and_session_storage_honour_the_contract() {
    let local = WebStorageAdapter::local(MemoryWebStorage::new());
    assert_eq!(local.storage_type(), StorageType::LocalStorage);
    exercise_contract(&local).await;

    let session = WebStorageAdapter::session(MemoryWebStorage::new());
    assert_eq!(session.storage_type(), StorageType::SessionStorage);
    exercise_contract(&session).await;
}

#[tokio::test]
async fn cache_adapter_honours_the_contract() {
    let adapter = CacheAdapter::new(MemoryCacheStore::new());
    exercise_contract(&adapter).await;
}

#[tokio::test]
async fn idb_adapter_honours_the_contract() {
    let adapter = IdbAdapter::new(MemoryKeyValueStore::new());
    exercise_contract(&adapter).await;
}

#[tokio::test]
async fn cookie_writes_stamp_a_400_day_lifetime() {
    let jar = MemoryCookieJar::new("example.com");
    let adapter = CookieAdapter::new(jar.clone());
    adapter.set("theme", &json!("dark")).await.unwrap();

    let writes = jar.writes();
    let cookie = writes.last().unwrap();
    assert!(cookie.starts_with("theme=dark; domain=example.com; path=/; samesite=strict; secure"));
    assert!(cookie.ends_with("max-age=34560000"), "{cookie}");
    assert!(cookie.contains("expires="));
}

#[tokio::test]
async fn cookie_lifetimes_out_of_range_are_rejected() {
    for max_age_days in [u64::MAX, u64::MAX / (24 * 60 * 60)] {
        let jar = MemoryCookieJar::default();
        let options = CookieOptions {
            max_age_days,
            ..CookieOptions::default()
        };
        let adapter = CookieAdapter::with_options(jar.clone(), options);

        match adapter.set("k", &json!(1)).await.unwrap_err() {
            StoreError::Backend(err) => assert_eq!(err.name, "RangeError"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(jar.writes().is_empty());
    }
}

#[tokio::test]
async fn cookie_names_and_values_are_percent_encoded() {
    let jar = MemoryCookieJar::default();
    let adapter = CookieAdapter::new(jar.clone());
    adapter.set("a b", &json!({ "x": "y;z" })).await.unwrap();

    assert!(jar.writes()[0].starts_with("a%20b=%7B%22x%22%3A%22y%3Bz%22%7D;"));
    assert_eq!(adapter.keys().await.unwrap(), vec!["a b".to_owned()]);
    assert_eq!(adapter.get("a b").await.unwrap(), json!({ "x": "y;z" }));
}

#[tokio::test]
async fn oversized_cookie_is_rejected_without_touching_the_jar() {
    let jar = MemoryCookieJar::default();
    let adapter = CookieAdapter::new(jar.clone());
    let err = adapter
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
    assert!(jar.writes().is_empty());
    assert!(jar.is_empty());
}

#[tokio::test]
async fn removed_cookie_is_expired_in_the_past() {
    let jar = MemoryCookieJar::default();
    let adapter = CookieAdapter::new(jar.clone());
    adapter.set("k", &json!(1)).await.unwrap();
    adapter.remove("k").await.unwrap();

    let writes = jar.writes();
    assert!(writes[1].starts_with("k=;"));
    assert!(writes[1].ends_with("max-age=0"));
    assert!(jar.is_empty());
}

#[tokio::test]
async fn web_storage_decodes_text_leniently() {
    let storage = MemoryWebStorage::new();
    let adapter = WebStorageAdapter::local(storage.clone());

    adapter.set("n", &json!(42)).await.unwrap();
    adapter.set("s", &json!("not json")).await.unwrap();
    assert_eq!(storage.raw("n").as_deref(), Some("42"));
    assert_eq!(storage.raw("s").as_deref(), Some("not json"));

    assert_eq!(adapter.get("n").await.unwrap(), json!(42));
    assert_eq!(adapter.get("s").await.unwrap(), json!("not json"));
}

#[tokio::test]
async fn web_storage_batch_reports_partial_quota_failure() {
    let storage = MemoryWebStorage::with_quota(32);
    let adapter = WebStorageAdapter::local(storage.clone());

    let ok = adapter
        .set_many([("a", json!(1)), ("big", Value::String("x".repeat(64)))].into())
        .await;
    assert!(!ok);
    assert_eq!(adapter.get("a").await.unwrap(), json!(1));
    assert!(!adapter.has("big").await.unwrap());

    let err = adapter
        .set("big", &Value::String("x".repeat(64)))
        .await
        .unwrap_err();
    assert!(err.is_quota_exceeded());
}

#[tokio::test]
async fn cache_values_round_trip_exactly() {
    let adapter = CacheAdapter::new(MemoryCacheStore::new());
    for value in [json!("42"), json!(42), json!(true), json!([1, "two"])] {
        adapter.set("v", &value).await.unwrap();
        assert_eq!(adapter.get("v").await.unwrap(), value);
    }
}

#[tokio::test]
async fn cache_keys_survive_url_encoding() {
    let cache = MemoryCacheStore::new();
    let adapter = CacheAdapter::new(cache.clone());
    adapter.set("dir/file name?", &json!(1)).await.unwrap();

    assert_eq!(cache.cache_names(), vec!["storekit-kvstore".to_owned()]);
    assert_eq!(adapter.keys().await.unwrap(), vec!["dir/file name?".to_owned()]);
}

#[tokio::test]
async fn cache_write_records_quota_alert_in_the_background() {
    let cache = MemoryCacheStore::new();
    cache.set_estimate(Some(StorageEstimate {
        usage: 100,
        quota: 100,
    }));
    let adapter = CacheAdapter::new(cache);

    // The write itself succeeds; the check runs detached afterwards.
    adapter.set("k", &json!("v")).await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let alert = loop {
        if let Some(alert) = adapter.take_quota_alert() {
            break alert;
        }
        assert!(Instant::now() < deadline, "quota alert never recorded");
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    assert_eq!(alert.usage, 100);
    assert_eq!(adapter.get("k").await.unwrap(), json!("v"));
}

#[tokio::test]
async fn cache_quota_check_can_be_disabled() {
    let cache = MemoryCacheStore::new();
    cache.set_estimate(Some(StorageEstimate { usage: 9, quota: 1 }));
    let adapter = CacheAdapter::with_options(
        cache,
        CacheOptions {
            quota_check: false,
            ..CacheOptions::default()
        },
    );
    adapter.set("k", &json!("v")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(adapter.take_quota_alert(), None);
}

#[tokio::test]
async fn idb_coerces_scalars_to_strings() {
    let store = MemoryKeyValueStore::new();
    let adapter = IdbAdapter::new(store.clone());

    adapter.set("n", &json!(42)).await.unwrap();
    adapter.set("o", &json!({ "ofLife": 42 })).await.unwrap();

    assert_eq!(store.raw("n"), Some(json!("42")));
    assert_eq!(adapter.get("n").await.unwrap(), json!("42"));
    assert_eq!(adapter.get("o").await.unwrap(), json!({ "ofLife": 42 }));
}

#[tokio::test]
async fn idb_quota_failures_are_classified() {
    let adapter = IdbAdapter::new(MemoryKeyValueStore::with_quota(16));
    let err = adapter
        .set("big", &json!({ "blob": "x".repeat(64) }))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::QuotaExceeded {
            backend: StorageType::Idb,
            ..
        }
    ));
}
