//! The end-to-end scenario every backend must pass, shared by the test suite and
//! `storekit selftest`.

use serde_json::{json, Value};
use storekit_core::{StorageAdapter, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{step}: expected {expected}, got {actual}")]
    Mismatch {
        step: &'static str,
        expected: Value,
        actual: Value,
    },
}

fn check(step: &'static str, expected: Value, actual: Value) -> Result<(), ScenarioError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ScenarioError::Mismatch {
            step,
            expected,
            actual,
        })
    }
}

/// Keys as a sorted JSON array; the contract leaves key order to the backend.
fn key_set(mut keys: Vec<String>) -> Value {
    keys.sort();
    json!(keys)
}

/// Run the scenario against `store`, which must start out empty.
///
/// Leaves `meaning` behind in the store.
pub async fn run(store: &dyn StorageAdapter) -> Result<(), ScenarioError> {
    let storage_type = store.storage_type();
    tracing::debug!(%storage_type, "running storage scenario");

    check("initial keys", json!([]), key_set(store.keys().await?))?;

    store.set("hello", &json!("world")).await?;
    check("get hello", json!("world"), store.get("hello").await?)?;

    let meaning = json!({ "ofLife": 42 });
    store.set("meaning", &meaning).await?;
    check("get meaning", meaning.clone(), store.get("meaning").await?)?;

    check(
        "keys after set",
        json!(["hello", "meaning"]),
        key_set(store.keys().await?),
    )?;
    let entry_keys = store.entries().await?.into_iter().map(|(key, _)| key).collect();
    check(
        "entries after set",
        json!(["hello", "meaning"]),
        key_set(entry_keys),
    )?;

    store.remove("hello").await?;
    store.remove("hello").await?;
    check("keys after remove", json!(["meaning"]), key_set(store.keys().await?))?;
    check("has hello", json!(false), json!(store.has("hello").await?))?;
    check("get removed hello", Value::Null, store.get("hello").await?)?;
    check("has meaning", json!(true), json!(store.has("meaning").await?))?;

    Ok(())
}
