//! Batched variants of the single-key operations.
//!
//! The helpers here fan a batch out to concurrent single-key calls and fan the results back in.
//! There is no atomicity across keys: when one write fails the others may still land, and the
//! aggregate result is simply `false`.

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use futures::future::{join_all, try_join_all};
use serde_json::{Map, Value};

use crate::adapter::StorageAdapter;
use crate::{Result, StoreError};

/// Key/value pairs for `set_many`.
///
/// Built from a list of pairs, a map, or a JSON value that is either an array of `[key, value]`
/// pairs or an object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryBatch(Vec<(String, Value)>);

impl EntryBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<(String, Value)> {
        self.0
    }
}

impl IntoIterator for EntryBatch {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for EntryBatch {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>> From<Vec<(K, V)>> for EntryBatch {
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for EntryBatch {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<Map<String, Value>> for EntryBatch {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Value>> From<BTreeMap<K, V>> for EntryBatch {
    fn from(map: BTreeMap<K, V>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Value>, S: BuildHasher> From<HashMap<K, V, S>> for EntryBatch {
    fn from(map: HashMap<K, V, S>) -> Self {
        map.into_iter().collect()
    }
}

impl TryFrom<Value> for EntryBatch {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(map.into()),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(idx, item)| match item {
                    Value::Array(pair) if pair.len() == 2 => {
                        let mut pair = pair.into_iter();
                        match (pair.next(), pair.next()) {
                            (Some(Value::String(key)), Some(value)) => Ok((key, value)),
                            _ => Err(StoreError::InvalidBatch(format!(
                                "entry {idx} does not have a string key"
                            ))),
                        }
                    }
                    _ => Err(StoreError::InvalidBatch(format!(
                        "entry {idx} is not a [key, value] pair"
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Self),
            other => Err(StoreError::InvalidBatch(format!(
                "expected an array of pairs or an object, got {other}"
            ))),
        }
    }
}

/// Keys for `get_many`/`remove_many`.
///
/// Built from a list of keys or from a map, in which case only the map's keys are used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBatch(Vec<String>);

impl KeyBatch {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl IntoIterator for KeyBatch {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: Into<String>> FromIterator<K> for KeyBatch {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>> From<Vec<K>> for KeyBatch {
    fn from(keys: Vec<K>) -> Self {
        keys.into_iter().collect()
    }
}

impl<K: Into<String>, const N: usize> From<[K; N]> for KeyBatch {
    fn from(keys: [K; N]) -> Self {
        keys.into_iter().collect()
    }
}

impl<K: AsRef<str>> From<&[K]> for KeyBatch {
    fn from(keys: &[K]) -> Self {
        keys.iter().map(|k| k.as_ref().to_owned()).collect()
    }
}

impl From<Map<String, Value>> for KeyBatch {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter().map(|(k, _)| k).collect()
    }
}

impl<K: Into<String>, V> From<BTreeMap<K, V>> for KeyBatch {
    fn from(map: BTreeMap<K, V>) -> Self {
        map.into_iter().map(|(k, _)| k).collect()
    }
}

impl<K: Into<String>, V, S: BuildHasher> From<HashMap<K, V, S>> for KeyBatch {
    fn from(map: HashMap<K, V, S>) -> Self {
        map.into_iter().map(|(k, _)| k).collect()
    }
}

impl TryFrom<Value> for KeyBatch {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(map.into()),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(idx, item)| match item {
                    Value::String(key) => Ok(key),
                    _ => Err(StoreError::InvalidBatch(format!(
                        "key {idx} is not a string"
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Self),
            other => Err(StoreError::InvalidBatch(format!(
                "expected an array of keys or an object, got {other}"
            ))),
        }
    }
}

/// Write every entry concurrently. `true` only if all writes succeeded.
pub async fn set_many<A>(adapter: &A, entries: EntryBatch) -> bool
where
    A: StorageAdapter + ?Sized,
{
    let results = join_all(entries.iter().map(|(key, value)| adapter.set(key, value))).await;
    all_succeeded(
        adapter,
        "set.many",
        entries.iter().map(|(key, _)| key.as_str()),
        results,
    )
}

/// Read every key concurrently, preserving input order. Missing keys yield `null`.
pub async fn get_many<A>(adapter: &A, keys: KeyBatch) -> Result<Vec<Value>>
where
    A: StorageAdapter + ?Sized,
{
    try_join_all(keys.iter().map(|key| adapter.get(key))).await
}

/// Remove every key concurrently. `true` only if all removals succeeded.
pub async fn remove_many<A>(adapter: &A, keys: KeyBatch) -> bool
where
    A: StorageAdapter + ?Sized,
{
    let results = join_all(keys.iter().map(|key| adapter.remove(key))).await;
    all_succeeded(
        adapter,
        "remove.many",
        keys.iter().map(String::as_str),
        results,
    )
}

fn all_succeeded<'a, A>(
    adapter: &A,
    operation: &'static str,
    keys: impl Iterator<Item = &'a str>,
    results: Vec<Result<()>>,
) -> bool
where
    A: StorageAdapter + ?Sized,
{
    let mut ok = true;
    for (key, result) in keys.zip(results) {
        if let Err(err) = result {
            tracing::warn!(
                storage_type = %adapter.storage_type(),
                operation,
                key,
                error = %err,
                "batch member failed"
            );
            ok = false;
        }
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_batches_accept_pairs_and_maps() {
        let from_pairs = EntryBatch::from(vec![("hello", json!("world")), ("n", json!(1))]);
        assert_eq!(from_pairs.len(), 2);

        let mut map = BTreeMap::new();
        map.insert("hello", json!("world"));
        map.insert("n", json!(1));
        let from_map = EntryBatch::from(map);
        assert_eq!(from_map, from_pairs);
    }

    #[test]
    fn entry_batch_from_json_array_or_object() {
        let pairs = EntryBatch::try_from(json!([["hello", "world"], ["meaning", { "ofLife": 42 }]]))
            .unwrap();
        assert_eq!(
            pairs.into_inner(),
            vec![
                ("hello".to_owned(), json!("world")),
                ("meaning".to_owned(), json!({ "ofLife": 42 })),
            ]
        );

        let object =
            EntryBatch::try_from(json!({ "hello": "world", "meaning": { "ofLife": 42 } }))
                .unwrap();
        assert_eq!(object.len(), 2);
    }

    #[test]
    fn entry_batch_rejects_malformed_json() {
        let err = EntryBatch::try_from(json!([["only-key"]])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidBatch(_)));
        let err = EntryBatch::try_from(json!([[1, 2]])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidBatch(_)));
        let err = EntryBatch::try_from(json!("nope")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidBatch(_)));
    }

    #[test]
    fn key_batch_uses_map_keys_and_ignores_values() {
        let keys = KeyBatch::try_from(json!({ "hello": null, "meaning": 3 })).unwrap();
        let mut keys = keys.into_inner();
        keys.sort();
        assert_eq!(keys, vec!["hello", "meaning"]);

        let keys = KeyBatch::from(["a", "b"]);
        assert_eq!(keys.as_slice(), ["a".to_owned(), "b".to_owned()]);

        let err = KeyBatch::try_from(json!([1])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidBatch(_)));
    }
}
