use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::batch::{self, EntryBatch, KeyBatch};
use crate::platform::MaybeSendSync;
use crate::Result;

/// Discriminant identifying which backend an adapter talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageType {
    Cookie,
    LocalStorage,
    SessionStorage,
    Cache,
    Idb,
    Opfs,
    OpfsWorker,
}

impl StorageType {
    pub const ALL: [StorageType; 7] = [
        StorageType::Cookie,
        StorageType::LocalStorage,
        StorageType::SessionStorage,
        StorageType::Cache,
        StorageType::Idb,
        StorageType::Opfs,
        StorageType::OpfsWorker,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StorageType::Cookie => "cookie",
            StorageType::LocalStorage => "local-storage",
            StorageType::SessionStorage => "session-storage",
            StorageType::Cache => "cache",
            StorageType::Idb => "idb",
            StorageType::Opfs => "opfs",
            StorageType::OpfsWorker => "opfs-worker",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown storage type `{0}`")]
pub struct UnknownStorageType(pub String);

impl FromStr for StorageType {
    type Err = UnknownStorageType;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        StorageType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| UnknownStorageType(s.to_owned()))
    }
}

/// The key/value contract shared by every backend.
///
/// Keys are strings; values are JSON. All adapters expose the same shape so callers can swap
/// backends without changing code. Missing keys read as `null`, and removing a missing key
/// succeeds.
///
/// The batch operations are concurrent fan-out/fan-in over the single-key calls, not
/// transactions: a failing key does not roll back the others, and `set_many`/`remove_many` only
/// report whether *every* key succeeded.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait StorageAdapter: MaybeSendSync {
    fn storage_type(&self) -> StorageType;

    async fn has(&self, key: &str) -> Result<bool>;

    /// Decoded value stored under `key`, or `null` when missing.
    async fn get(&self, key: &str) -> Result<Value>;

    /// Store `value` under `key`.
    ///
    /// Fails with [`StoreError::QuotaExceeded`](crate::StoreError::QuotaExceeded) when the
    /// backend is full.
    async fn set(&self, key: &str, value: &Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// All keys in this store's namespace. Order is backend-defined.
    async fn keys(&self) -> Result<Vec<String>>;

    async fn entries(&self) -> Result<Vec<(String, Value)>>;

    async fn set_many(&self, entries: EntryBatch) -> bool {
        batch::set_many(self, entries).await
    }

    /// Values for `keys`, positionally aligned with the input.
    async fn get_many(&self, keys: KeyBatch) -> Result<Vec<Value>> {
        batch::get_many(self, keys).await
    }

    async fn remove_many(&self, keys: KeyBatch) -> bool {
        batch::remove_many(self, keys).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminants_round_trip_through_strings() {
        for ty in StorageType::ALL {
            assert_eq!(ty.as_str().parse::<StorageType>().unwrap(), ty);
            assert_eq!(
                serde_json::to_value(ty).unwrap(),
                Value::String(ty.to_string())
            );
        }
        assert_eq!(StorageType::OpfsWorker.to_string(), "opfs-worker");
    }

    #[test]
    fn unknown_discriminant_is_rejected() {
        let err = "websql".parse::<StorageType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown storage type `websql`");
    }
}
