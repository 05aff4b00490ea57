use serde_json::Value;
use storekit_core::value::{encode_text, safe_json_parse};
use storekit_core::{async_trait, Result, StorageAdapter, StorageType, StoreError};

use crate::fs::{DirectoryHandle, FileHandle, RootProvider, WritableFile};
use crate::root::RootDirectory;

/// Adapter that keeps one file per key in the origin-private root directory, accessed directly
/// from the calling thread.
///
/// Writes go through a writable stream that replaces the file on close. Values are stored as
/// text (objects as JSON) and decoded leniently on read.
#[derive(Debug)]
pub struct OpfsAdapter<P: RootProvider> {
    root: RootDirectory<P>,
}

impl<P: RootProvider> OpfsAdapter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            root: RootDirectory::new(provider),
        }
    }

    pub fn root(&self) -> &RootDirectory<P> {
        &self.root
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<P: RootProvider> StorageAdapter for OpfsAdapter<P> {
    fn storage_type(&self) -> StorageType {
        StorageType::Opfs
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let root = self.root.get().await?;
        Ok(root.keys().await?.iter().any(|name| name == key))
    }

    async fn get(&self, key: &str) -> Result<Value> {
        let root = self.root.get().await?;
        let file = match root.get_file_handle(key, false).await {
            Ok(file) => file,
            Err(err) if err.is_not_found() => return Ok(Value::Null),
            Err(err) => return Err(err.into()),
        };
        let text = file.text().await?;
        Ok(safe_json_parse(Some(&text)))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let root = self.root.get().await?;
        let text = encode_text(value);
        let write = async {
            let file = root.get_file_handle(key, true).await?;
            let mut writable = file.create_writable().await?;
            writable.write(&text).await?;
            writable.close().await
        };
        write
            .await
            .map_err(|err| StoreError::from_write(StorageType::Opfs, err))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let root = self.root.get().await?;
        match root.remove_entry(key).await {
            Err(err) if !err.is_not_found() => Err(err.into()),
            _ => Ok(()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let root = self.root.get().await?;
        Ok(root.keys().await?)
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>> {
        let root = self.root.get().await?;
        let mut entries = Vec::new();
        for (name, file) in root.entries().await? {
            // Removed between listing and reading.
            let text = match file.text().await {
                Ok(text) => text,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err.into()),
            };
            entries.push((name, safe_json_parse(Some(&text))));
        }
        Ok(entries)
    }
}
