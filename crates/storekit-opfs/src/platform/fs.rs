use js_sys::{Function, Promise, Reflect};
use storekit_core::{async_trait, BackendError};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    FileSystemDirectoryHandle, FileSystemFileHandle, FileSystemGetFileOptions,
    FileSystemSyncAccessHandle, FileSystemWritableFileStream,
};

use super::{backend_error_from_js, type_error, BrowserSyncHandle};
use crate::fs::{DirectoryHandle, FileHandle, FsResult, RootProvider, WritableFile};

async fn resolve(promise: Promise) -> FsResult<JsValue> {
    JsFuture::from(promise).await.map_err(backend_error_from_js)
}

fn storage_manager() -> FsResult<web_sys::StorageManager> {
    if let Some(window) = web_sys::window() {
        return Ok(window.navigator().storage());
    }
    let scope = js_sys::global()
        .dyn_into::<web_sys::WorkerGlobalScope>()
        .map_err(|_| BackendError::new("NotSupportedError", "no window or worker scope"))?;
    Ok(scope.navigator().storage())
}

/// `navigator.storage.getDirectory()` of the current global.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserRoot;

#[async_trait(?Send)]
impl RootProvider for BrowserRoot {
    type Directory = BrowserDirectory;

    async fn open_root(&self) -> FsResult<BrowserDirectory> {
        let root = resolve(storage_manager()?.get_directory()).await?;
        root.dyn_into::<FileSystemDirectoryHandle>()
            .map(BrowserDirectory)
            .map_err(|_| type_error("getDirectory did not return a directory handle"))
    }
}

#[derive(Debug, Clone)]
pub struct BrowserDirectory(FileSystemDirectoryHandle);

impl BrowserDirectory {
    /// Drain the directory's `entries()` async iterator, keeping file entries only.
    async fn file_entries(&self) -> FsResult<Vec<(String, FileSystemFileHandle)>> {
        let entries = Reflect::get(&self.0, &JsValue::from_str("entries"))
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok())
            .ok_or_else(|| type_error("directory handle has no entries()"))?;
        let iter = entries.call0(&self.0).map_err(backend_error_from_js)?;
        let next = Reflect::get(&iter, &JsValue::from_str("next"))
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok())
            .ok_or_else(|| type_error("entries() did not return an async iterator"))?;

        let mut files = Vec::new();
        loop {
            let step = next.call0(&iter).map_err(backend_error_from_js)?;
            let step = resolve(step.unchecked_into()).await?;
            let done = Reflect::get(&step, &JsValue::from_str("done")).map_err(backend_error_from_js)?;
            if done.as_bool().unwrap_or(false) {
                break;
            }
            let pair: js_sys::Array = Reflect::get(&step, &JsValue::from_str("value"))
                .map_err(backend_error_from_js)?
                .unchecked_into();
            let (Some(name), Ok(handle)) = (
                pair.get(0).as_string(),
                pair.get(1).dyn_into::<FileSystemFileHandle>(),
            ) else {
                continue;
            };
            files.push((name, handle));
        }
        Ok(files)
    }
}

#[async_trait(?Send)]
impl DirectoryHandle for BrowserDirectory {
    type File = BrowserFile;

    async fn get_file_handle(&self, name: &str, create: bool) -> FsResult<BrowserFile> {
        let options = FileSystemGetFileOptions::new();
        options.set_create(create);
        let handle = resolve(self.0.get_file_handle_with_options(name, &options)).await?;
        handle
            .dyn_into::<FileSystemFileHandle>()
            .map(BrowserFile)
            .map_err(|_| type_error("getFileHandle did not return a file handle"))
    }

    async fn remove_entry(&self, name: &str) -> FsResult<()> {
        resolve(self.0.remove_entry(name)).await?;
        Ok(())
    }

    async fn keys(&self) -> FsResult<Vec<String>> {
        Ok(self
            .file_entries()
            .await?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    async fn entries(&self) -> FsResult<Vec<(String, BrowserFile)>> {
        Ok(self
            .file_entries()
            .await?
            .into_iter()
            .map(|(name, handle)| (name, BrowserFile(handle)))
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct BrowserFile(FileSystemFileHandle);

#[async_trait(?Send)]
impl FileHandle for BrowserFile {
    type Writable = BrowserWritable;
    type SyncHandle = BrowserSyncHandle;

    async fn text(&self) -> FsResult<String> {
        let file: web_sys::File = resolve(self.0.get_file()).await?.unchecked_into();
        let text = resolve(file.text()).await?;
        text.as_string()
            .ok_or_else(|| type_error("file text was not a string"))
    }

    async fn create_writable(&self) -> FsResult<BrowserWritable> {
        let stream = resolve(self.0.create_writable()).await?;
        stream
            .dyn_into::<FileSystemWritableFileStream>()
            .map(BrowserWritable)
            .map_err(|_| type_error("createWritable did not return a stream"))
    }

    async fn create_sync_access_handle(&self) -> FsResult<BrowserSyncHandle> {
        let handle = resolve(self.0.create_sync_access_handle()).await?;
        handle
            .dyn_into::<FileSystemSyncAccessHandle>()
            .map(BrowserSyncHandle::new)
            .map_err(|_| type_error("createSyncAccessHandle did not return a sync handle"))
    }
}

#[derive(Debug)]
pub struct BrowserWritable(FileSystemWritableFileStream);

#[async_trait(?Send)]
impl WritableFile for BrowserWritable {
    async fn write(&mut self, data: &str) -> FsResult<()> {
        let promise = self.0.write_with_str(data).map_err(backend_error_from_js)?;
        resolve(promise).await?;
        Ok(())
    }

    async fn close(&mut self) -> FsResult<()> {
        resolve(self.0.close()).await?;
        Ok(())
    }
}
