//! In-memory origin-private file system.
//!
//! Models the browser behaviour the adapters depend on: missing entries report `NotFoundError`,
//! a file accepts only one sync access handle at a time, and writes past an optional byte quota
//! fail with `QuotaExceededError`.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use storekit_core::{async_trait, platform, BackendError};

use crate::fs::{validate_name, DirectoryHandle, FileHandle, FsResult, RootProvider, WritableFile};
use crate::sync_file::SyncAccessHandle;

#[derive(Debug, Default)]
struct FsState {
    files: BTreeMap<String, Vec<u8>>,
    locked: BTreeSet<String>,
    root_opens: usize,
    quota_bytes: Option<usize>,
}

impl FsState {
    fn fits(&self, name: &str, new_len: usize) -> bool {
        let Some(quota) = self.quota_bytes else {
            return true;
        };
        let others: usize = self
            .files
            .iter()
            .filter(|(k, _)| k.as_str() != name)
            .map(|(_, data)| data.len())
            .sum();
        others + new_len <= quota
    }
}

fn lock(state: &Mutex<FsState>) -> MutexGuard<'_, FsState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn not_found(name: &str) -> BackendError {
    BackendError::not_found(format!("{name} was not found"))
}

/// Root provider over shared in-memory state. Clones see the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    state: Arc<Mutex<FsState>>,
    open_delay: Option<Duration>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the total size of all file contents.
    pub fn with_quota(quota_bytes: usize) -> Self {
        let fs = Self::default();
        lock(&fs.state).quota_bytes = Some(quota_bytes);
        fs
    }

    /// Make opening the root take `delay`, so concurrent first calls overlap.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// How many times the root directory has been opened.
    pub fn root_opens(&self) -> usize {
        lock(&self.state).root_opens
    }

    /// File contents as text, bypassing the adapters.
    pub fn raw(&self, name: &str) -> Option<String> {
        lock(&self.state)
            .files
            .get(name)
            .map(|data| String::from_utf8_lossy(data).into_owned())
    }

    pub fn is_locked(&self, name: &str) -> bool {
        lock(&self.state).locked.contains(name)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl RootProvider for MemoryFs {
    type Directory = MemoryDirectory;

    async fn open_root(&self) -> FsResult<MemoryDirectory> {
        if let Some(delay) = self.open_delay {
            platform::sleep(delay).await;
        }
        lock(&self.state).root_opens += 1;
        Ok(MemoryDirectory {
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct MemoryDirectory {
    state: Arc<Mutex<FsState>>,
}

impl MemoryDirectory {
    fn file(&self, name: &str) -> MemoryFile {
        MemoryFile {
            state: Arc::clone(&self.state),
            name: name.to_owned(),
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl DirectoryHandle for MemoryDirectory {
    type File = MemoryFile;

    async fn get_file_handle(&self, name: &str, create: bool) -> FsResult<MemoryFile> {
        validate_name(name)?;
        let mut state = lock(&self.state);
        if !state.files.contains_key(name) {
            if !create {
                return Err(not_found(name));
            }
            state.files.insert(name.to_owned(), Vec::new());
        }
        Ok(self.file(name))
    }

    async fn remove_entry(&self, name: &str) -> FsResult<()> {
        validate_name(name)?;
        let mut state = lock(&self.state);
        if state.locked.contains(name) {
            return Err(BackendError::new(
                BackendError::NO_MODIFICATION_ALLOWED,
                format!("{name} has an open access handle"),
            ));
        }
        state
            .files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    async fn keys(&self) -> FsResult<Vec<String>> {
        Ok(lock(&self.state).files.keys().cloned().collect())
    }

    async fn entries(&self) -> FsResult<Vec<(String, MemoryFile)>> {
        let names: Vec<String> = lock(&self.state).files.keys().cloned().collect();
        Ok(names
            .into_iter()
            .map(|name| {
                let file = self.file(&name);
                (name, file)
            })
            .collect())
    }
}

#[derive(Debug)]
pub struct MemoryFile {
    state: Arc<Mutex<FsState>>,
    name: String,
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl FileHandle for MemoryFile {
    type Writable = MemoryWritable;
    type SyncHandle = MemorySyncHandle;

    async fn text(&self) -> FsResult<String> {
        lock(&self.state)
            .files
            .get(&self.name)
            .map(|data| String::from_utf8_lossy(data).into_owned())
            .ok_or_else(|| not_found(&self.name))
    }

    async fn create_writable(&self) -> FsResult<MemoryWritable> {
        Ok(MemoryWritable {
            state: Arc::clone(&self.state),
            name: self.name.clone(),
            buffer: String::new(),
        })
    }

    async fn create_sync_access_handle(&self) -> FsResult<MemorySyncHandle> {
        let mut state = lock(&self.state);
        if !state.files.contains_key(&self.name) {
            return Err(not_found(&self.name));
        }
        if !state.locked.insert(self.name.clone()) {
            return Err(BackendError::new(
                BackendError::NO_MODIFICATION_ALLOWED,
                format!("{} already has an open access handle", self.name),
            ));
        }
        Ok(MemorySyncHandle {
            state: Arc::clone(&self.state),
            name: self.name.clone(),
            open: true,
        })
    }
}

/// Buffers writes and swaps the file contents on close.
#[derive(Debug)]
pub struct MemoryWritable {
    state: Arc<Mutex<FsState>>,
    name: String,
    buffer: String,
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl WritableFile for MemoryWritable {
    async fn write(&mut self, data: &str) -> FsResult<()> {
        self.buffer.push_str(data);
        Ok(())
    }

    async fn close(&mut self) -> FsResult<()> {
        let mut state = lock(&self.state);
        if !state.fits(&self.name, self.buffer.len()) {
            return Err(BackendError::quota_exceeded(format!(
                "writing {} exceeds the storage quota",
                self.name
            )));
        }
        let data = std::mem::take(&mut self.buffer).into_bytes();
        state.files.insert(self.name.clone(), data);
        Ok(())
    }
}

/// Exclusive positioned access to one file. Releases the lock on close or drop.
#[derive(Debug)]
pub struct MemorySyncHandle {
    state: Arc<Mutex<FsState>>,
    name: String,
    open: bool,
}

impl MemorySyncHandle {
    fn with_data<T>(&self, f: impl FnOnce(&mut FsState) -> io::Result<T>) -> io::Result<T> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "access handle is closed"));
        }
        let mut state = lock(&self.state);
        if !state.files.contains_key(&self.name) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "file was removed"));
        }
        f(&mut state)
    }

    fn release(&mut self) {
        if std::mem::replace(&mut self.open, false) {
            lock(&self.state).locked.remove(&self.name);
        }
    }
}

fn to_index(value: u64) -> io::Result<usize> {
    value
        .try_into()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset overflow"))
}

impl SyncAccessHandle for MemorySyncHandle {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let offset = to_index(offset)?;
        self.with_data(|state| {
            let data = &state.files[&self.name];
            if offset >= data.len() {
                return Ok(0);
            }
            let len = (data.len() - offset).min(buf.len());
            buf[..len].copy_from_slice(&data[offset..offset + len]);
            Ok(len)
        })
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        let offset = to_index(offset)?;
        let name = self.name.clone();
        self.with_data(|state| {
            let end = offset
                .checked_add(buf.len())
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "offset overflow"))?;
            let new_len = end.max(state.files[&name].len());
            if !state.fits(&name, new_len) {
                return Err(io::Error::new(
                    io::ErrorKind::StorageFull,
                    "write exceeds the storage quota",
                ));
            }
            let data = state.files.entry(name).or_default();
            if end > data.len() {
                data.resize(end, 0);
            }
            data[offset..end].copy_from_slice(buf);
            Ok(buf.len())
        })
    }

    fn get_size(&mut self) -> io::Result<u64> {
        self.with_data(|state| Ok(state.files[&self.name].len() as u64))
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        let size = to_index(size)?;
        self.with_data(|state| {
            if let Some(data) = state.files.get_mut(&self.name) {
                data.resize(size, 0);
            }
            Ok(())
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_data(|_| Ok(()))
    }

    fn close(&mut self) -> io::Result<()> {
        self.release();
        Ok(())
    }
}

impl Drop for MemorySyncHandle {
    fn drop(&mut self) {
        self.release();
    }
}
