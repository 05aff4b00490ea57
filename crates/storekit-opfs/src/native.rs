//! Native stand-ins for the browser: a directory on disk as the origin-private root and a
//! thread as the dedicated worker.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::channel::mpsc;
use serde_json::Value;
use storekit_core::{async_trait, BackendError};

use crate::fs::{validate_name, DirectoryHandle, FileHandle, FsResult, RootProvider, WritableFile};
use crate::options::WorkerOptions;
use crate::proxy::{WorkerInbox, WorkerSpawner, WorkerTransport};
use crate::worker::OpfsWorker;

/// Subdirectory of the root holding `.crswap` files for writes in flight. Being a directory,
/// it never shows up as a key.
const STAGING_DIR: &str = ".crswap";

/// A directory on disk used as the origin-private root. Only regular files count as entries.
#[derive(Debug, Clone)]
pub struct NativeDirectory {
    path: PathBuf,
}

impl NativeDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry_path(&self, name: &str) -> FsResult<PathBuf> {
        validate_name(name)?;
        if name == STAGING_DIR {
            return Err(BackendError::new(
                "TypeError",
                format!("{name} is reserved for in-flight writes"),
            ));
        }
        Ok(self.path.join(name))
    }

    fn file_names(&self) -> FsResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => tracing::debug!(?name, "skipping non UTF-8 file name"),
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl RootProvider for NativeDirectory {
    type Directory = NativeDirectory;

    async fn open_root(&self) -> FsResult<NativeDirectory> {
        fs::create_dir_all(&self.path)?;
        Ok(self.clone())
    }
}

#[async_trait]
impl DirectoryHandle for NativeDirectory {
    type File = NativeFile;

    async fn get_file_handle(&self, name: &str, create: bool) -> FsResult<NativeFile> {
        let path = self.entry_path(name)?;
        if create {
            OpenOptions::new().create(true).append(true).open(&path)?;
        } else if !path.is_file() {
            return Err(BackendError::not_found(format!("{name} was not found")));
        }
        Ok(NativeFile { path })
    }

    async fn remove_entry(&self, name: &str) -> FsResult<()> {
        fs::remove_file(self.entry_path(name)?)?;
        Ok(())
    }

    async fn keys(&self) -> FsResult<Vec<String>> {
        self.file_names()
    }

    async fn entries(&self) -> FsResult<Vec<(String, NativeFile)>> {
        Ok(self
            .file_names()?
            .into_iter()
            .map(|name| {
                let path = self.path.join(&name);
                (name, NativeFile { path })
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct NativeFile {
    path: PathBuf,
}

#[async_trait]
impl FileHandle for NativeFile {
    type Writable = NativeWritable;
    type SyncHandle = File;

    async fn text(&self) -> FsResult<String> {
        Ok(fs::read_to_string(&self.path)?)
    }

    async fn create_writable(&self) -> FsResult<NativeWritable> {
        Ok(NativeWritable {
            path: self.path.clone(),
            buffer: String::new(),
        })
    }

    async fn create_sync_access_handle(&self) -> FsResult<File> {
        Ok(OpenOptions::new().read(true).write(true).open(&self.path)?)
    }
}

/// Buffers writes and replaces the file on close, through a temporary file and a rename so a
/// failed write leaves the old contents in place.
#[derive(Debug)]
pub struct NativeWritable {
    path: PathBuf,
    buffer: String,
}

impl NativeWritable {
    fn staging_path(&self) -> FsResult<PathBuf> {
        let (Some(dir), Some(name)) = (self.path.parent(), self.path.file_name()) else {
            return Err(BackendError::new(
                "InvalidStateError",
                format!("{} has no parent directory", self.path.display()),
            ));
        };
        let staging = dir.join(STAGING_DIR);
        fs::create_dir_all(&staging)?;

        let mut tmp_name = name.to_os_string();
        tmp_name.push(".crswap");
        Ok(staging.join(tmp_name))
    }
}

#[async_trait]
impl WritableFile for NativeWritable {
    async fn write(&mut self, data: &str) -> FsResult<()> {
        self.buffer.push_str(data);
        Ok(())
    }

    async fn close(&mut self) -> FsResult<()> {
        let tmp = self.staging_path()?;
        let written = File::create(&tmp).and_then(|mut file| {
            file.write_all(self.buffer.as_bytes())?;
            file.sync_data()
        });
        if let Err(err) = written.and_then(|()| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        self.buffer.clear();
        Ok(())
    }
}

/// Spawns an [`OpfsWorker`] on a named thread for every worker the proxy starts.
#[derive(Debug, Clone)]
pub struct ThreadWorkerSpawner<P> {
    provider: P,
}

impl<P> ThreadWorkerSpawner<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P> WorkerSpawner for ThreadWorkerSpawner<P>
where
    P: RootProvider + Clone + 'static,
{
    type Transport = ThreadWorker;

    fn spawn(&self, options: &WorkerOptions, inbox: WorkerInbox) -> FsResult<ThreadWorker> {
        let (tx, rx) = mpsc::unbounded::<Value>();
        let worker = OpfsWorker::new(self.provider.clone());
        let terminated = Arc::new(AtomicBool::new(false));
        let thread_terminated = Arc::clone(&terminated);

        // Like a browser worker, each thread owns its own event loop.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        std::thread::Builder::new()
            .name(options.name.clone())
            .spawn(move || {
                runtime.block_on(worker.serve(rx, |message| inbox.deliver(message)));
                // After `terminate` the inbox may already belong to a replacement worker.
                if !thread_terminated.load(Ordering::Acquire) {
                    inbox.disconnect("worker thread exited");
                }
            })?;

        Ok(ThreadWorker {
            tx: Arc::new(tx),
            terminated,
        })
    }
}

/// Posting end of a worker thread. Terminating closes the channel; the thread finishes the
/// message in hand and exits.
#[derive(Debug, Clone)]
pub struct ThreadWorker {
    tx: Arc<mpsc::UnboundedSender<Value>>,
    terminated: Arc<AtomicBool>,
}

impl WorkerTransport for ThreadWorker {
    fn post_message(&self, message: &Value) -> FsResult<()> {
        self.tx
            .unbounded_send(message.clone())
            .map_err(|_| BackendError::new("InvalidStateError", "worker has terminated"))
    }

    fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
        self.tx.close_channel();
    }
}
