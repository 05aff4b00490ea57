//! The worker side of the OPFS worker protocol.

use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use storekit_core::value::encode_text;
use storekit_core::BackendError;

use crate::fs::{DirectoryHandle, FileHandle, FsResult, RootProvider};
use crate::protocol::{WorkerReply, WorkerRequest};
use crate::root::RootDirectory;
use crate::sync_file::SyncFile;

/// Executes protocol requests against the origin-private file system with synchronous access
/// handles.
///
/// Every request gets exactly one reply: a failed operation answers `<op>-error` and a message
/// that is not a valid request answers `error`, so the proxy is never left waiting.
#[derive(Debug)]
pub struct OpfsWorker<P: RootProvider> {
    root: RootDirectory<P>,
}

impl<P: RootProvider> OpfsWorker<P> {
    pub fn new(provider: P) -> Self {
        Self {
            root: RootDirectory::new(provider),
        }
    }

    pub fn root(&self) -> &RootDirectory<P> {
        &self.root
    }

    /// Announce readiness, then answer `incoming` in order until it ends.
    ///
    /// The caller must already be receiving messages into `incoming` when this is called.
    pub async fn serve<S, F>(&self, mut incoming: S, mut post: F)
    where
        S: Stream<Item = Value> + Unpin,
        F: FnMut(Value),
    {
        post(WorkerReply::Ready.to_message());
        while let Some(message) = incoming.next().await {
            post(self.handle_message(&message).await);
        }
        tracing::debug!("worker message stream closed");
    }

    /// Answer one inbound message.
    pub async fn handle_message(&self, message: &Value) -> Value {
        let request = match WorkerRequest::from_message(message) {
            Ok(request) => request,
            Err(err) => {
                tracing::error!(error = %err, %message, "unrecognized message from host");
                return WorkerReply::Failed {
                    operation: None,
                    error: BackendError::new("TypeError", err.to_string()),
                }
                .to_message();
            }
        };

        let operation = request.operation();
        let reply = match self.execute(request).await {
            Ok(result) => WorkerReply::Complete { operation, result },
            Err(err) => {
                tracing::debug!(%operation, error = %err, "worker operation failed");
                WorkerReply::Failed {
                    operation: Some(operation),
                    error: err,
                }
            }
        };
        reply.to_message()
    }

    async fn execute(&self, request: WorkerRequest) -> FsResult<Value> {
        Ok(match request {
            WorkerRequest::Has { key } => Value::Bool(self.has(&key).await?),
            WorkerRequest::Get { key } => text_or_null(self.read(&key).await?),
            WorkerRequest::Set { key, value } => {
                self.write(&key, &value).await?;
                Value::Bool(true)
            }
            WorkerRequest::Remove { key } => {
                self.remove(&key).await?;
                Value::Bool(true)
            }
            WorkerRequest::Keys => json!(self.root.get().await?.keys().await?),
            WorkerRequest::Entries => {
                let root = self.root.get().await?;
                let mut entries = Vec::new();
                for name in root.keys().await? {
                    let text = self.read(&name).await?;
                    entries.push(json!([name, text_or_null(text)]));
                }
                Value::Array(entries)
            }
            WorkerRequest::GetMany { keys } => {
                let mut values = Vec::with_capacity(keys.len());
                for key in keys {
                    values.push(text_or_null(self.read(&key).await?));
                }
                Value::Array(values)
            }
            WorkerRequest::SetMany { entries } => {
                let mut all_ok = true;
                for (key, value) in entries {
                    if let Err(err) = self.write(&key, &value).await {
                        tracing::warn!(%key, error = %err, "batch write failed");
                        all_ok = false;
                    }
                }
                Value::Bool(all_ok)
            }
            WorkerRequest::RemoveMany { keys } => {
                let mut all_ok = true;
                for key in keys {
                    if let Err(err) = self.remove(&key).await {
                        tracing::warn!(%key, error = %err, "batch remove failed");
                        all_ok = false;
                    }
                }
                Value::Bool(all_ok)
            }
        })
    }

    async fn has(&self, key: &str) -> FsResult<bool> {
        let root = self.root.get().await?;
        Ok(root.keys().await?.iter().any(|name| name == key))
    }

    /// Full file text, or `None` when the file is missing or empty.
    async fn read(&self, key: &str) -> FsResult<Option<String>> {
        let root = self.root.get().await?;
        let file = match root.get_file_handle(key, false).await {
            Ok(file) => file,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let mut handle = SyncFile::from_handle(file.create_sync_access_handle().await?);
        let text = handle.read_text()?;
        handle.close()?;
        Ok((!text.is_empty()).then_some(text))
    }

    async fn write(&self, key: &str, value: &Value) -> FsResult<()> {
        let root = self.root.get().await?;
        let file = root.get_file_handle(key, true).await?;
        let mut handle = SyncFile::from_handle(file.create_sync_access_handle().await?);
        handle.replace_contents(encode_text(value).as_bytes())?;
        handle.close()?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> FsResult<()> {
        let root = self.root.get().await?;
        match root.remove_entry(key).await {
            Err(err) if !err.is_not_found() => Err(err),
            _ => Ok(()),
        }
    }
}

fn text_or_null(text: Option<String>) -> Value {
    text.map(Value::String).unwrap_or(Value::Null)
}

