//! The calling side of the OPFS worker protocol.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::channel::oneshot;
use serde::de::DeserializeOwned;
use serde_json::Value;
use storekit_core::platform::{with_deadline, MaybeSendSync};
use storekit_core::value::decode_value;
use storekit_core::{
    async_trait, BackendError, EntryBatch, KeyBatch, ProtocolError, Result, StorageAdapter,
    StorageType, StoreError,
};

use crate::options::WorkerOptions;
use crate::protocol::{Expected, Operation, WorkerReply, WorkerRequest};

/// Sending half of a running worker (`Worker.postMessage`).
pub trait WorkerTransport: MaybeSendSync {
    fn post_message(&self, message: &Value) -> std::result::Result<(), BackendError>;

    fn terminate(&self);
}

/// Starts workers. Everything the worker posts back must be passed to
/// [`WorkerInbox::deliver`], and [`WorkerInbox::disconnect`] must be called if the worker dies.
pub trait WorkerSpawner: MaybeSendSync {
    type Transport: WorkerTransport;

    fn spawn(
        &self,
        options: &WorkerOptions,
        inbox: WorkerInbox,
    ) -> std::result::Result<Self::Transport, BackendError>;
}

type Outcome = Result<Value>;

#[derive(Default)]
struct InboxState {
    listeners: VecDeque<(Expected, oneshot::Sender<Outcome>)>,
    closed: Option<String>,
}

/// FIFO of callers waiting on the worker, fed by the worker's messages.
///
/// Each inbound message is compared with the oldest listener only. A listener whose caller gave
/// up (timed out) keeps its place, so the late reply it was owed is consumed by it and not by the
/// next request.
#[derive(Clone, Default)]
pub struct WorkerInbox {
    state: Arc<Mutex<InboxState>>,
}

impl fmt::Debug for WorkerInbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerInbox")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl WorkerInbox {
    fn lock(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of listeners still waiting, abandoned ones included.
    pub fn pending(&self) -> usize {
        self.lock().listeners.len()
    }

    fn listen(&self, expected: Expected) -> Result<oneshot::Receiver<Outcome>> {
        let mut state = self.lock();
        if state.closed.is_some() {
            return Err(StoreError::WorkerDisconnected);
        }
        let (tx, rx) = oneshot::channel();
        state.listeners.push_back((expected, tx));
        Ok(rx)
    }

    /// Whether the worker has gone away since the inbox was last reset.
    pub fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }

    /// Drop every listener and reopen the inbox for a fresh worker.
    fn reset(&self) {
        let mut state = self.lock();
        state.listeners.clear();
        state.closed = None;
    }

    /// Route one message posted by the worker.
    pub fn deliver(&self, message: Value) {
        let reply = match WorkerReply::from_message(&message) {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(error = %err, %message, "unrecognized message from worker");
                return;
            }
        };

        let (expected, tx) = {
            let mut state = self.lock();
            match state.listeners.front() {
                Some((expected, _)) if reply.answers(*expected) => {}
                Some((expected, _)) => {
                    tracing::error!(%expected, %message, "unexpected message from worker");
                    return;
                }
                None => {
                    tracing::error!(%message, "message from worker with no request pending");
                    return;
                }
            }
            match state.listeners.pop_front() {
                Some(listener) => listener,
                None => return,
            }
        };

        let outcome = match reply {
            WorkerReply::Ready => Ok(Value::Bool(true)),
            WorkerReply::Complete { result, .. } => Ok(result),
            WorkerReply::Failed { error, .. } if error.is_quota_exceeded() => {
                Err(StoreError::QuotaExceeded {
                    backend: StorageType::OpfsWorker,
                    source: Some(error),
                })
            }
            WorkerReply::Failed { error, .. } => Err(StoreError::Worker(error.to_string())),
        };
        if tx.send(outcome).is_err() {
            tracing::debug!(%expected, "dropped reply for an abandoned request");
        }
    }

    /// Fail every waiting caller; later requests fail until a new worker is spawned.
    pub fn disconnect(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let listeners = {
            let mut state = self.lock();
            state.closed = Some(reason.clone());
            std::mem::take(&mut state.listeners)
        };
        tracing::warn!(%reason, pending = listeners.len(), "OPFS worker disconnected");
        for (_, tx) in listeners {
            let _ = tx.send(Err(StoreError::WorkerDisconnected));
        }
    }
}

/// Adapter that runs every operation in a dedicated OPFS worker.
///
/// The worker is spawned on first use and must announce itself with `{ ready: true }` before the
/// first request is posted. At most one request is outstanding at a time; later callers wait
/// their turn, so replies arrive in the order the requests were issued. Batch operations travel
/// as one message each.
pub struct OpfsWorkerAdapter<S: WorkerSpawner> {
    spawner: S,
    options: WorkerOptions,
    inbox: WorkerInbox,
    worker: futures::lock::Mutex<Option<Arc<S::Transport>>>,
    in_flight: futures::lock::Mutex<()>,
}

impl<S: WorkerSpawner + fmt::Debug> fmt::Debug for OpfsWorkerAdapter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpfsWorkerAdapter")
            .field("spawner", &self.spawner)
            .field("options", &self.options)
            .field("inbox", &self.inbox)
            .finish_non_exhaustive()
    }
}

impl<S: WorkerSpawner> OpfsWorkerAdapter<S> {
    pub fn new(spawner: S) -> Self {
        Self::with_options(spawner, WorkerOptions::default())
    }

    pub fn with_options(spawner: S, options: WorkerOptions) -> Self {
        Self {
            spawner,
            options,
            inbox: WorkerInbox::default(),
            worker: futures::lock::Mutex::new(None),
            in_flight: futures::lock::Mutex::new(()),
        }
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn inbox(&self) -> &WorkerInbox {
        &self.inbox
    }

    async fn worker(&self) -> Result<Arc<S::Transport>> {
        let mut slot = self.worker.lock().await;
        if let Some(worker) = slot.as_ref() {
            if !self.inbox.is_closed() {
                return Ok(Arc::clone(worker));
            }
            // Died while idle.
            worker.terminate();
            *slot = None;
        }

        // Listen before spawning: the worker may announce itself immediately.
        self.inbox.reset();
        let ready = self.inbox.listen(Expected::Ready)?;
        let worker = self.spawner.spawn(&self.options, self.inbox.clone())?;
        tracing::debug!(name = %self.options.name, "spawned OPFS worker");

        let timeout = self.options.ready_timeout();
        let outcome = match with_deadline(ready, timeout).await {
            Some(Ok(outcome)) => outcome,
            Some(Err(oneshot::Canceled)) => Err(StoreError::WorkerDisconnected),
            None => Err(StoreError::WorkerTimeout {
                operation: "ready",
                timeout: timeout.unwrap_or(Duration::ZERO),
            }),
        };
        if let Err(err) = outcome {
            worker.terminate();
            return Err(err);
        }
        tracing::debug!(name = %self.options.name, "OPFS worker ready");

        let worker = Arc::new(worker);
        *slot = Some(Arc::clone(&worker));
        Ok(worker)
    }

    /// Drop a dead worker so the next call spawns a fresh one.
    async fn forget_worker(&self) {
        if let Some(worker) = self.worker.lock().await.take() {
            worker.terminate();
        }
    }

    async fn round_trip(&self, request: WorkerRequest) -> Result<Value> {
        let _in_flight = self.in_flight.lock().await;
        let worker = self.worker().await?;

        let operation = request.operation();
        let outcome = match self.inbox.listen(Expected::Reply(operation)) {
            Ok(reply) => match worker.post_message(&request.to_message()) {
                Ok(()) => self.await_reply(operation, reply).await,
                Err(err) => {
                    self.inbox.disconnect(err.to_string());
                    Err(err.into())
                }
            },
            Err(err) => Err(err),
        };

        if matches!(outcome, Err(StoreError::WorkerDisconnected)) {
            self.forget_worker().await;
        }
        outcome
    }

    async fn await_reply(
        &self,
        operation: Operation,
        reply: oneshot::Receiver<Outcome>,
    ) -> Result<Value> {
        let timeout = self.options.request_timeout();
        match with_deadline(reply, timeout).await {
            Some(Ok(outcome)) => outcome,
            Some(Err(oneshot::Canceled)) => Err(StoreError::WorkerDisconnected),
            None => {
                tracing::warn!(%operation, "OPFS worker request timed out");
                Err(StoreError::WorkerTimeout {
                    operation: operation.as_str(),
                    timeout: timeout.unwrap_or(Duration::ZERO),
                })
            }
        }
    }
}

impl<S: WorkerSpawner> Drop for OpfsWorkerAdapter<S> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.terminate();
        }
    }
}

fn unexpected(operation: Operation, reason: impl fmt::Display) -> StoreError {
    StoreError::Protocol(ProtocolError::UnexpectedReply {
        operation: operation.as_str(),
        reason: reason.to_string(),
    })
}

fn expect_bool(operation: Operation, reply: Value) -> Result<bool> {
    reply
        .as_bool()
        .ok_or_else(|| unexpected(operation, format!("expected a boolean, got {reply}")))
}

fn expect<T: DeserializeOwned>(operation: Operation, reply: Value) -> Result<T> {
    serde_json::from_value(reply).map_err(|err| unexpected(operation, err))
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<S: WorkerSpawner> StorageAdapter for OpfsWorkerAdapter<S> {
    fn storage_type(&self) -> StorageType {
        StorageType::OpfsWorker
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let reply = self
            .round_trip(WorkerRequest::Has { key: key.to_owned() })
            .await?;
        expect_bool(Operation::Has, reply)
    }

    async fn get(&self, key: &str) -> Result<Value> {
        let reply = self
            .round_trip(WorkerRequest::Get { key: key.to_owned() })
            .await?;
        Ok(decode_value(reply))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.round_trip(WorkerRequest::Set {
            key: key.to_owned(),
            value: value.clone(),
        })
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.round_trip(WorkerRequest::Remove { key: key.to_owned() })
            .await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let reply = self.round_trip(WorkerRequest::Keys).await?;
        expect(Operation::Keys, reply)
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>> {
        let reply = self.round_trip(WorkerRequest::Entries).await?;
        let entries: Vec<(String, Value)> = expect(Operation::Entries, reply)?;
        Ok(entries
            .into_iter()
            .map(|(key, value)| (key, decode_value(value)))
            .collect())
    }

    async fn set_many(&self, entries: EntryBatch) -> bool {
        let request = WorkerRequest::SetMany {
            entries: entries.into_inner(),
        };
        let result = self.round_trip(request).await;
        match result.and_then(|reply| expect_bool(Operation::SetMany, reply)) {
            Ok(all_ok) => all_ok,
            Err(err) => {
                tracing::warn!(storage_type = %StorageType::OpfsWorker, error = %err, "set.many failed");
                false
            }
        }
    }

    async fn get_many(&self, keys: KeyBatch) -> Result<Vec<Value>> {
        let expected = keys.len();
        let reply = self
            .round_trip(WorkerRequest::GetMany {
                keys: keys.into_inner(),
            })
            .await?;
        let values: Vec<Value> = expect(Operation::GetMany, reply)?;
        if values.len() != expected {
            return Err(unexpected(
                Operation::GetMany,
                format!("expected {expected} values, got {}", values.len()),
            ));
        }
        Ok(values.into_iter().map(decode_value).collect())
    }

    async fn remove_many(&self, keys: KeyBatch) -> bool {
        let request = WorkerRequest::RemoveMany {
            keys: keys.into_inner(),
        };
        let result = self.round_trip(request).await;
        match result.and_then(|reply| expect_bool(Operation::RemoveMany, reply)) {
            Ok(all_ok) => all_ok,
            Err(err) => {
                tracing::warn!(storage_type = %StorageType::OpfsWorker, error = %err, "remove.many failed");
                false
            }
        }
    }
}
