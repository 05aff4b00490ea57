use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use futures::lock::Mutex;
use serde::Serialize;
use serde_json::Value;
use storekit_core::{async_trait, BackendError};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{IdbDatabase, IdbRequest, IdbTransaction, IdbTransactionMode};

use super::{backend_error_from_js, worker_scope};
use crate::idb::KeyValueStore;
use crate::options::IdbOptions;

/// One IndexedDB object store used as a flat key/value map, the way `idb-keyval` lays it out.
///
/// The database connection is opened on first use and reused afterwards.
#[derive(Debug)]
pub struct IdbKeyValueStore {
    options: IdbOptions,
    db: Mutex<Option<IdbDatabase>>,
}

impl IdbKeyValueStore {
    pub fn new(options: IdbOptions) -> Self {
        Self {
            options,
            db: Mutex::new(None),
        }
    }

    async fn database(&self) -> Result<IdbDatabase, BackendError> {
        let mut slot = self.db.lock().await;
        if let Some(db) = slot.as_ref() {
            return Ok(db.clone());
        }
        let db = open_database(&self.options).await?;
        tracing::debug!(database = %self.options.database, "opened IndexedDB database");
        *slot = Some(db.clone());
        Ok(db)
    }

    async fn transaction(
        &self,
        mode: IdbTransactionMode,
    ) -> Result<(IdbTransaction, web_sys::IdbObjectStore), BackendError> {
        let db = self.database().await?;
        let tx = db
            .transaction_with_str_and_mode(&self.options.store, mode)
            .map_err(backend_error_from_js)?;
        let store = tx
            .object_store(&self.options.store)
            .map_err(backend_error_from_js)?;
        Ok((tx, store))
    }
}

fn factory() -> Result<web_sys::IdbFactory, BackendError> {
    let factory = match web_sys::window() {
        Some(window) => window.indexed_db(),
        None => worker_scope()
            .ok_or_else(|| BackendError::new("NotSupportedError", "no window or worker scope"))?
            .indexed_db(),
    };
    factory
        .map_err(backend_error_from_js)?
        .ok_or_else(|| BackendError::new("NotSupportedError", "IndexedDB is unavailable"))
}

async fn open_database(options: &IdbOptions) -> Result<IdbDatabase, BackendError> {
    let request = factory()?
        .open_with_u32(&options.database, 1)
        .map_err(backend_error_from_js)?;

    let store_name = options.store.clone();
    let upgrade_request = request.clone();
    let on_upgrade = Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
        let Ok(result) = upgrade_request.result() else {
            return;
        };
        let Ok(db) = result.dyn_into::<IdbDatabase>() else {
            return;
        };
        if !db.object_store_names().contains(&store_name) {
            if let Err(err) = db.create_object_store(&store_name) {
                tracing::error!(error = ?err, "failed to create object store");
            }
        }
    });
    request.set_onupgradeneeded(Some(on_upgrade.as_ref().unchecked_ref()));

    let result = request_done(&request).await;
    request.set_onupgradeneeded(None);
    drop(on_upgrade);

    result?
        .dyn_into::<IdbDatabase>()
        .map_err(|_| BackendError::new("TypeError", "open request did not yield a database"))
}

type Reply = Rc<RefCell<Option<futures_channel::oneshot::Sender<Result<JsValue, BackendError>>>>>;

fn settle(reply: &Reply, result: Result<JsValue, BackendError>) {
    if let Some(tx) = reply.borrow_mut().take() {
        let _ = tx.send(result);
    }
}

/// Resolve with the request's result. Handlers are attached before this returns, so callers can
/// create the future first and await it later.
fn request_done(request: &IdbRequest) -> impl Future<Output = Result<JsValue, BackendError>> {
    let (tx, rx) = futures_channel::oneshot::channel();
    let reply: Reply = Rc::new(RefCell::new(Some(tx)));

    let ok_reply = Rc::clone(&reply);
    let ok_request = request.clone();
    let on_success = Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
        settle(&ok_reply, ok_request.result().map_err(backend_error_from_js));
    });

    let err_reply = Rc::clone(&reply);
    let err_request = request.clone();
    let on_error = Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
        let err = err_request
            .error()
            .ok()
            .flatten()
            .map(|ex| BackendError::new(ex.name(), ex.message()))
            .unwrap_or_else(|| BackendError::new("UnknownError", "IndexedDB request failed"));
        settle(&err_reply, Err(err));
    });

    request.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
    request.set_onerror(Some(on_error.as_ref().unchecked_ref()));

    async move {
        let result = rx
            .await
            .unwrap_or_else(|_| Err(BackendError::new("AbortError", "IndexedDB request dropped")));
        drop((on_success, on_error));
        result
    }
}

/// Resolve once the transaction commits. Quota failures often surface only as an abort.
fn transaction_done(tx: &IdbTransaction) -> impl Future<Output = Result<(), BackendError>> {
    let (sender, rx) = futures_channel::oneshot::channel();
    let reply: Reply = Rc::new(RefCell::new(Some(sender)));

    let ok_reply = Rc::clone(&reply);
    let on_complete = Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
        settle(&ok_reply, Ok(JsValue::UNDEFINED));
    });

    let err_reply = Rc::clone(&reply);
    let err_tx = tx.clone();
    let on_abort = Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
        let err = err_tx
            .error()
            .map(|ex| BackendError::new(ex.name(), ex.message()))
            .unwrap_or_else(|| BackendError::new("AbortError", "IndexedDB transaction aborted"));
        settle(&err_reply, Err(err));
    });

    tx.set_oncomplete(Some(on_complete.as_ref().unchecked_ref()));
    tx.set_onabort(Some(on_abort.as_ref().unchecked_ref()));
    tx.set_onerror(Some(on_abort.as_ref().unchecked_ref()));

    async move {
        let result = rx
            .await
            .unwrap_or_else(|_| Err(BackendError::new("AbortError", "IndexedDB transaction dropped")));
        drop((on_complete, on_abort));
        result.map(|_| ())
    }
}

fn to_js(value: &Value) -> Result<JsValue, BackendError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|err| BackendError::new("DataCloneError", err.to_string()))
}

fn from_js(value: JsValue) -> Result<Value, BackendError> {
    serde_wasm_bindgen::from_value(value)
        .map_err(|err| BackendError::new("DataError", err.to_string()))
}

fn key_to_string(key: JsValue) -> String {
    key.as_string()
        .or_else(|| key.as_f64().map(|n| n.to_string()))
        .unwrap_or_else(|| format!("{key:?}"))
}

#[async_trait(?Send)]
impl KeyValueStore for IdbKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, BackendError> {
        let (_tx, store) = self.transaction(IdbTransactionMode::Readonly).await?;
        let request = store
            .get(&JsValue::from_str(key))
            .map_err(backend_error_from_js)?;
        let value = request_done(&request).await?;
        if value.is_undefined() {
            return Ok(None);
        }
        from_js(value).map(Some)
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), BackendError> {
        let (tx, store) = self.transaction(IdbTransactionMode::Readwrite).await?;
        let committed = transaction_done(&tx);
        let request = store
            .put_with_key(&to_js(value)?, &JsValue::from_str(key))
            .map_err(backend_error_from_js)?;
        request_done(&request).await?;
        committed.await
    }

    async fn del(&self, key: &str) -> Result<(), BackendError> {
        let (tx, store) = self.transaction(IdbTransactionMode::Readwrite).await?;
        let committed = transaction_done(&tx);
        let request = store
            .delete(&JsValue::from_str(key))
            .map_err(backend_error_from_js)?;
        request_done(&request).await?;
        committed.await
    }

    async fn keys(&self) -> Result<Vec<String>, BackendError> {
        let (_tx, store) = self.transaction(IdbTransactionMode::Readonly).await?;
        let request = store.get_all_keys().map_err(backend_error_from_js)?;
        let keys: js_sys::Array = request_done(&request).await?.unchecked_into();
        Ok(keys.iter().map(key_to_string).collect())
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>, BackendError> {
        let (_tx, store) = self.transaction(IdbTransactionMode::Readonly).await?;
        // Both requests run in the same transaction, so the two lists line up.
        let keys_request = store.get_all_keys().map_err(backend_error_from_js)?;
        let values_request = store.get_all().map_err(backend_error_from_js)?;
        let keys = request_done(&keys_request);
        let values = request_done(&values_request);
        let keys: js_sys::Array = keys.await?.unchecked_into();
        let values: js_sys::Array = values.await?.unchecked_into();
        keys.iter()
            .zip(values.iter())
            .map(|(key, value)| Ok((key_to_string(key), from_js(value)?)))
            .collect()
    }
}
