use futures::channel::mpsc;
use serde::Serialize;
use serde_json::Value;
use storekit_core::BackendError;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::wasm_bindgen;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{DedicatedWorkerGlobalScope, ErrorEvent, MessageEvent, Worker, WorkerType};

use super::{backend_error_from_js, BrowserRoot};
use crate::options::WorkerOptions;
use crate::proxy::{WorkerInbox, WorkerSpawner, WorkerTransport};
use crate::worker::OpfsWorker;

fn to_js(message: &Value) -> Result<JsValue, BackendError> {
    message
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|err| BackendError::new("DataCloneError", err.to_string()))
}

fn from_js(data: JsValue) -> Value {
    // Anything that is not plain JSON still gets routed, and is answered as unrecognised.
    serde_wasm_bindgen::from_value(data).unwrap_or(Value::Null)
}

/// Starts module workers with `new Worker(script_url, { type: "module", name })`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserWorkerSpawner;

impl WorkerSpawner for BrowserWorkerSpawner {
    type Transport = BrowserWorker;

    fn spawn(
        &self,
        options: &WorkerOptions,
        inbox: WorkerInbox,
    ) -> Result<BrowserWorker, BackendError> {
        let worker_options = web_sys::WorkerOptions::new();
        worker_options.set_type(WorkerType::Module);
        worker_options.set_name(&options.name);
        let worker = Worker::new_with_options(&options.script_url, &worker_options)
            .map_err(backend_error_from_js)?;

        let message_inbox = inbox.clone();
        let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            message_inbox.deliver(from_js(event.data()));
        });
        let on_error = Closure::<dyn FnMut(ErrorEvent)>::new(move |event: ErrorEvent| {
            inbox.disconnect(event.message());
        });
        worker.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        worker.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        Ok(BrowserWorker {
            worker,
            _on_message: on_message,
            _on_error: on_error,
        })
    }
}

/// A running module worker. The event callbacks live as long as this value.
pub struct BrowserWorker {
    worker: Worker,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_error: Closure<dyn FnMut(ErrorEvent)>,
}

impl std::fmt::Debug for BrowserWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserWorker").finish_non_exhaustive()
    }
}

impl WorkerTransport for BrowserWorker {
    fn post_message(&self, message: &Value) -> Result<(), BackendError> {
        self.worker
            .post_message(&to_js(message)?)
            .map_err(backend_error_from_js)
    }

    fn terminate(&self) {
        self.worker.set_onmessage(None);
        self.worker.set_onerror(None);
        self.worker.terminate();
    }
}

/// Entry point for the worker script: attach the message listener, then announce readiness and
/// serve requests for the lifetime of the worker.
#[wasm_bindgen(js_name = startOpfsWorker)]
pub fn start_opfs_worker() -> Result<(), JsValue> {
    let scope: DedicatedWorkerGlobalScope = js_sys::global().dyn_into()?;

    let (tx, rx) = mpsc::unbounded::<Value>();
    let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
        let _ = tx.unbounded_send(from_js(event.data()));
    });
    scope.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
    on_message.forget();

    let worker = OpfsWorker::new(BrowserRoot);
    wasm_bindgen_futures::spawn_local(async move {
        worker
            .serve(rx, |reply| {
                let posted = to_js(&reply)
                    .and_then(|js| scope.post_message(&js).map_err(backend_error_from_js));
                if let Err(err) = posted {
                    tracing::error!(error = %err, "failed to post reply to host");
                }
            })
            .await;
    });
    Ok(())
}
