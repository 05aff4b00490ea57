//! `web-sys` implementations of the OPFS platform traits and the browser worker (`wasm32` only).

mod fs;
mod sync_handle;
mod worker;

pub use fs::{BrowserDirectory, BrowserFile, BrowserRoot, BrowserWritable};
pub use sync_handle::BrowserSyncHandle;
pub use worker::{start_opfs_worker, BrowserWorker, BrowserWorkerSpawner};

use storekit_core::BackendError;
use wasm_bindgen::{JsCast, JsValue};

/// Classify a thrown JS value, keeping `DOMException` names.
pub(crate) fn backend_error_from_js(err: JsValue) -> BackendError {
    if let Some(ex) = err.dyn_ref::<web_sys::DomException>() {
        return BackendError::new(ex.name(), ex.message());
    }
    if let Some(ex) = err.dyn_ref::<js_sys::Error>() {
        return BackendError::new(String::from(ex.name()), String::from(ex.message()));
    }
    BackendError::new(
        "Error",
        err.as_string().unwrap_or_else(|| format!("{err:?}")),
    )
}

pub(crate) fn type_error(message: impl Into<String>) -> BackendError {
    BackendError::new("TypeError", message)
}
