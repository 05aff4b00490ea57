//! `web-sys` implementations of the platform traits (`wasm32` only).

mod cache;
mod cookie;
mod idb;
mod storage;

pub use cache::BrowserCacheStore;
pub use cookie::DocumentCookieJar;
pub use idb::IdbKeyValueStore;
pub use storage::BrowserStorage;

use storekit_core::BackendError;
use wasm_bindgen::{JsCast, JsValue};

/// Classify a thrown JS value. `DOMException`s keep their name so quota errors are recognised.
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

pub(crate) fn window() -> Result<web_sys::Window, BackendError> {
    web_sys::window()
        .ok_or_else(|| BackendError::new("NotSupportedError", "no window in this context"))
}

pub(crate) fn worker_scope() -> Option<web_sys::WorkerGlobalScope> {
    js_sys::global().dyn_into::<web_sys::WorkerGlobalScope>().ok()
}
