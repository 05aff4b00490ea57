use storekit_core::BackendError;
use wasm_bindgen::JsCast;

use super::{backend_error_from_js, window};
use crate::cookie::CookieJar;

/// `document.cookie` of the current page.
#[derive(Debug, Clone)]
pub struct DocumentCookieJar {
    document: web_sys::HtmlDocument,
    location: web_sys::Location,
}

impl DocumentCookieJar {
    pub fn new() -> Result<Self, BackendError> {
        let window = window()?;
        let document = window
            .document()
            .ok_or_else(|| BackendError::new("NotSupportedError", "window has no document"))?
            .dyn_into::<web_sys::HtmlDocument>()
            .map_err(|_| BackendError::new("NotSupportedError", "document is not an HTML document"))?;
        Ok(Self {
            document,
            location: window.location(),
        })
    }
}

impl CookieJar for DocumentCookieJar {
    fn cookie_string(&self) -> Result<String, BackendError> {
        self.document.cookie().map_err(backend_error_from_js)
    }

    fn set_cookie(&self, cookie: &str) -> Result<(), BackendError> {
        self.document.set_cookie(cookie).map_err(backend_error_from_js)
    }

    fn hostname(&self) -> Result<String, BackendError> {
        self.location.hostname().map_err(backend_error_from_js)
    }
}
