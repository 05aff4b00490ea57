use storekit_core::BackendError;

use super::{backend_error_from_js, window};
use crate::web_storage::WebStorage;

/// A browser `Storage` object (`localStorage` or `sessionStorage`).
#[derive(Debug, Clone)]
pub struct BrowserStorage(web_sys::Storage);

impl BrowserStorage {
    pub fn local() -> Result<Self, BackendError> {
        window()?
            .local_storage()
            .map_err(backend_error_from_js)?
            .map(Self)
            .ok_or_else(|| BackendError::new("NotSupportedError", "localStorage is unavailable"))
    }

    pub fn session() -> Result<Self, BackendError> {
        window()?
            .session_storage()
            .map_err(backend_error_from_js)?
            .map(Self)
            .ok_or_else(|| BackendError::new("NotSupportedError", "sessionStorage is unavailable"))
    }
}

impl WebStorage for BrowserStorage {
    fn length(&self) -> Result<u32, BackendError> {
        self.0.length().map_err(backend_error_from_js)
    }

    fn key(&self, index: u32) -> Result<Option<String>, BackendError> {
        self.0.key(index).map_err(backend_error_from_js)
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, BackendError> {
        self.0.get_item(key).map_err(backend_error_from_js)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), BackendError> {
        self.0.set_item(key, value).map_err(backend_error_from_js)
    }

    fn remove_item(&self, key: &str) -> Result<(), BackendError> {
        self.0.remove_item(key).map_err(backend_error_from_js)
    }
}
