use std::sync::Arc;

use futures::lock::Mutex;

use crate::fs::{FsResult, RootProvider};

/// The origin-private root directory, opened on first use and shared afterwards.
///
/// Concurrent first callers queue on one lock, so the provider is asked for the root exactly
/// once. A failed open leaves the cell empty and the next caller retries.
pub struct RootDirectory<P: RootProvider> {
    provider: P,
    root: Mutex<Option<Arc<P::Directory>>>,
}

impl<P: RootProvider + std::fmt::Debug> std::fmt::Debug for RootDirectory<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootDirectory")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl<P: RootProvider> RootDirectory<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            root: Mutex::new(None),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub async fn get(&self) -> FsResult<Arc<P::Directory>> {
        let mut slot = self.root.lock().await;
        if let Some(root) = slot.as_ref() {
            return Ok(Arc::clone(root));
        }

        let root = Arc::new(self.provider.open_root().await?);
        tracing::debug!("opened origin-private root directory");
        *slot = Some(Arc::clone(&root));
        Ok(root)
    }
}
