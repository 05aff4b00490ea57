use std::time::Duration;

use serde::Deserialize;

/// How the OPFS worker is started and how long the proxy waits on it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerOptions {
    /// Module script that calls `start_opfs_worker()`.
    pub script_url: String,
    /// Worker name, shown in browser dev tools and used as the native thread name.
    pub name: String,
    /// Deadline for the startup handshake. `None` waits forever.
    pub ready_timeout_ms: Option<u64>,
    /// Deadline for each round trip. `None` waits forever.
    pub request_timeout_ms: Option<u64>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            script_url: "./opfs-worker.js".to_owned(),
            name: "opfsWorker".to_owned(),
            ready_timeout_ms: Some(10_000),
            request_timeout_ms: Some(30_000),
        }
    }
}

impl WorkerOptions {
    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_ms.map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}
