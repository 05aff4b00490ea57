//! Key/value storage on the Origin Private File System, one file per key.
//!
//! Two adapters share the same layout:
//!
//! - [`OpfsAdapter`] works on the calling thread with streaming writes.
//! - [`OpfsWorkerAdapter`] forwards every call to a dedicated worker ([`OpfsWorker`]) that uses
//!   synchronous access handles, which browsers only allow off the main thread. The two sides
//!   talk through the message format in [`protocol`].
//!
//! The file system and the worker are reached through traits in [`fs`] and [`proxy`].
//! [`memory`] provides an in-memory file system; [`native`] maps the root to a directory on disk
//! and runs the worker on a thread; [`platform`] binds the real browser APIs on `wasm32`.

mod direct;
pub mod fs;
pub mod memory;
mod options;
pub mod protocol;
pub mod proxy;
mod root;
pub mod sync_file;
mod worker;

#[cfg(not(target_arch = "wasm32"))]
pub mod native;

#[cfg(target_arch = "wasm32")]
pub mod platform;

pub use direct::OpfsAdapter;
pub use options::WorkerOptions;
pub use proxy::{OpfsWorkerAdapter, WorkerInbox, WorkerSpawner, WorkerTransport};
pub use root::RootDirectory;
pub use sync_file::{SyncAccessHandle, SyncFile};
pub use worker::OpfsWorker;
