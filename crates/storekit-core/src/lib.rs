//! Common contract for storekit's key/value storage adapters.
//!
//! Every backend (cookies, web storage, the Cache API, IndexedDB, OPFS and OPFS behind a
//! worker) implements [`StorageAdapter`], so callers can write storage-agnostic code and swap
//! backends at the call site. This crate holds the pieces shared by all of them:
//!
//! - [`StorageAdapter`] and the [`StorageType`] discriminant
//! - [`value`]: text encoding and tolerant JSON decoding for text-only backends
//! - [`batch`]: `set_many`/`get_many`/`remove_many` fan-out helpers and their inputs
//! - [`StoreError`]: the error taxonomy (quota, backend, worker protocol)
//! - [`platform`]: native/wasm32 shims (thread-safety bounds, clock, timers)

pub mod adapter;
pub mod batch;
mod error;
pub mod platform;
pub mod value;

pub use adapter::{StorageAdapter, StorageType, UnknownStorageType};
pub use batch::{EntryBatch, KeyBatch};
pub use error::{BackendError, ProtocolError, Result, StoreError};
pub use platform::MaybeSendSync;

/// Re-exported so adapter crates and callers agree on the async-trait flavour.
pub use async_trait::async_trait;
pub use serde_json::Value;
