//! Storage adapters for the browser's synchronous and promise-based storage services:
//! cookies, `localStorage`/`sessionStorage`, the Cache API and IndexedDB.
//!
//! Each adapter is generic over a small platform trait ([`CookieJar`], [`WebStorage`],
//! [`CacheStore`], [`KeyValueStore`]). On `wasm32` the [`platform`] module implements these over
//! `web-sys`; [`memory`] provides in-memory versions for native hosts and tests.

mod cache;
mod cookie;
mod idb;
pub mod memory;
mod options;
mod web_storage;

#[cfg(target_arch = "wasm32")]
pub mod platform;

pub use cache::{CacheAdapter, CacheStore, StorageEstimate};
pub use cookie::{parse_cookie_header, CookieAdapter, CookieJar};
pub use idb::{IdbAdapter, KeyValueStore};
pub use options::{CacheOptions, CookieOptions, IdbOptions};
pub use web_storage::{WebStorage, WebStorageAdapter};
