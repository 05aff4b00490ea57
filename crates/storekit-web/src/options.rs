use serde::Deserialize;

/// Cookie attributes and limits used by [`CookieAdapter`](crate::CookieAdapter).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CookieOptions {
    /// Lifetime stamped on every write. Browsers cap cookie lifetimes at 400 days.
    pub max_age_days: u64,
    /// Upper bound for the percent-encoded `name=value` length.
    pub max_bytes: usize,
    /// `domain` attribute; the current hostname when unset.
    pub domain: Option<String>,
    pub path: String,
    pub same_site: String,
    pub secure: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            max_age_days: 400,
            max_bytes: 4096,
            domain: None,
            path: "/".to_owned(),
            same_site: "strict".to_owned(),
            secure: true,
        }
    }
}

/// Naming used by [`CacheAdapter`](crate::CacheAdapter).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Single named cache holding every key.
    pub cache_name: String,
    /// Path prefix of the synthetic request URL a key is stored under.
    pub url_prefix: String,
    /// Run the best-effort storage estimate check after each write.
    pub quota_check: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            cache_name: "storekit-kvstore".to_owned(),
            url_prefix: "/storekit-kvstore/".to_owned(),
            quota_check: true,
        }
    }
}

/// Database and object store names for the IndexedDB key/value store.
///
/// The defaults match `idb-keyval`, so data written by that library is visible here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IdbOptions {
    pub database: String,
    pub store: String,
}

impl Default for IdbOptions {
    fn default() -> Self {
        Self {
            database: "keyval-store".to_owned(),
            store: "keyval".to_owned(),
        }
    }
}
