use serde::Deserialize;
use storekit_opfs::WorkerOptions;
use storekit_web::{CacheOptions, CookieOptions, IdbOptions};

/// Options for every backend. Absent sections take their defaults, so `{}` is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub cookie: CookieOptions,
    pub cache: CacheOptions,
    pub idb: IdbOptions,
    pub worker: WorkerOptions,
}

impl StoreConfig {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        assert_eq!(StoreConfig::from_json("{}").unwrap(), StoreConfig::default());
    }

    #[test]
    fn sections_override_individually() {
        let config = StoreConfig::from_json(
            r#"{
                "cookie": { "secure": false, "domain": "example.com" },
                "worker": { "request_timeout_ms": null, "script_url": "/opfs.js" }
            }"#,
        )
        .unwrap();

        assert!(!config.cookie.secure);
        assert_eq!(config.cookie.domain.as_deref(), Some("example.com"));
        assert_eq!(config.cookie.max_age_days, 400);
        assert_eq!(config.worker.request_timeout_ms, None);
        assert_eq!(config.worker.ready_timeout_ms, Some(10_000));
        assert_eq!(config.worker.script_url, "/opfs.js");
        assert_eq!(config.cache, CacheOptions::default());
    }
}
