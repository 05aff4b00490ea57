use std::time::Duration;

use serde_json::Value;
use storekit_core::platform::{self, MaybeSendSync};
use storekit_core::value::{encode_text, safe_json_parse};
use storekit_core::{async_trait, BackendError, Result, StorageAdapter, StorageType, StoreError};

use crate::options::CookieOptions;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

fn out_of_range(what: &str) -> StoreError {
    StoreError::Backend(BackendError::new("RangeError", format!("{what} is out of range")))
}

/// Access to the page's cookie jar (`document.cookie`).
///
/// Cookie access is synchronous in the browser, so this trait is too.
pub trait CookieJar: MaybeSendSync {
    /// The `name=value; name2=value2` header visible to the page.
    fn cookie_string(&self) -> std::result::Result<String, BackendError>;

    /// Apply one `Set-Cookie`-style assignment.
    fn set_cookie(&self, cookie: &str) -> std::result::Result<(), BackendError>;

    /// Hostname of the current document, used as the cookie `domain`.
    fn hostname(&self) -> std::result::Result<String, BackendError>;
}

/// Key/value adapter over cookies.
///
/// Every write re-stamps a fixed lifetime (400 days by default). Names and values are
/// percent-encoded, and a write whose encoded `name=value` exceeds the size limit fails with
/// [`StoreError::QuotaExceeded`] before the jar is touched.
#[derive(Debug)]
pub struct CookieAdapter<J> {
    jar: J,
    options: CookieOptions,
}

impl<J: CookieJar> CookieAdapter<J> {
    pub fn new(jar: J) -> Self {
        Self::with_options(jar, CookieOptions::default())
    }

    pub fn with_options(jar: J, options: CookieOptions) -> Self {
        Self { jar, options }
    }

    pub fn jar(&self) -> &J {
        &self.jar
    }

    fn all_cookies(&self) -> Result<Vec<(String, String)>> {
        let header = self.jar.cookie_string()?;
        Ok(parse_cookie_header(&header))
    }

    fn lookup(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .all_cookies()?
            .into_iter()
            .find_map(|(name, value)| (name == key).then_some(value)))
    }

    fn assignment(&self, name: &str, value: &str, max_age_secs: u64, expired: bool) -> Result<String> {
        let domain = match &self.options.domain {
            Some(domain) => domain.clone(),
            None => self.jar.hostname()?,
        };

        let now = platform::now();
        let expires = if expired {
            now.checked_sub(Duration::from_secs(1)).unwrap_or(std::time::UNIX_EPOCH)
        } else {
            now.checked_add(Duration::from_secs(max_age_secs))
                .ok_or_else(|| out_of_range("cookie expiry"))?
        };

        let mut parts = vec![
            format!("{name}={value}"),
            format!("domain={domain}"),
            format!("path={}", self.options.path),
            format!("samesite={}", self.options.same_site),
        ];
        if self.options.secure {
            parts.push("secure".to_owned());
        }
        parts.push(format!("expires={}", httpdate::fmt_http_date(expires)));
        parts.push(format!("max-age={max_age_secs}"));
        Ok(parts.join("; "))
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<J: CookieJar> StorageAdapter for CookieAdapter<J> {
    fn storage_type(&self) -> StorageType {
        StorageType::Cookie
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.all_cookies()?.iter().any(|(name, _)| name == key))
    }

    async fn get(&self, key: &str) -> Result<Value> {
        Ok(safe_json_parse(self.lookup(key)?.as_deref()))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let name = urlencoding::encode(key);
        let text = encode_text(value);
        let value = urlencoding::encode(&text);

        // https://chromestatus.com/feature/4946713618939904
        if name.len() + value.len() > self.options.max_bytes {
            return Err(StoreError::QuotaExceeded {
                backend: StorageType::Cookie,
                source: Some(BackendError::quota_exceeded(format!(
                    "cookie max size ({} bytes) exceeded",
                    self.options.max_bytes
                ))),
            });
        }

        let max_age_secs = self
            .options
            .max_age_days
            .checked_mul(SECS_PER_DAY)
            .ok_or_else(|| out_of_range("max_age_days"))?;
        let cookie = self.assignment(&name, &value, max_age_secs, false)?;
        self.jar
            .set_cookie(&cookie)
            .map_err(|err| StoreError::from_write(StorageType::Cookie, err))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let name = urlencoding::encode(key);
        let cookie = self.assignment(&name, "", 0, true)?;
        self.jar.set_cookie(&cookie)?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .all_cookies()?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>> {
        Ok(self
            .all_cookies()?
            .into_iter()
            .map(|(name, value)| {
                let value = safe_json_parse(Some(&value));
                (name, value)
            })
            .collect())
    }
}

/// Split a `document.cookie` string into decoded `(name, value)` pairs.
///
/// Later duplicates of a name replace the earlier value but keep its position.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    let mut cookies: Vec<(String, String)> = Vec::new();
    for raw in header.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, value) = raw.split_once('=').unwrap_or((raw, ""));
        let name = percent_decode(name.trim());
        let value = percent_decode(value.trim());
        match cookies.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => cookies.push((name, value)),
        }
    }
    cookies
}

/// Cookies written by other code may not be valid percent-encoded UTF-8; keep those verbatim.
fn percent_decode(text: &str) -> String {
    urlencoding::decode(text)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| text.to_owned())
}
