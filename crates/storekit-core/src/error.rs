use std::fmt;
use std::time::Duration;

use crate::adapter::StorageType;

pub type Result<T> = std::result::Result<T, StoreError>;

/// A failure reported by the underlying platform service.
///
/// Browser storage APIs report failures as `DOMException`s, which carry a `name` (the
/// machine-readable kind, e.g. `QuotaExceededError`) and a human-readable `message`. Native
/// and in-memory platforms use the same shape so adapters can classify errors uniformly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub name: String,
    pub message: String,
}

impl BackendError {
    pub const QUOTA_EXCEEDED: &'static str = "QuotaExceededError";
    pub const NOT_FOUND: &'static str = "NotFoundError";
    pub const NO_MODIFICATION_ALLOWED: &'static str = "NoModificationAllowedError";

    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(Self::QUOTA_EXCEEDED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Self::NOT_FOUND, message)
    }

    /// Whether the platform signalled that storage is full.
    pub fn is_quota_exceeded(&self) -> bool {
        // https://webidl.spec.whatwg.org/#idl-DOMException-error-names
        // Older Firefox releases report `NS_ERROR_DOM_QUOTA_REACHED` instead.
        matches!(
            self.name.as_str(),
            Self::QUOTA_EXCEEDED | "NS_ERROR_DOM_QUOTA_REACHED"
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.name == Self::NOT_FOUND
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        let name = match err.kind() {
            std::io::ErrorKind::NotFound => Self::NOT_FOUND,
            std::io::ErrorKind::StorageFull => Self::QUOTA_EXCEEDED,
            std::io::ErrorKind::PermissionDenied => "NotAllowedError",
            std::io::ErrorKind::ResourceBusy => Self::NO_MODIFICATION_ALLOWED,
            std::io::ErrorKind::InvalidInput => "TypeError",
            _ => "OperationError",
        };
        Self::new(name, err.to_string())
    }
}

/// A worker message that does not follow the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message must have exactly one key, found {0}")]
    KeyCount(usize),
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),
    #[error("malformed arguments for `{operation}`: {reason}")]
    MalformedArguments {
        operation: &'static str,
        reason: String,
    },
    #[error("unexpected reply to `{operation}`: {reason}")]
    UnexpectedReply {
        operation: &'static str,
        reason: String,
    },
}

/// Unified error type for every storage adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend has no room for the value being written.
    #[error("{backend} storage is full")]
    QuotaExceeded {
        backend: StorageType,
        #[source]
        source: Option<BackendError>,
    },

    /// Any other platform failure, propagated unchanged.
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("worker protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The worker replied with an explicit error for the request.
    #[error("worker error: {0}")]
    Worker(String),

    #[error("worker did not answer `{operation}` within {timeout:?}")]
    WorkerTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("worker channel closed before the reply arrived")]
    WorkerDisconnected,

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Wraps a write failure, translating storage-full into [`StoreError::QuotaExceeded`].
    pub fn from_write(backend: StorageType, err: BackendError) -> Self {
        if err.is_quota_exceeded() {
            StoreError::QuotaExceeded {
                backend,
                source: Some(err),
            }
        } else {
            StoreError::Backend(err)
        }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_errors_are_translated_with_cause() {
        let err = StoreError::from_write(
            StorageType::LocalStorage,
            BackendError::quota_exceeded("the quota has been exceeded"),
        );
        assert!(err.is_quota_exceeded());
        assert_eq!(err.to_string(), "local-storage storage is full");

        let source = std::error::Error::source(&err).expect("cause retained");
        assert!(source.to_string().contains("QuotaExceededError"));
    }

    #[test]
    fn legacy_firefox_quota_name_is_recognised() {
        let err = BackendError::new("NS_ERROR_DOM_QUOTA_REACHED", "");
        assert!(err.is_quota_exceeded());
        assert_eq!(err.to_string(), "NS_ERROR_DOM_QUOTA_REACHED");
    }

    #[test]
    fn other_write_errors_propagate_unchanged() {
        let err = StoreError::from_write(
            StorageType::Idb,
            BackendError::new("InvalidStateError", "database closed"),
        );
        match err {
            StoreError::Backend(inner) => assert_eq!(inner.name, "InvalidStateError"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn io_errors_map_to_dom_names() {
        let err = BackendError::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(err.is_not_found());
    }
}
