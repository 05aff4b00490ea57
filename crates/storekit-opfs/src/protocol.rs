//! Wire format spoken between the OPFS worker proxy and the worker handler.
//!
//! Every message is a JSON object with exactly one key:
//!
//! - request: `{ "<operation>": [args...] }`
//! - success: `{ "<operation>-complete": result }`
//! - failure: `{ "<operation>-error": { "name": ..., "message": ... } }`
//! - unrecognised request: `{ "error": { "name": ..., "message": ... } }`
//! - startup: `{ "ready": true }`, sent once before any reply
//!
//! Messages carry no request id. Replies are matched to requests by order, which is only sound
//! while at most one request is outstanding.

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Map, Value};
use storekit_core::{BackendError, EntryBatch, KeyBatch, ProtocolError};

const READY: &str = "ready";
const ERROR: &str = "error";
const COMPLETE_SUFFIX: &str = "-complete";
const ERROR_SUFFIX: &str = "-error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Has,
    Get,
    Set,
    Remove,
    Keys,
    Entries,
    GetMany,
    SetMany,
    RemoveMany,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::Has,
        Operation::Get,
        Operation::Set,
        Operation::Remove,
        Operation::Keys,
        Operation::Entries,
        Operation::GetMany,
        Operation::SetMany,
        Operation::RemoveMany,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Has => "has",
            Operation::Get => "get",
            Operation::Set => "set",
            Operation::Remove => "remove",
            Operation::Keys => "keys",
            Operation::Entries => "entries",
            Operation::GetMany => "get.many",
            Operation::SetMany => "set.many",
            Operation::RemoveMany => "remove.many",
        }
    }

    /// Key of the success reply, e.g. `get-complete`.
    pub fn complete_event(self) -> String {
        format!("{}{COMPLETE_SUFFIX}", self.as_str())
    }

    pub fn error_event(self) -> String {
        format!("{}{ERROR_SUFFIX}", self.as_str())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownOperation(s.to_owned()))
    }
}

/// A request from the proxy to the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerRequest {
    Has { key: String },
    Get { key: String },
    Set { key: String, value: Value },
    Remove { key: String },
    Keys,
    Entries,
    GetMany { keys: Vec<String> },
    SetMany { entries: Vec<(String, Value)> },
    RemoveMany { keys: Vec<String> },
}

impl WorkerRequest {
    pub fn operation(&self) -> Operation {
        match self {
            WorkerRequest::Has { .. } => Operation::Has,
            WorkerRequest::Get { .. } => Operation::Get,
            WorkerRequest::Set { .. } => Operation::Set,
            WorkerRequest::Remove { .. } => Operation::Remove,
            WorkerRequest::Keys => Operation::Keys,
            WorkerRequest::Entries => Operation::Entries,
            WorkerRequest::GetMany { .. } => Operation::GetMany,
            WorkerRequest::SetMany { .. } => Operation::SetMany,
            WorkerRequest::RemoveMany { .. } => Operation::RemoveMany,
        }
    }

    pub fn to_message(&self) -> Value {
        let args = match self {
            WorkerRequest::Has { key } | WorkerRequest::Get { key } | WorkerRequest::Remove { key } => {
                json!([key])
            }
            WorkerRequest::Set { key, value } => json!([key, value]),
            WorkerRequest::Keys | WorkerRequest::Entries => json!([]),
            WorkerRequest::GetMany { keys } | WorkerRequest::RemoveMany { keys } => json!([keys]),
            WorkerRequest::SetMany { entries } => {
                let pairs: Vec<Value> = entries.iter().map(|(k, v)| json!([k, v])).collect();
                json!([pairs])
            }
        };
        single_key(self.operation().as_str(), args)
    }

    pub fn from_message(message: &Value) -> Result<Self, ProtocolError> {
        let (name, args) = only_entry(message)?;
        let operation: Operation = name.parse()?;
        let args = args.as_array().ok_or_else(|| malformed(operation, "arguments must be an array"))?;

        let key_arg = || -> Result<String, ProtocolError> {
            args.first()
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| malformed(operation, "first argument must be a string key"))
        };
        let batch_arg = || args.first().cloned().unwrap_or(Value::Null);

        Ok(match operation {
            Operation::Has => WorkerRequest::Has { key: key_arg()? },
            Operation::Get => WorkerRequest::Get { key: key_arg()? },
            Operation::Remove => WorkerRequest::Remove { key: key_arg()? },
            Operation::Set => WorkerRequest::Set {
                key: key_arg()?,
                // A missing value is JavaScript's `undefined`, which stores as "undefined".
                value: args
                    .get(1)
                    .cloned()
                    .unwrap_or_else(|| Value::String("undefined".to_owned())),
            },
            Operation::Keys => WorkerRequest::Keys,
            Operation::Entries => WorkerRequest::Entries,
            Operation::GetMany => WorkerRequest::GetMany {
                keys: KeyBatch::try_from(batch_arg())
                    .map_err(|err| malformed(operation, err))?
                    .into_inner(),
            },
            Operation::RemoveMany => WorkerRequest::RemoveMany {
                keys: KeyBatch::try_from(batch_arg())
                    .map_err(|err| malformed(operation, err))?
                    .into_inner(),
            },
            Operation::SetMany => WorkerRequest::SetMany {
                entries: EntryBatch::try_from(batch_arg())
                    .map_err(|err| malformed(operation, err))?
                    .into_inner(),
            },
        })
    }
}

/// A message from the worker to the proxy.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerReply {
    Ready,
    Complete {
        operation: Operation,
        result: Value,
    },
    /// `operation` is `None` when the request itself could not be understood.
    Failed {
        operation: Option<Operation>,
        error: BackendError,
    },
}

impl WorkerReply {
    pub fn to_message(&self) -> Value {
        match self {
            WorkerReply::Ready => single_key(READY, Value::Bool(true)),
            WorkerReply::Complete { operation, result } => {
                single_key(&operation.complete_event(), result.clone())
            }
            WorkerReply::Failed { operation, error } => {
                let payload = json!({ "name": error.name, "message": error.message });
                match operation {
                    Some(op) => single_key(&op.error_event(), payload),
                    None => single_key(ERROR, payload),
                }
            }
        }
    }

    pub fn from_message(message: &Value) -> Result<Self, ProtocolError> {
        let (name, payload) = only_entry(message)?;
        if name == READY {
            return Ok(WorkerReply::Ready);
        }
        if name == ERROR {
            return Ok(WorkerReply::Failed {
                operation: None,
                error: error_from_payload(payload),
            });
        }
        if let Some(op) = name.strip_suffix(COMPLETE_SUFFIX) {
            return Ok(WorkerReply::Complete {
                operation: op.parse()?,
                result: payload.clone(),
            });
        }
        if let Some(op) = name.strip_suffix(ERROR_SUFFIX) {
            return Ok(WorkerReply::Failed {
                operation: Some(op.parse()?),
                error: error_from_payload(payload),
            });
        }
        Err(ProtocolError::UnknownOperation(name.to_owned()))
    }

    /// Whether this reply settles a listener waiting for `expected`. A request-level failure
    /// with no operation answers whichever request is outstanding.
    pub fn answers(&self, expected: Expected) -> bool {
        match (self, expected) {
            (WorkerReply::Ready, Expected::Ready) => true,
            (WorkerReply::Complete { operation, .. }, Expected::Reply(op)) => *operation == op,
            (WorkerReply::Failed { operation: Some(operation), .. }, Expected::Reply(op)) => {
                *operation == op
            }
            (WorkerReply::Failed { operation: None, .. }, Expected::Reply(_)) => true,
            _ => false,
        }
    }
}

/// What a queued listener is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Ready,
    Reply(Operation),
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Ready => f.write_str(READY),
            Expected::Reply(op) => f.write_str(&op.complete_event()),
        }
    }
}

fn single_key(name: &str, value: Value) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(name.to_owned(), value);
    Value::Object(map)
}

fn only_entry(message: &Value) -> Result<(&str, &Value), ProtocolError> {
    let object = message.as_object().ok_or(ProtocolError::NotAnObject)?;
    let mut fields = object.iter();
    match (fields.next(), fields.next()) {
        (Some((name, value)), None) => Ok((name.as_str(), value)),
        _ => Err(ProtocolError::KeyCount(object.len())),
    }
}

fn malformed(operation: Operation, reason: impl fmt::Display) -> ProtocolError {
    ProtocolError::MalformedArguments {
        operation: operation.as_str(),
        reason: reason.to_string(),
    }
}

fn error_from_payload(payload: &Value) -> BackendError {
    match payload {
        Value::String(message) => BackendError::new("Error", message.clone()),
        _ => BackendError::new(
            payload
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("Error"),
            payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_use_the_operation_as_the_only_key() {
        let set = WorkerRequest::Set {
            key: "meaning".into(),
            value: json!({ "ofLife": 42 }),
        };
        assert_eq!(set.to_message(), json!({ "set": ["meaning", { "ofLife": 42 }] }));
        assert_eq!(WorkerRequest::Keys.to_message(), json!({ "keys": [] }));
        assert_eq!(
            WorkerRequest::GetMany {
                keys: vec!["a".into(), "b".into()]
            }
            .to_message(),
            json!({ "get.many": [["a", "b"]] })
        );
        assert_eq!(
            WorkerRequest::SetMany {
                entries: vec![("a".into(), json!(1))]
            }
            .to_message(),
            json!({ "set.many": [[["a", 1]]] })
        );
    }

    #[test]
    fn requests_parse_back() {
        for request in [
            WorkerRequest::Has { key: "k".into() },
            WorkerRequest::Remove { key: "k".into() },
            WorkerRequest::Entries,
            WorkerRequest::RemoveMany {
                keys: vec!["x".into()],
            },
            WorkerRequest::SetMany {
                entries: vec![("a".into(), json!({ "b": [1] }))],
            },
        ] {
            assert_eq!(WorkerRequest::from_message(&request.to_message()).unwrap(), request);
        }
    }

    #[test]
    fn batch_requests_accept_objects() {
        let request = WorkerRequest::from_message(&json!({ "set.many": [{ "a": 1 }] })).unwrap();
        assert_eq!(
            request,
            WorkerRequest::SetMany {
                entries: vec![("a".into(), json!(1))]
            }
        );
        let request = WorkerRequest::from_message(&json!({ "get.many": [{ "a": 1, "b": 2 }] })).unwrap();
        assert_eq!(
            request,
            WorkerRequest::GetMany {
                keys: vec!["a".into(), "b".into()]
            }
        );
    }

    #[test]
    fn malformed_requests_are_rejected() {
        assert_eq!(
            WorkerRequest::from_message(&json!("get")).unwrap_err(),
            ProtocolError::NotAnObject
        );
        assert_eq!(
            WorkerRequest::from_message(&json!({ "get": ["a"], "has": ["a"] })).unwrap_err(),
            ProtocolError::KeyCount(2)
        );
        assert_eq!(
            WorkerRequest::from_message(&json!({ "drop": [] })).unwrap_err(),
            ProtocolError::UnknownOperation("drop".into())
        );
        assert!(matches!(
            WorkerRequest::from_message(&json!({ "get": [1] })).unwrap_err(),
            ProtocolError::MalformedArguments { operation: "get", .. }
        ));
    }

    #[test]
    fn replies_match_the_wire_format() {
        assert_eq!(WorkerReply::Ready.to_message(), json!({ "ready": true }));
        assert_eq!(
            WorkerReply::Complete {
                operation: Operation::RemoveMany,
                result: json!(true)
            }
            .to_message(),
            json!({ "remove.many-complete": true })
        );
        let failed = WorkerReply::Failed {
            operation: Some(Operation::Set),
            error: BackendError::quota_exceeded("full"),
        };
        assert_eq!(
            failed.to_message(),
            json!({ "set-error": { "name": "QuotaExceededError", "message": "full" } })
        );
        assert_eq!(WorkerReply::from_message(&failed.to_message()).unwrap(), failed);
    }

    #[test]
    fn replies_answer_only_their_own_listener() {
        let reply = WorkerReply::from_message(&json!({ "get-complete": "x" })).unwrap();
        assert!(reply.answers(Expected::Reply(Operation::Get)));
        assert!(!reply.answers(Expected::Reply(Operation::GetMany)));
        assert!(!reply.answers(Expected::Ready));

        let generic = WorkerReply::from_message(&json!({ "error": "bad" })).unwrap();
        assert!(generic.answers(Expected::Reply(Operation::Keys)));
        assert!(!generic.answers(Expected::Ready));
    }
}
